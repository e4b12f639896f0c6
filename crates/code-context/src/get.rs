//! Entity inspection by ID.
//!
//! `cctx get <ENTITY_ID>` prints the entity, its direct children and every
//! relationship it takes part in, as JSON.

use anyhow::{bail, Result};
use serde::Serialize;

use code_context_core::models::{Entity, Relationship};
use code_context_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// An entity with its immediate neighborhood.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub entity: Entity,
    pub children: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Load an entity and its neighborhood. Fails if the id is unknown.
pub async fn get_entity_view<S: Store>(store: &S, id: &str) -> Result<EntityView> {
    let Some(entity) = store.get_entity(id).await? else {
        bail!("entity not found: {}", id);
    };
    let children = store.children_of(id).await?;
    let relationships = store.relationships_for(id).await?;
    Ok(EntityView {
        entity,
        children,
        relationships,
    })
}

/// CLI entry point for `cctx get <id>`.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let view = get_entity_view(&store, id).await;
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&view?)?);
    Ok(())
}
