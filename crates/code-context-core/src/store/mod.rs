//! Storage abstraction for Code Context.
//!
//! The [`Store`] trait defines every persistence operation the indexing
//! pipeline and the search engine need, so both run unchanged against the
//! SQLite backend in the application crate and the [`memory::InMemoryStore`]
//! used in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Entity, EntityType, KeywordEntry, Relationship, StoreStats};
use crate::search::BooleanOperator;

/// A full-text query over entity names and content.
///
/// `terms` are lowercase query words used for prefix matching. They are not
/// stemmed here: backends stem them with the same tokenizer that indexed the
/// content. `raw_terms` are the caller's keywords as given, used only for
/// exact phrase matching.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsQuery {
    pub terms: Vec<String>,
    pub raw_terms: Vec<String>,
    pub operator: BooleanOperator,
    pub exact: bool,
    /// `NEAR` distance when proximity matching is requested.
    pub proximity: Option<u32>,
    pub limit: i64,
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

impl FtsQuery {
    /// Render as an FTS5 `MATCH` expression.
    ///
    /// Returns `None` when there is nothing to match.
    pub fn to_match_expression(&self) -> Option<String> {
        if self.exact {
            let phrase = self.raw_terms.join(" ");
            if phrase.trim().is_empty() {
                return None;
            }
            return Some(quote(phrase.trim()));
        }
        if self.terms.is_empty() {
            return None;
        }
        if let Some(distance) = self.proximity {
            if self.terms.len() > 1 {
                let quoted: Vec<String> = self.terms.iter().map(|t| quote(t)).collect();
                return Some(format!("NEAR({}, {})", quoted.join(" "), distance));
            }
        }
        let joiner = match self.operator {
            BooleanOperator::And => " AND ",
            BooleanOperator::Or => " OR ",
        };
        let parts: Vec<String> = self.terms.iter().map(|t| format!("{}*", quote(t))).collect();
        Some(parts.join(joiner))
    }
}

/// A full-text hit. `rank` follows FTS5 bm25: lower (more negative) is better.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub entity: Entity,
    pub rank: f64,
}

/// A keyword-index hit aggregated per entity.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub entity: Entity,
    /// Sum of the weights of all matched keyword rows.
    pub weight_sum: f64,
    /// Number of distinct query keywords matched.
    pub matched_keywords: usize,
}

impl KeywordHit {
    /// `Σweight × (1 + 0.1 × distinct matches)`.
    pub fn score(&self) -> f64 {
        self.weight_sum * (1.0 + 0.1 * self.matched_keywords as f64)
    }
}

/// Abstract storage backend for Code Context.
///
/// All operations are async (via `async-trait`). In-memory implementations
/// return immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_file_entity`](Store::find_file_entity) | Look up the file entity for a path |
/// | [`insert_entity`](Store::insert_entity) / [`update_entity`](Store::update_entity) | Persist an entity |
/// | [`delete_descendants`](Store::delete_descendants) | Drop a subtree below an entity |
/// | [`replace_keywords`](Store::replace_keywords) | Rewrite an entity's keyword rows |
/// | [`upsert_relationship`](Store::upsert_relationship) | Insert or reinforce an edge |
/// | [`full_text_search`](Store::full_text_search) | FTS over name and content |
/// | [`keyword_search`](Store::keyword_search) | Lookup in the keyword index |
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_file_entity(&self, file_path: &str) -> Result<Option<Entity>>;

    async fn insert_entity(&self, entity: &Entity) -> Result<()>;

    /// Overwrite every column of an existing entity.
    async fn update_entity(&self, entity: &Entity) -> Result<()>;

    async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>>;

    /// Direct children of an entity.
    async fn children_of(&self, entity_id: &str) -> Result<Vec<Entity>>;

    /// Delete every descendant of `entity_id` (not the entity itself), with
    /// their keyword and relationship rows. Returns the number of entities
    /// removed.
    async fn delete_descendants(&self, entity_id: &str) -> Result<u64>;

    /// Delete an entity and its whole subtree.
    async fn delete_entity(&self, entity_id: &str) -> Result<u64>;

    /// Entities with exactly this name, optionally of one type.
    async fn find_entities_by_name(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>>;

    /// Replace all keyword rows of an entity.
    async fn replace_keywords(&self, entity_id: &str, keywords: &[KeywordEntry]) -> Result<()>;

    /// Insert a relationship, or reinforce the stored one with the same
    /// `(source, target, type)`. Returns the stored row.
    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<Relationship>;

    async fn delete_outgoing_relationships(&self, entity_id: &str) -> Result<u64>;

    /// Relationships where the entity is source or target.
    async fn relationships_for(&self, entity_id: &str) -> Result<Vec<Relationship>>;

    async fn full_text_search(&self, query: &FtsQuery) -> Result<Vec<FtsHit>>;

    /// Entities with keyword rows equal to any of `keywords`, best first.
    async fn keyword_search(&self, keywords: &[String], limit: i64) -> Result<Vec<KeywordHit>>;

    /// Set `last_accessed_at` on the given entities.
    async fn touch_entities(&self, entity_ids: &[String], at: i64) -> Result<()>;

    /// Multiply `importance_score` by `factor` for entities last accessed
    /// before `accessed_before`. Returns the number of entities updated.
    async fn decay_importance(&self, factor: f64, accessed_before: i64) -> Result<u64>;

    async fn stats(&self) -> Result<StoreStats>;
}
