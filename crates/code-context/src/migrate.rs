//! Schema setup.
//!
//! Every statement is idempotent (`IF NOT EXISTS`) and runs in order. A
//! failing statement is logged and skipped so the remaining ones still run.
//!
//! | Object | Kind |
//! |--------|------|
//! | `code_entities` | entities (files and their constructs) |
//! | `entity_keywords` | inverted keyword index |
//! | `code_relationships` | typed edges between entities |
//! | `code_entities_fts` | FTS5 over name and searchable content |
//! | `code_entities_ai/au/ad` | triggers keeping the FTS table in sync |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[(&str, &str)] = &[
    (
        "code_entities",
        r#"
        CREATE TABLE IF NOT EXISTS code_entities (
            entity_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            name TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            raw_content TEXT NOT NULL,
            summary TEXT,
            language TEXT NOT NULL,
            parent_entity_id TEXT,
            importance_score REAL NOT NULL DEFAULT 1.0,
            custom_metadata TEXT NOT NULL DEFAULT '{}',
            last_modified_at INTEGER NOT NULL,
            last_accessed_at INTEGER NOT NULL,
            FOREIGN KEY (parent_entity_id) REFERENCES code_entities(entity_id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "entity_keywords",
        r#"
        CREATE TABLE IF NOT EXISTS entity_keywords (
            entity_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            term_frequency INTEGER NOT NULL DEFAULT 1,
            weight REAL NOT NULL,
            keyword_type TEXT NOT NULL,
            UNIQUE(entity_id, keyword, keyword_type),
            FOREIGN KEY (entity_id) REFERENCES code_entities(entity_id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "code_relationships",
        r#"
        CREATE TABLE IF NOT EXISTS code_relationships (
            relationship_id TEXT PRIMARY KEY,
            source_entity_id TEXT NOT NULL,
            target_entity_id TEXT,
            relationship_type TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            UNIQUE(source_entity_id, target_entity_id, relationship_type),
            FOREIGN KEY (source_entity_id) REFERENCES code_entities(entity_id) ON DELETE CASCADE,
            FOREIGN KEY (target_entity_id) REFERENCES code_entities(entity_id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "code_entities_fts",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS code_entities_fts USING fts5(
            entity_id UNINDEXED,
            name,
            searchable_content,
            tokenize = 'porter unicode61'
        )
        "#,
    ),
    (
        "code_entities_ai",
        r#"
        CREATE TRIGGER IF NOT EXISTS code_entities_ai AFTER INSERT ON code_entities BEGIN
            INSERT INTO code_entities_fts (entity_id, name, searchable_content)
            VALUES (new.entity_id, new.name, new.raw_content || ' ' || COALESCE(new.summary, ''));
        END
        "#,
    ),
    (
        "code_entities_au",
        r#"
        CREATE TRIGGER IF NOT EXISTS code_entities_au
        AFTER UPDATE OF name, raw_content, summary ON code_entities BEGIN
            DELETE FROM code_entities_fts WHERE entity_id = old.entity_id;
            INSERT INTO code_entities_fts (entity_id, name, searchable_content)
            VALUES (new.entity_id, new.name, new.raw_content || ' ' || COALESCE(new.summary, ''));
        END
        "#,
    ),
    (
        "code_entities_ad",
        r#"
        CREATE TRIGGER IF NOT EXISTS code_entities_ad AFTER DELETE ON code_entities BEGIN
            DELETE FROM code_entities_fts WHERE entity_id = old.entity_id;
        END
        "#,
    ),
    (
        "idx_code_entities_file_path",
        "CREATE INDEX IF NOT EXISTS idx_code_entities_file_path ON code_entities(file_path)",
    ),
    (
        "idx_code_entities_parent",
        "CREATE INDEX IF NOT EXISTS idx_code_entities_parent ON code_entities(parent_entity_id)",
    ),
    (
        "idx_code_entities_name",
        "CREATE INDEX IF NOT EXISTS idx_code_entities_name ON code_entities(name)",
    ),
    (
        "idx_entity_keywords_keyword",
        "CREATE INDEX IF NOT EXISTS idx_entity_keywords_keyword ON entity_keywords(keyword)",
    ),
    (
        "idx_code_relationships_target",
        "CREATE INDEX IF NOT EXISTS idx_code_relationships_target ON code_relationships(target_entity_id)",
    ),
];

/// Connect to the configured database and apply the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let failed = apply_schema(&pool).await;
    pool.close().await;
    if failed > 0 {
        tracing::warn!(failed, "schema setup finished with failed statements");
    }
    Ok(())
}

/// Apply every schema statement in order. Returns the number that failed.
pub async fn apply_schema(pool: &SqlitePool) -> usize {
    let mut failed = 0;
    for (object, statement) in SCHEMA {
        match sqlx::query(statement).execute(pool).await {
            Ok(_) => tracing::debug!(object, "schema object ready"),
            Err(e) => {
                tracing::warn!(object, error = %e, "schema statement failed");
                failed += 1;
            }
        }
    }
    failed
}
