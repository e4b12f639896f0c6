//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`crate::migrate`]: `code_entities`, `entity_keywords`,
//! `code_relationships` and the trigger-maintained `code_entities_fts`.
//!
//! Keyword and relationship rows are removed through `ON DELETE CASCADE`,
//! so deleting entities only has to touch `code_entities`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use code_context_core::models::{
    Entity, EntityType, KeywordEntry, Relationship, RelationshipType, StoreStats,
};
use code_context_core::store::{FtsHit, FtsQuery, KeywordHit, Store};

const ENTITY_COLUMNS: &str = "e.entity_id, e.file_path, e.entity_type, e.name, e.start_line, \
    e.end_line, e.content_hash, e.raw_content, e.summary, e.language, e.parent_entity_id, \
    e.importance_score, e.custom_metadata, e.last_modified_at, e.last_accessed_at";

/// Descendants of the bound entity id, excluding the entity itself.
const SUBTREE_CTE: &str = r#"
    WITH RECURSIVE subtree(id) AS (
        SELECT entity_id FROM code_entities WHERE parent_entity_id = ?
        UNION
        SELECT c.entity_id FROM code_entities c JOIN subtree s ON c.parent_entity_id = s.id
    )
"#;

/// Delete every descendant of `entity_id` and return how many there were.
///
/// Rows removed by the `parent_entity_id` cascade are not reported by
/// `rows_affected`, so the subtree is counted first.
async fn delete_subtree(tx: &mut Transaction<'_, Sqlite>, entity_id: &str) -> Result<u64> {
    let count: i64 = sqlx::query_scalar(&format!("{} SELECT COUNT(*) FROM subtree", SUBTREE_CTE))
        .bind(entity_id)
        .fetch_one(&mut **tx)
        .await?;
    sqlx::query(&format!(
        "{} DELETE FROM code_entities WHERE entity_id IN (SELECT id FROM subtree)",
        SUBTREE_CTE
    ))
    .bind(entity_id)
    .execute(&mut **tx)
    .await?;
    Ok(count as u64)
}

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_entity(row: &SqliteRow) -> Result<Entity> {
    let entity_id: String = row.get("entity_id");
    let entity_type: String = row.get("entity_type");
    let metadata: String = row.get("custom_metadata");
    Ok(Entity {
        custom_metadata: serde_json::from_str(&metadata)
            .with_context(|| format!("Bad custom_metadata on entity {}", entity_id))?,
        entity_id,
        file_path: row.get("file_path"),
        entity_type: entity_type.parse()?,
        name: row.get("name"),
        start_line: row.get("start_line"),
        end_line: row.get("end_line"),
        content_hash: row.get("content_hash"),
        raw_content: row.get("raw_content"),
        summary: row.get("summary"),
        language: row.get("language"),
        parent_entity_id: row.get("parent_entity_id"),
        importance_score: row.get("importance_score"),
        last_modified_at: row.get("last_modified_at"),
        last_accessed_at: row.get("last_accessed_at"),
    })
}

fn row_to_relationship(row: &SqliteRow) -> Result<Relationship> {
    let relationship_type: String = row.get("relationship_type");
    let metadata: String = row.get("metadata");
    Ok(Relationship {
        relationship_id: row.get("relationship_id"),
        source_entity_id: row.get("source_entity_id"),
        target_entity_id: row.get("target_entity_id"),
        relationship_type: relationship_type.parse::<RelationshipType>()?,
        weight: row.get("weight"),
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.get("created_at"),
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_file_entity(&self, file_path: &str) -> Result<Option<Entity>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM code_entities e WHERE e.entity_type = 'file' AND e.file_path = ? LIMIT 1",
            ENTITY_COLUMNS
        ))
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_entity).transpose()
    }

    async fn insert_entity(&self, entity: &Entity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO code_entities (entity_id, file_path, entity_type, name, start_line,
                                       end_line, content_hash, raw_content, summary, language,
                                       parent_entity_id, importance_score, custom_metadata,
                                       last_modified_at, last_accessed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entity.entity_id)
        .bind(&entity.file_path)
        .bind(entity.entity_type.as_str())
        .bind(&entity.name)
        .bind(entity.start_line)
        .bind(entity.end_line)
        .bind(&entity.content_hash)
        .bind(&entity.raw_content)
        .bind(&entity.summary)
        .bind(&entity.language)
        .bind(&entity.parent_entity_id)
        .bind(entity.importance_score)
        .bind(entity.custom_metadata.to_string())
        .bind(entity.last_modified_at)
        .bind(entity.last_accessed_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert entity {}", entity.entity_id))?;
        Ok(())
    }

    async fn update_entity(&self, entity: &Entity) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE code_entities SET
                file_path = ?, entity_type = ?, name = ?, start_line = ?, end_line = ?,
                content_hash = ?, raw_content = ?, summary = ?, language = ?,
                parent_entity_id = ?, importance_score = ?, custom_metadata = ?,
                last_modified_at = ?, last_accessed_at = ?
            WHERE entity_id = ?
            "#,
        )
        .bind(&entity.file_path)
        .bind(entity.entity_type.as_str())
        .bind(&entity.name)
        .bind(entity.start_line)
        .bind(entity.end_line)
        .bind(&entity.content_hash)
        .bind(&entity.raw_content)
        .bind(&entity.summary)
        .bind(&entity.language)
        .bind(&entity.parent_entity_id)
        .bind(entity.importance_score)
        .bind(entity.custom_metadata.to_string())
        .bind(entity.last_modified_at)
        .bind(entity.last_accessed_at)
        .bind(&entity.entity_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("no entity with id {}", entity.entity_id);
        }
        Ok(())
    }

    async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM code_entities e WHERE e.entity_id = ?",
            ENTITY_COLUMNS
        ))
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_entity).transpose()
    }

    async fn children_of(&self, entity_id: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM code_entities e WHERE e.parent_entity_id = ? \
             ORDER BY e.start_line, e.end_line",
            ENTITY_COLUMNS
        ))
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entity).collect()
    }

    async fn delete_descendants(&self, entity_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_subtree(&mut tx, entity_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let descendants = delete_subtree(&mut tx, entity_id).await?;
        let own = sqlx::query("DELETE FROM code_entities WHERE entity_id = ?")
            .bind(entity_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(descendants + own)
    }

    async fn find_entities_by_name(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>> {
        let type_filter = entity_type.map(EntityType::as_str);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM code_entities e WHERE e.name = ? AND (? IS NULL OR e.entity_type = ?) \
             ORDER BY e.file_path, e.start_line",
            ENTITY_COLUMNS
        ))
        .bind(name)
        .bind(type_filter)
        .bind(type_filter)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entity).collect()
    }

    async fn replace_keywords(&self, entity_id: &str, keywords: &[KeywordEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entity_keywords WHERE entity_id = ?")
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;

        for kw in keywords {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO entity_keywords
                    (entity_id, keyword, term_frequency, weight, keyword_type)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&kw.entity_id)
            .bind(&kw.keyword)
            .bind(kw.term_frequency)
            .bind(kw.weight)
            .bind(kw.keyword_type.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<Relationship> {
        let mut tx = self.pool.begin().await?;

        // `IS` so that a NULL target still identifies one row.
        let existing = sqlx::query(
            r#"
            SELECT relationship_id, source_entity_id, target_entity_id, relationship_type,
                   weight, metadata, created_at
            FROM code_relationships
            WHERE source_entity_id = ? AND target_entity_id IS ? AND relationship_type = ?
            "#,
        )
        .bind(&relationship.source_entity_id)
        .bind(&relationship.target_entity_id)
        .bind(relationship.relationship_type.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let stored = match existing {
            Some(row) => {
                let mut stored = row_to_relationship(&row)?;
                stored.reinforce(relationship);
                sqlx::query(
                    "UPDATE code_relationships SET weight = ?, metadata = ? WHERE relationship_id = ?",
                )
                .bind(stored.weight)
                .bind(stored.metadata.to_string())
                .bind(&stored.relationship_id)
                .execute(&mut *tx)
                .await?;
                stored
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO code_relationships (relationship_id, source_entity_id,
                        target_entity_id, relationship_type, weight, metadata, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&relationship.relationship_id)
                .bind(&relationship.source_entity_id)
                .bind(&relationship.target_entity_id)
                .bind(relationship.relationship_type.as_str())
                .bind(relationship.weight)
                .bind(relationship.metadata.to_string())
                .bind(relationship.created_at)
                .execute(&mut *tx)
                .await?;
                relationship.clone()
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_outgoing_relationships(&self, entity_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM code_relationships WHERE source_entity_id = ?")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn relationships_for(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            r#"
            SELECT relationship_id, source_entity_id, target_entity_id, relationship_type,
                   weight, metadata, created_at
            FROM code_relationships
            WHERE source_entity_id = ? OR target_entity_id = ?
            ORDER BY created_at, relationship_id
            "#,
        )
        .bind(entity_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_relationship).collect()
    }

    async fn full_text_search(&self, query: &FtsQuery) -> Result<Vec<FtsHit>> {
        let Some(expression) = query.to_match_expression() else {
            return Ok(Vec::new());
        };

        // Column weights: entity_id (unindexed), name, searchable_content.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, bm25(code_entities_fts, 0.0, 2.0, 1.0) AS score
            FROM code_entities_fts
            JOIN code_entities e ON e.entity_id = code_entities_fts.entity_id
            WHERE code_entities_fts MATCH ?
            ORDER BY score, e.entity_id
            LIMIT ?
            "#,
            ENTITY_COLUMNS
        ))
        .bind(&expression)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Full-text query failed: {}", expression))?;

        rows.iter()
            .map(|row| {
                Ok(FtsHit {
                    entity: row_to_entity(row)?,
                    rank: row.get("score"),
                })
            })
            .collect()
    }

    async fn keyword_search(&self, keywords: &[String], limit: i64) -> Result<Vec<KeywordHit>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}, agg.weight_sum, agg.matched
            FROM (
                SELECT entity_id,
                       SUM(weight) AS weight_sum,
                       COUNT(DISTINCT keyword) AS matched
                FROM entity_keywords
                WHERE keyword IN ({})
                GROUP BY entity_id
            ) agg
            JOIN code_entities e ON e.entity_id = agg.entity_id
            ORDER BY agg.weight_sum * (1.0 + 0.1 * agg.matched) DESC, e.entity_id
            LIMIT ?
            "#,
            ENTITY_COLUMNS,
            placeholders(keywords.len())
        );

        let mut q = sqlx::query(&sql);
        for kw in keywords {
            q = q.bind(kw);
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let matched: i64 = row.get("matched");
                Ok(KeywordHit {
                    entity: row_to_entity(row)?,
                    weight_sum: row.get("weight_sum"),
                    matched_keywords: matched as usize,
                })
            })
            .collect()
    }

    async fn touch_entities(&self, entity_ids: &[String], at: i64) -> Result<()> {
        if entity_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE code_entities SET last_accessed_at = ? WHERE entity_id IN ({})",
            placeholders(entity_ids.len())
        );
        let mut q = sqlx::query(&sql).bind(at);
        for id in entity_ids {
            q = q.bind(id);
        }
        q.execute(&self.pool).await?;
        Ok(())
    }

    async fn decay_importance(&self, factor: f64, accessed_before: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE code_entities SET importance_score = importance_score * ? WHERE last_accessed_at < ?",
        )
        .bind(factor)
        .bind(accessed_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query(
            "SELECT entity_type, COUNT(*) AS n FROM code_entities GROUP BY entity_type ORDER BY entity_type",
        )
        .fetch_all(&self.pool)
        .await?;
        let entities_by_type: Vec<(String, i64)> = rows
            .iter()
            .map(|r| (r.get::<String, _>("entity_type"), r.get::<i64, _>("n")))
            .collect();

        let total_entities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM code_entities")
            .fetch_one(&self.pool)
            .await?;
        let total_keywords: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entity_keywords")
            .fetch_one(&self.pool)
            .await?;
        let total_relationships: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM code_relationships")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            entities_by_type,
            total_entities,
            total_keywords,
            total_relationships,
        })
    }
}
