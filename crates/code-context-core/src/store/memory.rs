//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Full-text search is
//! emulated with the crate's own tokenizer and stemmer, applied to both the
//! content and the query: a term matches when any stemmed token of the
//! entity's name, content or summary starts with the stemmed term.
//! Proximity queries degrade to requiring every term.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{FtsHit, FtsQuery, KeywordHit, Store};
use crate::keywords::stem;
use crate::language::Language;
use crate::models::{Entity, EntityType, KeywordEntry, Relationship, StoreStats};
use crate::search::BooleanOperator;
use crate::tokenize::tokenize;

/// In-memory store for tests.
pub struct InMemoryStore {
    entities: RwLock<HashMap<String, Entity>>,
    keywords: RwLock<Vec<KeywordEntry>>,
    relationships: RwLock<Vec<Relationship>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            keywords: RwLock::new(Vec::new()),
            relationships: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    /// Ids of every descendant of `root`, excluding `root`.
    fn subtree(entities: &HashMap<String, Entity>, root: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        let mut frontier = vec![root.to_string()];
        while let Some(current) = frontier.pop() {
            for e in entities.values() {
                if e.parent_entity_id.as_deref() == Some(current.as_str())
                    && found.insert(e.entity_id.clone())
                {
                    frontier.push(e.entity_id.clone());
                }
            }
        }
        found
    }

    fn remove_all(&self, ids: &HashSet<String>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut entities = write(&self.entities)?;
        let before = entities.len();
        entities.retain(|id, _| !ids.contains(id));
        let removed = (before - entities.len()) as u64;
        drop(entities);

        write(&self.keywords)?.retain(|k| !ids.contains(&k.entity_id));
        write(&self.relationships)?.retain(|r| {
            !ids.contains(&r.source_entity_id)
                && !r
                    .target_entity_id
                    .as_ref()
                    .is_some_and(|t| ids.contains(t))
        });
        Ok(removed)
    }
}

fn fts_stems(entity: &Entity) -> BTreeSet<String> {
    let text = format!(
        "{} {} {}",
        entity.name,
        entity.raw_content,
        entity.summary.as_deref().unwrap_or("")
    );
    tokenize(&text, Language::Text)
        .iter()
        .map(|t| stem(t))
        .collect()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_file_entity(&self, file_path: &str) -> Result<Option<Entity>> {
        let entities = read(&self.entities)?;
        Ok(entities
            .values()
            .find(|e| e.entity_type == EntityType::File && e.file_path == file_path)
            .cloned())
    }

    async fn insert_entity(&self, entity: &Entity) -> Result<()> {
        let mut entities = write(&self.entities)?;
        if entities.contains_key(&entity.entity_id) {
            return Err(anyhow!("duplicate entity id {}", entity.entity_id));
        }
        entities.insert(entity.entity_id.clone(), entity.clone());
        Ok(())
    }

    async fn update_entity(&self, entity: &Entity) -> Result<()> {
        let mut entities = write(&self.entities)?;
        match entities.get_mut(&entity.entity_id) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(())
            }
            None => Err(anyhow!("no entity with id {}", entity.entity_id)),
        }
    }

    async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        Ok(read(&self.entities)?.get(entity_id).cloned())
    }

    async fn children_of(&self, entity_id: &str) -> Result<Vec<Entity>> {
        let entities = read(&self.entities)?;
        let mut children: Vec<Entity> = entities
            .values()
            .filter(|e| e.parent_entity_id.as_deref() == Some(entity_id))
            .cloned()
            .collect();
        children.sort_by_key(|e| (e.start_line, e.end_line));
        Ok(children)
    }

    async fn delete_descendants(&self, entity_id: &str) -> Result<u64> {
        let ids = Self::subtree(&*read(&self.entities)?, entity_id);
        self.remove_all(&ids)
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<u64> {
        let mut ids = Self::subtree(&*read(&self.entities)?, entity_id);
        ids.insert(entity_id.to_string());
        self.remove_all(&ids)
    }

    async fn find_entities_by_name(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>> {
        let entities = read(&self.entities)?;
        let mut found: Vec<Entity> = entities
            .values()
            .filter(|e| e.name == name && entity_type.map_or(true, |t| e.entity_type == t))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.file_path.cmp(&b.file_path).then(a.start_line.cmp(&b.start_line)));
        Ok(found)
    }

    async fn replace_keywords(&self, entity_id: &str, keywords: &[KeywordEntry]) -> Result<()> {
        let mut stored = write(&self.keywords)?;
        stored.retain(|k| k.entity_id != entity_id);
        for kw in keywords {
            let duplicate = stored.iter().any(|k| {
                k.entity_id == kw.entity_id
                    && k.keyword == kw.keyword
                    && k.keyword_type == kw.keyword_type
            });
            if !duplicate {
                stored.push(kw.clone());
            }
        }
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<Relationship> {
        let mut stored = write(&self.relationships)?;
        if let Some(existing) = stored.iter_mut().find(|r| {
            r.source_entity_id == relationship.source_entity_id
                && r.target_entity_id == relationship.target_entity_id
                && r.relationship_type == relationship.relationship_type
        }) {
            existing.reinforce(relationship);
            return Ok(existing.clone());
        }
        stored.push(relationship.clone());
        Ok(relationship.clone())
    }

    async fn delete_outgoing_relationships(&self, entity_id: &str) -> Result<u64> {
        let mut stored = write(&self.relationships)?;
        let before = stored.len();
        stored.retain(|r| r.source_entity_id != entity_id);
        Ok((before - stored.len()) as u64)
    }

    async fn relationships_for(&self, entity_id: &str) -> Result<Vec<Relationship>> {
        let stored = read(&self.relationships)?;
        Ok(stored
            .iter()
            .filter(|r| {
                r.source_entity_id == entity_id
                    || r.target_entity_id.as_deref() == Some(entity_id)
            })
            .cloned()
            .collect())
    }

    async fn full_text_search(&self, query: &FtsQuery) -> Result<Vec<FtsHit>> {
        let entities = read(&self.entities)?;
        let phrase = query.raw_terms.join(" ").to_lowercase();
        let terms: Vec<String> = query.terms.iter().map(|t| stem(t)).collect();
        let mut hits: Vec<FtsHit> = Vec::new();

        for entity in entities.values() {
            let matched: usize = if query.exact {
                let haystack = format!("{} {}", entity.name, entity.raw_content).to_lowercase();
                if phrase.trim().is_empty() || !haystack.contains(phrase.trim()) {
                    continue;
                }
                1
            } else {
                let stems = fts_stems(entity);
                let per_term: Vec<usize> = terms
                    .iter()
                    .map(|t| stems.iter().filter(|s| s.starts_with(t.as_str())).count())
                    .collect();
                let all = per_term.iter().all(|&n| n > 0);
                let any = per_term.iter().any(|&n| n > 0);
                let require_all =
                    query.operator == BooleanOperator::And || query.proximity.is_some();
                if (require_all && !all) || !any {
                    continue;
                }
                per_term.iter().sum()
            };
            hits.push(FtsHit {
                entity: entity.clone(),
                rank: -(matched as f64),
            });
        }

        hits.sort_by(|a, b| {
            a.rank
                .total_cmp(&b.rank)
                .then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
        });
        hits.truncate(query.limit.max(0) as usize);
        Ok(hits)
    }

    async fn keyword_search(&self, keywords: &[String], limit: i64) -> Result<Vec<KeywordHit>> {
        let wanted: HashSet<&str> = keywords.iter().map(String::as_str).collect();
        let mut per_entity: HashMap<String, (f64, HashSet<String>)> = HashMap::new();
        for kw in read(&self.keywords)?.iter() {
            if wanted.contains(kw.keyword.as_str()) {
                let slot = per_entity
                    .entry(kw.entity_id.clone())
                    .or_insert_with(|| (0.0, HashSet::new()));
                slot.0 += kw.weight;
                slot.1.insert(kw.keyword.clone());
            }
        }

        let entities = read(&self.entities)?;
        let mut hits: Vec<KeywordHit> = per_entity
            .into_iter()
            .filter_map(|(id, (weight_sum, matched))| {
                entities.get(&id).map(|entity| KeywordHit {
                    entity: entity.clone(),
                    weight_sum,
                    matched_keywords: matched.len(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score()
                .total_cmp(&a.score())
                .then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
        });
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn touch_entities(&self, entity_ids: &[String], at: i64) -> Result<()> {
        let mut entities = write(&self.entities)?;
        for id in entity_ids {
            if let Some(e) = entities.get_mut(id) {
                e.last_accessed_at = at;
            }
        }
        Ok(())
    }

    async fn decay_importance(&self, factor: f64, accessed_before: i64) -> Result<u64> {
        let mut entities = write(&self.entities)?;
        let mut updated = 0;
        for e in entities.values_mut() {
            if e.last_accessed_at < accessed_before {
                e.importance_score *= factor;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entities = read(&self.entities)?;
        let mut by_type: HashMap<EntityType, i64> = HashMap::new();
        for e in entities.values() {
            *by_type.entry(e.entity_type).or_default() += 1;
        }
        let mut entities_by_type: Vec<(String, i64)> = by_type
            .into_iter()
            .map(|(t, n)| (t.as_str().to_string(), n))
            .collect();
        entities_by_type.sort();
        Ok(StoreStats {
            entities_by_type,
            total_entities: entities.len() as i64,
            total_keywords: read(&self.keywords)?.len() as i64,
            total_relationships: read(&self.relationships)?.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeywordType, RelationshipType};
    use pretty_assertions::assert_eq;

    fn child(parent: &Entity, name: &str) -> Entity {
        let mut e = Entity::new(&parent.file_path, EntityType::Function, name, name, "rust");
        e.parent_entity_id = Some(parent.entity_id.clone());
        e
    }

    #[tokio::test]
    async fn test_delete_descendants_cascades() {
        let store = InMemoryStore::new();
        let file = Entity::new("a.rs", EntityType::File, "a.rs", "fn x() {}", "rust");
        let outer = child(&file, "outer");
        let inner = child(&outer, "inner");
        for e in [&file, &outer, &inner] {
            store.insert_entity(e).await.unwrap();
        }
        store
            .replace_keywords(
                &inner.entity_id,
                &[KeywordEntry {
                    entity_id: inner.entity_id.clone(),
                    keyword: "inner".into(),
                    term_frequency: 1,
                    weight: 1.0,
                    keyword_type: KeywordType::Name,
                }],
            )
            .await
            .unwrap();
        store
            .upsert_relationship(&Relationship::new(
                &outer.entity_id,
                Some(inner.entity_id.as_str()),
                RelationshipType::Calls,
                1.0,
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(store.delete_descendants(&file.entity_id).await.unwrap(), 2);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entities, 1);
        assert_eq!(stats.total_keywords, 0);
        assert_eq!(stats.total_relationships, 0);
        assert!(store.get_entity(&file.entity_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_relationship_reinforces() {
        let store = InMemoryStore::new();
        let rel = Relationship::new("a", Some("b"), RelationshipType::Calls, 1.0, serde_json::json!({}));
        store.upsert_relationship(&rel).await.unwrap();
        let again = Relationship::new("a", Some("b"), RelationshipType::Calls, 1.0, serde_json::json!({}));
        let stored = store.upsert_relationship(&again).await.unwrap();
        assert_eq!(stored.relationship_id, rel.relationship_id);
        assert!((stored.weight - 2.0).abs() < 1e-9);
        assert_eq!(store.relationships_for("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fts_prefix_matches_stemmed_content() {
        let store = InMemoryStore::new();
        let e = Entity::new("c.js", EntityType::Function, "warm", "function warm() { caching(); }", "javascript");
        store.insert_entity(&e).await.unwrap();
        let hits = store
            .full_text_search(&FtsQuery {
                terms: vec!["cache".into()],
                raw_terms: vec!["cache".into()],
                operator: BooleanOperator::Or,
                exact: false,
                proximity: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].rank < 0.0);
    }

    #[tokio::test]
    async fn test_decay_only_touches_stale_entities() {
        let store = InMemoryStore::new();
        let mut old = Entity::new("a.rs", EntityType::File, "a.rs", "", "rust");
        old.last_accessed_at = 100;
        let mut fresh = Entity::new("b.rs", EntityType::File, "b.rs", "", "rust");
        fresh.last_accessed_at = 1_000;
        store.insert_entity(&old).await.unwrap();
        store.insert_entity(&fresh).await.unwrap();

        assert_eq!(store.decay_importance(0.5, 500).await.unwrap(), 1);
        let old = store.get_entity(&old.entity_id).await.unwrap().unwrap();
        let fresh = store.get_entity(&fresh.entity_id).await.unwrap().unwrap();
        assert!((old.importance_score - 0.5).abs() < 1e-9);
        assert!((fresh.importance_score - 1.0).abs() < 1e-9);
    }
}
