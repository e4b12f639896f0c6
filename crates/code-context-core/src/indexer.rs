//! Incremental indexing pipeline.
//!
//! Indexing a file is a fixed sequence of store calls:
//!
//! ```text
//! content ──hash──▶ unchanged? ──yes──▶ done
//!                       │ no
//!                       ▼
//!        update (or create) file entity, drop its subtree
//!                       │
//!                       ▼
//!    extract ──▶ persist entities ──▶ keywords ──▶ resolve + upsert edges
//!                                                          │
//!                                                          ▼
//!                                                 commit content hash
//! ```
//!
//! The file entity carries an empty hash until the last step, so a run that
//! fails partway is redone in full on the next call.
//!
//! Nothing here locks across the sequence. Callers must not index the same
//! path concurrently.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::extract::{extract_entities, Extraction, RelationTarget, Strategy};
use crate::keywords::{extract_keywords, generate_ngrams, stem};
use crate::language::Language;
use crate::models::{
    content_hash, Entity, EntityType, KeywordEntry, KeywordType, Relationship, RelationshipType,
};
use crate::store::Store;
use crate::tokenize::{token_stream, tokenize, with_identifier_parts};

/// Phrase keywords stored per entity.
const PHRASES_PER_ENTITY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    /// Top-scoring `term` keywords stored per entity.
    pub keywords_per_entity: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            keywords_per_entity: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Created,
    Updated,
    Unchanged,
}

impl IndexOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexOutcome::Created => "created",
            IndexOutcome::Updated => "updated",
            IndexOutcome::Unchanged => "unchanged",
        }
    }
}

/// What one `index_file` call did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub file_entity_id: String,
    pub outcome: IndexOutcome,
    /// Entities extracted below the file entity.
    pub entities: usize,
    pub keywords: usize,
    pub relationships: usize,
    /// Symbolic targets that matched nothing and were dropped.
    pub unresolved: usize,
    /// `None` when the file was unchanged and nothing was extracted.
    pub strategy: Option<Strategy>,
}

impl IndexReport {
    fn unchanged(file_entity_id: String) -> Self {
        Self {
            file_entity_id,
            outcome: IndexOutcome::Unchanged,
            entities: 0,
            keywords: 0,
            relationships: 0,
            unresolved: 0,
            strategy: None,
        }
    }
}

/// Indexing pipeline bound to a store handle.
pub struct Indexer<'a, S: Store> {
    store: &'a S,
    options: IndexOptions,
}

impl<'a, S: Store> Indexer<'a, S> {
    pub fn new(store: &'a S, options: IndexOptions) -> Self {
        Self { store, options }
    }

    /// Index `content` as the current body of `path`.
    ///
    /// Unchanged content (same SHA-256) is a no-op. Changed content replaces
    /// the file's whole subtree.
    pub async fn index_file(
        &self,
        path: &str,
        content: &str,
        language_hint: Option<&str>,
    ) -> Result<IndexReport> {
        let language = Language::detect(language_hint, path);
        let hash = content_hash(content);
        let now = chrono::Utc::now().timestamp();

        let (mut file, outcome) = match self.store.find_file_entity(path).await? {
            Some(existing) if existing.content_hash == hash => {
                tracing::debug!(path, "content unchanged, skipping");
                return Ok(IndexReport::unchanged(existing.entity_id));
            }
            Some(mut existing) => {
                existing.raw_content = content.to_string();
                existing.content_hash = String::new();
                existing.language = language.name().to_string();
                existing.end_line = line_count(content);
                existing.last_modified_at = now;
                self.store.update_entity(&existing).await?;
                let removed = self.store.delete_descendants(&existing.entity_id).await?;
                self.store.replace_keywords(&existing.entity_id, &[]).await?;
                self.store
                    .delete_outgoing_relationships(&existing.entity_id)
                    .await?;
                tracing::debug!(path, removed, "content changed, subtree dropped");
                (existing, IndexOutcome::Updated)
            }
            None => {
                let mut file = Entity::new(
                    path,
                    EntityType::File,
                    &file_name(path),
                    content,
                    language.name(),
                );
                file.content_hash = String::new();
                file.last_modified_at = now;
                self.store.insert_entity(&file).await?;
                (file, IndexOutcome::Created)
            }
        };

        let extraction = extract_entities(content, language);
        let entities = self.persist_entities(&file, &extraction, language, now).await?;

        let mut keywords = self.store_keywords(&file, language).await?;
        for entity in &entities {
            keywords += self.store_keywords(entity, language).await?;
        }

        let (relationships, unresolved, failed) = self
            .store_relationships(&file, &entities, &extraction, language)
            .await?;

        if failed == 0 {
            file.content_hash = hash;
            self.store.update_entity(&file).await?;
        } else {
            tracing::warn!(path, failed, "relationships not stored, file left pending");
        }

        let report = IndexReport {
            file_entity_id: file.entity_id.clone(),
            outcome,
            entities: entities.len(),
            keywords,
            relationships,
            unresolved,
            strategy: Some(extraction.strategy),
        };
        tracing::info!(
            path,
            outcome = report.outcome.as_str(),
            strategy = extraction.strategy.as_str(),
            entities = report.entities,
            keywords = report.keywords,
            relationships = report.relationships,
            unresolved = report.unresolved,
            "indexed file"
        );
        Ok(report)
    }

    /// Delete a file entity and everything below it.
    ///
    /// Returns `false` when the path was never indexed.
    pub async fn remove_file(&self, path: &str) -> Result<bool> {
        let Some(file) = self.store.find_file_entity(path).await? else {
            return Ok(false);
        };
        let removed = self.store.delete_entity(&file.entity_id).await?;
        tracing::info!(path, removed, "removed file");
        Ok(true)
    }

    async fn persist_entities(
        &self,
        file: &Entity,
        extraction: &Extraction,
        language: Language,
        now: i64,
    ) -> Result<Vec<Entity>> {
        let mut persisted: Vec<Entity> = Vec::with_capacity(extraction.entities.len());
        for extracted in &extraction.entities {
            let parent_id = extracted
                .parent
                .and_then(|p| persisted.get(p))
                .map(|p| p.entity_id.clone())
                .unwrap_or_else(|| file.entity_id.clone());
            let mut entity = Entity::new(
                &file.file_path,
                extracted.entity_type,
                &extracted.name,
                &extracted.raw_content,
                language.name(),
            );
            entity.start_line = extracted.start_line;
            entity.end_line = extracted.end_line;
            entity.parent_entity_id = Some(parent_id);
            entity.custom_metadata = extracted.metadata.clone();
            entity.last_modified_at = now;
            self.store.insert_entity(&entity).await?;
            persisted.push(entity);
        }
        Ok(persisted)
    }

    async fn store_keywords(&self, entity: &Entity, language: Language) -> Result<usize> {
        let rows = build_keywords(entity, language, self.options.keywords_per_entity);
        self.store.replace_keywords(&entity.entity_id, &rows).await?;
        Ok(rows.len())
    }

    /// Resolve and upsert every non-`contains` edge. Returns
    /// `(stored, unresolved, failed)`.
    async fn store_relationships(
        &self,
        file: &Entity,
        entities: &[Entity],
        extraction: &Extraction,
        language: Language,
    ) -> Result<(usize, usize, usize)> {
        let mut stored = 0;
        let mut unresolved = 0;
        let mut failed = 0;
        let mut cache: HashMap<(String, Option<EntityType>), Option<String>> = HashMap::new();

        for rel in &extraction.relationships {
            if rel.relationship_type == RelationshipType::Contains {
                continue;
            }
            let source_id = match rel.source {
                None => file.entity_id.clone(),
                Some(i) => match entities.get(i) {
                    Some(e) => e.entity_id.clone(),
                    None => continue,
                },
            };
            let target_id = match &rel.target {
                RelationTarget::Local(i) => entities.get(*i).map(|e| e.entity_id.clone()),
                RelationTarget::Symbol { name, entity_type } => {
                    let key = (name.clone(), *entity_type);
                    match cache.get(&key) {
                        Some(hit) => hit.clone(),
                        None => {
                            let hit = self
                                .resolve_symbol(name, *entity_type, file, entities, language)
                                .await?;
                            cache.insert(key, hit.clone());
                            hit
                        }
                    }
                }
            };
            let Some(target_id) = target_id else {
                unresolved += 1;
                continue;
            };

            let relationship = Relationship::new(
                &source_id,
                Some(target_id.as_str()),
                rel.relationship_type,
                1.0,
                rel.metadata.clone(),
            );
            match self.store.upsert_relationship(&relationship).await {
                Ok(_) => stored += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(
                        path = %file.file_path,
                        relationship_type = %rel.relationship_type,
                        "skipping relationship: {err:#}"
                    );
                }
            }
        }
        Ok((stored, unresolved, failed))
    }

    async fn resolve_symbol(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
        file: &Entity,
        local: &[Entity],
        language: Language,
    ) -> Result<Option<String>> {
        if entity_type == Some(EntityType::File) {
            return self.resolve_module(name, file, language).await;
        }
        let accepts = |e: &Entity| match entity_type {
            Some(t) => e.entity_type == t,
            None => !matches!(
                e.entity_type,
                EntityType::File | EntityType::Import | EntityType::Export | EntityType::CommentBlock
            ),
        };

        if let Some(hit) = local.iter().find(|e| e.name == name && accepts(*e)) {
            return Ok(Some(hit.entity_id.clone()));
        }
        let candidates = self.store.find_entities_by_name(name, entity_type).await?;
        Ok(candidates
            .into_iter()
            .find(|e| e.file_path != file.file_path && accepts(e))
            .map(|e| e.entity_id))
    }

    /// Match an import specifier to an indexed file by module stem.
    async fn resolve_module(
        &self,
        specifier: &str,
        file: &Entity,
        language: Language,
    ) -> Result<Option<String>> {
        let stem = module_stem(specifier);
        if stem.is_empty() {
            return Ok(None);
        }
        let mut names = vec![stem.clone()];
        names.extend(language.extensions().iter().map(|ext| format!("{stem}.{ext}")));

        let wanted = specifier
            .trim_start_matches("./")
            .trim_start_matches("../")
            .to_string();
        let mut fallback = None;
        for name in names {
            for candidate in self
                .store
                .find_entities_by_name(&name, Some(EntityType::File))
                .await?
            {
                if candidate.file_path == file.file_path {
                    continue;
                }
                if without_extension(&candidate.file_path).ends_with(without_extension(&wanted)) {
                    return Ok(Some(candidate.entity_id));
                }
                fallback.get_or_insert(candidate.entity_id);
            }
        }
        Ok(fallback)
    }
}

fn line_count(content: &str) -> i64 {
    content.lines().count().max(1) as i64
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

fn is_numeric(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn without_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((base, ext)) if !ext.contains('/') && !base.is_empty() => base,
        _ => path,
    }
}

/// Last path segment of an import specifier without its extension:
/// `./lib/loader.js` → `loader`, `os.path` → `path`, `crate::store` → `store`.
pub fn module_stem(specifier: &str) -> String {
    let segment = specifier
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(specifier);
    let segment = segment.rsplit("::").next().unwrap_or(segment);
    let known_ext = segment.rsplit_once('.').filter(|(_, ext)| {
        Language::from_extension(ext) != Language::Unknown || *ext == "json"
    });
    let segment = match known_ext {
        Some((base, _)) => base,
        None => segment.rsplit('.').next().unwrap_or(segment),
    };
    segment.trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>').to_string()
}

/// Keyword rows for one entity: scored `term`s, `name` parts and `phrase`
/// bigrams, stemmed and lowercased. `term` and `phrase` weights are
/// normalized so the entity's best keyword has weight 1.0.
pub fn build_keywords(entity: &Entity, language: Language, top_n: usize) -> Vec<KeywordEntry> {
    let stream = token_stream(&entity.raw_content, language);

    let mut rows: BTreeMap<(String, KeywordType), (i64, f64)> = BTreeMap::new();
    for kw in extract_keywords(&with_identifier_parts(&stream), top_n, language) {
        let slot = rows.entry((stem(&kw.keyword), KeywordType::Term)).or_insert((0, 0.0));
        slot.0 += kw.frequency as i64;
        slot.1 = slot.1.max(kw.score);
    }

    let mut phrases: BTreeMap<String, usize> = BTreeMap::new();
    for gram in generate_ngrams(&stream, 2) {
        if gram.split(' ').any(|w| w.chars().count() < 2 || is_numeric(w)) {
            continue;
        }
        *phrases.entry(gram).or_default() += 1;
    }
    let mut phrases: Vec<(String, usize)> = phrases.into_iter().collect();
    phrases.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (gram, frequency) in phrases.into_iter().take(PHRASES_PER_ENTITY) {
        let stemmed = gram.split(' ').map(stem).collect::<Vec<_>>().join(" ");
        let slot = rows.entry((stemmed, KeywordType::Phrase)).or_insert((0, 0.0));
        slot.0 += frequency as i64;
        slot.1 = slot.1.max(frequency as f64);
    }

    let best = rows.values().map(|(_, score)| *score).fold(0.0, f64::max);
    let mut out: Vec<KeywordEntry> = rows
        .into_iter()
        .map(|((keyword, keyword_type), (frequency, score))| KeywordEntry {
            entity_id: entity.entity_id.clone(),
            keyword,
            term_frequency: frequency,
            weight: if best > 0.0 { score / best } else { 1.0 },
            keyword_type,
        })
        .collect();

    for part in tokenize(&entity.name, Language::Text) {
        if part.chars().count() < 2 || is_numeric(&part) {
            continue;
        }
        let keyword = stem(&part);
        if out
            .iter()
            .any(|k| k.keyword == keyword && k.keyword_type == KeywordType::Name)
        {
            continue;
        }
        out.push(KeywordEntry {
            entity_id: entity.entity_id.clone(),
            keyword,
            term_frequency: 1,
            weight: 1.0,
            keyword_type: KeywordType::Name,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchSource, StoreStats};
    use crate::search::{SearchEngine, SearchOptions, SearchStrategy};
    use crate::store::memory::InMemoryStore;
    use crate::store::{FtsHit, FtsQuery, KeywordHit};
    use async_trait::async_trait;
    use pretty_assertions::{assert_eq, assert_ne};
    use std::sync::atomic::{AtomicBool, Ordering};

    const CACHE_JS: &str = "// LRU cache for rendered pages
class PageCache {
  constructor(limit) {
    this.limit = limit;
    this.items = new Map();
  }
  get(key) {
    return this.items.get(key);
  }
}

function warmCache(cache, keys) {
  for (const key of keys) {
    cache.get(key);
  }
}
";

    fn indexer(store: &InMemoryStore) -> Indexer<'_, InMemoryStore> {
        Indexer::new(store, IndexOptions::default())
    }

    #[tokio::test]
    async fn test_create_then_unchanged_is_idempotent() {
        let store = InMemoryStore::new();
        let idx = indexer(&store);

        let first = idx.index_file("src/cache.js", CACHE_JS, None).await.unwrap();
        assert_eq!(first.outcome, IndexOutcome::Created);
        assert_eq!(first.strategy, Some(Strategy::SyntaxTree));
        assert!(first.entities >= 4);
        let before = store.stats().await.unwrap();
        let hash = store
            .find_file_entity("src/cache.js")
            .await
            .unwrap()
            .unwrap()
            .content_hash;

        let second = idx.index_file("src/cache.js", CACHE_JS, None).await.unwrap();
        assert_eq!(second.outcome, IndexOutcome::Unchanged);
        assert_eq!(second.file_entity_id, first.file_entity_id);
        let after = store.stats().await.unwrap();
        assert_eq!(after.total_entities, before.total_entities);
        assert_eq!(after.total_keywords, before.total_keywords);
        let file = store.find_file_entity("src/cache.js").await.unwrap().unwrap();
        assert_eq!(file.content_hash, hash);
    }

    #[tokio::test]
    async fn test_indexed_file_is_found_by_fts() {
        let store = InMemoryStore::new();
        let report = indexer(&store)
            .index_file("src/cache.js", CACHE_JS, None)
            .await
            .unwrap();
        let opts = SearchOptions {
            strategy: SearchStrategy::Fts,
            ..Default::default()
        };
        let results = SearchEngine::new(&store)
            .search(&["cache".to_string()], &opts)
            .await
            .unwrap();
        let file_hit = results
            .iter()
            .find(|r| r.entity.entity_id == report.file_entity_id)
            .unwrap();
        assert!(file_hit.relevance_score > 0.0);
        assert_eq!(file_hit.match_source, MatchSource::Fts);
    }

    #[tokio::test]
    async fn test_changed_content_rebuilds_subtree() {
        let store = InMemoryStore::new();
        let idx = indexer(&store);
        idx.index_file("src/cache.js", CACHE_JS, None).await.unwrap();

        let replacement = "function evictAll(cache) {\n  cache.clear();\n}\n";
        let report = idx.index_file("src/cache.js", replacement, None).await.unwrap();
        assert_eq!(report.outcome, IndexOutcome::Updated);

        let file = store.find_file_entity("src/cache.js").await.unwrap().unwrap();
        assert_eq!(file.content_hash, content_hash(replacement));
        assert_eq!(file.raw_content, replacement);
        let children = store.children_of(&file.entity_id).await.unwrap();
        let names: Vec<&str> = children.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["evictAll"]);
        assert!(store
            .find_entities_by_name("PageCache", None)
            .await
            .unwrap()
            .is_empty());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entities, 2);
    }

    #[tokio::test]
    async fn test_local_relationships_resolve() {
        let store = InMemoryStore::new();
        let src = "class Base {}
class Child extends Base {
  run() { helper(); missing(); }
}
function helper() {}
";
        let report = indexer(&store)
            .index_file("src/tree.js", src, None)
            .await
            .unwrap();
        assert!(report.relationships >= 2);
        assert!(report.unresolved >= 1);

        let child = &store.find_entities_by_name("Child", None).await.unwrap()[0];
        let base = &store.find_entities_by_name("Base", None).await.unwrap()[0];
        let rels = store.relationships_for(&child.entity_id).await.unwrap();
        assert!(rels.iter().any(|r| r.relationship_type == RelationshipType::Extends
            && r.target_entity_id.as_deref() == Some(base.entity_id.as_str())));

        let run = &store.find_entities_by_name("run", None).await.unwrap()[0];
        let helper = &store.find_entities_by_name("helper", None).await.unwrap()[0];
        let calls = store.relationships_for(&run.entity_id).await.unwrap();
        assert!(calls.iter().any(|r| r.relationship_type == RelationshipType::Calls
            && r.target_entity_id.as_deref() == Some(helper.entity_id.as_str())));
    }

    #[tokio::test]
    async fn test_imports_resolve_to_indexed_files() {
        let store = InMemoryStore::new();
        let idx = indexer(&store);
        let loader = idx
            .index_file("src/lib/loader.js", "export function load() {}\n", None)
            .await
            .unwrap();
        let app = idx
            .index_file(
                "src/app.js",
                "import { load } from './lib/loader';\nload();\n",
                None,
            )
            .await
            .unwrap();

        let rels = store.relationships_for(&app.file_entity_id).await.unwrap();
        assert!(rels.iter().any(|r| r.relationship_type == RelationshipType::Imports
            && r.target_entity_id.as_deref() == Some(loader.file_entity_id.as_str())));
        // The top-level call resolves across files to the exported function.
        let load = &store.find_entities_by_name("load", Some(EntityType::Function)).await.unwrap()[0];
        assert!(rels.iter().any(|r| r.relationship_type == RelationshipType::Calls
            && r.target_entity_id.as_deref() == Some(load.entity_id.as_str())));
    }

    /// Delegates to an [`InMemoryStore`], failing keyword or relationship
    /// writes on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        fail_keywords: AtomicBool,
        fail_relationships: AtomicBool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn find_file_entity(&self, file_path: &str) -> Result<Option<Entity>> {
            self.inner.find_file_entity(file_path).await
        }
        async fn insert_entity(&self, entity: &Entity) -> Result<()> {
            self.inner.insert_entity(entity).await
        }
        async fn update_entity(&self, entity: &Entity) -> Result<()> {
            self.inner.update_entity(entity).await
        }
        async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>> {
            self.inner.get_entity(entity_id).await
        }
        async fn children_of(&self, entity_id: &str) -> Result<Vec<Entity>> {
            self.inner.children_of(entity_id).await
        }
        async fn delete_descendants(&self, entity_id: &str) -> Result<u64> {
            self.inner.delete_descendants(entity_id).await
        }
        async fn delete_entity(&self, entity_id: &str) -> Result<u64> {
            self.inner.delete_entity(entity_id).await
        }
        async fn find_entities_by_name(
            &self,
            name: &str,
            entity_type: Option<EntityType>,
        ) -> Result<Vec<Entity>> {
            self.inner.find_entities_by_name(name, entity_type).await
        }
        async fn replace_keywords(&self, entity_id: &str, keywords: &[KeywordEntry]) -> Result<()> {
            if self.fail_keywords.load(Ordering::SeqCst) && !keywords.is_empty() {
                anyhow::bail!("disk full");
            }
            self.inner.replace_keywords(entity_id, keywords).await
        }
        async fn upsert_relationship(&self, relationship: &Relationship) -> Result<Relationship> {
            if self.fail_relationships.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.upsert_relationship(relationship).await
        }
        async fn delete_outgoing_relationships(&self, entity_id: &str) -> Result<u64> {
            self.inner.delete_outgoing_relationships(entity_id).await
        }
        async fn relationships_for(&self, entity_id: &str) -> Result<Vec<Relationship>> {
            self.inner.relationships_for(entity_id).await
        }
        async fn full_text_search(&self, query: &FtsQuery) -> Result<Vec<FtsHit>> {
            self.inner.full_text_search(query).await
        }
        async fn keyword_search(&self, keywords: &[String], limit: i64) -> Result<Vec<KeywordHit>> {
            self.inner.keyword_search(keywords, limit).await
        }
        async fn touch_entities(&self, entity_ids: &[String], at: i64) -> Result<()> {
            self.inner.touch_entities(entity_ids, at).await
        }
        async fn decay_importance(&self, factor: f64, accessed_before: i64) -> Result<u64> {
            self.inner.decay_importance(factor, accessed_before).await
        }
        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_failed_run_is_redone_on_retry() {
        let store = FlakyStore::default();
        let idx = Indexer::new(&store, IndexOptions::default());

        store.fail_keywords.store(true, Ordering::SeqCst);
        assert!(idx.index_file("src/cache.js", CACHE_JS, None).await.is_err());
        let pending = store.find_file_entity("src/cache.js").await.unwrap().unwrap();
        assert_ne!(pending.content_hash, content_hash(CACHE_JS));

        store.fail_keywords.store(false, Ordering::SeqCst);
        let retry = idx.index_file("src/cache.js", CACHE_JS, None).await.unwrap();
        assert_eq!(retry.outcome, IndexOutcome::Updated);
        let file = store.find_file_entity("src/cache.js").await.unwrap().unwrap();
        assert_eq!(file.content_hash, content_hash(CACHE_JS));
        assert!(!store.children_of(&file.entity_id).await.unwrap().is_empty());

        let again = idx.index_file("src/cache.js", CACHE_JS, None).await.unwrap();
        assert_eq!(again.outcome, IndexOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_failed_relationships_leave_file_pending() {
        let store = FlakyStore::default();
        let idx = Indexer::new(&store, IndexOptions::default());
        let src = "function main() { helper(); }\nfunction helper() {}\n";

        store.fail_relationships.store(true, Ordering::SeqCst);
        let first = idx.index_file("src/main.js", src, None).await.unwrap();
        assert_eq!(first.relationships, 0);
        assert_eq!(first.entities, 2);

        store.fail_relationships.store(false, Ordering::SeqCst);
        let retry = idx.index_file("src/main.js", src, None).await.unwrap();
        assert_eq!(retry.outcome, IndexOutcome::Updated);
        assert_eq!(retry.relationships, 1);
        assert_eq!(
            idx.index_file("src/main.js", src, None).await.unwrap().outcome,
            IndexOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn test_remove_file() {
        let store = InMemoryStore::new();
        let idx = indexer(&store);
        idx.index_file("src/cache.js", CACHE_JS, None).await.unwrap();
        assert!(idx.remove_file("src/cache.js").await.unwrap());
        assert!(!idx.remove_file("src/cache.js").await.unwrap());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entities, 0);
        assert_eq!(stats.total_keywords, 0);
    }

    #[tokio::test]
    async fn test_python_uses_regex_strategy() {
        let store = InMemoryStore::new();
        let report = indexer(&store)
            .index_file("app.py", "def main():\n    run()\n\ndef run():\n    pass\n", None)
            .await
            .unwrap();
        assert_eq!(report.strategy, Some(Strategy::Regex));
        assert_eq!(report.entities, 2);
        assert_eq!(report.relationships, 1);
    }

    #[test]
    fn test_build_keywords_weights() {
        let entity = Entity::new(
            "src/cache.js",
            EntityType::Function,
            "warmCache",
            "function warmCache(cache) { cache.fill(); cache.fill(); }",
            "javascript",
        );
        let rows = build_keywords(&entity, Language::JavaScript, 20);

        let names: Vec<&str> = rows
            .iter()
            .filter(|k| k.keyword_type == KeywordType::Name)
            .map(|k| k.keyword.as_str())
            .collect();
        assert_eq!(names, vec!["cach", "warm", "warmcach"]);
        assert!(rows
            .iter()
            .filter(|k| k.keyword_type == KeywordType::Name)
            .all(|k| (k.weight - 1.0).abs() < 1e-9));

        let scored: Vec<&KeywordEntry> = rows
            .iter()
            .filter(|k| k.keyword_type != KeywordType::Name)
            .collect();
        let best = scored.iter().map(|k| k.weight).fold(0.0, f64::max);
        assert!((best - 1.0).abs() < 1e-9);
        assert!(scored.iter().all(|k| k.weight > 0.0 && k.weight <= 1.0));
        assert!(rows
            .iter()
            .any(|k| k.keyword_type == KeywordType::Phrase && k.keyword == "function warmcach"));
    }

    #[test]
    fn test_module_stem() {
        assert_eq!(module_stem("./lib/loader.js"), "loader");
        assert_eq!(module_stem("../loader"), "loader");
        assert_eq!(module_stem("os.path"), "path");
        assert_eq!(module_stem("github.com/acme/store"), "store");
        assert_eq!(module_stem("crate::store::memory"), "memory");
        assert_eq!(module_stem("fmt"), "fmt");
    }
}
