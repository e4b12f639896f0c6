//! Hybrid search over indexed entities.
//!
//! The engine runs entirely through the [`Store`] trait, so the SQLite
//! backend and the in-memory test store share one ranking implementation.
//!
//! # Scoring
//!
//! 1. Lowercase the query keywords for full-text matching (the backend's
//!    tokenizer stems them) and stem them for the keyword index.
//! 2. Full-text: bm25 magnitudes normalized by the best hit (best = `1.0`).
//! 3. Keyword index: `Σweight × (1 + 0.1 × distinct matches)`, normalized the
//!    same way.
//! 4. Combined: full-text first; keyword hits merge in by entity id with
//!    `fts × 0.7 + keyword × 0.3` when both exist. Without full-text hits the
//!    keyword results are used alone.
//! 5. Post-filter by entity type, path glob and modification date. When the
//!    filters leave fewer than `limit` results and the store had more
//!    candidates, the pool is doubled and steps 2-4 rerun.
//! 6. Multiply by the entity-type boost, or order by a custom ranking key.
//! 7. Drop results under `minRelevance`, truncate to `limit`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::keywords::stem;
use crate::models::{Entity, EntityType, MatchSource, SearchResult};
use crate::store::{FtsHit, FtsQuery, KeywordHit, Store};

/// Weight of the full-text score when an entity is found by both strategies.
pub const FTS_WEIGHT: f64 = 0.7;
/// Weight of the keyword score when an entity is found by both strategies.
pub const KEYWORD_WEIGHT: f64 = 0.3;
/// Candidate pool size relative to the requested limit.
const CANDIDATE_FACTOR: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Fts,
    Keywords,
    #[default]
    Combined,
}

impl FromStr for SearchStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "fts" => SearchStrategy::Fts,
            "keywords" | "keyword" => SearchStrategy::Keywords,
            "combined" | "hybrid" => SearchStrategy::Combined,
            other => bail!(
                "Unknown search strategy: {}. Use fts, keywords, or combined.",
                other
            ),
        })
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchStrategy::Fts => "fts",
            SearchStrategy::Keywords => "keywords",
            SearchStrategy::Combined => "combined",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BooleanOperator {
    And,
    #[default]
    Or,
}

impl FromStr for BooleanOperator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "AND" => BooleanOperator::And,
            "OR" => BooleanOperator::Or,
            other => bail!("Unknown boolean operator: {}. Use AND or OR.", other),
        })
    }
}

/// Ordering that replaces the entity-type boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomRanking {
    /// Relevance without the type multiplier.
    Relevance,
    Importance,
    /// Most recently modified first.
    Recent,
    /// Most recently accessed first.
    Accessed,
    Name,
}

impl FromStr for CustomRanking {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "relevance" => CustomRanking::Relevance,
            "importance" => CustomRanking::Importance,
            "recent" => CustomRanking::Recent,
            "accessed" => CustomRanking::Accessed,
            "name" => CustomRanking::Name,
            other => bail!(
                "Unknown ranking: {}. Use relevance, importance, recent, accessed, or name.",
                other
            ),
        })
    }
}

/// Inclusive `last_modified_at` window in Unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl DateRange {
    pub fn contains(&self, ts: i64) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Caller options for [`SearchEngine::search`]. Every field is optional on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub strategy: SearchStrategy,
    pub boolean_operator: BooleanOperator,
    pub use_exact_match: bool,
    pub use_proximity: bool,
    pub proximity_distance: u32,
    pub entity_types: Vec<EntityType>,
    /// Glob patterns matched against `file_path`.
    pub file_paths: Vec<String>,
    pub date_range: Option<DateRange>,
    pub limit: usize,
    pub min_relevance: Option<f64>,
    pub custom_ranking: Option<CustomRanking>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Combined,
            boolean_operator: BooleanOperator::Or,
            use_exact_match: false,
            use_proximity: false,
            proximity_distance: 10,
            entity_types: Vec::new(),
            file_paths: Vec::new(),
            date_range: None,
            limit: 100,
            min_relevance: None,
            custom_ranking: None,
        }
    }
}

/// Search engine bound to a store handle.
pub struct SearchEngine<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> SearchEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Run a search. An empty keyword list returns no results without
    /// touching the store.
    pub async fn search(
        &self,
        keywords: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let raw_terms: Vec<String> = keywords
            .iter()
            .flat_map(|k| k.split_whitespace())
            .map(str::to_string)
            .collect();
        if raw_terms.is_empty() {
            return Ok(Vec::new());
        }
        let path_filter = build_globset(&options.file_paths)?;

        let mut seen = HashSet::new();
        let words: Vec<String> = raw_terms
            .iter()
            .map(|t| t.to_lowercase())
            .filter(|w| seen.insert(w.clone()))
            .collect();
        let mut seen = HashSet::new();
        let stems: Vec<String> = raw_terms
            .iter()
            .map(|t| stem(t))
            .filter(|s| seen.insert(s.clone()))
            .collect();
        // Adjacent query words also match stored phrase keywords.
        let mut lookup = stems.clone();
        for pair in raw_terms.windows(2) {
            let phrase = format!("{} {}", stem(&pair[0]), stem(&pair[1]));
            if !lookup.contains(&phrase) {
                lookup.push(phrase);
            }
        }

        let mut pool = (options.limit.max(1) * CANDIDATE_FACTOR) as i64;
        let mut results = loop {
            let (candidates, exhausted) = self
                .candidates(&words, &raw_terms, &lookup, options, pool)
                .await?;
            let filtered: Vec<SearchResult> = candidates
                .into_iter()
                .filter(|r| passes_filters(&r.entity, options, path_filter.as_ref()))
                .collect();
            if exhausted || filtered.len() >= options.limit {
                break filtered;
            }
            pool *= 2;
            tracing::debug!(pool, kept = filtered.len(), "filters too narrow, widening pool");
        };
        rank(&mut results, options.custom_ranking);
        if let Some(min) = options.min_relevance {
            results.retain(|r| r.relevance_score >= min);
        }
        results.truncate(options.limit);

        if !results.is_empty() {
            let now = chrono::Utc::now().timestamp();
            let ids: Vec<String> = results.iter().map(|r| r.entity.entity_id.clone()).collect();
            self.store.touch_entities(&ids, now).await?;
            for r in &mut results {
                r.entity.last_accessed_at = now;
            }
        }

        tracing::debug!(
            strategy = %options.strategy,
            terms = stems.len(),
            results = results.len(),
            "search complete"
        );
        Ok(results)
    }

    /// Unfiltered candidates for one pool size. The flag is true when no
    /// channel hit the pool limit, so a larger pool would find nothing new.
    async fn candidates(
        &self,
        words: &[String],
        raw_terms: &[String],
        lookup: &[String],
        options: &SearchOptions,
        pool: i64,
    ) -> Result<(Vec<SearchResult>, bool)> {
        let full = |n: usize| n as i64 >= pool;
        Ok(match options.strategy {
            SearchStrategy::Fts => {
                let fts = self.full_text(words, raw_terms, options, pool).await?;
                let exhausted = !full(fts.len());
                (fts, exhausted)
            }
            SearchStrategy::Keywords => {
                let kw = self.keyword(lookup, pool).await?;
                let exhausted = !full(kw.len());
                (kw, exhausted)
            }
            SearchStrategy::Combined => {
                let fts = self.full_text(words, raw_terms, options, pool).await?;
                let kw = self.keyword(lookup, pool).await?;
                let exhausted = !full(fts.len()) && !full(kw.len());
                if fts.is_empty() {
                    (kw, exhausted)
                } else {
                    (merge_combined(fts, kw), exhausted)
                }
            }
        })
    }

    async fn full_text(
        &self,
        words: &[String],
        raw_terms: &[String],
        options: &SearchOptions,
        pool: i64,
    ) -> Result<Vec<SearchResult>> {
        let query = FtsQuery {
            terms: words.to_vec(),
            raw_terms: raw_terms.to_vec(),
            operator: options.boolean_operator,
            exact: options.use_exact_match,
            proximity: options.use_proximity.then_some(options.proximity_distance),
            limit: pool,
        };
        let hits = self.store.full_text_search(&query).await?;
        Ok(normalize_fts(hits))
    }

    async fn keyword(&self, terms: &[String], pool: i64) -> Result<Vec<SearchResult>> {
        let hits = self.store.keyword_search(terms, pool).await?;
        Ok(normalize_keyword(hits))
    }
}

/// bm25 magnitudes divided by the best magnitude.
pub fn normalize_fts(hits: Vec<FtsHit>) -> Vec<SearchResult> {
    let best = hits.iter().map(|h| h.rank.abs()).fold(0.0, f64::max);
    hits.into_iter()
        .map(|h| SearchResult {
            relevance_score: if best > f64::EPSILON {
                h.rank.abs() / best
            } else {
                1.0
            },
            entity: h.entity,
            match_source: MatchSource::Fts,
        })
        .collect()
}

/// Keyword scores divided by the best score.
pub fn normalize_keyword(hits: Vec<KeywordHit>) -> Vec<SearchResult> {
    let best = hits.iter().map(KeywordHit::score).fold(0.0, f64::max);
    hits.into_iter()
        .map(|h| SearchResult {
            relevance_score: if best > f64::EPSILON {
                h.score() / best
            } else {
                1.0
            },
            entity: h.entity,
            match_source: MatchSource::Keywords,
        })
        .collect()
}

/// Merge keyword results into full-text results by entity id.
///
/// Entities present in both get `fts × 0.7 + keyword × 0.3`; all others keep
/// their own score. The result is sorted by descending score.
pub fn merge_combined(fts: Vec<SearchResult>, keyword: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut merged = fts;
    let index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.entity.entity_id.clone(), i))
        .collect();

    for kw in keyword {
        match index.get(&kw.entity.entity_id) {
            Some(&i) => {
                let existing = &mut merged[i];
                existing.relevance_score =
                    existing.relevance_score * FTS_WEIGHT + kw.relevance_score * KEYWORD_WEIGHT;
                existing.match_source = MatchSource::Both;
            }
            None => merged.push(kw),
        }
    }

    sort_by_relevance(&mut merged);
    merged
}

fn sort_by_relevance(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
    });
}

fn rank(results: &mut [SearchResult], custom: Option<CustomRanking>) {
    let Some(ranking) = custom else {
        for r in results.iter_mut() {
            r.relevance_score *= r.entity.entity_type.rank_boost();
        }
        sort_by_relevance(results);
        return;
    };
    sort_by_relevance(results);
    match ranking {
        CustomRanking::Relevance => {}
        CustomRanking::Importance => results.sort_by(|a, b| {
            b.entity
                .importance_score
                .total_cmp(&a.entity.importance_score)
        }),
        CustomRanking::Recent => {
            results.sort_by(|a, b| b.entity.last_modified_at.cmp(&a.entity.last_modified_at))
        }
        CustomRanking::Accessed => {
            results.sort_by(|a, b| b.entity.last_accessed_at.cmp(&a.entity.last_accessed_at))
        }
        CustomRanking::Name => results.sort_by(|a, b| a.entity.name.cmp(&b.entity.name)),
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).with_context(|| format!("Invalid file path glob: {}", pattern))?;
        builder.add(glob);
    }
    Ok(Some(builder.build()?))
}

fn passes_filters(entity: &Entity, options: &SearchOptions, paths: Option<&GlobSet>) -> bool {
    if !options.entity_types.is_empty() && !options.entity_types.contains(&entity.entity_type) {
        return false;
    }
    if let Some(set) = paths {
        if !set.is_match(&entity.file_path) {
            return false;
        }
    }
    if let Some(range) = options.date_range {
        if !range.contains(entity.last_modified_at) {
            return false;
        }
    }
    true
}
