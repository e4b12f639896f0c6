//! Core data models used throughout Code Context.
//!
//! These types represent the entities, relationships, and keyword rows that
//! the indexing pipeline persists, plus the request-scoped projections
//! produced by search and compression.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Kind of an indexed [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    File,
    Function,
    Method,
    Class,
    Constructor,
    Variable,
    Object,
    Interface,
    TypeAlias,
    Enum,
    Import,
    Export,
    CommentBlock,
    Module,
    Struct,
    Trait,
}

impl EntityType {
    pub const ALL: [EntityType; 16] = [
        EntityType::File,
        EntityType::Function,
        EntityType::Method,
        EntityType::Class,
        EntityType::Constructor,
        EntityType::Variable,
        EntityType::Object,
        EntityType::Interface,
        EntityType::TypeAlias,
        EntityType::Enum,
        EntityType::Import,
        EntityType::Export,
        EntityType::CommentBlock,
        EntityType::Module,
        EntityType::Struct,
        EntityType::Trait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::Function => "function",
            EntityType::Method => "method",
            EntityType::Class => "class",
            EntityType::Constructor => "constructor",
            EntityType::Variable => "variable",
            EntityType::Object => "object",
            EntityType::Interface => "interface",
            EntityType::TypeAlias => "type_alias",
            EntityType::Enum => "enum",
            EntityType::Import => "import",
            EntityType::Export => "export",
            EntityType::CommentBlock => "comment_block",
            EntityType::Module => "module",
            EntityType::Struct => "struct",
            EntityType::Trait => "trait",
        }
    }

    /// Ranking multiplier applied by the search engine.
    pub fn rank_boost(self) -> f64 {
        match self {
            EntityType::File => 1.2,
            EntityType::Class => 1.1,
            EntityType::Function => 1.0,
            _ => 0.9,
        }
    }

    /// Whether the compressor should treat this entity as callable code.
    pub fn is_callable(self) -> bool {
        matches!(
            self,
            EntityType::Function | EntityType::Method | EntityType::Constructor
        )
    }

    /// Whether the compressor should treat this entity as a type container.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            EntityType::Class
                | EntityType::Struct
                | EntityType::Trait
                | EntityType::Interface
                | EntityType::Module
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match EntityType::ALL.iter().find(|t| t.as_str() == lower) {
            Some(t) => Ok(*t),
            None => bail!("Unknown entity type: '{}'", s),
        }
    }
}

/// Kind of a directed [`Relationship`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Contains,
    Calls,
    Extends,
    Implements,
    Imports,
    Exports,
    References,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Contains => "contains",
            RelationshipType::Calls => "calls",
            RelationshipType::Extends => "extends",
            RelationshipType::Implements => "implements",
            RelationshipType::Imports => "imports",
            RelationshipType::Exports => "exports",
            RelationshipType::References => "references",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "contains" => RelationshipType::Contains,
            "calls" => RelationshipType::Calls,
            "extends" => RelationshipType::Extends,
            "implements" => RelationshipType::Implements,
            "imports" => RelationshipType::Imports,
            "exports" => RelationshipType::Exports,
            "references" => RelationshipType::References,
            other => bail!("Unknown relationship type: '{}'", other),
        })
    }
}

/// Origin of a keyword row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordType {
    /// Part of the entity's own name.
    Name,
    /// Scored token from the entity body.
    Term,
    /// Boundary-respecting bigram.
    Phrase,
}

impl KeywordType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeywordType::Name => "name",
            KeywordType::Term => "term",
            KeywordType::Phrase => "phrase",
        }
    }
}

impl FromStr for KeywordType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "name" => KeywordType::Name,
            "term" => KeywordType::Term,
            "phrase" => KeywordType::Phrase,
            other => bail!("Unknown keyword type: '{}'", other),
        })
    }
}

/// A unit of indexed content: a file or a construct inside one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub file_path: String,
    pub entity_type: EntityType,
    pub name: String,
    pub start_line: i64,
    pub end_line: i64,
    pub content_hash: String,
    pub raw_content: String,
    pub summary: Option<String>,
    pub language: String,
    /// `None` only for file entities.
    pub parent_entity_id: Option<String>,
    pub importance_score: f64,
    pub custom_metadata: serde_json::Value,
    pub last_modified_at: i64,
    pub last_accessed_at: i64,
}

impl Entity {
    /// Build a new entity with a fresh UUID and a hash of `raw_content`.
    pub fn new(
        file_path: &str,
        entity_type: EntityType,
        name: &str,
        raw_content: &str,
        language: &str,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            entity_id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.to_string(),
            entity_type,
            name: name.to_string(),
            start_line: 1,
            end_line: raw_content.lines().count().max(1) as i64,
            content_hash: content_hash(raw_content),
            raw_content: raw_content.to_string(),
            summary: None,
            language: language.to_string(),
            parent_entity_id: None,
            importance_score: 1.0,
            custom_metadata: serde_json::json!({}),
            last_modified_at: now,
            last_accessed_at: now,
        }
    }
}

/// Directed, typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: String,
    pub source_entity_id: String,
    pub target_entity_id: Option<String>,
    pub relationship_type: RelationshipType,
    pub weight: f64,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

impl Relationship {
    pub fn new(
        source_entity_id: &str,
        target_entity_id: Option<&str>,
        relationship_type: RelationshipType,
        weight: f64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            relationship_id: uuid::Uuid::new_v4().to_string(),
            source_entity_id: source_entity_id.to_string(),
            target_entity_id: target_entity_id.map(str::to_string),
            relationship_type,
            weight,
            metadata,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Fold a repeated observation of the same triple into `self`.
    ///
    /// Weights accumulate; incoming metadata keys overwrite existing ones.
    pub fn reinforce(&mut self, incoming: &Relationship) {
        self.weight += incoming.weight;
        match (&mut self.metadata, &incoming.metadata) {
            (serde_json::Value::Object(existing), serde_json::Value::Object(new)) => {
                for (k, v) in new {
                    existing.insert(k.clone(), v.clone());
                }
            }
            (slot, new) if !new.is_null() => *slot = new.clone(),
            _ => {}
        }
    }
}

/// Inverted index row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub entity_id: String,
    pub keyword: String,
    pub term_frequency: i64,
    pub weight: f64,
    pub keyword_type: KeywordType,
}

/// Which retrieval strategy produced a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Fts,
    Keywords,
    Both,
}

/// A ranked search hit. Request-scoped, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub entity: Entity,
    pub relevance_score: f64,
    pub match_source: MatchSource,
}

/// Input to the compressor.
#[derive(Debug, Clone)]
pub struct Snippet {
    pub entity_id: String,
    /// `None` means plain conversational text.
    pub entity_type: Option<EntityType>,
    pub name: String,
    pub content: String,
    pub score: f64,
}

impl From<&SearchResult> for Snippet {
    fn from(result: &SearchResult) -> Self {
        Self {
            entity_id: result.entity.entity_id.clone(),
            entity_type: Some(result.entity.entity_type),
            name: result.entity.name.clone(),
            content: result.entity.raw_content.clone(),
            score: result.relevance_score,
        }
    }
}

/// A snippet fitted into its share of the budget. Request-scoped.
#[derive(Debug, Clone, Serialize)]
pub struct CompressedSnippet {
    pub entity_id: String,
    pub content: String,
    pub original_length: usize,
    /// `len(content) / original_length`, 1.0 when kept verbatim.
    pub compression_ratio: f64,
    pub score: f64,
    pub truncated: bool,
}

/// Aggregate row counts reported by a store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub entities_by_type: Vec<(String, i64)>,
    pub total_entities: i64,
    pub total_keywords: i64,
    pub total_relationships: i64,
}

/// SHA-256 hex digest used for `content_hash`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip_names() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("widget".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_rank_boosts() {
        assert!((EntityType::File.rank_boost() - 1.2).abs() < 1e-9);
        assert!((EntityType::Class.rank_boost() - 1.1).abs() < 1e-9);
        assert!((EntityType::Function.rank_boost() - 1.0).abs() < 1e-9);
        assert!((EntityType::Variable.rank_boost() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn test_reinforce_accumulates_weight_and_merges_metadata() {
        let mut a = Relationship::new(
            "s",
            Some("t"),
            RelationshipType::Calls,
            1.0,
            serde_json::json!({"line": 3, "callee": "foo"}),
        );
        let b = Relationship::new(
            "s",
            Some("t"),
            RelationshipType::Calls,
            1.0,
            serde_json::json!({"line": 9}),
        );
        a.reinforce(&b);
        assert!((a.weight - 2.0).abs() < 1e-9);
        assert_eq!(a.metadata["line"], 9);
        assert_eq!(a.metadata["callee"], "foo");
    }
}
