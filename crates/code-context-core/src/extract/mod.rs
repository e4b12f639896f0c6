//! Entity and relationship extraction.
//!
//! JavaScript and TypeScript sources are parsed with tree-sitter and walked
//! recursively. Every other language, and any source whose tree contains
//! error nodes, goes through per-language regex templates instead.
//!
//! Extraction is pure: it never touches a store. Entities are returned in
//! discovery order and refer to their parent by index; relationship targets
//! either point at another extracted entity or name a symbol for the indexing
//! pipeline to resolve.

mod patterns;
mod tree;

use serde::Serialize;

use crate::language::Language;
use crate::models::{EntityType, RelationshipType};

/// Which extraction path produced an [`Extraction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SyntaxTree,
    Regex,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::SyntaxTree => "syntax_tree",
            Strategy::Regex => "regex",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub entity_type: EntityType,
    pub name: String,
    pub start_line: i64,
    pub end_line: i64,
    pub raw_content: String,
    /// Index of the enclosing extracted entity; `None` nests under the file.
    pub parent: Option<usize>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationTarget {
    /// Another entity of the same extraction.
    Local(usize),
    /// A name to resolve against the store.
    Symbol {
        name: String,
        entity_type: Option<EntityType>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelationship {
    /// `None` means the file entity.
    pub source: Option<usize>,
    pub target: RelationTarget,
    pub relationship_type: RelationshipType,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub strategy: Strategy,
}

impl Extraction {
    fn empty(strategy: Strategy) -> Self {
        Self {
            entities: Vec::new(),
            relationships: Vec::new(),
            strategy,
        }
    }
}

/// Extract entities and relationships from `content`.
pub fn extract_entities(content: &str, language: Language) -> Extraction {
    if language.has_tree_sitter_support() {
        match tree::extract(content, language) {
            Ok(extraction) => return extraction,
            Err(err) => {
                tracing::debug!(
                    language = language.name(),
                    "syntax tree extraction unavailable, using regex: {err:#}"
                );
            }
        }
    }
    patterns::extract(content, language)
}

/// One-based line of byte offset `offset` in `text`.
pub(crate) fn line_of(text: &str, offset: usize) -> i64 {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() as i64 + 1
}
