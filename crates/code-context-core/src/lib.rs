//! # Code Context Core
//!
//! Storage-agnostic logic for Code Context: tokenization, keyword scoring,
//! entity extraction, the indexing pipeline, hybrid search and token-budget
//! compression.
//!
//! Persistence goes through the [`store::Store`] trait. This crate ships an
//! in-memory implementation for tests; the `code-context` application crate
//! provides the SQLite one.
//!
//! ```text
//! index_file ─▶ tokenize ─▶ keywords ─┐
//!            └▶ extract ──────────────┴─▶ Store ◀── search ─▶ compress
//! ```

pub mod compress;
pub mod extract;
pub mod indexer;
pub mod keywords;
pub mod language;
pub mod models;
pub mod search;
pub mod store;
pub mod tokenize;
