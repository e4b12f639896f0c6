//! # Code Context
//!
//! **A local code-aware context engine.**
//!
//! Code Context indexes source files into structured entities (files,
//! functions, classes, imports, ...) with their relationships and keywords,
//! serves hybrid full-text + keyword search over them, and compresses the
//! best hits into a caller-supplied size budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Walker     │──▶│   Indexer     │──▶│    SQLite     │
//! │ walkdir+glob│   │ extract+kwds │   │ FTS5+keywords │
//! └─────────────┘   └──────────────┘   └──────┬────────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐      ┌────────────┐
//!                    │  search  │─────▶│  compress  │
//!                    └──────────┘      └────────────┘
//! ```
//!
//! The pipeline, search engine and compressor live in
//! [`code_context_core`]; this crate supplies persistence and the `cctx`
//! command line.
//!
//! ## Quick Start
//!
//! ```bash
//! cctx init                          # create database
//! cctx index src                     # index a directory
//! cctx search cache eviction         # ranked entities
//! cctx context cache --budget 4000   # compressed context
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool (WAL, foreign keys) |
//! | [`migrate`] | Schema setup: tables, FTS5, triggers, indexes |
//! | [`sqlite_store`] | `Store` implementation over SQLite |
//! | [`ingest`] | Filesystem walk and per-file indexing |
//! | [`search`] | `cctx search` flags and output |
//! | [`context`] | Search + compression into a budget |
//! | [`get`] | Entity inspection with children and relationships |
//! | [`stats`] | Database statistics and importance decay |

pub mod config;
pub mod context;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
