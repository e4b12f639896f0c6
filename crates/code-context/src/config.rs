//! Configuration parsing and validation.
//!
//! Code Context is configured via a TOML file (default: `config/cctx.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/cctx.sqlite"
//!
//! [indexing]
//! root = "."
//! include_globs = ["**/*.js", "**/*.ts", "**/*.py"]
//! exclude_globs = ["**/vendor/**"]
//! max_file_bytes = 1048576
//! keywords_per_entity = 20
//!
//! [search]
//! strategy = "combined"
//! boolean_operator = "OR"
//! limit = 100
//!
//! [compression]
//! budget_chars = 8000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use code_context_core::indexer::IndexOptions;
use code_context_core::search::{BooleanOperator, SearchOptions, SearchStrategy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Settings for `cctx index`.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Directory indexed when `cctx index` is given no paths.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Added to the built-in `.git`, `target` and `node_modules` excludes.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_keywords_per_entity")]
    pub keywords_per_entity: usize,
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.js", "**/*.jsx", "**/*.mjs", "**/*.ts", "**/*.tsx", "**/*.py", "**/*.go",
        "**/*.rs", "**/*.rb", "**/*.java", "**/*.md", "**/*.txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}
fn default_keywords_per_entity() -> usize {
    20
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
            keywords_per_entity: default_keywords_per_entity(),
        }
    }
}

impl IndexingConfig {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            keywords_per_entity: self.keywords_per_entity,
        }
    }
}

/// Defaults applied to `cctx search` and `cctx context`.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_boolean_operator")]
    pub boolean_operator: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_proximity_distance")]
    pub proximity_distance: u32,
}

fn default_strategy() -> String {
    "combined".to_string()
}
fn default_boolean_operator() -> String {
    "OR".to_string()
}
fn default_limit() -> usize {
    100
}
fn default_proximity_distance() -> u32 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            boolean_operator: default_boolean_operator(),
            limit: default_limit(),
            proximity_distance: default_proximity_distance(),
        }
    }
}

impl SearchConfig {
    /// Base [`SearchOptions`] before command-line overrides.
    pub fn search_options(&self) -> Result<SearchOptions> {
        Ok(SearchOptions {
            strategy: self.strategy.parse::<SearchStrategy>()?,
            boolean_operator: self.boolean_operator.parse::<BooleanOperator>()?,
            proximity_distance: self.proximity_distance,
            limit: self.limit,
            ..SearchOptions::default()
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompressionConfig {
    /// Default budget for `cctx context`, in characters.
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
}

fn default_budget_chars() -> usize {
    8000
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            budget_chars: default_budget_chars(),
        }
    }
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.indexing.keywords_per_entity == 0 {
        anyhow::bail!("indexing.keywords_per_entity must be > 0");
    }

    if config.search.limit < 1 {
        anyhow::bail!("search.limit must be >= 1");
    }

    if config.compression.budget_chars < 100 {
        anyhow::bail!("compression.budget_chars must be >= 100");
    }

    if let Err(e) = config.search.strategy.parse::<SearchStrategy>() {
        anyhow::bail!("search.strategy: {}. Must be fts, keywords, or combined.", e);
    }
    if let Err(e) = config.search.boolean_operator.parse::<BooleanOperator>() {
        anyhow::bail!("search.boolean_operator: {}. Must be AND or OR.", e);
    }

    Ok(config)
}
