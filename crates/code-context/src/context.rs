//! `cctx context`: search, then compress the hits into a size budget.
//!
//! The output is what an external client would paste into a prompt: the
//! best-ranked entities, each kept verbatim when it fits its share of the
//! budget and summarized otherwise.
//!
//! ```bash
//! cctx context cache eviction --budget 4000
//! cctx context "session token" --budget 1000 --budget-tokens --json
//! ```

use anyhow::Result;
use serde::Serialize;

use code_context_core::compress::{tokens_to_chars, Compressor};
use code_context_core::models::{CompressedSnippet, SearchResult, Snippet};
use code_context_core::search::{SearchEngine, SearchOptions};
use code_context_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::search::SearchArgs;
use crate::sqlite_store::SqliteStore;

/// A compressed snippet with the entity it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    pub name: String,
    pub entity_type: String,
    pub file_path: String,
    pub start_line: i64,
    #[serde(flatten)]
    pub snippet: CompressedSnippet,
}

/// Result of assembling context for a query.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub budget_chars: usize,
    pub used_chars: usize,
    /// Search hits considered before compression.
    pub candidates: usize,
    pub items: Vec<ContextItem>,
}

/// Search `store` and compress the results into `budget_chars`.
pub async fn assemble_context<S: Store>(
    store: &S,
    keywords: &[String],
    options: &SearchOptions,
    budget_chars: usize,
) -> Result<ContextBundle> {
    let results = SearchEngine::new(store).search(keywords, options).await?;
    let snippets: Vec<Snippet> = results.iter().map(Snippet::from).collect();
    let compressed = Compressor::default().compress(&snippets, budget_chars, keywords);

    let items: Vec<ContextItem> = compressed
        .into_iter()
        .filter_map(|snippet| {
            let origin = find_result(&results, &snippet.entity_id)?;
            Some(ContextItem {
                name: origin.entity.name.clone(),
                entity_type: origin.entity.entity_type.as_str().to_string(),
                file_path: origin.entity.file_path.clone(),
                start_line: origin.entity.start_line,
                snippet,
            })
        })
        .collect();

    let used_chars = items.iter().map(|i| i.snippet.content.chars().count()).sum();
    tracing::debug!(
        candidates = results.len(),
        kept = items.len(),
        used_chars,
        budget_chars,
        "context assembled"
    );

    Ok(ContextBundle {
        budget_chars,
        used_chars,
        candidates: results.len(),
        items,
    })
}

fn find_result<'r>(results: &'r [SearchResult], entity_id: &str) -> Option<&'r SearchResult> {
    results.iter().find(|r| r.entity.entity_id == entity_id)
}

/// Resolve the budget flags: `--budget-tokens` reinterprets `--budget` as
/// tokens; no `--budget` falls back to `[compression] budget_chars`.
pub fn budget_chars(config: &Config, budget: Option<usize>, in_tokens: bool) -> usize {
    match budget {
        Some(b) if in_tokens => tokens_to_chars(b),
        Some(b) => b,
        None => config.compression.budget_chars,
    }
}

/// CLI entry point for `cctx context`.
pub async fn run_context(
    config: &Config,
    args: &SearchArgs,
    budget: Option<usize>,
    budget_tokens: bool,
    json: bool,
) -> Result<()> {
    let options = args.to_options(&config.search)?;
    let budget = budget_chars(config, budget, budget_tokens);

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let bundle = assemble_context(&store, &args.keywords, &options, budget).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    if bundle.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for item in &bundle.items {
        let s = &item.snippet;
        println!(
            "--- {} ({}) {}:{} [score {:.3}{}] ---",
            item.name,
            item.entity_type,
            item.file_path,
            item.start_line,
            s.score,
            if s.truncated {
                format!(", {:.0}% of {} chars", s.compression_ratio * 100.0, s.original_length)
            } else {
                String::new()
            }
        );
        println!("{}", s.content);
        println!();
    }
    println!(
        "budget: {} / {} chars, {} of {} results",
        bundle.used_chars,
        bundle.budget_chars,
        bundle.items.len(),
        bundle.candidates
    );

    Ok(())
}
