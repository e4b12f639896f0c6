//! `cctx search`: ranked entity search from the command line.
//!
//! Command-line flags are layered over the `[search]` config section to
//! build a [`SearchOptions`], which then runs through the core
//! [`SearchEngine`] against the SQLite store.
//!
//! ```bash
//! cctx search cache eviction --strategy fts --type function --limit 5
//! cctx search "load user" --exact --json
//! cctx search parse token --near 4 --path 'src/**' --since 2026-01-01
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use code_context_core::models::{EntityType, MatchSource, SearchResult};
use code_context_core::search::{CustomRanking, DateRange, SearchEngine, SearchOptions};

use crate::config::{Config, SearchConfig};
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Search flags shared by `cctx search` and `cctx context`.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Query keywords. Quoted arguments are split on whitespace.
    #[arg(required = true)]
    pub keywords: Vec<String>,

    /// Retrieval strategy: `fts`, `keywords`, or `combined`.
    #[arg(long)]
    pub strategy: Option<String>,

    /// How full-text terms combine: `AND` or `OR`.
    #[arg(long)]
    pub operator: Option<String>,

    /// Match the keywords as one exact phrase.
    #[arg(long)]
    pub exact: bool,

    /// Require all terms within a token distance (default from config).
    #[arg(long, num_args = 0..=1, value_name = "DISTANCE")]
    pub near: Option<Option<u32>>,

    /// Only return entities of this type (repeatable).
    #[arg(long = "type", value_name = "TYPE")]
    pub types: Vec<String>,

    /// Only return entities whose file path matches this glob (repeatable).
    #[arg(long = "path", value_name = "GLOB")]
    pub paths: Vec<String>,

    /// Only entities modified on or after this date (YYYY-MM-DD).
    #[arg(long)]
    pub since: Option<String>,

    /// Only entities modified on or before this date (YYYY-MM-DD).
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum number of results.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Drop results scoring below this value.
    #[arg(long)]
    pub min_relevance: Option<f64>,

    /// Order by `relevance`, `importance`, `recent`, `accessed`, or `name`
    /// instead of the type-weighted score.
    #[arg(long)]
    pub rank: Option<String>,
}

impl SearchArgs {
    /// Layer these flags over the configured defaults.
    pub fn to_options(&self, defaults: &SearchConfig) -> Result<SearchOptions> {
        let mut options = defaults.search_options()?;

        if let Some(ref s) = self.strategy {
            options.strategy = s.parse()?;
        }
        if let Some(ref op) = self.operator {
            options.boolean_operator = op.parse()?;
        }
        options.use_exact_match = self.exact;
        if let Some(near) = self.near {
            options.use_proximity = true;
            if let Some(distance) = near {
                options.proximity_distance = distance;
            }
        }
        options.entity_types = self
            .types
            .iter()
            .map(|t| t.parse::<EntityType>())
            .collect::<Result<Vec<_>>>()?;
        options.file_paths = self.paths.clone();

        let start = self.since.as_deref().map(|d| day_bound(d, false)).transpose()?;
        let end = self.until.as_deref().map(|d| day_bound(d, true)).transpose()?;
        if start.is_some() || end.is_some() {
            options.date_range = Some(DateRange { start, end });
        }

        if let Some(limit) = self.limit {
            if limit == 0 {
                anyhow::bail!("--limit must be >= 1");
            }
            options.limit = limit;
        }
        options.min_relevance = self.min_relevance;
        options.custom_ranking = self
            .rank
            .as_deref()
            .map(str::parse::<CustomRanking>)
            .transpose()?;

        Ok(options)
    }
}

/// Unix seconds at the start (or end) of a `YYYY-MM-DD` day, UTC.
fn day_bound(date: &str, end_of_day: bool) -> Result<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
    let (h, m, s) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
    let at = day
        .and_hms_opt(h, m, s)
        .with_context(|| format!("Invalid time of day for {}", date))?;
    Ok(at.and_utc().timestamp())
}

/// CLI entry point for `cctx search`.
pub async fn run_search(config: &Config, args: &SearchArgs, json: bool) -> Result<()> {
    let options = args.to_options(&config.search)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let results = SearchEngine::new(&store)
        .search(&args.keywords, &options)
        .await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}", format_result_line(i + 1, result));
    }

    Ok(())
}

/// One human-readable result line.
pub fn format_result_line(position: usize, result: &SearchResult) -> String {
    let e = &result.entity;
    let source = match result.match_source {
        MatchSource::Fts => "fts",
        MatchSource::Keywords => "keywords",
        MatchSource::Both => "both",
    };
    format!(
        "{:>3}. [{:.3}] {:<12} {}  {}:{}-{}  ({})",
        position,
        result.relevance_score,
        e.entity_type.as_str(),
        e.name,
        e.file_path,
        e.start_line,
        e.end_line,
        source
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_context_core::search::{BooleanOperator, SearchStrategy};
    use pretty_assertions::assert_eq;

    fn args(keywords: &[&str]) -> SearchArgs {
        SearchArgs {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            ..SearchArgs::default()
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut a = args(&["cache"]);
        a.strategy = Some("keywords".into());
        a.operator = Some("AND".into());
        a.near = Some(None);
        a.types = vec!["function".into(), "class".into()];
        a.limit = Some(7);
        a.rank = Some("name".into());

        let opts = a.to_options(&SearchConfig::default()).unwrap();
        assert_eq!(opts.strategy, SearchStrategy::Keywords);
        assert_eq!(opts.boolean_operator, BooleanOperator::And);
        assert!(opts.use_proximity);
        assert_eq!(opts.proximity_distance, 10);
        assert_eq!(opts.entity_types, vec![EntityType::Function, EntityType::Class]);
        assert_eq!(opts.limit, 7);
        assert_eq!(opts.custom_ranking, Some(CustomRanking::Name));
    }

    #[test]
    fn test_dates_become_inclusive_range() {
        let mut a = args(&["x"]);
        a.since = Some("2026-01-01".into());
        a.until = Some("2026-01-01".into());
        let range = a
            .to_options(&SearchConfig::default())
            .unwrap()
            .date_range
            .unwrap();
        assert_eq!(range.start, Some(1_767_225_600));
        assert_eq!(range.end, Some(1_767_225_600 + 86_399));
    }

    #[test]
    fn test_bad_flags_are_rejected() {
        let mut a = args(&["x"]);
        a.types = vec!["widget".into()];
        assert!(a.to_options(&SearchConfig::default()).is_err());

        let mut a = args(&["x"]);
        a.since = Some("01/02/2026".into());
        assert!(a.to_options(&SearchConfig::default()).is_err());

        let mut a = args(&["x"]);
        a.limit = Some(0);
        assert!(a.to_options(&SearchConfig::default()).is_err());
    }
}
