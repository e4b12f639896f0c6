//! Database statistics and maintenance.
//!
//! `cctx stats` summarizes what is indexed: entity counts per type, keyword
//! and relationship totals, and the size of the database file.
//! `cctx decay` lowers the importance of entities nobody has retrieved
//! recently.

use anyhow::{bail, Result};

use code_context_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

const SECONDS_PER_DAY: i64 = 86_400;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let stats = store.stats().await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Code Context Database Stats");
    println!("===========================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!();
    println!("  Entities:       {}", stats.total_entities);
    println!("  Keywords:       {}", stats.total_keywords);
    println!("  Relationships:  {}", stats.total_relationships);

    if !stats.entities_by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<16} {:>8}", "TYPE", "COUNT");
        println!("  {}", "-".repeat(25));
        for (entity_type, count) in &stats.entities_by_type {
            println!("  {:<16} {:>8}", entity_type, count);
        }
    }

    println!();
    Ok(())
}

/// Run the decay command.
///
/// Entities whose `last_accessed_at` is older than `older_than_days` have
/// their `importance_score` multiplied by `factor`.
pub async fn run_decay(config: &Config, factor: f64, older_than_days: u32) -> Result<()> {
    if !(factor > 0.0 && factor <= 1.0) {
        bail!("--factor must be in (0.0, 1.0], got {}", factor);
    }
    let cutoff = chrono::Utc::now().timestamp() - i64::from(older_than_days) * SECONDS_PER_DAY;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let updated = store.decay_importance(factor, cutoff).await?;
    pool.close().await;

    tracing::info!(updated, factor, cutoff, "importance decayed");
    println!("decayed {} entities (factor {})", updated, factor);
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
