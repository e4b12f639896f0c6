//! # Code Context CLI (`cctx`)
//!
//! ## Usage
//!
//! ```bash
//! cctx --config ./config/cctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cctx init` | Create the SQLite database and schema |
//! | `cctx index [PATH...]` | Index files (incremental by content hash) |
//! | `cctx remove <PATH>` | Drop a file and everything extracted from it |
//! | `cctx search <KEYWORDS...>` | Ranked entity search |
//! | `cctx context <KEYWORDS...>` | Search and compress into a budget |
//! | `cctx get <ID>` | Entity, children and relationships as JSON |
//! | `cctx decay` | Lower importance of entities not accessed recently |
//! | `cctx stats` | Database statistics |
//!
//! Logs go to stderr. `-v` enables debug output, `-vv` trace; `RUST_LOG`
//! takes precedence when set.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use code_context::search::SearchArgs;
use code_context::{config, context, get, ingest, migrate, search, stats};

/// Code Context CLI: index source code and retrieve budgeted context.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cctx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cctx",
    about = "Code Context: a local code-aware context engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cctx.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the entity, keyword and
    /// relationship tables, and the FTS5 index. Safe to run repeatedly.
    Init,

    /// Index source files.
    ///
    /// Directories are walked and filtered by `[indexing]` globs; files are
    /// indexed directly. Files whose content hash is unchanged are skipped.
    Index {
        /// Files or directories. Defaults to `[indexing] root`, then `.`.
        paths: Vec<PathBuf>,

        /// Force a language instead of detecting it from the extension.
        #[arg(long)]
        language: Option<String>,
    },

    /// Remove a file and all entities extracted from it.
    Remove {
        /// Path as it was indexed.
        path: PathBuf,
    },

    /// Search indexed entities.
    Search {
        #[command(flatten)]
        args: SearchArgs,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search, then compress the results into a size budget.
    Context {
        #[command(flatten)]
        args: SearchArgs,

        /// Budget in characters (default `[compression] budget_chars`).
        #[arg(long)]
        budget: Option<usize>,

        /// Interpret `--budget` as tokens (4 characters each).
        #[arg(long, requires = "budget")]
        budget_tokens: bool,

        /// Print the bundle as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show an entity with its children and relationships.
    Get {
        /// Entity UUID.
        id: String,
    },

    /// Decay the importance of entities not accessed recently.
    Decay {
        /// Multiplier applied to `importance_score`, in (0, 1].
        #[arg(long, default_value_t = 0.9)]
        factor: f64,

        /// Only entities not accessed for this many days.
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
    },

    /// Show database statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { paths, language } => {
            ingest::run_index(&cfg, &paths, language.as_deref()).await?;
        }
        Commands::Remove { path } => {
            ingest::run_remove(&cfg, &path).await?;
        }
        Commands::Search { args, json } => {
            search::run_search(&cfg, &args, json).await?;
        }
        Commands::Context {
            args,
            budget,
            budget_tokens,
            json,
        } => {
            context::run_context(&cfg, &args, budget, budget_tokens, json).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Decay {
            factor,
            older_than_days,
        } => {
            stats::run_decay(&cfg, factor, older_than_days).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
