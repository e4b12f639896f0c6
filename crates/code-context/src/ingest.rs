//! Filesystem indexing for `cctx index`.
//!
//! Walks each requested path with `walkdir`, filters files through the
//! configured include/exclude globs, and hands every file to the core
//! [`Indexer`]. Unchanged files are cheap: the indexer compares content
//! hashes before doing any work.
//!
//! Paths are stored as given on the command line, minus `.` components and
//! with `/` separators, so `cctx index .` and `cctx index src` agree on the
//! key of `src/app.js`.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use code_context_core::indexer::{IndexOutcome, Indexer};
use code_context_core::store::Store;

use crate::config::{Config, IndexingConfig};
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Totals for one `cctx index` run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexSummary {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub entities: usize,
    pub relationships: usize,
    pub unresolved: usize,
}

/// A file selected for indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Path on disk.
    pub path: PathBuf,
    /// Key stored as the entity's `file_path`.
    pub key: String,
}

/// CLI entry point for `cctx index [PATH...]`.
pub async fn run_index(config: &Config, paths: &[PathBuf], language: Option<&str>) -> Result<()> {
    let roots: Vec<PathBuf> = if paths.is_empty() {
        vec![config
            .indexing
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))]
    } else {
        paths.to_vec()
    };

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let mut files = Vec::new();
    for root in &roots {
        files.extend(collect_files(&config.indexing, root)?);
    }

    let summary = index_files(&store, &config.indexing, &files, language).await?;
    pool.close().await;

    println!("index {}", display_roots(&roots));
    println!("  files scanned: {}", summary.scanned);
    println!("  created: {}", summary.created);
    println!("  updated: {}", summary.updated);
    println!("  unchanged: {}", summary.unchanged);
    println!("  skipped: {}", summary.skipped);
    println!("  entities: {}", summary.entities);
    println!("  relationships: {}", summary.relationships);
    println!("  unresolved: {}", summary.unresolved);
    println!("ok");

    Ok(())
}

/// CLI entry point for `cctx remove <PATH>`.
pub async fn run_remove(config: &Config, path: &Path) -> Result<()> {
    let key = path_key(path);

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let removed = Indexer::new(&store, config.indexing.index_options())
        .remove_file(&key)
        .await?;
    pool.close().await;

    if removed {
        println!("removed {}", key);
    } else {
        println!("not indexed: {}", key);
    }
    Ok(())
}

/// Index every file in `files` through `store`.
///
/// Files that are too large or not UTF-8 are skipped and counted.
pub async fn index_files<S: Store>(
    store: &S,
    indexing: &IndexingConfig,
    files: &[SourceFile],
    language: Option<&str>,
) -> Result<IndexSummary> {
    let indexer = Indexer::new(store, indexing.index_options());
    let mut summary = IndexSummary::default();

    for file in files {
        summary.scanned += 1;

        let size = std::fs::metadata(&file.path)
            .with_context(|| format!("Failed to stat {}", file.path.display()))?
            .len();
        if size > indexing.max_file_bytes {
            tracing::debug!(path = %file.key, size, "file too large, skipping");
            summary.skipped += 1;
            continue;
        }

        let content = match std::fs::read_to_string(&file.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %file.key, error = %e, "unreadable file, skipping");
                summary.skipped += 1;
                continue;
            }
        };

        let report = indexer
            .index_file(&file.key, &content, language)
            .await
            .with_context(|| format!("Failed to index {}", file.key))?;

        match report.outcome {
            IndexOutcome::Created => summary.created += 1,
            IndexOutcome::Updated => summary.updated += 1,
            IndexOutcome::Unchanged => summary.unchanged += 1,
        }
        summary.entities += report.entities;
        summary.relationships += report.relationships;
        summary.unresolved += report.unresolved;
    }

    Ok(summary)
}

/// Expand `root` into the files to index.
///
/// A file path is taken as-is, ignoring the globs. A directory is walked and
/// each file's path relative to `root` must match an include glob and no
/// exclude glob. `.git`, `target` and `node_modules` are always excluded.
pub fn collect_files(indexing: &IndexingConfig, root: &Path) -> Result<Vec<SourceFile>> {
    if !root.exists() {
        bail!("Path does not exist: {}", root.display());
    }

    if root.is_file() {
        return Ok(vec![SourceFile {
            path: root.to_path_buf(),
            key: path_key(root),
        }]);
    }

    let include_set = build_globset(&indexing.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(indexing.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(indexing.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(SourceFile {
            path: path.to_path_buf(),
            key: path_key(path),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(files)
}

/// Normalize a path into a stored `file_path`: `.` components dropped and
/// `/` as separator.
pub fn path_key(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| match c {
            Component::RootDir => String::new(),
            other => other.as_os_str().to_string_lossy().to_string(),
        })
        .collect();
    parts.join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn display_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn indexing(include: &[&str], exclude: &[&str]) -> IndexingConfig {
        IndexingConfig {
            include_globs: include.iter().map(|s| s.to_string()).collect(),
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            ..IndexingConfig::default()
        }
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for dir in ["src/lib", "node_modules/dep", "target/debug", "vendor"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("src/app.js"), "function main() {}\n").unwrap();
        fs::write(root.join("src/lib/util.js"), "export const x = 1;\n").unwrap();
        fs::write(root.join("src/notes.md"), "# Notes\n").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "module.exports = 1;\n").unwrap();
        fs::write(root.join("target/debug/gen.js"), "var g;\n").unwrap();
        fs::write(root.join("vendor/v.js"), "var v;\n").unwrap();
        tmp
    }

    fn relative_keys(files: &[SourceFile], root: &Path) -> Vec<String> {
        let prefix = format!("{}/", path_key(root));
        files
            .iter()
            .map(|f| f.key.trim_start_matches(prefix.as_str()).to_string())
            .collect()
    }

    #[test]
    fn test_collect_applies_globs_and_default_excludes() {
        let tmp = tree();
        let files = collect_files(&indexing(&["**/*.js"], &["vendor/**"]), tmp.path()).unwrap();
        assert_eq!(
            relative_keys(&files, tmp.path()),
            vec!["src/app.js", "src/lib/util.js"]
        );
    }

    #[test]
    fn test_collect_single_file_ignores_globs() {
        let tmp = tree();
        let file = tmp.path().join("src/notes.md");
        let files = collect_files(&indexing(&["**/*.js"], &[]), &file).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].key.ends_with("src/notes.md"));
    }

    #[test]
    fn test_collect_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let err = collect_files(&IndexingConfig::default(), &tmp.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_bad_glob_is_reported() {
        let tmp = tree();
        let err = collect_files(&indexing(&["src/["], &[]), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid glob"));
    }

    #[test]
    fn test_path_key_drops_cur_dir() {
        assert_eq!(path_key(Path::new("./src/app.js")), "src/app.js");
        assert_eq!(path_key(Path::new("src/./lib/x.ts")), "src/lib/x.ts");
        assert_eq!(path_key(Path::new("/abs/x.py")), "/abs/x.py");
    }
}
