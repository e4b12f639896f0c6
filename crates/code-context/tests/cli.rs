use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cctx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let src = root.join("repo/src");
    fs::create_dir_all(src.join("lib")).unwrap();
    fs::create_dir_all(root.join("repo/node_modules/dep")).unwrap();
    fs::write(
        src.join("cache.js"),
        "// LRU cache for rendered pages\nclass PageCache {\n  get(key) {\n    return this.items.get(key);\n  }\n}\n\nfunction warmCache(cache, keys) {\n  for (const key of keys) {\n    cache.get(key);\n  }\n}\n",
    )
    .unwrap();
    fs::write(
        src.join("lib/loader.js"),
        "export function load(path) {\n  return readFile(path);\n}\n",
    )
    .unwrap();
    fs::write(
        src.join("app.js"),
        "import { load } from './lib/loader';\n\nfunction main() {\n  load('config.json');\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("repo/node_modules/dep/index.js"),
        "function ignored() {}\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/cctx.sqlite"

[indexing]
root = "{}/repo"
include_globs = ["**/*.js"]

[search]
limit = 20

[compression]
budget_chars = 2000
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("cctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn init_and_index(config_path: &Path) {
    let (_, stderr, success) = run_cctx(config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (stdout, stderr, success) = run_cctx(config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success1) = run_cctx(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_cctx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_then_reindex_is_unchanged() {
    let (_tmp, config_path) = setup_test_env();
    run_cctx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_cctx(&config_path, &["index"]);
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("files scanned: 3"), "got: {}", stdout);
    assert!(stdout.contains("created: 3"));
    assert!(stdout.contains("ok"));

    let (stdout, _, _) = run_cctx(&config_path, &["index"]);
    assert!(stdout.contains("unchanged: 3"), "got: {}", stdout);
    assert!(stdout.contains("created: 0"));
}

#[test]
fn test_search_finds_function() {
    let (_tmp, config_path) = setup_test_env();
    init_and_index(&config_path);

    let (stdout, stderr, success) =
        run_cctx(&config_path, &["search", "warm", "cache", "--type", "function"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("warmCache"), "got: {}", stdout);
    assert!(!stdout.contains("ignored"));
}

#[test]
fn test_search_json_and_no_results() {
    let (_tmp, config_path) = setup_test_env();
    init_and_index(&config_path);

    let (stdout, _, success) = run_cctx(&config_path, &["search", "loader", "--json"]);
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(parsed.as_array().is_some());

    let (stdout, _, success) = run_cctx(&config_path, &["search", "zzyzx"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_rejects_unknown_strategy() {
    let (_tmp, config_path) = setup_test_env();
    init_and_index(&config_path);

    let (_, _, success) = run_cctx(&config_path, &["search", "cache", "--strategy", "vector"]);
    assert!(!success);
}

#[test]
fn test_context_respects_budget() {
    let (_tmp, config_path) = setup_test_env();
    init_and_index(&config_path);

    let (stdout, stderr, success) = run_cctx(
        &config_path,
        &["context", "cache", "--budget", "300", "--json"],
    );
    assert!(success, "context failed: {}", stderr);
    let bundle: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(bundle["budget_chars"], 300);
    assert!(bundle["used_chars"].as_u64().unwrap() <= 300);

    let (stdout, _, success) = run_cctx(
        &config_path,
        &["context", "cache", "--budget", "100", "--budget-tokens", "--json"],
    );
    assert!(success);
    let bundle: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(bundle["budget_chars"], 400);
}

#[test]
fn test_get_and_remove() {
    let (tmp, config_path) = setup_test_env();
    init_and_index(&config_path);

    let (stdout, _, _) = run_cctx(&config_path, &["search", "warmCache", "--json"]);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let id = results[0]["entity"]["entity_id"].as_str().unwrap().to_string();

    let (stdout, stderr, success) = run_cctx(&config_path, &["get", &id]);
    assert!(success, "get failed: {}", stderr);
    let view: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(view["entity"]["entity_id"], id.as_str());

    let (_, _, success) = run_cctx(&config_path, &["get", "no-such-id"]);
    assert!(!success);

    let cache_path = tmp.path().join("repo/src/cache.js");
    let (stdout, _, success) =
        run_cctx(&config_path, &["remove", cache_path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.starts_with("removed"), "got: {}", stdout);

    let (stdout, _, _) = run_cctx(&config_path, &["search", "warmCache"]);
    assert!(!stdout.contains("warmCache"), "got: {}", stdout);
}

#[test]
fn test_stats_and_decay() {
    let (_tmp, config_path) = setup_test_env();
    init_and_index(&config_path);

    let (stdout, stderr, success) = run_cctx(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Entities:"));
    assert!(stdout.contains("function"));

    let (stdout, _, success) = run_cctx(
        &config_path,
        &["decay", "--factor", "0.5", "--older-than-days", "0"],
    );
    assert!(success);
    assert!(stdout.contains("decayed"));

    let (_, _, success) = run_cctx(&config_path, &["decay", "--factor", "1.5"]);
    assert!(!success);
}
