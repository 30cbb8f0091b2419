use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docsift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docsift");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates, and more notes on cargo workspaces.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Beta plain text file.\n\nThis document discusses Python and machine learning. Deep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(files_dir.join("short.txt"), "Tiny note.").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docsift.sqlite"

[storage]
upload_dir = "{root}/data/uploads"

[chunking]
max_tokens = 64
overlap_tokens = 8

[server]
bind = "127.0.0.1:7332"
"#,
        root = root.display()
    );

    let config_path = root.join("config/docsift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docsift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docsift_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docsift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn first_id(listing: &str, filename: &str) -> String {
    listing
        .lines()
        .find(|l| l.contains(filename))
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or_else(|| panic!("{} not listed in:\n{}", filename, listing))
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docsift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docsift.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_docsift(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_docsift(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_directory_without_providers() {
    let (tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let files = tmp.path().join("files");
    let (stdout, stderr, success) =
        run_docsift(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingested: 3"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("ok"));
    // No embedder configured: documents stay keyword-searchable.
    assert!(stdout.contains("keyword-searchable"));

    let uploads = fs::read_dir(tmp.path().join("data/uploads")).unwrap().count();
    assert_eq!(uploads, 3);
}

#[test]
fn test_ingest_unsupported_type_reports_failure() {
    let (tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let bin = tmp.path().join("blob.bin");
    fs::write(&bin, [0u8, 1, 2, 3]).unwrap();
    let (stdout, stderr, success) = run_docsift(&config_path, &["ingest", bin.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("failed: 1"));
    assert!(stderr.contains("unsupported content type"));

    let (listing, _, _) = run_docsift(&config_path, &["list"]);
    assert!(listing.contains("failed"));
}

#[test]
fn test_list_get_and_keyword() {
    let (tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    run_docsift(
        &config_path,
        &["ingest", tmp.path().join("files").to_str().unwrap()],
    );

    let (listing, _, success) = run_docsift(&config_path, &["list"]);
    assert!(success);
    let id = first_id(&listing, "alpha.md");

    let (stdout, _, success) = run_docsift(&config_path, &["get", &id]);
    assert!(success, "get should succeed");
    assert!(stdout.contains("--- Document ---"));
    assert!(stdout.contains(&id));
    assert!(stdout.contains("(fallback)"));
    assert!(stdout.contains("Rust programming"));

    let (stdout, _, success) = run_docsift(&config_path, &["keyword", "cargo"]);
    assert!(success);
    assert!(stdout.contains("alpha.md (2 occurrences)"));
    assert!(!stdout.contains("beta.txt"));

    let (stdout, _, success) = run_docsift(&config_path, &["keyword", "xyznonexistent"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_short_document_is_its_own_summary() {
    let (tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    let short = tmp.path().join("files/short.txt");
    run_docsift(&config_path, &["ingest", short.to_str().unwrap()]);

    let (listing, _, _) = run_docsift(&config_path, &["list"]);
    let id = first_id(&listing, "short.txt");
    let (stdout, _, success) = run_docsift(&config_path, &["summarize", &id, "--mode", "long"]);
    assert!(success);
    assert!(stdout.contains("[long / placeholder]"));
    assert!(stdout.contains("Tiny note."));
}

#[test]
fn test_get_missing_document() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let (_, stderr, success) = run_docsift(&config_path, &["get", "nonexistent-id"]);
    assert!(!success, "get with missing ID should fail");
    assert!(
        stderr.contains("not found"),
        "Should report not found, got: {}",
        stderr
    );
}

#[test]
fn test_delete_document() {
    let (tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    let alpha = tmp.path().join("files/alpha.md");
    run_docsift(&config_path, &["ingest", alpha.to_str().unwrap()]);

    let (listing, _, _) = run_docsift(&config_path, &["list"]);
    let id = first_id(&listing, "alpha.md");

    let (stdout, _, success) = run_docsift(&config_path, &["delete", &id]);
    assert!(success);
    assert!(stdout.contains("deleted"));

    let (listing, _, _) = run_docsift(&config_path, &["list"]);
    assert!(listing.contains("No documents"));

    let (_, _, success) = run_docsift(&config_path, &["delete", &id]);
    assert!(!success, "second delete should fail");
}

#[test]
fn test_semantic_search_errors_when_embeddings_disabled() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let (_, stderr, success) = run_docsift(&config_path, &["search", "rust"]);
    assert!(!success);
    assert!(stderr.contains("unavailable"), "got: {}", stderr);
}

#[test]
fn test_reindex_errors_when_embeddings_disabled() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let (_, stderr, success) = run_docsift(&config_path, &["reindex"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_duplicates_rejects_out_of_range_threshold() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let (_, stderr, success) =
        run_docsift(&config_path, &["duplicates", "any-id", "--threshold", "2.0"]);
    assert!(!success);
    assert!(stderr.contains("--threshold"), "got: {}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, config_path) = setup_test_env();
    let broken = format!(
        "[db]\npath = \"{}/data/x.sqlite\"\n\n[dedup]\nthreshold = 1.5\n",
        tmp.path().display()
    );
    fs::write(&config_path, broken).unwrap();

    let (_, stderr, success) = run_docsift(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("dedup.threshold"));
}
