use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gck_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gck");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("discounts.md"),
        "# Discounts\n\nSAVE15 takes 15% off the cart total.\n\nApplying a code to an empty cart changes nothing.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("shipping.md"),
        "# Shipping\n\nExpress shipping costs $10.\n\nThe FREESHIP code removes the express fee.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("faq.txt"),
        "Invalid discount codes are rejected and leave the total unchanged.",
    )
    .unwrap();
    // Not matched by the include globs.
    fs::write(docs_dir.join("notes.rst"), "ignored").unwrap();

    fs::write(
        root.join("checkout.html"),
        "<html><body><span id=\"total-price\">$100.00</span></body></html>",
    )
    .unwrap();

    let config_content = format!(
        r#"[chunking]
chunk_size = 400
overlap = 50

[retrieval]
top_k = 3

[generation]
provider = "disabled"

[ingest]
root = "{}/docs"
include_globs = ["**/*.md", "**/*.txt"]

[page]
path = "checkout.html"
"#,
        root.display()
    );

    let config_path = config_dir.join("gck.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gck(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gck_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gck binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_cases(dir: &Path) -> PathBuf {
    let path = dir.join("cases.json");
    fs::write(
        &path,
        r#"[
  {"test_id": "DC1", "description": "Apply a code to an empty cart", "expected_result": "no change", "grounded_in": "discounts.md#0"},
  {"test_id": "DC2", "description": "Apply SAVE15 to a full cart", "expected_result": "15% off", "grounded_in": "discounts.md#0"}
]"#,
    )
    .unwrap();
    path
}

#[test]
fn test_ingest_reports_summary() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gck(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("generation: 1"));
    assert!(stdout.contains("model: hash-v1"));
    assert!(stdout.contains("skipped: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_missing_root_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope");

    let (_, stderr, success) = run_gck(
        &config_path,
        &["ingest", "--root", missing.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("nope"), "stderr={}", stderr);
}

#[test]
fn test_ingest_empty_root_fails() {
    let (tmp, config_path) = setup_test_env();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let (_, stderr, success) = run_gck(
        &config_path,
        &["ingest", "--root", empty.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("empty"), "stderr={}", stderr);
}

#[test]
fn test_query_lists_ranked_chunks() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gck(&config_path, &["query", "FREESHIP express", "--k", "2"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));
    assert!(stdout.contains("#0"));
}

#[test]
fn test_tests_prompt_only_shows_grounding_context() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gck(
        &config_path,
        &["tests", "discount codes", "--prompt-only"],
    );
    assert!(success, "tests failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("QA Automation Lead"));
    assert!(stdout.contains("[source:"));
    assert!(stdout.contains("grounded_in"));
    assert!(stdout.contains("[user]\ndiscount codes"));
}

#[test]
fn test_tests_without_backend_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_gck(&config_path, &["tests", "discount codes"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_script_prompt_only_selects_rule() {
    let (tmp, config_path) = setup_test_env();
    let cases = write_cases(tmp.path());
    let html = tmp.path().join("checkout.html");

    let (stdout, stderr, success) = run_gck(
        &config_path,
        &[
            "script",
            "--cases",
            cases.to_str().unwrap(),
            "--id",
            "DC2",
            "--html",
            html.to_str().unwrap(),
            "--prompt-only",
        ],
    );
    assert!(success, "script failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("# rule: percent-discount"));
    assert!(stdout.contains("expected = price_before * 0.85"));
    assert!(stdout.contains("id=\"total-price\""));
    assert!(stdout.contains("os.path.abspath(\"checkout.html\")"));
}

#[test]
fn test_script_defaults_to_first_case() {
    let (tmp, config_path) = setup_test_env();
    let cases = write_cases(tmp.path());
    let html = tmp.path().join("checkout.html");

    let (stdout, _, success) = run_gck(
        &config_path,
        &[
            "script",
            "--cases",
            cases.to_str().unwrap(),
            "--html",
            html.to_str().unwrap(),
            "--prompt-only",
        ],
    );
    assert!(success);
    assert!(stdout.contains("# rule: empty-cart"));
    assert!(stdout.contains("test_id: DC1"));
}

#[test]
fn test_script_unknown_id_fails() {
    let (tmp, config_path) = setup_test_env();
    let cases = write_cases(tmp.path());
    let html = tmp.path().join("checkout.html");

    let (_, stderr, success) = run_gck(
        &config_path,
        &[
            "script",
            "--cases",
            cases.to_str().unwrap(),
            "--id",
            "ZZ9",
            "--html",
            html.to_str().unwrap(),
        ],
    );
    assert!(!success);
    assert!(stderr.contains("DC1, DC2"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap();

    let (_, stderr, success) = run_gck(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr={}", stderr);
}
