use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn aidx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("aidx");
    path
}

const RECORDS_V1: &str = r#"[
  {
    "groupId": "org.apache.maven.indexer",
    "artifactId": "indexer-core",
    "version": "6.0.0",
    "packaging": "jar",
    "sha1": "7ab67e6b20e5332a7fb4fdf2f019aec4275846c2",
    "classNames": ["org.apache.maven.index.DefaultNexusIndexer"],
    "description": "Maven Indexer core",
    "lastModified": "2024-03-01T00:00:00Z",
    "size": 1024
  },
  {
    "groupId": "org.apache.maven.plugins",
    "artifactId": "maven-compiler-plugin",
    "version": "1.0",
    "packaging": "maven-plugin",
    "pluginPrefix": "compiler",
    "pluginGoals": ["compile", "testCompile"],
    "lastModified": "2024-03-01T00:00:00Z"
  }
]"#;

const RECORDS_V2: &str = r#"[
  {
    "groupId": "org.apache.maven.indexer",
    "artifactId": "indexer-core",
    "version": "6.0.0",
    "packaging": "jar",
    "sha1": "7ab67e6b20e5332a7fb4fdf2f019aec4275846c2",
    "classNames": ["org.apache.maven.index.DefaultNexusIndexer"],
    "description": "Maven Indexer core",
    "lastModified": "2024-03-01T00:00:00Z",
    "size": 1024
  },
  {
    "groupId": "org.apache.maven.plugins",
    "artifactId": "maven-compiler-plugin",
    "version": "1.0",
    "packaging": "maven-plugin",
    "pluginPrefix": "compiler",
    "pluginGoals": ["compile", "testCompile"],
    "lastModified": "2024-03-01T00:00:00Z"
  },
  {
    "groupId": "org.apache.maven.plugins",
    "artifactId": "maven-compiler-plugin",
    "version": "2.0",
    "packaging": "maven-plugin",
    "pluginPrefix": "compiler",
    "pluginGoals": ["compile", "testCompile"],
    "lastModified": "2024-03-08T00:00:00Z"
  }
]"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("records-v1.json"), RECORDS_V1).unwrap();
    fs::write(root.join("records-v2.json"), RECORDS_V2).unwrap();

    let config_content = format!(
        r#"[context]
id = "test-context"
repository_id = "test-repo"
repository_url = "file://{root}/published"
cache_dir = "{root}/local/cache"
index_dir = "{root}/local/index"

[update]
policy = "always"

[search]
result_limit = 10
"#,
        root = root.display()
    );

    let config_path = config_dir.join("aidx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_aidx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = aidx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run aidx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn pack(config_path: &Path, records: &str, timestamp: &str) {
    let root = config_path.parent().unwrap().parent().unwrap();
    let records = root.join(records);
    let out = root.join("published");
    let (stdout, stderr, success) = run_aidx(
        config_path,
        &[
            "pack",
            "--records",
            records.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--timestamp",
            timestamp,
        ],
    );
    assert!(success, "pack failed: {}", stderr);
    assert!(stdout.contains("ok"), "stdout: {}", stdout);
}

#[test]
fn test_update_then_search() {
    let (_tmp, config) = setup_test_env();
    pack(&config, "records-v1.json", "2024-03-01T00:00:00Z");

    let (stdout, stderr, success) = run_aidx(&config, &["update", "--progress", "off"]);
    assert!(success, "update failed: {}", stderr);
    assert!(stdout.contains("outcome: full update"), "stdout: {}", stdout);

    let (stdout, _, success) = run_aidx(
        &config,
        &["search", "sha1:7ab67e6b20e5332a7fb4fdf2f019aec4275846c2"],
    );
    assert!(success);
    assert!(stdout.contains("org.apache.maven.indexer:indexer-core:6.0.0"));
    assert!(stdout.contains("1 of 1 matches shown."));

    let (stdout, _, success) = run_aidx(&config, &["search", "classNames~DefaultNexusIndexer"]);
    assert!(success);
    assert!(stdout.contains("indexer-core"));
}

#[test]
fn test_incremental_update_and_grouping() {
    let (_tmp, config) = setup_test_env();
    pack(&config, "records-v1.json", "2024-03-01T00:00:00Z");
    let (_, stderr, success) = run_aidx(&config, &["update", "--progress", "off"]);
    assert!(success, "update failed: {}", stderr);

    pack(&config, "records-v2.json", "2024-03-08T00:00:00Z");
    let (stdout, stderr, success) = run_aidx(&config, &["update", "--progress", "off"]);
    assert!(success, "update failed: {}", stderr);
    assert!(stdout.contains("outcome: incremental update"), "stdout: {}", stdout);
    assert!(stdout.contains("chunks applied: 1"));

    let (stdout, _, success) = run_aidx(&config, &["grouped", "packaging:maven-plugin", "--by", "ga"]);
    assert!(success);
    assert!(stdout.contains("org.apache.maven.plugins:maven-compiler-plugin"));
    assert!(stdout.contains("latest: 2.0"), "stdout: {}", stdout);
    assert!(stdout.contains("1 groups, 2 matching artifacts."));

    let (stdout, _, success) = run_aidx(&config, &["update", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("outcome: no update"));
}

#[test]
fn test_status_reports_counts() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_aidx(&config, &["status"]);
    assert!(success);
    assert!(stdout.contains("(no local index)"));

    pack(&config, "records-v1.json", "2024-03-01T00:00:00Z");
    run_aidx(&config, &["update", "--progress", "off"]);
    let (stdout, _, success) = run_aidx(&config, &["status"]);
    assert!(success);
    assert!(stdout.contains("Documents:   2"), "stdout: {}", stdout);
}

#[test]
fn test_invalid_query_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_aidx(&config, &["search", "nosuchfield:x"]);
    assert!(!success);
    assert!(stderr.contains("invalid query"), "stderr: {}", stderr);
}

#[test]
fn test_update_without_repository_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_aidx(&config, &["update", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("index-manifest.json"), "stderr: {}", stderr);
}

#[test]
fn test_close_delete_removes_index() {
    let (tmp, config) = setup_test_env();
    pack(&config, "records-v1.json", "2024-03-01T00:00:00Z");
    run_aidx(&config, &["update", "--progress", "off"]);
    assert!(tmp.path().join("local/index/index-snapshot.json").exists());

    let (stdout, _, success) = run_aidx(&config, &["close", "--delete"]);
    assert!(success);
    assert!(stdout.contains("closed test-context"));
    assert!(!tmp.path().join("local/index").exists());
}
