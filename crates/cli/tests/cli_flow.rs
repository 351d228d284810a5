use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn knowledge(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("knowledge").expect("binary");
    cmd.current_dir(workdir)
        .env("KNOWLEDGE_EMBEDDING_MODE", "stub")
        .env_remove("KNOWLEDGE_EMBEDDING_DIMENSIONS")
        .env_remove("KNOWLEDGE_EMBEDDING_MODEL")
        .env_remove("RUST_LOG")
        .arg("--store")
        .arg("data/knowledge");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn setup_uploads() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let uploads = temp.path().join("uploads");
    fs::create_dir_all(&uploads).unwrap();
    fs::write(
        uploads.join("vacation.txt"),
        "Vacation requests are filed through the HR portal.\n\nManagers approve them within three days.",
    )
    .unwrap();
    fs::write(
        uploads.join("expenses.md"),
        "# Expenses\n\nExpenses are reimbursed monthly. Keep every receipt.",
    )
    .unwrap();
    fs::write(uploads.join("scan.pdf"), b"%PDF-1.4").unwrap();
    temp
}

#[test]
fn ingest_then_reingest_is_incremental() {
    let temp = setup_uploads();
    let root = temp.path();

    let first = json_output(knowledge(root).args(["ingest", "uploads", "--json"]));
    assert_eq!(first["discovered"], 3);
    assert_eq!(first["processed"], 2);
    assert_eq!(first["failures"][0]["source_id"], "scan.pdf");
    assert_eq!(first["persisted"], true);
    let total = first["total_records"].as_u64().unwrap();
    assert!(total >= 2);

    let second = json_output(knowledge(root).args(["ingest", "uploads", "--json"]));
    assert_eq!(second["processed"], 0);
    assert_eq!(second["skipped"], 2);
    assert_eq!(second["persisted"], false);
    assert_eq!(second["total_records"].as_u64().unwrap(), total);
}

#[test]
fn query_returns_k_passages_in_distance_order() {
    let temp = setup_uploads();
    let root = temp.path();
    knowledge(root).args(["ingest", "uploads"]).assert().success();

    let body = json_output(knowledge(root).args([
        "query",
        "How do I request vacation?",
        "-k",
        "2",
        "--json",
    ]));
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    let d0 = results[0]["distance"].as_f64().unwrap();
    let d1 = results[1]["distance"].as_f64().unwrap();
    assert!(d0 <= d1);
    assert!(results[0]["source"].is_string());
}

#[test]
fn query_on_empty_store_reports_no_results() {
    let temp = tempdir().unwrap();
    knowledge(temp.path())
        .args(["query", "anything at all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results."));
}

#[test]
fn status_lists_sources() {
    let temp = setup_uploads();
    let root = temp.path();
    knowledge(root).args(["ingest", "uploads"]).assert().success();

    let status = json_output(knowledge(root).args(["status", "--json"]));
    assert_eq!(status["dimension"], 384);
    assert_eq!(status["generation"], 1);
    assert_eq!(
        status["sources"],
        serde_json::json!(["expenses.md", "vacation.txt"])
    );
}

#[test]
fn rebuild_drops_removed_sources() {
    let temp = setup_uploads();
    let root = temp.path();
    knowledge(root).args(["ingest", "uploads"]).assert().success();
    fs::remove_file(root.join("uploads/expenses.md")).unwrap();

    let stats = json_output(knowledge(root).args(["rebuild", "uploads", "--json"]));
    assert_eq!(stats["rebuilt"], true);
    assert_eq!(stats["processed"], 1);

    let status = json_output(knowledge(root).args(["status", "--json"]));
    assert_eq!(status["sources"], serde_json::json!(["vacation.txt"]));
}

#[test]
fn config_file_next_to_store_sets_defaults() {
    let temp = setup_uploads();
    let root = temp.path();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(
        root.join("data/knowledge.toml"),
        "[embedding]\ndimensions = 16\n\n[retrieval]\nk = 1\n",
    )
    .unwrap();

    knowledge(root).args(["ingest", "uploads"]).assert().success();
    let status = json_output(knowledge(root).args(["status", "--json"]));
    assert_eq!(status["dimension"], 16);

    let body = json_output(knowledge(root).args(["query", "receipts", "--json"]));
    assert_eq!(body["k"], 1);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

#[test]
fn invalid_chunking_fails_the_command() {
    let temp = setup_uploads();
    knowledge(temp.path())
        .args(["ingest", "uploads", "--chunk-size", "10", "--overlap", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlap"));
}

#[test]
fn corrupt_store_is_reported_not_reset() {
    let temp = setup_uploads();
    let root = temp.path();
    knowledge(root).args(["ingest", "uploads"]).assert().success();
    fs::write(root.join("data/knowledge/manifest.json"), "garbage").unwrap();

    knowledge(root)
        .args(["status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Corrupt"));
}
