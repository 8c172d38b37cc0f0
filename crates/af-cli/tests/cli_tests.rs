// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end CLI behavior via the `af` binary.

use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;
use std::fs;

use af_audit::{ActorType, AuditEntry, entry_hash};

fn af() -> Command {
    Command::cargo_bin("af").expect("binary builds")
}

/// A valid chain of `n` entries for `tenant`, in order.
fn chain(tenant: &str, n: usize) -> Vec<AuditEntry> {
    let mut entries = Vec::new();
    let mut prev: Option<String> = None;
    for i in 0..n {
        let mut entry = AuditEntry {
            id: Some(i as u64 + 1),
            tenant_id: tenant.to_string(),
            actor_type: ActorType::User,
            actor_id: "u1".to_string(),
            action: format!("action-{i}"),
            resource_type: "workflow".to_string(),
            resource_id: None,
            details: serde_json::json!({"n": i}),
            ts: Utc.timestamp_opt(1_760_000_000 + i as i64, 0).unwrap(),
            prev_hash: prev.clone(),
            hash: None,
        };
        entry.hash = Some(entry_hash(&entry).unwrap());
        prev = entry.hash.clone();
        entries.push(entry);
    }
    entries
}

fn write_jsonl(path: &std::path::Path, entries: &[AuditEntry]) {
    let lines: Vec<String> = entries
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    fs::write(path, lines.join("\n")).unwrap();
}

// ---------------------------------------------------------------------------
// audit verify
// ---------------------------------------------------------------------------

#[test]
fn audit_verify_valid_chain_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("audits.jsonl");
    write_jsonl(&input, &chain("t1", 5));

    af().args(["audit", "verify", "--input"])
        .arg(&input)
        .args(["--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"valid\""))
        .stdout(predicate::str::contains("\"total\": 5"));
}

#[test]
fn audit_verify_tampered_chain_exits_two_with_index() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("audits.jsonl");
    let mut entries = chain("T1", 3);
    entries[1].action = "forged".to_string();
    write_jsonl(&input, &entries);

    af().args(["audit", "verify", "--tenant", "T1", "--json", "--input"])
        .arg(&input)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"status\": \"tampered\""))
        .stdout(predicate::str::contains("\"first_tampered_index\": 1"));
}

#[test]
fn audit_verify_unknown_tenant_is_empty_and_valid() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("audits.jsonl");
    write_jsonl(&input, &chain("t1", 3));

    af().args(["audit", "verify", "--tenant", "ghost", "--json", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn audit_verify_missing_input_fails() {
    af().args(["audit", "verify", "--input", "/nonexistent/audits.jsonl"])
        .assert()
        .code(2);
}

#[test]
fn audit_verify_filters_by_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("audits.jsonl");
    let mut entries = chain("good", 2);
    let mut bad = chain("bad", 2);
    bad[0].details = serde_json::json!({"tampered": true});
    entries.extend(bad);
    write_jsonl(&input, &entries);

    // Only the intact tenant is checked.
    af().args(["audit", "verify", "--tenant", "good", "--json", "--input"])
        .arg(&input)
        .assert()
        .success();

    // Without the filter the tampered tenant flips the exit code.
    af().args(["audit", "verify", "--json", "--input"])
        .arg(&input)
        .assert()
        .code(2);
}

// ---------------------------------------------------------------------------
// backup
// ---------------------------------------------------------------------------

#[test]
fn backup_create_verify_restore_roundtrip() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("config.json"), "{\"a\": 1}").unwrap();
    fs::create_dir(source.path().join("nested")).unwrap();
    fs::write(source.path().join("nested/data.bin"), [0u8, 1, 2, 3]).unwrap();

    let out = tempfile::tempdir().unwrap();
    let backup_dir = out.path().join("backup-1");

    af().args(["backup", "create", "--source"])
        .arg(source.path())
        .arg("--out")
        .arg(&backup_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("backed up 2 files"));

    af().args(["backup", "verify", "--json", "--backup"])
        .arg(&backup_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"ok\""));

    let restored = tempfile::tempdir().unwrap();
    af().args(["backup", "restore", "--backup"])
        .arg(&backup_dir)
        .arg("--dest")
        .arg(restored.path())
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(restored.path().join("config.json")).unwrap(),
        "{\"a\": 1}"
    );
    assert_eq!(
        fs::read(restored.path().join("nested/data.bin")).unwrap(),
        vec![0u8, 1, 2, 3]
    );
}

#[test]
fn backup_verify_detects_tampered_file() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("a.txt"), "alpha").unwrap();
    fs::write(source.path().join("b.txt"), "bravo").unwrap();

    let out = tempfile::tempdir().unwrap();
    let backup_dir = out.path().join("backup-1");
    af().args(["backup", "create", "--source"])
        .arg(source.path())
        .arg("--out")
        .arg(&backup_dir)
        .assert()
        .success();

    fs::write(backup_dir.join("data/a.txt"), "tampered").unwrap();

    af().args(["backup", "verify", "--json", "--backup"])
        .arg(&backup_dir)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"status\": \"tampered\""))
        .stdout(predicate::str::contains("\"tampered_file\": \"a.txt\""))
        .stdout(predicate::str::contains("\"tampered_index\": 0"));
}

#[test]
fn tampered_backup_refuses_restore() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("a.txt"), "alpha").unwrap();

    let out = tempfile::tempdir().unwrap();
    let backup_dir = out.path().join("backup-1");
    af().args(["backup", "create", "--source"])
        .arg(source.path())
        .arg("--out")
        .arg(&backup_dir)
        .assert()
        .success();
    fs::write(backup_dir.join("data/a.txt"), "evil").unwrap();

    let restored = tempfile::tempdir().unwrap();
    af().args(["backup", "restore", "--backup"])
        .arg(&backup_dir)
        .arg("--dest")
        .arg(restored.path())
        .assert()
        .code(2);
    assert!(!restored.path().join("a.txt").exists());
}

#[test]
fn backup_list_shows_created_backups() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("a.txt"), "alpha").unwrap();

    let root = tempfile::tempdir().unwrap();
    af().args(["backup", "create", "--source"])
        .arg(source.path())
        .arg("--out")
        .arg(root.path().join("nightly"))
        .assert()
        .success();

    af().args(["backup", "list", "--json", "--dir"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly"))
        .stdout(predicate::str::contains("\"files\": 1"));
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_passes_with_sane_environment() {
    af().args(["validate", "--json"])
        .env_clear()
        .env("AF_JWT_SECRET", "0123456789abcdef0123456789abcdef")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"ok\""));
}

#[test]
fn validate_rejects_weak_secret_as_config_error() {
    af().args(["validate"])
        .env_clear()
        .env("AF_JWT_SECRET", "short")
        .assert()
        .code(3);
}

#[test]
fn validate_flags_missing_secrets_file_as_recoverable() {
    af().args(["validate", "--json"])
        .env_clear()
        .env("AF_JWT_SECRET", "0123456789abcdef0123456789abcdef")
        .env("AF_SECRETS_FILE", "/definitely/not/here/secrets.json")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"degraded\""));
}

#[test]
fn validate_rejects_malformed_database_url() {
    af().args(["validate"])
        .env_clear()
        .env("AF_JWT_SECRET", "0123456789abcdef0123456789abcdef")
        .env("AF_DATABASE_URL", "not-a-url")
        .assert()
        .code(3);
}
