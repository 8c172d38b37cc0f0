// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.
//!
//! Commands return the process exit code instead of calling
//! `std::process::exit` themselves, so destructors run and tests can drive
//! them directly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_audit::AuditEntry;
use af_audit::verify::{VerificationReport, verify_entries};
use af_core::sha256_hex;
use af_secrets::{FileBackend, SecretsProvider};

use crate::format::{print_json, status_marker};
use crate::{EXIT_CONFIG, EXIT_INTEGRITY, EXIT_OK, EXIT_RECOVERABLE};

// ---------------------------------------------------------------------------
// audit verify
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AuditVerifyOutput {
    status: &'static str,
    tenant: String,
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_tampered_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    throughput_per_sec: f64,
}

impl AuditVerifyOutput {
    fn from_report(tenant: &str, report: &VerificationReport) -> Self {
        Self {
            status: if report.valid { "valid" } else { "tampered" },
            tenant: tenant.to_string(),
            total: report.total,
            first_tampered_index: report.first_tampered_index,
            error_message: report.error_message.clone(),
            throughput_per_sec: report.throughput_per_sec,
        }
    }
}

/// `af audit verify --input <export.jsonl> [--tenant <id>] [--json]`
///
/// The export is one JSON entry per line, in chain order per tenant.
pub fn audit_verify(input: &Path, tenant: Option<&str>, json: bool) -> i32 {
    let raw = match fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("cannot read {}: {e}", input.display());
            return EXIT_INTEGRITY;
        }
    };

    // Group by tenant, preserving file order within each chain.
    let mut chains: BTreeMap<String, Vec<AuditEntry>> = BTreeMap::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => chains.entry(entry.tenant_id.clone()).or_default().push(entry),
            Err(e) => {
                eprintln!("line {}: not an audit entry: {e}", lineno + 1);
                return EXIT_INTEGRITY;
            }
        }
    }

    if let Some(tenant) = tenant {
        chains.retain(|t, _| t == tenant);
        chains.entry(tenant.to_string()).or_default();
    }

    let mut outputs = Vec::new();
    let mut all_valid = true;
    for (tenant, entries) in &chains {
        let report = verify_entries(entries);
        all_valid &= report.valid;
        outputs.push(AuditVerifyOutput::from_report(tenant, &report));
    }

    if json {
        if outputs.len() == 1 {
            print_json(&outputs[0]);
        } else {
            print_json(&outputs);
        }
    } else {
        for out in &outputs {
            match out.first_tampered_index {
                None => println!(
                    "tenant {}: {} ({} entries, {:.0}/s)",
                    out.tenant,
                    status_marker(true),
                    out.total,
                    out.throughput_per_sec
                ),
                Some(index) => println!(
                    "tenant {}: {} at index {index}",
                    out.tenant,
                    status_marker(false)
                ),
            }
        }
    }

    if all_valid { EXIT_OK } else { EXIT_INTEGRITY }
}

// ---------------------------------------------------------------------------
// backup
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    path: String,
    sha256: String,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    created_at: DateTime<Utc>,
    files: Vec<ManifestFile>,
    /// Hash of the manifest with this field nulled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manifest_sha256: Option<String>,
}

fn manifest_hash(manifest: &Manifest) -> anyhow::Result<String> {
    let mut value = serde_json::to_value(manifest)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("manifest_sha256");
    }
    Ok(sha256_hex(serde_json::to_string(&value)?.as_bytes()))
}

/// Progress of a `backup verify` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupVerifyState {
    /// Reading `manifest.json`.
    LoadingManifest,
    /// Recomputing the manifest's own hash.
    VerifyingManifestHash,
    /// Checking file `index` of `total`.
    VerifyingFiles {
        /// Zero-based file index.
        index: usize,
        /// Total files in the manifest.
        total: usize,
    },
    /// Every file matched.
    Ok,
    /// A file failed its hash.
    Tampered {
        /// Relative path of the failing file.
        file: String,
        /// Zero-based index of the failing file.
        index: usize,
    },
}

/// `af backup create --source <dir> --out <dir>`
pub fn backup_create(source: &Path, out: &Path) -> i32 {
    match try_backup_create(source, out) {
        Ok(count) => {
            println!("backed up {count} files to {}", out.display());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("backup failed: {e:#}");
            EXIT_CONFIG
        }
    }
}

fn try_backup_create(source: &Path, out: &Path) -> anyhow::Result<usize> {
    use anyhow::Context;

    fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(source).sort_by_file_name() {
        let entry = entry.context("walk source tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source)
            .context("relativize path")?;
        let bytes =
            fs::read(entry.path()).with_context(|| format!("read {}", entry.path().display()))?;

        let dest = out.join("data").join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &bytes).with_context(|| format!("write {}", dest.display()))?;

        files.push(ManifestFile {
            path: rel.to_string_lossy().to_string(),
            sha256: sha256_hex(&bytes),
            size: bytes.len() as u64,
        });
    }

    let mut manifest = Manifest {
        created_at: Utc::now(),
        files,
        manifest_sha256: None,
    };
    manifest.manifest_sha256 = Some(manifest_hash(&manifest)?);
    fs::write(
        out.join("manifest.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(manifest.files.len())
}

#[derive(Debug, Serialize)]
struct BackupVerifyOutput {
    status: &'static str,
    files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tampered_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tampered_index: Option<usize>,
}

/// `af backup verify --backup <dir> [--json]`
///
/// Walks LoadingManifest → VerifyingManifestHash → VerifyingFiles(i/N) →
/// Ok | Tampered. The first failing file index is reported and the exit
/// code is 2.
pub fn backup_verify(backup: &Path, json: bool) -> i32 {
    let (state, total) = run_backup_verify(backup);
    let output = match &state {
        BackupVerifyState::Ok => BackupVerifyOutput {
            status: "ok",
            files: total,
            tampered_file: None,
            tampered_index: None,
        },
        BackupVerifyState::Tampered { file, index } => BackupVerifyOutput {
            status: "tampered",
            files: total,
            tampered_file: Some(file.clone()),
            tampered_index: Some(*index),
        },
        _ => BackupVerifyOutput {
            status: "unreadable",
            files: 0,
            tampered_file: None,
            tampered_index: None,
        },
    };

    if json {
        print_json(&output);
    } else {
        match &state {
            BackupVerifyState::Ok => println!("backup {}: {} files ok", backup.display(), total),
            BackupVerifyState::Tampered { file, index } => {
                println!("backup {}: TAMPERED '{file}' (index {index})", backup.display());
            }
            _ => println!("backup {}: unreadable manifest", backup.display()),
        }
    }

    match state {
        BackupVerifyState::Ok => EXIT_OK,
        _ => EXIT_INTEGRITY,
    }
}

fn run_backup_verify(backup: &Path) -> (BackupVerifyState, usize) {
    let mut state = BackupVerifyState::LoadingManifest;

    let manifest: Manifest = match fs::read_to_string(backup.join("manifest.json"))
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
    {
        Some(manifest) => manifest,
        None => return (state, 0),
    };
    let total = manifest.files.len();

    state = BackupVerifyState::VerifyingManifestHash;
    tracing::trace!(state = ?state, "backup verify progress");
    match (&manifest.manifest_sha256, manifest_hash(&manifest)) {
        (Some(stored), Ok(computed)) if *stored == computed => {}
        _ => {
            return (
                BackupVerifyState::Tampered {
                    file: "manifest.json".to_string(),
                    index: 0,
                },
                total,
            );
        }
    }

    for (index, file) in manifest.files.iter().enumerate() {
        state = BackupVerifyState::VerifyingFiles { index, total };
        tracing::trace!(state = ?state, "backup verify progress");
        let path = backup.join("data").join(&file.path);
        let ok = fs::read(&path)
            .map(|bytes| sha256_hex(&bytes) == file.sha256 && bytes.len() as u64 == file.size)
            .unwrap_or(false);
        if !ok {
            return (
                BackupVerifyState::Tampered {
                    file: file.path.clone(),
                    index,
                },
                total,
            );
        }
    }

    (BackupVerifyState::Ok, total)
}

/// `af backup restore --backup <dir> --dest <dir>`
///
/// Verifies before restoring; a tampered backup is never written out.
pub fn backup_restore(backup: &Path, dest: &Path) -> i32 {
    let (state, _) = run_backup_verify(backup);
    if state != BackupVerifyState::Ok {
        eprintln!("refusing to restore: backup failed verification");
        return EXIT_INTEGRITY;
    }

    match try_restore(backup, dest) {
        Ok(count) => {
            println!("restored {count} files to {}", dest.display());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("restore failed: {e:#}");
            EXIT_CONFIG
        }
    }
}

fn try_restore(backup: &Path, dest: &Path) -> anyhow::Result<usize> {
    let data = backup.join("data");
    let mut count = 0;
    for entry in walkdir::WalkDir::new(&data).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(&data)?;
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, Serialize)]
struct BackupListEntry {
    path: PathBuf,
    created_at: DateTime<Utc>,
    files: usize,
}

/// `af backup list --dir <dir> [--json]`
pub fn backup_list(dir: &Path, json: bool) -> i32 {
    let mut backups = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let manifest_path = entry.path().join("manifest.json");
            if let Some(manifest) = fs::read_to_string(&manifest_path)
                .ok()
                .and_then(|raw| serde_json::from_str::<Manifest>(&raw).ok())
            {
                backups.push(BackupListEntry {
                    path: entry.path(),
                    created_at: manifest.created_at,
                    files: manifest.files.len(),
                });
            }
        }
    }
    backups.sort_by_key(|b| b.created_at);

    if json {
        print_json(&backups);
    } else if backups.is_empty() {
        println!("no backups under {}", dir.display());
    } else {
        for b in &backups {
            println!("{}  {}  {} files", b.created_at.to_rfc3339(), b.path.display(), b.files);
        }
    }
    EXIT_OK
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    status: &'static str,
    checks: Vec<Check>,
}

/// `af validate [--json]` — end-to-end environment check.
pub fn validate(json: bool) -> i32 {
    let mut checks = Vec::new();
    let mut exit = EXIT_OK;

    let config = match af_config::ControlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration unparseable: {e}");
            return EXIT_CONFIG;
        }
    };

    match config.validate() {
        Ok(warnings) => {
            checks.push(Check {
                name: "config",
                ok: true,
                detail: format!("{} warning(s)", warnings.len()),
            });
            for warning in warnings {
                checks.push(Check {
                    name: "config-warning",
                    ok: true,
                    detail: warning.to_string(),
                });
            }
        }
        Err(e) => {
            checks.push(Check {
                name: "config",
                ok: false,
                detail: e.to_string(),
            });
            exit = EXIT_CONFIG;
        }
    }

    if let Some(path) = &config.secrets.file {
        if !path.exists() {
            checks.push(Check {
                name: "secrets-file",
                ok: false,
                detail: format!("{} does not exist", path.display()),
            });
            if exit == EXIT_OK {
                exit = EXIT_RECOVERABLE;
            }
        } else {
            let backend = FileBackend::new(path);
            match backend.list() {
                Ok(keys) => checks.push(Check {
                    name: "secrets-file",
                    ok: true,
                    detail: format!("{} key(s)", keys.len()),
                }),
                Err(e) => {
                    checks.push(Check {
                        name: "secrets-file",
                        ok: false,
                        detail: e.to_string(),
                    });
                    if exit == EXIT_OK {
                        exit = EXIT_RECOVERABLE;
                    }
                }
            }
        }
    }

    for (name, url) in [
        ("database-url", &config.database_url),
        ("bus-url", &config.bus_url),
    ] {
        match url {
            None => checks.push(Check {
                name,
                ok: true,
                detail: "unset (external service not configured)".to_string(),
            }),
            Some(url) if url.contains("://") => checks.push(Check {
                name,
                ok: true,
                detail: "well-formed".to_string(),
            }),
            Some(url) => {
                checks.push(Check {
                    name,
                    ok: false,
                    detail: format!("'{url}' has no scheme"),
                });
                exit = EXIT_CONFIG;
            }
        }
    }

    let output = ValidateOutput {
        status: match exit {
            EXIT_OK => "ok",
            EXIT_RECOVERABLE => "degraded",
            _ => "failed",
        },
        checks,
    };

    if json {
        print_json(&output);
    } else {
        for check in &output.checks {
            println!("{:<16} {}  {}", check.name, status_marker(check.ok), check.detail);
        }
        println!("validate: {}", output.status);
    }
    exit
}
