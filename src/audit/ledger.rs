use crate::audit::paths::AuditPaths;
use crate::audit::reconcile::ReconcileReport;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// One line of `verify-runs.jsonl`.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub at: String,
    pub build_id: String,
    pub live_path: String,
    pub archive_path: String,
    pub status: String,
    pub live_total: usize,
    pub archive_total: usize,
    pub matched: usize,
    pub discrepancies: usize,
    pub known_exceptions: usize,
    pub nested_drift: usize,
}

impl RunRecord {
    pub fn from_report(
        live_path: &str,
        archive_path: &str,
        status: &str,
        report: &ReconcileReport,
    ) -> Self {
        Self {
            at: chrono::Utc::now().to_rfc3339(),
            build_id: env!("BUILD_UUID").to_string(),
            live_path: live_path.to_string(),
            archive_path: archive_path.to_string(),
            status: status.to_string(),
            live_total: report.live_total,
            archive_total: report.archive_total,
            matched: report.matched,
            discrepancies: report.discrepancies,
            known_exceptions: report.known_exceptions,
            nested_drift: report.nested_drift_count,
        }
    }
}

pub fn append_run(paths: &AuditPaths, record: &RunRecord) -> Result<PathBuf> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;

    let line = format!("{}\n", serde_json::to_string(record)?);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.ledger_file)
        .with_context(|| format!("failed to open {}", paths.ledger_file.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to write {}", paths.ledger_file.display()))?;
    Ok(paths.ledger_file.clone())
}
