use anyhow::Result;
use std::path::PathBuf;

use crate::audit::config::load_config;
use crate::audit::ledger::{self, RunRecord};
use crate::audit::load::{LoadedSource, load_archive_dir, load_live_export};
use crate::audit::paths::resolve_paths;
use crate::audit::reconcile::{ReconcileReport, reconcile};
use crate::audit::warn;
use crate::commands::CommandReport;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub live: PathBuf,
    pub archive: PathBuf,
    pub strict: bool,
    pub no_ledger: bool,
}

fn warn_skipped(loaded: &LoadedSource, source: &str) {
    for entry in &loaded.skipped {
        warn::emit("SKIPPED_ENTRY", "load", "na", source, entry, "not a record object");
    }
}

fn warn_report(report: &ReconcileReport) {
    for note in &report.opaque_values {
        warn::emit(
            "OPAQUE_VALUE",
            "normalize",
            &note.identity,
            note.side.as_str(),
            &note.path,
            "unrecognized value passed through",
        );
    }
    if report.live_duplicates > 0 {
        warn::emit(
            "DUPLICATE_IDENTITY",
            "reconcile",
            "na",
            "live",
            "na",
            &format!("{} repeated identities, last record kept", report.live_duplicates),
        );
    }
    if report.archive_duplicates > 0 {
        warn::emit(
            "DUPLICATE_IDENTITY",
            "reconcile",
            "na",
            "archive",
            "na",
            &format!(
                "{} repeated identities, last record kept",
                report.archive_duplicates
            ),
        );
    }
}

fn list_issue(report: &mut CommandReport, label: &str, ids: &[String], total: usize) {
    for id in ids {
        report.issue(format!("{label}: {id}"));
    }
    if total > ids.len() {
        report.issue(format!("{label}: ... and {} more", total - ids.len()));
    }
}

pub fn render(outcome: &ReconcileReport, strict: bool, report: &mut CommandReport) {
    report.detail(format!("live_entries={}", outcome.live_total));
    report.detail(format!("archive_entries={}", outcome.archive_total));
    report.detail(format!("matched={}", outcome.matched));
    report.detail(format!("discrepancies={}", outcome.discrepancies));
    report.detail(format!("known_exceptions={}", outcome.known_exceptions));
    report.detail(format!("exempted={}", outcome.exempted));
    for exception in &outcome.exceptions {
        report.detail(format!(
            "known_exception={} reason={}",
            exception.identity, exception.reason
        ));
    }

    list_issue(
        report,
        "missing in archive",
        &outcome.missing_in_archive,
        outcome.missing_in_archive_count,
    );
    list_issue(
        report,
        "missing in live",
        &outcome.missing_in_live,
        outcome.missing_in_live_count,
    );
    list_issue(
        report,
        "content differs",
        &outcome.mismatched,
        outcome.mismatched_count,
    );

    if outcome.nested_drift_count > 0 {
        report.detail(format!("nested_drift={}", outcome.nested_drift_count));
        for id in &outcome.nested_drift {
            report.detail(format!("nested_drift.identity={id}"));
        }
        if strict {
            report.issue(format!(
                "strict verify failed: nested content differs for {} matched records",
                outcome.nested_drift_count
            ));
        }
    }

    if outcome.is_clean() && report.ok {
        report.detail("audit verification complete: all records match");
    }
}

pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("verify");

    let live = load_live_export(&opts.live)?;
    let archive = load_archive_dir(&opts.archive)?;
    warn_skipped(&live, "live");
    warn_skipped(&archive, "archive");
    report.detail(format!("live_path={}", opts.live.display()));
    report.detail(format!(
        "archive_path={} files={}",
        opts.archive.display(),
        archive.files_read
    ));

    let outcome = reconcile(&live.records, &archive.records, &cfg.policy());
    warn_report(&outcome);
    render(&outcome, opts.strict, &mut report);

    if cfg.ledger.enabled && !opts.no_ledger {
        let status = if report.ok { "ok" } else { "failed" };
        let record = RunRecord::from_report(
            &opts.live.display().to_string(),
            &opts.archive.display().to_string(),
            status,
            &outcome,
        );
        match ledger::append_run(&paths, &record) {
            Ok(path) => report.detail(format!("ledger={}", path.display())),
            Err(err) => warn::emit(
                "LEDGER_WRITE_FAILED",
                "ledger",
                "na",
                "na",
                &paths.ledger_file.display().to_string(),
                &format!("{err:#}"),
            ),
        }
    }

    report.payload = Some(serde_json::to_value(&outcome)?);
    Ok(report)
}
