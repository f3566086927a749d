use anyhow::Result;
use std::env;

use crate::audit::config::{load_config, resolve_config_path};
use crate::audit::paths::resolve_paths;
use crate::commands::CommandReport;

include!(concat!(env!("OUT_DIR"), "/audit_env_allowlist.rs"));

fn paths_report() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status.paths");
    report.detail(format!("audit_home={}", paths.audit_home.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("ledger_file={}", paths.ledger_file.display()));
    if paths.ledger_file.exists() {
        report.detail("ledger=found");
    } else {
        report.detail("ledger=not_found (no verify run recorded yet)");
    }
    Ok(report)
}

fn config_report() -> CommandReport {
    let mut report = CommandReport::new("status.config");
    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_file={}", path.display())),
        Some(path) => report.detail(format!(
            "config_file={} (not found, defaults in use)",
            path.display()
        )),
        None => report.detail("config_file=unresolved (defaults in use)"),
    }

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("exemptions={}", cfg.reconcile.exemptions.len()));
            report.detail(format!(
                "known_discrepancies={}",
                cfg.known_discrepancies.len()
            ));
            report.detail(format!("sample_limit={}", cfg.reconcile.sample_limit));
            report.detail(format!("ledger_enabled={}", cfg.ledger.enabled));
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }
    report
}

fn env_report(vars: impl IntoIterator<Item = (String, String)>) -> CommandReport {
    let mut report = CommandReport::new("status.env");
    let mut names: Vec<String> = vars
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| name.starts_with("AUDIT_"))
        .collect();
    names.sort();

    for name in names {
        if GENERATED_AUDIT_ENV_ALLOWLIST.contains(&name.as_str()) {
            report.detail(format!("env.{name}=set"));
        } else {
            report.issue(format!("unrecognized env var {name} (typo?)"));
        }
    }
    report
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    report.detail(format!("build_id={}", env!("BUILD_UUID")));
    report.merge(paths_report()?);
    report.merge(config_report());
    report.merge(env_report(env::vars()));
    Ok(report)
}
