use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AuditPaths {
    pub audit_home: PathBuf,
    pub logs_dir: PathBuf,
    pub ledger_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn default_audit_home() -> Result<PathBuf> {
    Ok(required_home_dir()?.join(".audit-verify"))
}

pub fn resolve_paths() -> Result<AuditPaths> {
    let audit_home = match env::var("AUDIT_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => default_audit_home()?,
    };
    let logs_dir = env_or_default_path("AUDIT_LOGS_DIR", audit_home.join("logs"));
    let ledger_file = logs_dir.join("verify-runs.jsonl");

    Ok(AuditPaths {
        audit_home,
        logs_dir,
        ledger_file,
    })
}
