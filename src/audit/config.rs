use crate::audit::reconcile::{DEFAULT_SAMPLE_LIMIT, ReconcilePolicy};
use crate::error::AuditVerifyError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub exemptions: Vec<String>,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

fn default_sample_limit() -> usize {
    DEFAULT_SAMPLE_LIMIT
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            exemptions: Vec::new(),
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_enabled")]
    pub enabled: bool,
}

fn default_ledger_enabled() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    pub reconcile: ReconcileConfig,
    pub known_discrepancies: BTreeMap<String, String>,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAuditConfig {
    reconcile: Option<ReconcileConfig>,
    known_discrepancies: Option<BTreeMap<String, String>>,
    ledger: Option<LedgerConfig>,
}

impl AuditConfig {
    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            exemptions: self
                .reconcile
                .exemptions
                .iter()
                .map(|id| id.trim().to_string())
                .collect::<BTreeSet<_>>(),
            known_discrepancies: self
                .known_discrepancies
                .iter()
                .map(|(id, reason)| (id.trim().to_string(), reason.clone()))
                .collect(),
            sample_limit: self.reconcile.sample_limit,
        }
    }
}

fn parse_usize(raw: Option<String>, fallback: usize) -> usize {
    match raw {
        Some(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        None => fallback,
    }
}

fn parse_bool(raw: Option<String>, fallback: bool) -> bool {
    match raw {
        Some(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        None => fallback,
    }
}

fn parse_csv(raw: Option<String>, fallback: &[String]) -> Vec<String> {
    match raw {
        Some(v) => v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        None => fallback.to_vec(),
    }
}

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    AuditVerifyError::InvalidConfig(msg.into()).into()
}

fn validate(cfg: &AuditConfig) -> Result<()> {
    if cfg.reconcile.sample_limit == 0 {
        return Err(invalid("invalid sample limit: must be >= 1"));
    }
    if cfg.reconcile.exemptions.iter().any(|id| id.trim().is_empty()) {
        return Err(invalid("invalid exemption: identity cannot be empty"));
    }
    for (id, reason) in &cfg.known_discrepancies {
        if id.trim().is_empty() {
            return Err(invalid("invalid known discrepancy: identity cannot be empty"));
        }
        if reason.trim().is_empty() {
            return Err(invalid(format!(
                "invalid known discrepancy `{id}`: explanation cannot be empty"
            )));
        }
        if cfg.reconcile.exemptions.iter().any(|ex| ex.trim() == id.trim()) {
            return Err(invalid(format!(
                "identity `{id}` is both exempt and a known discrepancy"
            )));
        }
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("AUDIT_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".audit-verify").join("verify.toml"))
}

fn merge_toml(base: &mut AuditConfig, raw: &str) -> Result<()> {
    let parsed: PartialAuditConfig =
        toml::from_str(raw).map_err(|err| invalid(format!("failed to parse toml: {err}")))?;
    if let Some(reconcile) = parsed.reconcile {
        base.reconcile = reconcile;
    }
    if let Some(known) = parsed.known_discrepancies {
        base.known_discrepancies = known;
    }
    if let Some(ledger) = parsed.ledger {
        base.ledger = ledger;
    }
    Ok(())
}

fn merge_file_config(base: &mut AuditConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)
        .map_err(|err| invalid(format!("{}: {err}", path.display())))?;
    merge_toml(base, &raw).with_context(|| format!("failed to load config {}", path.display()))
}

fn apply_env(cfg: &mut AuditConfig, lookup: impl Fn(&str) -> Option<String>) {
    cfg.reconcile.exemptions = parse_csv(lookup("AUDIT_EXEMPTIONS"), &cfg.reconcile.exemptions);
    cfg.reconcile.sample_limit =
        parse_usize(lookup("AUDIT_SAMPLE_LIMIT"), cfg.reconcile.sample_limit);
    cfg.ledger.enabled = parse_bool(lookup("AUDIT_LEDGER_ENABLED"), cfg.ledger.enabled);
}

pub fn load_config() -> Result<AuditConfig> {
    let mut cfg = AuditConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env(&mut cfg, |var| env::var(var).ok());
    validate(&cfg)?;
    Ok(cfg)
}
