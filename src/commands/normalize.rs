use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::audit::hash::{deep_digest, equivalence_hash};
use crate::audit::identity::derive_identity;
use crate::audit::load::{LoadedSource, load_archive_dir, load_live_export, load_record_file};
use crate::audit::normalize::normalize;
use crate::audit::reconcile::Side;
use crate::audit::warn;
use crate::commands::CommandReport;

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub input: PathBuf,
    /// Unset reads whatever layout the input has.
    pub source: Option<Side>,
    pub hash: bool,
}

#[derive(Debug, Clone, Serialize)]
struct NormalizedEntry {
    identity: String,
    canonical: serde_json::Value,
    equivalence_hash: String,
    deep_digest: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    opaque_paths: Vec<String>,
}

fn load_input(opts: &NormalizeOptions) -> Result<LoadedSource> {
    match opts.source {
        Some(Side::Live) => load_live_export(&opts.input),
        Some(Side::Archive) | None if opts.input.is_dir() => load_archive_dir(&opts.input),
        Some(Side::Archive) | None => load_record_file(&opts.input),
    }
}

pub fn run(opts: &NormalizeOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("normalize");
    let loaded = load_input(opts)?;
    let source = opts.source.map(Side::as_str).unwrap_or("input");
    report.detail(format!("input={}", opts.input.display()));
    report.detail(format!("source={source}"));
    report.detail(format!("records={}", loaded.records.len()));
    for skipped in &loaded.skipped {
        report.detail(format!("skipped={skipped}"));
    }

    let mut entries = Vec::with_capacity(loaded.records.len());
    for raw in &loaded.records {
        let canonical = normalize(raw);
        let entry = NormalizedEntry {
            identity: derive_identity(&canonical),
            equivalence_hash: equivalence_hash(&canonical),
            deep_digest: deep_digest(&canonical),
            canonical: canonical.to_value(),
            opaque_paths: canonical.opaque_paths.clone(),
        };

        if opts.hash {
            report.detail(format!(
                "identity={} digest={} hash={}",
                entry.identity, entry.deep_digest, entry.equivalence_hash
            ));
        } else {
            report.detail(format!("identity={} canonical={}", entry.identity, entry.canonical));
        }
        if !entry.opaque_paths.is_empty() {
            report.detail(format!(
                "identity={} source={source} opaque_paths={}",
                entry.identity,
                entry.opaque_paths.join(",")
            ));
        }
        for path in &entry.opaque_paths {
            warn::emit(
                "OPAQUE_VALUE",
                "normalize",
                &entry.identity,
                source,
                path,
                "unrecognized value passed through",
            );
        }
        entries.push(entry);
    }

    report.payload = Some(serde_json::to_value(&entries)?);
    Ok(report)
}
