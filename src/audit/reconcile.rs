use crate::audit::hash::{deep_digest, equivalence_hash};
use crate::audit::identity::derive_identity;
use crate::audit::normalize::{CanonicalRecord, normalize};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// Fixed per-run inputs of the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    /// Identities allowed to exist in only one source. Invisible to the
    /// report.
    pub exemptions: BTreeSet<String>,
    /// Identities expected to differ, with the documented reason.
    pub known_discrepancies: BTreeMap<String, String>,
    pub sample_limit: usize,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            exemptions: BTreeSet::new(),
            known_discrepancies: BTreeMap::new(),
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Live,
    Archive,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Matched,
    MissingInLive,
    MissingInArchive,
    ContentMismatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnownException {
    pub identity: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpaqueNote {
    pub side: Side,
    pub identity: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub live_total: usize,
    pub archive_total: usize,
    pub matched: usize,
    /// `missing_in_live_count + missing_in_archive_count + mismatched_count`.
    pub discrepancies: usize,
    /// Live-side occurrences of known-discrepancy identities.
    pub known_exceptions: usize,
    pub exempted: usize,
    pub missing_in_live_count: usize,
    pub missing_in_archive_count: usize,
    pub mismatched_count: usize,
    pub missing_in_live: Vec<String>,
    pub missing_in_archive: Vec<String>,
    pub mismatched: Vec<String>,
    pub exceptions: Vec<KnownException>,
    /// Matched pairs whose nested content differs.
    pub nested_drift_count: usize,
    pub nested_drift: Vec<String>,
    pub live_duplicates: usize,
    pub archive_duplicates: usize,
    pub opaque_values: Vec<OpaqueNote>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies == 0
    }
}

struct KeyedSource {
    records: BTreeMap<String, CanonicalRecord>,
    duplicates: usize,
}

fn push_bounded(list: &mut Vec<String>, identity: &str, limit: usize) {
    if list.len() < limit {
        list.push(identity.to_string());
    }
}

fn key_source(
    raw: &[Value],
    side: Side,
    policy: &ReconcilePolicy,
    report: &mut ReconcileReport,
) -> KeyedSource {
    let mut keyed = KeyedSource {
        records: BTreeMap::new(),
        duplicates: 0,
    };
    let mut seen_exceptions: BTreeSet<String> = report
        .exceptions
        .iter()
        .map(|e| e.identity.clone())
        .collect();

    for value in raw {
        let record = normalize(value);
        let identity = derive_identity(&record);

        if policy.exemptions.contains(&identity) {
            report.exempted += 1;
            continue;
        }

        for path in &record.opaque_paths {
            report.opaque_values.push(OpaqueNote {
                side,
                identity: identity.clone(),
                path: path.clone(),
            });
        }
        if let Some(reason) = policy.known_discrepancies.get(&identity) {
            if side == Side::Live {
                report.known_exceptions += 1;
                if seen_exceptions.insert(identity.clone()) {
                    report.exceptions.push(KnownException {
                        identity,
                        reason: reason.clone(),
                    });
                }
            }
            continue;
        }

        if keyed.records.insert(identity, record).is_some() {
            keyed.duplicates += 1;
        }
    }
    keyed
}

fn classify(live: Option<&CanonicalRecord>, archive: Option<&CanonicalRecord>) -> Option<Classification> {
    match (live, archive) {
        (None, None) => None,
        (None, Some(_)) => Some(Classification::MissingInLive),
        (Some(_), None) => Some(Classification::MissingInArchive),
        (Some(a), Some(b)) if equivalence_hash(a) == equivalence_hash(b) => {
            Some(Classification::Matched)
        }
        (Some(_), Some(_)) => Some(Classification::ContentMismatch),
    }
}

/// Cross-check the live export against the archive.
///
/// Every identity left after exemptions and known discrepancies lands in
/// exactly one of matched / missing-in-live / missing-in-archive /
/// mismatched. Pure: nothing is printed and the inputs are untouched.
pub fn reconcile(live: &[Value], archive: &[Value], policy: &ReconcilePolicy) -> ReconcileReport {
    let mut report = ReconcileReport {
        live_total: live.len(),
        archive_total: archive.len(),
        ..ReconcileReport::default()
    };
    let limit = policy.sample_limit.max(1);

    let live_keyed = key_source(live, Side::Live, policy, &mut report);
    let archive_keyed = key_source(archive, Side::Archive, policy, &mut report);
    report.live_duplicates = live_keyed.duplicates;
    report.archive_duplicates = archive_keyed.duplicates;

    let union: BTreeSet<&String> = live_keyed
        .records
        .keys()
        .chain(archive_keyed.records.keys())
        .collect();

    for identity in union {
        let live_record = live_keyed.records.get(identity);
        let archive_record = archive_keyed.records.get(identity);
        let Some(class) = classify(live_record, archive_record) else {
            continue;
        };
        match class {
            Classification::Matched => {
                report.matched += 1;
                if let (Some(a), Some(b)) = (live_record, archive_record) {
                    if deep_digest(a) != deep_digest(b) {
                        report.nested_drift_count += 1;
                        push_bounded(&mut report.nested_drift, identity, limit);
                    }
                }
            }
            Classification::MissingInLive => {
                report.missing_in_live_count += 1;
                push_bounded(&mut report.missing_in_live, identity, limit);
            }
            Classification::MissingInArchive => {
                report.missing_in_archive_count += 1;
                push_bounded(&mut report.missing_in_archive, identity, limit);
            }
            Classification::ContentMismatch => {
                report.mismatched_count += 1;
                push_bounded(&mut report.mismatched, identity, limit);
            }
        }
    }

    report.discrepancies =
        report.missing_in_live_count + report.missing_in_archive_count + report.mismatched_count;
    report
}
