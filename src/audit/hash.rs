use crate::audit::normalize::CanonicalRecord;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Coarse equivalence string for a canonical record.
///
/// Top-level keys in sorted order as `"key":value`, joined by `,`. Any
/// object value is emitted as `{}`: nested mappings are compared for
/// presence only. Content changes confined to a nested mapping do not show
/// up here; [`deep_digest`] covers them.
pub fn equivalence_hash(record: &CanonicalRecord) -> String {
    let mut keys: Vec<&String> = record.fields.keys().collect();
    keys.sort();

    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(value) = record.fields.get(key) else {
            continue;
        };
        let rendered = match value {
            Value::Object(_) => "{}".to_string(),
            other => other.to_string(),
        };
        parts.push(format!("{}:{rendered}", Value::String(key.clone())));
    }
    parts.join(",")
}

/// SHA-256 (hex) over the full canonical record, nested content included.
pub fn deep_digest(record: &CanonicalRecord) -> String {
    let canonical = record.to_value().to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}
