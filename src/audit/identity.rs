use crate::audit::normalize::{CanonicalRecord, OPERATION_FIELD};
use serde_json::Value;

pub const EVENT_ID_FIELD: &str = "eventId";
pub const SUBJECT_FIELDS: [&str; 2] = ["tripId", "documentId"];
pub const UNKNOWN_OPERATION: &str = "UNKNOWN";
pub const UNKNOWN_SUBJECT: &str = "unknown";

fn non_empty_str<'a>(record: &'a CanonicalRecord, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Key used to pair a live record with its archive copy.
///
/// `eventId` when the record has one, otherwise `{operation}-{subject}`
/// with `UNKNOWN` / `unknown` standing in for whatever is missing.
pub fn derive_identity(record: &CanonicalRecord) -> String {
    if let Some(event_id) = non_empty_str(record, EVENT_ID_FIELD) {
        return event_id.to_string();
    }

    let operation = non_empty_str(record, OPERATION_FIELD).unwrap_or(UNKNOWN_OPERATION);
    let subject = SUBJECT_FIELDS
        .iter()
        .find_map(|key| non_empty_str(record, key))
        .unwrap_or(UNKNOWN_SUBJECT);
    format!("{operation}-{subject}")
}
