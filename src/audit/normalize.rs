//! Canonical form for audit records coming from either export.
//!
//! The live export wraps every value in a single-key type envelope
//! (`{"stringValue": "..."}`), the archive stores plain JSON. Both are
//! folded into the same [`CanonicalRecord`] so the reconciler can compare
//! them without caring where a record came from.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Storage artifacts of the live document store, never audit content.
pub const DOCUMENT_METADATA_FIELDS: [&str; 3] = ["name", "createTime", "updateTime"];

/// Optional fields defaulted to `null` so "omitted" and "stored as null"
/// canonicalize the same way.
pub const DEFAULTED_FIELDS: [&str; 3] = ["source", "changes", "deletedData"];

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const CHANGED_FIELDS_FIELD: &str = "changedFields";
pub const METADATA_FIELD: &str = "metadata";
pub const SURVEY_METADATA_FIELD: &str = "surveyMetadata";
pub const OPERATION_FIELD: &str = "operation";
pub const CREATE_OPERATION: &str = "CREATE";

const ENVELOPE_TAGS: [&str; 10] = [
    "stringValue",
    "integerValue",
    "doubleValue",
    "booleanValue",
    "nullValue",
    "timestampValue",
    "mapValue",
    "arrayValue",
    "referenceValue",
    "geoPointValue",
];
const BYTES_TAG: &str = "bytesValue";

fn iso_datetime_re() -> &'static Regex {
    static ISO_DATETIME_RE: OnceLock<Regex> = OnceLock::new();
    ISO_DATETIME_RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})(?:\.\d+)?(Z|[+-]\d{2}:?\d{2})?$")
            .expect("valid iso datetime regex")
    })
}

/// Result of unwrapping one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwrapped {
    Native(Value),
    /// A type envelope that could not be decoded: unknown tag, or a payload
    /// of the wrong kind. Carried through untouched so the record stays
    /// comparable.
    Opaque(Value),
}

impl Unwrapped {
    fn into_value(self, path: &str, opaque: &mut Vec<String>) -> Value {
        match self {
            Self::Native(value) => value,
            Self::Opaque(value) => {
                opaque.push(path.to_string());
                value
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalRecord {
    pub fields: Map<String, Value>,
    /// Dotted paths of values passed through opaquely.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub opaque_paths: Vec<String>,
}

/// Two canonical records are equal when their fields are; the opaque
/// paths are diagnostics about how the record was read.
impl PartialEq for CanonicalRecord {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl CanonicalRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Tag and payload of a single-key object whose key reads like a type tag.
fn type_tag(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object().filter(|obj| obj.len() == 1)?;
    let (tag, payload) = obj.iter().next()?;
    tag.ends_with("Value").then_some((tag.as_str(), payload))
}

fn is_known_tag(tag: &str) -> bool {
    tag == BYTES_TAG || ENVELOPE_TAGS.contains(&tag)
}

fn is_envelope(value: &Value) -> bool {
    type_tag(value).is_some_and(|(tag, _)| is_known_tag(tag))
}

fn is_tagged_document(raw: &Map<String, Value>) -> bool {
    let Some(Value::Object(fields)) = raw.get("fields") else {
        return false;
    };
    raw.contains_key("name") || (!fields.is_empty() && fields.values().all(is_envelope))
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn unwrap_integer(payload: &Value) -> Option<Value> {
    match payload {
        Value::String(raw) => Some(match raw.trim().parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => payload.clone(),
        }),
        Value::Number(_) => Some(payload.clone()),
        _ => None,
    }
}

fn unwrap_boolean(payload: &Value) -> Option<Value> {
    match payload {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

/// `{"latitude": .., "longitude": ..}` with plain numbers only.
fn is_geo_point(payload: &Value) -> bool {
    payload
        .as_object()
        .is_some_and(|obj| obj.values().all(Value::is_number))
}

fn unwrap_map_fields(
    fields: &Map<String, Value>,
    path: &str,
    opaque: &mut Vec<String>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in fields {
        let here = child_path(path, key);
        let unwrapped = unwrap_value(value, &here, opaque).into_value(&here, opaque);
        out.insert(key.clone(), unwrapped);
    }
    out
}

fn unwrap_items(items: &[Value], path: &str, opaque: &mut Vec<String>) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let here = child_path(path, &idx.to_string());
        out.push(unwrap_value(item, &here, opaque).into_value(&here, opaque));
    }
    out
}

/// Unwrap one value. Envelopes resolve to native values; anything else is
/// walked so envelopes left inside already-flattened fields are unwrapped
/// too. Opaque values nested deeper are recorded into `opaque` as they are
/// found; the returned variant only speaks for `value` itself.
fn unwrap_value(value: &Value, path: &str, opaque: &mut Vec<String>) -> Unwrapped {
    if let Some((tag, payload)) = type_tag(value) {
        return unwrap_envelope(tag, payload, value, path, opaque);
    }

    match value {
        Value::Object(obj) => Unwrapped::Native(Value::Object(unwrap_map_fields(obj, path, opaque))),
        Value::Array(items) => Unwrapped::Native(Value::Array(unwrap_items(items, path, opaque))),
        other => Unwrapped::Native(other.clone()),
    }
}

fn unwrap_envelope(
    tag: &str,
    payload: &Value,
    original: &Value,
    path: &str,
    opaque: &mut Vec<String>,
) -> Unwrapped {
    let native = match tag {
        "stringValue" | "timestampValue" | "referenceValue" | BYTES_TAG => {
            payload.is_string().then(|| payload.clone())
        }
        // NaN and the infinities arrive as strings.
        "doubleValue" => (payload.is_number() || payload.is_string()).then(|| payload.clone()),
        "geoPointValue" => is_geo_point(payload).then(|| payload.clone()),
        "integerValue" => unwrap_integer(payload),
        "nullValue" => Some(Value::Null),
        "booleanValue" => unwrap_boolean(payload),
        "mapValue" => match payload.as_object().map(|obj| obj.get("fields")) {
            Some(None) => Some(Value::Object(Map::new())),
            Some(Some(Value::Object(fields))) => {
                Some(Value::Object(unwrap_map_fields(fields, path, opaque)))
            }
            _ => None,
        },
        "arrayValue" => match payload.as_object().map(|obj| obj.get("values")) {
            Some(None) => Some(Value::Array(Vec::new())),
            Some(Some(Value::Array(values))) => {
                Some(Value::Array(unwrap_items(values, path, opaque)))
            }
            _ => None,
        },
        _ => None,
    };

    match native {
        Some(value) => Unwrapped::Native(value),
        None => Unwrapped::Opaque(original.clone()),
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut entries: Vec<(String, Value)> = obj.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Drop fractional seconds from an ISO-8601 date-time, keeping the zone.
pub fn fold_timestamp_precision(input: &str) -> Option<String> {
    let caps = iso_datetime_re().captures(input)?;
    let base = caps.get(1)?.as_str();
    let zone = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some(format!("{base}{zone}"))
}

fn fold_timestamps(value: Value) -> Value {
    match value {
        Value::String(s) => match fold_timestamp_precision(&s) {
            Some(folded) => Value::String(folded),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(fold_timestamps).collect()),
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| (k, fold_timestamps(v)))
                .collect(),
        ),
        other => other,
    }
}

fn changed_field_sort_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize_changed_fields(fields: &mut Map<String, Value>) {
    let Some(current) = fields.get_mut(CHANGED_FIELDS_FIELD) else {
        return;
    };
    match current {
        Value::Array(items) => {
            items.sort_by_key(changed_field_sort_key);
        }
        other => *other = Value::Array(Vec::new()),
    }
}

fn equalize_create_metadata(fields: &mut Map<String, Value>) {
    let is_create = fields
        .get(OPERATION_FIELD)
        .and_then(Value::as_str)
        .is_some_and(|op| op == CREATE_OPERATION);
    if !is_create {
        return;
    }
    if let Some(Value::Object(metadata)) = fields.get_mut(METADATA_FIELD) {
        metadata
            .entry(SURVEY_METADATA_FIELD.to_string())
            .or_insert(Value::Null);
    }
}

/// Normalize one raw record into canonical form. Never fails: anything it
/// cannot make sense of is carried through and listed in `opaque_paths`.
pub fn normalize(raw: &Value) -> CanonicalRecord {
    let mut opaque = Vec::new();
    let Some(raw_obj) = raw.as_object() else {
        return CanonicalRecord {
            fields: Map::new(),
            opaque_paths: vec!["$".to_string()],
        };
    };

    let source = match raw_obj.get("fields") {
        Some(Value::Object(fields)) if is_tagged_document(raw_obj) => fields,
        _ => raw_obj,
    };

    let mut keys: Vec<&String> = source.keys().collect();
    keys.sort();

    let mut fields = Map::new();
    for key in keys {
        if DOCUMENT_METADATA_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let Some(value) = source.get(key) else {
            continue;
        };
        let unwrapped = unwrap_value(value, key, &mut opaque).into_value(key, &mut opaque);
        fields.insert(key.clone(), sort_keys(unwrapped));
    }

    for key in DEFAULTED_FIELDS {
        fields.entry(key.to_string()).or_insert(Value::Null);
    }

    normalize_changed_fields(&mut fields);

    let mut fields = match fold_timestamps(Value::Object(fields)) {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };

    equalize_create_metadata(&mut fields);

    if let Some(ts) = fields.get_mut(TIMESTAMP_FIELD) {
        *ts = Value::Object(Map::new());
    }

    let fields = match sort_keys(Value::Object(fields)) {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };

    opaque.sort();
    opaque.dedup();
    CanonicalRecord {
        fields,
        opaque_paths: opaque,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tagged_create() -> Value {
        json!({
            "name": "projects/p/databases/(default)/documents/auditLog/abc123",
            "createTime": "2025-11-05T10:00:00.123456Z",
            "updateTime": "2025-11-05T10:00:00.123456Z",
            "fields": {
                "operation": {"stringValue": "CREATE"},
                "tripId": {"stringValue": "T-1"},
                "eventId": {"stringValue": "E1"},
                "severity": {"stringValue": "INFO"},
                "timestamp": {"timestampValue": "2025-11-05T10:00:14.942Z"},
                "source": {"stringValue": "ios_app"},
                "pointsCompleted": {"integerValue": "12"},
                "verified": {"booleanValue": "true"},
                "metadata": {"mapValue": {"fields": {
                    "writeMetadata": {"mapValue": {"fields": {
                        "source": {"stringValue": "ios_app"},
                        "hmac": {"stringValue": "ab12cd34"}
                    }}}
                }}},
                "changedFields": {"arrayValue": {"values": [
                    {"stringValue": "surveyCompleted"},
                    {"stringValue": "baselineScore"}
                ]}}
            }
        })
    }

    fn plain_create() -> Value {
        json!({
            "verified": true,
            "tripId": "T-1",
            "operation": "CREATE",
            "eventId": "E1",
            "timestamp": "2025-11-05T10:00:14Z",
            "severity": "INFO",
            "source": "ios_app",
            "pointsCompleted": 12,
            "changedFields": ["baselineScore", "surveyCompleted"],
            "metadata": {
                "surveyMetadata": null,
                "writeMetadata": {"hmac": "ab12cd34", "source": "ios_app"}
            }
        })
    }

    #[test]
    fn tagged_and_plain_shapes_normalize_equal() {
        let a = normalize(&tagged_create());
        let b = normalize(&plain_create());
        assert_eq!(a, b);
        assert!(a.opaque_paths.is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [tagged_create(), plain_create()] {
            let once = normalize(&raw);
            let twice = normalize(&once.to_value());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn key_insertion_order_does_not_matter() {
        let a: Value =
            serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":[{"q":1,"p":2}]},"eventId":"E"}"#)
                .expect("parse a");
        let b: Value =
            serde_json::from_str(r#"{"eventId":"E","a":{"x":[{"p":2,"q":1}],"y":2},"b":1}"#)
                .expect("parse b");
        assert_eq!(normalize(&a), normalize(&b));
    }

    #[test]
    fn document_metadata_fields_are_dropped() {
        let canon = normalize(&tagged_create());
        for key in DOCUMENT_METADATA_FIELDS {
            assert!(canon.get(key).is_none(), "{key} should be dropped");
        }
    }

    #[test]
    fn optional_fields_default_to_null() {
        let canon = normalize(&json!({"eventId": "E"}));
        for key in DEFAULTED_FIELDS {
            assert_eq!(canon.get(key), Some(&Value::Null));
        }
    }

    #[test]
    fn empty_structures_are_not_coerced_to_null() {
        let canon = normalize(&json!({
            "eventId": "E",
            "changes": {},
            "deletedData": []
        }));
        assert_eq!(canon.get("changes"), Some(&json!({})));
        assert_eq!(canon.get("deletedData"), Some(&json!([])));

        let tagged = normalize(&json!({
            "name": "docs/x",
            "fields": {
                "changes": {"mapValue": {}},
                "deletedData": {"arrayValue": {}}
            }
        }));
        assert_eq!(tagged.get("changes"), Some(&json!({})));
        assert_eq!(tagged.get("deletedData"), Some(&json!([])));
    }

    #[test]
    fn changed_fields_sorted_or_reset() {
        let sorted = normalize(&json!({"changedFields": ["c", "a", "b"]}));
        assert_eq!(sorted.get(CHANGED_FIELDS_FIELD), Some(&json!(["a", "b", "c"])));

        let reset = normalize(&json!({"changedFields": "a,b"}));
        assert_eq!(reset.get(CHANGED_FIELDS_FIELD), Some(&json!([])));
    }

    #[test]
    fn timestamp_precision_is_folded_everywhere() {
        assert_eq!(
            fold_timestamp_precision("2025-11-05T10:00:14.942Z").as_deref(),
            Some("2025-11-05T10:00:14Z")
        );
        assert_eq!(
            fold_timestamp_precision("2025-11-05T10:00:14.942+02:00").as_deref(),
            Some("2025-11-05T10:00:14+02:00")
        );
        assert_eq!(
            fold_timestamp_precision("2025-11-05T10:00:14").as_deref(),
            Some("2025-11-05T10:00:14")
        );
        assert_eq!(fold_timestamp_precision("2025-11-05"), None);
        assert_eq!(fold_timestamp_precision("trip 2025-11-05T10:00:14Z"), None);

        let canon = normalize(&json!({
            "changes": {"completedAt": {"after": "2025-11-05T10:00:14.5Z", "before": null}}
        }));
        assert_eq!(
            canon.get("changes"),
            Some(&json!({"completedAt": {"after": "2025-11-05T10:00:14Z", "before": null}}))
        );
    }

    #[test]
    fn timestamp_field_is_blinded() {
        let as_string = normalize(&json!({"timestamp": "2025-11-05T10:00:14Z"}));
        let as_placeholder = normalize(&json!({"timestamp": {"_methodName": "serverTimestamp"}}));
        assert_eq!(as_string.get(TIMESTAMP_FIELD), Some(&json!({})));
        assert_eq!(as_string, as_placeholder);
    }

    #[test]
    fn create_metadata_gets_survey_metadata_marker() {
        let create = normalize(&json!({"operation": "CREATE", "metadata": {"writeMetadata": {}}}));
        assert_eq!(
            create.get(METADATA_FIELD),
            Some(&json!({"surveyMetadata": null, "writeMetadata": {}}))
        );

        let update = normalize(&json!({"operation": "UPDATE", "metadata": {"writeMetadata": {}}}));
        assert_eq!(update.get(METADATA_FIELD), Some(&json!({"writeMetadata": {}})));
    }

    #[test]
    fn unknown_envelopes_pass_through_opaquely() {
        let canon = normalize(&json!({
            "name": "docs/x",
            "fields": {
                "operation": {"stringValue": "UPDATE"},
                "weird": {"vectorValue": [1, 2]},
                "metadata": {"mapValue": {"fields": {
                    "bad": {"booleanValue": "maybe"}
                }}}
            }
        }));
        assert_eq!(canon.get("weird"), Some(&json!({"vectorValue": [1, 2]})));
        assert_eq!(
            canon.get(METADATA_FIELD),
            Some(&json!({"bad": {"booleanValue": "maybe"}}))
        );
        assert_eq!(canon.opaque_paths, vec!["metadata.bad", "weird"]);
        assert_eq!(normalize(&canon.to_value()), canon);
    }

    #[test]
    fn malformed_container_envelopes_stay_opaque_across_passes() {
        let raw = json!({
            "name": "docs/x",
            "fields": {
                "changes": {"mapValue": "garbage"},
                "deletedData": {"arrayValue": {"values": "nope"}}
            }
        });
        let once = normalize(&raw);
        assert_eq!(once.get("changes"), Some(&json!({"mapValue": "garbage"})));
        assert_eq!(once.opaque_paths, vec!["changes", "deletedData"]);
        assert_eq!(normalize(&once.to_value()), once);
    }

    #[test]
    fn mixed_records_unwrap_leftover_envelopes() {
        let canon = normalize(&json!({
            "eventId": "E",
            "count": {"integerValue": "3"},
            "nested": {"flag": {"booleanValue": false}}
        }));
        assert_eq!(canon.get("count"), Some(&json!(3)));
        assert_eq!(canon.get("nested"), Some(&json!({"flag": false})));
    }

    #[test]
    fn flattened_fields_inside_tagged_documents_are_unwrapped() {
        let tagged = json!({
            "name": "docs/x",
            "fields": {
                "eventId": {"stringValue": "E1"},
                "changedFields": ["b", {"stringValue": "a"}],
                "metadata": {"k": {"stringValue": "v"}},
                "severity": "INFO"
            }
        });
        let plain = json!({
            "eventId": "E1",
            "changedFields": ["a", "b"],
            "metadata": {"k": "v"},
            "severity": "INFO"
        });

        let once = normalize(&tagged);
        assert_eq!(once.get(CHANGED_FIELDS_FIELD), Some(&json!(["a", "b"])));
        assert_eq!(once.get(METADATA_FIELD), Some(&json!({"k": "v"})));
        assert!(once.opaque_paths.is_empty());
        assert_eq!(normalize(&once.to_value()), once);

        let twin = normalize(&plain);
        assert_eq!(once, twin);
        assert_eq!(
            crate::audit::hash::equivalence_hash(&once),
            crate::audit::hash::equivalence_hash(&twin)
        );
    }

    #[test]
    fn scalar_envelopes_with_wrong_payload_stay_opaque() {
        let raw = json!({
            "name": "docs/x",
            "fields": {
                "x": {"doubleValue": {"integerValue": "1"}},
                "s": {"stringValue": ["a"]},
                "n": {"integerValue": {"stringValue": "2"}},
                "g": {"geoPointValue": {"latitude": {"doubleValue": 1.5}}},
                "ok": {"doubleValue": 1.5}
            }
        });
        let once = normalize(&raw);
        assert_eq!(once.get("x"), Some(&json!({"doubleValue": {"integerValue": "1"}})));
        assert_eq!(once.get("ok"), Some(&json!(1.5)));
        assert_eq!(once.opaque_paths, vec!["g", "n", "s", "x"]);
        assert_eq!(normalize(&once.to_value()), once);
    }

    #[test]
    fn non_object_record_is_opaque() {
        let canon = normalize(&json!("not a record"));
        assert!(canon.fields.is_empty());
        assert_eq!(canon.opaque_paths, vec!["$"]);
    }
}
