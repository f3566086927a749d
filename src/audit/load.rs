use crate::error::AuditVerifyError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Raw records read from one source, plus anything skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct LoadedSource {
    pub records: Vec<Value>,
    pub files_read: usize,
    /// `file: reason` for entries that were not objects.
    pub skipped: Vec<String>,
}

impl LoadedSource {
    fn push_objects(&mut self, items: Vec<Value>, origin: &Path) {
        for (idx, item) in items.into_iter().enumerate() {
            if item.is_object() {
                self.records.push(item);
            } else {
                self.skipped
                    .push(format!("{}[{idx}]: not an object", origin.display()));
            }
        }
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).map_err(|err| {
        AuditVerifyError::SourceUnavailable(format!("{}: {err}", path.display()))
    })?;
    let parsed = serde_json::from_str(&raw).map_err(|err| {
        AuditVerifyError::SourceUnparseable(format!("{}: {err}", path.display()))
    })?;
    Ok(parsed)
}

/// Read the live export: `{"documents": [...]}` as written by the export
/// download, or a bare array of documents.
pub fn load_live_export(path: &Path) -> Result<LoadedSource> {
    let parsed = read_json(path)
        .with_context(|| format!("failed to load live export {}", path.display()))?;

    let documents = match parsed {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("documents") {
            Some(Value::Array(items)) => items,
            // An export of an empty collection has no `documents` key at all.
            None => Vec::new(),
            Some(_) => {
                return Err(AuditVerifyError::SourceUnparseable(format!(
                    "{}: `documents` is not an array",
                    path.display()
                ))
                .into());
            }
        },
        _ => {
            return Err(AuditVerifyError::SourceUnparseable(format!(
                "{}: expected an object with `documents` or an array",
                path.display()
            ))
            .into());
        }
    };

    let mut loaded = LoadedSource {
        files_read: 1,
        ..LoadedSource::default()
    };
    loaded.push_objects(documents, path);
    Ok(loaded)
}

/// Read a single file of records in whichever layout it comes: an export
/// wrapper with `documents`, an array, or one record object.
pub fn load_record_file(path: &Path) -> Result<LoadedSource> {
    let parsed =
        read_json(path).with_context(|| format!("failed to load records {}", path.display()))?;
    let items = match parsed {
        Value::Object(mut obj) => match obj.remove("documents") {
            Some(Value::Array(items)) => items,
            Some(documents) => {
                obj.insert("documents".to_string(), documents);
                vec![Value::Object(obj)]
            }
            None => vec![Value::Object(obj)],
        },
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut loaded = LoadedSource {
        files_read: 1,
        ..LoadedSource::default()
    };
    loaded.push_objects(items, path);
    Ok(loaded)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let read_dir = fs::read_dir(dir).map_err(|err| {
        AuditVerifyError::SourceUnavailable(format!("{}: {err}", dir.display()))
    })?;
    for entry in read_dir {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Read every `*.json` file under the archive directory, recursively, in
/// sorted path order. A file holds one record or an array of records.
pub fn load_archive_dir(dir: &Path) -> Result<LoadedSource> {
    if !dir.is_dir() {
        return Err(AuditVerifyError::SourceUnavailable(format!(
            "{} is not a directory",
            dir.display()
        ))
        .into());
    }

    let mut files = Vec::new();
    collect_json_files(dir, &mut files)
        .with_context(|| format!("failed to scan archive {}", dir.display()))?;
    files.sort();

    let mut loaded = LoadedSource::default();
    for file in files {
        let parsed = read_json(&file)
            .with_context(|| format!("failed to load archive entry {}", file.display()))?;
        loaded.files_read += 1;
        match parsed {
            Value::Object(_) => loaded.records.push(parsed),
            Value::Array(items) => loaded.push_objects(items, &file),
            _ => loaded
                .skipped
                .push(format!("{}: not an object", file.display())),
        }
    }
    Ok(loaded)
}
