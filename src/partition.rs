//! Splits a discovered-repositories index by when each entry was last
//! checked.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// Entries of the index, split into those still due for a check and the
/// rest.
#[derive(Debug, Default, PartialEq)]
pub struct Partition {
    pub matched: Map<String, Value>,
    pub other: Map<String, Value>,
}

/// Returns true if an entry was never checked or was last checked at a
/// timestamp starting with `prefix`.
pub fn is_due(entry: &Value, prefix: &str) -> bool {
    match entry.get("lastCheckedAt") {
        None | Some(Value::Null) => true,
        Some(Value::String(checked)) => checked.starts_with(prefix),
        Some(_) => false,
    }
}

pub fn partition(index: Map<String, Value>, prefix: &str) -> Partition {
    let mut result = Partition::default();
    for (name, entry) in index {
        if is_due(&entry, prefix) {
            result.matched.insert(name, entry);
        } else {
            result.other.insert(name, entry);
        }
    }
    result
}

/// Reads the index at `input` and writes both halves as pretty-printed JSON.
pub fn partition_file(input: &Path, matched: &Path, other: &Path, prefix: &str) -> Result<Partition> {
    let raw = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let index: Map<String, Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON object", input.display()))?;

    let result = partition(index, prefix);
    write_json(matched, &result.matched)?;
    write_json(other, &result.other)?;
    Ok(result)
}

fn write_json(path: &Path, map: &Map<String, Value>) -> Result<()> {
    let json = serde_json::to_string_pretty(map)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
