//! Declarative reshaping of step values by dotted paths.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One `{from, to}` rule. `to == "."` replaces the whole output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRule {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

impl RemapRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemapError {
    #[error("key '{key}' not found in the data at path '{path}'")]
    MissingKey { key: String, path: String },
    #[error("output must be a mapping to set values by path '{path}'")]
    NotAMapping { path: String },
}

/// Apply `rules` to `input` and return the rebuilt value.
pub fn remap(input: &Value, rules: &[RemapRule]) -> Result<Value, RemapError> {
    let mut out = if input.is_object() {
        Value::Object(Map::new())
    } else {
        Value::Array(Vec::new())
    };

    for rule in rules {
        let source = get_path(input, &rule.from)?.clone();
        if rule.to == "." {
            out = source;
        } else {
            set_path(&mut out, &rule.to, source)?;
        }
    }
    Ok(out)
}

/// Read the value at a dotted path; empty path means the whole value.
pub fn get_path<'v>(data: &'v Value, path: &str) -> Result<&'v Value, RemapError> {
    if path.is_empty() {
        return Ok(data);
    }

    let mut current = data;
    for key in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| RemapError::MissingKey {
            key: key.to_string(),
            path: path.to_string(),
        })?;
    }
    Ok(current)
}

/// Write `value` at a dotted path, creating intermediate mappings.
pub fn set_path(data: &mut Value, path: &str, value: Value) -> Result<(), RemapError> {
    if path.is_empty() {
        return Ok(());
    }

    let not_mapping = || RemapError::NotAMapping {
        path: path.to_string(),
    };

    let keys: Vec<&str> = path.split('.').collect();
    let (last, parents) = keys.split_last().ok_or_else(not_mapping)?;

    let mut current = data.as_object_mut().ok_or_else(not_mapping)?;
    for key in parents {
        let slot = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = slot.as_object_mut().ok_or_else(not_mapping)?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}
