//! Typed views over management API replies.

use eyre::{
    bail,
    eyre,
    Result,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Node fields copied into `NodeDescriptor::labels` when present.
pub const NODE_LABEL_KEYS: &[&str] = &["name", "type", "running"];

/// Flat `dotted.key -> value` view of one reply.
///
/// A key missing from the snapshot is not an error, the management API omits
/// fields depending on broker version and enabled features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatSnapshot {
    values: BTreeMap<String, f64>,
}

impl StatSnapshot {
    /// Flattens nested objects with `.` separators.
    ///
    /// Numbers are kept as is, booleans become 1/0. Strings, arrays and nulls
    /// carry no gauge value and are dropped.
    pub fn from_json(value: &Value) -> Self {
        let mut snapshot = Self::default();
        snapshot.flatten("", value);
        snapshot
    }

    fn flatten(&mut self, prefix: &str, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, value) in map {
                    let key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    self.flatten(&key, value);
                }
            }
            Value::Number(number) if !prefix.is_empty() => {
                if let Some(number) = number.as_f64() {
                    self.values.insert(prefix.to_string(), number);
                }
            }
            Value::Bool(flag) if !prefix.is_empty() => {
                self.values.insert(prefix.to_string(), if *flag { 1.0 } else { 0.0 });
            }
            _ => {}
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StatSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(key, value)| (key.into(), value)).collect(),
        }
    }
}

/// One cluster member as listed by the `nodes` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: BTreeMap::from([("name".to_string(), name.clone())]),
            name,
        }
    }

    /// Parses the reply of the `nodes` endpoint.
    ///
    /// Every entry must carry a string `name`. Scalar fields listed in
    /// `NODE_LABEL_KEYS` are copied into the labels.
    pub fn list_from_json(value: &Value) -> Result<Vec<Self>> {
        let Value::Array(entries) = value else {
            bail!("Expected a JSON array of nodes, got: {value}");
        };

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| eyre!("Node entry {index} has no name"))?;
                let mut node = Self::new(name);
                for key in NODE_LABEL_KEYS {
                    let label = match entry.get(*key) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Bool(b)) => b.to_string(),
                        Some(Value::Number(n)) => n.to_string(),
                        _ => continue,
                    };
                    node.labels.insert(key.to_string(), label);
                }
                Ok(node)
            })
            .collect()
    }
}

/// A structured reply that carries strings next to numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatDocument {
    value: Value,
}

impl StatDocument {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Top-level string field. Missing or non-string fields yield `None`.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot::from_json(&self.value)
    }
}

impl From<Value> for StatDocument {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
