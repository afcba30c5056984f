//! Structural cache keys.
//!
//! A key is derived from an operation name plus its parameters so that the
//! same logical request built at two call sites lands on the same entry and
//! coalesces into the same in-flight load.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Deterministic key for one cacheable operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a parameterless operation.
    pub fn new(operation: &str) -> Self {
        Self(operation.to_string())
    }

    /// Key for an operation scoped by a single identifier: `operation-id`.
    pub fn scoped(operation: &str, id: impl fmt::Display) -> Self {
        Self(format!("{}-{}", operation, id))
    }

    /// Key for an operation with arbitrary serializable parameters.
    ///
    /// Unit/null parameters collapse to the bare operation name and a lone
    /// string to the [`scoped`](Self::scoped) form; anything else is encoded
    /// as canonical JSON with object keys sorted.
    pub fn for_operation<P>(operation: &str, params: &P) -> Result<Self, serde_json::Error>
    where
        P: Serialize + ?Sized,
    {
        let value = serde_json::to_value(params)?;
        Ok(match value {
            Value::Null => Self::new(operation),
            Value::String(s) => Self::scoped(operation, s),
            other => {
                let mut encoded = String::new();
                write_canonical(&other, &mut encoded);
                Self(format!("{}:{}", operation, encoded))
            }
        })
    }

    /// Wrap an already-built key string.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::raw(value)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
