//! Key and value validation for batch operations
//!
//! Batch inputs are drained into ordered, de-duplicated collections before
//! any adapter touches its backend, because every adapter needs the full
//! key set up front to issue one batched native call.

use crate::errors::CacheError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A validated, non-empty cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a raw key. Strings and integral numbers are accepted,
    /// integers are turned into their decimal form.
    pub fn parse(raw: &Value) -> Result<Self, CacheError> {
        let key = match raw {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
            other => {
                return Err(CacheError::validation(format!(
                    "keys must be strings or integers, got {}",
                    describe(other)
                )));
            }
        };

        if key.is_empty() {
            return Err(CacheError::validation("keys cannot be empty"));
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a non-integer number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validate every key of a batch read or delete.
///
/// Repeated keys collapse onto their first occurrence so the result mirrors
/// the order in which keys were first requested.
pub fn check_keys<I>(keys: I) -> Result<Vec<CacheKey>, CacheError>
where
    I: IntoIterator<Item = Value>,
{
    let keys = keys.into_iter();
    let mut checked: Vec<CacheKey> = Vec::with_capacity(keys.size_hint().0);
    let mut seen: HashSet<CacheKey> = HashSet::new();

    for raw in keys {
        let key = CacheKey::parse(&raw)?;
        if seen.insert(key.clone()) {
            checked.push(key);
        }
    }

    Ok(checked)
}

/// Validate every key of a batch write.
///
/// A repeated key keeps the position of its first occurrence and the value
/// of its last one, the way assigning into a map would.
pub fn check_values<I>(values: I) -> Result<Vec<(CacheKey, Value)>, CacheError>
where
    I: IntoIterator<Item = (Value, Value)>,
{
    let values = values.into_iter();
    let mut checked: Vec<(CacheKey, Value)> = Vec::with_capacity(values.size_hint().0);
    let mut positions: HashMap<CacheKey, usize> = HashMap::new();

    for (raw, value) in values {
        let key = CacheKey::parse(&raw)?;
        match positions.get(&key) {
            Some(&index) => checked[index].1 = value,
            None => {
                positions.insert(key.clone(), checked.len());
                checked.push((key, value));
            }
        }
    }

    Ok(checked)
}
