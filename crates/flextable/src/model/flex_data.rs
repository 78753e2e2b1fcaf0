//! Flex Data - Validated JSON map of undeclared attributes
//!
//! Keys must look like identifiers (`^[A-Za-z_]\w*$`) and `null` values are
//! never stored. Every mutation produces a new map so the owning model sees
//! a replaced value rather than an in-place edit.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlexError, FlexResult};

/// Column key reserved for flex data
pub const FLEX_DATA: &str = "flex_data";

static VALID_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_]\w*$").expect("flex key pattern is a valid regex")
});

/// Check a flex key against the identifier pattern
pub fn validate_key(key: &str) -> FlexResult<()> {
    if VALID_KEY.is_match(key) {
        Ok(())
    } else {
        Err(FlexError::Validation(format!(
            "flex_data attribute keys must contain only letters, numbers, and '_', \
             and cannot start with a number (got '{}')",
            key
        )))
    }
}

/// Open-ended attribute map stored in the flex column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct FlexData {
    entries: BTreeMap<String, Value>,
}

impl FlexData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new map with `key` set to `value`
    ///
    /// A `null` value leaves the map unchanged; it does not remove the key.
    pub fn with_entry(&self, key: &str, value: Value) -> FlexResult<Self> {
        validate_key(key)?;
        if value.is_null() {
            return Ok(self.clone());
        }

        let mut entries = self.entries.clone();
        entries.insert(key.to_string(), value);
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.clone().into())
    }

    /// Decode a stored column value; `null` reads as an empty map
    pub fn from_value(value: Value) -> FlexResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::try_from(map),
            other => Err(FlexError::Validation(format!(
                "flex_data must be a JSON object, got {}",
                other
            ))),
        }
    }
}

impl TryFrom<Map<String, Value>> for FlexData {
    type Error = FlexError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for (key, value) in map {
            validate_key(&key)?;
            if !value.is_null() {
                entries.insert(key, value);
            }
        }
        Ok(Self { entries })
    }
}

impl From<FlexData> for Map<String, Value> {
    fn from(data: FlexData) -> Self {
        data.entries.into_iter().collect()
    }
}

impl From<FlexData> for Value {
    fn from(data: FlexData) -> Self {
        Value::Object(data.into())
    }
}

impl PartialEq<Value> for FlexData {
    fn eq(&self, other: &Value) -> bool {
        match other {
            Value::Object(map) => {
                map.len() == self.entries.len()
                    && map.iter().all(|(k, v)| self.entries.get(k) == Some(v))
            }
            _ => false,
        }
    }
}
