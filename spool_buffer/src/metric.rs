//! The metric record carried through spool.

use std::{collections::BTreeMap, time::SystemTime};

use serde::{Deserialize, Serialize};

/// A single field value of a [`Metric`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    /// A boolean
    Bool(bool),
    /// An unsigned integer
    UInt(u64),
    /// A signed integer
    Int(i64),
    /// A float
    Float(f64),
    /// A string
    String(String),
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// One measurement: a name, tags, fields and a timestamp.
///
/// A `Metric` is never mutated once built. The buffer stores it by value and
/// hands ownership to whoever extracts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    /// The name of the measurement
    pub name: String,
    /// Tags identifying the series
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// The measured values
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    /// When the measurement was taken
    #[serde(default = "SystemTime::now")]
    pub timestamp: SystemTime,
}

impl Metric {
    /// Create a new `Metric` with no tags or fields, stamped `timestamp`
    #[must_use]
    pub fn new(name: impl Into<String>, timestamp: SystemTime) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Add a tag, replacing any previous tag of the same key
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field, replacing any previous field of the same key
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Field>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Return a copy of this metric stamped with `timestamp`
    #[must_use]
    pub fn restamped(&self, timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}
