//! Parsed, immutable views of a data source.
//!
//! A [`Snapshot`] is an ordered sequence of opaque JSON records. It is never
//! partially constructed: parsing either fully succeeds or the caller gets an
//! error (or, through [`Snapshot::load`], the empty snapshot).
//!
//! # Extraction Rules
//!
//! | Top-level JSON              | Snapshot                                   |
//! |-----------------------------|--------------------------------------------|
//! | array                       | the array                                  |
//! | object                      | value of the first key holding an array    |
//! | object without array values | error (empty via `load`)                   |
//! | anything else / invalid     | error (empty via `load`)                   |
//!
//! "First key" means first in the order the keys appear in the file.

use std::sync::Arc;

use camino::Utf8Path;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::SnapshotError;

/// One fully parsed, immutable view of a data source.
///
/// Cloning is cheap: the records are shared behind an [`Arc`], so one
/// snapshot can be handed to every subscriber of a source.
///
/// # Examples
///
/// ```
/// use ds_core::Snapshot;
///
/// let snapshot = Snapshot::parse(br#"{"meta": 1, "reels": [{"program": "BFA"}]}"#).unwrap();
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(snapshot.to_json(), r#"[{"program":"BFA"}]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    records: Arc<[Value]>,
}

impl Snapshot {
    /// Returns the empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a snapshot from already-parsed records.
    #[must_use]
    pub fn from_records(records: Vec<Value>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Parses raw file contents.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Parse`] for invalid JSON and
    /// [`SnapshotError::NoRecords`] when no array can be found.
    pub fn parse(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::extract(value)
    }

    /// Applies the extraction rules to a decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::NoRecords`] when no array can be found.
    pub fn extract(value: Value) -> Result<Self, SnapshotError> {
        match value {
            Value::Array(records) => Ok(Self::from_records(records)),
            Value::Object(map) => map
                .into_iter()
                .find_map(|(_, value)| match value {
                    Value::Array(records) => Some(records),
                    _ => None,
                })
                .map(Self::from_records)
                .ok_or(SnapshotError::NoRecords { found: "object" }),
            other => Err(SnapshotError::NoRecords {
                found: json_kind(&other),
            }),
        }
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the file cannot be read, or any
    /// error from [`parse`](Self::parse).
    pub fn try_load(path: &Utf8Path) -> Result<Self, SnapshotError> {
        let bytes = std::fs::read(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&bytes)
    }

    /// Reads and parses the file at `path`, falling back to the empty snapshot.
    ///
    /// Failures are logged and never returned; a stream of snapshots keeps
    /// flowing even while the file is malformed.
    #[must_use]
    pub fn load(path: &Utf8Path) -> Self {
        match Self::try_load(path) {
            Ok(snapshot) => {
                tracing::debug!(source = %path, records = snapshot.len(), "Loaded snapshot");
                snapshot
            }
            Err(error) => {
                tracing::warn!(source = %path, %error, "Error reading JSON data, using empty snapshot");
                Self::empty()
            }
        }
    }

    /// Returns the records in file order.
    #[must_use]
    pub fn records(&self) -> &[Value] {
        &self.records
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encodes the records as a compact JSON array.
    ///
    /// Compact JSON never contains a raw newline, so the result always fits
    /// in a single `data:` line.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Records are `Value`s with string keys, which always serialize.
        serde_json::to_string(self).unwrap_or_else(|error| {
            tracing::error!(%error, "Failed to encode snapshot");
            String::from("[]")
        })
    }
}

impl From<Vec<Value>> for Snapshot {
    fn from(records: Vec<Value>) -> Self {
        Self::from_records(records)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.iter())
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Value>::deserialize(deserializer).map(Self::from_records)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
