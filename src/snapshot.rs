//! Snapshot input adapter
//!
//! Parses the record store's snapshot payload into the engine's input type.
//! A snapshot is immutable for the duration of one analytics pass and carries
//! a version so that callers can key caches on it.
//!
//! ```json
//! {
//!   "version": 42,
//!   "entries": [
//!     {
//!       "record": {
//!         "respondent_id": "r-1",
//!         "answers": { "1": 0, "2": 3 },
//!         "responded_at": "2024-01-15T09:00:00Z"
//!       },
//!       "profile": { "respondent_id": "r-1", "department": "Almacén" }
//!     }
//!   ]
//! }
//! ```

use crate::error::AnalyticsError;
use crate::types::{RawResponseRecord, RespondentProfile};
use serde::{Deserialize, Serialize};

/// One respondent's answers paired with their profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub record: RawResponseRecord,
    pub profile: RespondentProfile,
}

impl SnapshotEntry {
    pub fn new(record: RawResponseRecord, profile: RespondentProfile) -> Self {
        Self { record, profile }
    }

    /// Profile id differs from the record's respondent id
    pub fn is_mismatched(&self) -> bool {
        self.record.respondent_id != self.profile.respondent_id
    }
}

/// The input set of one analytics pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic version assigned by the record store
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(version: u64, entries: Vec<SnapshotEntry>) -> Self {
        Self { version, entries }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a snapshot JSON string.
///
/// The payload must be a JSON object; `{}` is an empty snapshot.
pub fn parse_snapshot(json: &str) -> Result<Snapshot, AnalyticsError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| AnalyticsError::ParseError(format!("Failed to parse snapshot: {}", e)))?;
    if !value.is_object() {
        return Err(AnalyticsError::ParseError("snapshot must be a JSON object".to_string()));
    }
    serde_json::from_value(value)
        .map_err(|e| AnalyticsError::ParseError(format!("Failed to parse snapshot: {}", e)))
}
