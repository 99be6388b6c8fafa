//! Store snapshot file (ticket_flow_state.json)

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::StoreData;

/// Schema version for the snapshot file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "dbm-ticket-flow/state@1";

/// Errors for snapshot operations
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("unsupported snapshot schema {found} (expected {expected})")]
    SchemaMismatch { found: String, expected: String },
}

/// Serialized form of the whole store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub schema_id: String,
    pub data: StoreData,
}

impl Snapshot {
    pub fn new(data: StoreData) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            data,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON, rejecting foreign schemas
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        if snapshot.schema_id != SCHEMA_ID {
            return Err(SnapshotError::SchemaMismatch {
                found: snapshot.schema_id,
                expected: SCHEMA_ID.to_string(),
            });
        }
        Ok(snapshot)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = self.to_json()?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, SnapshotError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        Snapshot::new(StoreData::default()).write_to_file(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = Snapshot::from_file(&path).unwrap();
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert!(loaded.data.tickets.is_empty());
    }

    #[test]
    fn test_rejects_foreign_schema() {
        let json = r#"{"schema_version":1,"schema_id":"other@1","data":{"tickets":{},"todos":{},"records":[],"id_counter":0}}"#;
        let err = Snapshot::from_json(json).unwrap_err();
        assert!(matches!(err, SnapshotError::SchemaMismatch { .. }));
    }
}
