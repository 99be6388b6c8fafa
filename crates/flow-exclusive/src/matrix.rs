//! Exclusivity matrix storage and lookup.

use crate::decision::{ConflictDecision, DecisionSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Active-type key matching every active ticket type in a row.
pub const WILDCARD: &str = "*";

/// Errors loading a matrix.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("failed to read matrix file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid matrix TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid matrix JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty ticket type in matrix row '{0}'")]
    EmptyTicketType(String),
}

/// Static map `requesting type -> active type -> conflicts`.
///
/// Rows are keyed by the ticket type asking to start; columns by the ticket
/// type of an operation already active on the cluster. A missing row or
/// column means the pair conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusivityMatrix {
    rows: BTreeMap<String, BTreeMap<String, bool>>,
}

impl ExclusivityMatrix {
    /// Empty matrix: every pair conflicts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a matrix from TOML, one table per requesting ticket type.
    ///
    /// ```toml
    /// [MYSQL_CHECKSUM]
    /// MYSQL_HA_APPLY = false
    /// "*" = true
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, MatrixError> {
        let rows: BTreeMap<String, BTreeMap<String, bool>> = toml::from_str(text)?;
        Self::from_rows(rows)
    }

    /// Build a matrix from a JSON object of the same shape as the TOML form.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, MatrixError> {
        let rows: BTreeMap<String, BTreeMap<String, bool>> = serde_json::from_value(value)?;
        Self::from_rows(rows)
    }

    /// Load a matrix from a TOML file.
    pub fn load(path: &Path) -> Result<Self, MatrixError> {
        let text = std::fs::read_to_string(path).map_err(|source| MatrixError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn from_rows(rows: BTreeMap<String, BTreeMap<String, bool>>) -> Result<Self, MatrixError> {
        for (requesting, columns) in &rows {
            if requesting.trim().is_empty() {
                return Err(MatrixError::EmptyTicketType(requesting.clone()));
            }
            if columns.keys().any(|active| active.trim().is_empty()) {
                return Err(MatrixError::EmptyTicketType(requesting.clone()));
            }
        }
        Ok(Self { rows })
    }

    /// Set one entry.
    pub fn set(&mut self, requesting: impl Into<String>, active: impl Into<String>, conflicts: bool) {
        self.rows
            .entry(requesting.into())
            .or_default()
            .insert(active.into(), conflicts);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, requesting: impl Into<String>, active: impl Into<String>, conflicts: bool) -> Self {
        self.set(requesting, active, conflicts);
        self
    }

    /// Whether `requesting` must wait for an active `active` operation.
    pub fn conflicts(&self, requesting: &str, active: &str) -> bool {
        self.decide(requesting, active).conflicts
    }

    /// Look up a pair and report which entry decided it.
    pub fn decide(&self, requesting: &str, active: &str) -> ConflictDecision {
        let row = self.rows.get(requesting);
        let (conflicts, source) = match row.and_then(|r| r.get(active)) {
            Some(&c) => (c, DecisionSource::Explicit),
            None => match row.and_then(|r| r.get(WILDCARD)) {
                Some(&c) => (c, DecisionSource::Wildcard),
                None => (true, DecisionSource::Default),
            },
        };
        ConflictDecision {
            requesting: requesting.to_string(),
            active: active.to_string(),
            conflicts,
            source,
        }
    }

    /// Number of explicit entries, wildcards included.
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pair_conflicts() {
        let matrix = ExclusivityMatrix::new();
        assert!(matrix.conflicts("MYSQL_RESTART", "MYSQL_HA_APPLY"));
        let decision = matrix.decide("MYSQL_RESTART", "MYSQL_HA_APPLY");
        assert_eq!(decision.source, DecisionSource::Default);
    }

    #[test]
    fn test_explicit_entry_wins_over_wildcard() {
        let matrix = ExclusivityMatrix::new()
            .with("MYSQL_CHECKSUM", WILDCARD, true)
            .with("MYSQL_CHECKSUM", "MYSQL_HA_APPLY", false);

        let decision = matrix.decide("MYSQL_CHECKSUM", "MYSQL_HA_APPLY");
        assert!(!decision.conflicts);
        assert_eq!(decision.source, DecisionSource::Explicit);

        let decision = matrix.decide("MYSQL_CHECKSUM", "MYSQL_RESTART");
        assert!(decision.conflicts);
        assert_eq!(decision.source, DecisionSource::Wildcard);
    }

    #[test]
    fn test_matrix_is_directional() {
        let matrix = ExclusivityMatrix::new().with("A", "B", false);
        assert!(!matrix.conflicts("A", "B"));
        assert!(matrix.conflicts("B", "A"));
    }

    #[test]
    fn test_from_toml() {
        let matrix = ExclusivityMatrix::from_toml_str(
            r#"
[MYSQL_CHECKSUM]
MYSQL_HA_APPLY = false
"*" = true

[REDIS_KEYS_EXTRACT]
"*" = false
"#,
        )
        .unwrap();
        assert_eq!(matrix.len(), 3);
        assert!(!matrix.conflicts("MYSQL_CHECKSUM", "MYSQL_HA_APPLY"));
        assert!(!matrix.conflicts("REDIS_KEYS_EXTRACT", "REDIS_PROXY_SCALE_UP"));
    }

    #[test]
    fn test_from_json_rejects_empty_key() {
        let err = ExclusivityMatrix::from_json_value(serde_json::json!({
            "A": { "": false }
        }))
        .unwrap_err();
        assert!(matches!(err, MatrixError::EmptyTicketType(_)));
    }

    #[test]
    fn test_from_json_rejects_non_bool() {
        let err = ExclusivityMatrix::from_json_value(serde_json::json!({
            "A": { "B": "no" }
        }))
        .unwrap_err();
        assert!(matches!(err, MatrixError::Json(_)));
    }

    #[test]
    fn test_serde_round_trip_shape() {
        let matrix = ExclusivityMatrix::new().with("A", "B", false);
        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json, serde_json::json!({ "A": { "B": false } }));
    }
}
