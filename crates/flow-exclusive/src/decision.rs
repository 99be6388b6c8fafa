//! Decision types.

use serde::{Deserialize, Serialize};

/// Where a conflict decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    /// An entry for exactly this pair of ticket types.
    Explicit,
    /// The requesting type's wildcard entry.
    Wildcard,
    /// No entry; the pair conflicts.
    Default,
}

/// Outcome of looking up a (requesting, active) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecision {
    pub requesting: String,
    pub active: String,
    pub conflicts: bool,
    pub source: DecisionSource,
}

impl ConflictDecision {
    /// Machine-readable one-line summary.
    pub fn to_code(&self) -> String {
        let verdict = if self.conflicts { "CONFLICT" } else { "COMPATIBLE" };
        let source = match self.source {
            DecisionSource::Explicit => "EXPLICIT",
            DecisionSource::Wildcard => "WILDCARD",
            DecisionSource::Default => "DEFAULT",
        };
        format!("{}:{}->{}:{}", verdict, self.requesting, self.active, source)
    }
}
