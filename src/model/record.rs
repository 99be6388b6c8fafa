//! Operation ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ticket::TicketType;

/// What an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OperationTarget {
    Cluster(u64),
    Instance(u64),
}

/// Append-only record that a ticket's flow operated on a target.
///
/// Unique on (target, flow, ticket). Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub target: OperationTarget,
    pub flow_id: u64,
    pub ticket_id: u64,
    pub ticket_type: TicketType,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

impl OperationRecord {
    /// Identity used for de-duplication.
    pub fn key(&self) -> (OperationTarget, u64, u64) {
        (self.target, self.flow_id, self.ticket_id)
    }
}
