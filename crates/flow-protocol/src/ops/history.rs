//! Operation history query types.
//!
//! Lists the tickets that operated on one cluster or one instance, newest
//! first, and whether each still holds it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// History request payload; name exactly one of the two targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationHistoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEntry {
    pub ticket_id: u64,
    pub flow_id: u64,
    pub ticket_type: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_status: Option<String>,
    /// The operation still blocks conflicting tickets.
    pub holding: bool,
}

/// History response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationHistoryResponse {
    /// `cluster` or `instance`
    pub target_kind: String,
    pub target_id: u64,
    pub entries: Vec<OperationEntry>,
}
