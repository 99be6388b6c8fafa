//! Revoke operation types.

use serde::{Deserialize, Serialize};

/// Revoke request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub ticket_ids: Vec<u64>,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Revoke response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevokeResponse {
    /// Tickets whose active stage was revoked.
    pub revoked: Vec<u64>,
    /// Tickets that were already terminal or had nothing left to revoke.
    pub skipped: Vec<u64>,
}
