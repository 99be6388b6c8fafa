//! Retry operation types.

use serde::{Deserialize, Serialize};

/// Retry request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryFlowRequest {
    pub ticket_id: u64,
    pub flow_id: u64,
    pub operator: String,
}

/// Retry response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryFlowResponse {
    pub ticket_id: u64,
    pub flow_id: u64,
    /// Stage status after the retry attempt.
    pub flow_status: String,
    /// Ticket status after the retry attempt.
    pub ticket_status: String,
}
