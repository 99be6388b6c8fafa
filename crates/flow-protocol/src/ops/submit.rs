//! Submit operation types.
//!
//! A ticket arrives fully built: the caller supplies the ordered stage list.

use serde::{Deserialize, Serialize};

/// One stage of a submitted ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Stage type tag, e.g. `INNER_FLOW` or `RESOURCE_APPLY`.
    pub flow_type: String,
    /// Display alias.
    #[serde(default)]
    pub alias: String,
    /// Stage payload handed to the stage handler.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Retry policy tag (`MANUAL` or `AUTO_ON_MUTEX`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_type: Option<String>,
}

/// Submit request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTicketRequest {
    /// Ticket type, e.g. `MYSQL_HA_APPLY`.
    pub ticket_type: String,
    /// Owning business id.
    pub bk_biz_id: u64,
    /// DB group (mysql, redis, ...).
    #[serde(default)]
    pub group: String,
    /// Submitting user.
    pub creator: String,
    #[serde(default)]
    pub remark: String,
    /// Ticket details shared by all stages.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Ordered stages; insertion order is execution order.
    pub flows: Vec<FlowSpec>,
    /// Start the first stage right away.
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

fn default_true() -> bool {
    true
}

/// Submit response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTicketResponse {
    /// Assigned ticket id.
    pub ticket_id: u64,
    /// Ticket status after the first scheduling pass.
    pub status: String,
}
