//! Ticket status query types.

use serde::{Deserialize, Serialize};

/// Status request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatusRequest {
    pub ticket_id: u64,
}

/// Summary of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSummary {
    pub flow_id: u64,
    pub flow_type: String,
    pub alias: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
}

/// Summary of one todo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoSummary {
    pub todo_id: u64,
    pub flow_id: u64,
    pub todo_type: String,
    pub status: String,
    pub operators: Vec<String>,
}

/// Status response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatusResponse {
    pub ticket_id: u64,
    pub ticket_type: String,
    pub status: String,
    /// Id of the current stage, if any stage exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_flow_id: Option<u64>,
    pub flows: Vec<FlowSummary>,
    pub todos: Vec<TodoSummary>,
}
