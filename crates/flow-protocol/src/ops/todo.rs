//! Todo processing types.

use serde::{Deserialize, Serialize};

/// Process-todo request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTodoRequest {
    pub todo_id: u64,
    /// Action name: `APPROVE`, `TERMINATE`, `RESUME` or `RETRY`.
    pub action: String,
    pub operator: String,
    /// Free-form parameters recorded with the action.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Process-todo response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTodoResponse {
    pub todo_id: u64,
    pub todo_status: String,
    pub ticket_id: u64,
    pub ticket_status: String,
}
