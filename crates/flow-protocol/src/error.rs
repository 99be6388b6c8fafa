//! Error types for the RPC protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned in RPC error responses.
///
/// These codes are stable and used for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed JSON, missing required fields, or invalid field values.
    InvalidRequest,
    /// Protocol version is outside the supported range.
    UnsupportedProtocol,
    /// Unknown operation requested.
    UnknownOperation,
    /// Ticket not found.
    TicketNotFound,
    /// Flow node not found on the ticket.
    FlowNotFound,
    /// Todo not found.
    TodoNotFound,
    /// The requested status change is not allowed from the current status.
    InvalidTransition,
    /// Engine is misconfigured (unknown stage, bad stage ordering).
    Misconfigured,
    /// Unexpected engine failure.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::UnsupportedProtocol => write!(f, "UNSUPPORTED_PROTOCOL"),
            Self::UnknownOperation => write!(f, "UNKNOWN_OPERATION"),
            Self::TicketNotFound => write!(f, "TICKET_NOT_FOUND"),
            Self::FlowNotFound => write!(f, "FLOW_NOT_FOUND"),
            Self::TodoNotFound => write!(f, "TODO_NOT_FOUND"),
            Self::InvalidTransition => write!(f, "INVALID_TRANSITION"),
            Self::Misconfigured => write!(f, "MISCONFIGURED"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// RPC error response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code from the registry.
    pub code: ErrorCode,
    /// Human-readable, single-line error message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Create a new RPC error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new RPC error with additional data.
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create an INVALID_REQUEST error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create an UNSUPPORTED_PROTOCOL error.
    pub fn unsupported_protocol(version: i32, min: i32, max: i32) -> Self {
        Self::with_data(
            ErrorCode::UnsupportedProtocol,
            format!("protocol_version {} is outside supported range [{}, {}]", version, min, max),
            serde_json::json!({
                "requested": version,
                "min": min,
                "max": max
            }),
        )
    }

    /// Create an UNKNOWN_OPERATION error.
    pub fn unknown_operation(op: &str) -> Self {
        Self::with_data(
            ErrorCode::UnknownOperation,
            format!("unknown operation: {}", op),
            serde_json::json!({ "op": op }),
        )
    }

    /// Create a TICKET_NOT_FOUND error.
    pub fn ticket_not_found(ticket_id: u64) -> Self {
        Self::with_data(
            ErrorCode::TicketNotFound,
            format!("ticket {} not found", ticket_id),
            serde_json::json!({ "ticket_id": ticket_id }),
        )
    }

    /// Create a FLOW_NOT_FOUND error.
    pub fn flow_not_found(flow_id: u64) -> Self {
        Self::with_data(
            ErrorCode::FlowNotFound,
            format!("flow {} not found", flow_id),
            serde_json::json!({ "flow_id": flow_id }),
        )
    }

    /// Create a TODO_NOT_FOUND error.
    pub fn todo_not_found(todo_id: u64) -> Self {
        Self::with_data(
            ErrorCode::TodoNotFound,
            format!("todo {} not found", todo_id),
            serde_json::json!({ "todo_id": todo_id }),
        )
    }

    /// Create an INVALID_TRANSITION error.
    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::with_data(
            ErrorCode::InvalidTransition,
            format!("cannot transition from {} to {}", from, to),
            serde_json::json!({ "from": from, "to": to }),
        )
    }

    /// Create a MISCONFIGURED error.
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Misconfigured, message)
    }

    /// Create an INTERNAL error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}
