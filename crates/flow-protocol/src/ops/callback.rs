//! Callback operation types.
//!
//! External systems report progress here; every event re-enters the scheduler.

use serde::{Deserialize, Serialize};

/// Inbound event from an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackEvent {
    /// The approval system resolved an approval ticket.
    Approval {
        /// Approval serial number.
        sn: String,
        approved: bool,
        #[serde(default)]
        operator: String,
    },
    /// An execution process changed state.
    Process {
        /// Process root id handed out at dispatch.
        root_id: String,
        /// Raw process state, e.g. `FINISHED` or `FAILED`.
        state: String,
    },
    /// Plain wake-up: re-derive status and advance if possible.
    Wake,
}

/// Callback request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub ticket_id: u64,
    pub event: CallbackEvent,
}

/// Callback response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub ticket_id: u64,
    /// Ticket status after the scheduling pass.
    pub status: String,
}
