//! Ticket state machine
//!
//! The ticket status is never set directly by callers; the scheduler derives
//! it from the statuses of the ticket's flow nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TerminalState;

/// Overall status of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Created, no node started
    Pending,
    Running,
    /// An approval node is waiting on the approval system
    AwaitingApproval,
    /// A pause node is waiting on a human
    AwaitingConfirm,
    /// Procurement is waiting on capacity
    AwaitingResources,
    /// A node failed; retry or revoke
    Failed,
    Succeeded,
    Terminated,
    Revoked,
}

impl TerminalState for TicketStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Succeeded | TicketStatus::Terminated | TicketStatus::Revoked
        )
    }
}

impl TicketStatus {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: TicketStatus) -> bool {
        match (self, target) {
            (from, to) if from.is_terminal() || *from == to => false,
            (_, TicketStatus::Pending) => false,
            _ => true,
        }
    }

    /// Whether a change into this status is announced to the ticket's people.
    pub fn should_notify(&self) -> bool {
        !matches!(self, TicketStatus::Running | TicketStatus::AwaitingResources)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Running => "RUNNING",
            TicketStatus::AwaitingApproval => "AWAITING_APPROVAL",
            TicketStatus::AwaitingConfirm => "AWAITING_CONFIRM",
            TicketStatus::AwaitingResources => "AWAITING_RESOURCES",
            TicketStatus::Failed => "FAILED",
            TicketStatus::Succeeded => "SUCCEEDED",
            TicketStatus::Terminated => "TERMINATED",
            TicketStatus::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
