//! Flow, ticket and todo state machines
//!
//! - Flow states: PENDING → RUNNING → {SUCCEEDED | FAILED | TERMINATED | REVOKED},
//!   PENDING → SKIPPED, FAILED → RUNNING on retry
//! - Ticket states: derived from flow states; SUCCEEDED, TERMINATED and
//!   REVOKED are final
//! - Todo states: TODO → DOING → {DONE_SUCCESS | DONE_FAILED}

mod flow_state;
mod ticket_state;
mod todo_state;

pub use flow_state::FlowStatus;
pub use ticket_state::TicketStatus;
pub use todo_state::TodoStatus;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global sequence counter for ordering updates within one process
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the next sequence number for ordering
pub fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Keep future sequence numbers above `seen`, e.g. after loading a snapshot
/// written by another process.
pub fn observe_seq(seen: u64) {
    SEQUENCE_COUNTER.fetch_max(seen.saturating_add(1), Ordering::SeqCst);
}

/// Get current UTC timestamp
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}

/// A rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} transition from {from} to {to}")]
pub struct InvalidTransition {
    pub kind: &'static str,
    pub from: String,
    pub to: String,
}
