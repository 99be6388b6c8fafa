//! Flow node state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TerminalState;

/// Status of one flow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    /// Not started yet
    Pending,
    /// Started; may be waiting on a human or an external process
    Running,
    Succeeded,
    /// Failed; may be retried
    Failed,
    /// Bypassed by configuration
    Skipped,
    /// Stopped by a human decision
    Terminated,
    /// Revoked by a user or the system
    Revoked,
}

impl TerminalState for FlowStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Succeeded | FlowStatus::Skipped | FlowStatus::Terminated | FlowStatus::Revoked
        )
    }
}

impl FlowStatus {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: FlowStatus) -> bool {
        match (self, target) {
            // From PENDING
            (FlowStatus::Pending, FlowStatus::Running) => true,
            (FlowStatus::Pending, FlowStatus::Skipped) => true,
            (FlowStatus::Pending, FlowStatus::Revoked) => true,

            // From RUNNING
            (FlowStatus::Running, FlowStatus::Succeeded) => true,
            (FlowStatus::Running, FlowStatus::Failed) => true,
            (FlowStatus::Running, FlowStatus::Terminated) => true,
            (FlowStatus::Running, FlowStatus::Revoked) => true,

            // From FAILED
            (FlowStatus::Failed, FlowStatus::Running) => true, // retry
            (FlowStatus::Failed, FlowStatus::Succeeded) => true, // retried inside the external engine
            (FlowStatus::Failed, FlowStatus::Terminated) => true,
            (FlowStatus::Failed, FlowStatus::Revoked) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }

    /// Succeeded or skipped; the next node may start.
    pub fn is_finished(&self) -> bool {
        matches!(self, FlowStatus::Succeeded | FlowStatus::Skipped)
    }

    /// Started and not yet terminal.
    pub fn is_active(&self) -> bool {
        matches!(self, FlowStatus::Running | FlowStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Pending => "PENDING",
            FlowStatus::Running => "RUNNING",
            FlowStatus::Succeeded => "SUCCEEDED",
            FlowStatus::Failed => "FAILED",
            FlowStatus::Skipped => "SKIPPED",
            FlowStatus::Terminated => "TERMINATED",
            FlowStatus::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        assert!(FlowStatus::Pending.can_transition_to(FlowStatus::Running));
        assert!(FlowStatus::Pending.can_transition_to(FlowStatus::Skipped));
        assert!(FlowStatus::Pending.can_transition_to(FlowStatus::Revoked));
        assert!(!FlowStatus::Pending.can_transition_to(FlowStatus::Succeeded));
        assert!(!FlowStatus::Pending.can_transition_to(FlowStatus::Failed));
    }

    #[test]
    fn test_failed_is_retryable() {
        assert!(!FlowStatus::Failed.is_terminal());
        assert!(FlowStatus::Failed.can_transition_to(FlowStatus::Running));
        assert!(FlowStatus::Failed.is_active());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for status in [
            FlowStatus::Succeeded,
            FlowStatus::Skipped,
            FlowStatus::Terminated,
            FlowStatus::Revoked,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(FlowStatus::Running));
            assert!(!status.can_transition_to(FlowStatus::Pending));
        }
    }

    #[test]
    fn test_finished() {
        assert!(FlowStatus::Succeeded.is_finished());
        assert!(FlowStatus::Skipped.is_finished());
        assert!(!FlowStatus::Terminated.is_finished());
        assert!(!FlowStatus::Running.is_finished());
    }

    #[test]
    fn test_serialization_matches_display() {
        let json = serde_json::to_string(&FlowStatus::Terminated).unwrap();
        assert_eq!(json, format!("\"{}\"", FlowStatus::Terminated));
    }
}
