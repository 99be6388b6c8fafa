//! Todo state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a human todo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoStatus {
    Todo,
    /// Someone acted and the engine is working on it
    #[serde(rename = "DOING")]
    InProgress,
    DoneSuccess,
    DoneFailed,
}

impl TodoStatus {
    pub fn can_transition_to(&self, target: TodoStatus) -> bool {
        match (self, target) {
            (TodoStatus::Todo, TodoStatus::InProgress) => true,
            (TodoStatus::Todo, TodoStatus::DoneSuccess) => true,
            (TodoStatus::Todo, TodoStatus::DoneFailed) => true,

            (TodoStatus::InProgress, TodoStatus::Todo) => true,
            (TodoStatus::InProgress, TodoStatus::DoneSuccess) => true,
            (TodoStatus::InProgress, TodoStatus::DoneFailed) => true,

            // Reopened when the same wait recurs on the same node
            (TodoStatus::DoneSuccess, TodoStatus::Todo) => true,

            _ => false,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TodoStatus::DoneSuccess | TodoStatus::DoneFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Todo => "TODO",
            TodoStatus::InProgress => "DOING",
            TodoStatus::DoneSuccess => "DONE_SUCCESS",
            TodoStatus::DoneFailed => "DONE_FAILED",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_failed_is_final() {
        assert!(!TodoStatus::DoneFailed.can_transition_to(TodoStatus::Todo));
        assert!(!TodoStatus::DoneFailed.can_transition_to(TodoStatus::DoneSuccess));
    }

    #[test]
    fn test_done_success_can_reopen() {
        assert!(TodoStatus::DoneSuccess.can_transition_to(TodoStatus::Todo));
        assert!(!TodoStatus::DoneSuccess.can_transition_to(TodoStatus::DoneFailed));
    }

    #[test]
    fn test_in_progress_serializes_as_doing() {
        assert_eq!(serde_json::to_string(&TodoStatus::InProgress).unwrap(), "\"DOING\"");
        assert_eq!(TodoStatus::InProgress.to_string(), "DOING");
    }
}
