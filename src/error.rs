//! Engine and stage error types

use crate::collab::CollabError;
use crate::config::ConfigError;
use crate::exclusive::Conflict;
use crate::model::{FlowErrCode, FlowType, TodoAction};
use crate::state::InvalidTransition;
use crate::store::SnapshotError;

/// Errors surfaced by engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("ticket {0} not found")]
    TicketNotFound(u64),

    #[error("flow {flow_id} not found on ticket {ticket_id}")]
    FlowNotFound { ticket_id: u64, flow_id: u64 },

    #[error("todo {0} not found")]
    TodoNotFound(u64),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("no stage handler registered for {0}")]
    UnsupportedFlowType(FlowType),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("todo {todo_id} does not accept {action:?}")]
    ActionNotAllowed { todo_id: u64, action: TodoAction },

    #[error("todo {0} is already done")]
    TodoDone(u64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Collab(#[from] CollabError),
}

/// Errors raised while a stage handler runs.
///
/// The scheduler turns these into node status plus error code.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{}", describe_conflicts(.0))]
    MutexConflict(Vec<Conflict>),

    #[error("insufficient capacity: {0}")]
    CapacityInsufficient(String),

    #[error("{0}")]
    Execution(String),

    #[error("misconfigured stage: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl StageError {
    /// Error code recorded on the failed node.
    pub fn err_code(&self) -> FlowErrCode {
        match self {
            StageError::MutexConflict(_) => FlowErrCode::AutoExclusiveError,
            StageError::CapacityInsufficient(_) => FlowErrCode::CapacityInsufficient,
            StageError::Collab(CollabError::Insufficient(_)) => FlowErrCode::CapacityInsufficient,
            _ => FlowErrCode::GenericExecutionFailure,
        }
    }

    /// Retried by the reconciler without a human.
    pub fn is_auto_retryable(&self) -> bool {
        matches!(self, StageError::MutexConflict(_))
    }
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    let parts: Vec<String> = conflicts
        .iter()
        .map(|c| format!("cluster {} is busy with ticket {} ({})", c.cluster_id, c.ticket_id, c.ticket_type))
        .collect();
    format!("mutex conflict: {}", parts.join("; "))
}
