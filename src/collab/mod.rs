//! Contracts for the external systems the engine drives.
//!
//! The engine never talks to a resource pool, execution engine, approval
//! system or notification channel directly; it goes through these traits.

mod resource;

pub use resource::{ApplyGroup, ApplyRequest, ApplyResponse, HostAssignment};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::model::Ticket;

/// Errors reported by collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    /// The resource pool cannot satisfy the request right now
    #[error("insufficient resources: {0}")]
    Insufficient(String),

    #[error("{service} error {code}: {message}")]
    Service {
        service: &'static str,
        code: i64,
        message: String,
    },

    #[error("{0} unavailable")]
    Unavailable(String),
}

/// Resource pool
pub trait ResourceService: Send + Sync {
    /// Pre-apply hosts. Repeating a request with the same idempotency key
    /// returns the same assignment.
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyResponse, CollabError>;

    /// Confirm that procured hosts were put to use.
    fn confirm(&self, request_id: &str, host_ids: &[u64]) -> Result<(), CollabError>;

    /// Return hosts to the pool.
    fn reimport(&self, bk_biz_id: u64, host_ids: &[u64], operator: &str) -> Result<(), CollabError>;
}

/// State of an execution process as reported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Created,
    Running,
    Finished,
    Failed,
    Revoked,
}

impl ProcessState {
    /// Parse a raw state string; unknown states read as running.
    pub fn parse(raw: &str) -> ProcessState {
        match raw.to_ascii_uppercase().as_str() {
            "CREATED" | "READY" => ProcessState::Created,
            "FINISHED" | "SUCCEEDED" => ProcessState::Finished,
            "FAILED" => ProcessState::Failed,
            "REVOKED" => ProcessState::Revoked,
            _ => ProcessState::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Created => "CREATED",
            ProcessState::Running => "RUNNING",
            ProcessState::Finished => "FINISHED",
            ProcessState::Failed => "FAILED",
            ProcessState::Revoked => "REVOKED",
        }
    }
}

/// Execution engine that runs automated operations
pub trait ExecutionRunner: Send + Sync {
    /// Start a process under `root_id` and return its handle.
    fn dispatch(&self, controller: &str, payload: &Value, root_id: &str) -> Result<String, CollabError>;

    fn status(&self, handle: &str) -> Result<ProcessState, CollabError>;

    /// Retry the failed part of a process.
    fn retry(&self, handle: &str) -> Result<(), CollabError>;

    /// Best-effort cancel.
    fn revoke(&self, handle: &str) -> Result<(), CollabError>;
}

/// External approval system
pub trait ApprovalService: Send + Sync {
    /// Open an approval ticket; the system calls back on `callback_url`.
    fn create(&self, ticket: &Ticket, payload: &Value, callback_url: &str) -> Result<String, CollabError>;

    /// Record a decision made through the engine.
    fn decide(&self, sn: &str, approved: bool, operator: &str) -> Result<(), CollabError>;

    /// Withdraw an open approval ticket.
    fn withdraw(&self, sn: &str, operator: &str) -> Result<(), CollabError>;
}

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyEvent {
    StatusChanged,
    TodoCreated,
    FlowFailed,
}

/// Fire-and-forget notification channel
pub trait Notifier: Send + Sync {
    fn notify(&self, ticket: &Ticket, event: NotifyEvent, receivers: &[String]);
}

/// The collaborators a running engine is wired to
#[derive(Clone)]
pub struct Services {
    pub resource: Arc<dyn ResourceService>,
    pub runner: Arc<dyn ExecutionRunner>,
    pub approval: Arc<dyn ApprovalService>,
    pub notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
