//! Todos: human actionable items bound to a flow node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::state::{next_seq, now_utc, InvalidTransition, TodoStatus};

/// Kind of human work a todo asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoType {
    /// Approval decision, forwarded to the approval system
    Approve,
    ManualConfirm,
    /// Replenish the resource pool, then resume procurement
    ResourceReplenish,
    /// Investigate a failed node, then retry or terminate
    ExecutionFailed,
}

impl TodoType {
    /// Actions a human may take on a todo of this type.
    pub fn allowed_actions(&self) -> &'static [TodoAction] {
        match self {
            TodoType::Approve => &[TodoAction::Approve, TodoAction::Terminate],
            TodoType::ManualConfirm => &[TodoAction::Approve, TodoAction::Terminate],
            TodoType::ResourceReplenish => &[TodoAction::Resume, TodoAction::Terminate],
            TodoType::ExecutionFailed => &[TodoAction::Retry, TodoAction::Terminate],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoType::Approve => "APPROVE",
            TodoType::ManualConfirm => "MANUAL_CONFIRM",
            TodoType::ResourceReplenish => "RESOURCE_REPLENISH",
            TodoType::ExecutionFailed => "EXECUTION_FAILED",
        }
    }
}

impl fmt::Display for TodoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action taken by a human on a todo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoAction {
    Approve,
    Terminate,
    Resume,
    Retry,
}

impl TodoAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoAction::Approve => "APPROVE",
            TodoAction::Terminate => "TERMINATE",
            TodoAction::Resume => "RESUME",
            TodoAction::Retry => "RETRY",
        }
    }
}

impl FromStr for TodoAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "APPROVE" => Ok(TodoAction::Approve),
            "TERMINATE" => Ok(TodoAction::Terminate),
            "RESUME" => Ok(TodoAction::Resume),
            "RETRY" => Ok(TodoAction::Retry),
            other => Err(format!("unknown todo action '{}'", other)),
        }
    }
}

/// One entry of a todo's action history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoHistory {
    pub action: TodoAction,
    pub operator: String,
    #[serde(default)]
    pub params: Value,
    pub at: DateTime<Utc>,
}

/// Todo definition produced by a stage handler.
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub name: String,
    pub ticket_id: u64,
    pub flow_id: u64,
    pub todo_type: TodoType,
    pub operators: Vec<String>,
    pub helpers: Vec<String>,
    pub context: Value,
}

/// Human actionable item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub name: String,
    pub ticket_id: u64,
    pub flow_id: u64,
    pub todo_type: TodoType,
    pub status: TodoStatus,
    pub operators: Vec<String>,
    #[serde(default)]
    pub helpers: Vec<String>,
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<TodoHistory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seq: u64,
}

impl Todo {
    pub(crate) fn from_new(id: u64, new: NewTodo) -> Self {
        let now = now_utc();
        Self {
            id,
            name: new.name,
            ticket_id: new.ticket_id,
            flow_id: new.flow_id,
            todo_type: new.todo_type,
            status: TodoStatus::Todo,
            operators: new.operators,
            helpers: new.helpers,
            context: new.context,
            done_by: None,
            done_at: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            seq: next_seq(),
        }
    }

    /// Move to a new status; done statuses record who and when.
    pub fn set_status(&mut self, status: TodoStatus, operator: &str) -> Result<(), InvalidTransition> {
        if self.status == status {
            return Ok(());
        }
        if !self.status.can_transition_to(status) {
            return Err(InvalidTransition {
                kind: "todo",
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        if status.is_done() {
            self.done_by = Some(operator.to_string());
            self.done_at = Some(now_utc());
        } else {
            self.done_by = None;
            self.done_at = None;
        }
        self.touch();
        Ok(())
    }

    pub fn record(&mut self, action: TodoAction, operator: &str, params: Value) {
        self.history.push(TodoHistory {
            action,
            operator: operator.to_string(),
            params,
            at: now_utc(),
        });
        self.touch();
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    /// Whether `operator` may act on this todo.
    pub fn is_operator(&self, operator: &str) -> bool {
        self.operators.is_empty()
            || self.operators.iter().any(|o| o == operator)
            || self.helpers.iter().any(|h| h == operator)
    }

    fn touch(&mut self) {
        self.updated_at = now_utc();
        self.seq = next_seq();
    }
}
