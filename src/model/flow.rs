//! Flow nodes: one stage of a ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::state::{next_seq, now_utc, FlowStatus, InvalidTransition, TerminalState, TicketStatus};

/// Stage type tag. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowType {
    /// External approval ticket
    Approval,
    /// Human confirmation
    Pause,
    ResourceApply,
    ResourceBatchApply,
    /// Automated execution in the external engine
    InnerFlow,
    /// Execution that advances as soon as it is dispatched
    QuickInnerFlow,
    /// Execution whose failure counts as success
    IgnoreResultInnerFlow,
    Delivery,
    /// Delivery that confirms procured hosts first
    ResourceDelivery,
    /// Delivery for hosts procured by a batch apply
    ResourceBatchDelivery,
    /// Lists the processes the ticket ran, then advances
    DescribeTask,
    /// Waits until `details.trigger_time`
    Timer,
    HostRecycle,
    ResourceReimport,
}

/// Every flow type, in declaration order.
pub const ALL_FLOW_TYPES: &[FlowType] = &[
    FlowType::Approval,
    FlowType::Pause,
    FlowType::ResourceApply,
    FlowType::ResourceBatchApply,
    FlowType::InnerFlow,
    FlowType::QuickInnerFlow,
    FlowType::IgnoreResultInnerFlow,
    FlowType::Delivery,
    FlowType::ResourceDelivery,
    FlowType::ResourceBatchDelivery,
    FlowType::DescribeTask,
    FlowType::Timer,
    FlowType::HostRecycle,
    FlowType::ResourceReimport,
];

impl FlowType {
    /// Execution-type nodes; these count toward cluster exclusivity.
    pub fn is_inner(&self) -> bool {
        matches!(
            self,
            FlowType::InnerFlow | FlowType::QuickInnerFlow | FlowType::IgnoreResultInnerFlow
        )
    }

    /// Nodes skipped when human stages are disabled.
    pub fn is_human(&self) -> bool {
        matches!(self, FlowType::Approval | FlowType::Pause)
    }

    pub fn is_resource_apply(&self) -> bool {
        matches!(self, FlowType::ResourceApply | FlowType::ResourceBatchApply)
    }

    /// Ticket status shown while a node of this type is running.
    pub fn running_ticket_status(&self) -> TicketStatus {
        match self {
            FlowType::Approval => TicketStatus::AwaitingApproval,
            FlowType::Pause => TicketStatus::AwaitingConfirm,
            FlowType::ResourceApply | FlowType::ResourceBatchApply => TicketStatus::AwaitingResources,
            _ => TicketStatus::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Approval => "APPROVAL",
            FlowType::Pause => "PAUSE",
            FlowType::ResourceApply => "RESOURCE_APPLY",
            FlowType::ResourceBatchApply => "RESOURCE_BATCH_APPLY",
            FlowType::InnerFlow => "INNER_FLOW",
            FlowType::QuickInnerFlow => "QUICK_INNER_FLOW",
            FlowType::IgnoreResultInnerFlow => "IGNORE_RESULT_INNER_FLOW",
            FlowType::Delivery => "DELIVERY",
            FlowType::ResourceDelivery => "RESOURCE_DELIVERY",
            FlowType::ResourceBatchDelivery => "RESOURCE_BATCH_DELIVERY",
            FlowType::DescribeTask => "DESCRIBE_TASK",
            FlowType::Timer => "TIMER",
            FlowType::HostRecycle => "HOST_RECYCLE",
            FlowType::ResourceReimport => "RESOURCE_REIMPORT",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown flow type '{0}'")]
pub struct UnknownFlowType(pub String);

impl FromStr for FlowType {
    type Err = UnknownFlowType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_FLOW_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownFlowType(s.to_string()))
    }
}

/// Why a node failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowErrCode {
    GenericExecutionFailure,
    /// Blocked by a conflicting operation on the same cluster
    AutoExclusiveError,
    CapacityInsufficient,
    SystemRevoked,
    UserRevoked,
}

impl FlowErrCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowErrCode::GenericExecutionFailure => "GENERIC_EXECUTION_FAILURE",
            FlowErrCode::AutoExclusiveError => "AUTO_EXCLUSIVE_ERROR",
            FlowErrCode::CapacityInsufficient => "CAPACITY_INSUFFICIENT",
            FlowErrCode::SystemRevoked => "SYSTEM_REVOKED",
            FlowErrCode::UserRevoked => "USER_REVOKED",
        }
    }
}

/// Retry policy of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryType {
    #[default]
    Manual,
    /// Retried by the reconciler while blocked on a mutex
    AutoOnMutex,
}

impl FromStr for RetryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(RetryType::Manual),
            "AUTO_ON_MUTEX" => Ok(RetryType::AutoOnMutex),
            other => Err(format!("unknown retry type '{}'", other)),
        }
    }
}

/// Node definition supplied by a ticket builder.
#[derive(Debug, Clone)]
pub struct NewFlow {
    pub flow_type: FlowType,
    pub alias: String,
    pub details: Value,
    pub retry_type: RetryType,
}

impl NewFlow {
    pub fn new(flow_type: FlowType, details: Value) -> Self {
        Self {
            flow_type,
            alias: flow_type.as_str().to_lowercase(),
            details,
            retry_type: RetryType::default(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_retry_type(mut self, retry_type: RetryType) -> Self {
        self.retry_type = retry_type;
        self
    }
}

/// One stage of a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: u64,
    pub ticket_id: u64,
    /// Position within the ticket; execution order
    pub position: usize,
    pub flow_type: FlowType,
    pub alias: String,
    pub status: FlowStatus,
    /// Stage payload; handlers read and extend it
    pub details: Value,
    /// Handle of the external process (approval sn, execution root id, apply request key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_obj_id: Option<String>,
    /// Last state reported by the external process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj_state: Option<String>,
    /// Approval decision, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_code: Option<FlowErrCode>,
    #[serde(default)]
    pub retry_type: RetryType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic sequence counter for ordering
    pub seq: u64,
}

impl FlowNode {
    pub(crate) fn from_new(id: u64, ticket_id: u64, position: usize, new: NewFlow) -> Self {
        let now = now_utc();
        Self {
            id,
            ticket_id,
            position,
            flow_type: new.flow_type,
            alias: new.alias,
            status: FlowStatus::Pending,
            details: new.details,
            flow_obj_id: None,
            obj_state: None,
            approved: None,
            err_msg: None,
            err_code: None,
            retry_type: new.retry_type,
            created_at: now,
            updated_at: now,
            seq: next_seq(),
        }
    }

    /// Transition to a new status
    pub fn transition(&mut self, new_status: FlowStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                kind: "flow",
                from: self.status.to_string(),
                to: new_status.to_string(),
            });
        }

        self.status = new_status;
        self.touch();
        Ok(())
    }

    /// Record a failure cause.
    pub fn set_error(&mut self, code: FlowErrCode, message: impl Into<String>) {
        self.err_code = Some(code);
        self.err_msg = Some(message.into());
        self.retry_type = match code {
            FlowErrCode::AutoExclusiveError => RetryType::AutoOnMutex,
            _ => RetryType::Manual,
        };
        self.touch();
    }

    pub fn clear_error(&mut self) {
        self.err_code = None;
        self.err_msg = None;
        self.touch();
    }

    /// Merge keys into the payload; a non-object payload is replaced.
    pub fn update_details(&mut self, patch: serde_json::Map<String, Value>) {
        match &mut self.details {
            Value::Object(map) => map.extend(patch),
            other => *other = Value::Object(patch),
        }
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Blocked by a conflicting operation and waiting for the reconciler.
    pub fn is_mutex_blocked(&self) -> bool {
        self.status == FlowStatus::Failed && self.err_code == Some(FlowErrCode::AutoExclusiveError)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_utc();
        self.seq = next_seq();
    }
}
