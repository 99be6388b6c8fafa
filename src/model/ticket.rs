//! Tickets: the aggregate root owning an ordered list of flow nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use super::flow::{FlowNode, NewFlow};
use crate::state::{next_seq, now_utc, FlowStatus, TerminalState, TicketStatus};

/// Ticket type tag, e.g. `MYSQL_HA_APPLY`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketType(pub String);

impl TicketType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ticket definition supplied by a ticket builder.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_type: TicketType,
    pub bk_biz_id: u64,
    pub group: String,
    pub creator: String,
    pub remark: String,
    pub details: Value,
    pub flows: Vec<NewFlow>,
}

impl NewTicket {
    pub fn new(ticket_type: impl Into<TicketType>, creator: impl Into<String>, details: Value) -> Self {
        Self {
            ticket_type: ticket_type.into(),
            bk_biz_id: 0,
            group: String::new(),
            creator: creator.into(),
            remark: String::new(),
            details,
            flows: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_biz(mut self, bk_biz_id: u64) -> Self {
        self.bk_biz_id = bk_biz_id;
        self
    }

    pub fn flow(mut self, flow: NewFlow) -> Self {
        self.flows.push(flow);
        self
    }
}

/// A requested change flowing through its stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub ticket_type: TicketType,
    pub bk_biz_id: u64,
    /// DB group (mysql, redis, ...)
    pub group: String,
    pub creator: String,
    #[serde(default)]
    pub remark: String,
    pub status: TicketStatus,
    /// Shared details; handlers add artifacts such as procured nodes
    pub details: Value,
    #[serde(default)]
    pub is_reviewed: bool,
    /// Ordered flow nodes; insertion order is execution order
    pub flows: Vec<FlowNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seq: u64,
}

impl Ticket {
    pub(crate) fn from_new(id: u64, new: NewTicket, flows: Vec<FlowNode>) -> Self {
        let now = now_utc();
        Self {
            id,
            ticket_type: new.ticket_type,
            bk_biz_id: new.bk_biz_id,
            group: new.group,
            creator: new.creator,
            remark: new.remark,
            status: TicketStatus::Pending,
            details: new.details,
            is_reviewed: false,
            flows,
            created_at: now,
            updated_at: now,
            seq: next_seq(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn flow(&self, flow_id: u64) -> Option<&FlowNode> {
        self.flows.iter().find(|f| f.id == flow_id)
    }

    pub fn flow_mut(&mut self, flow_id: u64) -> Option<&mut FlowNode> {
        self.flows.iter_mut().find(|f| f.id == flow_id)
    }

    /// Flow following `flow_id` in execution order.
    pub fn flow_after(&self, flow_id: u64) -> Option<&FlowNode> {
        let pos = self.flows.iter().position(|f| f.id == flow_id)?;
        self.flows.get(pos + 1)
    }

    /// Flow whose external handle is `obj_id`.
    pub fn flow_by_obj_id(&self, obj_id: &str) -> Option<&FlowNode> {
        self.flows.iter().find(|f| f.flow_obj_id.as_deref() == Some(obj_id))
    }

    /// First node not yet started.
    pub fn next_flow(&self) -> Option<&FlowNode> {
        self.flows.iter().find(|f| f.status == FlowStatus::Pending)
    }

    /// Last started node, or the first node when none has started.
    pub fn current_flow(&self) -> Option<&FlowNode> {
        self.flows
            .iter()
            .rev()
            .find(|f| f.status != FlowStatus::Pending)
            .or_else(|| self.flows.first())
    }

    /// First node that is neither succeeded nor skipped.
    pub fn first_unfinished(&self) -> Option<&FlowNode> {
        self.flows.iter().find(|f| !f.status.is_finished())
    }

    /// Cluster ids named by the ticket details.
    ///
    /// Reads `cluster_id`, `cluster_ids` and the same keys inside each
    /// element of `infos`.
    pub fn cluster_ids(&self) -> BTreeSet<u64> {
        collect_ids(&self.details, "cluster_id", "cluster_ids")
    }

    /// Instance ids named by the ticket details.
    pub fn instance_ids(&self) -> BTreeSet<u64> {
        collect_ids(&self.details, "instance_id", "instance_ids")
    }

    /// Merge keys into the details; a non-object value is replaced.
    pub fn update_details(&mut self, patch: serde_json::Map<String, Value>) {
        match &mut self.details {
            Value::Object(map) => map.extend(patch),
            other => *other = Value::Object(patch),
        }
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_utc();
        self.seq = next_seq();
    }
}

fn collect_ids(details: &Value, single: &str, multi: &str) -> BTreeSet<u64> {
    let mut ids = BTreeSet::new();
    let mut scan = |v: &Value| {
        if let Some(id) = v.get(single).and_then(Value::as_u64) {
            ids.insert(id);
        }
        if let Some(list) = v.get(multi).and_then(Value::as_array) {
            ids.extend(list.iter().filter_map(Value::as_u64));
        }
    };
    scan(details);
    if let Some(infos) = details.get("infos").and_then(Value::as_array) {
        infos.iter().for_each(&mut scan);
    }
    ids
}
