//! Shared test harness for the integration suites
//!
//! Provides:
//! - an engine wired to simulated collaborators
//! - ticket builders for the common stage layouts
//! - shortcuts for process and approval callbacks

#![allow(dead_code)]

use dbm_ticket_flow::collab::ProcessState;
use dbm_ticket_flow::config::{EngineSettings, SettingsHandle};
use dbm_ticket_flow::mock::{MockResourcePool, MockServices};
use dbm_ticket_flow::model::{FlowType, NewFlow, NewTicket, Ticket, Todo, TodoType};
use dbm_ticket_flow::state::TicketStatus;
use dbm_ticket_flow::{FlowManager, FlowStore};
use flow_exclusive::ExclusivityMatrix;
use flow_protocol::ops::CallbackEvent;
use serde_json::{json, Value};
use std::sync::Arc;

/// Engine plus handles on its simulated collaborators
pub struct Harness {
    pub manager: FlowManager,
    pub mocks: MockServices,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(settings(), MockServices::new())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::build(settings, MockServices::new())
    }

    pub fn with_pool(pool: MockResourcePool) -> Self {
        Self::build(settings(), MockServices::new().with_resource(pool))
    }

    pub fn with_matrix(matrix: ExclusivityMatrix) -> Self {
        let mut settings = settings();
        settings.exclusive.matrix = matrix;
        Self::with_settings(settings)
    }

    /// Engine over an existing store, e.g. one loaded from a snapshot
    pub fn on_store(store: FlowStore) -> Self {
        let mocks = MockServices::new();
        let manager = FlowManager::new(store, Arc::new(SettingsHandle::fixed(settings())), mocks.services());
        Self { manager, mocks }
    }

    pub fn build(settings: EngineSettings, mocks: MockServices) -> Self {
        let manager = FlowManager::new(
            FlowStore::new(),
            Arc::new(SettingsHandle::fixed(settings)),
            mocks.services(),
        );
        Self { manager, mocks }
    }

    pub fn submit(&self, new: NewTicket) -> Ticket {
        self.manager.submit_ticket(new, true).expect("submit ticket")
    }

    pub fn ticket(&self, ticket_id: u64) -> Ticket {
        self.manager.store().ticket(ticket_id).expect("ticket exists")
    }

    pub fn status(&self, ticket_id: u64) -> TicketStatus {
        self.ticket(ticket_id).status
    }

    pub fn todos(&self, ticket_id: u64, todo_type: TodoType) -> Vec<Todo> {
        self.manager
            .store()
            .todos_for_ticket(ticket_id)
            .into_iter()
            .filter(|t| t.todo_type == todo_type)
            .collect()
    }

    /// Report the process of the ticket's running execution node.
    pub fn finish_process(&self, ticket_id: u64, state: ProcessState) -> TicketStatus {
        let ticket = self.ticket(ticket_id);
        let root_id = ticket
            .flows
            .iter()
            .find(|f| f.flow_type.is_inner() && f.status.is_active())
            .and_then(|f| f.flow_obj_id.clone())
            .expect("running execution node");
        self.mocks.runner.set_state(&root_id, state);
        self.manager
            .handle_callback(
                ticket_id,
                &CallbackEvent::Process {
                    root_id,
                    state: state.as_str().to_string(),
                },
            )
            .expect("process callback")
    }

    /// Resolve the ticket's open approval.
    pub fn decide_approval(&self, ticket_id: u64, approved: bool) -> TicketStatus {
        let sn = self
            .mocks
            .approval
            .sns_for(ticket_id)
            .pop()
            .expect("approval opened");
        self.manager
            .handle_callback(
                ticket_id,
                &CallbackEvent::Approval {
                    sn,
                    approved,
                    operator: "approver".to_string(),
                },
            )
            .expect("approval callback")
    }
}

/// Built-in settings with a mysql administrator group
pub fn settings() -> EngineSettings {
    let mut settings = EngineSettings::builtin().expect("builtin settings");
    settings
        .administrators
        .insert("mysql".to_string(), vec!["dba-1".to_string(), "dba-2".to_string()]);
    settings
}

/// Ticket of `ticket_type` on one cluster, with the given stages
pub fn ticket(ticket_type: &str, cluster_id: u64, flows: Vec<NewFlow>) -> NewTicket {
    flows.into_iter().fold(
        NewTicket::new(ticket_type, "alice", json!({"cluster_id": cluster_id}))
            .with_group("mysql")
            .with_biz(3),
        NewTicket::flow,
    )
}

pub fn inner(controller: &str) -> NewFlow {
    NewFlow::new(FlowType::InnerFlow, json!({"controller": controller}))
}

pub fn approval() -> NewFlow {
    NewFlow::new(FlowType::Approval, json!({}))
}

pub fn pause() -> NewFlow {
    NewFlow::new(FlowType::Pause, json!({}))
}

pub fn delivery() -> NewFlow {
    NewFlow::new(FlowType::Delivery, json!({}))
}

/// Resource apply asking for `count` hosts of `spec_id` for one role
pub fn resource_apply(role: &str, spec_id: u64, count: u64) -> NewFlow {
    NewFlow::new(
        FlowType::ResourceApply,
        json!({
            "bk_cloud_id": 0,
            "resource_spec": {role: {"spec_id": spec_id, "count": count}},
        }),
    )
}

/// Payload value at a JSON pointer, or null
pub fn at<'a>(value: &'a Value, pointer: &str) -> &'a Value {
    value.pointer(pointer).unwrap_or(&Value::Null)
}
