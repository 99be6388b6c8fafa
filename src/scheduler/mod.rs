//! Flow manager: the driver loop that advances tickets through their stages.
//!
//! The manager has no thread of its own. Request handlers, callbacks and the
//! reconciler call [`FlowManager::run_next_flow`], possibly at the same time
//! for the same ticket. A node is claimed with a PENDING → RUNNING
//! compare-and-set in the store before its handler runs, so only one caller
//! ever starts it.

mod callback;
mod history;
mod revoke;
mod todo;
mod view;

pub use view::{derive_ticket_status, TicketView};

use std::sync::Arc;

use crate::collab::{NotifyEvent, ProcessState, Services};
use crate::config::{EngineSettings, SettingsHandle};
use crate::error::{EngineError, StageError};
use crate::model::{FlowNode, FlowType, NewTicket, NewTodo, Ticket, TodoType};
use crate::observability::ticket_span;
use crate::stage::{FlowHooks, StageContext, StageOutcome, StageRegistry};
use crate::state::{FlowStatus, InvalidTransition, TicketStatus, TodoStatus};
use crate::store::{FlowStore, TodoEnsure};

/// Drives tickets through their flow nodes
pub struct FlowManager {
    store: FlowStore,
    settings: Arc<SettingsHandle>,
    services: Services,
    registry: StageRegistry,
    hooks: FlowHooks,
}

impl FlowManager {
    pub fn new(store: FlowStore, settings: Arc<SettingsHandle>, services: Services) -> Self {
        Self {
            store,
            settings,
            services,
            registry: StageRegistry::standard(),
            hooks: FlowHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: FlowHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(&self) -> &FlowStore {
        &self.store
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<EngineSettings> {
        self.settings.current()
    }

    pub fn settings_handle(&self) -> &Arc<SettingsHandle> {
        &self.settings
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    fn context<'a>(&'a self, settings: &'a EngineSettings) -> StageContext<'a> {
        StageContext {
            store: &self.store,
            settings,
            services: &self.services,
            hooks: &self.hooks,
        }
    }

    /// Persist a new ticket and, when `auto_start` is set, run its first node.
    pub fn submit_ticket(&self, new: NewTicket, auto_start: bool) -> Result<Ticket, EngineError> {
        let ticket = self.store.insert_ticket(new)?;
        tracing::info!(
            ticket_id = ticket.id,
            ticket_type = %ticket.ticket_type,
            flows = ticket.flows.len(),
            creator = %ticket.creator,
            "ticket created"
        );
        if auto_start {
            self.run_next_flow(ticket.id)?;
        }
        self.store.ticket(ticket.id)
    }

    /// Snapshot with derived statuses.
    pub fn view(&self, ticket_id: u64) -> Result<TicketView, EngineError> {
        let ticket = self.store.ticket(ticket_id)?;
        let todos = self.store.todos_for_ticket(ticket_id);
        TicketView::build(ticket, todos, &self.registry)
    }

    /// Last started node, or the first node when none has started.
    pub fn current_flow(&self, ticket_id: u64) -> Result<Option<FlowNode>, EngineError> {
        Ok(self.store.ticket(ticket_id)?.current_flow().cloned())
    }

    /// Advance the ticket as far as it can go without waiting.
    ///
    /// Returns the ticket status afterwards. Calling this on a terminal
    /// ticket, or while a node is still in progress, only refreshes status.
    pub fn run_next_flow(&self, ticket_id: u64) -> Result<TicketStatus, EngineError> {
        let _span = ticket_span("run_next_flow", ticket_id).entered();
        loop {
            self.sync_flows(ticket_id)?;
            let ticket = self.store.ticket(ticket_id)?;
            if ticket.is_terminal() {
                return Ok(ticket.status);
            }
            let blocked = ticket
                .flows
                .iter()
                .any(|f| f.status.is_active() || matches!(f.status, FlowStatus::Terminated | FlowStatus::Revoked));
            if blocked {
                return self.update_ticket_status(ticket_id);
            }
            let Some(next) = ticket.next_flow().cloned() else {
                return self.update_ticket_status(ticket_id);
            };

            if next.flow_type.is_human() && self.settings().skip_human_stages {
                if self
                    .store
                    .transition_flow(ticket_id, next.id, &[FlowStatus::Pending], FlowStatus::Skipped)?
                {
                    tracing::info!(ticket_id, flow_id = next.id, flow_type = %next.flow_type, "human stage skipped");
                }
                continue;
            }

            if !self.store.claim_flow(ticket_id, next.id)? {
                tracing::debug!(ticket_id, flow_id = next.id, "claim lost");
                return self.update_ticket_status(ticket_id);
            }
            tracing::info!(ticket_id, flow_id = next.id, flow_type = %next.flow_type, "flow started");
            self.update_ticket_status(ticket_id)?;

            let ticket = self.store.ticket(ticket_id)?;
            let flow = ticket
                .flow(next.id)
                .cloned()
                .ok_or(EngineError::FlowNotFound { ticket_id, flow_id: next.id })?;
            match self.run_stage(&ticket, &flow) {
                Ok(StageOutcome::Advance) => {
                    self.complete_flow(ticket_id, flow.id)?;
                }
                Ok(StageOutcome::Suspend) => return self.update_ticket_status(ticket_id),
                Err(err) => {
                    self.fail_flow(ticket_id, flow.id, err, None)?;
                    return self.update_ticket_status(ticket_id);
                }
            }
        }
    }

    fn run_stage(&self, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let settings = self.settings();
        let handler = self.registry.get(flow.flow_type)?;
        handler.run(&self.context(&settings), ticket, flow)
    }

    /// Re-derive the ticket status and persist it if it changed.
    ///
    /// Derivation and write happen under one store lock, so a status read
    /// before a concurrent retry or callback never overwrites a newer one.
    pub fn update_ticket_status(&self, ticket_id: u64) -> Result<TicketStatus, EngineError> {
        let changed = self.store.transaction(|data| {
            let ticket = data
                .tickets
                .get(&ticket_id)
                .cloned()
                .ok_or(EngineError::TicketNotFound(ticket_id))?;
            let todos = data.todos.values().filter(|t| t.ticket_id == ticket_id).cloned().collect();
            let view = TicketView::build(ticket, todos, &self.registry)?;
            let current = view.ticket.status;
            let target = match view.ticket_status() {
                Some(target) if current.can_transition_to(target) => target,
                _ => return Ok((current, None)),
            };
            let ticket = data.ticket_mut(ticket_id)?;
            ticket.status = target;
            ticket.touch();
            Ok((target, Some(current)))
        })?;
        let (target, origin) = match changed {
            (target, Some(origin)) => (target, origin),
            (current, None) => return Ok(current),
        };
        tracing::info!(ticket_id, from = %origin, to = %target, "ticket status changed");
        if target.should_notify() {
            let ticket = self.store.ticket(ticket_id)?;
            self.services
                .notifier
                .notify(&ticket, NotifyEvent::StatusChanged, &[ticket.creator.clone()]);
        }
        Ok(target)
    }

    /// Persist derived node statuses that differ from the stored ones.
    fn sync_flows(&self, ticket_id: u64) -> Result<(), EngineError> {
        let view = self.view(ticket_id)?;
        self.apply_drift(&view)
    }

    /// Write the derived statuses of `view` back to the store.
    ///
    /// Each write is conditional on the node being unchanged since the view
    /// was read; a node that moved on in the meantime keeps its new state.
    pub(crate) fn apply_drift(&self, view: &TicketView) -> Result<(), EngineError> {
        if view.ticket.is_terminal() {
            return Ok(());
        }
        let ticket_id = view.ticket.id;
        for (flow, derived) in view.drifted() {
            if flow.is_mutex_blocked() || !flow.status.can_transition_to(derived) {
                continue;
            }
            if derived == FlowStatus::Failed {
                let err = StageError::Execution(format!(
                    "process {} failed",
                    flow.flow_obj_id.as_deref().unwrap_or("-")
                ));
                self.fail_flow(ticket_id, flow.id, err, Some(flow.seq))?;
                continue;
            }
            if self.store.transition_flow_at(ticket_id, flow.id, flow.seq, derived)? {
                tracing::info!(ticket_id, flow_id = flow.id, from = %flow.status, to = %derived, "flow status synced");
                let operator = self.settings().system_operator.clone();
                self.sync_failure_todos(flow.id, derived, &operator)?;
            } else {
                tracing::debug!(ticket_id, flow_id = flow.id, "flow changed since read, sync skipped");
            }
        }
        Ok(())
    }

    /// RUNNING/FAILED → SUCCEEDED after a stage finished.
    fn complete_flow(&self, ticket_id: u64, flow_id: u64) -> Result<(), EngineError> {
        if self.store.transition_flow(
            ticket_id,
            flow_id,
            &[FlowStatus::Running, FlowStatus::Failed],
            FlowStatus::Succeeded,
        )? {
            tracing::info!(ticket_id, flow_id, "flow succeeded");
            let operator = self.settings().system_operator.clone();
            self.sync_failure_todos(flow_id, FlowStatus::Succeeded, &operator)?;
        }
        Ok(())
    }

    /// Record a stage failure on the node.
    ///
    /// Only a RUNNING or FAILED node takes the failure, and with `seen_seq`
    /// only while the node is unchanged since it was read. Returns `false`
    /// when nothing was recorded. A mutex conflict leaves the node for the
    /// reconciler. Any other error opens one execution-failed todo and
    /// notifies the creator.
    fn fail_flow(
        &self,
        ticket_id: u64,
        flow_id: u64,
        err: StageError,
        seen_seq: Option<u64>,
    ) -> Result<bool, EngineError> {
        let code = err.err_code();
        let message = err.to_string();
        let recorded = self.store.transaction(|data| {
            let flow = data.flow_mut(ticket_id, flow_id)?;
            if seen_seq.is_some_and(|seq| seq != flow.seq) {
                return Ok(false);
            }
            match flow.status {
                FlowStatus::Failed => {}
                FlowStatus::Running => flow.transition(FlowStatus::Failed)?,
                _ => return Ok(false),
            }
            // a retry that never reached the runner leaves the process failed
            if flow.obj_state.as_deref().map(ProcessState::parse) == Some(ProcessState::Created) {
                flow.obj_state = Some(ProcessState::Failed.as_str().to_string());
            }
            flow.set_error(code, message.clone());
            Ok(true)
        })?;
        if !recorded {
            tracing::debug!(ticket_id, flow_id, err_code = code.as_str(), "flow moved on, failure dropped");
            return Ok(false);
        }

        if err.is_auto_retryable() {
            tracing::info!(ticket_id, flow_id, err_code = code.as_str(), %message, "flow waiting on mutex");
            return Ok(true);
        }
        tracing::warn!(ticket_id, flow_id, err_code = code.as_str(), %message, "flow failed");

        let ticket = self.store.ticket(ticket_id)?;
        let settings = self.settings();
        let (todo, how) = self.store.ensure_todo(NewTodo {
            name: format!("{} #{} failed", ticket.ticket_type, ticket.id),
            ticket_id,
            flow_id,
            todo_type: TodoType::ExecutionFailed,
            operators: vec![ticket.creator.clone()],
            helpers: settings.administrators_of(&ticket.group),
            context: serde_json::json!({"err_code": code.as_str(), "err_msg": message}),
        })?;
        if how == TodoEnsure::Existing && todo.status != TodoStatus::Todo {
            self.store
                .update_todo(todo.id, |t| t.set_status(TodoStatus::Todo, &settings.system_operator))??;
        }
        self.services
            .notifier
            .notify(&ticket, NotifyEvent::FlowFailed, &[ticket.creator.clone()]);
        Ok(true)
    }

    /// Execution-failed todos follow their node's status.
    fn sync_failure_todos(&self, flow_id: u64, status: FlowStatus, operator: &str) -> Result<(), EngineError> {
        let target = match status {
            FlowStatus::Running => TodoStatus::InProgress,
            FlowStatus::Failed => TodoStatus::Todo,
            FlowStatus::Succeeded => TodoStatus::DoneSuccess,
            FlowStatus::Terminated | FlowStatus::Revoked => TodoStatus::DoneFailed,
            FlowStatus::Pending | FlowStatus::Skipped => return Ok(()),
        };
        self.store.transaction(|data| {
            for todo in data
                .open_todos_mut(flow_id)
                .filter(|t| t.todo_type == TodoType::ExecutionFailed)
            {
                if todo.status != target {
                    todo.set_status(target, operator)?;
                }
            }
            Ok(())
        })
    }

    /// Retry a FAILED node.
    ///
    /// Returns the node status after the retry attempt.
    pub fn retry_flow(&self, ticket_id: u64, flow_id: u64, operator: &str) -> Result<FlowStatus, EngineError> {
        let _span = ticket_span("retry_flow", ticket_id).entered();
        let ticket = self.store.ticket(ticket_id)?;
        if ticket.is_terminal() {
            return Err(InvalidTransition {
                kind: "ticket",
                from: ticket.status.to_string(),
                to: TicketStatus::Running.to_string(),
            }
            .into());
        }
        let before = ticket
            .flow(flow_id)
            .cloned()
            .ok_or(EngineError::FlowNotFound { ticket_id, flow_id })?;
        // the failed process outcome is cleared in the same write, so no
        // reader sees a RUNNING node that still derives to FAILED
        let restarted = self.store.transaction(|data| {
            let flow = data.flow_mut(ticket_id, flow_id)?;
            if flow.status != FlowStatus::Failed {
                return Ok(false);
            }
            flow.transition(FlowStatus::Running)?;
            flow.clear_error();
            if flow.obj_state.is_some() {
                flow.obj_state = Some(ProcessState::Created.as_str().to_string());
            }
            Ok(true)
        })?;
        if !restarted {
            return Err(InvalidTransition {
                kind: "flow",
                from: before.status.to_string(),
                to: FlowStatus::Running.to_string(),
            }
            .into());
        }
        self.sync_failure_todos(flow_id, FlowStatus::Running, operator)?;
        tracing::info!(ticket_id, flow_id, operator, "flow retry");
        self.update_ticket_status(ticket_id)?;
        self.resume_flow(ticket_id, &before)
    }

    /// Complete a RUNNING timer node and advance the ticket.
    pub fn fire_timer(&self, ticket_id: u64, flow_id: u64) -> Result<TicketStatus, EngineError> {
        let _span = ticket_span("fire_timer", ticket_id).entered();
        let ticket = self.store.ticket(ticket_id)?;
        let flow = ticket
            .flow(flow_id)
            .ok_or(EngineError::FlowNotFound { ticket_id, flow_id })?;
        if flow.flow_type != FlowType::Timer {
            return Err(EngineError::InvalidRequest(format!("flow {} is not a timer", flow_id)));
        }
        if self
            .store
            .transition_flow(ticket_id, flow_id, &[FlowStatus::Running], FlowStatus::Succeeded)?
        {
            tracing::info!(ticket_id, flow_id, "timer fired");
        }
        self.run_next_flow(ticket_id)
    }

    /// Run a handler's retry path for a node that is RUNNING again.
    fn resume_flow(&self, ticket_id: u64, before: &FlowNode) -> Result<FlowStatus, EngineError> {
        let ticket = self.store.ticket(ticket_id)?;
        let settings = self.settings();
        let outcome = self
            .registry
            .get(before.flow_type)
            .map_err(StageError::from)
            .and_then(|handler| handler.retry(&self.context(&settings), &ticket, before));
        match outcome {
            Ok(StageOutcome::Advance) => {
                self.complete_flow(ticket_id, before.id)?;
                self.run_next_flow(ticket_id)?;
            }
            Ok(StageOutcome::Suspend) => {
                self.update_ticket_status(ticket_id)?;
            }
            Err(err) => {
                self.fail_flow(ticket_id, before.id, err, None)?;
                self.update_ticket_status(ticket_id)?;
            }
        }
        let ticket = self.store.ticket(ticket_id)?;
        ticket
            .flow(before.id)
            .map(|f| f.status)
            .ok_or(EngineError::FlowNotFound {
                ticket_id,
                flow_id: before.id,
            })
    }

    /// Move an in-progress node to TERMINATED.
    fn terminate_flow(&self, ticket_id: u64, flow_id: u64, operator: &str) -> Result<(), EngineError> {
        let terminated = self.store.transaction(|data| {
            let flow = data.flow_mut(ticket_id, flow_id)?;
            if !flow.status.is_active() {
                return Ok(false);
            }
            flow.transition(FlowStatus::Terminated)?;
            for todo in data.open_todos_mut(flow_id) {
                todo.set_status(TodoStatus::DoneFailed, operator)?;
            }
            Ok(true)
        })?;
        if terminated {
            tracing::info!(ticket_id, flow_id, operator, "flow terminated");
        }
        Ok(())
    }
}

/// Flow types whose nodes wait on an external process handle.
pub(crate) fn waits_on_process(flow_type: FlowType) -> bool {
    flow_type.is_inner() || flow_type == FlowType::HostRecycle
}
