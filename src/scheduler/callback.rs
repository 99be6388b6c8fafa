//! Inbound callbacks from the approval system and the execution engine.

use flow_protocol::ops::CallbackEvent;

use super::{waits_on_process, FlowManager};
use crate::collab::ProcessState;
use crate::error::EngineError;
use crate::model::{FlowType, TodoType};
use crate::observability::ticket_span;
use crate::state::{TicketStatus, TodoStatus};

impl FlowManager {
    /// Record an external event on the ticket and re-enter the scheduler.
    pub fn handle_callback(&self, ticket_id: u64, event: &CallbackEvent) -> Result<TicketStatus, EngineError> {
        let _span = ticket_span("callback", ticket_id).entered();
        let ticket = self.store.ticket(ticket_id)?;
        if ticket.is_terminal() {
            tracing::debug!(ticket_id, status = %ticket.status, "callback on closed ticket ignored");
            return Ok(ticket.status);
        }

        match event {
            CallbackEvent::Approval { sn, approved, operator } => {
                let flow = ticket
                    .flow_by_obj_id(sn)
                    .filter(|f| f.flow_type == FlowType::Approval)
                    .ok_or_else(|| {
                        EngineError::InvalidRequest(format!("no approval {} on ticket {}", sn, ticket_id))
                    })?;
                let settings = self.settings();
                let operator = if operator.is_empty() {
                    settings.system_operator.as_str()
                } else {
                    operator.as_str()
                };
                let todo_status = if *approved {
                    TodoStatus::DoneSuccess
                } else {
                    TodoStatus::DoneFailed
                };
                let (flow_id, approved) = (flow.id, *approved);
                self.store.transaction(|data| {
                    data.flow_mut(ticket_id, flow_id)?.approved = Some(approved);
                    for todo in data
                        .open_todos_mut(flow_id)
                        .filter(|t| t.todo_type == TodoType::Approve)
                    {
                        todo.set_status(todo_status, operator)?;
                    }
                    Ok(())
                })?;
                tracing::info!(ticket_id, flow_id, sn = %sn, approved, operator, "approval resolved");
            }
            CallbackEvent::Process { root_id, state } => {
                let flow = ticket
                    .flow_by_obj_id(root_id)
                    .filter(|f| waits_on_process(f.flow_type))
                    .ok_or_else(|| {
                        EngineError::InvalidRequest(format!("no process {} on ticket {}", root_id, ticket_id))
                    })?;
                let state = ProcessState::parse(state);
                self.store
                    .update_flow(ticket_id, flow.id, |f| f.obj_state = Some(state.as_str().to_string()))?;
                tracing::info!(ticket_id, flow_id = flow.id, root_id = %root_id, state = state.as_str(), "process state reported");
            }
            CallbackEvent::Wake => self.poll_process(ticket_id)?,
        }
        self.run_next_flow(ticket_id)
    }

    /// Refresh the process state of the in-progress node from the runner.
    fn poll_process(&self, ticket_id: u64) -> Result<(), EngineError> {
        let ticket = self.store.ticket(ticket_id)?;
        let Some(flow) = ticket
            .flows
            .iter()
            .find(|f| f.status.is_active() && waits_on_process(f.flow_type) && f.obj_state.is_some())
        else {
            return Ok(());
        };
        let Some(handle) = flow.flow_obj_id.as_deref() else {
            return Ok(());
        };
        match self.services.runner.status(handle) {
            Ok(state) => {
                self.store
                    .update_flow(ticket_id, flow.id, |f| f.obj_state = Some(state.as_str().to_string()))?;
            }
            Err(err) => {
                tracing::warn!(ticket_id, flow_id = flow.id, root_id = handle, error = %err, "process poll failed");
            }
        }
        Ok(())
    }
}
