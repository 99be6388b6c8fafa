//! Human actions on todos.

use serde_json::Value;

use super::FlowManager;
use crate::error::EngineError;
use crate::model::{Todo, TodoAction, TodoType};
use crate::observability::ticket_span;
use crate::state::TodoStatus;

impl FlowManager {
    /// Apply a human action to an open todo and move its node accordingly.
    ///
    /// Returns the todo after the action.
    pub fn process_todo(
        &self,
        todo_id: u64,
        action: TodoAction,
        operator: &str,
        params: Value,
    ) -> Result<Todo, EngineError> {
        let todo = self.store.todo(todo_id)?;
        let _span = ticket_span("process_todo", todo.ticket_id).entered();
        if todo.is_done() {
            return Err(EngineError::TodoDone(todo_id));
        }
        if !todo.todo_type.allowed_actions().contains(&action) {
            return Err(EngineError::ActionNotAllowed { todo_id, action });
        }
        if !todo.is_operator(operator) {
            return Err(EngineError::InvalidRequest(format!(
                "{} is not an operator of todo {}",
                operator, todo_id
            )));
        }
        let ticket = self.store.ticket(todo.ticket_id)?;
        if ticket.is_terminal() {
            return Err(EngineError::InvalidRequest(format!(
                "ticket {} is already {}",
                ticket.id, ticket.status
            )));
        }
        let flow = ticket
            .flow(todo.flow_id)
            .cloned()
            .ok_or(EngineError::FlowNotFound {
                ticket_id: ticket.id,
                flow_id: todo.flow_id,
            })?;

        self.store
            .update_todo(todo_id, |t| t.record(action, operator, params))?;
        tracing::info!(
            ticket_id = ticket.id,
            flow_id = flow.id,
            todo_id,
            todo_type = %todo.todo_type,
            action = action.as_str(),
            operator,
            "todo action"
        );

        match (todo.todo_type, action) {
            (TodoType::ManualConfirm, TodoAction::Approve) => {
                self.finish_todo(todo_id, TodoStatus::DoneSuccess, operator)?;
                self.complete_flow(ticket.id, flow.id)?;
                self.run_next_flow(ticket.id)?;
            }
            (TodoType::Approve, decision) => {
                let sn = flow.flow_obj_id.as_deref().ok_or_else(|| {
                    EngineError::InvalidRequest(format!("approval flow {} has no serial number", flow.id))
                })?;
                // the decision resolves through the approval callback
                self.services
                    .approval
                    .decide(sn, decision == TodoAction::Approve, operator)?;
                self.finish_todo(todo_id, TodoStatus::InProgress, operator)?;
            }
            (TodoType::ResourceReplenish, TodoAction::Resume) => {
                self.finish_todo(todo_id, TodoStatus::DoneSuccess, operator)?;
                self.store.update_flow(ticket.id, flow.id, |f| f.clear_error())?;
                self.resume_flow(ticket.id, &flow)?;
            }
            (TodoType::ExecutionFailed, TodoAction::Retry) => {
                self.retry_flow(ticket.id, flow.id, operator)?;
            }
            (_, TodoAction::Terminate) => {
                self.finish_todo(todo_id, TodoStatus::DoneFailed, operator)?;
                self.terminate_flow(ticket.id, flow.id, operator)?;
                self.update_ticket_status(ticket.id)?;
            }
            _ => return Err(EngineError::ActionNotAllowed { todo_id, action }),
        }
        self.store.todo(todo_id)
    }

    fn finish_todo(&self, todo_id: u64, status: TodoStatus, operator: &str) -> Result<(), EngineError> {
        self.store
            .update_todo(todo_id, |t| t.set_status(status, operator))??;
        Ok(())
    }
}
