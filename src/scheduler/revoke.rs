//! Ticket revocation.

use super::FlowManager;
use crate::collab::NotifyEvent;
use crate::error::{EngineError, StageError};
use crate::model::FlowErrCode;
use crate::observability::ticket_span;
use crate::state::{FlowStatus, TicketStatus, TodoStatus};

impl FlowManager {
    /// Revoke a live ticket.
    ///
    /// The first unfinished node becomes REVOKED and its open todos
    /// DONE_FAILED. A node with an external process gets a best-effort cancel;
    /// the manager does not wait for it. Returns `false` when the ticket was
    /// already terminal.
    pub fn revoke_ticket(&self, ticket_id: u64, operator: &str, code: FlowErrCode) -> Result<bool, EngineError> {
        let _span = ticket_span("revoke", ticket_id).entered();
        let ticket = self.store.ticket(ticket_id)?;
        if ticket.is_terminal() {
            return Ok(false);
        }

        if let Some(flow) = ticket.first_unfinished().cloned() {
            let message = format!("revoked by {}", operator);
            let revoked = self.store.transaction(|data| {
                let node = data.flow_mut(ticket_id, flow.id)?;
                if !node.status.can_transition_to(FlowStatus::Revoked) {
                    return Ok(false);
                }
                node.transition(FlowStatus::Revoked)?;
                node.set_error(code, message.clone());
                for todo in data.open_todos_mut(flow.id) {
                    todo.set_status(TodoStatus::DoneFailed, operator)?;
                }
                Ok(true)
            })?;

            if revoked && flow.status.is_active() {
                let settings = self.settings();
                let cancelled = self
                    .registry
                    .get(flow.flow_type)
                    .map_err(StageError::from)
                    .and_then(|handler| handler.revoke(&self.context(&settings), &ticket, &flow, operator));
                if let Err(err) = cancelled {
                    tracing::warn!(ticket_id, flow_id = flow.id, error = %err, "cancel on revoke failed");
                }
            }
        }

        if self.store.set_ticket_status(ticket_id, TicketStatus::Revoked)?.is_some() {
            tracing::info!(ticket_id, operator, err_code = code.as_str(), "ticket revoked");
            let ticket = self.store.ticket(ticket_id)?;
            self.services
                .notifier
                .notify(&ticket, NotifyEvent::StatusChanged, &[ticket.creator.clone()]);
        }
        Ok(true)
    }
}
