//! Ticket status operation handler.
//!
//! Reports derived node statuses, so a node whose process already finished
//! shows its outcome before the next scheduling pass persists it.

use flow_protocol::ops::{FlowSummary, TicketStatusRequest, TicketStatusResponse, TodoSummary};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::scheduler::{FlowManager, TicketView};

/// Handle the ticket_status operation.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: TicketStatusRequest = parse(request)?;
    let view = manager.view(req.ticket_id)?;
    to_payload(&summarize(&view))
}

pub fn summarize(view: &TicketView) -> TicketStatusResponse {
    let ticket = &view.ticket;
    let flows = ticket
        .flows
        .iter()
        .zip(&view.derived)
        .map(|(flow, derived)| FlowSummary {
            flow_id: flow.id,
            flow_type: flow.flow_type.to_string(),
            alias: flow.alias.clone(),
            status: derived.to_string(),
            err_code: flow.err_code.map(|c| c.as_str().to_string()),
            err_msg: flow.err_msg.clone(),
        })
        .collect();
    let todos = view
        .todos
        .iter()
        .map(|todo| TodoSummary {
            todo_id: todo.id,
            flow_id: todo.flow_id,
            todo_type: todo.todo_type.to_string(),
            status: todo.status.to_string(),
            operators: todo.operators.clone(),
        })
        .collect();

    TicketStatusResponse {
        ticket_id: ticket.id,
        ticket_type: ticket.ticket_type.to_string(),
        status: if ticket.is_terminal() {
            ticket.status.to_string()
        } else {
            view.ticket_status().unwrap_or(ticket.status).to_string()
        },
        current_flow_id: ticket.current_flow().map(|f| f.id),
        flows,
        todos,
    }
}
