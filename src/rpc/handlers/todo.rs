//! Process-todo operation handler.

use flow_protocol::ops::{ProcessTodoRequest, ProcessTodoResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::model::TodoAction;
use crate::scheduler::FlowManager;

/// Handle the process_todo operation.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: ProcessTodoRequest = parse(request)?;
    let action: TodoAction = req.action.parse().map_err(RpcError::invalid_request)?;
    let todo = manager.process_todo(req.todo_id, action, &req.operator, req.params)?;
    let ticket = manager.store().ticket(todo.ticket_id)?;
    to_payload(&ProcessTodoResponse {
        todo_id: todo.id,
        todo_status: todo.status.to_string(),
        ticket_id: ticket.id,
        ticket_status: ticket.status.to_string(),
    })
}
