//! Retry operation handler.

use flow_protocol::ops::{RetryFlowRequest, RetryFlowResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::scheduler::FlowManager;

/// Handle the retry_flow operation.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: RetryFlowRequest = parse(request)?;
    let flow_status = manager.retry_flow(req.ticket_id, req.flow_id, &req.operator)?;
    let ticket = manager.store().ticket(req.ticket_id)?;
    to_payload(&RetryFlowResponse {
        ticket_id: req.ticket_id,
        flow_id: req.flow_id,
        flow_status: flow_status.to_string(),
        ticket_status: ticket.status.to_string(),
    })
}
