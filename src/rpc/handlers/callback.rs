//! Callback operation handler.

use flow_protocol::ops::{CallbackRequest, CallbackResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::scheduler::FlowManager;

/// Handle the callback operation.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: CallbackRequest = parse(request)?;
    let status = manager.handle_callback(req.ticket_id, &req.event)?;
    to_payload(&CallbackResponse {
        ticket_id: req.ticket_id,
        status: status.to_string(),
    })
}
