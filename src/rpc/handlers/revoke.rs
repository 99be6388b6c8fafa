//! Revoke operation handler.

use flow_protocol::ops::{RevokeRequest, RevokeResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::model::FlowErrCode;
use crate::scheduler::FlowManager;

/// Handle the revoke operation.
///
/// Unknown ticket ids fail the whole request before anything is revoked.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: RevokeRequest = parse(request)?;
    if req.operator.trim().is_empty() {
        return Err(RpcError::invalid_request("operator must not be empty"));
    }
    for ticket_id in &req.ticket_ids {
        manager.store().ticket(*ticket_id)?;
    }

    let mut response = RevokeResponse::default();
    for ticket_id in req.ticket_ids {
        if manager.revoke_ticket(ticket_id, &req.operator, FlowErrCode::UserRevoked)? {
            tracing::info!(ticket_id, operator = %req.operator, reason = req.reason.as_deref().unwrap_or(""), "revoked on request");
            response.revoked.push(ticket_id);
        } else {
            response.skipped.push(ticket_id);
        }
    }
    to_payload(&response)
}
