//! Operation history handler.

use flow_protocol::ops::{OperationEntry, OperationHistoryRequest, OperationHistoryResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::model::OperationTarget;
use crate::scheduler::FlowManager;

/// Handle the operation_history operation.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: OperationHistoryRequest = parse(request)?;
    let (target_kind, target) = match (req.cluster_id, req.instance_id) {
        (Some(id), None) => ("cluster", OperationTarget::Cluster(id)),
        (None, Some(id)) => ("instance", OperationTarget::Instance(id)),
        _ => {
            return Err(RpcError::invalid_request(
                "operation_history needs exactly one of cluster_id or instance_id",
            ))
        }
    };
    let target_id = match target {
        OperationTarget::Cluster(id) | OperationTarget::Instance(id) => id,
    };

    let entries = manager
        .operation_history(target, req.limit)
        .into_iter()
        .map(|entry| OperationEntry {
            ticket_id: entry.record.ticket_id,
            flow_id: entry.record.flow_id,
            ticket_type: entry.record.ticket_type.to_string(),
            creator: entry.record.creator,
            created_at: entry.record.created_at,
            ticket_status: entry.ticket_status.map(|s| s.to_string()),
            flow_status: entry.flow_status.map(|s| s.to_string()),
            holding: entry.holding,
        })
        .collect();
    to_payload(&OperationHistoryResponse {
        target_kind: target_kind.to_string(),
        target_id,
        entries,
    })
}
