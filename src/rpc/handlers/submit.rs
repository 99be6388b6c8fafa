//! Submit operation handler.

use flow_protocol::ops::{FlowSpec, SubmitTicketRequest, SubmitTicketResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::model::{FlowType, NewFlow, NewTicket, RetryType};
use crate::scheduler::FlowManager;

/// Handle the submit_ticket operation.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: SubmitTicketRequest = parse(request)?;
    let mut new = NewTicket::new(req.ticket_type.as_str(), req.creator, req.details)
        .with_group(req.group)
        .with_biz(req.bk_biz_id);
    new.remark = req.remark;
    for spec in &req.flows {
        new = new.flow(new_flow(spec)?);
    }

    let ticket = manager.submit_ticket(new, req.auto_start)?;
    to_payload(&SubmitTicketResponse {
        ticket_id: ticket.id,
        status: ticket.status.to_string(),
    })
}

fn new_flow(spec: &FlowSpec) -> Result<NewFlow, RpcError> {
    let flow_type: FlowType = spec
        .flow_type
        .parse()
        .map_err(|e: crate::model::UnknownFlowType| RpcError::invalid_request(e.to_string()))?;
    let mut flow = NewFlow::new(flow_type, spec.details.clone());
    if !spec.alias.is_empty() {
        flow = flow.with_alias(spec.alias.clone());
    }
    if let Some(raw) = &spec.retry_type {
        let retry_type: RetryType = raw.parse().map_err(RpcError::invalid_request)?;
        flow = flow.with_retry_type(retry_type);
    }
    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_spec_parsing() {
        let spec = FlowSpec {
            flow_type: "QUICK_INNER_FLOW".to_string(),
            alias: String::new(),
            details: serde_json::json!({"controller": "noop"}),
            retry_type: Some("AUTO_ON_MUTEX".to_string()),
        };
        let flow = new_flow(&spec).unwrap();
        assert_eq!(flow.flow_type, FlowType::QuickInnerFlow);
        assert_eq!(flow.alias, "quick_inner_flow");
        assert_eq!(flow.retry_type, RetryType::AutoOnMutex);

        let bad = FlowSpec {
            flow_type: "BK_ITSM".to_string(),
            ..spec
        };
        let err = new_flow(&bad).unwrap_err();
        assert_eq!(err.code, flow_protocol::ErrorCode::InvalidRequest);
    }
}
