//! Reconcile operation handler.

use chrono::Utc;
use flow_protocol::ops::{ReconcileRequest, ReconcileResponse};
use flow_protocol::{RpcError, RpcRequest};

use super::{parse, to_payload};
use crate::reconciler::Reconciler;
use crate::scheduler::FlowManager;

/// Handle the reconcile operation: one full sweep.
pub fn handle(request: &RpcRequest, manager: &FlowManager) -> Result<serde_json::Value, RpcError> {
    let req: ReconcileRequest = if request.payload.is_null() {
        ReconcileRequest::default()
    } else {
        parse(request)?
    };
    let report = Reconciler::new(manager).sweep(req.now.unwrap_or_else(Utc::now));
    to_payload(&ReconcileResponse {
        retried: report.retried,
        expired: report.expired,
        fired: report.fired,
        failures: report.failures,
    })
}
