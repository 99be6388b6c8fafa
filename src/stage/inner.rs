//! Execution stages run by the external engine.

use serde_json::Value;
use uuid::Uuid;

use super::{StageContext, StageHandler, StageOutcome};
use crate::collab::ProcessState;
use crate::error::StageError;
use crate::model::{FlowNode, FlowType, Ticket, Todo};
use crate::state::FlowStatus;

/// Dispatches `details.controller` to the execution runner.
///
/// Before dispatch the ticket's clusters are checked for conflicting
/// operations; after dispatch the ticket is written to the operation ledger.
/// The quick variant advances as soon as the process is dispatched. The
/// ignore-result variant reads a failed or revoked process as success.
#[derive(Debug)]
pub struct InnerHandler {
    flow_type: FlowType,
}

impl InnerHandler {
    pub fn new(flow_type: FlowType) -> Self {
        debug_assert!(flow_type.is_inner());
        Self { flow_type }
    }
}

impl StageHandler for InnerHandler {
    fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let checker = ctx.checker();
        checker.check_ticket(ticket)?;

        let mut payload = flow.details.clone();
        ctx.hooks.pre_execute(ticket, &mut payload)?;
        let controller = controller_of(&payload)?;

        let root_id = flow
            .flow_obj_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let handle = ctx.services.runner.dispatch(&controller, &payload, &root_id)?;
        ctx.store.update_flow(ticket.id, flow.id, |f| {
            f.flow_obj_id = Some(handle.clone());
            f.obj_state = Some(ProcessState::Running.as_str().to_string());
            f.details = payload;
        })?;
        let recorded = checker.record_dispatch(ticket, flow.id);
        tracing::info!(
            ticket_id = ticket.id,
            flow_id = flow.id,
            controller = %controller,
            root_id = %handle,
            ledger_entries = recorded,
            "execution dispatched"
        );

        if self.flow_type == FlowType::QuickInnerFlow {
            Ok(StageOutcome::Advance)
        } else {
            Ok(StageOutcome::Suspend)
        }
    }

    fn derive_status(&self, flow: &FlowNode, _todos: &[Todo]) -> FlowStatus {
        // a node waiting on a mutex is still in progress
        if flow.is_mutex_blocked() {
            return FlowStatus::Running;
        }
        match process_status(flow) {
            FlowStatus::Failed | FlowStatus::Revoked | FlowStatus::Terminated
                if self.flow_type == FlowType::IgnoreResultInnerFlow =>
            {
                FlowStatus::Succeeded
            }
            status => status,
        }
    }

    fn retry(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        if flow.is_mutex_blocked() || flow.obj_state.is_none() {
            return self.run(ctx, ticket, flow);
        }
        retry_process(ctx, ticket, flow)
    }

    fn revoke(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode, _operator: &str) -> Result<(), StageError> {
        revoke_process(ctx, ticket, flow)
    }
}

/// Controller named by an execution payload.
pub(super) fn controller_of(payload: &Value) -> Result<String, StageError> {
    payload
        .get("controller")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StageError::Misconfigured("execution payload has no controller".to_string()))
}

/// Node status from the last reported process state.
pub(super) fn process_status(flow: &FlowNode) -> FlowStatus {
    match flow.obj_state.as_deref().map(ProcessState::parse) {
        None => flow.status,
        Some(ProcessState::Created) | Some(ProcessState::Running) => FlowStatus::Running,
        Some(ProcessState::Finished) => FlowStatus::Succeeded,
        Some(ProcessState::Failed) => FlowStatus::Failed,
        Some(ProcessState::Revoked) => FlowStatus::Revoked,
    }
}

/// Ask the runner to retry a dispatched process.
pub(super) fn retry_process(ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
    let handle = flow
        .flow_obj_id
        .as_deref()
        .ok_or_else(|| StageError::Misconfigured("retry of a process that was never dispatched".to_string()))?;
    ctx.services.runner.retry(handle)?;
    ctx.store.update_flow(ticket.id, flow.id, |f| {
        f.obj_state = Some(ProcessState::Running.as_str().to_string());
    })?;
    tracing::info!(ticket_id = ticket.id, flow_id = flow.id, root_id = handle, "process retried");
    Ok(StageOutcome::Suspend)
}

/// Cancel a dispatched process; nodes never dispatched have nothing to cancel.
pub(super) fn revoke_process(ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<(), StageError> {
    if flow.obj_state.is_none() {
        return Ok(());
    }
    if let Some(handle) = flow.flow_obj_id.as_deref() {
        ctx.services.runner.revoke(handle)?;
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, root_id = handle, "process revoke sent");
    }
    Ok(())
}
