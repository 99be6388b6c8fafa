//! Closing stages: delivery, task description, host recycle and resource
//! reimport.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::inner::{process_status, retry_process, revoke_process};
use super::{StageContext, StageHandler, StageOutcome};
use crate::collab::ProcessState;
use crate::error::StageError;
use crate::model::{FlowNode, FlowType, Ticket, Todo};
use crate::state::FlowStatus;

const RECYCLE_CONTROLLER: &str = "host_recycle";

/// Marks the ticket's work as delivered.
#[derive(Debug, Default)]
pub struct DeliveryHandler;

impl StageHandler for DeliveryHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::Delivery
    }

    fn run(&self, _ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, "delivered");
        Ok(StageOutcome::Advance)
    }
}

/// Delivery that first confirms procured hosts with the resource pool.
///
/// The batch variant reads the same `details.nodes`; its marks carry the
/// `infos` index but pairs are found the same way.
#[derive(Debug)]
pub struct ResourceDeliveryHandler {
    batch: bool,
}

impl ResourceDeliveryHandler {
    pub fn single() -> Self {
        Self { batch: false }
    }

    pub fn batch() -> Self {
        Self { batch: true }
    }
}

impl StageHandler for ResourceDeliveryHandler {
    fn flow_type(&self) -> FlowType {
        if self.batch {
            FlowType::ResourceBatchDelivery
        } else {
            FlowType::ResourceDelivery
        }
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let host_ids = procured_host_ids(&ticket.details);
        if host_ids.is_empty() {
            tracing::info!(ticket_id = ticket.id, flow_id = flow.id, "no procured hosts to confirm");
            return Ok(StageOutcome::Advance);
        }
        let request_id = ticket
            .details
            .get("resource_request_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::Misconfigured("procured nodes without resource_request_id".to_string()))?;
        ctx.services.resource.confirm(request_id, &host_ids)?;
        let mut patch = Map::new();
        patch.insert("resource_delivered".to_string(), Value::Bool(true));
        ctx.store.update_ticket(ticket.id, |t| t.update_details(patch))?;
        tracing::info!(
            ticket_id = ticket.id,
            flow_id = flow.id,
            request_id,
            hosts = host_ids.len(),
            batch = self.batch,
            "procured hosts confirmed"
        );
        Ok(StageOutcome::Advance)
    }
}

/// Records the processes the ticket ran so far under `details.tasks`.
#[derive(Debug, Default)]
pub struct DescribeTaskHandler;

impl StageHandler for DescribeTaskHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::DescribeTask
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let tasks: Vec<Value> = ticket
            .flows
            .iter()
            .take_while(|f| f.id != flow.id)
            .filter(|f| f.flow_type.is_inner() || f.flow_type == FlowType::HostRecycle)
            .filter_map(|f| {
                let root_id = f.flow_obj_id.as_ref()?;
                Some(json!({
                    "flow_id": f.id,
                    "flow_type": f.flow_type,
                    "root_id": root_id,
                    "status": f.status,
                }))
            })
            .collect();
        let count = tasks.len();
        let mut patch = Map::new();
        patch.insert("tasks".to_string(), Value::Array(tasks));
        ctx.store.update_flow(ticket.id, flow.id, |f| f.update_details(patch))?;
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, tasks = count, "tasks described");
        Ok(StageOutcome::Advance)
    }
}

/// Host ids in `details.nodes`, including both sides of backend pairs.
pub(crate) fn procured_host_ids(details: &Value) -> Vec<u64> {
    let Some(nodes) = details.get("nodes").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut ids = Vec::new();
    for (role, hosts) in nodes {
        for entry in hosts.as_array().into_iter().flatten() {
            if role.contains("backend_group") {
                let pair = entry.as_object().into_iter().flat_map(|m| m.values());
                ids.extend(pair.filter_map(|h| h.get("bk_host_id").and_then(Value::as_u64)));
            } else if let Some(id) = entry.get("bk_host_id").and_then(Value::as_u64) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Hands retired hosts to the recycle process of the execution engine.
#[derive(Debug, Default)]
pub struct HostRecycleHandler;

impl StageHandler for HostRecycleHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::HostRecycle
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let controller = flow
            .details
            .get("controller")
            .and_then(Value::as_str)
            .unwrap_or(RECYCLE_CONTROLLER)
            .to_string();
        let root_id = Uuid::new_v4().simple().to_string();
        let handle = ctx.services.runner.dispatch(&controller, &flow.details, &root_id)?;
        ctx.store.update_flow(ticket.id, flow.id, |f| {
            f.flow_obj_id = Some(handle.clone());
            f.obj_state = Some(ProcessState::Running.as_str().to_string());
        })?;
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, root_id = %handle, "host recycle dispatched");
        Ok(StageOutcome::Suspend)
    }

    fn derive_status(&self, flow: &FlowNode, _todos: &[Todo]) -> FlowStatus {
        process_status(flow)
    }

    fn retry(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        if flow.obj_state.is_none() {
            return self.run(ctx, ticket, flow);
        }
        retry_process(ctx, ticket, flow)
    }

    fn revoke(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode, _operator: &str) -> Result<(), StageError> {
        revoke_process(ctx, ticket, flow)
    }
}

/// Returns hosts to the resource pool.
#[derive(Debug, Default)]
pub struct ResourceReimportHandler;

impl StageHandler for ResourceReimportHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::ResourceReimport
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let host_ids = reimport_host_ids(&flow.details);
        if host_ids.is_empty() {
            return Err(StageError::Misconfigured("resource reimport names no hosts".to_string()));
        }
        let bk_biz_id = flow
            .details
            .get("bk_biz_id")
            .and_then(Value::as_u64)
            .unwrap_or(ticket.bk_biz_id);
        ctx.services
            .resource
            .reimport(bk_biz_id, &host_ids, &ticket.creator)?;
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, hosts = host_ids.len(), "hosts reimported");
        Ok(StageOutcome::Advance)
    }
}

/// Hosts from `bk_host_ids` or `hosts[*].bk_host_id`.
fn reimport_host_ids(details: &Value) -> Vec<u64> {
    if let Some(ids) = details.get("bk_host_ids").and_then(Value::as_array) {
        return ids.iter().filter_map(Value::as_u64).collect();
    }
    details
        .get("hosts")
        .and_then(Value::as_array)
        .map(|hosts| {
            hosts
                .iter()
                .filter_map(|h| h.get("bk_host_id").and_then(Value::as_u64))
                .collect()
        })
        .unwrap_or_default()
}
