//! Resource procurement with backpressure.
//!
//! The handler asks the resource pool for hosts on behalf of the execution
//! node that follows it. When the pool is short it opens one replenish todo
//! for the DB group administrators and waits; resuming the todo repeats the
//! same idempotent request.
//!
//! Sub-states, as recorded on the node:
//!
//! ```text
//! NotStarted -> Applying -> Satisfied            (resource_apply_status = true)
//!                        -> WaitingReplenish     (err_code = CAPACITY_INSUFFICIENT)
//!                        -> Failed               (any other pool error)
//! WaitingReplenish -> Applying                   (replenish todo resumed)
//! Satisfied -> Delivered                         (ticket details.resource_delivered = true,
//!                                                 set by RESOURCE_DELIVERY after confirm)
//! ```

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{StageContext, StageHandler, StageOutcome};
use crate::collab::{ApplyGroup, ApplyRequest, ApplyResponse, CollabError};
use crate::error::StageError;
use crate::model::{FlowErrCode, FlowNode, FlowType, NewTodo, Ticket, Todo, TodoType};
use crate::state::FlowStatus;

/// Role procured as master/slave pairs
const BACKEND_GROUP: &str = "backend_group";

/// Affinities that require every group in one sub-zone
const SAME_SUBZONE_AFFINITIES: &[&str] = &["SAME_SUBZONE", "SAME_SUBZONE_CROSS_SWTICH"];

/// Handles both the single and the batch apply stage.
#[derive(Debug)]
pub struct ResourceApplyHandler {
    batch: bool,
}

impl ResourceApplyHandler {
    pub fn single() -> Self {
        Self { batch: false }
    }

    pub fn batch() -> Self {
        Self { batch: true }
    }

    fn groups(&self, details: &Value) -> Result<Vec<ApplyGroup>, StageError> {
        if self.batch {
            batch_apply_groups(details)
        } else {
            apply_groups(details)
        }
    }

    /// Write procured nodes into the next node's `ticket_data`.
    fn write_nodes(&self, ticket_data: &mut Value, nodes: &Map<String, Value>) -> Result<(), StageError> {
        if !ticket_data.is_object() {
            *ticket_data = Value::Object(Map::new());
        }
        if !self.batch {
            ticket_data["nodes"] = Value::Object(nodes.clone());
            return Ok(());
        }
        for (mark, hosts) in nodes {
            let (index, group) = mark
                .split_once('_')
                .and_then(|(i, g)| i.parse::<usize>().ok().map(|i| (i, g)))
                .ok_or_else(|| StageError::Execution(format!("batch group mark '{}' has no index", mark)))?;
            let info = ticket_data
                .get_mut("infos")
                .and_then(Value::as_array_mut)
                .and_then(|infos| infos.get_mut(index))
                .ok_or_else(|| StageError::Execution(format!("no infos[{}] for group '{}'", index, group)))?;
            info[group] = hosts.clone();
        }
        Ok(())
    }

    fn on_insufficient(
        &self,
        ctx: &StageContext<'_>,
        ticket: &Ticket,
        flow: &FlowNode,
        message: String,
    ) -> Result<StageOutcome, StageError> {
        ctx.ensure_todo(
            ticket,
            NewTodo {
                name: format!("replenish resources for {} #{}", ticket.ticket_type, ticket.id),
                ticket_id: ticket.id,
                flow_id: flow.id,
                todo_type: TodoType::ResourceReplenish,
                operators: ctx.administrators(ticket),
                helpers: vec![ticket.creator.clone()],
                context: json!({
                    "flow_id": flow.id,
                    "ticket_id": ticket.id,
                    "user": ticket.creator,
                    "message": message,
                }),
            },
        )?;
        ctx.store.update_flow(ticket.id, flow.id, |f| {
            f.set_error(FlowErrCode::CapacityInsufficient, message.clone())
        })?;
        tracing::warn!(
            ticket_id = ticket.id,
            flow_id = flow.id,
            %message,
            "resource pool insufficient, waiting for replenish"
        );
        Ok(StageOutcome::Suspend)
    }

    fn on_satisfied(
        &self,
        ctx: &StageContext<'_>,
        ticket: &Ticket,
        flow: &FlowNode,
        next: &FlowNode,
        response: &ApplyResponse,
    ) -> Result<StageOutcome, StageError> {
        let nodes = group_nodes(response)?;

        let mut ticket_data = next
            .details
            .get("ticket_data")
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| flow.details.clone());
        self.write_nodes(&mut ticket_data, &nodes)?;

        let mut procured = ticket.clone();
        let mut patch = Map::new();
        patch.insert("resource_request_id".to_string(), json!(response.request_id));
        patch.insert("nodes".to_string(), Value::Object(nodes));
        procured.update_details(patch.clone());

        let mut next_details = next.details.clone();
        if !next_details.is_object() {
            next_details = Value::Object(Map::new());
        }
        next_details["ticket_data"] = ticket_data;
        ctx.hooks.post_resource_apply(&procured, &mut next_details)?;

        let (ticket_id, flow_id, next_id) = (ticket.id, flow.id, next.id);
        ctx.store.transaction(|data| {
            data.flow_mut(ticket_id, next_id)?.details = next_details;
            let ticket = data.ticket_mut(ticket_id)?;
            ticket.update_details(patch);
            let own = data.flow_mut(ticket_id, flow_id)?;
            let mut status = Map::new();
            status.insert("resource_apply_status".to_string(), json!(true));
            own.update_details(status);
            own.clear_error();
            Ok(())
        })?;
        tracing::info!(
            ticket_id,
            flow_id,
            request_id = %response.request_id,
            "resources procured"
        );
        Ok(StageOutcome::Advance)
    }
}

impl StageHandler for ResourceApplyHandler {
    fn flow_type(&self) -> FlowType {
        if self.batch {
            FlowType::ResourceBatchApply
        } else {
            FlowType::ResourceApply
        }
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let next = ticket
            .flow_after(flow.id)
            .filter(|f| f.flow_type.is_inner())
            .ok_or_else(|| {
                StageError::Misconfigured("resource apply must be followed by an execution node".to_string())
            })?;

        // the execution root id is fixed before apply so the ledger and the
        // pool can refer to it
        let mut next = next.clone();
        if next.flow_obj_id.is_none() {
            let root_id = Uuid::new_v4().simple().to_string();
            ctx.store
                .update_flow(ticket.id, next.id, |f| f.flow_obj_id = Some(root_id.clone()))?;
            next.flow_obj_id = Some(root_id);
        }

        let groups = self.groups(&flow.details)?;
        if groups.is_empty() {
            // allowed empty apply: nothing to procure
            let empty = ApplyResponse {
                request_id: String::new(),
                groups: Default::default(),
            };
            return self.on_satisfied(ctx, ticket, flow, &next, &empty);
        }

        let same_location = groups
            .first()
            .map(|g| SAME_SUBZONE_AFFINITIES.contains(&g.affinity.as_str()))
            .unwrap_or(false);
        let request = ApplyRequest {
            for_biz_id: flow
                .details
                .get("bk_biz_id")
                .and_then(Value::as_u64)
                .unwrap_or(ticket.bk_biz_id),
            resource_type: ticket.group.clone(),
            bill_id: ticket.id,
            bill_type: ticket.ticket_type.to_string(),
            task_id: next.id,
            operator: ticket.creator.clone(),
            groups_in_same_location: same_location,
            details: groups,
        };
        let key = request.idempotency_key();
        ctx.store
            .update_flow(ticket.id, flow.id, |f| f.flow_obj_id = Some(key.clone()))?;
        tracing::debug!(
            ticket_id = ticket.id,
            flow_id = flow.id,
            hosts = request.total_hosts(),
            key = %key,
            "applying for resources"
        );

        match ctx.services.resource.apply(&request) {
            Ok(response) => self.on_satisfied(ctx, ticket, flow, &next, &response),
            Err(CollabError::Insufficient(message)) => self.on_insufficient(ctx, ticket, flow, message),
            Err(err) => Err(err.into()),
        }
    }

    fn derive_status(&self, flow: &FlowNode, _todos: &[Todo]) -> FlowStatus {
        if flow.details.get("resource_apply_status").and_then(Value::as_bool) == Some(true) {
            return FlowStatus::Succeeded;
        }
        if flow.err_code == Some(FlowErrCode::CapacityInsufficient) {
            return FlowStatus::Running;
        }
        flow.status
    }
}

/// Apply groups for one `ticket_data` object.
///
/// Each role of `resource_spec` asks for `count` hosts split into groups of
/// `group_count` (default: one group), marked `{role}_{n}`. The
/// `backend_group` role asks for `count` master/slave pairs. Roles with a zero
/// count or spec id are skipped. `resource_params` is merged into every group.
pub fn apply_groups(ticket_data: &Value) -> Result<Vec<ApplyGroup>, StageError> {
    let bk_cloud_id = ticket_data.get("bk_cloud_id").and_then(Value::as_u64).unwrap_or(0);
    let extra = ticket_data
        .get("resource_params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut groups = Vec::new();
    if let Some(spec) = ticket_data.get("resource_spec").and_then(Value::as_object) {
        for (role, role_spec) in spec {
            let count = role_spec.get("count").and_then(Value::as_u64).unwrap_or(0);
            let spec_id = role_spec.get("spec_id").and_then(Value::as_u64).unwrap_or(0);
            if count == 0 || spec_id == 0 {
                continue;
            }
            let (count, group_count) = if role == BACKEND_GROUP {
                let hosts = count.checked_mul(2).ok_or_else(|| out_of_range(role, count))?;
                (hosts, 2)
            } else {
                let group_count = role_spec
                    .get("group_count")
                    .and_then(Value::as_u64)
                    .filter(|n| *n > 0)
                    .unwrap_or(count);
                (count, group_count)
            };
            let affinity = role_spec
                .get("affinity")
                .and_then(Value::as_str)
                .unwrap_or("NONE")
                .to_string();
            let location_spec = role_spec.get("location_spec").cloned().unwrap_or(Value::Null);

            let mut remaining = count;
            let mut index = 0;
            while remaining > 0 {
                let size = remaining.min(group_count);
                let hosts = u32::try_from(size).map_err(|_| out_of_range(role, size))?;
                groups.push(ApplyGroup {
                    group_mark: format!("{}_{}", role, index),
                    spec_id,
                    count: hosts,
                    bk_cloud_id,
                    affinity: affinity.clone(),
                    location_spec: location_spec.clone(),
                    extra: extra.clone(),
                });
                remaining -= size;
                index += 1;
            }
        }
    }

    let allow_empty = ticket_data
        .get("allow_resource_empty")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if groups.is_empty() && !allow_empty {
        return Err(StageError::Execution("requested host count is zero".to_string()));
    }
    Ok(groups)
}

fn out_of_range(role: &str, count: u64) -> StageError {
    StageError::Misconfigured(format!("resource count {} for role '{}' is out of range", count, role))
}

/// Apply groups for a batch payload; marks are prefixed with the `infos` index.
pub fn batch_apply_groups(details: &Value) -> Result<Vec<ApplyGroup>, StageError> {
    let infos = details
        .get("infos")
        .and_then(Value::as_array)
        .ok_or_else(|| StageError::Misconfigured("batch resource apply needs 'infos'".to_string()))?;
    let mut groups = Vec::new();
    for (index, info) in infos.iter().enumerate() {
        let mut info = info.clone();
        // fields shared by every info default from the stage payload
        for key in ["bk_cloud_id", "resource_params", "allow_resource_empty"] {
            if info.get(key).is_none() {
                if let (Some(shared), Some(obj)) = (details.get(key), info.as_object_mut()) {
                    obj.insert(key.to_string(), shared.clone());
                }
            }
        }
        for mut group in apply_groups(&info)? {
            group.group_mark = format!("{}_{}", index, group.group_mark);
            groups.push(group);
        }
    }
    Ok(groups)
}

/// Procured hosts keyed by group name (the mark without its `_{n}` suffix).
///
/// `backend_group` groups become `{master, slave}` pairs.
pub fn group_nodes(response: &ApplyResponse) -> Result<Map<String, Value>, StageError> {
    let mut nodes: Map<String, Value> = Map::new();
    for (mark, hosts) in &response.groups {
        let name = mark.rsplit_once('_').map(|(name, _)| name).unwrap_or(mark);
        let hosts: Vec<Value> = hosts
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .map_err(|e| StageError::Execution(format!("unreadable host assignment: {}", e)))?;
        let entry = nodes
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(list) = entry.as_array_mut() else {
            continue;
        };
        if name.contains(BACKEND_GROUP) {
            if hosts.len() < 2 {
                return Err(StageError::Execution(format!(
                    "backend group '{}' returned {} hosts, expected a pair",
                    mark,
                    hosts.len()
                )));
            }
            list.push(json!({"master": hosts[0], "slave": hosts[1]}));
        } else {
            list.extend(hosts);
        }
    }
    Ok(nodes)
}
