//! Human stages: external approval and manual confirmation.

use serde_json::{json, Value};

use super::{StageContext, StageHandler, StageOutcome};
use crate::error::StageError;
use crate::model::{FlowNode, FlowType, NewTodo, Ticket, Todo, TodoType};
use crate::state::{FlowStatus, TodoStatus};

/// Opens an approval ticket and waits for its callback.
///
/// The node's `flow_obj_id` holds the approval serial number; the decision
/// lands in `approved`.
#[derive(Debug, Default)]
pub struct ApprovalHandler;

impl StageHandler for ApprovalHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::Approval
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let callback_url = ctx.settings.callback_url_for(ticket.id);
        let sn = ctx.services.approval.create(ticket, &flow.details, &callback_url)?;
        ctx.store.update_flow(ticket.id, flow.id, |f| {
            f.flow_obj_id = Some(sn.clone());
            f.approved = None;
        })?;

        let operators = match approvers(&flow.details) {
            Some(list) => list,
            None => ctx.administrators(ticket),
        };
        ctx.ensure_todo(
            ticket,
            NewTodo {
                name: format!("approve {} #{}", ticket.ticket_type, ticket.id),
                ticket_id: ticket.id,
                flow_id: flow.id,
                todo_type: TodoType::Approve,
                operators,
                helpers: vec![],
                context: json!({"sn": sn}),
            },
        )?;
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, sn = %sn, "approval opened");
        Ok(StageOutcome::Suspend)
    }

    fn derive_status(&self, flow: &FlowNode, _todos: &[Todo]) -> FlowStatus {
        match flow.approved {
            Some(true) => FlowStatus::Succeeded,
            Some(false) => FlowStatus::Terminated,
            None => flow.status,
        }
    }

    fn revoke(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode, operator: &str) -> Result<(), StageError> {
        if let Some(sn) = &flow.flow_obj_id {
            ctx.services.approval.withdraw(sn, operator)?;
            tracing::info!(ticket_id = ticket.id, sn = %sn, "approval withdrawn");
        }
        Ok(())
    }
}

fn approvers(details: &Value) -> Option<Vec<String>> {
    let list: Vec<String> = details
        .get("approvers")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    (!list.is_empty()).then_some(list)
}

/// Waits for a human to confirm or terminate.
#[derive(Debug, Default)]
pub struct PauseHandler;

impl StageHandler for PauseHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::Pause
    }

    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let admins = ctx.settings.administrators_of(&ticket.group);
        ctx.ensure_todo(
            ticket,
            NewTodo {
                name: format!("confirm {} #{}", ticket.ticket_type, ticket.id),
                ticket_id: ticket.id,
                flow_id: flow.id,
                todo_type: TodoType::ManualConfirm,
                operators: vec![ticket.creator.clone()],
                helpers: admins,
                context: json!({"alias": flow.alias}),
            },
        )?;
        Ok(StageOutcome::Suspend)
    }

    fn derive_status(&self, flow: &FlowNode, todos: &[Todo]) -> FlowStatus {
        let confirms = todos.iter().filter(|t| t.todo_type == TodoType::ManualConfirm);
        let mut status = flow.status;
        for todo in confirms {
            match todo.status {
                TodoStatus::DoneFailed => return FlowStatus::Terminated,
                TodoStatus::DoneSuccess => status = FlowStatus::Succeeded,
                _ => return flow.status,
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewFlow;

    fn node(flow_type: FlowType) -> FlowNode {
        let mut flow = FlowNode::from_new(2, 1, 0, NewFlow::new(flow_type, json!({})));
        flow.status = FlowStatus::Running;
        flow
    }

    fn confirm(status: TodoStatus) -> Todo {
        let mut todo = Todo::from_new(
            5,
            NewTodo {
                name: "confirm".to_string(),
                ticket_id: 1,
                flow_id: 2,
                todo_type: TodoType::ManualConfirm,
                operators: vec![],
                helpers: vec![],
                context: Value::Null,
            },
        );
        todo.status = status;
        todo
    }

    #[test]
    fn test_approval_status_follows_decision() {
        let mut flow = node(FlowType::Approval);
        assert_eq!(ApprovalHandler.derive_status(&flow, &[]), FlowStatus::Running);
        flow.approved = Some(true);
        assert_eq!(ApprovalHandler.derive_status(&flow, &[]), FlowStatus::Succeeded);
        flow.approved = Some(false);
        assert_eq!(ApprovalHandler.derive_status(&flow, &[]), FlowStatus::Terminated);
    }

    #[test]
    fn test_pause_status_follows_todo() {
        let flow = node(FlowType::Pause);
        assert_eq!(PauseHandler.derive_status(&flow, &[confirm(TodoStatus::Todo)]), FlowStatus::Running);
        assert_eq!(
            PauseHandler.derive_status(&flow, &[confirm(TodoStatus::DoneSuccess)]),
            FlowStatus::Succeeded
        );
        assert_eq!(
            PauseHandler.derive_status(&flow, &[confirm(TodoStatus::DoneFailed)]),
            FlowStatus::Terminated
        );
    }

    #[test]
    fn test_approvers_from_details() {
        assert_eq!(
            approvers(&json!({"approvers": ["alice", "bob"]})),
            Some(vec!["alice".to_string(), "bob".to_string()])
        );
        assert_eq!(approvers(&json!({"approvers": []})), None);
        assert_eq!(approvers(&json!({})), None);
    }
}
