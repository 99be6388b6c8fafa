//! Derived status of a ticket, computed once per scheduling pass.

use crate::error::EngineError;
use crate::model::{FlowNode, FlowType, Ticket, Todo};
use crate::stage::StageRegistry;
use crate::state::{FlowStatus, TerminalState, TicketStatus};

/// A ticket snapshot with the derived status of each node
#[derive(Debug, Clone)]
pub struct TicketView {
    pub ticket: Ticket,
    pub todos: Vec<Todo>,
    /// Derived node statuses, parallel to `ticket.flows`
    pub derived: Vec<FlowStatus>,
}

impl TicketView {
    pub fn build(ticket: Ticket, todos: Vec<Todo>, registry: &StageRegistry) -> Result<Self, EngineError> {
        let mut derived = Vec::with_capacity(ticket.flows.len());
        for flow in &ticket.flows {
            let status = if flow.status == FlowStatus::Pending || flow.status.is_terminal() {
                flow.status
            } else {
                let flow_todos: Vec<Todo> = todos.iter().filter(|t| t.flow_id == flow.id).cloned().collect();
                registry.get(flow.flow_type)?.derive_status(flow, &flow_todos)
            };
            derived.push(status);
        }
        Ok(Self { ticket, todos, derived })
    }

    /// Derived status of one node.
    pub fn derived_status(&self, flow_id: u64) -> Option<FlowStatus> {
        self.ticket
            .flows
            .iter()
            .position(|f| f.id == flow_id)
            .map(|pos| self.derived[pos])
    }

    /// Nodes whose derived status differs from the stored one.
    pub fn drifted(&self) -> Vec<(&FlowNode, FlowStatus)> {
        self.ticket
            .flows
            .iter()
            .zip(&self.derived)
            .filter(|(flow, derived)| flow.status != **derived)
            .map(|(flow, derived)| (flow, *derived))
            .collect()
    }

    /// Ticket status implied by the derived node statuses; `None` keeps the
    /// stored status.
    pub fn ticket_status(&self) -> Option<TicketStatus> {
        let flows: Vec<(FlowType, FlowStatus)> = self
            .ticket
            .flows
            .iter()
            .zip(&self.derived)
            .map(|(flow, status)| (flow.flow_type, *status))
            .collect();
        derive_ticket_status(&flows)
    }
}

/// Ticket status from `(type, derived status)` of every node, in order.
///
/// Priority: TERMINATED, FAILED, REVOKED, then the running node's type, then
/// SUCCEEDED once every node is finished.
pub fn derive_ticket_status(flows: &[(FlowType, FlowStatus)]) -> Option<TicketStatus> {
    let any = |status: FlowStatus| flows.iter().any(|(_, s)| *s == status);
    if any(FlowStatus::Terminated) {
        return Some(TicketStatus::Terminated);
    }
    if any(FlowStatus::Failed) {
        return Some(TicketStatus::Failed);
    }
    if any(FlowStatus::Revoked) {
        return Some(TicketStatus::Revoked);
    }
    if let Some((flow_type, _)) = flows.iter().find(|(_, s)| *s == FlowStatus::Running) {
        return Some(flow_type.running_ticket_status());
    }
    if !flows.is_empty() && flows.iter().all(|(_, s)| s.is_finished()) {
        return Some(TicketStatus::Succeeded);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use FlowStatus::*;

    #[test]
    fn test_terminated_beats_failed() {
        let flows = [
            (FlowType::InnerFlow, Failed),
            (FlowType::Pause, Terminated),
        ];
        assert_eq!(derive_ticket_status(&flows), Some(TicketStatus::Terminated));
    }

    #[test]
    fn test_failed_beats_revoked() {
        let flows = [(FlowType::InnerFlow, Failed), (FlowType::Delivery, Revoked)];
        assert_eq!(derive_ticket_status(&flows), Some(TicketStatus::Failed));
    }

    #[test]
    fn test_running_maps_by_type() {
        let cases = [
            (FlowType::Approval, TicketStatus::AwaitingApproval),
            (FlowType::Pause, TicketStatus::AwaitingConfirm),
            (FlowType::ResourceApply, TicketStatus::AwaitingResources),
            (FlowType::ResourceBatchApply, TicketStatus::AwaitingResources),
            (FlowType::InnerFlow, TicketStatus::Running),
            (FlowType::HostRecycle, TicketStatus::Running),
        ];
        for (flow_type, expected) in cases {
            let flows = [(FlowType::Delivery, Succeeded), (flow_type, Running), (FlowType::Delivery, Pending)];
            assert_eq!(derive_ticket_status(&flows), Some(expected));
        }
    }

    #[test]
    fn test_all_finished_succeeds() {
        let flows = [(FlowType::Approval, Skipped), (FlowType::InnerFlow, Succeeded)];
        assert_eq!(derive_ticket_status(&flows), Some(TicketStatus::Succeeded));
    }

    #[test]
    fn test_between_nodes_is_unchanged() {
        let flows = [(FlowType::Approval, Succeeded), (FlowType::InnerFlow, Pending)];
        assert_eq!(derive_ticket_status(&flows), None);
        assert_eq!(derive_ticket_status(&[]), None);
    }
}
