//! Cluster mutual exclusion.
//!
//! Before an execution node dispatches, every cluster its ticket names is
//! checked against the operation ledger: an entry whose ticket is live and
//! whose execution node is RUNNING or FAILED holds the cluster, and the
//! exclusivity matrix decides whether the incoming ticket type may run
//! alongside it. The check is optimistic; two tickets passing it at the same
//! instant can both dispatch.

use flow_exclusive::ExclusivityMatrix;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::model::{OperationRecord, OperationTarget, Ticket, TicketType};
use crate::state::now_utc;
use crate::store::FlowStore;

/// An active operation blocking an incoming ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub cluster_id: u64,
    /// Ticket holding the cluster
    pub ticket_id: u64,
    pub ticket_type: TicketType,
    pub flow_id: u64,
    /// Execution root id of the holding flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
}

/// Matrix lookups over the live ledger
pub struct ExclusivityChecker<'a> {
    store: &'a FlowStore,
    matrix: &'a ExclusivityMatrix,
}

impl<'a> ExclusivityChecker<'a> {
    pub fn new(store: &'a FlowStore, matrix: &'a ExclusivityMatrix) -> Self {
        Self { store, matrix }
    }

    /// Active operations on `cluster_id` that conflict with `ticket_type`.
    pub fn has_conflict(&self, ticket_type: &TicketType, cluster_id: u64, exclude: &[u64]) -> Vec<Conflict> {
        self.store
            .active_operations(OperationTarget::Cluster(cluster_id), exclude)
            .into_iter()
            .filter(|op| {
                self.matrix
                    .conflicts(ticket_type.as_str(), op.record.ticket_type.as_str())
            })
            .map(|op| Conflict {
                cluster_id,
                ticket_id: op.record.ticket_id,
                ticket_type: op.record.ticket_type,
                flow_id: op.record.flow_id,
                root_id: op.root_id,
            })
            .collect()
    }

    /// Fail with [`StageError::MutexConflict`] when any cluster of the ticket
    /// is held by a conflicting operation of another ticket.
    pub fn check_ticket(&self, ticket: &Ticket) -> Result<(), StageError> {
        let conflicts: Vec<Conflict> = ticket
            .cluster_ids()
            .into_iter()
            .flat_map(|cluster_id| self.has_conflict(&ticket.ticket_type, cluster_id, &[ticket.id]))
            .collect();
        if conflicts.is_empty() {
            return Ok(());
        }
        tracing::info!(
            ticket_id = ticket.id,
            ticket_type = %ticket.ticket_type,
            conflicts = conflicts.len(),
            "mutex conflict"
        );
        Err(StageError::MutexConflict(conflicts))
    }

    /// Write ledger entries for a dispatched execution node. Returns how many
    /// entries were new.
    pub fn record_dispatch(&self, ticket: &Ticket, flow_id: u64) -> usize {
        self.store.append_records(ledger_entries(ticket, flow_id))
    }
}

/// Ledger entries naming every cluster and instance of `ticket`.
pub fn ledger_entries(ticket: &Ticket, flow_id: u64) -> Vec<OperationRecord> {
    let created_at = now_utc();
    let clusters = ticket.cluster_ids().into_iter().map(OperationTarget::Cluster);
    let instances = ticket.instance_ids().into_iter().map(OperationTarget::Instance);
    clusters
        .chain(instances)
        .map(|target| OperationRecord {
            target,
            flow_id,
            ticket_id: ticket.id,
            ticket_type: ticket.ticket_type.clone(),
            creator: ticket.creator.clone(),
            created_at,
        })
        .collect()
}
