//! In-process store for tickets, todos and the operation ledger.
//!
//! Every status change is a compare-and-set under one write lock, so
//! concurrent scheduler passes over the same ticket cannot both start a node.

mod lock;
mod snapshot;
mod state_file;

pub use lock::{LockError, StateLock};
pub use snapshot::{Snapshot, SnapshotError, SCHEMA_ID};
pub use state_file::{StateFile, StateFileError};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::EngineError;
use crate::model::{
    FlowNode, NewTicket, NewTodo, OperationRecord, OperationTarget, Ticket, Todo, TodoType,
};
use crate::state::{observe_seq, FlowStatus, TerminalState, TicketStatus, TodoStatus};

/// Raw store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    pub tickets: BTreeMap<u64, Ticket>,
    pub todos: BTreeMap<u64, Todo>,
    pub records: Vec<OperationRecord>,
    pub id_counter: u64,
}

impl StoreData {
    fn next_id(&mut self) -> u64 {
        self.id_counter += 1;
        self.id_counter
    }

    pub fn ticket_mut(&mut self, ticket_id: u64) -> Result<&mut Ticket, EngineError> {
        self.tickets
            .get_mut(&ticket_id)
            .ok_or(EngineError::TicketNotFound(ticket_id))
    }

    pub fn flow_mut(&mut self, ticket_id: u64, flow_id: u64) -> Result<&mut FlowNode, EngineError> {
        self.ticket_mut(ticket_id)?
            .flow_mut(flow_id)
            .ok_or(EngineError::FlowNotFound { ticket_id, flow_id })
    }

    pub fn todo_mut(&mut self, todo_id: u64) -> Result<&mut Todo, EngineError> {
        self.todos.get_mut(&todo_id).ok_or(EngineError::TodoNotFound(todo_id))
    }

    /// Highest sequence number stamped on any record.
    fn max_seq(&self) -> u64 {
        let tickets = self
            .tickets
            .values()
            .flat_map(|t| std::iter::once(t.seq).chain(t.flows.iter().map(|f| f.seq)));
        let todos = self.todos.values().map(|t| t.seq);
        tickets.chain(todos).max().unwrap_or(0)
    }

    /// Open todos bound to a flow.
    pub fn open_todos_mut(&mut self, flow_id: u64) -> impl Iterator<Item = &mut Todo> {
        self.todos
            .values_mut()
            .filter(move |t| t.flow_id == flow_id && !t.is_done())
    }
}

/// Result of [`FlowStore::ensure_todo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoEnsure {
    Created,
    /// A finished todo of the same type on the same flow was reopened
    Reopened,
    /// An open todo of the same type already existed
    Existing,
}

/// Operation currently holding a cluster or instance
#[derive(Debug, Clone)]
pub struct ActiveOperation {
    pub record: OperationRecord,
    pub flow_status: FlowStatus,
    /// Execution root id of the holding flow
    pub root_id: Option<String>,
}

/// A ledger entry with the current state of its ticket and flow
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub record: OperationRecord,
    pub ticket_status: Option<TicketStatus>,
    pub flow_status: Option<FlowStatus>,
    /// Whether the entry still holds its target
    pub holding: bool,
}

/// Shared handle to the store
#[derive(Debug, Clone, Default)]
pub struct FlowStore {
    inner: Arc<RwLock<StoreData>>,
}

impl FlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: StoreData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Load a store from a snapshot file; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        Ok(Self::from_data(read_snapshot(path)?))
    }

    /// Replace the contents with the snapshot at `path`.
    ///
    /// Every handle sharing this store sees the reloaded data.
    pub fn reload(&self, path: &Path) -> Result<(), SnapshotError> {
        let data = read_snapshot(path)?;
        *self.write() = data;
        Ok(())
    }

    /// Write the store to a snapshot file.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        Snapshot::new(self.read().clone()).write_to_file(path)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreData> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the write lock. Changes made before an error are kept,
    /// so closures validate before they mutate.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let mut data = self.write();
        f(&mut data)
    }

    // ---- tickets ----

    /// Persist a new ticket with all nodes Pending.
    pub fn insert_ticket(&self, new: NewTicket) -> Result<Ticket, EngineError> {
        if new.flows.is_empty() {
            return Err(EngineError::InvalidRequest(format!(
                "ticket of type {} has no flows",
                new.ticket_type
            )));
        }
        let mut data = self.write();
        let ticket_id = data.next_id();
        let mut flows = Vec::with_capacity(new.flows.len());
        for (position, flow) in new.flows.iter().cloned().enumerate() {
            let flow_id = data.next_id();
            flows.push(FlowNode::from_new(flow_id, ticket_id, position, flow));
        }
        let ticket = Ticket::from_new(ticket_id, new, flows);
        data.tickets.insert(ticket_id, ticket.clone());
        Ok(ticket)
    }

    pub fn ticket(&self, ticket_id: u64) -> Result<Ticket, EngineError> {
        self.read()
            .tickets
            .get(&ticket_id)
            .cloned()
            .ok_or(EngineError::TicketNotFound(ticket_id))
    }

    /// Tickets matching a predicate.
    pub fn tickets_where(&self, pred: impl Fn(&Ticket) -> bool) -> Vec<Ticket> {
        self.read().tickets.values().filter(|t| pred(t)).cloned().collect()
    }

    pub fn update_ticket<R>(&self, ticket_id: u64, f: impl FnOnce(&mut Ticket) -> R) -> Result<R, EngineError> {
        let mut data = self.write();
        let ticket = data.ticket_mut(ticket_id)?;
        let out = f(ticket);
        ticket.touch();
        Ok(out)
    }

    /// Set the ticket status if the change is allowed.
    ///
    /// Returns the previous status when the status changed.
    pub fn set_ticket_status(&self, ticket_id: u64, status: TicketStatus) -> Result<Option<TicketStatus>, EngineError> {
        let mut data = self.write();
        let ticket = data.ticket_mut(ticket_id)?;
        let origin = ticket.status;
        if !origin.can_transition_to(status) {
            return Ok(None);
        }
        ticket.status = status;
        ticket.touch();
        Ok(Some(origin))
    }

    // ---- flows ----

    /// Claim a Pending node: PENDING → RUNNING.
    ///
    /// Succeeds only when the ticket is live, every earlier node is finished
    /// and no other node of the ticket is active. Returns `false` when the
    /// claim was lost.
    pub fn claim_flow(&self, ticket_id: u64, flow_id: u64) -> Result<bool, EngineError> {
        let mut data = self.write();
        let ticket = data.ticket_mut(ticket_id)?;
        if ticket.status.is_terminal() {
            return Ok(false);
        }
        let pos = ticket
            .flows
            .iter()
            .position(|f| f.id == flow_id)
            .ok_or(EngineError::FlowNotFound { ticket_id, flow_id })?;
        if ticket.flows[pos].status != FlowStatus::Pending {
            return Ok(false);
        }
        if !ticket.flows[..pos].iter().all(|f| f.status.is_finished()) {
            return Ok(false);
        }
        if ticket.flows.iter().any(|f| f.status.is_active()) {
            return Ok(false);
        }
        ticket.flows[pos].transition(FlowStatus::Running)?;
        ticket.touch();
        Ok(true)
    }

    /// Compare-and-set a node status.
    ///
    /// Returns `false` when the node is not in one of `from`.
    pub fn transition_flow(
        &self,
        ticket_id: u64,
        flow_id: u64,
        from: &[FlowStatus],
        to: FlowStatus,
    ) -> Result<bool, EngineError> {
        let mut data = self.write();
        let flow = data.flow_mut(ticket_id, flow_id)?;
        if !from.contains(&flow.status) {
            return Ok(false);
        }
        flow.transition(to)?;
        Ok(true)
    }

    /// Set a node status only if the node is unchanged since it was read
    /// with sequence number `seen_seq`.
    ///
    /// Returns `false` on a sequence mismatch.
    pub fn transition_flow_at(
        &self,
        ticket_id: u64,
        flow_id: u64,
        seen_seq: u64,
        to: FlowStatus,
    ) -> Result<bool, EngineError> {
        let mut data = self.write();
        let flow = data.flow_mut(ticket_id, flow_id)?;
        if flow.seq != seen_seq {
            return Ok(false);
        }
        flow.transition(to)?;
        Ok(true)
    }

    pub fn update_flow<R>(
        &self,
        ticket_id: u64,
        flow_id: u64,
        f: impl FnOnce(&mut FlowNode) -> R,
    ) -> Result<R, EngineError> {
        let mut data = self.write();
        let flow = data.flow_mut(ticket_id, flow_id)?;
        let out = f(flow);
        flow.touch();
        Ok(out)
    }

    /// Nodes waiting for a conflicting operation to finish.
    pub fn mutex_blocked_flows(&self) -> Vec<(u64, u64)> {
        self.read()
            .tickets
            .values()
            .filter(|t| !t.is_terminal())
            .flat_map(|t| t.flows.iter().filter(|f| f.is_mutex_blocked()).map(move |f| (t.id, f.id)))
            .collect()
    }

    // ---- todos ----

    /// Make sure exactly one open todo of this type exists for the flow.
    pub fn ensure_todo(&self, new: NewTodo) -> Result<(Todo, TodoEnsure), EngineError> {
        let mut data = self.write();
        if !data.tickets.contains_key(&new.ticket_id) {
            return Err(EngineError::TicketNotFound(new.ticket_id));
        }
        let existing = data
            .todos
            .values_mut()
            .filter(|t| t.flow_id == new.flow_id && t.todo_type == new.todo_type)
            .find(|t| t.status != TodoStatus::DoneFailed);
        if let Some(todo) = existing {
            if !todo.is_done() {
                return Ok((todo.clone(), TodoEnsure::Existing));
            }
            todo.set_status(TodoStatus::Todo, "system")?;
            todo.context = new.context;
            return Ok((todo.clone(), TodoEnsure::Reopened));
        }
        let id = data.next_id();
        let todo = Todo::from_new(id, new);
        data.todos.insert(id, todo.clone());
        Ok((todo, TodoEnsure::Created))
    }

    pub fn todo(&self, todo_id: u64) -> Result<Todo, EngineError> {
        self.read()
            .todos
            .get(&todo_id)
            .cloned()
            .ok_or(EngineError::TodoNotFound(todo_id))
    }

    pub fn todos_for_ticket(&self, ticket_id: u64) -> Vec<Todo> {
        self.read()
            .todos
            .values()
            .filter(|t| t.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    /// Open todos of the given types.
    pub fn open_todos_of(&self, types: &[TodoType]) -> Vec<Todo> {
        self.read()
            .todos
            .values()
            .filter(|t| !t.is_done() && types.contains(&t.todo_type))
            .cloned()
            .collect()
    }

    pub fn update_todo<R>(&self, todo_id: u64, f: impl FnOnce(&mut Todo) -> R) -> Result<R, EngineError> {
        let mut data = self.write();
        let todo = data.todo_mut(todo_id)?;
        Ok(f(todo))
    }

    // ---- operation ledger ----

    /// Append records, skipping ones already present. Returns how many were added.
    pub fn append_records(&self, records: Vec<OperationRecord>) -> usize {
        let mut data = self.write();
        let mut seen: BTreeSet<_> = data.records.iter().map(OperationRecord::key).collect();
        let mut added = 0;
        for record in records {
            if seen.insert(record.key()) {
                data.records.push(record);
                added += 1;
            }
        }
        added
    }

    /// Every ledger entry for `target`, newest first, joined with the current
    /// state of its ticket.
    pub fn ledger_for_target(&self, target: OperationTarget) -> Vec<LedgerEntry> {
        let data = self.read();
        let mut entries: Vec<LedgerEntry> = data
            .records
            .iter()
            .filter(|r| r.target == target)
            .map(|r| {
                let ticket = data.tickets.get(&r.ticket_id);
                let flow = ticket.and_then(|t| t.flow(r.flow_id));
                LedgerEntry {
                    record: r.clone(),
                    ticket_status: ticket.map(|t| t.status),
                    flow_status: flow.map(|f| f.status),
                    holding: matches!((ticket, flow), (Some(t), Some(f)) if holds_target(t, f)),
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.record.flow_id.cmp(&a.record.flow_id))
        });
        entries
    }

    /// Ledger entries still holding `target`.
    ///
    /// An entry holds its target while its ticket is live and its flow is an
    /// execution node in RUNNING or FAILED. Tickets in `exclude` are ignored.
    pub fn active_operations(&self, target: OperationTarget, exclude: &[u64]) -> Vec<ActiveOperation> {
        let data = self.read();
        data.records
            .iter()
            .filter(|r| r.target == target && !exclude.contains(&r.ticket_id))
            .filter_map(|r| {
                let ticket = data.tickets.get(&r.ticket_id)?;
                let flow = ticket.flow(r.flow_id)?;
                if !holds_target(ticket, flow) {
                    return None;
                }
                Some(ActiveOperation {
                    record: r.clone(),
                    flow_status: flow.status,
                    root_id: flow.flow_obj_id.clone(),
                })
            })
            .collect()
    }
}

fn read_snapshot(path: &Path) -> Result<StoreData, SnapshotError> {
    if !path.exists() {
        return Ok(StoreData::default());
    }
    let data = Snapshot::from_file(path)?.data;
    observe_seq(data.max_seq());
    Ok(data)
}

fn holds_target(ticket: &Ticket, flow: &FlowNode) -> bool {
    !ticket.is_terminal() && flow.flow_type.is_inner() && flow.status.is_active()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowType, NewFlow, TicketType};
    use serde_json::json;
    use std::thread;

    fn new_ticket(types: &[FlowType]) -> NewTicket {
        types.iter().fold(
            NewTicket::new("MYSQL_HA_APPLY", "admin", json!({"cluster_id": 42})),
            |t, ft| t.flow(NewFlow::new(*ft, json!({}))),
        )
    }

    fn replenish_todo(ticket: &Ticket) -> NewTodo {
        NewTodo {
            name: "replenish".to_string(),
            ticket_id: ticket.id,
            flow_id: ticket.flows[0].id,
            todo_type: TodoType::ResourceReplenish,
            operators: vec![],
            helpers: vec![],
            context: json!({}),
        }
    }

    #[test]
    fn test_insert_assigns_ids_in_order() {
        let store = FlowStore::new();
        let ticket = store
            .insert_ticket(new_ticket(&[FlowType::Approval, FlowType::InnerFlow]))
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.flows.len(), 2);
        assert!(ticket.flows[0].id < ticket.flows[1].id);
        assert_eq!(ticket.flows[1].position, 1);
        assert!(ticket.flows.iter().all(|f| f.status == FlowStatus::Pending));
    }

    #[test]
    fn test_insert_rejects_empty_flows() {
        let store = FlowStore::new();
        let err = store.insert_ticket(new_ticket(&[])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn test_claim_requires_previous_finished() {
        let store = FlowStore::new();
        let ticket = store
            .insert_ticket(new_ticket(&[FlowType::Pause, FlowType::InnerFlow]))
            .unwrap();
        let (first, second) = (ticket.flows[0].id, ticket.flows[1].id);

        assert!(!store.claim_flow(ticket.id, second).unwrap());
        assert!(store.claim_flow(ticket.id, first).unwrap());
        assert!(!store.claim_flow(ticket.id, first).unwrap());

        store
            .transition_flow(ticket.id, first, &[FlowStatus::Running], FlowStatus::Succeeded)
            .unwrap();
        assert!(store.claim_flow(ticket.id, second).unwrap());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let store = FlowStore::new();
        let ticket = store.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        let flow_id = ticket.flows[0].id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.claim_flow(ticket.id, flow_id).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_transition_flow_cas() {
        let store = FlowStore::new();
        let ticket = store.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        let flow_id = ticket.flows[0].id;
        assert!(!store
            .transition_flow(ticket.id, flow_id, &[FlowStatus::Running], FlowStatus::Failed)
            .unwrap());
        assert!(store
            .transition_flow(ticket.id, flow_id, &[FlowStatus::Pending], FlowStatus::Running)
            .unwrap());
        let err = store
            .transition_flow(ticket.id, flow_id, &[FlowStatus::Running], FlowStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, EngineError::Transition(_)));
    }

    #[test]
    fn test_set_ticket_status_returns_origin() {
        let store = FlowStore::new();
        let ticket = store.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        assert_eq!(
            store.set_ticket_status(ticket.id, TicketStatus::Running).unwrap(),
            Some(TicketStatus::Pending)
        );
        assert_eq!(store.set_ticket_status(ticket.id, TicketStatus::Running).unwrap(), None);
        store.set_ticket_status(ticket.id, TicketStatus::Revoked).unwrap();
        assert_eq!(store.set_ticket_status(ticket.id, TicketStatus::Running).unwrap(), None);
    }

    #[test]
    fn test_ensure_todo_deduplicates_and_reopens() {
        let store = FlowStore::new();
        let ticket = store.insert_ticket(new_ticket(&[FlowType::ResourceApply, FlowType::InnerFlow])).unwrap();

        let (todo, how) = store.ensure_todo(replenish_todo(&ticket)).unwrap();
        assert_eq!(how, TodoEnsure::Created);
        let (again, how) = store.ensure_todo(replenish_todo(&ticket)).unwrap();
        assert_eq!(how, TodoEnsure::Existing);
        assert_eq!(again.id, todo.id);

        store
            .update_todo(todo.id, |t| t.set_status(TodoStatus::DoneSuccess, "alice"))
            .unwrap()
            .unwrap();
        let (reopened, how) = store.ensure_todo(replenish_todo(&ticket)).unwrap();
        assert_eq!(how, TodoEnsure::Reopened);
        assert_eq!(reopened.id, todo.id);
        assert_eq!(reopened.status, TodoStatus::Todo);
        assert_eq!(store.todos_for_ticket(ticket.id).len(), 1);
    }

    #[test]
    fn test_append_records_is_unique() {
        let store = FlowStore::new();
        let record = OperationRecord {
            target: OperationTarget::Cluster(42),
            flow_id: 2,
            ticket_id: 1,
            ticket_type: TicketType::from("MYSQL_HA_APPLY"),
            creator: "admin".to_string(),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(store.append_records(vec![record.clone(), record.clone()]), 1);
        assert_eq!(store.append_records(vec![record]), 0);
        assert_eq!(store.ledger_for_target(OperationTarget::Cluster(42)).len(), 1);
    }

    #[test]
    fn test_active_operations_filters_status_and_type() {
        let store = FlowStore::new();
        let ticket = store
            .insert_ticket(new_ticket(&[FlowType::Pause, FlowType::InnerFlow]))
            .unwrap();
        let inner = ticket.flows[1].id;
        let pause = ticket.flows[0].id;
        let record = |flow_id| OperationRecord {
            target: OperationTarget::Cluster(42),
            flow_id,
            ticket_id: ticket.id,
            ticket_type: ticket.ticket_type.clone(),
            creator: "admin".to_string(),
            created_at: chrono::Utc::now(),
        };
        store.append_records(vec![record(inner), record(pause)]);

        // Pending inner flow does not hold the cluster yet
        assert!(store.active_operations(OperationTarget::Cluster(42), &[]).is_empty());

        store.transition_flow(ticket.id, pause, &[FlowStatus::Pending], FlowStatus::Skipped).unwrap();
        store.claim_flow(ticket.id, inner).unwrap();
        let active = store.active_operations(OperationTarget::Cluster(42), &[]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].record.flow_id, inner);

        assert!(store.active_operations(OperationTarget::Cluster(42), &[ticket.id]).is_empty());

        store.set_ticket_status(ticket.id, TicketStatus::Revoked).unwrap();
        assert!(store.active_operations(OperationTarget::Cluster(42), &[]).is_empty());
    }

    #[test]
    fn test_ledger_for_target_joins_ticket_state() {
        let store = FlowStore::new();
        let ticket = store
            .insert_ticket(
                NewTicket::new("MYSQL_HA_APPLY", "admin", json!({"cluster_id": 42, "instance_ids": [7]}))
                    .flow(NewFlow::new(FlowType::InnerFlow, json!({}))),
            )
            .unwrap();
        let flow_id = ticket.flows[0].id;
        store.claim_flow(ticket.id, flow_id).unwrap();
        store.append_records(crate::exclusive::ledger_entries(&ticket, flow_id));

        let history = store.ledger_for_target(OperationTarget::Instance(7));
        assert_eq!(history.len(), 1);
        assert!(history[0].holding);
        assert_eq!(history[0].flow_status, Some(FlowStatus::Running));

        store
            .transition_flow(ticket.id, flow_id, &[FlowStatus::Running], FlowStatus::Succeeded)
            .unwrap();
        let history = store.ledger_for_target(OperationTarget::Cluster(42));
        assert!(!history[0].holding);
        assert_eq!(history[0].flow_status, Some(FlowStatus::Succeeded));
        assert!(store.ledger_for_target(OperationTarget::Cluster(7)).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FlowStore::new();
        let ticket = store.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        store.save(&path).unwrap();

        let loaded = FlowStore::load(&path).unwrap();
        assert_eq!(loaded.ticket(ticket.id).unwrap().flows.len(), 1);

        // ids keep counting after reload
        let next = loaded.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        assert!(next.id > ticket.flows[0].id);
    }

    #[test]
    fn test_transition_flow_at_needs_unchanged_node() {
        let store = FlowStore::new();
        let ticket = store.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        let flow = &ticket.flows[0];
        assert!(store.claim_flow(ticket.id, flow.id).unwrap());

        // the node was claimed after `flow` was read
        assert!(!store
            .transition_flow_at(ticket.id, flow.id, flow.seq, FlowStatus::Failed)
            .unwrap());
        let current = store.ticket(ticket.id).unwrap().flows[0].seq;
        assert!(store
            .transition_flow_at(ticket.id, flow.id, current, FlowStatus::Failed)
            .unwrap());
    }

    #[test]
    fn test_reload_replaces_shared_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let writer = FlowStore::new();
        let ticket = writer.insert_ticket(new_ticket(&[FlowType::InnerFlow])).unwrap();
        writer.save(&path).unwrap();

        let reader = FlowStore::new();
        let handle = reader.clone();
        reader.reload(&path).unwrap();
        assert!(handle.ticket(ticket.id).is_ok());

        // records touched after a reload stamp higher sequence numbers
        let seq = handle.ticket(ticket.id).unwrap().flows[0].seq;
        handle.claim_flow(ticket.id, ticket.flows[0].id).unwrap();
        assert!(handle.ticket(ticket.id).unwrap().flows[0].seq > seq);

        reader.reload(&dir.path().join("absent.json")).unwrap();
        assert!(handle.tickets_where(|_| true).is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FlowStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(store.tickets_where(|_| true).is_empty());
    }
}
