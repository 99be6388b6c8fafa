//! Cluster mutual exclusion tests
//!
//! Two tickets on the same cluster: the later one waits on the mutex,
//! shows as running, and dispatches once the reconciler finds the cluster
//! free again.

mod fixtures;

use dbm_ticket_flow::collab::ProcessState;
use dbm_ticket_flow::model::{FlowErrCode, TodoType};
use dbm_ticket_flow::state::{FlowStatus, TicketStatus};
use dbm_ticket_flow::Reconciler;
use chrono::Utc;
use flow_exclusive::ExclusivityMatrix;
use fixtures::{approval, inner, ticket, Harness};

// =============================================================================
// Conflicting ticket types
// =============================================================================

#[test]
fn test_conflicting_ticket_waits_for_holder() {
    let h = Harness::new();
    let holder = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![inner("mysql.ha_apply")]));
    assert_eq!(holder.status, TicketStatus::Running);

    let waiting = h.submit(ticket("MYSQL_RESTART", 42, vec![approval(), inner("mysql.restart")]));
    assert_eq!(h.decide_approval(waiting.id, true), TicketStatus::Running);

    let node = h.ticket(waiting.id).flows[1].clone();
    assert_eq!(node.status, FlowStatus::Failed);
    assert_eq!(node.err_code, Some(FlowErrCode::AutoExclusiveError));
    assert!(node.is_mutex_blocked());
    assert!(h.todos(waiting.id, TodoType::ExecutionFailed).is_empty());
    assert_eq!(h.mocks.runner.dispatched().len(), 1);

    let view = h.manager.view(waiting.id).unwrap();
    assert_eq!(view.derived_status(node.id), Some(FlowStatus::Running));
}

#[test]
fn test_reconciler_dispatches_after_holder_finishes() {
    let h = Harness::new();
    let holder = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![inner("mysql.ha_apply")]));
    let waiting = h.submit(ticket("MYSQL_RESTART", 42, vec![inner("mysql.restart")]));
    assert_eq!(waiting.status, TicketStatus::Running);

    let reconciler = Reconciler::new(&h.manager);
    // still held: the retry fails again with the same code
    let report = reconciler.retry_exclusive_flows();
    assert_eq!(report.retried, vec![waiting.id]);
    assert_eq!(report.failures, 0);
    let node = h.ticket(waiting.id).flows[0].clone();
    assert!(node.is_mutex_blocked());
    assert_eq!(h.mocks.runner.dispatched().len(), 1);

    assert_eq!(h.finish_process(holder.id, ProcessState::Finished), TicketStatus::Succeeded);

    let report = reconciler.sweep(Utc::now());
    assert_eq!(report.retried, vec![waiting.id]);
    let node = h.ticket(waiting.id).flows[0].clone();
    assert_eq!(node.status, FlowStatus::Running);
    assert!(node.err_code.is_none());
    assert_eq!(h.mocks.runner.dispatched().len(), 2);
    assert_eq!(h.mocks.runner.dispatched()[1].controller, "mysql.restart");

    // nothing left to retry
    assert!(reconciler.retry_exclusive_flows().retried.is_empty());
}

#[test]
fn test_other_cluster_is_free() {
    let h = Harness::new();
    h.submit(ticket("MYSQL_HA_APPLY", 42, vec![inner("mysql.ha_apply")]));
    let other = h.submit(ticket("MYSQL_RESTART", 43, vec![inner("mysql.restart")]));
    assert!(h.ticket(other.id).flows[0].err_code.is_none());
    assert_eq!(h.mocks.runner.dispatched().len(), 2);
}

#[test]
fn test_revoked_holder_releases_cluster() {
    let h = Harness::new();
    let holder = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![inner("mysql.ha_apply")]));
    let waiting = h.submit(ticket("MYSQL_RESTART", 42, vec![inner("mysql.restart")]));
    assert!(h.ticket(waiting.id).flows[0].is_mutex_blocked());

    h.manager
        .revoke_ticket(holder.id, "bob", FlowErrCode::UserRevoked)
        .unwrap();
    Reconciler::new(&h.manager).retry_exclusive_flows();
    assert_eq!(h.ticket(waiting.id).flows[0].status, FlowStatus::Running);
    assert_eq!(h.mocks.runner.dispatched().len(), 2);
}

// =============================================================================
// Compatible ticket types
// =============================================================================

#[test]
fn test_compatible_types_run_together() {
    let matrix = ExclusivityMatrix::new().with("MYSQL_CHECKSUM", "MYSQL_HA_APPLY", false);
    let h = Harness::with_matrix(matrix);
    h.submit(ticket("MYSQL_HA_APPLY", 42, vec![inner("mysql.ha_apply")]));

    let checksum = h.submit(ticket("MYSQL_CHECKSUM", 42, vec![inner("mysql.checksum")]));
    assert_eq!(checksum.status, TicketStatus::Running);
    assert!(checksum.flows[0].err_code.is_none());
    assert_eq!(h.mocks.runner.dispatched().len(), 2);

    // the matrix is directional: HA_APPLY has no entry against CHECKSUM
    let h = Harness::with_matrix(ExclusivityMatrix::new().with("MYSQL_CHECKSUM", "MYSQL_HA_APPLY", false));
    h.submit(ticket("MYSQL_CHECKSUM", 50, vec![inner("mysql.checksum")]));
    let ha = h.submit(ticket("MYSQL_HA_APPLY", 50, vec![inner("mysql.ha_apply")]));
    assert!(h.ticket(ha.id).flows[0].is_mutex_blocked());
    assert_eq!(h.mocks.runner.dispatched().len(), 1);
}
