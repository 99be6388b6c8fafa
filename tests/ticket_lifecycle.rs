//! Ticket lifecycle tests
//!
//! Drives tickets end to end through the flow manager with simulated
//! collaborators:
//! - approval → execution → delivery, approved and rejected
//! - execution failure, failure todo and retry
//! - pause confirmation and termination
//! - revocation, skipped human stages and the execution variants
//! - describe task and timer stages

mod fixtures;

use dbm_ticket_flow::collab::{NotifyEvent, ProcessState};
use dbm_ticket_flow::config::EngineSettings;
use dbm_ticket_flow::model::{FlowErrCode, FlowType, NewFlow, TodoAction, TodoType};
use dbm_ticket_flow::state::{FlowStatus, TicketStatus, TodoStatus};
use dbm_ticket_flow::{EngineError, Reconciler};
use fixtures::{approval, delivery, inner, pause, ticket, Harness};
use serde_json::json;

// =============================================================================
// Approval → execution → delivery
// =============================================================================

#[test]
fn test_approved_ticket_runs_to_success() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![approval(), inner("mysql.ha_apply"), delivery()]));
    assert_eq!(t.status, TicketStatus::AwaitingApproval);

    let approves = h.todos(t.id, TodoType::Approve);
    assert_eq!(approves.len(), 1);
    assert_eq!(approves[0].operators, vec!["dba-1".to_string(), "dba-2".to_string()]);
    assert!(h
        .mocks
        .notifier
        .sent_for(t.id)
        .iter()
        .any(|n| n.event == NotifyEvent::StatusChanged && n.status == TicketStatus::AwaitingApproval));

    assert_eq!(h.decide_approval(t.id, true), TicketStatus::Running);
    let t = h.ticket(t.id);
    assert_eq!(t.flows[0].status, FlowStatus::Succeeded);
    assert_eq!(t.flows[1].status, FlowStatus::Running);
    assert_eq!(h.todos(t.id, TodoType::Approve)[0].status, TodoStatus::DoneSuccess);

    let dispatched = h.mocks.runner.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].controller, "mysql.ha_apply");
    assert_eq!(Some(dispatched[0].root_id.clone()), t.flows[1].flow_obj_id);

    assert_eq!(h.finish_process(t.id, ProcessState::Finished), TicketStatus::Succeeded);
    let t = h.ticket(t.id);
    assert!(t.flows.iter().all(|f| f.status == FlowStatus::Succeeded));
}

#[test]
fn test_rejected_approval_terminates_ticket() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![approval(), inner("mysql.ha_apply")]));

    assert_eq!(h.decide_approval(t.id, false), TicketStatus::Terminated);
    let t = h.ticket(t.id);
    assert_eq!(t.flows[0].status, FlowStatus::Terminated);
    assert_eq!(t.flows[1].status, FlowStatus::Pending);
    assert!(h.mocks.runner.dispatched().is_empty());
    assert_eq!(h.todos(t.id, TodoType::Approve)[0].status, TodoStatus::DoneFailed);
}

#[test]
fn test_approve_todo_forwards_decision() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![approval(), inner("mysql.ha_apply")]));
    let todo = h.todos(t.id, TodoType::Approve).remove(0);

    let todo = h
        .manager
        .process_todo(todo.id, TodoAction::Approve, "dba-1", json!({}))
        .unwrap();
    assert_eq!(todo.status, TodoStatus::InProgress);
    assert_eq!(todo.history.len(), 1);
    // nothing moves until the approval system calls back
    assert_eq!(h.status(t.id), TicketStatus::AwaitingApproval);

    assert_eq!(h.decide_approval(t.id, true), TicketStatus::Running);
}

// =============================================================================
// Execution failure and retry
// =============================================================================

#[test]
fn test_failed_process_opens_one_todo_and_retries() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart"), delivery()]));
    assert_eq!(t.status, TicketStatus::Running);

    assert_eq!(h.finish_process(t.id, ProcessState::Failed), TicketStatus::Failed);
    // repeated passes must not duplicate the todo
    h.manager.run_next_flow(t.id).unwrap();
    h.manager.run_next_flow(t.id).unwrap();

    let failures = h.todos(t.id, TodoType::ExecutionFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operators, vec!["alice".to_string()]);
    assert_eq!(failures[0].status, TodoStatus::Todo);
    let flow = &h.ticket(t.id).flows[0];
    assert_eq!(flow.err_code, Some(FlowErrCode::GenericExecutionFailure));
    assert!(h
        .mocks
        .notifier
        .sent_for(t.id)
        .iter()
        .any(|n| n.event == NotifyEvent::FlowFailed));

    let todo = h
        .manager
        .process_todo(failures[0].id, TodoAction::Retry, "alice", json!({}))
        .unwrap();
    assert_eq!(todo.status, TodoStatus::InProgress);
    assert_eq!(h.status(t.id), TicketStatus::Running);
    assert_eq!(h.mocks.runner.retried().len(), 1);

    assert_eq!(h.finish_process(t.id, ProcessState::Finished), TicketStatus::Succeeded);
    assert_eq!(h.todos(t.id, TodoType::ExecutionFailed)[0].status, TodoStatus::DoneSuccess);
}

#[test]
fn test_retry_of_non_failed_flow_is_rejected() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart")]));
    let flow_id = t.flows[0].id;

    let err = h.manager.retry_flow(t.id, flow_id, "alice").unwrap_err();
    assert!(matches!(err, EngineError::Transition(_)));
}

#[test]
fn test_missing_controller_fails_with_generic_error() {
    let h = Harness::new();
    let broken = NewFlow::new(FlowType::InnerFlow, json!({}));
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![broken]));

    assert_eq!(t.status, TicketStatus::Failed);
    assert_eq!(t.flows[0].err_code, Some(FlowErrCode::GenericExecutionFailure));
    assert_eq!(h.todos(t.id, TodoType::ExecutionFailed).len(), 1);
}

#[test]
fn test_terminate_failure_todo_terminates_ticket() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart")]));
    h.finish_process(t.id, ProcessState::Failed);
    let todo = h.todos(t.id, TodoType::ExecutionFailed).remove(0);

    let todo = h
        .manager
        .process_todo(todo.id, TodoAction::Terminate, "alice", json!({"reason": "give up"}))
        .unwrap();
    assert_eq!(todo.status, TodoStatus::DoneFailed);
    assert_eq!(h.status(t.id), TicketStatus::Terminated);
    assert_eq!(h.ticket(t.id).flows[0].status, FlowStatus::Terminated);
}

// =============================================================================
// Pause
// =============================================================================

#[test]
fn test_pause_confirm_advances() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![pause(), inner("mysql.ha_apply")]));
    assert_eq!(t.status, TicketStatus::AwaitingConfirm);
    let todo = h.todos(t.id, TodoType::ManualConfirm).remove(0);
    assert_eq!(todo.operators, vec!["alice".to_string()]);

    let err = h
        .manager
        .process_todo(todo.id, TodoAction::Approve, "mallory", json!({}))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));

    // administrators may act as helpers
    let todo = h
        .manager
        .process_todo(todo.id, TodoAction::Approve, "dba-2", json!({}))
        .unwrap();
    assert_eq!(todo.status, TodoStatus::DoneSuccess);
    assert_eq!(todo.done_by.as_deref(), Some("dba-2"));
    assert_eq!(h.status(t.id), TicketStatus::Running);
    assert_eq!(h.mocks.runner.dispatched().len(), 1);

    let err = h
        .manager
        .process_todo(todo.id, TodoAction::Approve, "alice", json!({}))
        .unwrap_err();
    assert!(matches!(err, EngineError::TodoDone(_)));
}

#[test]
fn test_pause_terminate_and_wrong_action() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![pause(), inner("mysql.ha_apply")]));
    let todo = h.todos(t.id, TodoType::ManualConfirm).remove(0);

    let err = h
        .manager
        .process_todo(todo.id, TodoAction::Retry, "alice", json!({}))
        .unwrap_err();
    assert!(matches!(err, EngineError::ActionNotAllowed { .. }));

    h.manager
        .process_todo(todo.id, TodoAction::Terminate, "alice", json!({}))
        .unwrap();
    assert_eq!(h.status(t.id), TicketStatus::Terminated);
    assert!(h.mocks.runner.dispatched().is_empty());
}

// =============================================================================
// Revocation and configuration
// =============================================================================

#[test]
fn test_revoke_cancels_running_process() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart"), delivery()]));
    let root_id = h.ticket(t.id).flows[0].flow_obj_id.clone().unwrap();

    assert!(h.manager.revoke_ticket(t.id, "bob", FlowErrCode::UserRevoked).unwrap());
    let t = h.ticket(t.id);
    assert_eq!(t.status, TicketStatus::Revoked);
    assert_eq!(t.flows[0].status, FlowStatus::Revoked);
    assert_eq!(t.flows[0].err_code, Some(FlowErrCode::UserRevoked));
    assert_eq!(t.flows[1].status, FlowStatus::Pending);
    assert_eq!(h.mocks.runner.revoked(), vec![root_id]);

    // a late process report changes nothing
    assert_eq!(h.manager.run_next_flow(t.id).unwrap(), TicketStatus::Revoked);
    assert!(!h.manager.revoke_ticket(t.id, "bob", FlowErrCode::UserRevoked).unwrap());
}

#[test]
fn test_skip_human_stages() {
    let mut settings: EngineSettings = fixtures::settings();
    settings.skip_human_stages = true;
    let h = Harness::with_settings(settings);

    let t = h.submit(ticket("MYSQL_HA_APPLY", 42, vec![approval(), pause(), inner("mysql.ha_apply")]));
    assert_eq!(t.flows[0].status, FlowStatus::Skipped);
    assert_eq!(t.flows[1].status, FlowStatus::Skipped);
    assert_eq!(t.flows[2].status, FlowStatus::Running);
    assert!(h.mocks.approval.sns_for(t.id).is_empty());
}

#[test]
fn test_quick_and_ignore_result_execution() {
    let h = Harness::new();
    let quick = NewFlow::new(FlowType::QuickInnerFlow, json!({"controller": "mysql.flush"}));
    let t = h.submit(ticket("MYSQL_FLUSH", 9, vec![quick, delivery()]));
    assert_eq!(t.status, TicketStatus::Succeeded);

    let ignore = NewFlow::new(FlowType::IgnoreResultInnerFlow, json!({"controller": "mysql.checksum"}));
    let t = h.submit(ticket("MYSQL_CHECKSUM", 10, vec![ignore, delivery()]));
    assert_eq!(t.status, TicketStatus::Running);
    assert_eq!(h.finish_process(t.id, ProcessState::Failed), TicketStatus::Succeeded);
    assert!(h.todos(t.id, TodoType::ExecutionFailed).is_empty());
}

#[test]
fn test_ignore_result_moves_on_after_revoked_process() {
    let h = Harness::new();
    let ignore = NewFlow::new(FlowType::IgnoreResultInnerFlow, json!({"controller": "mysql.checksum"}));
    let t = h.submit(ticket("MYSQL_CHECKSUM", 10, vec![ignore, inner("mysql.report")]));
    assert_eq!(h.finish_process(t.id, ProcessState::Revoked), TicketStatus::Running);

    let ticket = h.ticket(t.id);
    assert_eq!(ticket.flows[0].status, FlowStatus::Succeeded);
    assert_eq!(ticket.flows[1].status, FlowStatus::Running);
    assert_eq!(h.mocks.runner.dispatched().len(), 2);
}

// =============================================================================
// Describe task and timer stages
// =============================================================================

#[test]
fn test_describe_task_lists_processes() {
    let h = Harness::new();
    let describe = NewFlow::new(FlowType::DescribeTask, json!({}));
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart"), describe]));
    assert_eq!(h.finish_process(t.id, ProcessState::Finished), TicketStatus::Succeeded);

    let ticket = h.ticket(t.id);
    let tasks = ticket.flows[1].details["tasks"].as_array().unwrap().clone();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["flow_id"], ticket.flows[0].id);
    assert_eq!(tasks[0]["root_id"], ticket.flows[0].flow_obj_id.clone().unwrap());
    assert_eq!(tasks[0]["status"], "SUCCEEDED");
}

#[test]
fn test_timer_waits_for_trigger_time() {
    let h = Harness::new();
    let at = chrono::Utc::now() + chrono::Duration::hours(1);
    let timer = NewFlow::new(FlowType::Timer, json!({"trigger_time": at.to_rfc3339()}));
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![timer, inner("mysql.restart")]));
    assert_eq!(t.status, TicketStatus::Running);
    assert_eq!(t.flows[0].status, FlowStatus::Running);
    assert!(h.mocks.runner.dispatched().is_empty());

    let reconciler = Reconciler::new(&h.manager);
    assert!(reconciler.fire_due_timers(at - chrono::Duration::minutes(1)).fired.is_empty());
    assert_eq!(reconciler.fire_due_timers(at).fired, vec![t.id]);

    let ticket = h.ticket(t.id);
    assert_eq!(ticket.flows[0].status, FlowStatus::Succeeded);
    assert_eq!(ticket.flows[1].status, FlowStatus::Running);
    assert_eq!(h.mocks.runner.dispatched().len(), 1);
    assert!(reconciler.fire_due_timers(at).fired.is_empty());
}

#[test]
fn test_past_timer_and_bad_timer() {
    let h = Harness::new();
    let past = NewFlow::new(FlowType::Timer, json!({"trigger_time": "2020-01-01T00:00:00Z"}));
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![past, delivery()]));
    assert_eq!(t.status, TicketStatus::Succeeded);

    let broken = NewFlow::new(FlowType::Timer, json!({"trigger_time": "soon"}));
    let t = h.submit(ticket("MYSQL_RESTART", 8, vec![broken, delivery()]));
    assert_eq!(t.status, TicketStatus::Failed);
    assert_eq!(t.flows[0].err_code, Some(FlowErrCode::GenericExecutionFailure));
}

#[test]
fn test_repeated_passes_dispatch_once() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart")]));
    for _ in 0..5 {
        assert_eq!(h.manager.run_next_flow(t.id).unwrap(), TicketStatus::Running);
    }
    assert_eq!(h.mocks.runner.dispatched().len(), 1);
}
