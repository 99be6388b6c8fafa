//! Concurrent scheduling tests
//!
//! Several callers drive the same ticket at once; every node must start
//! exactly once, and a retry is never undone by a pass that read the node
//! before it.

mod fixtures;

use dbm_ticket_flow::collab::ProcessState;
use dbm_ticket_flow::model::TodoType;
use dbm_ticket_flow::state::{FlowStatus, TicketStatus, TodoStatus};
use flow_protocol::ops::CallbackEvent;
use fixtures::{delivery, inner, ticket, Harness};
use std::collections::BTreeSet;
use std::sync::Barrier;
use std::thread;

const THREADS: usize = 8;

#[test]
fn test_parallel_passes_start_node_once() {
    let h = Harness::new();
    let t = h
        .manager
        .submit_ticket(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart"), delivery()]), false)
        .unwrap();
    assert_eq!(t.status, TicketStatus::Pending);

    let barrier = Barrier::new(THREADS);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                h.manager.run_next_flow(t.id).unwrap()
            });
        }
    });

    assert_eq!(h.mocks.runner.dispatched().len(), 1);
    let t = h.ticket(t.id);
    let active: Vec<_> = t.flows.iter().filter(|f| f.status.is_active()).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(t.flows[1].status, FlowStatus::Pending);
    assert_eq!(t.status, TicketStatus::Running);
}

#[test]
fn test_parallel_callbacks_finish_once() {
    let h = Harness::new();
    let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart"), delivery()]));
    let root_id = h.ticket(t.id).flows[0].flow_obj_id.clone().unwrap();
    h.mocks.runner.set_state(&root_id, ProcessState::Finished);
    let event = CallbackEvent::Process {
        root_id,
        state: ProcessState::Finished.as_str().to_string(),
    };

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| h.manager.handle_callback(t.id, &event).unwrap());
        }
    });

    let t = h.ticket(t.id);
    assert_eq!(t.status, TicketStatus::Succeeded);
    assert!(t.flows.iter().all(|f| f.status == FlowStatus::Succeeded));
    let finished = h
        .mocks
        .notifier
        .sent_for(t.id)
        .into_iter()
        .filter(|n| n.status == TicketStatus::Succeeded)
        .count();
    assert_eq!(finished, 1);
}

#[test]
fn test_parallel_submissions_get_distinct_ids() {
    let h = Harness::new();
    let ids: BTreeSet<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS as u64)
            .map(|i| {
                let h = &h;
                s.spawn(move || h.submit(ticket("MYSQL_RESTART", 100 + i, vec![inner("mysql.restart")])).id)
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert_eq!(ids.len(), THREADS);
    assert_eq!(h.mocks.runner.dispatched().len(), THREADS);
}

#[test]
fn test_retry_racing_sync_passes_stays_running() {
    for _ in 0..10 {
        let h = Harness::new();
        let t = h.submit(ticket("MYSQL_RESTART", 7, vec![inner("mysql.restart"), delivery()]));
        assert_eq!(h.finish_process(t.id, ProcessState::Failed), TicketStatus::Failed);
        let flow_id = t.flows[0].id;

        let barrier = Barrier::new(THREADS);
        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                h.manager.retry_flow(t.id, flow_id, "alice").unwrap()
            });
            for _ in 1..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    h.manager.run_next_flow(t.id).unwrap()
                });
            }
        });

        let after = h.ticket(t.id);
        assert_eq!(after.flows[0].status, FlowStatus::Running);
        assert_eq!(after.flows[0].err_code, None);
        assert_eq!(after.status, TicketStatus::Running);
        assert_eq!(h.mocks.runner.retried().len(), 1);
        let todos = h.todos(t.id, TodoType::ExecutionFailed);
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].status, TodoStatus::InProgress);
    }
}
