//! Periodic reconciler.
//!
//! Three sweeps run against the store:
//! - exclusive retry: nodes failed with `AUTO_EXCLUSIVE_ERROR` go back
//!   through their handler's retry path, which re-checks the exclusivity
//!   matrix and fails again with the same code while the conflict lasts;
//! - timers: running timer nodes whose trigger time has passed complete and
//!   their ticket moves on;
//! - expiry: tickets left waiting longer than their type's thresholds are
//!   revoked with `SYSTEM_REVOKED`, at most `expire_batch` per sweep.
//!
//! Every ticket is handled on its own; a failure is logged and counted and
//! the sweep moves on. A reconciler bound to a [`StateFile`] reloads the
//! snapshot under its lock before each pass and writes it back after, so a
//! long-running loop never replays stale state over another process's writes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::EngineSettings;
use crate::model::{FlowErrCode, FlowType, Ticket, Todo, TodoType};
use crate::observability::sweep_span;
use crate::scheduler::FlowManager;
use crate::stage::trigger_time;
use crate::state::FlowStatus;
use crate::store::StateFile;

/// Outcome of one or more sweeps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Tickets whose mutex-blocked node was retried
    pub retried: Vec<u64>,
    /// Tickets revoked for age
    pub expired: Vec<u64>,
    /// Tickets whose timer fired
    #[serde(default)]
    pub fired: Vec<u64>,
    pub failures: u32,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.retried.extend(other.retried);
        self.fired.extend(other.fired);
        self.expired.extend(other.expired);
        self.failures += other.failures;
    }
}

/// Why a ticket is considered stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireCategory {
    /// Approval node still waiting for a decision
    Approval,
    /// Failed execution node or an unanswered pause
    ExecutionFailed,
    /// Unanswered approval or replenish todo
    Todo,
}

impl ExpireCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpireCategory::Approval => "approval",
            ExpireCategory::ExecutionFailed => "execution_failed",
            ExpireCategory::Todo => "todo",
        }
    }
}

pub struct Reconciler<'a> {
    manager: &'a FlowManager,
    state: Option<StateFile>,
}

impl<'a> Reconciler<'a> {
    pub fn new(manager: &'a FlowManager) -> Self {
        Self { manager, state: None }
    }

    /// Run every loop pass inside a locked reload and save of `state`.
    pub fn with_state_file(mut self, state: StateFile) -> Self {
        self.state = Some(state);
        self
    }

    /// Run `pass` against the latest store contents.
    fn against_store(&self, pass: impl FnOnce() -> SweepReport) -> SweepReport {
        let Some(state) = &self.state else {
            return pass();
        };
        match state.locked(self.manager.store(), pass) {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(path = %state.path().display(), error = %err, "sweep skipped");
                SweepReport {
                    failures: 1,
                    ..SweepReport::default()
                }
            }
        }
    }

    /// Retry every node blocked only by a mutex conflict.
    pub fn retry_exclusive_flows(&self) -> SweepReport {
        let _span = sweep_span("exclusive_retry").entered();
        let store = self.manager.store();
        let operator = self.manager.settings().system_operator.clone();
        let mut report = SweepReport::default();

        for (ticket_id, flow_id) in store.mutex_blocked_flows() {
            match self.manager.retry_flow(ticket_id, flow_id, &operator) {
                Ok(status) => {
                    tracing::debug!(ticket_id, flow_id, status = %status, "mutex retry");
                    report.retried.push(ticket_id);
                }
                Err(err) => {
                    tracing::warn!(ticket_id, flow_id, error = %err, "mutex retry failed");
                    report.failures += 1;
                }
            }
        }
        if !report.retried.is_empty() {
            tracing::info!(retried = report.retried.len(), "exclusive retry sweep done");
        }
        report
    }

    /// Complete running timer nodes due at `now`.
    pub fn fire_due_timers(&self, now: DateTime<Utc>) -> SweepReport {
        let _span = sweep_span("timer").entered();
        let mut report = SweepReport::default();
        let armed = self.manager.store().tickets_where(|t| {
            !t.is_terminal()
                && t.flows
                    .iter()
                    .any(|f| f.flow_type == FlowType::Timer && f.status == FlowStatus::Running)
        });
        for ticket in armed {
            let timers = ticket
                .flows
                .iter()
                .filter(|f| f.flow_type == FlowType::Timer && f.status == FlowStatus::Running);
            for flow in timers {
                match trigger_time(flow) {
                    Ok(at) if at <= now => match self.manager.fire_timer(ticket.id, flow.id) {
                        Ok(status) => {
                            tracing::debug!(ticket_id = ticket.id, flow_id = flow.id, status = %status, "timer sweep");
                            report.fired.push(ticket.id);
                        }
                        Err(err) => {
                            tracing::warn!(ticket_id = ticket.id, flow_id = flow.id, error = %err, "timer fire failed");
                            report.failures += 1;
                        }
                    },
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(ticket_id = ticket.id, flow_id = flow.id, error = %err, "unreadable timer");
                        report.failures += 1;
                    }
                }
            }
        }
        report
    }

    /// Tickets past one of their expiry thresholds at `now`, oldest id first.
    pub fn stale_tickets(&self, now: DateTime<Utc>) -> Vec<(u64, ExpireCategory)> {
        let settings = self.manager.settings();
        let store = self.manager.store();
        let todos = store.open_todos_of(&[TodoType::Approve, TodoType::ResourceReplenish, TodoType::ManualConfirm]);

        let mut seen = BTreeSet::new();
        let mut stale = Vec::new();
        for ticket in store.tickets_where(|t| !t.is_terminal()) {
            let ticket_todos: Vec<&Todo> = todos.iter().filter(|t| t.ticket_id == ticket.id).collect();
            if let Some(category) = expire_category(&settings, &ticket, &ticket_todos, now) {
                if seen.insert(ticket.id) {
                    stale.push((ticket.id, category));
                }
            }
        }
        stale
    }

    /// Revoke stale tickets, at most one batch per call.
    pub fn expire_stale_tickets(&self, now: DateTime<Utc>) -> SweepReport {
        let _span = sweep_span("expire").entered();
        let batch = self.manager.settings().reconciler.expire_batch;
        let operator = self.manager.settings().system_operator.clone();
        let mut report = SweepReport::default();

        let stale = self.stale_tickets(now);
        if stale.len() > batch {
            tracing::info!(stale = stale.len(), batch, "expiry backlog exceeds batch");
        }
        for (ticket_id, category) in stale.into_iter().take(batch) {
            match self
                .manager
                .revoke_ticket(ticket_id, &operator, FlowErrCode::SystemRevoked)
            {
                Ok(true) => {
                    tracing::info!(ticket_id, category = category.as_str(), "ticket expired");
                    report.expired.push(ticket_id);
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(ticket_id, error = %err, "expiry revoke failed");
                    report.failures += 1;
                }
            }
        }
        report
    }

    /// One full pass: exclusive retry, timers, then expiry.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.against_store(|| {
            let mut report = self.retry_exclusive_flows();
            report.merge(self.fire_due_timers(now));
            report.merge(self.expire_stale_tickets(now));
            report
        })
    }

    /// Sweep until `stop` is set.
    ///
    /// The exclusive retry and timer sweeps run every `interval`; expiry runs
    /// on the first pass and then every `reconciler.expire_interval_seconds`.
    pub fn run_loop(&self, interval: Duration, stop: &AtomicBool, mut on_sweep: impl FnMut(&SweepReport)) {
        let mut last_expire: Option<Instant> = None;
        while !stop.load(Ordering::SeqCst) {
            let expire_every = self.manager.settings().reconciler.expire_interval();
            let expire = last_expire.map_or(true, |at| at.elapsed() >= expire_every);
            let report = self.against_store(|| {
                let now = Utc::now();
                let mut report = self.retry_exclusive_flows();
                report.merge(self.fire_due_timers(now));
                if expire {
                    report.merge(self.expire_stale_tickets(now));
                }
                report
            });
            if expire {
                last_expire = Some(Instant::now());
            }
            on_sweep(&report);

            let started = Instant::now();
            while started.elapsed() < interval && !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50).min(interval));
            }
        }
        tracing::info!("reconcile loop stopped");
    }
}

/// First expiry category `ticket` falls into, if any.
fn expire_category(
    settings: &EngineSettings,
    ticket: &Ticket,
    todos: &[&Todo],
    now: DateTime<Utc>,
) -> Option<ExpireCategory> {
    let thresholds = settings.thresholds_for(ticket.ticket_type.as_str());
    let cutoff = |days: Option<i64>| -> Option<DateTime<Utc>> {
        match days {
            Some(days) if days >= 0 => Some(now - ChronoDuration::days(days)),
            _ => None,
        }
    };

    if let Some(cutoff) = cutoff(thresholds.approval_days) {
        let waiting = ticket
            .flows
            .iter()
            .any(|f| f.flow_type == FlowType::Approval && f.status == FlowStatus::Running && f.updated_at < cutoff);
        if waiting {
            return Some(ExpireCategory::Approval);
        }
    }

    if let Some(cutoff) = cutoff(thresholds.execution_failed_days) {
        let failed = ticket.flows.iter().any(|f| {
            f.flow_type.is_inner() && f.status == FlowStatus::Failed && !f.is_mutex_blocked() && f.updated_at < cutoff
        });
        let paused = todos
            .iter()
            .any(|t| t.todo_type == TodoType::ManualConfirm && t.updated_at < cutoff);
        if failed || paused {
            return Some(ExpireCategory::ExecutionFailed);
        }
    }

    if let Some(cutoff) = cutoff(thresholds.todo_days) {
        let waiting = todos.iter().any(|t| {
            matches!(t.todo_type, TodoType::Approve | TodoType::ResourceReplenish) && t.updated_at < cutoff
        });
        if waiting {
            return Some(ExpireCategory::Todo);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, SettingsHandle};
    use crate::mock::MockServices;
    use crate::model::{NewFlow, NewTicket};
    use crate::state::TicketStatus;
    use crate::store::FlowStore;
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> FlowManager {
        let settings = EngineSettings::builtin().unwrap();
        FlowManager::new(
            FlowStore::new(),
            Arc::new(SettingsHandle::fixed(settings)),
            MockServices::new().services(),
        )
    }

    fn approval_ticket(manager: &FlowManager) -> u64 {
        let new = NewTicket::new("MYSQL_HA_APPLY", "alice", json!({"cluster_id": 1}))
            .flow(NewFlow::new(FlowType::Approval, json!({})));
        manager.submit_ticket(new, true).unwrap().id
    }

    #[test]
    fn test_young_approval_is_untouched() {
        let manager = manager();
        let id = approval_ticket(&manager);
        let report = Reconciler::new(&manager).expire_stale_tickets(Utc::now() + ChronoDuration::days(6));
        assert!(report.expired.is_empty());
        assert_eq!(manager.store().ticket(id).unwrap().status, TicketStatus::AwaitingApproval);
    }

    #[test]
    fn test_old_approval_is_revoked() {
        let manager = manager();
        let id = approval_ticket(&manager);
        let report = Reconciler::new(&manager).expire_stale_tickets(Utc::now() + ChronoDuration::days(8));
        assert_eq!(report.expired, vec![id]);

        let ticket = manager.store().ticket(id).unwrap();
        assert_eq!(ticket.status, TicketStatus::Revoked);
        assert_eq!(ticket.flows[0].status, FlowStatus::Revoked);
        assert_eq!(ticket.flows[0].err_code, Some(FlowErrCode::SystemRevoked));
    }

    #[test]
    fn test_negative_threshold_never_expires() {
        let mut settings = EngineSettings::builtin().unwrap();
        settings.expire.entry("default".to_string()).or_default().approval_days = Some(-1);
        let manager = FlowManager::new(
            FlowStore::new(),
            Arc::new(SettingsHandle::fixed(settings)),
            MockServices::new().services(),
        );
        approval_ticket(&manager);
        let stale = Reconciler::new(&manager).stale_tickets(Utc::now() + ChronoDuration::days(365));
        // the approve todo still counts under the todo threshold
        assert!(stale.iter().all(|(_, c)| *c == ExpireCategory::Todo));
    }

    #[test]
    fn test_expiry_is_bounded_by_batch() {
        let mut settings = EngineSettings::builtin().unwrap();
        settings.reconciler.expire_batch = 2;
        let manager = FlowManager::new(
            FlowStore::new(),
            Arc::new(SettingsHandle::fixed(settings)),
            MockServices::new().services(),
        );
        for _ in 0..5 {
            approval_ticket(&manager);
        }
        let reconciler = Reconciler::new(&manager);
        let later = Utc::now() + ChronoDuration::days(30);
        assert_eq!(reconciler.expire_stale_tickets(later).expired.len(), 2);
        assert_eq!(reconciler.expire_stale_tickets(later).expired.len(), 2);
        assert_eq!(reconciler.expire_stale_tickets(later).expired.len(), 1);
        assert!(reconciler.expire_stale_tickets(later).expired.is_empty());
    }

    #[test]
    fn test_run_loop_stops_on_flag() {
        let manager = manager();
        let stop = AtomicBool::new(false);
        let mut sweeps = 0;
        Reconciler::new(&manager).run_loop(Duration::from_millis(1), &stop, |_| {
            sweeps += 1;
            if sweeps == 3 {
                stop.store(true, Ordering::SeqCst);
            }
        });
        assert_eq!(sweeps, 3);
    }
}
