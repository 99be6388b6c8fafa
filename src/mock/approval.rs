//! Simulated approval system.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::failure::{FailureConfig, FailureInjector, MockCall};
use crate::collab::{ApprovalService, CollabError};
use crate::model::Ticket;

/// Lifecycle of a simulated approval ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalState {
    Open,
    Decided { approved: bool, operator: String },
    Withdrawn,
}

#[derive(Debug, Default)]
struct ApprovalInner {
    tickets: HashMap<String, (u64, String, ApprovalState)>,
    id_counter: u64,
}

/// In-memory approval system. Decisions are recorded; the resolution
/// reaches the engine only through a callback.
#[derive(Debug, Clone, Default)]
pub struct MockApproval {
    inner: Arc<Mutex<ApprovalInner>>,
    failures: Arc<Mutex<FailureInjector>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockApproval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_failure(&self, call: MockCall, config: FailureConfig) {
        lock(&self.failures).inject(call, config);
    }

    pub fn state(&self, sn: &str) -> Option<ApprovalState> {
        lock(&self.inner).tickets.get(sn).map(|(_, _, s)| s.clone())
    }

    /// Callback URL registered for an approval ticket.
    pub fn callback_url(&self, sn: &str) -> Option<String> {
        lock(&self.inner).tickets.get(sn).map(|(_, url, _)| url.clone())
    }

    /// Serial numbers opened for a ticket.
    pub fn sns_for(&self, ticket_id: u64) -> Vec<String> {
        let mut sns: Vec<String> = lock(&self.inner)
            .tickets
            .iter()
            .filter(|(_, (id, _, _))| *id == ticket_id)
            .map(|(sn, _)| sn.clone())
            .collect();
        sns.sort();
        sns
    }
}

impl ApprovalService for MockApproval {
    fn create(&self, ticket: &Ticket, _payload: &Value, callback_url: &str) -> Result<String, CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ApprovalCreate) {
            return Err(err);
        }
        let mut inner = lock(&self.inner);
        inner.id_counter += 1;
        let sn = format!("SN-{:08x}", inner.id_counter);
        inner
            .tickets
            .insert(sn.clone(), (ticket.id, callback_url.to_string(), ApprovalState::Open));
        Ok(sn)
    }

    fn decide(&self, sn: &str, approved: bool, operator: &str) -> Result<(), CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ApprovalDecide) {
            return Err(err);
        }
        let mut inner = lock(&self.inner);
        let entry = inner.tickets.get_mut(sn).ok_or_else(|| CollabError::Service {
            service: "approval",
            code: 404,
            message: format!("unknown sn {}", sn),
        })?;
        entry.2 = ApprovalState::Decided {
            approved,
            operator: operator.to_string(),
        };
        Ok(())
    }

    fn withdraw(&self, sn: &str, _operator: &str) -> Result<(), CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ApprovalWithdraw) {
            return Err(err);
        }
        if let Some(entry) = lock(&self.inner).tickets.get_mut(sn) {
            entry.2 = ApprovalState::Withdrawn;
        }
        Ok(())
    }
}
