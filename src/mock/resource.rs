//! Simulated resource pool.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::failure::{FailureConfig, FailureInjector, MockCall};
use crate::collab::{ApplyRequest, ApplyResponse, CollabError, HostAssignment, ResourceService};

#[derive(Debug, Default)]
struct PoolInner {
    /// Free hosts per spec id; `None` means unlimited
    capacity: Option<BTreeMap<u64, u32>>,
    /// Responses by idempotency key
    applied: HashMap<String, ApplyResponse>,
    apply_calls: u32,
    confirmed: Vec<(String, Vec<u64>)>,
    reimported: Vec<u64>,
    next_host_id: u64,
    id_counter: u64,
}

impl PoolInner {
    fn generate_id(&mut self, prefix: &str) -> String {
        self.id_counter += 1;
        format!("{}-{:08x}", prefix, self.id_counter)
    }
}

/// In-memory resource pool with optional per-spec capacity.
#[derive(Debug, Clone, Default)]
pub struct MockResourcePool {
    inner: Arc<Mutex<PoolInner>>,
    failures: Arc<Mutex<FailureInjector>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockResourcePool {
    /// Pool that satisfies every request.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Pool holding `hosts` free hosts of each listed spec.
    pub fn with_capacity(capacity: impl IntoIterator<Item = (u64, u32)>) -> Self {
        let pool = Self::default();
        lock(&pool.inner).capacity = Some(capacity.into_iter().collect());
        pool
    }

    /// Add free hosts of a spec.
    pub fn replenish(&self, spec_id: u64, hosts: u32) {
        let mut inner = lock(&self.inner);
        if let Some(capacity) = inner.capacity.as_mut() {
            *capacity.entry(spec_id).or_insert(0) += hosts;
        }
    }

    pub fn inject_failure(&self, call: MockCall, config: FailureConfig) {
        lock(&self.failures).inject(call, config);
    }

    /// Number of apply calls received, repeats included.
    pub fn apply_calls(&self) -> u32 {
        lock(&self.inner).apply_calls
    }

    pub fn confirmed(&self) -> Vec<(String, Vec<u64>)> {
        lock(&self.inner).confirmed.clone()
    }

    pub fn reimported(&self) -> Vec<u64> {
        lock(&self.inner).reimported.clone()
    }
}

impl ResourceService for MockResourcePool {
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyResponse, CollabError> {
        let mut inner = lock(&self.inner);
        inner.apply_calls += 1;
        if let Some(err) = lock(&self.failures).check(MockCall::ResourceApply) {
            return Err(err);
        }

        let key = request.idempotency_key();
        if let Some(previous) = inner.applied.get(&key) {
            return Ok(previous.clone());
        }

        if let Some(capacity) = inner.capacity.as_ref() {
            let mut wanted: BTreeMap<u64, u64> = BTreeMap::new();
            for group in &request.details {
                *wanted.entry(group.spec_id).or_insert(0) += u64::from(group.count);
            }
            for (spec_id, count) in &wanted {
                let free = capacity.get(spec_id).copied().map(u64::from).unwrap_or(0);
                if free < *count {
                    return Err(CollabError::Insufficient(format!(
                        "spec {} has {} free hosts, {} requested",
                        spec_id, free, count
                    )));
                }
            }
            if let Some(capacity) = inner.capacity.as_mut() {
                for (spec_id, count) in wanted {
                    if let Some(free) = capacity.get_mut(&spec_id) {
                        *free = free.saturating_sub(u32::try_from(count).unwrap_or(u32::MAX));
                    }
                }
            }
        }

        let mut groups = BTreeMap::new();
        for group in &request.details {
            let hosts = (0..group.count)
                .map(|_| {
                    inner.next_host_id += 1;
                    let id = inner.next_host_id;
                    let mut extra = Map::new();
                    extra.insert("spec_id".to_string(), Value::from(group.spec_id));
                    HostAssignment {
                        bk_host_id: id,
                        ip: format!("10.0.{}.{}", id / 250, id % 250 + 1),
                        bk_cloud_id: group.bk_cloud_id,
                        bk_biz_id: 0,
                        extra,
                    }
                })
                .collect();
            groups.insert(group.group_mark.clone(), hosts);
        }

        let response = ApplyResponse {
            request_id: inner.generate_id("req"),
            groups,
        };
        inner.applied.insert(key, response.clone());
        tracing::debug!(bill_id = request.bill_id, hosts = request.total_hosts(), "simulated apply satisfied");
        Ok(response)
    }

    fn confirm(&self, request_id: &str, host_ids: &[u64]) -> Result<(), CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ResourceConfirm) {
            return Err(err);
        }
        lock(&self.inner)
            .confirmed
            .push((request_id.to_string(), host_ids.to_vec()));
        Ok(())
    }

    fn reimport(&self, _bk_biz_id: u64, host_ids: &[u64], _operator: &str) -> Result<(), CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ResourceReimport) {
            return Err(err);
        }
        lock(&self.inner).reimported.extend_from_slice(host_ids);
        Ok(())
    }
}
