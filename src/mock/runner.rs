//! Simulated execution engine.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::failure::{FailureConfig, FailureInjector, MockCall};
use crate::collab::{CollabError, ExecutionRunner, ProcessState};

/// A dispatched process
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub controller: String,
    pub payload: Value,
    pub root_id: String,
}

#[derive(Debug, Default)]
struct RunnerInner {
    processes: HashMap<String, ProcessState>,
    dispatched: Vec<Dispatched>,
    retried: Vec<String>,
    revoked: Vec<String>,
}

/// In-memory runner; processes stay RUNNING until a test moves them.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    inner: Arc<Mutex<RunnerInner>>,
    failures: Arc<Mutex<FailureInjector>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_failure(&self, call: MockCall, config: FailureConfig) {
        lock(&self.failures).inject(call, config);
    }

    /// Move a process to a new state.
    pub fn set_state(&self, handle: &str, state: ProcessState) {
        lock(&self.inner).processes.insert(handle.to_string(), state);
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        lock(&self.inner).dispatched.clone()
    }

    pub fn retried(&self) -> Vec<String> {
        lock(&self.inner).retried.clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        lock(&self.inner).revoked.clone()
    }
}

impl ExecutionRunner for MockRunner {
    fn dispatch(&self, controller: &str, payload: &Value, root_id: &str) -> Result<String, CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::Dispatch) {
            return Err(err);
        }
        let mut inner = lock(&self.inner);
        inner.dispatched.push(Dispatched {
            controller: controller.to_string(),
            payload: payload.clone(),
            root_id: root_id.to_string(),
        });
        inner.processes.insert(root_id.to_string(), ProcessState::Running);
        tracing::debug!(controller, root_id, "simulated dispatch");
        Ok(root_id.to_string())
    }

    fn status(&self, handle: &str) -> Result<ProcessState, CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ProcessStatus) {
            return Err(err);
        }
        lock(&self.inner)
            .processes
            .get(handle)
            .copied()
            .ok_or_else(|| CollabError::Service {
                service: "runner",
                code: 404,
                message: format!("unknown process {}", handle),
            })
    }

    fn retry(&self, handle: &str) -> Result<(), CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ProcessRetry) {
            return Err(err);
        }
        let mut inner = lock(&self.inner);
        inner.processes.insert(handle.to_string(), ProcessState::Running);
        inner.retried.push(handle.to_string());
        Ok(())
    }

    fn revoke(&self, handle: &str) -> Result<(), CollabError> {
        if let Some(err) = lock(&self.failures).check(MockCall::ProcessRevoke) {
            return Err(err);
        }
        let mut inner = lock(&self.inner);
        inner.processes.insert(handle.to_string(), ProcessState::Revoked);
        inner.revoked.push(handle.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_then_finish() {
        let runner = MockRunner::new();
        let handle = runner.dispatch("mysql.ha_apply", &json!({}), "root-1").unwrap();
        assert_eq!(runner.status(&handle).unwrap(), ProcessState::Running);
        runner.set_state(&handle, ProcessState::Finished);
        assert_eq!(runner.status(&handle).unwrap(), ProcessState::Finished);
        assert_eq!(runner.dispatched()[0].controller, "mysql.ha_apply");
    }

    #[test]
    fn test_unknown_handle() {
        let runner = MockRunner::new();
        assert!(runner.status("nope").is_err());
    }

    #[test]
    fn test_revoke_records() {
        let runner = MockRunner::new();
        runner.dispatch("c", &json!({}), "root-2").unwrap();
        runner.revoke("root-2").unwrap();
        assert_eq!(runner.status("root-2").unwrap(), ProcessState::Revoked);
        assert_eq!(runner.revoked(), vec!["root-2".to_string()]);
    }
}
