//! Failure Injection for Simulated Collaborators
//!
//! Supports configurable failure injection for testing error paths.

use std::collections::HashMap;
use std::time::Duration;

use crate::collab::CollabError;

/// Collaborator call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    ResourceApply,
    ResourceConfirm,
    ResourceReimport,
    Dispatch,
    ProcessStatus,
    ProcessRetry,
    ProcessRevoke,
    ApprovalCreate,
    ApprovalDecide,
    ApprovalWithdraw,
}

/// Failure configuration for a call
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error to return (None = only delay)
    pub error: Option<CollabError>,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that returns an error
    pub fn error(error: CollabError) -> Self {
        Self {
            error: Some(error),
            delay: None,
            fail_count: None,
        }
    }

    /// Create an insufficient-capacity error
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::error(CollabError::Insufficient(message.into()))
    }

    /// Create a config that just adds delay
    pub fn delay(duration: Duration) -> Self {
        Self {
            error: None,
            delay: Some(duration),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Failure injector for simulated collaborators
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<MockCall, FailureConfig>,
    /// Call counts per call kind (for fail_count tracking)
    call_counts: HashMap<MockCall, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for a call
    pub fn inject(&mut self, call: MockCall, config: FailureConfig) {
        self.configs.insert(call, config);
        self.call_counts.insert(call, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    pub fn clear_call(&mut self, call: MockCall) {
        self.configs.remove(&call);
        self.call_counts.remove(&call);
    }

    /// Check whether this call should fail.
    ///
    /// Sleeps for any configured delay, then returns the error to report.
    pub fn check(&mut self, call: MockCall) -> Option<CollabError> {
        let config = self.configs.get(&call)?;
        let count = self.call_counts.entry(call).or_insert(0);
        *count += 1;

        if let Some(delay) = config.delay {
            std::thread::sleep(delay);
        }

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }

        config.error.clone()
    }
}
