//! Simulated Collaborators
//!
//! In-process stand-ins for the resource pool, execution engine, approval
//! system and notification channel. Used by tests and by the `ticket-flow`
//! binary, with failure injection for testing error paths.

mod approval;
mod failure;
mod notifier;
mod resource;
mod runner;

pub use approval::{ApprovalState, MockApproval};
pub use failure::{FailureConfig, FailureInjector, MockCall};
pub use notifier::{Notification, RecordingNotifier};
pub use resource::MockResourcePool;
pub use runner::{Dispatched, MockRunner};

use std::sync::Arc;

use crate::collab::Services;

/// One of each simulated collaborator
#[derive(Debug, Clone, Default)]
pub struct MockServices {
    pub resource: MockResourcePool,
    pub runner: MockRunner,
    pub approval: MockApproval,
    pub notifier: RecordingNotifier,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: MockResourcePool) -> Self {
        self.resource = resource;
        self
    }

    /// Trait-object view handed to the engine
    pub fn services(&self) -> Services {
        Services {
            resource: Arc::new(self.resource.clone()),
            runner: Arc::new(self.runner.clone()),
            approval: Arc::new(self.approval.clone()),
            notifier: Arc::new(self.notifier.clone()),
        }
    }
}
