//! Stage handlers
//!
//! One handler per [`FlowType`]. A handler starts its stage, derives the
//! stage status from the node and its todos, and knows how to retry and
//! revoke it. Handlers never advance the ticket themselves; they report a
//! [`StageOutcome`] and the scheduler decides what happens next.

mod approval;
mod delivery;
mod inner;
mod resource;
mod timer;

pub use approval::{ApprovalHandler, PauseHandler};
pub use delivery::{
    DeliveryHandler, DescribeTaskHandler, HostRecycleHandler, ResourceDeliveryHandler, ResourceReimportHandler,
};
pub use inner::InnerHandler;
pub use resource::{apply_groups, batch_apply_groups, group_nodes, ResourceApplyHandler};
pub use timer::{trigger_time, TimerHandler};

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::collab::{NotifyEvent, Services};
use crate::config::EngineSettings;
use crate::error::{EngineError, StageError};
use crate::exclusive::ExclusivityChecker;
use crate::model::{FlowNode, FlowType, NewTodo, Ticket, TicketType, Todo};
use crate::state::FlowStatus;
use crate::store::{FlowStore, TodoEnsure};

/// What the scheduler does after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage finished; mark it SUCCEEDED and run the next one
    Advance,
    /// The stage waits on a todo, a callback or an external process
    Suspend,
}

/// Everything a handler may touch while it runs
pub struct StageContext<'a> {
    pub store: &'a FlowStore,
    pub settings: &'a EngineSettings,
    pub services: &'a Services,
    pub hooks: &'a FlowHooks,
}

impl<'a> StageContext<'a> {
    pub fn checker(&self) -> ExclusivityChecker<'a> {
        ExclusivityChecker::new(self.store, &self.settings.exclusive.matrix)
    }

    /// Ensure a todo exists and notify its operators when it was (re)opened.
    pub fn ensure_todo(&self, ticket: &Ticket, new: NewTodo) -> Result<Todo, EngineError> {
        let (todo, how) = self.store.ensure_todo(new)?;
        if how != TodoEnsure::Existing {
            tracing::info!(
                ticket_id = ticket.id,
                flow_id = todo.flow_id,
                todo_id = todo.id,
                todo_type = %todo.todo_type,
                reopened = how == TodoEnsure::Reopened,
                "todo opened"
            );
            self.services
                .notifier
                .notify(ticket, NotifyEvent::TodoCreated, &todo.operators);
        }
        Ok(todo)
    }

    /// DB group administrators, or the creator when none are configured.
    pub fn administrators(&self, ticket: &Ticket) -> Vec<String> {
        let admins = self.settings.administrators_of(&ticket.group);
        if admins.is_empty() {
            vec![ticket.creator.clone()]
        } else {
            admins
        }
    }
}

/// Behavior of one stage type
pub trait StageHandler: Send + Sync {
    fn flow_type(&self) -> FlowType;

    /// Start the stage. The node has already been claimed and is RUNNING.
    fn run(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError>;

    /// Status of the stage as seen from the node and its todos.
    ///
    /// Only called for RUNNING and FAILED nodes.
    fn derive_status(&self, flow: &FlowNode, _todos: &[Todo]) -> FlowStatus {
        flow.status
    }

    /// Restart a failed stage. `flow` is the node as it was before the retry.
    fn retry(&self, ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        self.run(ctx, ticket, flow)
    }

    /// Best-effort cancel of whatever the stage is waiting on.
    fn revoke(&self, _ctx: &StageContext<'_>, _ticket: &Ticket, _flow: &FlowNode, _operator: &str) -> Result<(), StageError> {
        Ok(())
    }
}

/// Per ticket type hook that may rewrite a stage payload
pub type FlowHook = Arc<dyn Fn(&Ticket, &mut Value) -> Result<(), StageError> + Send + Sync>;

/// Hooks registered by ticket builders
#[derive(Clone, Default)]
pub struct FlowHooks {
    pre_execute: HashMap<TicketType, FlowHook>,
    post_resource_apply: HashMap<TicketType, FlowHook>,
}

impl FlowHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs on the dispatch payload right before an execution node dispatches.
    pub fn on_pre_execute(
        mut self,
        ticket_type: impl Into<TicketType>,
        hook: impl Fn(&Ticket, &mut Value) -> Result<(), StageError> + Send + Sync + 'static,
    ) -> Self {
        self.pre_execute.insert(ticket_type.into(), Arc::new(hook));
        self
    }

    /// Runs on the next execution node's payload after hosts were procured.
    pub fn on_post_resource_apply(
        mut self,
        ticket_type: impl Into<TicketType>,
        hook: impl Fn(&Ticket, &mut Value) -> Result<(), StageError> + Send + Sync + 'static,
    ) -> Self {
        self.post_resource_apply.insert(ticket_type.into(), Arc::new(hook));
        self
    }

    pub fn pre_execute(&self, ticket: &Ticket, payload: &mut Value) -> Result<(), StageError> {
        match self.pre_execute.get(&ticket.ticket_type) {
            Some(hook) => hook(ticket, payload),
            None => Ok(()),
        }
    }

    pub fn post_resource_apply(&self, ticket: &Ticket, payload: &mut Value) -> Result<(), StageError> {
        match self.post_resource_apply.get(&ticket.ticket_type) {
            Some(hook) => hook(ticket, payload),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FlowHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowHooks")
            .field("pre_execute", &self.pre_execute.keys().collect::<Vec<_>>())
            .field("post_resource_apply", &self.post_resource_apply.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handler lookup by flow type, built once at engine start
#[derive(Clone)]
pub struct StageRegistry {
    handlers: HashMap<FlowType, Arc<dyn StageHandler>>,
}

impl StageRegistry {
    /// Registry with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with a handler for every flow type.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ApprovalHandler));
        registry.register(Arc::new(PauseHandler));
        registry.register(Arc::new(ResourceApplyHandler::single()));
        registry.register(Arc::new(ResourceApplyHandler::batch()));
        registry.register(Arc::new(InnerHandler::new(FlowType::InnerFlow)));
        registry.register(Arc::new(InnerHandler::new(FlowType::QuickInnerFlow)));
        registry.register(Arc::new(InnerHandler::new(FlowType::IgnoreResultInnerFlow)));
        registry.register(Arc::new(DeliveryHandler));
        registry.register(Arc::new(ResourceDeliveryHandler::single()));
        registry.register(Arc::new(ResourceDeliveryHandler::batch()));
        registry.register(Arc::new(DescribeTaskHandler));
        registry.register(Arc::new(TimerHandler));
        registry.register(Arc::new(HostRecycleHandler));
        registry.register(Arc::new(ResourceReimportHandler));
        registry
    }

    /// Register a handler, replacing any handler for the same type.
    pub fn register(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(handler.flow_type(), handler);
    }

    pub fn get(&self, flow_type: FlowType) -> Result<Arc<dyn StageHandler>, EngineError> {
        self.handlers
            .get(&flow_type)
            .cloned()
            .ok_or(EngineError::UnsupportedFlowType(flow_type))
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("StageRegistry").field("handlers", &types).finish()
    }
}
