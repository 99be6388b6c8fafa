//! DBM Ticket Flow - ticket flow orchestration for DB operations
//!
//! This crate drives DB-operations tickets through an ordered list of flow
//! nodes (approval, confirmation, resource procurement, execution, delivery),
//! enforcing per-cluster mutual exclusion, resource backpressure and human
//! todos, with a periodic reconciler for mutex retries and expiry.

pub mod collab;
pub mod config;
pub mod error;
pub mod exclusive;
pub mod mock;
pub mod model;
pub mod observability;
pub mod reconciler;
pub mod rpc;
pub mod scheduler;
pub mod signal;
pub mod stage;
pub mod state;
pub mod store;

pub use config::{EngineSettings, SettingsHandle, SettingsSources};
pub use error::{EngineError, StageError};
pub use reconciler::{Reconciler, SweepReport};
pub use rpc::RpcHandler;
pub use scheduler::{FlowManager, TicketView};
pub use store::FlowStore;
