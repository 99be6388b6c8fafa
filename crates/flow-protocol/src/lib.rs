//! Ticket Flow Protocol Types
//!
//! Defines the JSON RPC envelope used by callers (UI backend, approval
//! callbacks, execution engine hooks) to drive the ticket flow engine.

pub mod error;
pub mod request;
pub mod response;
pub mod ops;

pub use error::{ErrorCode, RpcError};
pub use request::RpcRequest;
pub use response::{RpcResponse, PROTOCOL_VERSION_UNKNOWN};

/// Minimum protocol version supported by this implementation.
pub const PROTOCOL_MIN: i32 = 1;

/// Maximum protocol version supported by this implementation.
pub const PROTOCOL_MAX: i32 = 1;
