//! Operation handlers for the engine RPC.
//!
//! Each handler parses its payload, calls the flow manager and serializes
//! the response payload.

pub mod callback;
pub mod history;
pub mod reconcile;
pub mod retry;
pub mod revoke;
pub mod status;
pub mod submit;
pub mod todo;

use flow_protocol::{RpcError, RpcRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;

fn parse<T: DeserializeOwned>(request: &RpcRequest) -> Result<T, RpcError> {
    request
        .parse_payload()
        .map_err(|e| RpcError::invalid_request(format!("invalid {} request: {}", request.op, e)))
}

fn to_payload<T: Serialize>(response: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(response).map_err(|e| RpcError::internal(format!("failed to serialize response: {}", e)))
}
