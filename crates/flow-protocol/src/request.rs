//! RPC request types.

use serde::{Deserialize, Serialize};

/// RPC request envelope.
///
/// Every engine operation accepts a single JSON request on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version spoken by the caller.
    pub protocol_version: i32,
    /// Operation name.
    pub op: String,
    /// Caller-chosen request ID for correlation.
    pub request_id: String,
    /// Operation-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RpcRequest {
    /// Build a request for the current protocol version.
    pub fn new(op: impl Into<String>, request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_MAX,
            op: op.into(),
            request_id: request_id.into(),
            payload,
        }
    }

    /// Deserialize the payload into an operation-specific type.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
