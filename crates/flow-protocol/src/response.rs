//! Response envelope written back for every engine request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, RpcError};
use crate::request::RpcRequest;

/// Protocol version echoed when the request line could not be parsed
pub const PROTOCOL_VERSION_UNKNOWN: i32 = 0;

/// One JSON line per request.
///
/// `ticket_id` names the ticket the operation acted on, taken from the
/// success payload or, for failures, from the error data. Callers use it to
/// correlate callback and todo results without parsing the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub protocol_version: i32,
    pub request_id: String,
    /// Operation echoed from the request; empty when the request was unreadable
    #[serde(default)]
    pub op: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Response to a request that reached its operation handler.
    pub fn for_request(request: &RpcRequest, result: Result<Value, RpcError>) -> Self {
        let (ok, payload, error) = match result {
            Ok(payload) => (true, Some(payload), None),
            Err(error) => (false, None, Some(error)),
        };
        let ticket_id = payload
            .as_ref()
            .and_then(ticket_id_of)
            .or_else(|| error.as_ref().and_then(|e| e.data.as_ref()).and_then(ticket_id_of))
            .or_else(|| ticket_id_of(&request.payload));
        Self {
            protocol_version: request.protocol_version,
            request_id: request.request_id.clone(),
            op: request.op.clone(),
            ok,
            ticket_id,
            payload,
            error,
        }
    }

    /// Response to a line that is not a request at all.
    pub fn rejected(error: RpcError) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION_UNKNOWN,
            request_id: String::new(),
            op: String::new(),
            ok: false,
            ticket_id: None,
            payload: None,
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Decode the success payload into an operation response type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let payload = self.payload.clone().unwrap_or(Value::Null);
        serde_json::from_value(payload)
            .map_err(|e| RpcError::internal(format!("unexpected {} payload: {}", self.op, e)))
    }
}

fn ticket_id_of(value: &Value) -> Option<u64> {
    value.get("ticket_id").and_then(Value::as_u64)
}
