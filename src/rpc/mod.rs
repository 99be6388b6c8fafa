//! Engine RPC Handler
//!
//! Implements the stdin/stdout JSON RPC entry point:
//!
//!   ticket-flow rpc --state state.json
//!
//! The handler reads a single JSON request from stdin, dispatches it to the
//! matching operation handler, and writes a single JSON response to stdout.
//! With a state file bound, dispatch runs inside a locked reload and save of
//! the snapshot.

pub mod handlers;

use std::io::{self, BufRead, Write};

use flow_protocol::{ops::names, RpcError, RpcRequest, RpcResponse, PROTOCOL_MAX, PROTOCOL_MIN};

use crate::error::EngineError;
use crate::scheduler::FlowManager;
use crate::store::StateFile;

/// Main RPC handler for the engine.
pub struct RpcHandler<'a> {
    manager: &'a FlowManager,
    state: Option<StateFile>,
}

impl<'a> RpcHandler<'a> {
    pub fn new(manager: &'a FlowManager) -> Self {
        Self { manager, state: None }
    }

    /// Dispatch every request against the latest contents of `state`.
    pub fn with_state_file(mut self, state: StateFile) -> Self {
        self.state = Some(state);
        self
    }

    /// Run the RPC handler, reading from stdin and writing to stdout.
    pub fn run(&self) -> io::Result<()> {
        self.run_with_io(&mut io::stdin().lock(), &mut io::stdout().lock())
    }

    /// Run the RPC handler with custom I/O.
    pub fn run_with_io<R: BufRead, W: Write>(&self, reader: &mut R, writer: &mut W) -> io::Result<()> {
        let request = match self.read_request(reader) {
            Ok(req) => req,
            Err(e) => return self.write_response(writer, &RpcResponse::rejected(e)),
        };

        if let Err(e) = self.validate_protocol_version(&request) {
            return self.write_response(writer, &RpcResponse::for_request(&request, Err(e)));
        }

        let response = match &self.state {
            None => self.dispatch(&request),
            Some(state) => state
                .locked(self.manager.store(), || self.dispatch(&request))
                .unwrap_or_else(|e| {
                    tracing::error!(path = %state.path().display(), error = %e, "state unavailable");
                    RpcResponse::for_request(&request, Err(RpcError::internal(format!("state unavailable: {}", e))))
                }),
        };
        self.write_response(writer, &response)
    }

    fn read_request<R: BufRead>(&self, reader: &mut R) -> Result<RpcRequest, RpcError> {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| RpcError::invalid_request(format!("failed to read request: {}", e)))?;

        serde_json::from_str(&line).map_err(|e| RpcError::invalid_request(format!("invalid JSON: {}", e)))
    }

    fn validate_protocol_version(&self, request: &RpcRequest) -> Result<(), RpcError> {
        if request.protocol_version < PROTOCOL_MIN || request.protocol_version > PROTOCOL_MAX {
            return Err(RpcError::unsupported_protocol(
                request.protocol_version,
                PROTOCOL_MIN,
                PROTOCOL_MAX,
            ));
        }
        Ok(())
    }

    /// Dispatch the request to the matching operation handler.
    pub fn dispatch(&self, request: &RpcRequest) -> RpcResponse {
        let manager = self.manager;
        let result = match request.op.as_str() {
            names::SUBMIT_TICKET => handlers::submit::handle(request, manager),
            names::CALLBACK => handlers::callback::handle(request, manager),
            names::REVOKE => handlers::revoke::handle(request, manager),
            names::RETRY_FLOW => handlers::retry::handle(request, manager),
            names::PROCESS_TODO => handlers::todo::handle(request, manager),
            names::TICKET_STATUS => handlers::status::handle(request, manager),
            names::RECONCILE => handlers::reconcile::handle(request, manager),
            names::OPERATION_HISTORY => handlers::history::handle(request, manager),
            _ => Err(RpcError::unknown_operation(&request.op)),
        };

        if let Err(e) = &result {
            tracing::warn!(op = %request.op, request_id = %request.request_id, code = %e.code, "request failed: {}", e.message);
        }
        RpcResponse::for_request(request, result)
    }

    fn write_response<W: Write>(&self, writer: &mut W, response: &RpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TicketNotFound(id) => RpcError::ticket_not_found(id),
            EngineError::FlowNotFound { flow_id, .. } => RpcError::flow_not_found(flow_id),
            EngineError::TodoNotFound(id) => RpcError::todo_not_found(id),
            EngineError::Transition(t) => RpcError::invalid_transition(&t.from, &t.to),
            EngineError::UnsupportedFlowType(_) | EngineError::Misconfigured(_) | EngineError::Config(_) => {
                RpcError::misconfigured(err.to_string())
            }
            EngineError::ActionNotAllowed { .. } | EngineError::TodoDone(_) | EngineError::InvalidRequest(_) => {
                RpcError::invalid_request(err.to_string())
            }
            EngineError::Snapshot(_) | EngineError::Collab(_) => RpcError::internal(err.to_string()),
        }
    }
}
