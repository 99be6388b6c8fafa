//! Operation-specific types.

pub mod submit;
pub mod callback;
pub mod revoke;
pub mod retry;
pub mod todo;
pub mod status;
pub mod reconcile;
pub mod history;

pub use submit::{FlowSpec, SubmitTicketRequest, SubmitTicketResponse};
pub use callback::{CallbackEvent, CallbackRequest, CallbackResponse};
pub use revoke::{RevokeRequest, RevokeResponse};
pub use retry::{RetryFlowRequest, RetryFlowResponse};
pub use todo::{ProcessTodoRequest, ProcessTodoResponse};
pub use status::{FlowSummary, TicketStatusRequest, TicketStatusResponse, TodoSummary};
pub use reconcile::{ReconcileRequest, ReconcileResponse};
pub use history::{OperationEntry, OperationHistoryRequest, OperationHistoryResponse};

/// Known operation names.
pub mod names {
    pub const SUBMIT_TICKET: &str = "submit_ticket";
    pub const CALLBACK: &str = "callback";
    pub const REVOKE: &str = "revoke";
    pub const RETRY_FLOW: &str = "retry_flow";
    pub const PROCESS_TODO: &str = "process_todo";
    pub const TICKET_STATUS: &str = "ticket_status";
    pub const RECONCILE: &str = "reconcile";
    pub const OPERATION_HISTORY: &str = "operation_history";
}
