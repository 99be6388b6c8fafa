//! Domain records: tickets, flow nodes, todos and the operation ledger.

mod flow;
mod record;
mod ticket;
mod todo;

pub use flow::{FlowErrCode, FlowNode, FlowType, NewFlow, RetryType, UnknownFlowType, ALL_FLOW_TYPES};
pub use record::{OperationRecord, OperationTarget};
pub use ticket::{NewTicket, Ticket, TicketType};
pub use todo::{NewTodo, Todo, TodoAction, TodoHistory, TodoType};
