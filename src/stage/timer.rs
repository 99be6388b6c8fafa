//! Timer stage: holds the ticket until `details.trigger_time` (RFC 3339).
//!
//! A timer that is already due advances when it runs. Otherwise the node
//! stays RUNNING and the reconciler completes it once the time has passed.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{StageContext, StageHandler, StageOutcome};
use crate::error::StageError;
use crate::model::{FlowNode, FlowType, Ticket};
use crate::state::now_utc;

#[derive(Debug, Default)]
pub struct TimerHandler;

/// When a timer node fires.
pub fn trigger_time(flow: &FlowNode) -> Result<DateTime<Utc>, StageError> {
    let raw = flow
        .details
        .get("trigger_time")
        .and_then(Value::as_str)
        .ok_or_else(|| StageError::Misconfigured("timer has no trigger_time".to_string()))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StageError::Misconfigured(format!("timer trigger_time '{}': {}", raw, e)))
}

impl StageHandler for TimerHandler {
    fn flow_type(&self) -> FlowType {
        FlowType::Timer
    }

    fn run(&self, _ctx: &StageContext<'_>, ticket: &Ticket, flow: &FlowNode) -> Result<StageOutcome, StageError> {
        let at = trigger_time(flow)?;
        if at <= now_utc() {
            tracing::info!(ticket_id = ticket.id, flow_id = flow.id, %at, "timer already due");
            return Ok(StageOutcome::Advance);
        }
        tracing::info!(ticket_id = ticket.id, flow_id = flow.id, %at, "timer armed");
        Ok(StageOutcome::Suspend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewFlow;
    use serde_json::json;

    fn timer(details: Value) -> FlowNode {
        FlowNode::from_new(2, 1, 0, NewFlow::new(FlowType::Timer, details))
    }

    #[test]
    fn test_trigger_time_parses_offsets() {
        let at = trigger_time(&timer(json!({"trigger_time": "2026-03-01T08:00:00+08:00"}))).unwrap();
        assert_eq!(at.to_rfc3339(), "2026-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_trigger_time_required() {
        assert!(matches!(trigger_time(&timer(json!({}))), Err(StageError::Misconfigured(_))));
        assert!(matches!(
            trigger_time(&timer(json!({"trigger_time": "tomorrow"}))),
            Err(StageError::Misconfigured(_))
        ));
    }
}
