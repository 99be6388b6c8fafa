//! Reconcile operation types.
//!
//! Runs one sweep of the periodic reconciler on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reconcile request payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileRequest {
    /// Clock override for expiry decisions; defaults to the current time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<DateTime<Utc>>,
}

/// Reconcile response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileResponse {
    /// Mutex-blocked stages that were retried.
    pub retried: Vec<u64>,
    /// Tickets revoked because they sat too long.
    pub expired: Vec<u64>,
    /// Tickets whose timer stage fired.
    #[serde(default)]
    pub fired: Vec<u64>,
    /// Per-ticket failures encountered during the sweep.
    pub failures: u32,
}
