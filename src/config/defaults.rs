//! Built-in engine defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Mark approval and pause stages as skipped (default: false)
    pub skip_human_stages: bool,

    /// Operator recorded for system actions (default: "system")
    pub system_operator: String,

    /// Callback URL handed to the approval system; `{ticket_id}` is substituted
    pub callback_url: String,

    /// Mutex retry sweep period (default: 5 seconds)
    pub reconcile_interval_seconds: u64,

    /// Expiry sweep period (default: 3600 seconds)
    pub expire_interval_seconds: u64,

    /// Tickets revoked per expiry batch (default: 100)
    pub expire_batch: u64,

    /// Days an approval may stay pending (default: 7)
    pub approval_days: i64,

    /// Days a failed execution may wait for a human (default: 3)
    pub execution_failed_days: i64,

    /// Days a confirm or replenish todo may stay open (default: 7)
    pub todo_days: i64,

    /// Seconds to wait for the state snapshot lock (default: 30)
    pub state_lock_timeout_seconds: u64,

    /// Log output format (default: "pretty")
    pub log_format: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            skip_human_stages: false,
            system_operator: "system".to_string(),
            callback_url: "http://localhost:8000/tickets/{ticket_id}/callback".to_string(),
            reconcile_interval_seconds: 5,
            expire_interval_seconds: 3600,
            expire_batch: 100,
            approval_days: 7,
            execution_failed_days: 3,
            todo_days: 7,
            state_lock_timeout_seconds: 30,
            log_format: "pretty".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "skip_human_stages": self.skip_human_stages,
            "system_operator": self.system_operator,
            "callback_url": self.callback_url,
            "reconciler": {
                "interval_seconds": self.reconcile_interval_seconds,
                "expire_interval_seconds": self.expire_interval_seconds,
                "expire_batch": self.expire_batch
            },
            "expire": {
                "default": {
                    "approval_days": self.approval_days,
                    "execution_failed_days": self.execution_failed_days,
                    "todo_days": self.todo_days
                }
            },
            "state": {
                "lock_timeout_seconds": self.state_lock_timeout_seconds
            },
            "administrators": {},
            "exclusive": {
                "matrix": {}
            },
            "logging": {
                "format": self.log_format
            }
        })
    }
}
