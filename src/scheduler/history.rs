//! Operation history of clusters and instances.

use super::FlowManager;
use crate::model::OperationTarget;
use crate::store::LedgerEntry;

impl FlowManager {
    /// Ledger entries for `target`, newest first, at most `limit` of them.
    pub fn operation_history(&self, target: OperationTarget, limit: Option<usize>) -> Vec<LedgerEntry> {
        let mut entries = self.store.ledger_for_target(target);
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        tracing::debug!(?target, entries = entries.len(), "operation history read");
        entries
    }
}
