//! Conflict-by-default exclusivity matrix for cluster operations.
//!
//! Two tickets touching the same cluster may run side by side only when the
//! matrix says so explicitly. Any pair the matrix does not mention conflicts.

mod decision;
mod matrix;

pub use decision::{ConflictDecision, DecisionSource};
pub use matrix::{ExclusivityMatrix, MatrixError, WILDCARD};
