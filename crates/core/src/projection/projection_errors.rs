//! Read-model error types.

use thiserror::Error;

/// Failures of the read projection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A persisted event could not be folded into the read model. The read
    /// side no longer agrees with the command side for this taxonomy.
    #[error("Projection of '{taxonomy_id}' diverged at event #{sequence}: {reason}")]
    Diverged {
        taxonomy_id: String,
        sequence: u64,
        reason: String,
    },

    /// The taxonomy was halted after an earlier divergence.
    #[error("Projection of '{taxonomy_id}' is halted")]
    Halted { taxonomy_id: String },

    /// The query store rejected a read or write.
    #[error("Query store failure: {0}")]
    Store(String),
}

impl ProjectionError {
    pub fn diverged(
        taxonomy_id: impl Into<String>,
        sequence: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self::Diverged {
            taxonomy_id: taxonomy_id.into(),
            sequence,
            reason: reason.into(),
        }
    }
}
