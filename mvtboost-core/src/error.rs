//! Structured error types for the mvtboost workspace.

use thiserror::Error;

/// Unified error type for all mvtboost operations.
#[derive(Debug, Error)]
pub enum MvtbError {
    /// Row counts disagree, a vector has the wrong length, or a requested
    /// iteration count lies outside `1..=n_trees`.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A configuration value is out of range. Raised before any fitting work.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid input data (empty matrices, non-finite outcomes, bad level codes).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A cross-validation fold failed; the whole CV run is aborted.
    #[error("cross-validation fold {fold} failed: {source}")]
    FoldFailure {
        fold: usize,
        #[source]
        source: Box<MvtbError>,
    },

    /// Work was abandoned through a cancellation token.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

impl MvtbError {
    /// Wrap `self` as the failure of CV fold `fold`.
    pub fn in_fold(self, fold: usize) -> Self {
        MvtbError::FoldFailure {
            fold,
            source: Box::new(self),
        }
    }
}

/// Convenience alias used throughout the mvtboost workspace.
pub type Result<T> = std::result::Result<T, MvtbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_failure_keeps_source() {
        let err = MvtbError::ShapeMismatch("3 vs 4".into()).in_fold(2);
        let msg = err.to_string();
        assert!(msg.contains("fold 2"));
        assert!(msg.contains("3 vs 4"));
        match err {
            MvtbError::FoldFailure { fold, source } => {
                assert_eq!(fold, 2);
                assert!(matches!(*source, MvtbError::ShapeMismatch(_)));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
