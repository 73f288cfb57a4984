//! Error types for the training and validation engine.
//!
//! Only conditions that abort a run are represented here. Per-fold
//! degradations (missing features, degenerate binning, empty partitions)
//! are reported as warnings on the run report instead.

use thiserror::Error;

/// Errors raised by a [`Learner`](super::learner::Learner) during fit or predict.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LearnerError {
    /// `predict` was called before a successful `fit`.
    #[error("learner has not been fitted")]
    NotFitted,

    /// The input matrix does not match the expected shape.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// The training matrix has no rows.
    #[error("cannot fit a learner on zero rows")]
    EmptyInput,

    /// A training target is NaN or infinite.
    #[error("target value at row {row} is not finite")]
    NonFiniteTarget { row: usize },
}

/// Fatal errors for one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No rows are left after loading and period filtering.
    #[error("no records available for period {period}")]
    EmptyDataset { period: String },

    /// Every fold had an empty training or validation partition.
    #[error("all {folds} folds had empty partitions; no metrics can be computed")]
    AllFoldsEmpty { folds: usize },

    /// The underlying regression learner failed.
    #[error("learner failure in fold {fold}: {source}")]
    Learner {
        fold: usize,
        #[source]
        source: LearnerError,
    },

    /// Configuration values are invalid or leave nothing to train on.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A column required by the operation does not exist.
    #[error("column '{0}' not found")]
    MissingColumn(String),

    /// A leakage field was offered as a feature column.
    #[error("column '{0}' is a leakage field and cannot be used as a feature")]
    LeakageField(String),

    /// A column has the wrong semantic type for the operation.
    #[error("column '{name}' must be {expected}")]
    ColumnType { name: String, expected: &'static str },

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
