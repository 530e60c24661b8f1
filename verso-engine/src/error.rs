//! Error types for verso-engine

use thiserror::Error;

/// Engine error type
///
/// Every component-level failure resolves to an explicit terminal job or
/// workflow-run status before one of these propagates; no failure path may
/// leave a job `running` indefinitely.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Origin text could not be split meaningfully. Surfaced immediately;
    /// no job is created.
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Translation Model Service failure. Job-failing for the unit that
    /// observed it; drafts may be retried by their own retry policy,
    /// synthesis is not retried.
    #[error("Model error: {0}")]
    Model(String),

    /// Persistent store unavailable or rejected the operation. The job is
    /// left in its last durable state; callers should retry the whole
    /// operation.
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Malformed stored payload or metadata
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// verso-common error
    #[error("Common error: {0}")]
    Common(#[from] verso_common::Error),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
