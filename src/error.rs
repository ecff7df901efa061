use thiserror::Error;

use crate::workflow::LifecycleState;

/// Failure taxonomy for collection workflow operations.
///
/// Validation errors (schema and batch shape) are raised locally before any
/// network call; backend failures are surfaced unmodified for the caller's
/// retry policy. Every variant names the collection and the operation
/// attempted.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid schema for collection '{collection}': {reason}")]
    Schema { collection: String, reason: String },

    #[error("{operation} batch does not match schema of '{collection}': {reason}")]
    SchemaMismatch {
        collection: String,
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} batch for '{collection}' has unequal field value sequences: {reason}")]
    BatchLength {
        collection: String,
        operation: &'static str,
        reason: String,
    },

    #[error("collection '{collection}' not found during {operation}")]
    NotFound {
        collection: String,
        operation: &'static str,
    },

    #[error("{operation} is not valid for '{collection}' in state {state:?}")]
    InvalidState {
        collection: String,
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("backend unavailable during {operation} on '{collection}': {source}")]
    BackendUnavailable {
        collection: String,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("read-after-write expectation not met for '{collection}': {reason}")]
    ConsistencyViolation { collection: String, reason: String },
}
