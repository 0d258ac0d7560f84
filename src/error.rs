//! Error taxonomy shared across the core.
//!
//! Callers route on the variant: `ConcurrencyConflict` is always retryable
//! by reload-and-reapply, `Validation` is a rejected command and must not
//! be retried, `StoreUnavailable` may be retried with backoff.

use std::time::Duration;

use uuid::Uuid;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the event store, buses, repository and saga coordinator.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Expected-version mismatch on append. The losing writer must reload
    /// the aggregate and reapply its command.
    #[error(
        "concurrency conflict on {aggregate_type}/{aggregate_id}: \
         expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        aggregate_type: String,
        expected: u64,
        actual: u64,
    },

    /// No handler registered for a command type or saga action.
    #[error("no handler registered for '{0}'")]
    HandlerNotFound(String),

    /// A handler is already registered for this command type.
    #[error("handler already registered for '{0}'")]
    HandlerAlreadyRegistered(String),

    /// Business-rule violation raised inside an aggregate command method.
    /// No events were raised; aggregate state is unchanged.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient I/O failure from the event or snapshot store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("unknown storage type '{0}'")]
    UnknownStorageType(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown aggregate type '{0}'")]
    UnknownAggregateType(String),

    #[error("unknown event type '{event_type}' for aggregate '{aggregate_type}'")]
    UnknownEventType {
        aggregate_type: String,
        event_type: String,
    },

    #[error("saga {0} not found")]
    SagaNotFound(Uuid),

    #[error("no saga definition registered under '{0}'")]
    UnknownSagaDefinition(String),

    #[error("saga {saga_id} is {status}, only pending sagas can be executed")]
    SagaNotExecutable { saga_id: Uuid, status: String },

    /// Saga step exceeded its execution budget. Treated as a step failure
    /// and triggers compensation.
    #[error("saga {saga_id} step '{step}' timed out after {timeout:?}")]
    StepTimeout {
        saga_id: Uuid,
        step: String,
        timeout: Duration,
    },

    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// One or more event subscribers failed. Every subscriber still ran;
    /// this aggregates their failures.
    #[error("{failed} of {total} subscribers failed for '{event_type}': {details}")]
    PublishFailed {
        event_type: String,
        failed: usize,
        total: usize,
        details: String,
    },
}

impl CoreError {
    /// Whether the caller may retry the failed operation.
    ///
    /// Concurrency conflicts require a reload before the retry; store
    /// outages should be retried with backoff. Everything else is either
    /// a rejected command or a configuration error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ConcurrencyConflict { .. } | CoreError::StoreUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::StoreUnavailable(e.to_string())
    }
}
