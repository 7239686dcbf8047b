//! Error types for repository operations.
//!
//! Every operation of the recorder fails in one of a few ways a caller can
//! act on: the session or bank does not exist, the request is not acceptable
//! in the session's current state, or the storage backend failed. The
//! [`ErrorContext`] attached to each error names the operation and entity.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where an error happened: operation, entity and free-form details.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation being performed (e.g., "submit_ocv", "end_phase")
    pub operation: Option<String>,
    /// The entity type involved (e.g., "session", "cycle", "bank")
    pub entity: Option<String>,
    /// The entity ID if applicable
    pub entity_id: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Replaying the operation may succeed
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={}", entity));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
#[allow(clippy::result_large_err)]
pub enum RepositoryError {
    /// The session, bank or active cycle does not exist.
    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Wrong batch size, non-numeric value, non-positive counts, or an
    /// operation on a session that no longer accepts it.
    #[error("Invalid input: {message} {context}")]
    InvalidInput {
        message: String,
        context: ErrorContext,
    },

    /// The backend cannot be reached (pool exhausted, connection refused,
    /// unhealthy store). Always retryable.
    #[error("Storage unavailable: {message} {context}")]
    Unavailable {
        message: String,
        context: ErrorContext,
    },

    /// A statement failed. Conflicts with a concurrent writer are retryable.
    #[error("Storage error: {message} {context}")]
    Storage {
        message: String,
        context: ErrorContext,
    },

    /// Missing or malformed repository configuration.
    #[error("Configuration error: {message} {context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// Stored data that cannot be decoded, or a failed background task.
    #[error("Internal error: {message} {context}")]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    /// No session with this id.
    pub fn session_not_found(session_id: impl fmt::Display, operation: &str) -> Self {
        Self::not_found_with_context(
            format!("Session {} not found", session_id),
            ErrorContext::new(operation)
                .with_entity("session")
                .with_entity_id(session_id),
        )
    }

    /// No battery bank with this id.
    pub fn bank_not_found(bank_id: impl fmt::Display, operation: &str) -> Self {
        Self::not_found_with_context(
            format!("Battery bank {} not found", bank_id),
            ErrorContext::new(operation)
                .with_entity("bank")
                .with_entity_id(bank_id),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn invalid_input_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::InvalidInput {
            message: message.into(),
            context,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn unavailable_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: context.retryable(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Configuration {
            message: message.into(),
            context,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn internal_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Internal {
            message: message.into(),
            context,
        }
    }

    /// Whether replaying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { context, .. } | Self::Storage { context, .. } => context.retryable,
            _ => false,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::NotFound { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::Unavailable { context, .. }
            | Self::Storage { context, .. }
            | Self::Configuration { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Replace the operation recorded in the context.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        match &mut self {
            Self::NotFound { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::Unavailable { context, .. }
            | Self::Storage { context, .. }
            | Self::Configuration { context, .. }
            | Self::Internal { context, .. } => {
                context.operation = Some(operation.into());
            }
        }
        self
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => RepositoryError::not_found("Record not found"),
            Error::DatabaseError(kind, info) => {
                let context = ErrorContext::default().with_details(format!("db_error_kind={:?}", kind));
                // A serialization failure or a lost race on the active-cycle
                // unique index both succeed when the transaction is replayed.
                let context = match kind {
                    DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::UniqueViolation => {
                        context.retryable()
                    }
                    _ => context,
                };
                RepositoryError::Storage {
                    message: info.message().to_string(),
                    context,
                }
            }
            Error::DeserializationError(e) => {
                RepositoryError::internal(format!("Deserialization error: {}", e))
            }
            other => RepositoryError::storage(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::r2d2::PoolError> for RepositoryError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        RepositoryError::unavailable_with_context(
            err.to_string(),
            ErrorContext::default().with_details("pool_error"),
        )
    }
}
