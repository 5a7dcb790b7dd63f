use thiserror::Error;

/// Errors raised by trial generation and outcome bookkeeping.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Out-of-domain argument to a draw routine or collaborator. Caller bug, never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rejection sampler ran out of attempts.
    #[error("sampling failed: {0}")]
    Sampling(String),

    /// Session bookkeeping desynchronised from the hardware; the session must stop.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TaskError::InvalidArgument(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        TaskError::InvariantViolation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        TaskError::Config(message.into())
    }

    /// True when the session cannot safely continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskError::InvariantViolation(_) | TaskError::Io(_) | TaskError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
