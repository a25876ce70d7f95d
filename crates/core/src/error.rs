// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Queue full ({0} jobs max)")]
    QueueFull(usize),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Job {id} reached its retry limit ({max_retries})")]
    RetriesExhausted { id: String, max_retries: u32 },

    #[error("No authentication method configured for '{0}' (key path or password required)")]
    AuthMissing(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {waited_ms}ms waiting for a free connection to '{alias}'")]
    PoolTimeout { alias: String, waited_ms: u64 },

    #[error("Command timed out after {0}ms")]
    CommandTimeout(u64),

    #[error("Command exited with code {0}")]
    CommandFailed(i32),

    #[error("Transfer partially failed: {succeeded}/{total} files succeeded")]
    TransferPartialFailure { succeeded: usize, total: usize },

    #[error("Transfer failed: {0}")]
    TransferFailure(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Unknown server alias '{0}'")]
    UnknownAlias(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, surfaced in tool error payloads
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Domain(_) => "INVALID_TRANSITION",
            AppError::QueueFull(_) => "QUEUE_FULL",
            AppError::JobNotFound(_) => "JOB_NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            AppError::AuthMissing(_) => "AUTH_MISSING",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::PoolTimeout { .. } => "POOL_TIMEOUT",
            AppError::CommandTimeout(_) => "COMMAND_TIMEOUT",
            AppError::CommandFailed(_) => "COMMAND_FAILED",
            AppError::TransferPartialFailure { .. } => "TRANSFER_PARTIAL_FAILURE",
            AppError::TransferFailure(_) => "TRANSFER_FAILURE",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::UnknownAlias(_) => "UNKNOWN_ALIAS",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<crate::port::TransportError> for AppError {
    fn from(err: crate::port::TransportError) -> Self {
        AppError::Connection(err.to_string())
    }
}
