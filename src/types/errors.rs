//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the relay.
#[derive(Error, Debug)]
pub enum Error {
    /// A wait is already outstanding on the rendezvous slot. The caller may
    /// retry once its earlier call has completed.
    #[error("request already pending: {0}")]
    AlreadyPending(String),

    /// The relay is shutting down (or has shut down) while a wait was
    /// outstanding. Terminal for the call that observes it.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Unrecognized operation at the control boundary.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed request body.
    #[error("validation error: {0}")]
    Validation(String),

    /// Lifecycle operation called in the wrong state.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// The relay could not be brought up.
    #[error("startup failed: {0}")]
    Startup(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wire error code used by the IPC transport.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::AlreadyPending(_) => "ALREADY_PENDING",
            Error::Cancelled(_) => "CANCELLED",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::StateTransition(_) => "FAILED_PRECONDITION",
            Error::Startup(_) => "STARTUP_FAILED",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// True for errors the caller can recover from by retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::AlreadyPending(_))
    }
}

// Convenience constructors
impl Error {
    pub fn already_pending(msg: impl Into<String>) -> Self {
        Self::AlreadyPending(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
