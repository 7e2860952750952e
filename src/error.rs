use std::error::Error as StdError;

use thiserror::Error;

/// narrator's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// narrator's crate-wide error type.
///
/// Decoupled from `anyhow` at the public boundary so downstream libraries
/// aren't forced to adopt `anyhow` in their own public APIs. Internally,
/// pipeline stages use `anyhow::Result` with `.context(...)`; this is the
/// taxonomy those errors collapse into at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Unreadable/unparseable input, unknown voice id, invalid configuration.
    /// No checkpoint changes are made.
    #[error("input error: {0}")]
    InputError(String),

    /// Timeout, throttle, or transient I/O from the TTS collaborator.
    /// Retried locally by the Synthesis Worker before ever reaching here.
    #[error("transient backend error: {0}")]
    TransientBackendError(String),

    /// Invalid input to the backend, model load failure after retries, or
    /// an oversized chunk (chunker invariant violated). Aborts the run;
    /// checkpoint and stream are retained for inspection.
    #[error("fatal backend error: {0}")]
    FatalBackendError(String),

    /// Write failure, fsync failure, disk full. Aborts the run; the last
    /// durable checkpoint is still valid.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Neither checkpoint slot validates on resume (bad CRC, version
    /// mismatch, fingerprint mismatch).
    #[error("checkpoint corruption: {0}")]
    CorruptionError(String),

    /// Cooperative cancellation observed; the latest clean checkpoint was
    /// committed.
    #[error("cancelled by user")]
    CancelledByUser,

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// True for the error classes the Orchestrator treats as resumable
    /// (the run aborts but a later invocation may resume from checkpoint).
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Error::FatalBackendError(_) | Error::StorageError(_) | Error::CancelledByUser
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Other(Box::new(err))
    }
}
