//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Every
//! variant is scoped to a single scan or loan attempt; none is fatal to the
//! process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the tool loan kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// Scanned string does not match the tool code grammar.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Well-formed identifier that names no known tool.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Loan id that names no recorded loan.
    #[error("loan not found: {0}")]
    LoanNotFound(String),

    /// Borrow attempt lost against an existing open loan.
    #[error("already borrowed: {0}")]
    AlreadyBorrowed(String),

    /// Return attempted on a loan that is not open.
    #[error("loan not open: {0}")]
    NotOpen(String),

    /// Badge code not in the accepted set.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Underlying persistence failure. Never retried by the kernel.
    #[error("store error: {0}")]
    Store(String),

    /// Cooldown window elapsed without an explicit retry (informational).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Input validation errors (drafts, ids, configuration).
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable machine-readable error code handed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidFormat,
    ToolNotFound,
    LoanNotFound,
    AlreadyBorrowed,
    NotOpen,
    Unauthorized,
    Store,
    Timeout,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorKind::LoanNotFound => "LOAN_NOT_FOUND",
            ErrorKind::AlreadyBorrowed => "ALREADY_BORROWED",
            ErrorKind::NotOpen => "NOT_OPEN",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Store => "STORE_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify into a stable error code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Error::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Error::LoanNotFound(_) => ErrorKind::LoanNotFound,
            Error::AlreadyBorrowed(_) => ErrorKind::AlreadyBorrowed,
            Error::NotOpen(_) => ErrorKind::NotOpen,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Store(_) => ErrorKind::Store,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Serialization(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether a scan session should cool down and offer a retry.
    ///
    /// `Timeout` is informational and never produced by a resolver.
    pub fn is_scan_recoverable(&self) -> bool {
        !matches!(self, Error::Timeout(_))
    }
}

// Convenience constructors
impl Error {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn tool_not_found(msg: impl Into<String>) -> Self {
        Self::ToolNotFound(msg.into())
    }

    pub fn loan_not_found(msg: impl Into<String>) -> Self {
        Self::LoanNotFound(msg.into())
    }

    pub fn already_borrowed(msg: impl Into<String>) -> Self {
        Self::AlreadyBorrowed(msg.into())
    }

    pub fn not_open(msg: impl Into<String>) -> Self {
        Self::NotOpen(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}
