//! Error taxonomy for chronicle
//!
//! Error codes:
//! - CHR_VALIDATION (REJECT)
//! - CHR_NOT_FOUND (REJECT)
//! - CHR_UNSAFE_QUERY (REJECT)
//! - CHR_PRECONDITION (REJECT)
//! - CHR_QUERY_TIMEOUT (REJECT)
//! - CHR_HALTED (HALT)
//!
//! REJECT errors are local: the caller gets the error and no state changed.
//! HALT is non-local: a critical audit failure closed the gate and every write
//! and TQL query is refused until an operator resets it.

use std::fmt;

use thiserror::Error;

use crate::halt::HaltReason;
use crate::tql::UnsafeQueryError;

/// Severity levels for chronicle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected, state unchanged
    Reject,
    /// System halted by a failed audit
    Halt,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Halt => write!(f, "HALT"),
        }
    }
}

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    NotFound,
    UnsafeQuery,
    Precondition,
    QueryTimeout,
    Halted,
}

impl ErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "CHR_VALIDATION",
            ErrorCode::NotFound => "CHR_NOT_FOUND",
            ErrorCode::UnsafeQuery => "CHR_UNSAFE_QUERY",
            ErrorCode::Precondition => "CHR_PRECONDITION",
            ErrorCode::QueryTimeout => "CHR_QUERY_TIMEOUT",
            ErrorCode::Halted => "CHR_HALTED",
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::Halted => Severity::Halt,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by the ledger, the query engine and the audit surface
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed or duplicate event
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown id
    #[error("not found: {0}")]
    NotFound(String),

    /// TQL safety rule violated; nothing was executed
    #[error(transparent)]
    UnsafeQuery(#[from] UnsafeQueryError),

    /// Operation not allowed in the current state
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Query ran past its execution budget
    #[error("query exceeded its {budget_ms}ms budget ({elapsed_ms}ms elapsed)")]
    QueryTimeout { budget_ms: u64, elapsed_ms: u64 },

    /// A critical audit failure halted the system
    #[error("system halted: {0}")]
    Halted(HaltReason),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::UnsafeQuery(_) => ErrorCode::UnsafeQuery,
            Self::Precondition(_) => ErrorCode::Precondition,
            Self::QueryTimeout { .. } => ErrorCode::QueryTimeout,
            Self::Halted(_) => ErrorCode::Halted,
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code().severity()
    }

    /// Local errors are recoverable; a halt needs a human reset
    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Reject
    }
}

/// Result type for chronicle operations
pub type Result<T> = std::result::Result<T, Error>;
