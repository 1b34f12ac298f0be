//! Error types for token bucket operations.

use std::fmt;

use snafu::Snafu;

use crate::codec::CodecError;
use crate::store::HostStoreError;

/// Numeric or name argument that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Argument {
    Name,
    Capacity,
    Rate,
    InitialTokens,
    Requested,
}

impl Argument {
    /// Stable lowercase label used in reply messages.
    pub const fn label(self) -> &'static str {
        match self {
            Argument::Name => "bucket name",
            Argument::Capacity => "capacity",
            Argument::Rate => "rate",
            Argument::InitialTokens => "initial tokens",
            Argument::Requested => "requested count",
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable category of a [`BucketError`], for callers that branch on cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    InvalidArgument,
    NotFound,
    TypeConflict,
    MalformedRecord,
    ClockRegression,
    WrongArity,
    Storage,
}

impl ErrorCategory {
    /// Machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorCategory::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::TypeConflict => "TYPE_CONFLICT",
            ErrorCategory::MalformedRecord => "MALFORMED_RECORD",
            ErrorCategory::ClockRegression => "CLOCK_REGRESSION",
            ErrorCategory::WrongArity => "WRONG_ARITY",
            ErrorCategory::Storage => "STORAGE",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors from token bucket operations.
///
/// Every variant is detected before anything is written, so a failed operation
/// leaves the stored bucket untouched.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum BucketError {
    /// An argument is missing, non-numeric, negative, or out of range.
    #[snafu(display("invalid {argument}: {reason}"))]
    InvalidArgument {
        /// Which argument.
        argument: Argument,
        /// What was wrong with it.
        reason: String,
    },

    /// Nothing is stored under the bucket name.
    #[snafu(display("bucket '{name}' not found"))]
    NotFound {
        /// Bucket name.
        name: String,
    },

    /// The key holds a value of another kind.
    #[snafu(display("key '{name}' holds a {found} value, not a bucket record"))]
    TypeConflict {
        /// Bucket name.
        name: String,
        /// Kind of the value found.
        found: String,
    },

    /// The stored string is not a valid record.
    #[snafu(display("malformed record in bucket '{name}': {source}"))]
    MalformedRecord {
        /// Bucket name.
        name: String,
        /// Decoding failure.
        source: CodecError,
    },

    /// The clock reads earlier than the bucket's last update.
    #[snafu(display("clock regression on bucket '{name}': now {now_ms}ms is before last update {update_time_ms}ms"))]
    ClockRegression {
        /// Bucket name.
        name: String,
        /// Current reading.
        now_ms: u64,
        /// Stored update time.
        update_time_ms: u64,
    },

    /// Wrong number of command arguments.
    #[snafu(display("wrong number of arguments for '{command}': got {got}"))]
    WrongArity {
        /// Command name as invoked.
        command: String,
        /// Argument count received, command name included.
        got: usize,
    },

    /// The host store refused the operation.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// Underlying error.
        source: HostStoreError,
    },
}

impl BucketError {
    /// Stable category for branching on the cause.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BucketError::InvalidArgument { .. } => ErrorCategory::InvalidArgument,
            BucketError::NotFound { .. } => ErrorCategory::NotFound,
            BucketError::TypeConflict { .. } => ErrorCategory::TypeConflict,
            BucketError::MalformedRecord { .. } => ErrorCategory::MalformedRecord,
            BucketError::ClockRegression { .. } => ErrorCategory::ClockRegression,
            BucketError::WrongArity { .. } => ErrorCategory::WrongArity,
            BucketError::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Reply line sent back to the caller.
    ///
    /// These strings are part of the command interface; clients match on them.
    pub fn reply_message(&self) -> String {
        match self {
            BucketError::InvalidArgument { argument, .. } => format!("ERR invalid {}", argument.label()),
            BucketError::NotFound { .. } => "ERR no such bucket".to_string(),
            BucketError::TypeConflict { .. } => {
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
            }
            BucketError::MalformedRecord { .. } => "ERR malformed bucket record".to_string(),
            BucketError::ClockRegression { .. } => "ERR clock regression detected".to_string(),
            BucketError::WrongArity { command, .. } => {
                format!("ERR wrong number of arguments for '{}' command", command.to_lowercase())
            }
            BucketError::Storage { .. } => "ERR storage failure".to_string(),
        }
    }
}

impl From<HostStoreError> for BucketError {
    fn from(source: HostStoreError) -> Self {
        match source {
            HostStoreError::EmptyKey | HostStoreError::KeyTooLarge { .. } => BucketError::InvalidArgument {
                argument: Argument::Name,
                reason: source.to_string(),
            },
            other => BucketError::Storage { source: other },
        }
    }
}
