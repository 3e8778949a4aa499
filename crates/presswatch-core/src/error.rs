// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error hierarchy for the monitor core.
//!
//! ```text
//! CatalogError       - catalog loading and lookup (fatal at startup)
//! ConfigError        - configuration parsing and validation
//! SubscriptionError  - subscribe failures (recoverable, recycle the session)
//! WriteError         - write gateway outcomes (always reported to the caller)
//! AlarmError         - reset preconditions
//! ResetError         - alarm precondition or write failure
//! ```
//!
//! # Examples
//!
//! ```
//! use presswatch_core::error::WriteError;
//! use std::time::Duration;
//!
//! let error = WriteError::TimedOut { timeout: Duration::from_secs(5) };
//! assert!(error.is_retryable());
//! assert!(!WriteError::unknown_tag("bath1").is_retryable());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use presswatch_opcua::{ConnectionError, ErrorSeverity, OpcUaError, OperationError};
use thiserror::Error;
use tracing::Level;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// CatalogError
// =============================================================================

/// Tag catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("Failed to read catalog '{path}': {source}")]
    Io {
        /// Path to the catalog.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer rejected the input.
    #[error("Catalog CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A row is missing a field or carries an unparsable one.
    #[error("Malformed catalog row {row}: {message}")]
    MalformedCatalog {
        /// Line number in the input (the header is line 1).
        row: usize,
        /// What is wrong with the row.
        message: String,
    },

    /// A tag name appears twice.
    #[error("Duplicate tag name '{name}' at row {row}")]
    DuplicateTag {
        /// The repeated name.
        name: String,
        /// Row of the second occurrence.
        row: usize,
    },

    /// A node id appears twice.
    #[error("Duplicate node id '{node_id}' for tag '{name}' at row {row}")]
    DuplicateNode {
        /// The repeated node id.
        node_id: String,
        /// Tag carrying the second occurrence.
        name: String,
        /// Row of the second occurrence.
        row: usize,
    },

    /// The tag is not in the catalog.
    #[error("Unknown tag: {name}")]
    UnknownTag {
        /// The requested name.
        name: String,
    },
}

impl CatalogError {
    /// Creates a malformed row error.
    pub fn malformed(row: usize, message: impl Into<String>) -> Self {
        Self::MalformedCatalog {
            row,
            message: message.into(),
        }
    }

    /// Creates an unknown tag error.
    pub fn unknown_tag(name: impl Into<String>) -> Self {
        Self::UnknownTag { name: name.into() }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Csv(_) => "csv",
            Self::MalformedCatalog { .. } => "malformed",
            Self::DuplicateTag { .. } => "duplicate_tag",
            Self::DuplicateNode { .. } => "duplicate_node",
            Self::UnknownTag { .. } => "unknown_tag",
        }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration content.
    #[error("Failed to parse config '{path}': {message}")]
    Parse {
        /// Path to the configuration file, or `<string>`.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Failure to establish the session's subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// There is no live session.
    #[error("Cannot subscribe: not connected")]
    NotConnected,

    /// The server refused the subscription or every monitored item.
    #[error("Subscription rejected: {message}")]
    Rejected {
        /// Details from the server.
        message: String,
    },

    /// The transport failed while subscribing.
    #[error("Subscription transport failure: {0}")]
    Transport(#[from] OpcUaError),
}

impl SubscriptionError {
    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns `true` if a fresh session may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected | Self::Rejected { .. } => true,
            Self::Transport(e) => e.is_retryable(),
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected => ErrorSeverity::Info,
            Self::Rejected { .. } => ErrorSeverity::Error,
            Self::Transport(e) => e.severity(),
        }
    }
}

// =============================================================================
// WriteError
// =============================================================================

/// Outcome of a failed write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    /// The tag is not in the catalog.
    #[error("Unknown tag: {tag}")]
    UnknownTag {
        /// The requested tag.
        tag: String,
    },

    /// The tag is read-only.
    #[error("Tag '{tag}' is not writable")]
    NotWritable {
        /// The tag.
        tag: String,
    },

    /// The value does not match the tag's declared type.
    #[error("Type mismatch for '{tag}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The tag.
        tag: String,
        /// Declared data type.
        expected: &'static str,
        /// Supplied value type.
        actual: &'static str,
    },

    /// The value cannot be encoded for the wire.
    #[error("Value {value} for '{tag}' is out of range")]
    OutOfRange {
        /// The tag.
        tag: String,
        /// The offending value.
        value: String,
    },

    /// There is no live session.
    #[error("Not connected")]
    NotConnected,

    /// A write for the same tag has not resolved yet.
    #[error("A write to '{tag}' is already in flight")]
    WriteAlreadyInFlight {
        /// The tag.
        tag: String,
    },

    /// The server answered with a bad status.
    #[error("Write rejected by server: {status_name} (0x{status:08X})")]
    Rejected {
        /// Raw status code.
        status: u32,
        /// Symbolic name of the status code.
        status_name: &'static str,
    },

    /// The transport failed.
    #[error("Write failed: {message}")]
    Failed {
        /// Failure details.
        message: String,
    },

    /// No answer within the request timeout.
    #[error("Write timed out after {timeout:?}")]
    TimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The monitor was closed while the write was pending.
    #[error("Write cancelled")]
    Cancelled,
}

impl WriteError {
    /// Creates an unknown tag error.
    pub fn unknown_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTag { tag: tag.into() }
    }

    /// Creates a rejection from a status code.
    pub fn rejected(status: u32) -> Self {
        Self::Rejected {
            status,
            status_name: OperationError::status_code_name(status),
        }
    }

    /// Maps a transport error raised by a write.
    pub fn from_transport(error: &OpcUaError) -> Self {
        match error {
            OpcUaError::Connection(ConnectionError::NotConnected)
            | OpcUaError::Connection(ConnectionError::Closed { .. }) => Self::NotConnected,
            OpcUaError::Timeout(e) => Self::TimedOut {
                timeout: e.duration,
            },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }

    /// Returns `true` if the same write may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::WriteAlreadyInFlight { .. } | Self::Failed { .. } | Self::TimedOut { .. }
        )
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnknownTag { .. }
            | Self::NotWritable { .. }
            | Self::TypeMismatch { .. }
            | Self::OutOfRange { .. }
            | Self::WriteAlreadyInFlight { .. }
            | Self::Cancelled => ErrorSeverity::Info,
            Self::NotConnected | Self::TimedOut { .. } => ErrorSeverity::Warning,
            Self::Rejected { .. } | Self::Failed { .. } => ErrorSeverity::Error,
        }
    }

    /// Logs this error with a level matching its severity.
    pub fn log(&self, context: &str) {
        match self.severity().to_tracing_level() {
            Level::ERROR => tracing::error!(context, retryable = self.is_retryable(), "{self}"),
            Level::WARN => tracing::warn!(context, retryable = self.is_retryable(), "{self}"),
            _ => tracing::debug!(context, retryable = self.is_retryable(), "{self}"),
        }
    }

    /// Returns `true` if the write was refused before reaching the network.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnknownTag { .. }
                | Self::NotWritable { .. }
                | Self::TypeMismatch { .. }
                | Self::OutOfRange { .. }
                | Self::NotConnected
                | Self::WriteAlreadyInFlight { .. }
        )
    }
}

// =============================================================================
// AlarmError / ResetError
// =============================================================================

/// Reset preconditions that were not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlarmError {
    /// The tag is not in the catalog.
    #[error("Unknown tag: {tag}")]
    UnknownTag {
        /// The requested tag.
        tag: String,
    },

    /// The alarm tag is read-only.
    #[error("Alarm '{tag}' is not writable")]
    NotWritable {
        /// The tag.
        tag: String,
    },

    /// The tag has no alarm category.
    #[error("Tag '{tag}' is not an alarm point")]
    NotAnAlarm {
        /// The tag.
        tag: String,
    },

    /// The alarm is already clear.
    #[error("Alarm '{tag}' is not active")]
    NotActive {
        /// The tag.
        tag: String,
    },

    /// A reset is already awaiting confirmation.
    #[error("Alarm '{tag}' already has a reset pending")]
    ResetPending {
        /// The tag.
        tag: String,
    },
}

/// Why an operator reset failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResetError {
    /// The alarm point refused the reset.
    #[error(transparent)]
    Alarm(#[from] AlarmError),

    /// The reset write failed; the point went back to active.
    #[error("Reset write failed: {0}")]
    Write(#[from] WriteError),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use presswatch_opcua::TimeoutError;

    #[test]
    fn test_write_error_from_transport() {
        assert_eq!(
            WriteError::from_transport(&OpcUaError::not_connected()),
            WriteError::NotConnected
        );

        let timeout = OpcUaError::timeout(TimeoutError::new("write", Duration::from_secs(2)));
        assert_eq!(
            WriteError::from_transport(&timeout),
            WriteError::TimedOut {
                timeout: Duration::from_secs(2)
            }
        );

        let failed = WriteError::from_transport(&OpcUaError::connection_refused("opc.tcp://plc:4840"));
        assert!(matches!(failed, WriteError::Failed { .. }));
    }

    #[test]
    fn test_write_error_rejected_name() {
        let error = WriteError::rejected(0x803B_0000);
        assert_eq!(error.to_string(), "Write rejected by server: BadNotWritable (0x803B0000)");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_write_error_classification() {
        assert!(WriteError::NotConnected.is_precondition());
        assert!(!WriteError::Cancelled.is_precondition());
        assert!(WriteError::WriteAlreadyInFlight { tag: "t".into() }.is_retryable());
    }

    #[test]
    fn test_reset_error_display() {
        let error: ResetError = AlarmError::NotActive { tag: "bath1".into() }.into();
        assert_eq!(error.to_string(), "Alarm 'bath1' is not active");

        let error: ResetError = WriteError::Cancelled.into();
        assert_eq!(error.to_string(), "Reset write failed: Write cancelled");
    }

    #[test]
    fn test_catalog_error_messages() {
        let error = CatalogError::malformed(3, "missing node_id");
        assert_eq!(error.to_string(), "Malformed catalog row 3: missing node_id");
        assert_eq!(CatalogError::unknown_tag("x").error_type(), "unknown_tag");
    }
}
