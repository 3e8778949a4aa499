// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client error types.
//!
//! Errors raised by the transport layer. None of them are meant to reach
//! the alarm engine: the connection manager in `presswatch-core` absorbs
//! them and turns them into state transitions.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint and session establishment
//! ├── Operation     - Write failures reported by the server
//! ├── Subscription  - Subscription and monitored item failures
//! ├── Configuration - Invalid client settings or node ids
//! └── Timeout       - Request deadline exceeded
//! ```
//!
//! # Examples
//!
//! ```
//! use presswatch_opcua::error::{ConnectionError, OpcUaError};
//!
//! let error = OpcUaError::connection(ConnectionError::refused("opc.tcp://plc:4840"));
//! assert!(error.is_retryable());
//! assert_eq!(error.category(), "connection");
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Result alias for transport operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for OPC UA transport operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Write operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitoring errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    /// Shorthand for a "not connected" error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Shorthand for a refused connection.
    pub fn connection_refused(endpoint: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::refused(endpoint))
    }

    /// Shorthand for a failed write.
    pub fn write_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation(OperationError::write_failed(node_id, message))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Operation(_) => false,
            Self::Subscription(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Configuration(_) => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Operation(_) => ErrorSeverity::Error,
            Self::Subscription(_) => ErrorSeverity::Warning,
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Connection refused.
    #[error("Connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
    },

    /// Connection timed out.
    #[error("Connection timed out to '{endpoint}' after {duration:?}")]
    TimedOut {
        /// Target endpoint.
        endpoint: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// Endpoint discovery failed.
    #[error("Endpoint not found: '{endpoint}'")]
    EndpointNotFound {
        /// The endpoint URL.
        endpoint: String,
    },

    /// No endpoint matches the configured security.
    #[error("No suitable endpoint found with security '{security}'")]
    NoSuitableEndpoint {
        /// Requested security mode and policy.
        security: String,
    },

    /// The session was closed by the server or the network.
    #[error("Connection closed: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Closed {
        /// Reason for closure.
        reason: Option<String>,
    },

    /// Not connected.
    #[error("Not connected to OPC UA server")]
    NotConnected,
}

impl ConnectionError {
    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a timed out error.
    pub fn timed_out(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::TimedOut {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates an endpoint not found error.
    pub fn endpoint_not_found(endpoint: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a no suitable endpoint error.
    pub fn no_suitable_endpoint(security: impl Into<String>) -> Self {
        Self::NoSuitableEndpoint {
            security: security.into(),
        }
    }

    /// Creates a connection closed error.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// The monitor retries every connection error forever; this only
    /// decides the log level of a failed attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoSuitableEndpoint { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected | Self::TimedOut { .. } | Self::Closed { .. } => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Error,
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Write operation errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The write request itself failed.
    #[error("Write failed for node '{node_id}': {message}")]
    WriteFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
    },
}

impl OperationError {
    /// Creates a write failed error.
    pub fn write_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Returns a short name for the status codes a write commonly returns.
    pub fn status_code_name(code: u32) -> &'static str {
        match code {
            0x0000_0000 => "Good",
            0x8000_0000 => "Bad",
            0x8001_0000 => "BadUnexpectedError",
            0x800A_0000 => "BadTimeout",
            0x800D_0000 => "BadServerNotConnected",
            0x8034_0000 => "BadNodeIdUnknown",
            0x803B_0000 => "BadNotWritable",
            0x8074_0000 => "BadTypeMismatch",
            0x803C_0000 => "BadOutOfRange",
            0x801F_0000 => "BadUserAccessDenied",
            _ if code & 0x8000_0000 != 0 => "Bad",
            _ if code & 0x4000_0000 != 0 => "Uncertain",
            _ => "Good",
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Subscription creation failed.
    #[error("Failed to create subscription: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// Monitored item creation failed.
    #[error("Failed to create monitored item for node '{node_id}': {message}")]
    MonitoredItemFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
    },
}

impl SubscriptionError {
    /// Creates a subscription creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates a monitored item failed error.
    pub fn monitored_item_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MonitoredItemFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. })
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// The endpoint URL is invalid.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// The URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A node id string could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// The node id text.
        node_id: String,
        /// Reason.
        reason: String,
    },

    /// Inconsistent security settings.
    #[error("Invalid security configuration: {message}")]
    InvalidSecurity {
        /// Error message.
        message: String,
    },

    /// A timeout value is invalid.
    #[error("Invalid timeout {value:?}: {reason}")]
    InvalidTimeout {
        /// The timeout.
        value: Duration,
        /// Reason.
        reason: String,
    },

    /// A security mode or policy name is unknown.
    #[error("Unknown {kind} '{value}'")]
    UnknownName {
        /// What was being parsed.
        kind: &'static str,
        /// The unparsed text.
        value: String,
    },
}

impl ConfigurationError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid security error.
    pub fn invalid_security(message: impl Into<String>) -> Self {
        Self::InvalidSecurity {
            message: message.into(),
        }
    }

    /// Creates an invalid timeout error.
    pub fn invalid_timeout(value: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            value,
            reason: reason.into(),
        }
    }

    /// Creates an unknown name error.
    pub fn unknown_name(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownName {
            kind,
            value: value.into(),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// A request did not complete in time.
#[derive(Debug, Error)]
#[error("{operation} timed out after {duration:?}")]
pub struct TimeoutError {
    /// The operation that timed out.
    pub operation: &'static str,
    /// The deadline that was exceeded.
    pub duration: Duration,
}

impl TimeoutError {
    /// Creates a timeout error.
    pub fn new(operation: &'static str, duration: Duration) -> Self {
        Self {
            operation,
            duration,
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_is_retryable() {
        assert!(OpcUaError::connection_refused("opc.tcp://plc:4840").is_retryable());
        assert!(OpcUaError::not_connected().is_retryable());
        assert!(!OpcUaError::connection(ConnectionError::no_suitable_endpoint("Sign")).is_retryable());
    }

    #[test]
    fn test_status_code_names() {
        assert_eq!(OperationError::status_code_name(0x803B_0000), "BadNotWritable");
        assert_eq!(OperationError::status_code_name(0x8099_0000), "Bad");
        assert_eq!(OperationError::status_code_name(0x4000_0000), "Uncertain");
        assert!(!OpcUaError::write_failed("ns=2;i=10", "socket closed").is_retryable());
    }

    #[test]
    fn test_closed_message() {
        let err = ConnectionError::closed(Some("socket reset".into()));
        assert_eq!(err.to_string(), "Connection closed: socket reset");
        assert_eq!(
            ConnectionError::closed(None).to_string(),
            "Connection closed: no reason given"
        );
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(ErrorSeverity::Warning.to_tracing_level(), Level::WARN);
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), Level::ERROR);
        assert_eq!(
            OpcUaError::configuration(ConfigurationError::missing_field("endpoint")).severity(),
            ErrorSeverity::Critical
        );
    }
}
