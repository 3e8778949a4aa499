// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The transport is the only place that talks to the network. Data change
//! notifications and connection drops are pushed into the
//! [`TransportEventSender`] handed over at connect time, so the caller can
//! tell one session's traffic apart from the next.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::client::conversion::TypedValue;
use crate::error::OpcUaResult;
use crate::types::{MonitoredItemSettings, NodeId, SubscriptionSettings};

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is establishing connection.
    Connecting,

    /// Transport is connected and ready.
    Connected,

    /// Transport connection has failed.
    Failed,
}

impl TransportState {
    /// Returns `true` if the transport is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// WriteResult
// =============================================================================

/// Result of a node write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// The node ID that was written.
    pub node_id: NodeId,

    /// Status code of the write operation.
    pub status_code: u32,
}

impl WriteResult {
    /// Creates a successful write result.
    pub fn success(node_id: NodeId) -> Self {
        Self {
            node_id,
            status_code: 0,
        }
    }

    /// Creates a failed write result.
    pub fn failure(node_id: NodeId, status_code: u32) -> Self {
        Self {
            node_id,
            status_code,
        }
    }

    /// Returns `true` if the server accepted the write.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status_code & 0xC000_0000 == 0
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// Raw OPC UA scalar as it travels over the transport.
///
/// Conversion to the declared tag type happens in the subscription layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// String value.
    String(String),

    /// Date/time value.
    DateTime(chrono::DateTime<chrono::Utc>),

    /// Byte string.
    ByteString(Vec<u8>),

    /// Null value.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns the OPC UA built-in type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::ByteString(_) => "ByteString",
            Self::Null => "Null",
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to get the value as a boolean.
    ///
    /// Integer encodings are accepted when they are exactly 0 or 1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => match self.as_i64()? {
                0 => Some(false),
                1 => Some(true),
                _ => None,
            },
        }
    }

    /// Attempts to get the value as an i64 without loss.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(*v as i64),
            Self::Byte(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::UInt16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::UInt32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::Float(v) => float_to_i64(*v as f64),
            Self::Double(v) => float_to_i64(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SByte(v) => Some(*v as f64),
            Self::Byte(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Integral floats only; NaN, infinities and fractions have no integer form.
fn float_to_i64(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// Transport events
// =============================================================================

/// A single data change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeNotification {
    /// Subscription the monitored item belongs to.
    pub subscription_id: u32,

    /// Client handle assigned when the item was created.
    pub client_handle: u32,

    /// The reported value with quality and timestamps.
    pub value: TypedValue,
}

/// Events the transport pushes to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A monitored item changed.
    DataChange(DataChangeNotification),

    /// The session dropped underneath the client.
    ConnectionLost {
        /// Why the session ended, if known.
        reason: String,
    },
}

/// Sender half handed to [`OpcUaTransport::connect`].
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half kept by the transport owner.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates a fresh transport event channel.
pub fn transport_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// Monitored item requests
// =============================================================================

/// One monitored item to create.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemRequest {
    /// Node to monitor.
    pub node_id: NodeId,

    /// Handle echoed back in every notification for this item.
    pub client_handle: u32,

    /// Sampling, queueing and deadband.
    pub settings: MonitoredItemSettings,
}

/// Server answer for one monitored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredItemResult {
    /// Handle from the request.
    pub client_handle: u32,

    /// Server-assigned monitored item ID.
    pub monitored_item_id: u32,

    /// Status code for the creation.
    pub status_code: u32,
}

impl MonitoredItemResult {
    /// Returns `true` if the server created the item.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status_code & 0xC000_0000 == 0
    }
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport trait for OPC UA communication.
///
/// All methods take `&self`; implementations keep their session behind
/// interior mutability so a single owner task can issue concurrent writes.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Establishes a session with the server.
    ///
    /// Data changes and drops for this session are delivered through `events`
    /// until [`disconnect`](Self::disconnect) is called or the session is lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self, events: TransportEventSender) -> OpcUaResult<()>;

    /// Closes the session. Closing a closed transport is not an error.
    async fn disconnect(&self) -> OpcUaResult<()>;

    /// Returns the current transport state.
    fn state(&self) -> TransportState;

    /// Returns `true` if the transport is currently connected.
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Writes the value attribute of a single node.
    ///
    /// A server-side rejection is reported through
    /// [`WriteResult::status_code`], not as an error.
    async fn write_value(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<WriteResult>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Creates a subscription and returns its ID.
    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    /// Creates monitored items, returning one result per request in order.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns the transport display name for logging.
    fn display_name(&self) -> String;

    /// Returns the server endpoint URL.
    fn endpoint(&self) -> &str;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_state() {
        assert!(TransportState::Connected.is_connected());
        assert!(!TransportState::Disconnected.is_connected());
        assert!(!TransportState::Failed.is_connected());
        assert_eq!(TransportState::Connecting.to_string(), "Connecting");
    }

    #[test]
    fn test_write_result() {
        assert!(WriteResult::success(NodeId::numeric(2, 10)).is_good());
        assert!(!WriteResult::failure(NodeId::numeric(2, 10), 0x803B_0000).is_good());
        assert!(!WriteResult::failure(NodeId::numeric(2, 10), 0x4000_0000).is_good());
    }

    #[test]
    fn test_opcua_value_bool() {
        assert_eq!(OpcUaValue::Boolean(true).as_bool(), Some(true));
        assert_eq!(OpcUaValue::Byte(0).as_bool(), Some(false));
        assert_eq!(OpcUaValue::Int32(1).as_bool(), Some(true));
        assert_eq!(OpcUaValue::Int32(7).as_bool(), None);
        assert_eq!(OpcUaValue::String("true".into()).as_bool(), None);
    }

    #[test]
    fn test_opcua_value_numeric() {
        assert_eq!(OpcUaValue::Int32(42).as_i64(), Some(42));
        assert_eq!(OpcUaValue::Int32(42).as_f64(), Some(42.0));
        assert_eq!(OpcUaValue::Double(3.0).as_i64(), Some(3));
        assert_eq!(OpcUaValue::Double(3.5).as_i64(), None);
        assert_eq!(OpcUaValue::Double(f64::NAN).as_i64(), None);
        assert_eq!(OpcUaValue::UInt64(u64::MAX).as_i64(), None);
        assert!(OpcUaValue::Null.is_null());
        assert_eq!(OpcUaValue::Float(1.5).type_name(), "Float");
    }

    #[test]
    fn test_monitored_item_result() {
        let ok = MonitoredItemResult {
            client_handle: 1,
            monitored_item_id: 7,
            status_code: 0,
        };
        let rejected = MonitoredItemResult {
            status_code: 0x8034_0000,
            ..ok.clone()
        };
        assert!(ok.is_good());
        assert!(!rejected.is_good());
    }
}
