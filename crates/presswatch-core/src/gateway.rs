// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Write gateway.
//!
//! Validates a write against the catalog, guarantees at most one write per
//! tag is outstanding, and sends it through the current session.
//!
//! Checks run in this order, all before any network call:
//!
//! 1. unknown tag
//! 2. read-only tag
//! 3. value type does not match the declared type
//! 4. value cannot be encoded (integer outside Int32)
//! 5. no live session
//! 6. another write to the same tag is in flight

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use presswatch_opcua::OpcUaValue;
use tracing::{debug, instrument};

use crate::catalog::{TagCatalog, TagDefinition};
use crate::connection::ConnectionHandle;
use crate::error::WriteError;
use crate::value::TagVariant;

// =============================================================================
// Metrics
// =============================================================================

/// Counters for the write gateway.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Writes that reached the session.
    pub writes_sent: AtomicU64,
    /// Writes the server accepted.
    pub writes_succeeded: AtomicU64,
    /// Writes that failed after being sent.
    pub writes_failed: AtomicU64,
    /// Writes refused before reaching the network.
    pub writes_refused: AtomicU64,
}

impl GatewayMetrics {
    /// Creates a snapshot of the current counters.
    pub fn snapshot(&self) -> GatewayMetricsSnapshot {
        GatewayMetricsSnapshot {
            writes_sent: self.writes_sent.load(Ordering::Relaxed),
            writes_succeeded: self.writes_succeeded.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            writes_refused: self.writes_refused.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of gateway counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayMetricsSnapshot {
    /// Writes that reached the session.
    pub writes_sent: u64,
    /// Writes the server accepted.
    pub writes_succeeded: u64,
    /// Writes that failed after being sent.
    pub writes_failed: u64,
    /// Writes refused before reaching the network.
    pub writes_refused: u64,
}

// =============================================================================
// WriteGateway
// =============================================================================

/// Serializes writes back to the server.
#[derive(Debug, Clone)]
pub struct WriteGateway {
    catalog: Arc<TagCatalog>,
    connection: ConnectionHandle,
    in_flight: Arc<Mutex<HashSet<String>>>,
    metrics: Arc<GatewayMetrics>,
}

impl WriteGateway {
    /// Creates a gateway for a catalog and connection.
    pub fn new(catalog: Arc<TagCatalog>, connection: ConnectionHandle) -> Self {
        Self {
            catalog,
            connection,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            metrics: Arc::new(GatewayMetrics::default()),
        }
    }

    /// Writes `value` to `tag`.
    ///
    /// Resolves once the server has answered, the request timed out, the
    /// session dropped, or the connection was closed.
    pub async fn write(&self, tag: &str, value: TagVariant) -> Result<(), WriteError> {
        self.write_then(tag, value, || {}).await
    }

    /// Like [`write`](Self::write), calling `on_send` once every check has
    /// passed and the write is handed to the session.
    #[instrument(skip(self, value, on_send))]
    pub async fn write_then<F>(&self, tag: &str, value: TagVariant, on_send: F) -> Result<(), WriteError>
    where
        F: FnOnce(),
    {
        let (definition, encoded) = match self.prepare(tag, &value) {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.refuse(e)),
        };
        if !self.connection.state().is_connected() {
            return Err(self.refuse(WriteError::NotConnected));
        }
        let _guard = match InFlightGuard::acquire(&self.in_flight, tag) {
            Some(guard) => guard,
            None => {
                return Err(self.refuse(WriteError::WriteAlreadyInFlight {
                    tag: tag.to_string(),
                }))
            }
        };

        let node_id = definition.node_id.clone();
        self.metrics.writes_sent.fetch_add(1, Ordering::Relaxed);
        on_send();
        let start = Instant::now();

        match self.connection.write(node_id, encoded).await {
            Ok(()) => {
                self.metrics.writes_succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    value = %value,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Write completed"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    value = %value,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Write failed"
                );
                e.log("write");
                Err(e)
            }
        }
    }

    /// Runs the catalog checks and encodes the value.
    pub fn prepare(
        &self,
        tag: &str,
        value: &TagVariant,
    ) -> Result<(&TagDefinition, OpcUaValue), WriteError> {
        let definition = self
            .catalog
            .get(tag)
            .ok_or_else(|| WriteError::unknown_tag(tag))?;

        if !definition.is_writable() {
            return Err(WriteError::NotWritable {
                tag: tag.to_string(),
            });
        }

        if value.data_type() != definition.data_type {
            return Err(WriteError::TypeMismatch {
                tag: tag.to_string(),
                expected: definition.data_type.name(),
                actual: value.data_type().name(),
            });
        }

        let encoded = value.to_opcua().ok_or_else(|| WriteError::OutOfRange {
            tag: tag.to_string(),
            value: value.to_string(),
        })?;

        Ok((definition, encoded))
    }

    /// Returns `true` if a write to `tag` has not resolved yet.
    pub fn is_in_flight(&self, tag: &str) -> bool {
        self.in_flight.lock().contains(tag)
    }

    /// Gateway counters.
    pub fn metrics(&self) -> GatewayMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn refuse(&self, error: WriteError) -> WriteError {
        self.metrics.writes_refused.fetch_add(1, Ordering::Relaxed);
        debug!(error = %error, "Write refused");
        error
    }
}

/// Holds a tag in the in-flight set until dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    tag: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, tag: &str) -> Option<Self> {
        if !set.lock().insert(tag.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            tag: tag.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.tag);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AlarmCategory, TagAccess, TagDataType};
    use crate::connection::{ConnectionManager, ConnectionOptions};
    use async_trait::async_trait;
    use presswatch_opcua::{
        MonitoredItemRequest, MonitoredItemResult, NodeId, OpcUaError, OpcUaResult,
        OpcUaTransport, SubscriptionSettings, TransportEventSender, TransportState, WriteResult,
    };

    /// A server that is never reachable.
    struct Unreachable;

    #[async_trait]
    impl OpcUaTransport for Unreachable {
        async fn connect(&self, _events: TransportEventSender) -> OpcUaResult<()> {
            Err(OpcUaError::connection_refused("opc.tcp://nowhere:4840"))
        }

        async fn disconnect(&self) -> OpcUaResult<()> {
            Ok(())
        }

        fn state(&self) -> TransportState {
            TransportState::Disconnected
        }

        async fn write_value(&self, _node_id: &NodeId, _value: OpcUaValue) -> OpcUaResult<WriteResult> {
            Err(OpcUaError::not_connected())
        }

        async fn create_subscription(&self, _settings: &SubscriptionSettings) -> OpcUaResult<u32> {
            Err(OpcUaError::not_connected())
        }

        async fn delete_subscription(&self, _subscription_id: u32) -> OpcUaResult<()> {
            Ok(())
        }

        async fn create_monitored_items(
            &self,
            _subscription_id: u32,
            _items: &[MonitoredItemRequest],
        ) -> OpcUaResult<Vec<MonitoredItemResult>> {
            Err(OpcUaError::not_connected())
        }

        fn display_name(&self) -> String {
            "unreachable".to_string()
        }

        fn endpoint(&self) -> &str {
            "opc.tcp://nowhere:4840"
        }
    }

    fn gateway() -> WriteGateway {
        let catalog = TagCatalog::from_definitions([
            TagDefinition::new("bath1", NodeId::numeric(2, 10), TagDataType::Boolean, TagAccess::ReadWrite)
                .with_category(AlarmCategory::Bath),
            TagDefinition::new("room301", NodeId::numeric(2, 11), TagDataType::Boolean, TagAccess::ReadOnly),
            TagDefinition::new("delay", NodeId::numeric(2, 12), TagDataType::Integer, TagAccess::ReadWrite),
        ])
        .unwrap();
        let (connection, _events, _task) =
            ConnectionManager::spawn(Arc::new(Unreachable), ConnectionOptions::default());
        WriteGateway::new(Arc::new(catalog), connection)
    }

    #[tokio::test]
    async fn test_precondition_order() {
        let gateway = gateway();

        assert_eq!(
            gateway.write("lobby", true.into()).await.unwrap_err(),
            WriteError::UnknownTag { tag: "lobby".into() }
        );
        assert_eq!(
            gateway.write("room301", 1i64.into()).await.unwrap_err(),
            WriteError::NotWritable { tag: "room301".into() }
        );
        assert_eq!(
            gateway.write("bath1", 1i64.into()).await.unwrap_err(),
            WriteError::TypeMismatch {
                tag: "bath1".into(),
                expected: "Boolean",
                actual: "Integer"
            }
        );
        assert!(matches!(
            gateway.write("delay", (i32::MAX as i64 + 1).into()).await.unwrap_err(),
            WriteError::OutOfRange { .. }
        ));
        assert_eq!(
            gateway.write("bath1", false.into()).await.unwrap_err(),
            WriteError::NotConnected
        );

        let metrics = gateway.metrics();
        assert_eq!(metrics.writes_refused, 5);
        assert_eq!(metrics.writes_sent, 0);
    }

    #[tokio::test]
    async fn test_prepare_encodes_int32() {
        let gateway = gateway();
        let (definition, encoded) = gateway.prepare("delay", &TagVariant::Integer(30)).unwrap();
        assert_eq!(definition.name, "delay");
        assert_eq!(encoded, OpcUaValue::Int32(30));
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let guard = InFlightGuard::acquire(&set, "bath1").unwrap();
        assert!(InFlightGuard::acquire(&set, "bath1").is_none());
        assert!(InFlightGuard::acquire(&set, "room501").is_some());
        drop(guard);
        assert!(InFlightGuard::acquire(&set, "bath1").is_some());
    }
}
