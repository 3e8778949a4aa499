// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! [`MockTransport`] plays the OPC UA server. It keeps a value per node,
//! pushes data changes for monitored nodes, and can be scripted to refuse
//! connects, delay or reject writes, reject monitored items, and drop the
//! session.
//!
//! Like a real server it reports the current value of a node as soon as a
//! monitored item is created for it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use presswatch_opcua::{
    DataChangeNotification, MonitoredItemRequest, MonitoredItemResult, NodeId, OpcUaError,
    OpcUaResult, OpcUaTransport, OpcUaValue, SubscriptionError, SubscriptionSettings, TransportEvent,
    TransportEventSender, TransportState, TypedValue, WriteResult,
};
use tracing::debug;

use super::fixtures::MOCK_ENDPOINT;

/// `BadNodeIdUnknown`, used for rejected monitored items.
pub const BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;

/// `BadUserAccessDenied`, a typical write rejection.
pub const BAD_USER_ACCESS_DENIED: u32 = 0x801F_0000;

/// Where a monitored node's notifications go.
#[derive(Debug, Clone, Copy)]
struct MonitoredNode {
    subscription_id: u32,
    client_handle: u32,
}

/// An in-memory OPC UA server.
#[derive(Debug)]
pub struct MockTransport {
    endpoint: String,

    /// Event sender of the current session.
    events: Mutex<Option<TransportEventSender>>,

    /// Monitored nodes of the current session.
    monitored: Mutex<HashMap<NodeId, MonitoredNode>>,

    /// Server-side values.
    values: Mutex<HashMap<NodeId, TypedValue>>,

    /// Nodes the server refuses to monitor.
    rejected_nodes: Mutex<HashSet<NodeId>>,

    /// Every write, in order.
    write_history: Mutex<Vec<(NodeId, OpcUaValue)>>,

    /// Simulated write latency.
    write_latency: Mutex<Duration>,

    /// Status code returned for writes.
    write_status: AtomicU32,

    /// Force writes to fail at the transport level.
    fail_writes: AtomicBool,

    /// Accepted writes update the node value and notify subscribers.
    echo_writes: AtomicBool,

    /// Connects to refuse before accepting.
    connect_failures: AtomicU32,

    /// Subscription creations to fail before accepting.
    subscription_failures: AtomicU32,

    next_subscription_id: AtomicU32,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
    subscription_count: AtomicU32,
}

impl MockTransport {
    /// Creates a transport with no scripted failures.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_endpoint(MOCK_ENDPOINT))
    }

    /// Creates a transport that refuses the first `failures` connects.
    pub fn refusing(failures: u32) -> Arc<Self> {
        let transport = Self::with_endpoint(MOCK_ENDPOINT);
        transport.connect_failures.store(failures, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// Creates a transport for `endpoint`.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            events: Mutex::new(None),
            monitored: Mutex::new(HashMap::new()),
            values: Mutex::new(HashMap::new()),
            rejected_nodes: Mutex::new(HashSet::new()),
            write_history: Mutex::new(Vec::new()),
            write_latency: Mutex::new(Duration::from_millis(10)),
            write_status: AtomicU32::new(0),
            fail_writes: AtomicBool::new(false),
            echo_writes: AtomicBool::new(false),
            connect_failures: AtomicU32::new(0),
            subscription_failures: AtomicU32::new(0),
            next_subscription_id: AtomicU32::new(1),
            connect_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
            subscription_count: AtomicU32::new(0),
        }
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// Refuses the next `failures` connects.
    pub fn refuse_connects(&self, failures: u32) {
        self.connect_failures.store(failures, Ordering::SeqCst);
    }

    /// Fails the next `failures` subscription creations.
    pub fn fail_subscriptions(&self, failures: u32) {
        self.subscription_failures.store(failures, Ordering::SeqCst);
    }

    /// Rejects monitored item creation for `node`.
    pub fn reject_node(&self, node: NodeId) {
        self.rejected_nodes.lock().insert(node);
    }

    /// Sets the write latency.
    pub fn set_write_latency(&self, latency: Duration) {
        *self.write_latency.lock() = latency;
    }

    /// Sets the status code returned for writes. `0` is Good.
    pub fn set_write_status(&self, status_code: u32) {
        self.write_status.store(status_code, Ordering::SeqCst);
    }

    /// Makes every write fail at the transport level.
    pub fn fail_all_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes accepted writes show up as data changes, like a PLC that
    /// latches the written value.
    pub fn echo_writes(&self, echo: bool) {
        self.echo_writes.store(echo, Ordering::SeqCst);
    }

    // =========================================================================
    // Server-side values
    // =========================================================================

    /// Sets a node value and notifies if it is monitored.
    pub fn set_value(&self, node: &NodeId, value: TypedValue) {
        self.values.lock().insert(node.clone(), value.clone());
        self.notify(node, value);
    }

    /// Sets a Good boolean.
    pub fn set_bool(&self, node: &NodeId, value: bool) {
        self.set_value(node, TypedValue::new(OpcUaValue::Boolean(value)));
    }

    /// Reports the current value again with a different status code.
    pub fn set_status(&self, node: &NodeId, status_code: u32) {
        let current = self
            .values
            .lock()
            .get(node)
            .map(|v| v.value.clone())
            .unwrap_or_default();
        self.set_value(node, TypedValue::with_status(current, status_code));
    }

    /// Current server-side value.
    pub fn value(&self, node: &NodeId) -> Option<OpcUaValue> {
        self.values.lock().get(node).map(|v| v.value.clone())
    }

    fn notify(&self, node: &NodeId, value: TypedValue) -> bool {
        let Some(item) = self.monitored.lock().get(node).copied() else {
            return false;
        };
        let events = self.events.lock();
        let Some(sender) = events.as_ref() else {
            return false;
        };
        sender
            .send(TransportEvent::DataChange(DataChangeNotification {
                subscription_id: item.subscription_id,
                client_handle: item.client_handle,
                value,
            }))
            .is_ok()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Drops the session as if the network went away.
    pub fn drop_connection(&self, reason: &str) {
        self.monitored.lock().clear();
        if let Some(sender) = self.events.lock().take() {
            debug!(reason, "Mock dropping session");
            let _ = sender.send(TransportEvent::ConnectionLost {
                reason: reason.to_string(),
            });
        }
    }

    /// Returns `true` if `node` is monitored in the current session.
    pub fn is_monitored(&self, node: &NodeId) -> bool {
        self.monitored.lock().contains_key(node)
    }

    /// Number of monitored nodes in the current session.
    pub fn monitored_count(&self) -> usize {
        self.monitored.lock().len()
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Connect attempts so far.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Disconnects so far.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    /// Subscriptions created so far.
    pub fn subscription_count(&self) -> u32 {
        self.subscription_count.load(Ordering::SeqCst)
    }

    /// Every write, in order.
    pub fn writes(&self) -> Vec<(NodeId, OpcUaValue)> {
        self.write_history.lock().clone()
    }

    /// Writes to `node`, in order.
    pub fn writes_to(&self, node: &NodeId) -> Vec<OpcUaValue> {
        self.write_history
            .lock()
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::with_endpoint(MOCK_ENDPOINT)
    }
}

/// Decrements `counter` if it is positive, returning `true` if it was.
fn consume(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn connect(&self, events: TransportEventSender) -> OpcUaResult<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if consume(&self.connect_failures) {
            return Err(OpcUaError::connection_refused(&self.endpoint));
        }
        self.monitored.lock().clear();
        *self.events.lock() = Some(events);
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.monitored.lock().clear();
        self.events.lock().take();
        Ok(())
    }

    fn state(&self) -> TransportState {
        if self.events.lock().is_some() {
            TransportState::Connected
        } else {
            TransportState::Disconnected
        }
    }

    async fn write_value(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<WriteResult> {
        if self.events.lock().is_none() {
            return Err(OpcUaError::not_connected());
        }
        self.write_history
            .lock()
            .push((node_id.clone(), value.clone()));

        let latency = *self.write_latency.lock();
        tokio::time::sleep(latency).await;

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OpcUaError::write_failed(node_id.to_string(), "injected failure"));
        }
        let status = self.write_status.load(Ordering::SeqCst);
        if status != 0 {
            return Ok(WriteResult::failure(node_id.clone(), status));
        }
        if self.echo_writes.load(Ordering::SeqCst) {
            self.set_value(node_id, TypedValue::new(value));
        }
        Ok(WriteResult::success(node_id.clone()))
    }

    async fn create_subscription(&self, _settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        if self.events.lock().is_none() {
            return Err(OpcUaError::not_connected());
        }
        if consume(&self.subscription_failures) {
            return Err(OpcUaError::subscription(SubscriptionError::creation_failed(
                "injected failure",
            )));
        }
        self.subscription_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_subscription_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.monitored
            .lock()
            .retain(|_, item| item.subscription_id != subscription_id);
        Ok(())
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        let rejected = self.rejected_nodes.lock().clone();
        let mut results = Vec::with_capacity(items.len());
        let mut initial = Vec::new();

        for (i, item) in items.iter().enumerate() {
            if rejected.contains(&item.node_id) {
                results.push(MonitoredItemResult {
                    client_handle: item.client_handle,
                    monitored_item_id: 0,
                    status_code: BAD_NODE_ID_UNKNOWN,
                });
                continue;
            }
            self.monitored.lock().insert(
                item.node_id.clone(),
                MonitoredNode {
                    subscription_id,
                    client_handle: item.client_handle,
                },
            );
            if let Some(value) = self.values.lock().get(&item.node_id) {
                initial.push((item.node_id.clone(), value.clone()));
            }
            results.push(MonitoredItemResult {
                client_handle: item.client_handle,
                monitored_item_id: i as u32 + 1,
                status_code: 0,
            });
        }

        for (node, value) in initial {
            self.notify(&node, value);
        }
        Ok(results)
    }

    fn display_name(&self) -> String {
        format!("mock({})", self.endpoint)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
