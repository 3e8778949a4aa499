// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime facade.
//!
//! [`Monitor::start`] wires the pieces together and returns a cloneable
//! [`MonitorHandle`], the only thing a presentation adapter needs.
//!
//! ```text
//!  OpcUaTransport ──▶ ConnectionManager ──ConnectionEvents──┐
//!                          ▲        │                        │
//!                          │        └─notifications─┐        │
//!                    WriteGateway                    ▼        ▼
//!                          ▲                   ┌──────────────────┐
//!                          │                   │  consumer loop   │
//!   MonitorHandle ─────────┴── reset/write ───▶│  AlarmEngine     │──▶ EventBus
//!                                              └──────────────────┘
//! ```
//!
//! The consumer loop is the only task that applies notifications. Reset
//! requests lock the engine briefly from the caller's task; the lock is never
//! held across an await.

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use presswatch_opcua::OpcUaTransport;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmEngine, AlarmPoint, AlarmSnapshot, AlarmTransition, PlainValue};
use crate::catalog::TagCatalog;
use crate::config::MonitorConfig;
use crate::connection::{
    ConnectionEvent, ConnectionEvents, ConnectionHandle, ConnectionManager, ConnectionOptions,
    ConnectionState, SessionId,
};
use crate::error::{ResetError, SubscriptionError, WriteError};
use crate::events::{EventBus, EventBusStats, EventSubscriber};
use crate::gateway::{GatewayMetricsSnapshot, WriteGateway};
use crate::subscription::{SubscriptionEngine, SubscriptionHandle};
use crate::value::{TagValue, TagVariant};

// =============================================================================
// Monitor
// =============================================================================

/// Entry point.
pub struct Monitor;

impl Monitor {
    /// Starts the connection task and the consumer loop, then requests the
    /// first connect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        catalog: Arc<TagCatalog>,
        transport: Arc<dyn OpcUaTransport>,
        config: &MonitorConfig,
    ) -> MonitorHandle {
        let endpoint = transport.endpoint().to_string();
        let options = ConnectionOptions::from_config(&config.server, &config.reconnect);
        let (connection, events, connection_task) = ConnectionManager::spawn(transport, options);

        let engine = Arc::new(Mutex::new(AlarmEngine::new(
            Arc::clone(&catalog),
            &config.alarms,
        )));
        let bus = EventBus::new(config.events.capacity);
        let gateway = WriteGateway::new(Arc::clone(&catalog), connection.clone());
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = Consumer {
            catalog: Arc::clone(&catalog),
            engine: Arc::clone(&engine),
            bus: bus.clone(),
            connection: connection.clone(),
            subscriptions: SubscriptionEngine::new(&config.subscription),
            events,
            subscription: None,
            wake: Arc::clone(&wake),
            shutdown: shutdown_rx,
        };
        let consumer_task = tokio::spawn(consumer.run());

        info!(
            endpoint = %endpoint,
            tags = catalog.len(),
            alarms = catalog.alarm_tags().count(),
            reset_timeout_ms = config.alarms.reset_timeout.as_millis() as u64,
            "Monitor started"
        );
        connection.connect();

        MonitorHandle {
            shared: Arc::new(Shared {
                catalog,
                engine,
                gateway,
                connection,
                bus,
                wake,
                shutdown: shutdown_tx,
                closed: AtomicBool::new(false),
                tasks: Mutex::new(vec![consumer_task, connection_task]),
            }),
        }
    }
}

// =============================================================================
// MonitorHandle
// =============================================================================

struct Shared {
    catalog: Arc<TagCatalog>,
    engine: Arc<Mutex<AlarmEngine>>,
    gateway: WriteGateway,
    connection: ConnectionHandle,
    bus: EventBus,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable handle to a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// Subscribes to monitor events published from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        self.shared.bus.subscribe()
    }

    /// Resets an active alarm by writing `false` to its tag.
    ///
    /// Returns once the write has resolved. The point stays PendingClear
    /// until the server reports `false`; if that does not happen within the
    /// reset timeout the point goes back to Active.
    ///
    /// # Errors
    ///
    /// [`ResetError::Alarm`] if the point refused the reset and
    /// [`ResetError::Write`] if the write failed, in which case the point is
    /// already back to Active.
    pub async fn reset(&self, tag: &str) -> Result<(), ResetError> {
        let (pending, events) = self.shared.engine.lock().begin_reset(tag, Instant::now())?;
        self.shared.bus.publish_all(events);
        self.shared.wake.notify_one();
        debug!(tag, node = %pending.node_id, "Writing reset");

        let engine = &self.shared.engine;
        let sent = || engine.lock().reset_sent(tag);
        match self.shared.gateway.write_then(tag, TagVariant::Boolean(false), sent).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let events = self.shared.engine.lock().reset_write_failed(tag, &e);
                self.shared.bus.publish_all(events);
                Err(ResetError::Write(e))
            }
        }
    }

    /// Writes a value to any writable tag.
    pub async fn write(&self, tag: &str, value: impl Into<TagVariant>) -> Result<(), WriteError> {
        self.shared.gateway.write(tag, value.into()).await
    }

    /// Points with `active = true`.
    pub fn current_alarms(&self) -> Vec<AlarmPoint> {
        self.shared.engine.lock().current_alarms()
    }

    /// Every point and plain value.
    pub fn snapshot(&self) -> AlarmSnapshot {
        self.shared.engine.lock().snapshot()
    }

    /// The point for an alarm tag.
    pub fn point(&self, tag: &str) -> Option<AlarmPoint> {
        self.shared.engine.lock().point(tag).cloned()
    }

    /// Last value of a tag.
    pub fn value(&self, tag: &str) -> Option<PlainValue> {
        self.shared.engine.lock().value(tag).cloned()
    }

    /// Alarm transition history, oldest first.
    pub fn history(&self) -> Vec<AlarmTransition> {
        self.shared.engine.lock().history().cloned().collect()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// Watches connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.watch_state()
    }

    /// The tag catalog.
    pub fn catalog(&self) -> &Arc<TagCatalog> {
        &self.shared.catalog
    }

    /// Write gateway counters.
    pub fn write_metrics(&self) -> GatewayMetricsSnapshot {
        self.shared.gateway.metrics()
    }

    /// Event bus counters.
    pub fn event_stats(&self) -> EventBusStats {
        self.shared.bus.stats()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops the monitor.
    ///
    /// Stops the consumer loop, closes the connection (in-flight writes
    /// resolve to [`WriteError::Cancelled`]) and reverts pending resets.
    /// Closing twice is harmless.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Monitor closing");

        let _ = self.shared.shutdown.send(true);
        self.shared.connection.close().await;

        let tasks = std::mem::take(&mut *self.shared.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Monitor task failed");
            }
        }

        let events = self.shared.engine.lock().cancel_pending();
        self.shared.bus.publish_all(events);

        let active = self.shared.engine.lock().current_alarms().len();
        info!(active, "Monitor closed");
    }
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("tags", &self.shared.catalog.len())
            .field("connection", &self.connection_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Consumer loop
// =============================================================================

struct Consumer {
    catalog: Arc<TagCatalog>,
    engine: Arc<Mutex<AlarmEngine>>,
    bus: EventBus,
    connection: ConnectionHandle,
    subscriptions: SubscriptionEngine,
    events: ConnectionEvents,
    subscription: Option<SubscriptionHandle>,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl Consumer {
    async fn run(mut self) {
        debug!("Consumer loop started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let deadline = self.engine.lock().next_deadline();

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    // Every handle was dropped without close().
                    if changed.is_err() {
                        break;
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.on_connection_event(event).await,
                    None => {
                        debug!("Connection events closed");
                        break;
                    }
                },

                value = next_value(&mut self.subscription) => match value {
                    Some(value) => self.apply(value),
                    None => {
                        debug!("Subscription feed ended");
                        self.subscription = None;
                    }
                },

                _ = wait_for(deadline) => {
                    let events = self.engine.lock().expire(Instant::now());
                    self.bus.publish_all(events);
                }

                _ = self.wake.notified() => {}
            }
        }

        debug!("Consumer loop stopped");
    }

    fn apply(&self, value: TagValue) {
        let events = self.engine.lock().apply(value);
        self.bus.publish_all(events);
    }

    async fn on_connection_event(&mut self, event: ConnectionEvent) {
        self.bus.publish(event.clone());

        match event {
            ConnectionEvent::StateChanged { from, to } if from.is_connected() && !to.is_connected() => {
                self.subscription = None;
                let events = self.engine.lock().connection_lost();
                self.bus.publish_all(events);
            }
            ConnectionEvent::ResubscribeRequired { session } => self.resubscribe(session).await,
            ConnectionEvent::StateChanged { .. } => {}
        }
    }

    async fn resubscribe(&mut self, session: SessionId) {
        if self.subscription.as_ref().is_some_and(|s| s.session() >= session) {
            debug!(session = %session, "Already subscribed in this session");
            return;
        }
        if self.catalog.readable().next().is_none() {
            debug!("Catalog is empty, nothing to subscribe");
            return;
        }

        match self
            .subscriptions
            .subscribe(Arc::clone(&self.catalog), &self.connection)
            .await
        {
            Ok(handle) => self.subscription = Some(handle),
            Err(SubscriptionError::NotConnected) => {
                debug!(session = %session, "Session ended while subscribing");
            }
            Err(e) => {
                warn!(session = %session, error = %e, "Subscribe failed, recycling session");
                self.connection.reconnect();
            }
        }
    }
}

async fn next_value(subscription: &mut Option<SubscriptionHandle>) -> Option<TagValue> {
    match subscription {
        Some(handle) => handle.next().await,
        None => pending().await,
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
