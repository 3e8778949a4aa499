// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection manager.
//!
//! One background task (the session driver) owns the transport. Everything
//! else talks to it through a cloneable [`ConnectionHandle`].
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!                                  |                 |
//!                                failed         lost/reconnect()
//!                                  v                 v
//!                             Reconnecting <---------+
//!                                  |
//!                           backoff expires --> Connecting
//!
//! any state --close()--> Disconnected
//! ```
//!
//! Every successful connect opens a new [`SessionId`] and emits
//! [`ConnectionEvent::ResubscribeRequired`]. The manager never recreates
//! subscriptions on its own; notification sinks registered for a session are
//! dropped when it ends.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use presswatch_opcua::{
    transport_channel, DataChangeNotification, MonitoredItemRequest, MonitoredItemResult,
    NodeId, OpcUaConfig, OpcUaError, OpcUaResult, OpcUaTransport, OpcUaValue,
    SubscriptionSettings, TimeoutError, TransportEvent, TransportEventReceiver,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ReconnectConfig;
use crate::error::{SubscriptionError, WriteError};
use crate::retry::Backoff;

// =============================================================================
// Public types
// =============================================================================

/// Identifies one connected session. Increases with every successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the raw epoch number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Connection state as seen by the rest of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session and no retry scheduled.
    #[default]
    Disconnected,
    /// A connect attempt is running.
    Connecting,
    /// A session is up.
    Connected,
    /// Waiting for the backoff to expire.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if a session is up.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The state changed.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// A new session is up and has no subscriptions yet.
    ResubscribeRequired {
        /// The new session.
        session: SessionId,
    },
}

/// Receiver for [`ConnectionEvent`]s.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

/// A subscription to create in the current session.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    /// Subscription parameters.
    pub settings: SubscriptionSettings,
    /// Items to monitor.
    pub items: Vec<MonitoredItemRequest>,
}

/// A created subscription and its notification feed.
///
/// `notifications` ends when the session that created it ends.
#[derive(Debug)]
pub struct SubscriptionStream {
    /// Session the subscription belongs to.
    pub session: SessionId,
    /// Server-assigned subscription ID.
    pub subscription_id: u32,
    /// One result per requested item, in request order.
    pub results: Vec<MonitoredItemResult>,
    /// Data changes for this subscription.
    pub notifications: mpsc::UnboundedReceiver<DataChangeNotification>,
}

/// Timeouts and backoff for the session driver.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Limit for one connect attempt.
    pub connect_timeout: Duration,
    /// Limit for writes and subscription calls.
    pub request_timeout: Duration,
    /// Delay between connect attempts.
    pub backoff: Backoff,
}

impl ConnectionOptions {
    /// Builds options from the server and reconnect sections.
    pub fn from_config(server: &OpcUaConfig, reconnect: &ReconnectConfig) -> Self {
        Self {
            connect_timeout: server.connect_timeout,
            request_timeout: server.request_timeout,
            backoff: Backoff::from(reconnect),
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
        }
    }
}

// =============================================================================
// ConnectionHandle
// =============================================================================

type WriteReply = oneshot::Sender<Result<(), WriteError>>;
type SubscribeReply = oneshot::Sender<Result<SubscriptionStream, SubscriptionError>>;

enum Command {
    Connect,
    Reconnect,
    Close {
        done: oneshot::Sender<()>,
    },
    Write {
        node_id: NodeId,
        value: OpcUaValue,
        reply: WriteReply,
    },
    Subscribe {
        request: SubscriptionRequest,
        reply: SubscribeReply,
    },
}

/// Capability to drive and use the connection.
///
/// Dropping the last handle closes the connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Requests a connect. Ignored unless the manager is Disconnected.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Forces the current session to be recycled.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Closes the connection and stops the session driver.
    ///
    /// In-flight writes resolve to [`WriteError::Cancelled`]. Closing twice is
    /// harmless.
    pub async fn close(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::Close { done }).is_ok() {
            let _ = wait.await;
        }
    }

    /// Returns `true` once the session driver has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Writes a value through the current session.
    pub async fn write(&self, node_id: NodeId, value: OpcUaValue) -> Result<(), WriteError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Write {
                node_id,
                value,
                reply,
            })
            .map_err(|_| WriteError::Cancelled)?;
        response.await.unwrap_or(Err(WriteError::Cancelled))
    }

    /// Creates a subscription in the current session.
    pub async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionStream, SubscriptionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { request, reply })
            .map_err(|_| SubscriptionError::NotConnected)?;
        response.await.unwrap_or(Err(SubscriptionError::NotConnected))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

/// Spawns the session driver.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Starts the session driver in the Disconnected state.
    ///
    /// Call [`ConnectionHandle::connect`] to open the first session.
    pub fn spawn(
        transport: Arc<dyn OpcUaTransport>,
        options: ConnectionOptions,
    ) -> (ConnectionHandle, ConnectionEvents, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = SessionDriver {
            transport,
            options,
            state: state_tx,
            events: events_tx,
            session: None,
            sessions_opened: 0,
            attempt: 0,
            retry_at: None,
            connecting: None,
            writes: JoinSet::new(),
            pending_writes: HashMap::new(),
            next_write: 0,
            subscribes: JoinSet::new(),
            pending_subscribes: HashMap::new(),
            next_subscribe: 0,
        };
        let task = tokio::spawn(driver.run(commands_rx));

        let handle = ConnectionHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (handle, events_rx, task)
    }
}

// =============================================================================
// SessionDriver
// =============================================================================

struct ActiveSession {
    id: SessionId,
    transport_events: TransportEventReceiver,
    sinks: HashMap<u32, mpsc::UnboundedSender<DataChangeNotification>>,
    /// Notifications that arrived before their subscription was registered.
    early: HashMap<u32, Vec<DataChangeNotification>>,
}

/// A connect attempt running on its own task.
struct PendingConnect {
    task: JoinHandle<OpcUaResult<()>>,
    transport_events: TransportEventReceiver,
}

type OpenedSubscription = Result<(u32, Vec<MonitoredItemResult>), SubscriptionError>;

struct SessionDriver {
    transport: Arc<dyn OpcUaTransport>,
    options: ConnectionOptions,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    session: Option<ActiveSession>,
    sessions_opened: u64,
    attempt: u32,
    retry_at: Option<Instant>,
    connecting: Option<PendingConnect>,
    writes: JoinSet<(u64, Result<(), WriteError>)>,
    pending_writes: HashMap<u64, WriteReply>,
    next_write: u64,
    subscribes: JoinSet<(u64, OpenedSubscription)>,
    pending_subscribes: HashMap<u64, (SessionId, SubscribeReply)>,
    next_subscribe: u64,
}

impl SessionDriver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(endpoint = self.transport.endpoint(), "Session driver started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                event = next_transport_event(&mut self.session) => {
                    self.handle_transport_event(event).await;
                }
                joined = join_connect(&mut self.connecting) => {
                    self.finish_connect(joined).await;
                }
                Some(joined) = self.writes.join_next(), if !self.writes.is_empty() => {
                    match joined {
                        Ok((id, result)) => {
                            if let Some(reply) = self.pending_writes.remove(&id) {
                                let _ = reply.send(result);
                            }
                        }
                        Err(e) => error!(error = %e, "Write task failed"),
                    }
                }
                Some(joined) = self.subscribes.join_next(), if !self.subscribes.is_empty() => {
                    match joined {
                        Ok((id, result)) => self.finish_subscription(id, result).await,
                        Err(e) => error!(error = %e, "Subscription task failed"),
                    }
                }
                _ = sleep_until_deadline(self.retry_at) => {
                    self.retry_at = None;
                    self.start_connect();
                }
            }
        }

        // Commands that raced with close see a dropped reply channel.
        commands.close();
        debug!("Session driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if self.current_state() == ConnectionState::Disconnected {
                    self.attempt = 0;
                    self.start_connect();
                } else {
                    debug!(state = %self.current_state(), "Connect ignored");
                }
            }
            Command::Reconnect => {
                if self.session.is_some() {
                    warn!("Session recycle requested");
                    self.end_session(WriteError::NotConnected);
                    self.disconnect_transport().await;
                    self.schedule_retry();
                } else {
                    debug!(state = %self.current_state(), "Reconnect ignored");
                }
            }
            Command::Write {
                node_id,
                value,
                reply,
            } => self.start_write(node_id, value, reply),
            Command::Subscribe { request, reply } => self.start_subscription(request, reply),
            Command::Close { .. } => {}
        }
    }

    // -------------------------------------------------------------------------
    // Connect / disconnect
    // -------------------------------------------------------------------------

    fn start_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);

        let (sender, receiver) = transport_channel();
        let transport = self.transport.clone();
        let timeout = self.options.connect_timeout;
        let task = tokio::spawn(async move {
            with_timeout(timeout, "connect", transport.connect(sender)).await
        });
        self.connecting = Some(PendingConnect {
            task,
            transport_events: receiver,
        });
    }

    async fn finish_connect(&mut self, joined: Result<OpcUaResult<()>, JoinError>) {
        let Some(pending) = self.connecting.take() else {
            return;
        };

        match joined {
            Ok(Ok(())) => {
                self.attempt = 0;
                self.sessions_opened += 1;
                let id = SessionId(self.sessions_opened);
                self.session = Some(ActiveSession {
                    id,
                    transport_events: pending.transport_events,
                    sinks: HashMap::new(),
                    early: HashMap::new(),
                });
                self.set_state(ConnectionState::Connected);
                info!(
                    session = %id,
                    endpoint = self.transport.endpoint(),
                    "Session established"
                );
                self.emit(ConnectionEvent::ResubscribeRequired { session: id });
            }
            Ok(Err(e)) => {
                e.log("connect");
                self.disconnect_transport().await;
                self.schedule_retry();
            }
            Err(e) => {
                error!(error = %e, "Connect task failed");
                self.disconnect_transport().await;
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.options.backoff.delay(self.attempt);
        self.retry_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        warn!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    async fn disconnect_transport(&self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "Disconnect failed");
        }
    }

    /// Drops the session, its sinks and every in-flight request.
    fn end_session(&mut self, outcome: WriteError) {
        if let Some(session) = self.session.take() {
            debug!(
                session = %session.id,
                subscriptions = session.sinks.len(),
                "Session ended"
            );
        }

        // Dropping a set aborts its tasks.
        self.writes = JoinSet::new();
        for (_, reply) in self.pending_writes.drain() {
            let _ = reply.send(Err(outcome.clone()));
        }
        self.subscribes = JoinSet::new();
        for (_, (_, reply)) in self.pending_subscribes.drain() {
            let _ = reply.send(Err(SubscriptionError::NotConnected));
        }
    }

    async fn shutdown(&mut self) {
        self.retry_at = None;
        let mut had_session = self.session.is_some();
        if let Some(pending) = self.connecting.take() {
            pending.task.abort();
            debug!("Connect attempt aborted");
            had_session = true;
        }
        self.end_session(WriteError::Cancelled);
        if had_session {
            self.disconnect_transport().await;
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection closed");
    }

    // -------------------------------------------------------------------------
    // Transport events
    // -------------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::DataChange(notification)) => self.route(notification),
            Some(TransportEvent::ConnectionLost { reason }) => self.session_lost(&reason).await,
            None => self.session_lost("transport event channel closed").await,
        }
    }

    fn route(&mut self, notification: DataChangeNotification) {
        let opening = !self.pending_subscribes.is_empty();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let subscription_id = notification.subscription_id;
        match session.sinks.get(&subscription_id) {
            Some(sink) => {
                if sink.send(notification).is_err() {
                    debug!(subscription_id, "Subscription consumer gone, dropping sink");
                    session.sinks.remove(&subscription_id);
                }
            }
            None if opening => session
                .early
                .entry(subscription_id)
                .or_default()
                .push(notification),
            None => debug!(subscription_id, "Notification for unknown subscription"),
        }
    }

    async fn session_lost(&mut self, reason: &str) {
        warn!(reason, "Session lost");
        self.end_session(WriteError::NotConnected);
        self.disconnect_transport().await;
        self.schedule_retry();
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    fn start_write(&mut self, node_id: NodeId, value: OpcUaValue, reply: WriteReply) {
        if self.session.is_none() {
            let _ = reply.send(Err(WriteError::NotConnected));
            return;
        }

        let id = self.next_write;
        self.next_write = self.next_write.wrapping_add(1);
        self.pending_writes.insert(id, reply);

        let transport = self.transport.clone();
        let timeout = self.options.request_timeout;
        self.writes.spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.write_value(&node_id, value)).await {
                Ok(Ok(outcome)) if outcome.is_good() => Ok(()),
                Ok(Ok(outcome)) => Err(WriteError::rejected(outcome.status_code)),
                Ok(Err(e)) => Err(WriteError::from_transport(&e)),
                Err(_) => Err(WriteError::TimedOut { timeout }),
            };
            if let Err(ref e) = result {
                debug!(node = %node_id, error = %e, "Write failed");
            }
            (id, result)
        });
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    fn start_subscription(&mut self, request: SubscriptionRequest, reply: SubscribeReply) {
        let session = match &self.session {
            Some(session) => session.id,
            None => {
                let _ = reply.send(Err(SubscriptionError::NotConnected));
                return;
            }
        };
        if request.items.is_empty() {
            let _ = reply.send(Err(SubscriptionError::rejected("no monitored items requested")));
            return;
        }

        let id = self.next_subscribe;
        self.next_subscribe = self.next_subscribe.wrapping_add(1);
        self.pending_subscribes.insert(id, (session, reply));

        let transport = self.transport.clone();
        let timeout = self.options.request_timeout;
        self.subscribes
            .spawn(async move { (id, open_subscription(transport, request, timeout).await) });
    }

    async fn finish_subscription(&mut self, id: u64, result: OpenedSubscription) {
        let Some((session, reply)) = self.pending_subscribes.remove(&id) else {
            return;
        };
        let (subscription_id, results) = match result {
            Ok(opened) => opened,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let (sink, notifications) = mpsc::unbounded_channel();
        match self.session.as_mut() {
            Some(active) if active.id == session => {
                for notification in active.early.remove(&subscription_id).unwrap_or_default() {
                    let _ = sink.send(notification);
                }
                if self.pending_subscribes.is_empty() {
                    active.early.clear();
                }
                active.sinks.insert(subscription_id, sink);
            }
            _ => {
                let _ = reply.send(Err(SubscriptionError::NotConnected));
                return;
            }
        }

        info!(
            session = %session,
            subscription_id,
            items = results.iter().filter(|r| r.is_good()).count(),
            "Subscription created"
        );
        let stream = SubscriptionStream {
            session,
            subscription_id,
            results,
            notifications,
        };
        if reply.send(Ok(stream)).is_err() {
            debug!(subscription_id, "Subscriber gone before the subscription was ready");
            if let Some(active) = self.session.as_mut() {
                active.sinks.remove(&subscription_id);
            }
            delete_subscription(self.transport.as_ref(), subscription_id).await;
        }
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.current_state();
        if from == to {
            return;
        }
        self.state.send_replace(to);
        info!(from = %from, to = %to, attempt = self.attempt, "Connection state changed");
        self.emit(ConnectionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

/// Creates the subscription and its monitored items, deleting the
/// subscription again if no item is accepted.
async fn open_subscription(
    transport: Arc<dyn OpcUaTransport>,
    request: SubscriptionRequest,
    timeout: Duration,
) -> OpenedSubscription {
    let subscription_id = with_timeout(
        timeout,
        "create_subscription",
        transport.create_subscription(&request.settings),
    )
    .await?;

    let results = match with_timeout(
        timeout,
        "create_monitored_items",
        transport.create_monitored_items(subscription_id, &request.items),
    )
    .await
    {
        Ok(results) => results,
        Err(e) => {
            delete_subscription(transport.as_ref(), subscription_id).await;
            return Err(e.into());
        }
    };

    if !results.iter().any(MonitoredItemResult::is_good) {
        delete_subscription(transport.as_ref(), subscription_id).await;
        return Err(SubscriptionError::rejected(format!(
            "all {} monitored items were rejected",
            request.items.len()
        )));
    }
    Ok((subscription_id, results))
}

async fn delete_subscription(transport: &dyn OpcUaTransport, subscription_id: u32) {
    if let Err(e) = transport.delete_subscription(subscription_id).await {
        debug!(subscription_id, error = %e, "Failed to delete subscription");
    }
}

async fn next_transport_event(session: &mut Option<ActiveSession>) -> Option<TransportEvent> {
    match session {
        Some(session) => session.transport_events.recv().await,
        None => std::future::pending().await,
    }
}

async fn join_connect(pending: &mut Option<PendingConnect>) -> Result<OpcUaResult<()>, JoinError> {
    match pending {
        Some(pending) => (&mut pending.task).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn with_timeout<T>(
    duration: Duration,
    operation: &'static str,
    future: impl Future<Output = OpcUaResult<T>>,
) -> OpcUaResult<T> {
    tokio::time::timeout(duration, future)
        .await
        .unwrap_or_else(|_| Err(OpcUaError::timeout(TimeoutError::new(operation, duration))))
}

// =============================================================================
// Tests
// =============================================================================
