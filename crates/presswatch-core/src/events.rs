// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Event bus for the presentation side.
//!
//! A `tokio::sync::broadcast` fan-out of [`MonitorEvent`]s. Slow subscribers
//! lose the oldest events and keep going; the current state is always
//! available from the snapshot queries on the monitor handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::alarm::AlarmEvent;
use crate::connection::ConnectionEvent;

/// Everything the monitor publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// From the connection manager.
    Connection(ConnectionEvent),
    /// From the alarm engine.
    Alarm(AlarmEvent),
}

impl From<ConnectionEvent> for MonitorEvent {
    fn from(event: ConnectionEvent) -> Self {
        Self::Connection(event)
    }
}

impl From<AlarmEvent> for MonitorEvent {
    fn from(event: AlarmEvent) -> Self {
        Self::Alarm(event)
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventBusStats {
    /// Events published.
    pub published: u64,
    /// Events lost by lagging subscribers.
    pub dropped: u64,
    /// Current subscribers.
    pub subscribers: u64,
}

/// Broadcast bus for [`MonitorEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Publishes an event. Having no subscribers is fine.
    pub fn publish(&self, event: impl Into<MonitorEvent>) {
        let _ = self.sender.send(event.into());
        self.counters.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes a batch in order.
    pub fn publish_all<E: Into<MonitorEvent>>(&self, events: impl IntoIterator<Item = E>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Creates a subscriber that sees events published from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            counters: Arc::clone(&self.counters),
            missed: 0,
        }
    }

    /// Returns the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns current counters.
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            subscribers: self.sender.receiver_count() as u64,
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

/// A subscriber to the event bus.
///
/// Events lost to lag are skipped. [`take_missed`](Self::take_missed) tells
/// the caller when to re-read the monitor snapshot.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<MonitorEvent>,
    counters: Arc<Counters>,
    missed: u64,
}

impl EventSubscriber {
    /// Receives the next event, skipping over any lost to lag.
    ///
    /// Returns `None` once the monitor has been dropped.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => self.lagged(count),
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.lagged(count),
                Err(_) => return None,
            }
        }
    }

    /// Returns the number of events lost since the last call and resets it.
    pub fn take_missed(&mut self) -> u64 {
        std::mem::take(&mut self.missed)
    }

    fn lagged(&mut self, count: u64) {
        self.missed += count;
        self.counters.dropped.fetch_add(count, Ordering::Relaxed);
        warn!(
            count,
            "Event subscriber lagged, alarm transitions lost; re-read the snapshot"
        );
    }
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    fn stale(tag: &str) -> AlarmEvent {
        AlarmEvent::MarkedStale { tag: tag.into() }
    }

    #[tokio::test]
    async fn test_fan_out() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(ConnectionEvent::StateChanged {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Connecting,
        });
        bus.publish(stale("bath1"));

        for subscriber in [&mut a, &mut b] {
            assert!(matches!(subscriber.recv().await, Some(MonitorEvent::Connection(_))));
            assert_eq!(subscriber.recv().await, Some(MonitorEvent::Alarm(stale("bath1"))));
        }
        assert_eq!(bus.stats().subscribers, 2);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let bus = EventBus::new(2);
        let mut subscriber = bus.subscribe();
        bus.publish_all(["a", "b", "c", "d"].map(stale));

        assert_eq!(subscriber.recv().await, Some(MonitorEvent::Alarm(stale("c"))));
        assert_eq!(subscriber.take_missed(), 2);
        assert_eq!(subscriber.recv().await, Some(MonitorEvent::Alarm(stale("d"))));
        assert_eq!(subscriber.take_missed(), 0);
        assert_eq!(bus.stats().dropped, 2);
        assert_eq!(bus.stats().published, 4);
    }

    #[test]
    fn test_try_recv_counts_missed() {
        let bus = EventBus::new(1);
        let mut subscriber = bus.subscribe();
        bus.publish_all(["a", "b", "c"].map(stale));

        assert_eq!(subscriber.try_recv(), Some(MonitorEvent::Alarm(stale("c"))));
        assert_eq!(subscriber.take_missed(), 2);
        assert_eq!(subscriber.try_recv(), None);
    }

    #[tokio::test]
    async fn test_closed_when_bus_dropped() {
        let bus = EventBus::new(4);
        let mut subscriber = bus.subscribe();
        drop(bus);
        assert_eq!(subscriber.recv().await, None);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(MonitorEvent::Alarm(stale("bath1"))).unwrap();
        assert_eq!(json["source"], "alarm");
        assert_eq!(json["event"]["kind"], "marked_stale");
        assert_eq!(json["event"]["tag"], "bath1");
    }
}
