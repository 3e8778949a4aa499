// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Assertion Helpers
//!
//! Waits that panic instead of hanging. Under `start_paused` the timeout is
//! virtual and elapses as soon as every task is idle.

use std::time::Duration;

use presswatch_core::{
    AlarmEvent, ConnectionHandle, ConnectionState, EventSubscriber, MonitorEvent, MonitorHandle,
};

/// Upper bound for every wait.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives the next event.
pub async fn next_event(events: &mut EventSubscriber) -> MonitorEvent {
    match tokio::time::timeout(WAIT_TIMEOUT, events.recv()).await {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event bus closed"),
        Err(_) => panic!("no event within {:?}", WAIT_TIMEOUT),
    }
}

/// Skips events until one matches `predicate`.
pub async fn expect_event<F>(events: &mut EventSubscriber, mut predicate: F) -> MonitorEvent
where
    F: FnMut(&MonitorEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => continue,
                None => panic!("event bus closed while waiting"),
            }
        }
    };
    match tokio::time::timeout(WAIT_TIMEOUT, wait).await {
        Ok(event) => event,
        Err(_) => panic!("expected event not seen within {:?}", WAIT_TIMEOUT),
    }
}

/// Skips events until an alarm event matches `predicate`.
pub async fn expect_alarm<F>(events: &mut EventSubscriber, mut predicate: F) -> AlarmEvent
where
    F: FnMut(&AlarmEvent) -> bool,
{
    match expect_event(events, |e| matches!(e, MonitorEvent::Alarm(a) if predicate(a))).await {
        MonitorEvent::Alarm(event) => event,
        MonitorEvent::Connection(_) => unreachable!("predicate only accepts alarm events"),
    }
}

/// Collects every event already published, without waiting.
pub fn drain(events: &mut EventSubscriber) -> Vec<MonitorEvent> {
    std::iter::from_fn(|| events.try_recv()).collect()
}

/// Waits until the monitor's connection reaches `state`.
pub async fn wait_for_connection(monitor: &MonitorHandle, state: ConnectionState) {
    let mut watch = monitor.watch_connection();
    match tokio::time::timeout(WAIT_TIMEOUT, watch.wait_for(|s| *s == state)).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("connection task stopped before reaching {}", state),
        Err(_) => panic!("connection did not reach {} within {:?}", state, WAIT_TIMEOUT),
    };
}

/// Waits until a bare connection handle reaches `state`.
pub async fn wait_for_handle_state(handle: &ConnectionHandle, state: ConnectionState) {
    let mut watch = handle.watch_state();
    match tokio::time::timeout(WAIT_TIMEOUT, watch.wait_for(|s| *s == state)).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("connection task stopped before reaching {}", state),
        Err(_) => panic!("connection did not reach {} within {:?}", state, WAIT_TIMEOUT),
    };
}

/// Polls `condition` until it holds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    if tokio::time::timeout(WAIT_TIMEOUT, poll).await.is_err() {
        panic!("condition not met within {:?}", WAIT_TIMEOUT);
    }
}
