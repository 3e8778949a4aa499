// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Monitor Integration Tests
//!
//! End to end through [`Monitor::start`] with the facility catalog:
//!
//! - `test_alarm_*`: Activation, clearing and quality
//! - `test_reset_*`: Operator resets and their confirmation
//! - `test_disconnect_*`: Stale state across sessions
//! - `test_close_*`: Shutdown behaviour
//! - `test_values_*`: Plain tags and writes

use std::sync::Arc;
use std::time::Duration;

use presswatch_core::{
    AlarmCategory, AlarmError, EventSubscriber, MonitorConfig, TagCatalog, TagVariant,
};
use presswatch_opcua::{NodeId, OpcUaTransport, OpcUaValue, Quality, TypedValue};
use tokio::time::Instant;

use presswatch_tests::prelude::*;

/// Starts a monitor and waits until every tag is monitored.
async fn start_with(
    transport: &Arc<MockTransport>,
    config: &MonitorConfig,
) -> (MonitorHandle, EventSubscriber) {
    init_test_logging();
    let catalog = FacilityFixtures::catalog();
    let tags = catalog.len();
    let monitor = Monitor::start(catalog, transport.clone(), config);
    let events = monitor.subscribe();

    wait_for_connection(&monitor, ConnectionState::Connected).await;
    wait_until(|| transport.monitored_count() == tags).await;
    (monitor, events)
}

async fn start(transport: &Arc<MockTransport>) -> (MonitorHandle, EventSubscriber) {
    start_with(transport, &FacilityFixtures::config()).await
}

fn node(tag: &str) -> NodeId {
    FacilityFixtures::node(tag)
}

fn is_reset_failure(event: &AlarmEvent, tag: &str, expected: &ResetFailureReason) -> bool {
    matches!(event, AlarmEvent::ResetFailed { tag: t, reason } if t == tag && reason == expected)
}

/// Raises an alarm and waits for the engine to see it.
async fn raise(transport: &MockTransport, events: &mut EventSubscriber, tag: &str) {
    transport.set_bool(&node(tag), true);
    expect_alarm(events, |e| matches!(e, AlarmEvent::Activated { tag: t, .. } if t == tag)).await;
}

// =============================================================================
// Alarms
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_alarm_single_point_catalog() {
    init_test_logging();
    let csv = "name,node_id,data_type,access\nbath1,ns=2;i=10,Boolean,ReadWrite\n";
    let catalog = Arc::new(TagCatalog::load(csv.as_bytes()).unwrap());
    let transport = MockTransport::new();
    let monitor = Monitor::start(catalog, transport.clone(), &FacilityFixtures::config());
    let mut events = monitor.subscribe();
    wait_for_connection(&monitor, ConnectionState::Connected).await;
    wait_until(|| transport.monitored_count() == 1).await;

    transport.set_bool(&NodeId::numeric(2, 10), true);
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::Activated { .. })).await;
    let active: Vec<String> = monitor.current_alarms().into_iter().map(|p| p.tag_name).collect();
    assert_eq!(active, vec!["bath1".to_string()]);

    transport.set_bool(&NodeId::numeric(2, 10), false);
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::Cleared { .. })).await;
    assert!(monitor.current_alarms().is_empty());

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_alarm_activates_and_clears() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;

    transport.set_bool(&node("bath_2f"), true);
    let activated = expect_alarm(&mut events, |e| matches!(e, AlarmEvent::Activated { .. })).await;
    match activated {
        AlarmEvent::Activated { tag, category, .. } => {
            assert_eq!(tag, "bath_2f");
            assert_eq!(category, AlarmCategory::Bath);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let point = monitor.point("bath_2f").unwrap();
    assert_eq!(point.state, AlarmState::Active);
    assert_eq!(point.status(), IndicatorStatus::Alarm);
    assert_eq!(point.floor.as_deref(), Some("2F"));
    assert_eq!(monitor.current_alarms().len(), 1);

    transport.set_bool(&node("bath_2f"), false);
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::Cleared { tag, .. } if tag == "bath_2f")).await;
    let point = monitor.point("bath_2f").unwrap();
    assert_eq!(point.state, AlarmState::Clear);
    assert_eq!(point.status(), IndicatorStatus::Normal);
    assert!(monitor.current_alarms().is_empty());

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_alarm_initial_value_applied_on_subscribe() {
    let transport = MockTransport::new();
    transport.set_bool(&node("room_301"), true);
    transport.set_bool(&node("room_501"), false);
    let (monitor, _events) = start(&transport).await;

    wait_until(|| monitor.point("room_301").is_some_and(|p| p.active)).await;
    wait_until(|| monitor.point("room_501").is_some_and(|p| p.quality.is_some())).await;
    assert_eq!(monitor.point("room_501").unwrap().status(), IndicatorStatus::Normal);
    // Never reported.
    assert_eq!(monitor.point("room_502").unwrap().status(), IndicatorStatus::Unknown);

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_alarm_bad_quality_does_not_clear() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "toilet_2f").await;

    transport.set_status(&node("toilet_2f"), Quality::Bad.to_status_code());
    expect_alarm(&mut events, |e| {
        matches!(e, AlarmEvent::QualityChanged { quality: Quality::Bad, .. })
    })
    .await;
    let point = monitor.point("toilet_2f").unwrap();
    assert!(point.active);
    assert_eq!(point.state, AlarmState::Active);
    assert_eq!(point.status(), IndicatorStatus::Unknown);
    assert_eq!(monitor.current_alarms().len(), 1);

    // Uncertain false is not a clear either.
    transport.set_value(
        &node("toilet_2f"),
        TypedValue::with_status(OpcUaValue::Boolean(false), Quality::Uncertain.to_status_code()),
    );
    expect_alarm(&mut events, |e| {
        matches!(e, AlarmEvent::QualityChanged { quality: Quality::Uncertain, .. })
    })
    .await;
    assert!(monitor.point("toilet_2f").unwrap().active);

    transport.set_bool(&node("toilet_2f"), false);
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::Cleared { .. })).await;
    assert!(monitor.current_alarms().is_empty());

    monitor.close().await;
}

// =============================================================================
// Resets
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_confirmed_by_server() {
    let transport = MockTransport::new();
    transport.echo_writes(true);
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "room_501").await;

    monitor.reset("room_501").await.unwrap();
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::ResetRequested { tag } if tag == "room_501")).await;
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::ResetConfirmed { tag, .. } if tag == "room_501")).await;

    let point = monitor.point("room_501").unwrap();
    assert_eq!(point.state, AlarmState::Clear);
    assert!(!point.active);
    assert!(point.acknowledged);
    assert!(point.reset_deadline.is_none());
    assert!(monitor.current_alarms().is_empty());
    assert_eq!(transport.writes_to(&node("room_501")), vec![OpcUaValue::Boolean(false)]);

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_unconfirmed_times_out() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "room_502").await;

    let requested_at = Instant::now();
    monitor.reset("room_502").await.unwrap();

    // Write succeeded, no confirming notification yet.
    let point = monitor.point("room_502").unwrap();
    assert_eq!(point.state, AlarmState::PendingClear);
    assert!(point.active);
    assert_eq!(point.status(), IndicatorStatus::Resetting);
    assert_eq!(monitor.current_alarms().len(), 1);

    expect_alarm(&mut events, |e| {
        is_reset_failure(e, "room_502", &ResetFailureReason::ConfirmationTimeout)
    })
    .await;
    assert!(requested_at.elapsed() >= FacilityFixtures::RESET_TIMEOUT);

    let point = monitor.point("room_502").unwrap();
    assert_eq!(point.state, AlarmState::Active);
    assert!(point.active);
    assert_eq!(point.status(), IndicatorStatus::Alarm);

    // A second reset is accepted again.
    monitor.reset("room_502").await.unwrap();
    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_retriggered() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "room_301").await;

    monitor.reset("room_301").await.unwrap();
    transport.set_bool(&node("room_301"), true);
    expect_alarm(&mut events, |e| {
        is_reset_failure(e, "room_301", &ResetFailureReason::Retriggered)
    })
    .await;

    let point = monitor.point("room_301").unwrap();
    assert_eq!(point.state, AlarmState::Active);
    assert!(!point.acknowledged);

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_write_rejected() {
    let transport = MockTransport::new();
    transport.set_write_status(BAD_USER_ACCESS_DENIED);
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "bath_2f").await;

    let result = monitor.reset("bath_2f").await;
    assert!(
        matches!(result, Err(ResetError::Write(WriteError::Rejected { .. }))),
        "{:?}",
        result
    );

    let point = monitor.point("bath_2f").unwrap();
    assert_eq!(point.state, AlarmState::Active);
    assert!(point.active);
    assert!(monitor.history().iter().any(|t| matches!(
        &t.event,
        AlarmEvent::ResetFailed { reason: ResetFailureReason::WriteFailed { .. }, .. }
    )));

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_preconditions() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;

    let refused = |result: Result<(), ResetError>| match result {
        Err(ResetError::Alarm(e)) => e,
        other => panic!("expected alarm error, got {:?}", other),
    };

    assert!(matches!(
        refused(monitor.reset("lobby_lamp").await),
        AlarmError::UnknownTag { .. }
    ));
    assert!(matches!(
        refused(monitor.reset("lobby_call").await),
        AlarmError::NotWritable { .. }
    ));
    assert!(matches!(
        refused(monitor.reset("alarm_enable").await),
        AlarmError::NotAnAlarm { .. }
    ));
    assert!(matches!(
        refused(monitor.reset("room_301").await),
        AlarmError::NotActive { .. }
    ));

    raise(&transport, &mut events, "room_301").await;
    monitor.reset("room_301").await.unwrap();
    assert!(matches!(
        refused(monitor.reset("room_301").await),
        AlarmError::ResetPending { .. }
    ));

    // Only the accepted reset reached the server.
    assert_eq!(transport.writes().len(), 1);
    monitor.close().await;
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_keeps_alarm_stale_until_fresh_value() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "bath_2f").await;

    transport.drop_connection("network down");
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::MarkedStale { tag } if tag == "bath_2f")).await;

    let point = monitor.point("bath_2f").unwrap();
    assert!(point.active);
    assert!(point.stale);
    assert_eq!(point.state, AlarmState::Active);
    assert_eq!(point.status(), IndicatorStatus::Unknown);
    assert_eq!(monitor.current_alarms().len(), 1);

    // The button was released while the link was down.
    transport.set_bool(&node("bath_2f"), false);
    wait_for_connection(&monitor, ConnectionState::Connected).await;
    expect_alarm(&mut events, |e| matches!(e, AlarmEvent::Cleared { tag, .. } if tag == "bath_2f")).await;

    let point = monitor.point("bath_2f").unwrap();
    assert!(!point.stale);
    assert!(!point.active);
    assert_eq!(transport.subscription_count(), 2);

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reverts_pending_reset() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "room_501").await;
    monitor.reset("room_501").await.unwrap();

    transport.drop_connection("network down");
    expect_alarm(&mut events, |e| {
        is_reset_failure(e, "room_501", &ResetFailureReason::ConnectionLost)
    })
    .await;
    let point = monitor.point("room_501").unwrap();
    assert_eq!(point.state, AlarmState::Active);
    assert!(point.reset_deadline.is_none());

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_refuses_writes() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "room_502").await;

    transport.refuse_connects(u32::MAX);
    transport.drop_connection("network down");
    wait_for_connection(&monitor, ConnectionState::Reconnecting).await;

    let result = monitor.reset("room_502").await;
    assert_eq!(result, Err(ResetError::Write(WriteError::NotConnected)));
    assert_eq!(monitor.point("room_502").unwrap().state, AlarmState::Active);
    assert_eq!(
        monitor.write("alarm_delay", 5i64).await,
        Err(WriteError::NotConnected)
    );

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_subscribe_failure_recycles_session() {
    let transport = MockTransport::new();
    transport.fail_subscriptions(1);
    let tags = FacilityFixtures::catalog().len();
    let monitor = Monitor::start(
        FacilityFixtures::catalog(),
        transport.clone(),
        &FacilityFixtures::config(),
    );

    wait_until(|| transport.monitored_count() == tags).await;
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(transport.subscription_count(), 1);

    monitor.close().await;
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_reset() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;
    raise(&transport, &mut events, "toilet_2f").await;
    monitor.reset("toilet_2f").await.unwrap();

    monitor.close().await;
    expect_alarm(&mut events, |e| {
        is_reset_failure(e, "toilet_2f", &ResetFailureReason::Cancelled)
    })
    .await;

    assert!(monitor.is_closed());
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
    assert_eq!(monitor.point("toilet_2f").unwrap().state, AlarmState::Active);
    assert!(!transport.is_connected());

    // Closing again is harmless.
    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_in_flight_write() {
    let transport = MockTransport::new();
    transport.set_write_latency(Duration::from_secs(60));
    let mut config = FacilityFixtures::config();
    config.server.request_timeout = Duration::from_secs(120);
    let (monitor, _events) = start_with(&transport, &config).await;

    let pending = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.write("alarm_delay", 45i64).await })
    };
    wait_until(|| !transport.writes().is_empty()).await;

    monitor.close().await;
    assert_eq!(pending.await.unwrap(), Err(WriteError::Cancelled));
}

// =============================================================================
// Plain values
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_values_plain_tags_in_snapshot() {
    let transport = MockTransport::new();
    let (monitor, mut events) = start(&transport).await;

    transport.set_value(&node("alarm_delay"), TypedValue::new(OpcUaValue::Int32(15)));
    transport.set_value(&node("outdoor_temp"), TypedValue::new(OpcUaValue::Float(12.5)));
    expect_alarm(&mut events, |e| {
        matches!(e, AlarmEvent::ValueChanged { value } if value.tag_name == "outdoor_temp")
    })
    .await;

    let delay = monitor.value("alarm_delay").unwrap();
    assert_eq!(delay.value.value, Some(TagVariant::Integer(15)));
    assert!(!delay.stale);

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.points.len(), 6);
    assert_eq!(snapshot.values.len(), 2);
    assert_eq!(snapshot.active().count(), 0);

    // Plain values never enter the alarm history.
    assert!(monitor
        .history()
        .iter()
        .all(|t| !matches!(t.event, AlarmEvent::ValueChanged { .. })));

    monitor.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_values_write_parameter() {
    let transport = MockTransport::new();
    transport.echo_writes(true);
    let (monitor, mut events) = start(&transport).await;

    monitor.write("alarm_delay", 20i64).await.unwrap();
    expect_alarm(&mut events, |e| {
        matches!(e, AlarmEvent::ValueChanged { value } if value.tag_name == "alarm_delay")
    })
    .await;
    assert_eq!(
        monitor.value("alarm_delay").unwrap().value.value,
        Some(TagVariant::Integer(20))
    );

    assert!(matches!(
        monitor.write("ghost", true).await,
        Err(WriteError::UnknownTag { .. })
    ));
    assert!(matches!(
        monitor.write("alarm_delay", "twenty").await,
        Err(WriteError::TypeMismatch { .. })
    ));

    let metrics = monitor.write_metrics();
    assert_eq!(metrics.writes_succeeded, 1);
    assert_eq!(metrics.writes_refused, 2);

    monitor.close().await;
}
