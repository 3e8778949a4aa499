// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Alarm state engine.
//!
//! Tags with a catalog category become [`AlarmPoint`]s; every other tag is a
//! plain value. The engine is the single source of truth presented to
//! operators. It is synchronous: the caller owns it behind one lock and
//! feeds it values, reset requests and the clock.
//!
//! # State machine
//!
//! ```text
//! Clear        --Good,true-->        Active
//! Active       --Good,false-->       Clear
//! Active       --reset accepted-->   PendingClear
//! PendingClear --Good,false-->       Clear   (ResetConfirmed once the write was sent, else Cleared)
//! PendingClear --Good,true-->        Active  (ResetFailed: Retriggered)
//! PendingClear --deadline-->         Active  (ResetFailed: ConfirmationTimeout)
//! PendingClear --write failed-->     Active  (ResetFailed: WriteFailed)
//! PendingClear --connection lost-->  Active  (ResetFailed: ConnectionLost)
//! PendingClear --monitor closed-->   Active  (ResetFailed: Cancelled)
//! ```
//!
//! Only a Good `false` observed after the reset write clears a point. Bad or
//! Uncertain values never touch `active`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use presswatch_opcua::{NodeId, Quality};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::{AlarmCategory, TagCatalog};
use crate::config::AlarmConfig;
use crate::error::{AlarmError, WriteError};
use crate::value::TagValue;

// =============================================================================
// Point state
// =============================================================================

/// Alarm state of one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    /// No alarm.
    #[default]
    Clear,
    /// Button pressed.
    Active,
    /// Reset written, waiting for the server to report `false`.
    PendingClear,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clear => write!(f, "Clear"),
            Self::Active => write!(f, "Active"),
            Self::PendingClear => write!(f, "PendingClear"),
        }
    }
}

/// What an indicator lamp should show for a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStatus {
    /// Clear with good data.
    Normal,
    /// Alarm active.
    Alarm,
    /// Reset pending confirmation.
    Resetting,
    /// Stale, never seen, or non-Good quality.
    Unknown,
}

impl fmt::Display for IndicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Resetting => write!(f, "Resetting"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One alarm-classified tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmPoint {
    /// Catalog name.
    pub tag_name: String,
    /// Kind of panic button.
    pub category: AlarmCategory,
    /// Machine state.
    pub state: AlarmState,
    /// Latest Good reading, held `true` while a reset is pending.
    pub active: bool,
    /// Quality of the last value; `None` until the first one arrives.
    pub quality: Option<Quality>,
    /// The session that produced the last value has ended.
    pub stale: bool,
    /// Time of the last state transition.
    pub last_change: Option<DateTime<Utc>>,
    /// An operator reset was accepted since the point last became active.
    pub acknowledged: bool,
    /// Floor label.
    pub floor: Option<String>,
    /// Room label.
    pub room: Option<String>,
    /// When a pending reset gives up.
    #[serde(skip)]
    pub reset_deadline: Option<Instant>,
    /// When the reset write left for the server.
    pub reset_sent_at: Option<DateTime<Utc>>,
}

impl AlarmPoint {
    fn new(tag_name: String, category: AlarmCategory, floor: Option<String>, room: Option<String>) -> Self {
        Self {
            tag_name,
            category,
            state: AlarmState::Clear,
            active: false,
            quality: None,
            stale: false,
            last_change: None,
            acknowledged: false,
            floor,
            room,
            reset_deadline: None,
            reset_sent_at: None,
        }
    }

    /// Indicator status derived from state, quality and staleness.
    pub fn status(&self) -> IndicatorStatus {
        if self.state == AlarmState::PendingClear {
            IndicatorStatus::Resetting
        } else if self.stale || self.quality != Some(Quality::Good) {
            IndicatorStatus::Unknown
        } else if self.active {
            IndicatorStatus::Alarm
        } else {
            IndicatorStatus::Normal
        }
    }

    /// Returns `true` while a reset awaits confirmation.
    #[inline]
    pub fn is_pending_reset(&self) -> bool {
        self.state == AlarmState::PendingClear
    }
}

/// Last value of a tag plus a stale flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlainValue {
    /// The value.
    pub value: TagValue,
    /// The session that produced it has ended.
    pub stale: bool,
}

// =============================================================================
// Events
// =============================================================================

/// Why a pending reset went back to Active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResetFailureReason {
    /// The server reported `true` again.
    Retriggered,
    /// No confirming `false` before the deadline.
    ConfirmationTimeout,
    /// The reset write failed.
    WriteFailed {
        /// Failure details.
        message: String,
    },
    /// The session dropped.
    ConnectionLost,
    /// The monitor was closed.
    Cancelled,
}

impl fmt::Display for ResetFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retriggered => write!(f, "retriggered"),
            Self::ConfirmationTimeout => write!(f, "confirmation timeout"),
            Self::WriteFailed { message } => write!(f, "write failed: {}", message),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Something the presentation side should know about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlarmEvent {
    /// Clear to Active.
    Activated {
        /// Tag name.
        tag: String,
        /// Kind of button.
        category: AlarmCategory,
        /// Value timestamp.
        timestamp: DateTime<Utc>,
    },
    /// Active to Clear without an operator reset.
    Cleared {
        /// Tag name.
        tag: String,
        /// Value timestamp.
        timestamp: DateTime<Utc>,
    },
    /// A reset was accepted and written.
    ResetRequested {
        /// Tag name.
        tag: String,
    },
    /// The server corroborated a reset.
    ResetConfirmed {
        /// Tag name.
        tag: String,
        /// Value timestamp.
        timestamp: DateTime<Utc>,
    },
    /// A pending reset went back to Active.
    ResetFailed {
        /// Tag name.
        tag: String,
        /// Why.
        reason: ResetFailureReason,
    },
    /// Quality of an alarm tag changed.
    QualityChanged {
        /// Tag name.
        tag: String,
        /// New quality.
        quality: Quality,
    },
    /// The value is now last-known only.
    MarkedStale {
        /// Tag name.
        tag: String,
    },
    /// A plain tag changed.
    ValueChanged {
        /// The new value.
        value: TagValue,
    },
}

impl AlarmEvent {
    /// Tag the event is about.
    pub fn tag(&self) -> &str {
        match self {
            Self::Activated { tag, .. }
            | Self::Cleared { tag, .. }
            | Self::ResetRequested { tag }
            | Self::ResetConfirmed { tag, .. }
            | Self::ResetFailed { tag, .. }
            | Self::QualityChanged { tag, .. }
            | Self::MarkedStale { tag } => tag,
            Self::ValueChanged { value } => &value.tag_name,
        }
    }
}

impl fmt::Display for AlarmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated { tag, category, .. } => write!(f, "ALARM {} ({})", tag, category),
            Self::Cleared { tag, .. } => write!(f, "cleared {}", tag),
            Self::ResetRequested { tag } => write!(f, "reset requested {}", tag),
            Self::ResetConfirmed { tag, .. } => write!(f, "reset confirmed {}", tag),
            Self::ResetFailed { tag, reason } => write!(f, "reset failed {}: {}", tag, reason),
            Self::QualityChanged { tag, quality } => write!(f, "quality {} {}", tag, quality),
            Self::MarkedStale { tag } => write!(f, "stale {}", tag),
            Self::ValueChanged { value } => write!(f, "value {}", value),
        }
    }
}

/// One entry of the transition history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmTransition {
    /// When the engine recorded it.
    pub at: DateTime<Utc>,
    /// What happened.
    pub event: AlarmEvent,
}

/// A reset accepted by [`AlarmEngine::begin_reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReset {
    /// Tag name.
    pub tag: String,
    /// Node to write.
    pub node_id: NodeId,
    /// Confirmation deadline.
    pub deadline: Instant,
}

/// Points and plain values at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlarmSnapshot {
    /// Every alarm point in catalog order.
    pub points: Vec<AlarmPoint>,
    /// Plain tags with a value, in catalog order.
    pub values: Vec<PlainValue>,
}

impl AlarmSnapshot {
    /// Points with `active = true`.
    pub fn active(&self) -> impl Iterator<Item = &AlarmPoint> {
        self.points.iter().filter(|p| p.active)
    }
}

// =============================================================================
// AlarmEngine
// =============================================================================

/// Alarm state engine.
#[derive(Debug)]
pub struct AlarmEngine {
    catalog: Arc<TagCatalog>,
    points: Vec<AlarmPoint>,
    index: HashMap<String, usize>,
    values: HashMap<String, PlainValue>,
    history: VecDeque<AlarmTransition>,
    history_limit: usize,
    reset_timeout: Duration,
}

impl AlarmEngine {
    /// Classifies the catalog into alarm points and plain tags.
    pub fn new(catalog: Arc<TagCatalog>, config: &AlarmConfig) -> Self {
        let mut points = Vec::new();
        let mut index = HashMap::new();
        for definition in catalog.iter() {
            if let Some(category) = definition.category {
                index.insert(definition.name.clone(), points.len());
                points.push(AlarmPoint::new(
                    definition.name.clone(),
                    category,
                    definition.floor.clone(),
                    definition.room.clone(),
                ));
            }
        }

        debug!(
            points = points.len(),
            plain = catalog.len() - points.len(),
            "Alarm engine classified catalog"
        );

        Self {
            catalog,
            points,
            index,
            values: HashMap::new(),
            history: VecDeque::new(),
            history_limit: config.history_limit,
            reset_timeout: config.reset_timeout,
        }
    }

    /// Reset confirmation timeout.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Applies one observed value.
    pub fn apply(&mut self, value: TagValue) -> Vec<AlarmEvent> {
        let events = match self.index.get(&value.tag_name) {
            Some(&i) => {
                self.values.insert(
                    value.tag_name.clone(),
                    PlainValue {
                        value: value.clone(),
                        stale: false,
                    },
                );
                self.apply_to_point(i, &value)
            }
            None if self.catalog.get(&value.tag_name).is_some() => {
                self.values.insert(
                    value.tag_name.clone(),
                    PlainValue {
                        value: value.clone(),
                        stale: false,
                    },
                );
                vec![AlarmEvent::ValueChanged { value }]
            }
            None => {
                debug!(tag = %value.tag_name, "Value for unknown tag ignored");
                Vec::new()
            }
        };
        self.record(&events);
        events
    }

    fn apply_to_point(&mut self, i: usize, value: &TagValue) -> Vec<AlarmEvent> {
        let point = &mut self.points[i];
        let mut events = Vec::new();

        point.stale = false;
        if point.quality != Some(value.quality) {
            point.quality = Some(value.quality);
            events.push(AlarmEvent::QualityChanged {
                tag: point.tag_name.clone(),
                quality: value.quality,
            });
        }

        let Some(reading) = value.good_bool() else {
            if !value.quality.is_good() {
                warn!(tag = %point.tag_name, quality = %value.quality, "Alarm point quality degraded");
            }
            return events;
        };

        match (point.state, reading) {
            (AlarmState::Clear, true) => {
                point.state = AlarmState::Active;
                point.active = true;
                point.acknowledged = false;
                point.last_change = Some(value.timestamp);
                warn!(
                    tag = %point.tag_name,
                    category = %point.category,
                    floor = point.floor.as_deref().unwrap_or("-"),
                    room = point.room.as_deref().unwrap_or("-"),
                    "Alarm activated"
                );
                events.push(AlarmEvent::Activated {
                    tag: point.tag_name.clone(),
                    category: point.category,
                    timestamp: value.timestamp,
                });
            }
            (AlarmState::Active, false) => {
                point.state = AlarmState::Clear;
                point.active = false;
                point.last_change = Some(value.timestamp);
                info!(tag = %point.tag_name, "Alarm cleared");
                events.push(AlarmEvent::Cleared {
                    tag: point.tag_name.clone(),
                    timestamp: value.timestamp,
                });
            }
            (AlarmState::PendingClear, false) => {
                point.state = AlarmState::Clear;
                point.active = false;
                point.reset_deadline = None;
                point.last_change = Some(value.timestamp);
                // A false applied before the write went out was already on
                // its way and does not answer the reset.
                if point.reset_sent_at.take().is_some() {
                    info!(tag = %point.tag_name, "Reset confirmed");
                    events.push(AlarmEvent::ResetConfirmed {
                        tag: point.tag_name.clone(),
                        timestamp: value.timestamp,
                    });
                } else {
                    info!(tag = %point.tag_name, "Alarm cleared before the reset was sent");
                    events.push(AlarmEvent::Cleared {
                        tag: point.tag_name.clone(),
                        timestamp: value.timestamp,
                    });
                }
            }
            (AlarmState::PendingClear, true) => {
                events.push(Self::revert(point, ResetFailureReason::Retriggered));
            }
            (AlarmState::Clear, false) | (AlarmState::Active, true) => {
                point.active = reading;
            }
        }

        events
    }

    /// Accepts an operator reset.
    ///
    /// # Errors
    ///
    /// Checked in order: unknown tag, read-only tag, plain tag, point not
    /// active, reset already pending.
    pub fn begin_reset(
        &mut self,
        tag: &str,
        now: Instant,
    ) -> Result<(PendingReset, Vec<AlarmEvent>), AlarmError> {
        let definition = self.catalog.get(tag).ok_or_else(|| AlarmError::UnknownTag {
            tag: tag.to_string(),
        })?;
        if !definition.is_writable() {
            return Err(AlarmError::NotWritable {
                tag: tag.to_string(),
            });
        }
        let Some(&i) = self.index.get(tag) else {
            return Err(AlarmError::NotAnAlarm {
                tag: tag.to_string(),
            });
        };

        let point = &mut self.points[i];
        match point.state {
            AlarmState::Clear => {
                return Err(AlarmError::NotActive {
                    tag: tag.to_string(),
                })
            }
            AlarmState::PendingClear => {
                return Err(AlarmError::ResetPending {
                    tag: tag.to_string(),
                })
            }
            AlarmState::Active => {}
        }

        let deadline = now + self.reset_timeout;
        point.state = AlarmState::PendingClear;
        point.acknowledged = true;
        point.reset_deadline = Some(deadline);
        point.reset_sent_at = None;
        point.last_change = Some(Utc::now());
        info!(
            tag,
            timeout_ms = self.reset_timeout.as_millis() as u64,
            "Reset requested"
        );

        let pending = PendingReset {
            tag: tag.to_string(),
            node_id: definition.node_id.clone(),
            deadline,
        };
        let events = vec![AlarmEvent::ResetRequested {
            tag: tag.to_string(),
        }];
        self.record(&events);
        Ok((pending, events))
    }

    /// Marks the reset write of a pending point as sent.
    pub fn reset_sent(&mut self, tag: &str) {
        if let Some(&i) = self.index.get(tag) {
            let point = &mut self.points[i];
            if point.is_pending_reset() {
                point.reset_sent_at = Some(Utc::now());
                debug!(tag, "Reset write sent");
            }
        }
    }

    /// Reverts a pending reset whose write failed.
    pub fn reset_write_failed(&mut self, tag: &str, error: &WriteError) -> Vec<AlarmEvent> {
        let events = match self.index.get(tag) {
            Some(&i) if self.points[i].is_pending_reset() => vec![Self::revert(
                &mut self.points[i],
                ResetFailureReason::WriteFailed {
                    message: error.to_string(),
                },
            )],
            _ => Vec::new(),
        };
        self.record(&events);
        events
    }

    /// Reverts every reset whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<AlarmEvent> {
        let events: Vec<AlarmEvent> = self
            .points
            .iter_mut()
            .filter(|p| p.is_pending_reset() && p.reset_deadline.is_some_and(|d| d <= now))
            .map(|p| Self::revert(p, ResetFailureReason::ConfirmationTimeout))
            .collect();
        self.record(&events);
        events
    }

    /// Earliest pending reset deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.points.iter().filter_map(|p| p.reset_deadline).min()
    }

    /// Marks everything stale and reverts pending resets.
    ///
    /// Alarms are never cleared by a disconnect.
    pub fn connection_lost(&mut self) -> Vec<AlarmEvent> {
        let mut events = Vec::new();

        for point in &mut self.points {
            if point.is_pending_reset() {
                events.push(Self::revert(point, ResetFailureReason::ConnectionLost));
            }
            if !point.stale {
                point.stale = true;
                events.push(AlarmEvent::MarkedStale {
                    tag: point.tag_name.clone(),
                });
            }
            if let Some(value) = self.values.get_mut(&point.tag_name) {
                value.stale = true;
            }
        }

        for definition in self.catalog.plain_tags() {
            if let Some(value) = self.values.get_mut(&definition.name) {
                if !value.stale {
                    value.stale = true;
                    events.push(AlarmEvent::MarkedStale {
                        tag: definition.name.clone(),
                    });
                }
            }
        }
        if !events.is_empty() {
            warn!(
                active = self.points.iter().filter(|p| p.active).count(),
                "Connection lost, alarm state is now last-known"
            );
        }
        self.record(&events);
        events
    }

    /// Reverts every pending reset on shutdown.
    pub fn cancel_pending(&mut self) -> Vec<AlarmEvent> {
        let events: Vec<AlarmEvent> = self
            .points
            .iter_mut()
            .filter(|p| p.is_pending_reset())
            .map(|p| Self::revert(p, ResetFailureReason::Cancelled))
            .collect();
        self.record(&events);
        events
    }

    fn revert(point: &mut AlarmPoint, reason: ResetFailureReason) -> AlarmEvent {
        point.state = AlarmState::Active;
        point.active = true;
        point.acknowledged = false;
        point.reset_deadline = None;
        point.reset_sent_at = None;
        point.last_change = Some(Utc::now());
        warn!(tag = %point.tag_name, reason = %reason, "Reset failed, alarm still active");
        AlarmEvent::ResetFailed {
            tag: point.tag_name.clone(),
            reason,
        }
    }

    fn record(&mut self, events: &[AlarmEvent]) {
        if self.history_limit == 0 {
            return;
        }
        let at = Utc::now();
        for event in events {
            if matches!(event, AlarmEvent::ValueChanged { .. }) {
                continue;
            }
            if self.history.len() == self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(AlarmTransition {
                at,
                event: event.clone(),
            });
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Points with `active = true`, including pending and stale ones.
    pub fn current_alarms(&self) -> Vec<AlarmPoint> {
        self.points.iter().filter(|p| p.active).cloned().collect()
    }

    /// Copy of every point and plain value.
    pub fn snapshot(&self) -> AlarmSnapshot {
        AlarmSnapshot {
            points: self.points.clone(),
            values: self
                .catalog
                .plain_tags()
                .filter_map(|d| self.values.get(&d.name).cloned())
                .collect(),
        }
    }

    /// The point for `tag`, if it is an alarm.
    pub fn point(&self, tag: &str) -> Option<&AlarmPoint> {
        self.index.get(tag).map(|&i| &self.points[i])
    }

    /// All points.
    pub fn points(&self) -> &[AlarmPoint] {
        &self.points
    }

    /// Points on a floor, in catalog order.
    pub fn points_on_floor(&self, floor: &str) -> Vec<&AlarmPoint> {
        self.points
            .iter()
            .filter(|p| p.floor.as_deref() == Some(floor))
            .collect()
    }

    /// Last value of any tag.
    pub fn value(&self, tag: &str) -> Option<&PlainValue> {
        self.values.get(tag)
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &AlarmTransition> {
        self.history.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TagAccess, TagDataType, TagDefinition};

    fn catalog() -> Arc<TagCatalog> {
        Arc::new(
            TagCatalog::from_definitions([
                TagDefinition::new("bath1", NodeId::numeric(2, 10), TagDataType::Boolean, TagAccess::ReadWrite)
                    .with_category(AlarmCategory::Bath)
                    .with_location("2F", "bath"),
                TagDefinition::new("room501", NodeId::numeric(2, 11), TagDataType::Boolean, TagAccess::ReadWrite)
                    .with_category(AlarmCategory::GuestRoom)
                    .with_location("5F", "501"),
                TagDefinition::new("room301", NodeId::numeric(2, 12), TagDataType::Boolean, TagAccess::ReadOnly)
                    .with_category(AlarmCategory::GuestRoom)
                    .with_location("3F", "301"),
                TagDefinition::new("delay", NodeId::numeric(2, 13), TagDataType::Integer, TagAccess::ReadWrite),
            ])
            .unwrap(),
        )
    }

    fn engine() -> AlarmEngine {
        AlarmEngine::new(catalog(), &AlarmConfig::default())
    }

    fn bad(tag: &str) -> TagValue {
        TagValue::without_value(tag, Quality::Bad)
    }

    #[test]
    fn test_activate_and_clear() {
        let mut engine = engine();
        let events = engine.apply(TagValue::good("bath1", true));
        assert!(events.iter().any(|e| matches!(e, AlarmEvent::Activated { .. })));
        let alarms = engine.current_alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].tag_name, "bath1");
        assert_eq!(alarms[0].status(), IndicatorStatus::Alarm);

        let events = engine.apply(TagValue::good("bath1", false));
        assert!(matches!(events.as_slice(), [AlarmEvent::Cleared { .. }]));
        assert!(engine.current_alarms().is_empty());
        assert_eq!(engine.point("bath1").unwrap().status(), IndicatorStatus::Normal);
    }

    #[test]
    fn test_four_column_catalog_raises_alarm() {
        let csv = "name,node_id,data_type,access\nbath1,ns=2;i=10,Boolean,ReadWrite\n";
        let catalog = Arc::new(TagCatalog::load(csv.as_bytes()).unwrap());
        let mut engine = AlarmEngine::new(catalog, &AlarmConfig::default());

        engine.apply(TagValue::good("bath1", true));
        let active: Vec<String> = engine.current_alarms().into_iter().map(|p| p.tag_name).collect();
        assert_eq!(active, vec!["bath1".to_string()]);
        assert_eq!(engine.point("bath1").unwrap().category, AlarmCategory::Bath);
    }

    #[test]
    fn test_unknown_until_first_value() {
        let engine = engine();
        assert_eq!(engine.point("bath1").unwrap().status(), IndicatorStatus::Unknown);
    }

    #[test]
    fn test_reset_confirmed_by_server() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));

        let now = Instant::now();
        let (pending, events) = engine.begin_reset("bath1", now).unwrap();
        assert_eq!(pending.node_id, NodeId::numeric(2, 10));
        assert_eq!(pending.deadline, now + Duration::from_secs(5));
        assert_eq!(events, vec![AlarmEvent::ResetRequested { tag: "bath1".into() }]);

        let point = engine.point("bath1").unwrap();
        assert_eq!(point.state, AlarmState::PendingClear);
        assert!(point.active);
        assert!(point.acknowledged);
        assert_eq!(point.status(), IndicatorStatus::Resetting);
        assert_eq!(engine.current_alarms().len(), 1);

        engine.reset_sent("bath1");
        assert!(engine.point("bath1").unwrap().reset_sent_at.is_some());
        let events = engine.apply(TagValue::good("bath1", false));
        assert!(matches!(events.as_slice(), [AlarmEvent::ResetConfirmed { .. }]));
        assert!(engine.point("bath1").unwrap().reset_sent_at.is_none());
        assert!(engine.current_alarms().is_empty());
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn test_false_before_reset_sent_is_a_clear() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));
        engine.begin_reset("bath1", Instant::now()).unwrap();

        let events = engine.apply(TagValue::good("bath1", false));
        assert!(matches!(events.as_slice(), [AlarmEvent::Cleared { .. }]));
        assert_eq!(engine.point("bath1").unwrap().state, AlarmState::Clear);
        assert!(engine.next_deadline().is_none());

        // The write landing afterwards changes nothing.
        engine.reset_sent("bath1");
        assert!(engine.point("bath1").unwrap().reset_sent_at.is_none());
    }

    #[test]
    fn test_unconfirmed_reset_times_out() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));
        let now = Instant::now();
        engine.begin_reset("bath1", now).unwrap();
        assert_eq!(engine.next_deadline(), Some(now + Duration::from_secs(5)));

        assert!(engine.expire(now + Duration::from_secs(4)).is_empty());
        let events = engine.expire(now + Duration::from_secs(5));
        assert_eq!(
            events,
            vec![AlarmEvent::ResetFailed {
                tag: "bath1".into(),
                reason: ResetFailureReason::ConfirmationTimeout
            }]
        );
        let point = engine.point("bath1").unwrap();
        assert_eq!(point.state, AlarmState::Active);
        assert!(point.active);
        assert!(!point.acknowledged);
    }

    #[test]
    fn test_retrigger_during_pending_reset() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));
        engine.begin_reset("bath1", Instant::now()).unwrap();
        let events = engine.apply(TagValue::good("bath1", true));
        assert!(events.contains(&AlarmEvent::ResetFailed {
            tag: "bath1".into(),
            reason: ResetFailureReason::Retriggered
        }));
        assert_eq!(engine.point("bath1").unwrap().state, AlarmState::Active);
    }

    #[test]
    fn test_reset_preconditions() {
        let mut engine = engine();
        let now = Instant::now();
        assert_eq!(
            engine.begin_reset("lobby", now).unwrap_err(),
            AlarmError::UnknownTag { tag: "lobby".into() }
        );
        assert_eq!(
            engine.begin_reset("room301", now).unwrap_err(),
            AlarmError::NotWritable { tag: "room301".into() }
        );
        assert_eq!(
            engine.begin_reset("delay", now).unwrap_err(),
            AlarmError::NotAnAlarm { tag: "delay".into() }
        );
        assert_eq!(
            engine.begin_reset("bath1", now).unwrap_err(),
            AlarmError::NotActive { tag: "bath1".into() }
        );
        engine.apply(TagValue::good("bath1", true));
        engine.begin_reset("bath1", now).unwrap();
        assert_eq!(
            engine.begin_reset("bath1", now).unwrap_err(),
            AlarmError::ResetPending { tag: "bath1".into() }
        );
    }

    #[test]
    fn test_write_failure_reverts() {
        let mut engine = engine();
        engine.apply(TagValue::good("room501", true));
        engine.begin_reset("room501", Instant::now()).unwrap();
        let events = engine.reset_write_failed("room501", &WriteError::NotConnected);
        assert!(matches!(
            events.as_slice(),
            [AlarmEvent::ResetFailed { reason: ResetFailureReason::WriteFailed { .. }, .. }]
        ));
        assert_eq!(engine.point("room501").unwrap().state, AlarmState::Active);

        // Nothing pending any more.
        assert!(engine.reset_write_failed("room501", &WriteError::NotConnected).is_empty());
    }

    #[test]
    fn test_bad_quality_keeps_active() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));
        let events = engine.apply(bad("bath1"));
        assert_eq!(
            events,
            vec![AlarmEvent::QualityChanged {
                tag: "bath1".into(),
                quality: Quality::Bad
            }]
        );
        let point = engine.point("bath1").unwrap();
        assert!(point.active);
        assert_eq!(point.status(), IndicatorStatus::Unknown);

        // Bad on a clear point is unknown, not a confirmed clear.
        engine.apply(bad("room501"));
        let point = engine.point("room501").unwrap();
        assert!(!point.active);
        assert_eq!(point.status(), IndicatorStatus::Unknown);
    }

    #[test]
    fn test_connection_lost_keeps_alarms_and_marks_stale() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));
        engine.apply(TagValue::good("room501", true));
        engine.apply(TagValue::good("delay", 30i64));
        engine.begin_reset("room501", Instant::now()).unwrap();

        let events = engine.connection_lost();
        assert!(events.contains(&AlarmEvent::ResetFailed {
            tag: "room501".into(),
            reason: ResetFailureReason::ConnectionLost
        }));
        assert!(events.contains(&AlarmEvent::MarkedStale { tag: "bath1".into() }));
        assert!(events.contains(&AlarmEvent::MarkedStale { tag: "delay".into() }));

        let bath = engine.point("bath1").unwrap();
        assert!(bath.active && bath.stale);
        assert_eq!(bath.status(), IndicatorStatus::Unknown);
        assert_eq!(engine.current_alarms().len(), 2);
        assert!(engine.value("delay").unwrap().stale);

        // Losing the connection again adds nothing new.
        assert!(engine.connection_lost().is_empty());

        // First value after reconnect is authoritative.
        let events = engine.apply(TagValue::good("bath1", false));
        assert!(events.iter().any(|e| matches!(e, AlarmEvent::Cleared { .. })));
        assert!(!engine.point("bath1").unwrap().stale);
    }

    #[test]
    fn test_cancel_pending() {
        let mut engine = engine();
        engine.apply(TagValue::good("bath1", true));
        engine.begin_reset("bath1", Instant::now()).unwrap();
        let events = engine.cancel_pending();
        assert_eq!(
            events,
            vec![AlarmEvent::ResetFailed {
                tag: "bath1".into(),
                reason: ResetFailureReason::Cancelled
            }]
        );
    }

    #[test]
    fn test_plain_values_and_snapshot() {
        let mut engine = engine();
        let events = engine.apply(TagValue::good("delay", 15i64));
        assert!(matches!(events.as_slice(), [AlarmEvent::ValueChanged { .. }]));
        assert_eq!(engine.value("delay").unwrap().value.value, Some(15i64.into()));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.points.len(), 3);
        assert_eq!(snapshot.values.len(), 1);
        assert_eq!(engine.points_on_floor("5F").len(), 1);

        assert!(engine.apply(TagValue::good("lobby", true)).is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = AlarmConfig {
            history_limit: 3,
            ..AlarmConfig::default()
        };
        let mut engine = AlarmEngine::new(catalog(), &config);
        for _ in 0..5 {
            engine.apply(TagValue::good("bath1", true));
            engine.apply(TagValue::good("bath1", false));
        }
        engine.apply(TagValue::good("delay", 1i64));
        let history: Vec<_> = engine.history().collect();
        assert_eq!(history.len(), 3);
        assert!(matches!(history[2].event, AlarmEvent::Cleared { .. }));
    }
}
