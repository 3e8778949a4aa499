// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema.
//!
//! ```yaml
//! server:
//!   endpoint: opc.tcp://plc.local:4840
//!   request_timeout: 5s
//! catalog:
//!   path: tags.csv
//! reconnect:
//!   initial_delay: 500ms
//!   max_delay: 30s
//! alarms:
//!   reset_timeout: 5s
//! logging:
//!   level: info
//!   format: text
//! ```

use std::path::PathBuf;
use std::time::Duration;

use presswatch_opcua::{MonitoredItemSettings, OpcUaConfig, SubscriptionSettings};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// MonitorConfig
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// OPC UA server connection.
    pub server: OpcUaConfig,

    /// Tag catalog location.
    pub catalog: CatalogConfig,

    /// Reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Subscription parameters.
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Alarm engine parameters.
    #[serde(default)]
    pub alarms: AlarmConfig,

    /// Event bus parameters.
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Creates a configuration with defaults for everything but the endpoint
    /// and the catalog path.
    pub fn new(endpoint: impl Into<String>, catalog: impl Into<PathBuf>) -> Self {
        Self {
            server: OpcUaConfig::new(endpoint),
            catalog: CatalogConfig {
                path: catalog.into(),
            },
            reconnect: ReconnectConfig::default(),
            subscription: SubscriptionConfig::default(),
            alarms: AlarmConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validates the whole configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server
            .validate()
            .map_err(|e| ConfigError::validation("server", e.to_string()))?;

        if self.catalog.path.as_os_str().is_empty() {
            return Err(ConfigError::validation("catalog.path", "cannot be empty"));
        }

        self.reconnect.validate()?;
        self.subscription.validate()?;
        self.alarms.validate()?;
        self.events.validate()?;

        Ok(())
    }
}

// =============================================================================
// CatalogConfig
// =============================================================================

/// Where the tag catalog lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// CSV path. Relative paths are resolved against the config file.
    pub path: PathBuf,
}

// =============================================================================
// ReconnectConfig
// =============================================================================

/// Capped exponential backoff between connect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Relative jitter in `[0, 1]`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectConfig {
    /// Validates the backoff parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::validation(
                "reconnect.initial_delay",
                "must be greater than zero",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::validation(
                "reconnect.max_delay",
                "must not be shorter than initial_delay",
            ));
        }
        if !(self.multiplier >= 1.0) {
            return Err(ConfigError::validation(
                "reconnect.multiplier",
                "must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::validation(
                "reconnect.jitter",
                "must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// SubscriptionConfig
// =============================================================================

/// Subscription and monitored item parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Sampling interval per monitored item.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size per monitored item.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Absolute deadband for numeric plain tags; 0 disables it.
    #[serde(default)]
    pub numeric_deadband: f64,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_queue_size() -> u32 {
    10
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
            numeric_deadband: 0.0,
        }
    }
}

impl SubscriptionConfig {
    /// Validates the subscription parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.publishing_interval.is_zero() {
            return Err(ConfigError::validation(
                "subscription.publishing_interval",
                "must be greater than zero",
            ));
        }
        if self.queue_size == 0 {
            return Err(ConfigError::validation(
                "subscription.queue_size",
                "must be at least 1",
            ));
        }
        if !(self.numeric_deadband >= 0.0) || !self.numeric_deadband.is_finite() {
            return Err(ConfigError::validation(
                "subscription.numeric_deadband",
                "must be a finite, non-negative number",
            ));
        }
        Ok(())
    }

    /// Subscription settings for the transport.
    pub fn subscription_settings(&self) -> SubscriptionSettings {
        SubscriptionSettings {
            publishing_interval: self.publishing_interval,
            ..SubscriptionSettings::default()
        }
    }

    /// Base monitored item settings, without deadband.
    pub fn item_settings(&self) -> MonitoredItemSettings {
        MonitoredItemSettings {
            sampling_interval: self.sampling_interval,
            queue_size: self.queue_size,
            ..MonitoredItemSettings::default()
        }
    }
}

// =============================================================================
// AlarmConfig
// =============================================================================

/// Alarm engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmConfig {
    /// How long a reset may wait for the server to confirm the clear.
    #[serde(default = "default_reset_timeout", with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Number of transitions kept in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_reset_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_history_limit() -> usize {
    256
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            reset_timeout: default_reset_timeout(),
            history_limit: default_history_limit(),
        }
    }
}

impl AlarmConfig {
    /// Validates the alarm parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::validation(
                "alarms.reset_timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// EventsConfig
// =============================================================================

/// Event bus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Broadcast channel capacity.
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

fn default_events_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

impl EventsConfig {
    /// Validates the bus parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::validation("events.capacity", "must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// LoggingConfig
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
    /// Compact text.
    Compact,
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
