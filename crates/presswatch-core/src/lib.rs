// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # presswatch-core
//!
//! Alarm monitoring core for OPC UA panic buttons (public baths, accessible
//! toilets, guest rooms).
//!
//! - **Catalog**: tag definitions loaded from CSV, immutable after load
//! - **Connection**: session lifecycle with capped exponential backoff
//! - **Subscription**: per-session monitored items and decoded values
//! - **Alarm**: the alarm state machine with reset confirmation
//! - **Gateway**: validated, one-per-tag writes back to the server
//! - **Monitor**: the runtime facade handed to presentation adapters
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use presswatch_core::{load_config, Monitor, TagCatalog};
//!
//! let config = load_config("presswatch.yaml")?;
//! let catalog = Arc::new(TagCatalog::load_path(&config.catalog.path)?);
//! let monitor = Monitor::start(catalog, transport, &config);
//!
//! let mut events = monitor.subscribe();
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Data Modules
// =============================================================================

pub mod catalog;
pub mod config;
pub mod error;
pub mod value;

// =============================================================================
// Runtime Modules
// =============================================================================

pub mod connection;
pub mod retry;
pub mod subscription;

// =============================================================================
// Alarm Modules
// =============================================================================

pub mod alarm;
pub mod events;
pub mod gateway;
pub mod monitor;

// =============================================================================
// Re-exports
// =============================================================================

pub use alarm::{
    AlarmEngine, AlarmEvent, AlarmPoint, AlarmSnapshot, AlarmState, AlarmTransition,
    IndicatorStatus, PendingReset, PlainValue, ResetFailureReason,
};
pub use catalog::{AlarmCategory, TagAccess, TagCatalog, TagDataType, TagDefinition};
pub use config::{load_config, ConfigLoader, MonitorConfig};
pub use connection::{
    ConnectionEvent, ConnectionEvents, ConnectionHandle, ConnectionManager, ConnectionOptions,
    ConnectionState, SessionId,
};
pub use error::{
    AlarmError, CatalogError, ConfigError, ResetError, SubscriptionError, WriteError,
};
pub use events::{EventBus, EventSubscriber, MonitorEvent};
pub use gateway::WriteGateway;
pub use monitor::{Monitor, MonitorHandle};
pub use retry::Backoff;
pub use subscription::{SubscriptionEngine, SubscriptionHandle};
pub use value::{TagValue, TagVariant};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
