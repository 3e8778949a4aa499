// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitor configuration: YAML schema and loader.

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    AlarmConfig, CatalogConfig, EventsConfig, LogFormat, LogLevel, LoggingConfig, MonitorConfig,
    ReconnectConfig, SubscriptionConfig,
};
