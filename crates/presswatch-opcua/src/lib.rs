// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client layer for presswatch.
//!
//! This crate holds everything that knows about the wire: node identifiers,
//! session and monitoring settings, the transport trait the monitor drives,
//! and the `opcua` crate backend behind the `real-transport` feature.
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint, session and drop issues
//! ├── Operation     - Write failures and bad status codes
//! ├── Subscription  - Subscription and monitored item errors
//! ├── Configuration - Invalid settings and node ids
//! └── Timeout       - Requests that did not complete in time
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use presswatch_opcua::{transport_channel, OpcUaConfig, OpcUaTransport, RealOpcUaTransport};
//!
//! let config = OpcUaConfig::new("opc.tcp://plc.local:4840");
//! config.validate()?;
//!
//! let transport = RealOpcUaTransport::new(config);
//! let (events, mut rx) = transport_channel();
//! transport.connect(events).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod types;

pub use error::{
    ConfigurationError, ConnectionError, ErrorSeverity, OpcUaError, OpcUaResult,
    OperationError, SubscriptionError, TimeoutError,
};

pub use types::{
    DeadbandSettings, MonitoredItemSettings, NodeId, NodeIdentifier, OpcUaConfig,
    SecurityMode, SecurityPolicy, SubscriptionSettings, UserTokenType,
};

pub use client::{
    transport_channel, DataChangeNotification, MonitoredItemRequest, MonitoredItemResult,
    OpcUaTransport, OpcUaValue, Quality, TransportEvent, TransportEventReceiver,
    TransportEventSender, TransportState, TypedValue, WriteResult,
};

#[cfg(feature = "real-transport")]
pub use client::RealOpcUaTransport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
