// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client plumbing.
//!
//! - **Transport Layer**: the [`OpcUaTransport`] trait and the events it pushes
//! - **Conversion**: status-code quality and timestamped values
//! - **Real transport**: the `opcua` crate backend (feature `real-transport`)
//!
//! ```text
//! ┌──────────────────────────────┐   TransportEvent   ┌──────────────────┐
//! │        OpcUaTransport        │ ─────────────────▶ │  transport owner │
//! │ connect / write / subscribe  │ ◀───────────────── │  (one task)      │
//! └──────────────────────────────┘     requests       └──────────────────┘
//! ```

mod conversion;
mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use conversion::{Quality, TypedValue};
pub use transport::{
    transport_channel, DataChangeNotification, MonitoredItemRequest, MonitoredItemResult,
    OpcUaTransport, OpcUaValue, TransportEvent, TransportEventReceiver, TransportEventSender,
    TransportState, WriteResult,
};

#[cfg(feature = "real-transport")]
pub use real_transport::RealOpcUaTransport;
