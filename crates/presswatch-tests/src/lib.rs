// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # presswatch Integration Tests
//!
//! Test utilities and end-to-end suites for the presswatch alarm monitor.
//! Everything runs against [`MockTransport`](common::mocks::MockTransport),
//! an in-memory OPC UA server, so no network is needed.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: The facility catalog and test configuration
//!   - `mocks`: Scriptable transport
//!   - `assertions`: Waiting on events and connection states
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p presswatch-tests
//!
//! # Run one suite
//! cargo test -p presswatch-tests --test connection
//! cargo test -p presswatch-tests --test write_gateway
//! cargo test -p presswatch-tests --test monitor
//! cargo test -p presswatch-tests --test config
//!
//! # With logs
//! RUST_LOG=presswatch_core=debug cargo test -p presswatch-tests -- --nocapture
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use presswatch_tests::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let transport = MockTransport::new();
//!     let monitor = Monitor::start(FacilityFixtures::catalog(), transport.clone(), &FacilityFixtures::config());
//!     wait_for_connection(&monitor, ConnectionState::Connected).await;
//!     transport.set_bool(&FacilityFixtures::node("bath_2f"), true);
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::init_test_logging;
    pub use crate::common::mocks::*;
    pub use presswatch_core::{
        AlarmEvent, AlarmState, ConnectionEvent, ConnectionState, IndicatorStatus, Monitor,
        MonitorEvent, MonitorHandle, ResetError, ResetFailureReason, WriteError,
    };
}
