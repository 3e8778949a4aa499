// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # presswatch-bin
//!
//! CLI binary for the presswatch alarm monitor.
//!
//! ```text
//!                    main.rs
//!                       │
//!                 ┌─────▼─────┐
//!                 │  cli.rs   │
//!                 └─────┬─────┘
//!            ┌──────────┼──────────┐
//!            ▼          ▼          ▼
//!       ┌──────────┐ ┌─────────┐ ┌──────────┐
//!       │ commands │ │ logging │ │ shutdown │
//!       └────┬─────┘ └─────────┘ └──────────┘
//!            │
//!     ┌──────▼───────┐
//!     │ presswatch-* │
//!     └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Watch alarms (default command)
//! presswatch -c /etc/presswatch/site.yaml
//!
//! # Events as JSON lines, alarm points only
//! presswatch watch --format json --alarms-only
//!
//! # Check configuration and catalog
//! presswatch validate --strict
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
