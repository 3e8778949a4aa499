// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `watch`: Run the alarm monitor
//! - `validate`: Check the configuration and catalog
//! - `version`: Show version information

mod validate;
mod version;
mod watch;

pub use validate::validate;
pub use version::version;
pub use watch::watch;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Watch(args) => watch::watch(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}
