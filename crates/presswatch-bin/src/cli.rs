// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `watch`: Run the alarm monitor (default)
//! - `validate`: Check the configuration and catalog
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use presswatch_core::config::{LogFormat as ConfigLogFormat, LogLevel};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// presswatch - panic button alarm monitor for OPC UA
///
/// Watches bath, accessible toilet and guest room call buttons on an OPC UA
/// server and lets operators reset them.
#[derive(Parser, Debug)]
#[command(
    name = "presswatch",
    author = "Sylvex <contact@sylvex.io>",
    version = presswatch_core::VERSION,
    about = "Panic button alarm monitor for OPC UA",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "presswatch.yaml",
        env = "PRESSWATCH_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "PRESSWATCH_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact); overrides the config file
    #[arg(long, env = "PRESSWATCH_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the alarm monitor
    ///
    /// This is the default command. Connects to the configured server,
    /// prints alarm events until interrupted, then shuts down cleanly.
    Watch(WatchArgs),

    /// Validate the configuration file and tag catalog
    ///
    /// Loads both without connecting and prints a per-floor summary.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `watch` command.
#[derive(Args, Debug, Default, Clone)]
pub struct WatchArgs {
    /// Output format for events
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Only print alarm point events
    #[arg(long)]
    pub alarms_only: bool,

    /// Server endpoint, overriding the config file
    #[arg(long)]
    pub endpoint: Option<String>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: fail when the catalog has no alarm points
    #[arg(long)]
    pub strict: bool,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<ConfigLogFormat> for LogFormat {
    fn from(format: ConfigLogFormat) -> Self {
        match format {
            ConfigLogFormat::Text => Self::Text,
            ConfigLogFormat::Json => Self::Json,
            ConfigLogFormat::Compact => Self::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// One JSON document (or line) per result
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Watch` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Watch(WatchArgs::default()))
    }

    /// Get the effective log level: flags, then `--log-level`, then the
    /// config file.
    pub fn effective_log_level(&self, configured: LogLevel) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.as_str().to_string())
        }
    }

    /// Get the effective log format.
    pub fn effective_log_format(&self, configured: ConfigLogFormat) -> LogFormat {
        self.log_format.unwrap_or_else(|| configured.into())
    }
}

// =============================================================================
// Tests
// =============================================================================
