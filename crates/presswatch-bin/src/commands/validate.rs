// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::collections::BTreeMap;

use anyhow::Context;
use presswatch_core::{load_config, AlarmCategory, TagCatalog};
use serde::Serialize;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

const NO_FLOOR: &str = "(no floor)";

/// Per-floor counts.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct FloorSummary {
    /// Alarm points by category name.
    alarms: BTreeMap<&'static str, usize>,
    /// Writable tags that are not alarm points.
    parameters: usize,
    /// Read-only tags that are not alarm points.
    readings: usize,
}

fn summarize(catalog: &TagCatalog) -> BTreeMap<String, FloorSummary> {
    let mut floors: BTreeMap<String, FloorSummary> = BTreeMap::new();
    for definition in catalog {
        let floor = definition.floor.as_deref().unwrap_or(NO_FLOOR).to_string();
        let summary = floors.entry(floor).or_default();
        match definition.category {
            Some(category) => *summary.alarms.entry(category.name()).or_default() += 1,
            None if definition.is_writable() => summary.parameters += 1,
            None => summary.readings += 1,
        }
    }
    floors
}

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    if !config_path.exists() {
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = load_config(config_path)?;
    init_logging(
        &cli.effective_log_level(config.logging.level),
        cli.effective_log_format(config.logging.format),
    );
    let catalog = TagCatalog::load_path(&config.catalog.path)?;
    let floors = summarize(&catalog);
    let alarm_count = catalog.alarm_tags().count();

    let mut warnings: Vec<String> = Vec::new();
    if alarm_count == 0 {
        warnings.push("Catalog has no alarm points".to_string());
    }
    for category in AlarmCategory::ALL {
        if !catalog.alarm_tags().any(|d| d.category == Some(category)) {
            warnings.push(format!("No {} alarm points", category));
        }
    }
    if catalog.alarm_tags().any(|d| !d.is_writable()) {
        warnings.push("Some alarm points are read-only and cannot be reset".to_string());
    }

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Endpoint:      {}", config.server.endpoint);
            println!("  Catalog:       {}", config.catalog.path.display());
            println!("  Tags:          {}", catalog.len());
            println!("  Alarm points:  {}", alarm_count);
            println!("  Reset timeout: {:?}", config.alarms.reset_timeout);
            println!();
            println!("Floors:");
            for (floor, summary) in &floors {
                let alarms: Vec<String> = summary
                    .alarms
                    .iter()
                    .map(|(category, count)| format!("{} {}", count, category))
                    .collect();
                println!(
                    "  {:<10} alarms: [{}]  parameters: {}  readings: {}",
                    floor,
                    alarms.join(", "),
                    summary.parameters,
                    summary.readings
                );
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).context("serializing configuration")?
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "endpoint": config.server.endpoint,
                    "catalog_path": config.catalog.path.display().to_string(),
                    "tag_count": catalog.len(),
                    "alarm_count": alarm_count,
                    "reset_timeout_ms": config.alarms.reset_timeout.as_millis() as u64,
                },
                "floors": floors,
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("serializing validation result")?
            );
        }
    }

    if args.strict && alarm_count == 0 {
        return Err(BinError::config("Strict mode: catalog has no alarm points"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use presswatch_core::{TagAccess, TagDataType, TagDefinition};
    use presswatch_opcua::NodeId;
    use tempfile::TempDir;

    fn write_files(dir: &TempDir, catalog: &str) -> Cli {
        std::fs::write(dir.path().join("tags.csv"), catalog).unwrap();
        let config = dir.path().join("presswatch.yaml");
        std::fs::write(
            &config,
            "server:\n  endpoint: opc.tcp://plc:4840\ncatalog:\n  path: tags.csv\n",
        )
        .unwrap();
        Cli::parse_from(["presswatch", "--config", config.to_str().unwrap(), "-q", "validate"])
    }

    fn args(strict: bool) -> ValidateArgs {
        ValidateArgs {
            show_config: false,
            format: OutputFormat::Json,
            strict,
        }
    }

    #[test]
    fn test_summarize_by_floor() {
        let catalog = TagCatalog::from_definitions([
            TagDefinition::new("bath1", NodeId::numeric(2, 1), TagDataType::Boolean, TagAccess::ReadWrite)
                .with_category(AlarmCategory::Bath)
                .with_location("2F", "bath"),
            TagDefinition::new("room501", NodeId::numeric(2, 2), TagDataType::Boolean, TagAccess::ReadWrite)
                .with_category(AlarmCategory::GuestRoom)
                .with_location("5F", "501"),
            TagDefinition::new("room502", NodeId::numeric(2, 3), TagDataType::Boolean, TagAccess::ReadWrite)
                .with_category(AlarmCategory::GuestRoom)
                .with_location("5F", "502"),
            TagDefinition::new("delay", NodeId::numeric(2, 4), TagDataType::Integer, TagAccess::ReadWrite),
            TagDefinition::new("temp", NodeId::numeric(2, 5), TagDataType::Float, TagAccess::ReadOnly),
        ])
        .unwrap();

        let floors = summarize(&catalog);
        assert_eq!(floors.len(), 3);
        assert_eq!(floors["5F"].alarms[AlarmCategory::GuestRoom.name()], 2);
        assert_eq!(floors["2F"].alarms[AlarmCategory::Bath.name()], 1);
        assert_eq!(floors[NO_FLOOR].parameters, 1);
        assert_eq!(floors[NO_FLOOR].readings, 1);
    }

    #[test]
    fn test_validate_files() {
        let dir = TempDir::new().unwrap();
        let cli = write_files(
            &dir,
            "name,node_id,data_type,access,category,floor,room\n\
             room501,ns=2;i=1,Boolean,ReadWrite,guest_room,5F,501\n",
        );
        validate(&cli, args(true)).unwrap();
    }

    #[test]
    fn test_validate_strict_without_alarms() {
        let dir = TempDir::new().unwrap();
        let cli = write_files(&dir, "name,node_id,data_type,access\ndelay,ns=2;i=4,Integer,ReadWrite\n");

        validate(&cli, args(false)).unwrap();
        let err = validate(&cli, args(true)).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_validate_missing_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        let cli = Cli::parse_from(["presswatch", "--config", path.to_str().unwrap(), "validate"]);
        assert!(validate(&cli, args(false)).is_err());
    }
}
