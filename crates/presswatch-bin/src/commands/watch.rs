// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `watch` command.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use presswatch_core::{
    load_config, AlarmEvent, ConnectionEvent, Monitor, MonitorConfig, MonitorEvent, MonitorHandle,
    TagCatalog,
};
use presswatch_opcua::OpcUaTransport;
use tracing::info;

use crate::cli::{Cli, OutputFormat, WatchArgs};
use crate::error::BinResult;
use crate::logging::init_logging;
use crate::shutdown::ShutdownCoordinator;

/// Executes the `watch` command.
pub async fn watch(cli: &Cli, args: WatchArgs) -> BinResult<()> {
    let mut config = load_config(&cli.config)?;
    if let Some(endpoint) = &args.endpoint {
        config.server.endpoint = endpoint.clone();
        config.validate()?;
    }
    init_logging(
        &cli.effective_log_level(config.logging.level),
        cli.effective_log_format(config.logging.format),
    );

    let catalog = Arc::new(TagCatalog::load_path(&config.catalog.path)?);
    let transport = transport(&config).map_err(|e| e.with_context("starting monitor"))?;

    let shutdown = ShutdownCoordinator::new();
    let mut stop = shutdown.subscribe();
    shutdown.listen_for_signals();

    let monitor = Monitor::start(catalog, transport, &config);
    let mut events = monitor.subscribe();
    let stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            event = events.recv() => match event {
                Some(event) => {
                    let missed = events.take_missed();
                    if missed > 0 {
                        let line = render_resync(&monitor, missed, args.format)?;
                        writeln!(stdout.lock(), "{}", line).context("writing event")?;
                    }
                    if args.alarms_only && !is_alarm_event(&event) {
                        continue;
                    }
                    let line = render(&monitor, &event, args.format)?;
                    writeln!(stdout.lock(), "{}", line).context("writing event")?;
                }
                None => break,
            },
        }
    }

    monitor.close().await;
    let active = monitor.current_alarms();
    let stats = monitor.event_stats();
    info!(
        active = active.len(),
        published = stats.published,
        dropped = stats.dropped,
        "presswatch stopped"
    );
    for point in active {
        eprintln!(
            "still active: {} ({}, {})",
            point.tag_name,
            point.category,
            location(point.floor.as_deref(), point.room.as_deref())
        );
    }

    Ok(())
}

#[cfg(feature = "real-transport")]
fn transport(config: &MonitorConfig) -> BinResult<Arc<dyn OpcUaTransport>> {
    Ok(Arc::new(presswatch_opcua::RealOpcUaTransport::new(
        config.server.clone(),
    )))
}

#[cfg(not(feature = "real-transport"))]
fn transport(config: &MonitorConfig) -> BinResult<Arc<dyn OpcUaTransport>> {
    Err(crate::error::BinError::init(format!(
        "cannot connect to {}: this build has no OPC UA transport, rebuild with --features real-transport",
        config.server.endpoint
    )))
}

fn is_alarm_event(event: &MonitorEvent) -> bool {
    !matches!(
        event,
        MonitorEvent::Connection(_) | MonitorEvent::Alarm(AlarmEvent::ValueChanged { .. })
    )
}

fn render(monitor: &MonitorHandle, event: &MonitorEvent, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string(event).context("serializing event");
    }

    let now = Local::now().format("%H:%M:%S");
    let text = match event {
        MonitorEvent::Connection(ConnectionEvent::StateChanged { from, to }) => {
            format!("connection {} -> {}", from, to)
        }
        MonitorEvent::Connection(ConnectionEvent::ResubscribeRequired { session }) => {
            format!("connection up, {}", session)
        }
        MonitorEvent::Alarm(AlarmEvent::Activated { tag, category, .. }) => {
            let point = monitor.point(tag);
            format!(
                "ALARM {} ({}) at {}",
                tag,
                category,
                location(
                    point.as_ref().and_then(|p| p.floor.as_deref()),
                    point.as_ref().and_then(|p| p.room.as_deref())
                )
            )
        }
        MonitorEvent::Alarm(event) => event.to_string(),
    };
    Ok(format!("{} {}", now, text))
}

/// Current alarms, printed after events were lost to lag.
fn render_resync(monitor: &MonitorHandle, missed: u64, format: OutputFormat) -> anyhow::Result<String> {
    let active = monitor.current_alarms();
    let tags: Vec<&str> = active.iter().map(|p| p.tag_name.as_str()).collect();
    if format == OutputFormat::Json {
        let line = serde_json::json!({ "source": "resync", "missed": missed, "active": tags });
        return Ok(line.to_string());
    }

    let list = if tags.is_empty() { "none".to_string() } else { tags.join(", ") };
    Ok(format!(
        "{} {} events missed, active alarms: {}",
        Local::now().format("%H:%M:%S"),
        missed,
        list
    ))
}

fn location(floor: Option<&str>, room: Option<&str>) -> String {
    match (floor, room) {
        (Some(floor), Some(room)) => format!("{} {}", floor, room),
        (Some(floor), None) => floor.to_string(),
        (None, Some(room)) => room.to_string(),
        (None, None) => "unknown location".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_filter() {
        assert!(is_alarm_event(&MonitorEvent::Alarm(AlarmEvent::MarkedStale {
            tag: "bath1".into()
        })));
        assert!(!is_alarm_event(&MonitorEvent::Connection(
            ConnectionEvent::StateChanged {
                from: presswatch_core::ConnectionState::Connecting,
                to: presswatch_core::ConnectionState::Connected,
            }
        )));
    }

    #[test]
    fn test_location() {
        assert_eq!(location(Some("5F"), Some("501")), "5F 501");
        assert_eq!(location(None, None), "unknown location");
    }
}
