// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! A small facility: guest rooms on 5F and 3F, a public bath and an
//! accessible toilet on 2F, a read-only lobby call point, two writable
//! alarm parameters and one read-only sensor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use presswatch_core::{MonitorConfig, TagCatalog};
use presswatch_opcua::NodeId;

/// Endpoint used by every fixture configuration.
pub const MOCK_ENDPOINT: &str = "opc.tcp://mock-plc:4840";

/// Catalog CSV for the test facility.
pub const FACILITY_CATALOG_CSV: &str = "\
name,node_id,data_type,access,category,floor,room
# Guest rooms
room_501,ns=2;s=5F.Room501.Call,boolean,readwrite,guest_room,5F,501
room_502,ns=2;s=5F.Room502.Call,boolean,readwrite,guest_room,5F,502
room_301,ns=2;s=3F.Room301.Call,boolean,readwrite,guest_room,3F,301

# Public areas
bath_2f,ns=2;s=2F.Bath.Call,boolean,readwrite,bath,2F,public bath
toilet_2f,ns=2;s=2F.Toilet.Call,boolean,readwrite,accessible_toilet,2F,accessible toilet
lobby_call,ns=2;s=1F.Lobby.Call,boolean,readonly,guest_room,1F,lobby

# Parameters and sensors
alarm_enable,ns=2;s=Config.AlarmEnable,boolean,readwrite,,,
alarm_delay,ns=2;s=Config.AlarmDelay,integer,readwrite,,,
outdoor_temp,ns=2;s=Env.OutdoorTemp,float,readonly,,,
";

/// Fixture providing the facility catalog and matching configuration.
pub struct FacilityFixtures;

impl FacilityFixtures {
    /// Alarm reset confirmation timeout used by [`config`](Self::config).
    pub const RESET_TIMEOUT: Duration = Duration::from_secs(2);

    /// Request timeout used by [`config`](Self::config).
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

    /// First reconnect delay used by [`config`](Self::config).
    pub const RECONNECT_DELAY: Duration = Duration::from_millis(100);

    /// Parsed facility catalog.
    pub fn catalog() -> Arc<TagCatalog> {
        Arc::new(
            TagCatalog::load(FACILITY_CATALOG_CSV.as_bytes())
                .expect("facility catalog must parse"),
        )
    }

    /// Node of a catalog tag.
    pub fn node(tag: &str) -> NodeId {
        TagCatalog::load(FACILITY_CATALOG_CSV.as_bytes())
            .expect("facility catalog must parse")
            .lookup(tag)
            .expect("tag must be in the facility catalog")
            .node_id
            .clone()
    }

    /// Names of the writable alarm points.
    pub fn resettable_alarms() -> Vec<&'static str> {
        vec!["room_501", "room_502", "room_301", "bath_2f", "toilet_2f"]
    }

    /// Configuration with short, deterministic timings.
    pub fn config() -> MonitorConfig {
        Self::config_with_catalog("tags.csv")
    }

    /// Configuration pointing at `catalog`.
    pub fn config_with_catalog(catalog: impl Into<PathBuf>) -> MonitorConfig {
        let mut config = MonitorConfig::new(MOCK_ENDPOINT, catalog);
        config.server.connect_timeout = Duration::from_secs(1);
        config.server.request_timeout = Self::REQUEST_TIMEOUT;
        config.reconnect.initial_delay = Self::RECONNECT_DELAY;
        config.reconnect.max_delay = Duration::from_secs(1);
        config.reconnect.jitter = 0.0;
        config.alarms.reset_timeout = Self::RESET_TIMEOUT;
        config.alarms.history_limit = 64;
        config.events.capacity = 256;
        config
    }

    /// YAML for a configuration file next to a catalog named `tags.csv`.
    pub fn config_yaml() -> String {
        format!(
            "\
server:
  endpoint: {endpoint}
  request_timeout: 1s
catalog:
  path: tags.csv
reconnect:
  initial_delay: 100ms
  max_delay: 1s
  jitter: 0.0
alarms:
  reset_timeout: 2s
logging:
  level: debug
  format: compact
",
            endpoint = MOCK_ENDPOINT
        )
    }

    /// Writes `tags.csv` and `presswatch.yaml` into `dir`, returning the
    /// configuration path.
    pub fn write_files(dir: &Path) -> PathBuf {
        std::fs::write(dir.join("tags.csv"), FACILITY_CATALOG_CSV)
            .expect("failed to write catalog");
        let config = dir.join("presswatch.yaml");
        std::fs::write(&config, Self::config_yaml()).expect("failed to write config");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facility_catalog() {
        let catalog = FacilityFixtures::catalog();
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog.alarm_tags().count(), 6);
        assert_eq!(catalog.floors(), vec!["5F", "3F", "2F", "1F"]);
        for tag in FacilityFixtures::resettable_alarms() {
            assert!(catalog.lookup(tag).unwrap().is_writable());
        }
    }

    #[test]
    fn test_config_is_valid() {
        FacilityFixtures::config().validate().unwrap();
    }
}
