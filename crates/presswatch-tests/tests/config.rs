// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Config file plus tag catalog on disk, loaded the way the binary does.

use std::time::Duration;

use presswatch_core::config::{ConfigLoader, LogFormat, LogLevel};
use presswatch_core::{AlarmCategory, CatalogError, ConfigError, TagCatalog};
use tempfile::TempDir;

use presswatch_tests::common::{FacilityFixtures, MOCK_ENDPOINT};

/// Loader isolated from `PRESSWATCH_*` variables set in the environment.
fn loader() -> ConfigLoader {
    ConfigLoader::new().with_env_prefix("PRESSWATCH_IT_UNSET")
}

#[test]
fn test_load_files_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = FacilityFixtures::write_files(dir.path());

    let config = loader().load(&path).unwrap();
    assert_eq!(config.server.endpoint, MOCK_ENDPOINT);
    assert_eq!(config.server.request_timeout, Duration::from_secs(1));
    assert_eq!(config.reconnect.initial_delay, Duration::from_millis(100));
    assert_eq!(config.alarms.reset_timeout, Duration::from_secs(2));
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Compact);

    // Catalog path is resolved against the config file.
    assert_eq!(config.catalog.path, dir.path().join("tags.csv"));

    let catalog = TagCatalog::load_path(&config.catalog.path).unwrap();
    assert_eq!(catalog.len(), 9);
    let bath = catalog.lookup("bath_2f").unwrap();
    assert_eq!(bath.category, Some(AlarmCategory::Bath));
    assert_eq!(bath.floor.as_deref(), Some("2F"));
}

#[test]
fn test_load_rejects_non_opcua_endpoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("presswatch.yaml");
    std::fs::write(
        &path,
        "server:\n  endpoint: http://plc:4840\ncatalog:\n  path: tags.csv\n",
    )
    .unwrap();

    let result = loader().load(&path);
    assert!(matches!(result, Err(ConfigError::Validation { .. })), "{:?}", result);
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = loader().load(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })), "{:?}", result);
}

#[test]
fn test_catalog_duplicate_tag_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tags.csv");
    std::fs::write(
        &path,
        "name,node_id,data_type,access,category\n\
         room_501,ns=2;s=5F.Room501.Call,Boolean,ReadWrite,guest_room\n\
         room_501,ns=2;s=5F.Room502.Call,Boolean,ReadWrite,guest_room\n",
    )
    .unwrap();

    match TagCatalog::load_path(&path) {
        Err(CatalogError::DuplicateTag { name, .. }) => assert_eq!(name, "room_501"),
        other => panic!("expected duplicate tag, got {:?}", other),
    }
}

#[test]
fn test_catalog_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = TagCatalog::load_path(dir.path().join("tags.csv"));
    assert!(matches!(result, Err(CatalogError::Io { .. })), "{:?}", result);
}
