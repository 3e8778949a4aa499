// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the YAML file
//! 2. Expand `${VAR}` / `${VAR:default}` placeholders in the raw content
//! 3. Parse through the `config` crate
//! 4. Apply `PRESSWATCH_*` environment overrides
//! 5. Resolve the catalog path against the config file's directory
//! 6. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! PRESSWATCH_ENDPOINT=opc.tcp://10.0.0.5:4840
//! PRESSWATCH_CATALOG=/etc/presswatch/tags.csv
//! PRESSWATCH_RESET_TIMEOUT=10s
//! PRESSWATCH_LOG_LEVEL=debug
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::schema::{LogLevel, MonitorConfig};
use crate::error::{ConfigError, ConfigResult};

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "PRESSWATCH";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads [`MonitorConfig`] from YAML.
///
/// ```no_run
/// use presswatch_core::config::ConfigLoader;
///
/// let config = ConfigLoader::new().load("presswatch.yaml").unwrap();
/// println!("{}", config.server.endpoint);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    resolve_env_vars: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }
}

impl ConfigLoader {
    /// Creates a loader with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholder expansion and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads and validates a configuration file.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<MonitorConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let mut config = self.parse(&content, path)?;

        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        resolve_catalog_path(&mut config, &base);

        config.validate()?;

        debug!(
            endpoint = %config.server.endpoint,
            catalog = %config.catalog.path.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads and validates configuration from a string.
    ///
    /// Relative catalog paths are left as they are.
    pub fn load_from_str(&self, content: &str) -> ConfigResult<MonitorConfig> {
        let config = self.parse(content, Path::new("<string>"))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(&self, content: &str, path: &Path) -> ConfigResult<MonitorConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content)
        } else {
            content.to_string()
        };

        let mut config: MonitorConfig = parse_yaml(&content).map_err(|m| ConfigError::parse(path, m))?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut MonitorConfig) -> ConfigResult<()> {
        if let Ok(value) = env::var(format!("{}_ENDPOINT", self.env_prefix)) {
            config.server.endpoint = value;
        }

        if let Ok(value) = env::var(format!("{}_CATALOG", self.env_prefix)) {
            config.catalog.path = PathBuf::from(value);
        }

        let name = format!("{}_RESET_TIMEOUT", self.env_prefix);
        if let Ok(value) = env::var(&name) {
            config.alarms.reset_timeout = humantime::parse_duration(&value)
                .map_err(|e| ConfigError::invalid_env_var(&name, e.to_string()))?;
        }

        let name = format!("{}_LOG_LEVEL", self.env_prefix);
        if let Ok(value) = env::var(&name) {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&name, format!("unknown level '{}'", value)))?;
        }

        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn resolve_catalog_path(config: &mut MonitorConfig, base: &Path) {
    if config.catalog.path.is_relative() {
        config.catalog.path = base.join(&config.catalog.path);
    }
}

/// Expands `${VAR_NAME}` and `${VAR_NAME:default}`.
///
/// Unknown variables without a default are left in place.
fn resolve_env_placeholders(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();

        let mut var_content = String::new();
        let mut found_close = false;
        for c in chars.by_ref() {
            if c == '}' {
                found_close = true;
                break;
            }
            var_content.push(c);
        }

        if !found_close {
            result.push_str("${");
            result.push_str(&var_content);
            continue;
        }

        let (var_name, default_value) = match var_content.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (var_content.as_str(), None),
        };

        match (env::var(var_name), default_value) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => {
                warn!(variable = var_name, "Environment variable not found");
                result.push_str(&format!("${{{}}}", var_name));
            }
        }
    }

    result
}

fn parse_yaml(content: &str) -> Result<MonitorConfig, String> {
    config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| e.to_string())?
        .try_deserialize()
        .map_err(|e| e.to_string())
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<MonitorConfig> {
    ConfigLoader::new().load(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
server:
  endpoint: opc.tcp://plc.local:4840
  request_timeout: 2s
catalog:
  path: tags.csv
reconnect:
  initial_delay: 250ms
  max_delay: 10s
alarms:
  reset_timeout: 8s
"#;

    #[test]
    fn test_load_from_str() {
        let config = ConfigLoader::new().with_env_vars(false).load_from_str(YAML).unwrap();
        assert_eq!(config.server.endpoint, "opc.tcp://plc.local:4840");
        assert_eq!(config.server.request_timeout, Duration::from_secs(2));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(config.alarms.reset_timeout, Duration::from_secs(8));
        assert_eq!(config.catalog.path, PathBuf::from("tags.csv"));
    }

    #[test]
    fn test_catalog_path_is_relative_to_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_vars(false).load(file.path()).unwrap();
        let expected = file.path().parent().unwrap().join("tags.csv");
        assert_eq!(config.catalog.path, expected);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new().load("/nonexistent/presswatch.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_parse_error() {
        let result = ConfigLoader::new().with_env_vars(false).load_from_str("server: [1, 2]\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = format!("{}\nextra: 1\n", YAML);
        let result = ConfigLoader::new().with_env_vars(false).load_from_str(&yaml);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let out = resolve_env_placeholders("endpoint: ${PRESSWATCH_TEST_UNSET_VAR_1:opc.tcp://x:4840}");
        assert_eq!(out, "endpoint: opc.tcp://x:4840");
    }

    #[test]
    fn test_env_placeholder_resolution() {
        env::set_var("PRESSWATCH_TEST_PLACEHOLDER_HOST", "10.1.2.3");
        let out = resolve_env_placeholders("opc.tcp://${PRESSWATCH_TEST_PLACEHOLDER_HOST}:4840");
        assert_eq!(out, "opc.tcp://10.1.2.3:4840");
        env::remove_var("PRESSWATCH_TEST_PLACEHOLDER_HOST");
    }

    #[test]
    fn test_unresolved_placeholder_kept() {
        let out = resolve_env_placeholders("a: ${PRESSWATCH_TEST_UNSET_VAR_2} b: ${open");
        assert_eq!(out, "a: ${PRESSWATCH_TEST_UNSET_VAR_2} b: ${open");
    }

    #[test]
    fn test_env_overrides() {
        let loader = ConfigLoader::new().with_env_prefix("PWTEST_OVERRIDE");
        env::set_var("PWTEST_OVERRIDE_ENDPOINT", "opc.tcp://override:4841");
        env::set_var("PWTEST_OVERRIDE_RESET_TIMEOUT", "12s");
        env::set_var("PWTEST_OVERRIDE_LOG_LEVEL", "debug");

        let config = loader.load_from_str(YAML).unwrap();
        assert_eq!(config.server.endpoint, "opc.tcp://override:4841");
        assert_eq!(config.alarms.reset_timeout, Duration::from_secs(12));
        assert_eq!(config.logging.level, LogLevel::Debug);

        env::remove_var("PWTEST_OVERRIDE_ENDPOINT");
        env::remove_var("PWTEST_OVERRIDE_RESET_TIMEOUT");
        env::remove_var("PWTEST_OVERRIDE_LOG_LEVEL");
    }

    #[test]
    fn test_invalid_env_override() {
        let loader = ConfigLoader::new().with_env_prefix("PWTEST_BADVAL");
        env::set_var("PWTEST_BADVAL_RESET_TIMEOUT", "soon");
        let result = loader.load_from_str(YAML);
        env::remove_var("PWTEST_BADVAL_RESET_TIMEOUT");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }
}
