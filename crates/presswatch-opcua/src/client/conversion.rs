// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value quality and timestamps as reported by the server.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::transport::OpcUaValue;

// =============================================================================
// Quality
// =============================================================================

/// Coarse data quality derived from an OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Value is usable.
    #[default]
    Good,

    /// Value may be usable.
    Uncertain,

    /// Value must not be used.
    Bad,
}

impl Quality {
    /// Maps the severity bits of a status code.
    pub fn from_status_code(status_code: u32) -> Self {
        if status_code & 0x8000_0000 != 0 {
            Self::Bad
        } else if status_code & 0x4000_0000 != 0 {
            Self::Uncertain
        } else {
            Self::Good
        }
    }

    /// Returns the generic status code for this quality.
    pub const fn to_status_code(&self) -> u32 {
        match self {
            Self::Good => 0,
            Self::Uncertain => 0x4000_0000,
            Self::Bad => 0x8000_0000,
        }
    }

    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }

    /// Returns `true` if the quality is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        matches!(self, Self::Bad)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::Uncertain => write!(f, "Uncertain"),
            Self::Bad => write!(f, "Bad"),
        }
    }
}

// =============================================================================
// TypedValue
// =============================================================================

/// A raw value with its status code and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// The underlying value.
    pub value: OpcUaValue,

    /// Status code reported alongside the value.
    pub status_code: u32,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl TypedValue {
    /// Creates a Good value stamped now.
    pub fn new(value: OpcUaValue) -> Self {
        Self {
            value,
            status_code: 0,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Creates a value with an explicit status code.
    pub fn with_status(value: OpcUaValue, status_code: u32) -> Self {
        Self {
            status_code,
            ..Self::new(value)
        }
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    /// Returns the quality derived from the status code.
    #[inline]
    pub fn quality(&self) -> Quality {
        Quality::from_status_code(self.status_code)
    }

    /// Best timestamp for the value: source, then server, then now.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.source_timestamp
            .or(self.server_timestamp)
            .unwrap_or_else(Utc::now)
    }
}

impl Default for TypedValue {
    fn default() -> Self {
        Self::new(OpcUaValue::Null)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.quality())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quality_from_status_code() {
        assert_eq!(Quality::from_status_code(0), Quality::Good);
        assert_eq!(Quality::from_status_code(0x00D0_0000), Quality::Good);
        assert_eq!(Quality::from_status_code(0x40A5_0000), Quality::Uncertain);
        assert_eq!(Quality::from_status_code(0x800A_0000), Quality::Bad);
        assert_eq!(Quality::Bad.to_status_code(), 0x8000_0000);
    }

    #[test]
    fn test_typed_value_timestamp_preference() {
        let source = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let value = TypedValue::new(OpcUaValue::Boolean(true)).with_source_timestamp(source);
        assert_eq!(value.timestamp(), source);
        assert!(value.quality().is_good());
    }

    #[test]
    fn test_typed_value_display() {
        let value = TypedValue::with_status(OpcUaValue::Int32(3), 0x8000_0000);
        assert_eq!(value.to_string(), "3 (Bad)");
    }
}
