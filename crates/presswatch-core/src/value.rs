// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed tag values.
//!
//! Raw server values are decoded against the tag's declared data type.
//! Anything that does not fit (wrong type, out of range, NaN for an integer)
//! is kept as a `Bad` value with no payload so alarm points can show
//! "unknown" instead of silently missing an update.

use std::fmt;

use chrono::{DateTime, Utc};
use presswatch_opcua::{OpcUaValue, Quality, TypedValue};
use serde::{Deserialize, Serialize};

use crate::catalog::{TagDataType, TagDefinition};

// =============================================================================
// TagVariant
// =============================================================================

/// A value of one of the catalog data types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagVariant {
    /// Boolean.
    Boolean(bool),
    /// Integer.
    Integer(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
}

impl TagVariant {
    /// Returns the data type this value belongs to.
    pub fn data_type(&self) -> TagDataType {
        match self {
            Self::Boolean(_) => TagDataType::Boolean,
            Self::Integer(_) => TagDataType::Integer,
            Self::Float(_) => TagDataType::Float,
            Self::String(_) => TagDataType::String,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Decodes a raw value as `data_type`.
    ///
    /// Returns `None` when the value has no lossless representation.
    pub fn decode(raw: &OpcUaValue, data_type: TagDataType) -> Option<Self> {
        match data_type {
            TagDataType::Boolean => raw.as_bool().map(Self::Boolean),
            TagDataType::Integer => raw.as_i64().map(Self::Integer),
            TagDataType::Float => raw.as_f64().filter(|v| !v.is_nan()).map(Self::Float),
            TagDataType::String => raw.as_str().map(|s| Self::String(s.to_string())),
        }
    }

    /// Encodes the value for the wire.
    ///
    /// Integers go out as Int32 and yield `None` outside that range.
    pub fn to_opcua(&self) -> Option<OpcUaValue> {
        match self {
            Self::Boolean(v) => Some(OpcUaValue::Boolean(*v)),
            Self::Integer(v) => i32::try_from(*v).ok().map(OpcUaValue::Int32),
            Self::Float(v) => Some(OpcUaValue::Double(*v)),
            Self::String(v) => Some(OpcUaValue::String(v.clone())),
        }
    }
}

impl fmt::Display for TagVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for TagVariant {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for TagVariant {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for TagVariant {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for TagVariant {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for TagVariant {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for TagVariant {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

// =============================================================================
// TagValue
// =============================================================================

/// One decoded observation of a tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagValue {
    /// Catalog name.
    pub tag_name: String,
    /// Decoded value; `None` when the server sent nothing usable.
    pub value: Option<TagVariant>,
    /// Source timestamp, else server timestamp, else receipt time.
    pub timestamp: DateTime<Utc>,
    /// Data quality.
    pub quality: Quality,
}

impl TagValue {
    /// Creates a Good value stamped now.
    pub fn good(tag_name: impl Into<String>, value: impl Into<TagVariant>) -> Self {
        Self {
            tag_name: tag_name.into(),
            value: Some(value.into()),
            timestamp: Utc::now(),
            quality: Quality::Good,
        }
    }

    /// Creates a value-less observation with the given quality.
    pub fn without_value(tag_name: impl Into<String>, quality: Quality) -> Self {
        Self {
            tag_name: tag_name.into(),
            value: None,
            timestamp: Utc::now(),
            quality,
        }
    }

    /// Decodes a notification for `definition`.
    pub fn decode(definition: &TagDefinition, raw: &TypedValue) -> Self {
        let timestamp = raw.timestamp();
        let quality = raw.quality();

        if raw.value.is_null() {
            return Self {
                tag_name: definition.name.clone(),
                value: None,
                timestamp,
                quality: if quality.is_good() { Quality::Bad } else { quality },
            };
        }

        match TagVariant::decode(&raw.value, definition.data_type) {
            Some(value) => Self {
                tag_name: definition.name.clone(),
                value: Some(value),
                timestamp,
                quality,
            },
            None => {
                tracing::debug!(
                    tag = %definition.name,
                    expected = %definition.data_type,
                    actual = raw.value.type_name(),
                    "Undecodable value delivered as Bad"
                );
                Self {
                    tag_name: definition.name.clone(),
                    value: None,
                    timestamp,
                    quality: Quality::Bad,
                }
            }
        }
    }

    /// Returns the boolean payload when the quality is Good.
    pub fn good_bool(&self) -> Option<bool> {
        if self.quality.is_good() {
            self.value.as_ref().and_then(TagVariant::as_bool)
        } else {
            None
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={} ({})", self.tag_name, v, self.quality),
            None => write!(f, "{}=<none> ({})", self.tag_name, self.quality),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TagAccess;
    use presswatch_opcua::NodeId;

    fn definition(data_type: TagDataType) -> TagDefinition {
        TagDefinition::new("t", NodeId::numeric(2, 1), data_type, TagAccess::ReadWrite)
    }

    #[test]
    fn test_decode_boolean() {
        let def = definition(TagDataType::Boolean);
        let value = TagValue::decode(&def, &TypedValue::new(OpcUaValue::Boolean(true)));
        assert_eq!(value.good_bool(), Some(true));

        let value = TagValue::decode(&def, &TypedValue::new(OpcUaValue::Byte(0)));
        assert_eq!(value.good_bool(), Some(false));

        let value = TagValue::decode(&def, &TypedValue::new(OpcUaValue::Int16(7)));
        assert_eq!(value.quality, Quality::Bad);
        assert!(value.value.is_none());
    }

    #[test]
    fn test_decode_integer_rejects_fractions_and_nan() {
        let def = definition(TagDataType::Integer);
        let ok = TagValue::decode(&def, &TypedValue::new(OpcUaValue::Double(12.0)));
        assert_eq!(ok.value, Some(TagVariant::Integer(12)));

        for raw in [OpcUaValue::Double(1.5), OpcUaValue::Double(f64::NAN), OpcUaValue::UInt64(u64::MAX)] {
            let bad = TagValue::decode(&def, &TypedValue::new(raw));
            assert_eq!(bad.quality, Quality::Bad);
            assert!(bad.value.is_none());
        }
    }

    #[test]
    fn test_decode_keeps_server_quality() {
        let def = definition(TagDataType::Float);
        let raw = TypedValue::with_status(OpcUaValue::Float(2.5), 0x4000_0000);
        let value = TagValue::decode(&def, &raw);
        assert_eq!(value.quality, Quality::Uncertain);
        assert_eq!(value.value, Some(TagVariant::Float(2.5)));

        let null = TagValue::decode(&def, &TypedValue::with_status(OpcUaValue::Null, 0x8000_0000));
        assert_eq!(null.quality, Quality::Bad);
        assert!(null.good_bool().is_none());
    }

    #[test]
    fn test_decode_string() {
        let def = definition(TagDataType::String);
        let value = TagValue::decode(&def, &TypedValue::new(OpcUaValue::String("ok".into())));
        assert_eq!(value.value, Some(TagVariant::String("ok".into())));
        let bad = TagValue::decode(&def, &TypedValue::new(OpcUaValue::Int32(1)));
        assert_eq!(bad.quality, Quality::Bad);
    }

    #[test]
    fn test_to_opcua() {
        assert_eq!(TagVariant::Integer(5).to_opcua(), Some(OpcUaValue::Int32(5)));
        assert_eq!(TagVariant::Integer(i64::from(i32::MAX) + 1).to_opcua(), None);
        assert_eq!(TagVariant::Float(1.0).to_opcua(), Some(OpcUaValue::Double(1.0)));
        assert_eq!(TagVariant::Boolean(false).to_opcua(), Some(OpcUaValue::Boolean(false)));
    }
}
