// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag catalog.
//!
//! The catalog maps tag names to node addresses, data types, access rights,
//! an optional alarm category and optional floor/room labels. It is loaded
//! once from CSV and shared read-only for the life of the process.
//!
//! ```text
//! name,node_id,data_type,access,category,floor,room
//! bath_5f_1,ns=2;s=5F.Bath1.Alarm,boolean,readwrite,bath,5F,1
//! alarm_delay,ns=2;s=Config.AlarmDelay,integer,readwrite,,,
//! ```
//!
//! Loading is fail-closed: any bad row, duplicate name or duplicate node id
//! yields an error and no catalog.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim};
use presswatch_opcua::NodeId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CatalogError, CatalogResult};

const REQUIRED_COLUMNS: [&str; 4] = ["name", "node_id", "data_type", "access"];

// =============================================================================
// TagDataType
// =============================================================================

/// Declared data type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagDataType {
    /// Boolean.
    Boolean,
    /// Signed integer, written as Int32.
    Integer,
    /// Floating point, written as Double.
    Float,
    /// Text.
    String,
}

impl TagDataType {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::String => "String",
        }
    }
}

impl fmt::Display for TagDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TagDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Ok(Self::Boolean),
            "integer" | "int" => Ok(Self::Integer),
            "float" | "double" | "real" => Ok(Self::Float),
            "string" | "str" => Ok(Self::String),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

// =============================================================================
// TagAccess
// =============================================================================

/// Access rights of a tag. Every tag is readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagAccess {
    /// Read only.
    ReadOnly,
    /// Read and write.
    ReadWrite,
}

impl TagAccess {
    /// Returns `true` if the tag accepts writes.
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl fmt::Display for TagAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "ReadOnly"),
            Self::ReadWrite => write!(f, "ReadWrite"),
        }
    }
}

impl FromStr for TagAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "readonly" | "read_only" | "ro" | "r" => Ok(Self::ReadOnly),
            "readwrite" | "read_write" | "rw" | "w" => Ok(Self::ReadWrite),
            other => Err(format!("unknown access '{}'", other)),
        }
    }
}

// =============================================================================
// AlarmCategory
// =============================================================================

/// Kind of panic button behind an alarm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCategory {
    /// Public bath.
    Bath,
    /// Accessible toilet.
    AccessibleToilet,
    /// Guest room.
    GuestRoom,
}

impl AlarmCategory {
    /// All categories in display order.
    pub const ALL: [AlarmCategory; 3] = [Self::Bath, Self::AccessibleToilet, Self::GuestRoom];

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bath => "public bath",
            Self::AccessibleToilet => "accessible toilet",
            Self::GuestRoom => "guest room",
        }
    }

    /// Classifies an alarm tag by its name prefix.
    ///
    /// `bath`/`public_bath` map to [`Bath`](Self::Bath), `toilet`/`accessible`
    /// to [`AccessibleToilet`](Self::AccessibleToilet) and `room`/`guest` to
    /// [`GuestRoom`](Self::GuestRoom). Matching is case-insensitive.
    pub fn from_tag_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));
        if starts(&["bath", "public_bath"]) {
            Some(Self::Bath)
        } else if starts(&["toilet", "accessible"]) {
            Some(Self::AccessibleToilet)
        } else if starts(&["room", "guest"]) {
            Some(Self::GuestRoom)
        } else {
            None
        }
    }

    /// Parses a category column. Empty and `none` mean "plain tag".
    pub fn parse_column(s: &str) -> Result<Option<Self>, String> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(None),
            "bath" | "public_bath" => Ok(Some(Self::Bath)),
            "accessible_toilet" | "accessible" | "toilet" => Ok(Some(Self::AccessibleToilet)),
            "guest_room" | "room" => Ok(Some(Self::GuestRoom)),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

impl fmt::Display for AlarmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TagDefinition
// =============================================================================

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagDefinition {
    /// Unique tag name.
    pub name: String,
    /// Server address.
    pub node_id: NodeId,
    /// Declared data type.
    pub data_type: TagDataType,
    /// Access rights.
    pub access: TagAccess,
    /// Alarm category; `None` for plain tags.
    pub category: Option<AlarmCategory>,
    /// Floor label, e.g. `5F`.
    pub floor: Option<String>,
    /// Room label, e.g. `501`.
    pub room: Option<String>,
}

impl TagDefinition {
    /// Creates a plain tag definition.
    pub fn new(
        name: impl Into<String>,
        node_id: NodeId,
        data_type: TagDataType,
        access: TagAccess,
    ) -> Self {
        Self {
            name: name.into(),
            node_id,
            data_type,
            access,
            category: None,
            floor: None,
            room: None,
        }
    }

    /// Sets the alarm category.
    pub fn with_category(mut self, category: AlarmCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the floor and room labels.
    pub fn with_location(mut self, floor: impl Into<String>, room: impl Into<String>) -> Self {
        self.floor = Some(floor.into());
        self.room = Some(room.into());
        self
    }

    /// Returns `true` if this tag is an alarm point.
    #[inline]
    pub fn is_alarm(&self) -> bool {
        self.category.is_some()
    }

    /// Returns `true` if this tag accepts writes.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.access.is_writable()
    }
}

// =============================================================================
// TagCatalog
// =============================================================================

/// Immutable, ordered set of tag definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    tags: Vec<TagDefinition>,
    by_name: HashMap<String, usize>,
    by_node: HashMap<NodeId, usize>,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    floor: Option<String>,
    #[serde(default)]
    room: Option<String>,
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

impl CatalogRow {
    fn into_definition(self, row: usize) -> CatalogResult<TagDefinition> {
        let required = |field: Option<String>, column: &str| {
            non_empty(field).ok_or_else(|| CatalogError::malformed(row, format!("missing {}", column)))
        };

        let name = required(self.name, "name")?;
        let node_id_text = required(self.node_id, "node_id")?;
        let data_type_text = required(self.data_type, "data_type")?;
        let access_text = required(self.access, "access")?;

        let node_id: NodeId = node_id_text
            .parse()
            .map_err(|e| CatalogError::malformed(row, format!("{}", e)))?;
        let data_type: TagDataType = data_type_text
            .parse()
            .map_err(|e: String| CatalogError::malformed(row, e))?;
        let access: TagAccess = access_text
            .parse()
            .map_err(|e: String| CatalogError::malformed(row, e))?;
        // A blank category falls back to the name rule for Boolean tags;
        // `none` opts out explicitly.
        let category = match non_empty(self.category) {
            Some(text) => {
                AlarmCategory::parse_column(&text).map_err(|e| CatalogError::malformed(row, e))?
            }
            None if data_type == TagDataType::Boolean => AlarmCategory::from_tag_name(&name),
            None => None,
        };

        if category.is_some() && data_type != TagDataType::Boolean {
            return Err(CatalogError::malformed(
                row,
                format!("alarm tag '{}' must be boolean, found {}", name, data_type),
            ));
        }

        Ok(TagDefinition {
            name: name.trim().to_string(),
            node_id,
            data_type,
            access,
            category,
            floor: non_empty(self.floor),
            room: non_empty(self.room),
        })
    }
}

impl TagCatalog {
    /// Loads a catalog from CSV.
    ///
    /// # Errors
    ///
    /// Any malformed row, duplicate name or duplicate node id fails the whole
    /// load. Row numbers in errors are line numbers in the input.
    pub fn load<R: Read>(reader: R) -> CatalogResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h.eq_ignore_ascii_case(column)) {
                return Err(CatalogError::malformed(
                    1,
                    format!("header is missing column '{}'", column),
                ));
            }
        }
        let headers = StringRecord::from(
            headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect::<Vec<_>>(),
        );

        let mut definitions = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            let row = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 2);
            let parsed: CatalogRow = record
                .deserialize(Some(&headers))
                .map_err(|e| CatalogError::malformed(row, e.to_string()))?;
            definitions.push((row, parsed.into_definition(row)?));
        }

        Self::build(definitions)
    }

    /// Loads a catalog from a CSV file.
    pub fn load_path(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let content = fs::read(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::load(content.as_slice())?;
        info!(
            path = %path.display(),
            tags = catalog.len(),
            alarms = catalog.alarm_tags().count(),
            "Tag catalog loaded"
        );
        Ok(catalog)
    }

    /// Builds a catalog from definitions, numbering them from row 1.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TagDefinition>,
    ) -> CatalogResult<Self> {
        let numbered = definitions
            .into_iter()
            .enumerate()
            .map(|(i, d)| (i + 1, d))
            .collect();
        Self::build(numbered)
    }

    fn build(definitions: Vec<(usize, TagDefinition)>) -> CatalogResult<Self> {
        let mut catalog = Self::default();

        for (row, definition) in definitions {
            if definition.category.is_some() && definition.data_type != TagDataType::Boolean {
                return Err(CatalogError::malformed(
                    row,
                    format!("alarm tag '{}' must be boolean", definition.name),
                ));
            }
            if catalog.by_name.contains_key(&definition.name) {
                return Err(CatalogError::DuplicateTag {
                    name: definition.name,
                    row,
                });
            }
            if catalog.by_node.contains_key(&definition.node_id) {
                return Err(CatalogError::DuplicateNode {
                    node_id: definition.node_id.to_string(),
                    name: definition.name,
                    row,
                });
            }

            let index = catalog.tags.len();
            catalog.by_name.insert(definition.name.clone(), index);
            catalog.by_node.insert(definition.node_id.clone(), index);
            catalog.tags.push(definition);
        }

        debug!(tags = catalog.tags.len(), "Tag catalog built");
        Ok(catalog)
    }

    /// Looks up a tag by name.
    pub fn lookup(&self, name: &str) -> CatalogResult<&TagDefinition> {
        self.get(name).ok_or_else(|| CatalogError::unknown_tag(name))
    }

    /// Returns the tag with this name, if any.
    pub fn get(&self, name: &str) -> Option<&TagDefinition> {
        self.by_name.get(name).map(|&i| &self.tags[i])
    }

    /// Returns the tag at this position in file order.
    pub fn at(&self, index: usize) -> Option<&TagDefinition> {
        self.tags.get(index)
    }

    /// Returns the tag at this node id, if any.
    pub fn by_node_id(&self, node_id: &NodeId) -> Option<&TagDefinition> {
        self.by_node.get(node_id).map(|&i| &self.tags[i])
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// All tags in file order.
    pub fn iter(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.iter()
    }

    /// Tags to monitor.
    pub fn readable(&self) -> impl Iterator<Item = &TagDefinition> {
        // ReadOnly and ReadWrite are both readable.
        self.tags.iter()
    }

    /// Tags that accept writes.
    pub fn writable(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.iter().filter(|t| t.is_writable())
    }

    /// Tags with an alarm category.
    pub fn alarm_tags(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.iter().filter(|t| t.is_alarm())
    }

    /// Tags without an alarm category.
    pub fn plain_tags(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.iter().filter(|t| !t.is_alarm())
    }

    /// Distinct floor labels in file order.
    pub fn floors(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tags
            .iter()
            .filter_map(|t| t.floor.as_deref())
            .filter(|floor| seen.insert(*floor))
            .collect()
    }

    /// Tags on a floor, in file order.
    pub fn on_floor<'a>(&'a self, floor: &'a str) -> impl Iterator<Item = &'a TagDefinition> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.floor.as_deref() == Some(floor))
    }
}

impl<'a> IntoIterator for &'a TagCatalog {
    type Item = &'a TagDefinition;
    type IntoIter = std::slice::Iter<'a, TagDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOG: &str = "\
name,node_id,data_type,access,category,floor,room
# 5F public rooms
bath_5f_1,ns=2;s=5F.Bath1.Alarm,boolean,readwrite,bath,5F,1
toilet_5f_2,ns=2;s=5F.Toilet2.Alarm,bool,rw,accessible,5F,2

room_501,ns=2;i=501,Boolean,ReadWrite,guest_room,5F,501
room_301,ns=2;i=301,boolean,ro,room,3F,301
alarm_delay,ns=2;s=Config.AlarmDelay,int,rw,,,
alarm_enable,ns=2;s=Config.AlarmEnable,boolean,readwrite,none,,
";

    #[test]
    fn test_load_catalog() {
        let catalog = TagCatalog::load(CATALOG.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.alarm_tags().count(), 4);
        assert_eq!(catalog.plain_tags().count(), 2);
        assert_eq!(catalog.writable().count(), 5);
        assert_eq!(catalog.floors(), vec!["5F", "3F"]);

        let bath = catalog.lookup("bath_5f_1").unwrap();
        assert_eq!(bath.category, Some(AlarmCategory::Bath));
        assert_eq!(bath.node_id, NodeId::string(2, "5F.Bath1.Alarm"));
        assert_eq!(bath.room.as_deref(), Some("1"));

        let delay = catalog.lookup("alarm_delay").unwrap();
        assert_eq!(delay.data_type, TagDataType::Integer);
        assert!(delay.floor.is_none());
        assert!(!delay.is_alarm());
    }

    #[test]
    fn test_file_order_is_kept() {
        let catalog = TagCatalog::load(CATALOG.as_bytes()).unwrap();
        let names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names[0], "bath_5f_1");
        assert_eq!(names[5], "alarm_enable");
        assert_eq!(catalog.on_floor("5F").count(), 3);
    }

    #[test]
    fn test_unknown_tag() {
        let catalog = TagCatalog::load(CATALOG.as_bytes()).unwrap();
        assert!(matches!(
            catalog.lookup("lobby"),
            Err(CatalogError::UnknownTag { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_fails_closed() {
        let csv = "name,node_id,data_type,access\n\
                   bath1,ns=2;i=10,boolean,readwrite\n\
                   bath1,ns=2;i=11,boolean,readwrite\n";
        let result = TagCatalog::load(csv.as_bytes());
        assert!(matches!(result, Err(CatalogError::DuplicateTag { ref name, row: 3 }) if name == "bath1"));
    }

    #[test]
    fn test_duplicate_node_fails() {
        let csv = "name,node_id,data_type,access\n\
                   bath1,ns=2;i=10,boolean,readwrite\n\
                   bath2,ns=2;i=10,boolean,readwrite\n";
        assert!(matches!(
            TagCatalog::load(csv.as_bytes()),
            Err(CatalogError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn test_malformed_rows() {
        let cases = [
            "name,node_id,data_type,access\nbath1,,boolean,readwrite\n",
            "name,node_id,data_type,access\nbath1,ns=2;x=1,boolean,readwrite\n",
            "name,node_id,data_type,access\nbath1,ns=2;i=1,blob,readwrite\n",
            "name,node_id,data_type,access\nbath1,ns=2;i=1,boolean,sometimes\n",
            "name,node_id,data_type,access\nbath1,ns=2;i=1,boolean\n",
            "name,node_id,data_type,access,category\nbath1,ns=2;i=1,boolean,rw,lobby\n",
            "name,node_id,data_type,access,category\nbath1,ns=2;i=1,float,rw,bath\n",
        ];
        for csv in cases {
            let result = TagCatalog::load(csv.as_bytes());
            assert!(
                matches!(result, Err(CatalogError::MalformedCatalog { row: 2, .. })),
                "expected malformed row 2 for {:?}, got {:?}",
                csv,
                result
            );
        }
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "name,node_id,access\nbath1,ns=2;i=1,rw\n";
        assert!(matches!(
            TagCatalog::load(csv.as_bytes()),
            Err(CatalogError::MalformedCatalog { row: 1, .. })
        ));
    }

    #[test]
    fn test_load_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        let catalog = TagCatalog::load_path(file.path()).unwrap();
        assert_eq!(catalog.len(), 6);

        let missing = TagCatalog::load_path("/nonexistent/catalog.csv");
        assert!(matches!(missing, Err(CatalogError::Io { .. })));
    }

    #[test]
    fn test_from_definitions() {
        let catalog = TagCatalog::from_definitions([
            TagDefinition::new("bath1", NodeId::numeric(2, 10), TagDataType::Boolean, TagAccess::ReadWrite)
                .with_category(AlarmCategory::Bath)
                .with_location("2F", "1"),
            TagDefinition::new("delay", NodeId::numeric(2, 11), TagDataType::Integer, TagAccess::ReadWrite),
        ])
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.by_node_id(&NodeId::numeric(2, 10)).is_some());

        let bad = TagCatalog::from_definitions([TagDefinition::new(
            "temp",
            NodeId::numeric(2, 12),
            TagDataType::Float,
            TagAccess::ReadOnly,
        )
        .with_category(AlarmCategory::Bath)]);
        assert!(matches!(bad, Err(CatalogError::MalformedCatalog { row: 1, .. })));
    }

    #[test]
    fn test_spellings() {
        assert_eq!("REAL".parse::<TagDataType>().unwrap(), TagDataType::Float);
        assert_eq!("str".parse::<TagDataType>().unwrap(), TagDataType::String);
        assert_eq!("Read_Only".parse::<TagAccess>().unwrap(), TagAccess::ReadOnly);
        assert_eq!("w".parse::<TagAccess>().unwrap(), TagAccess::ReadWrite);
        assert_eq!(
            AlarmCategory::parse_column("Public_Bath").unwrap(),
            Some(AlarmCategory::Bath)
        );
        assert_eq!(AlarmCategory::parse_column(" ").unwrap(), None);
    }

    #[test]
    fn test_category_from_tag_name() {
        let csv = "\
name,node_id,data_type,access
bath1,ns=2;i=10,Boolean,ReadWrite
Public_Bath_3F,ns=2;i=11,Boolean,ReadWrite
toilet_2f,ns=2;i=12,Boolean,ReadWrite
accessible_1f,ns=2;i=13,Boolean,ReadOnly
room_501,ns=2;i=14,Boolean,ReadWrite
guest_302,ns=2;i=15,Boolean,ReadWrite
room_count,ns=2;i=16,Integer,ReadOnly
lobby_lamp,ns=2;i=17,Boolean,ReadWrite
";
        let catalog = TagCatalog::load(csv.as_bytes()).unwrap();
        let category = |name: &str| catalog.lookup(name).unwrap().category;

        assert_eq!(category("bath1"), Some(AlarmCategory::Bath));
        assert_eq!(category("Public_Bath_3F"), Some(AlarmCategory::Bath));
        assert_eq!(category("toilet_2f"), Some(AlarmCategory::AccessibleToilet));
        assert_eq!(category("accessible_1f"), Some(AlarmCategory::AccessibleToilet));
        assert_eq!(category("room_501"), Some(AlarmCategory::GuestRoom));
        assert_eq!(category("guest_302"), Some(AlarmCategory::GuestRoom));
        // Only Boolean tags are classified.
        assert_eq!(category("room_count"), None);
        assert_eq!(category("lobby_lamp"), None);
        assert_eq!(catalog.alarm_tags().count(), 6);
    }

    #[test]
    fn test_category_none_opts_out() {
        let csv = "\
name,node_id,data_type,access,category
bath_fan,ns=2;i=20,Boolean,ReadWrite,none
bath_call,ns=2;i=21,Boolean,ReadWrite,
";
        let catalog = TagCatalog::load(csv.as_bytes()).unwrap();
        assert_eq!(catalog.lookup("bath_fan").unwrap().category, None);
        assert_eq!(
            catalog.lookup("bath_call").unwrap().category,
            Some(AlarmCategory::Bath)
        );
    }
}
