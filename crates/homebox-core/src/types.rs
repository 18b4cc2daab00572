//! # Domain Types
//!
//! Canonical inventory records held in the cache.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Location     │   │      Item       │   │   LocationRef   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (opaque)    │◄──│  location_id    │   │  Id(String)     │       │
//! │  │  name           │   │  name, quantity │   │  Embedded(Loc)  │       │
//! │  │  parent_id ─┐   │   │  fields{}       │   └─────────────────┘       │
//! │  └─────────────┼───┘   │  label_ids[]    │     wire-only; folded       │
//! │         ▲      │       │  linked_ids[]   │     into Item.location_id   │
//! │         └──────┘       └─────────────────┘     by the SnapshotBuilder  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids are opaque strings assigned by the server. The location tree is not
//! checked for cycles here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Location
// =============================================================================

/// A named storage place, optionally nested under a parent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Server-assigned identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent location id, if this location is nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Human readable path from the root, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
}

impl Location {
    /// Creates a location with only an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Location {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Location Reference
// =============================================================================

/// How an item points at its location on the wire.
///
/// Older servers send a bare `locationId`; newer ones embed the whole
/// location object. Both collapse into [`Item::location_id`] once the
/// snapshot is built.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationRef {
    /// A bare location id.
    Id(String),

    /// A full location object carried inside the item.
    Embedded(Location),
}

impl LocationRef {
    /// Returns the referenced location id.
    pub fn id(&self) -> &str {
        match self {
            LocationRef::Id(id) => id,
            LocationRef::Embedded(location) => &location.id,
        }
    }

    /// Returns the embedded location, if any.
    pub fn embedded(&self) -> Option<&Location> {
        match self {
            LocationRef::Id(_) => None,
            LocationRef::Embedded(location) => Some(location),
        }
    }
}

// =============================================================================
// Item
// =============================================================================

/// An inventory record, in canonical cache shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Server-assigned identifier.
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,

    /// Custom fields keyed by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,

    #[serde(default)]
    pub label_ids: Vec<String>,

    #[serde(default)]
    pub linked_item_ids: Vec<String>,

    /// Flat location id. Always set from the embedded location when the
    /// server sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Creates an item with only an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Item {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns a custom field value rendered as text.
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A parsed item together with its wire-level location reference.
///
/// Produced by [`crate::wire::parse_item`]; the snapshot builder folds the
/// reference into the item and the location map.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub item: Item,
    pub location: Option<LocationRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_location_ref_id() {
        let bare = LocationRef::Id("loc-1".into());
        assert_eq!(bare.id(), "loc-1");
        assert!(bare.embedded().is_none());

        let embedded = LocationRef::Embedded(Location::new("loc-2", "Shed"));
        assert_eq!(embedded.id(), "loc-2");
        assert_eq!(embedded.embedded().map(|l| l.name.as_str()), Some("Shed"));
    }

    #[test]
    fn test_field_text() {
        let mut item = Item::new("item-1", "Grinder");
        item.fields.insert("coffee".into(), json!("Ethiopia"));
        item.fields.insert("grams".into(), json!(18));

        assert_eq!(item.field_text("coffee").as_deref(), Some("Ethiopia"));
        assert_eq!(item.field_text("grams").as_deref(), Some("18"));
        assert!(item.field_text("missing").is_none());
    }

    #[test]
    fn test_location_serializes_type_field() {
        let mut location = Location::new("loc-1", "Kitchen");
        location.location_type = Some("room".into());
        location.parent_id = Some("loc-0".into());

        let value = serde_json::to_value(&location).unwrap();
        assert_eq!(value["type"], "room");
        assert_eq!(value["parentId"], "loc-0");
        assert!(value.get("description").is_none());
    }
}
