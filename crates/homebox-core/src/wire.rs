//! # Wire Parsing
//!
//! Lenient conversion from Homebox JSON payloads into [`crate::types`].
//!
//! ## Shape Variations Handled
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Accepted Response Shapes                            │
//! │                                                                         │
//! │  Collections           [ {...}, {...} ]                                │
//! │                        { "items": [ {...} ], "page": 1, ... }          │
//! │                                                                         │
//! │  Item location         "locationId": "loc-1"                           │
//! │                        "location": { "id": "loc-1", "name": "..." }    │
//! │                                                                         │
//! │  Item labels           "labelIds": ["l1"]                              │
//! │                        "labels": [ { "id": "l1", "name": "..." } ]     │
//! │                                                                         │
//! │  Item custom fields    "fields": { "color": "red" }                    │
//! │                        "fields": [ { "name": "color",                  │
//! │                                      "textValue": "red" } ]            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Anything outside these shapes degrades to "absent" rather than an error.
//! Only a record without an object body or an id is rejected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::RecordError;
use crate::types::{Item, ItemRecord, Location, LocationRef};

/// Keys that may hold a custom field's value, in lookup order.
const FIELD_VALUE_KEYS: [&str; 4] = ["value", "textValue", "numberValue", "booleanValue"];

// =============================================================================
// Collection Normalization
// =============================================================================

/// Extracts a record list from either a bare array or an object wrapping the
/// list under `key`.
///
/// Returns `None` for any other shape so the caller can log it.
///
/// ## Example
/// ```rust
/// use homebox_core::wire::normalize_collection;
/// use serde_json::json;
///
/// let bare = normalize_collection(json!([{"id": "a"}]), "items");
/// let wrapped = normalize_collection(json!({"items": [{"id": "a"}], "total": 1}), "items");
/// assert_eq!(bare, wrapped);
/// assert!(normalize_collection(json!({"data": []}), "items").is_none());
/// ```
pub fn normalize_collection(body: Value, key: &str) -> Option<Vec<Value>> {
    match body {
        Value::Array(records) => Some(records),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(records)) => Some(records),
            _ => None,
        },
        _ => None,
    }
}

/// Short human description of a JSON value's shape, for log lines.
pub fn describe_shape(body: &Value) -> String {
    match body {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(a) => format!("array[{}]", a.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object{{{}}}", keys.join(","))
        }
    }
}

// =============================================================================
// Record Parsing
// =============================================================================

/// Parses one location record.
pub fn parse_location(raw: &Value) -> Result<Location, RecordError> {
    let obj = as_object(raw, "location")?;
    location_from_object(obj).ok_or_else(|| RecordError::MissingId {
        kind: "location",
        raw: raw.to_string(),
    })
}

/// Parses one item record, keeping its wire-level location reference.
///
/// An embedded location object wins over a bare `locationId` when both are
/// present. An embedded object without an id falls back to `locationId`.
pub fn parse_item(raw: &Value) -> Result<ItemRecord, RecordError> {
    let obj = as_object(raw, "item")?;
    let id = id_of(obj).ok_or_else(|| RecordError::MissingId {
        kind: "item",
        raw: raw.to_string(),
    })?;

    let location = obj
        .get("location")
        .and_then(Value::as_object)
        .and_then(location_from_object)
        .map(LocationRef::Embedded)
        .or_else(|| string_of(obj, "locationId").map(LocationRef::Id));

    let item = Item {
        id,
        name: string_of(obj, "name").unwrap_or_default(),
        description: string_of(obj, "description"),
        quantity: obj.get("quantity").and_then(integer_of),
        asset_id: string_of(obj, "assetId"),
        purchase_price: obj.get("purchasePrice").and_then(float_of),
        fields: obj.get("fields").map(parse_fields).unwrap_or_default(),
        label_ids: label_ids_of(obj),
        linked_item_ids: id_list(obj.get("linkedItemIds")),
        location_id: location.as_ref().map(|r| r.id().to_string()),
        created_at: obj.get("createdAt").and_then(timestamp_of),
        updated_at: obj.get("updatedAt").and_then(timestamp_of),
    };

    Ok(ItemRecord { item, location })
}

/// Reads the `id` of a server response to a create call.
pub fn created_id(body: &Value) -> Option<String> {
    body.as_object().and_then(id_of)
}

/// Reads the `token` field of a login or refresh response.
pub fn token_of(body: &Value) -> Option<String> {
    body.as_object()
        .and_then(|obj| string_of(obj, "token"))
        .filter(|t| !t.trim().is_empty())
}

/// Finds the server id of a custom field by name in a fields listing.
///
/// Accepts a bare array or `{"fields": [...]}`.
pub fn field_id_by_name(body: Value, name: &str) -> Option<String> {
    normalize_collection(body, "fields")?
        .iter()
        .filter_map(Value::as_object)
        .find(|field| string_of(field, "name").as_deref() == Some(name))
        .and_then(id_of)
}

// =============================================================================
// Field Helpers
// =============================================================================

fn as_object<'a>(raw: &'a Value, kind: &'static str) -> Result<&'a Map<String, Value>, RecordError> {
    raw.as_object().ok_or_else(|| RecordError::NotAnObject {
        kind,
        raw: raw.to_string(),
    })
}

fn location_from_object(obj: &Map<String, Value>) -> Option<Location> {
    Some(Location {
        id: id_of(obj)?,
        name: string_of(obj, "name").unwrap_or_default(),
        description: string_of(obj, "description"),
        parent_id: string_of(obj, "parentId")
            .or_else(|| obj.get("parent").and_then(Value::as_object).and_then(id_of)),
        path: string_of(obj, "path"),
        location_type: string_of(obj, "type"),
    })
}

/// Ids are usually strings; numeric ids are accepted and stringified.
fn id_of(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_of(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp_of(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn id_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => id_of(obj),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn label_ids_of(obj: &Map<String, Value>) -> Vec<String> {
    let ids = id_list(obj.get("labelIds"));
    if ids.is_empty() {
        id_list(obj.get("labels"))
    } else {
        ids
    }
}

fn parse_fields(value: &Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(entries) => entries
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|field| {
                let name = string_of(field, "name")?;
                let value = FIELD_VALUE_KEYS
                    .iter()
                    .filter_map(|key| field.get(*key))
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(Value::Null);
                Some((name, value))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}
