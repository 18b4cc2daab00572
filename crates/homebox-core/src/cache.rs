//! # Cache Snapshot
//!
//! The id-indexed pair of maps a reconciliation cycle produces, and the
//! builder that produces it.
//!
//! ## Build Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SnapshotBuilder Flow                             │
//! │                                                                         │
//! │  add_locations([...])                                                  │
//! │      │  parse each record; malformed → skipped                         │
//! │      ▼                                                                  │
//! │  locations: { id → Location }                                          │
//! │      │                                                                  │
//! │  add_items([...])                                                      │
//! │      │  parse each record; malformed → skipped                         │
//! │      │  embedded location → OVERWRITE locations[id]                    │
//! │      │  item.location_id = reference id                                │
//! │      ▼                                                                  │
//! │  items: { id → Item }                                                  │
//! │      │                                                                  │
//! │  build() ──► CacheSnapshot (immutable, swapped in whole)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A snapshot is never merged with the previous one; entries missing from
//! the latest fetch simply disappear. The optimistic patch methods exist for
//! mutation operations, which clone the current snapshot, patch the clone
//! and swap it in.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::RecordError;
use crate::types::{Item, Location, LocationRef};
use crate::wire::{parse_item, parse_location};
use crate::{NO_LOCATION_LABEL, UNKNOWN_LOCATION_LABEL};

// =============================================================================
// Cache Snapshot
// =============================================================================

/// Locations and items keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    locations: HashMap<String, Location>,
    items: HashMap<String, Item>,
}

/// Where an item is, for display purposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationDisplay<'a> {
    /// The item's location is in the cache.
    Resolved(&'a Location),

    /// The item points at a location id the cache does not know.
    Unknown(&'a str),

    /// The item has no location reference.
    NoLocation,
}

impl LocationDisplay<'_> {
    /// The label a host shows as the item's state.
    pub fn label(&self) -> &str {
        match self {
            LocationDisplay::Resolved(location) => &location.name,
            LocationDisplay::Unknown(_) => UNKNOWN_LOCATION_LABEL,
            LocationDisplay::NoLocation => NO_LOCATION_LABEL,
        }
    }
}

impl CacheSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Read Access
    // =========================================================================

    pub fn locations(&self) -> &HashMap<String, Location> {
        &self.locations
    }

    pub fn items(&self) -> &HashMap<String, Item> {
        &self.items
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// All item ids, ordered.
    pub fn item_ids(&self) -> BTreeSet<String> {
        self.items.keys().cloned().collect()
    }

    /// Case-insensitive lookup of a location by name.
    ///
    /// When several locations share a name, the one with the smallest id is
    /// returned so repeated calls agree.
    pub fn find_location_by_name(&self, name: &str) -> Option<&Location> {
        let wanted = name.trim().to_lowercase();
        self.locations
            .values()
            .filter(|location| location.name.trim().to_lowercase() == wanted)
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Resolves an item's location for display. `None` if the item itself
    /// is not cached.
    pub fn location_display(&self, item_id: &str) -> Option<LocationDisplay<'_>> {
        let item = self.items.get(item_id)?;
        Some(match item.location_id.as_deref() {
            None => LocationDisplay::NoLocation,
            Some(location_id) => match self.locations.get(location_id) {
                Some(location) => LocationDisplay::Resolved(location),
                None => LocationDisplay::Unknown(location_id),
            },
        })
    }

    /// The display label for an item's location. Uncached items read as
    /// unknown.
    pub fn location_label(&self, item_id: &str) -> String {
        self.location_display(item_id)
            .map(|display| display.label().to_string())
            .unwrap_or_else(|| UNKNOWN_LOCATION_LABEL.to_string())
    }

    /// The cached records an item links to. Dangling links are dropped.
    pub fn linked_items(&self, item_id: &str) -> Vec<&Item> {
        self.items
            .get(item_id)
            .map(|item| {
                item.linked_item_ids
                    .iter()
                    .filter_map(|id| self.items.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Items whose location is `location_id`.
    pub fn items_in_location(&self, location_id: &str) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .items
            .values()
            .filter(|item| item.location_id.as_deref() == Some(location_id))
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    // =========================================================================
    // Optimistic Patches
    // =========================================================================

    /// Points an item at a new location. Returns false if the item is not
    /// cached.
    pub fn set_item_location(&mut self, item_id: &str, location_id: &str) -> bool {
        match self.items.get_mut(item_id) {
            Some(item) => {
                item.location_id = Some(location_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Sets a custom field on a cached item. Returns false if the item is
    /// not cached.
    pub fn set_item_field(&mut self, item_id: &str, name: &str, value: Value) -> bool {
        match self.items.get_mut(item_id) {
            Some(item) => {
                item.fields.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Inserts or replaces a location.
    pub fn upsert_location(&mut self, location: Location) {
        self.locations.insert(location.id.clone(), location);
    }

    /// Renames a cached location. Returns false if it is not cached.
    pub fn rename_location(&mut self, id: &str, name: &str, description: Option<&str>) -> bool {
        match self.locations.get_mut(id) {
            Some(location) => {
                location.name = name.to_string();
                location.description = description.map(str::to_string);
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Snapshot Builder
// =============================================================================

/// Builds a [`CacheSnapshot`] from raw record lists.
///
/// Locations must be added before items so that embedded item locations
/// overwrite entries from the location listing.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: CacheSnapshot,
    skipped: Vec<RecordError>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests location records. Malformed ones are recorded as skipped.
    pub fn add_locations(&mut self, records: Vec<Value>) -> &mut Self {
        for raw in &records {
            match parse_location(raw) {
                Ok(location) => self.snapshot.upsert_location(location),
                Err(e) => self.skipped.push(e),
            }
        }
        self
    }

    /// Ingests item records, folding any embedded location into the
    /// location map.
    pub fn add_items(&mut self, records: Vec<Value>) -> &mut Self {
        for raw in &records {
            match parse_item(raw) {
                Ok(record) => {
                    let mut item = record.item;
                    if let Some(reference) = record.location {
                        item.location_id = Some(reference.id().to_string());
                        if let LocationRef::Embedded(location) = reference {
                            self.snapshot.upsert_location(location);
                        }
                    }
                    self.snapshot.items.insert(item.id.clone(), item);
                }
                Err(e) => self.skipped.push(e),
            }
        }
        self
    }

    /// Records dropped so far.
    pub fn skipped(&self) -> &[RecordError] {
        &self.skipped
    }

    /// Finishes the snapshot.
    pub fn build(self) -> CacheSnapshot {
        self.snapshot
    }
}
