//! # homebox-core: Pure Inventory Logic for Homebox Sync
//!
//! This crate holds everything about the Homebox inventory model that can be
//! expressed without touching the network: wire record parsing, response
//! shape normalization, the cache snapshot and its merge rules, and the
//! item-set diff that drives entity lifecycle in a host application.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Homebox Sync Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Host application (agent, plugin)                │   │
//! │  │   on_items_added ◄── notifications ──► mutation commands        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         homebox-sync (HTTP, token refresh, scheduler)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ homebox-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   wire    │  │   cache   │  │   diff    │  │   │
//! │  │   │ Location  │  │ lenient   │  │ Snapshot  │  │ added /   │  │   │
//! │  │   │ Item      │  │ parsing   │  │ Builder   │  │ removed   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO TIMERS • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Canonical Location / Item records
//! - [`wire`] - Lenient JSON parsing and collection normalization
//! - [`credential`] - Bearer token sanitizing and redaction
//! - [`cache`] - Cache snapshot, builder and read queries
//! - [`diff`] - Item-id set difference between snapshots
//! - [`error`] - Validation and record errors
//! - [`validation`] - Caller input checks
//!
//! ## Example Usage
//!
//! ```rust
//! use homebox_core::cache::SnapshotBuilder;
//! use homebox_core::diff::ItemDiff;
//! use serde_json::json;
//!
//! let mut builder = SnapshotBuilder::new();
//! builder.add_locations(vec![json!({"id": "loc-1", "name": "Garage"})]);
//! builder.add_items(vec![json!({"id": "item-1", "name": "Drill", "locationId": "loc-1"})]);
//! let snapshot = builder.build();
//!
//! assert_eq!(snapshot.location_label("item-1"), "Garage");
//!
//! let diff = ItemDiff::between(&Default::default(), &snapshot);
//! assert!(diff.added.contains("item-1"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod credential;
pub mod diff;
pub mod error;
pub mod types;
pub mod validation;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cache::{CacheSnapshot, LocationDisplay, SnapshotBuilder};
pub use diff::ItemDiff;
pub use error::{RecordError, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Path prefix of every Homebox REST endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Display label for an item without any location reference.
pub const NO_LOCATION_LABEL: &str = "No Location";

/// Display label for an item whose location id does not resolve.
pub const UNKNOWN_LOCATION_LABEL: &str = "Unknown";
