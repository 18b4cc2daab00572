//! # homebox-sync: Sync Engine for Homebox Inventory
//!
//! This crate keeps a local snapshot of a Homebox server's locations and
//! items up to date and exposes write actions against the same server.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Homebox Sync Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 HomeboxCoordinator (Main Orchestrator)           │  │
//! │  │                                                                  │  │
//! │  │  Owns the CacheSnapshot, runs reconciliation cycles,             │  │
//! │  │  exposes mutations, notifies the InventoryListener               │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   Scheduler    │  │   ApiClient    │  │  Authenticator         │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Poller every   │  │ GET /locations │  │ TokenStore             │    │
//! │  │ 30 min, token  │  │ GET /items     │  │ 401 ─► refresh once    │    │
//! │  │ refresh hourly │  │ writes, shape  │  │ /users/refresh, then   │    │
//! │  │ cancellable    │  │ normalization  │  │ /users/login           │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Pure logic (records, snapshot, diff, validation) lives in             │
//! │  homebox-core and never performs I/O.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`api`] - HTTP client with the 401 refresh-and-retry-once path
//! - [`auth`] - Token store, credentials and the refresh protocol
//! - [`config`] - Configuration (defaults, TOML file, env overrides)
//! - [`coordinator`] - `HomeboxCoordinator`, reconciliation and lifecycle
//! - [`error`] - Sync error types
//! - [`mutations`] - Move/create/update actions on the coordinator
//! - [`scheduler`] - Cancellable periodic tasks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use homebox_sync::{HomeboxConfig, HomeboxCoordinator};
//!
//! let config = HomeboxConfig::load(None)?;
//! let coordinator = HomeboxCoordinator::new(&config)?;
//! coordinator.start().await?;
//!
//! let snapshot = coordinator.snapshot().await;
//! println!("{} items", snapshot.item_count());
//!
//! coordinator.move_item("item-1", "loc-2").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mutations;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{ApiClient, ApiResponse, ConnectionInfo};
pub use auth::{Authenticator, Credentials, RefreshSource, TokenStore};
pub use config::{AuthConfig, AuthMethod, HomeboxConfig, ServerConfig, SyncSettings};
pub use coordinator::{
    CoordinatorStatus, CycleOutcome, HomeboxCoordinator, InventoryListener, NoOpListener, SyncTimings,
    TokenRefreshReport,
};
pub use error::{SyncError, SyncResult};
pub use mutations::{LocationSyncReport, MutationOutcome, NewItem, NewLocation};
pub use scheduler::{spawn_periodic, PeriodicTaskHandle};
