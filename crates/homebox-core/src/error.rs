//! # Error Types
//!
//! Domain-specific error types for homebox-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  homebox-core errors (this file)                                       │
//! │  ├── ValidationError  - Caller input or stale-id failures              │
//! │  └── RecordError      - One malformed wire record (never fatal)        │
//! │                                                                         │
//! │  homebox-sync errors (separate crate)                                  │
//! │  └── SyncError        - Transport, HTTP, auth and config failures      │
//! │                                                                         │
//! │  Flow: ValidationError → SyncError::Validation → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These indicate a caller mistake, such as a stale or unknown id. They are
/// raised before any request is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g. control characters in an id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The referenced entity is not in the current cache snapshot.
    ///
    /// ## When This Occurs
    /// - The id was never synced from the server
    /// - The entity was deleted remotely and the last cycle dropped it
    #[error("{entity} '{id}' not found in cache")]
    NotFound { entity: String, id: String },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::NotFound`].
    pub fn not_found(entity: &str, id: &str) -> Self {
        ValidationError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

// =============================================================================
// Record Error
// =============================================================================

/// A single wire record that could not be ingested.
///
/// The reconciler logs and drops these; they never fail a cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// The record is not a JSON object.
    #[error("{kind} record is not an object: {raw}")]
    NotAnObject { kind: &'static str, raw: String },

    /// The record has no usable `id`.
    #[error("{kind} record has no id: {raw}")]
    MissingId { kind: &'static str, raw: String },
}

// =============================================================================
// Unit Tests
// =============================================================================
