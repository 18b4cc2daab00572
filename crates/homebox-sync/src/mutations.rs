//! # Mutation Operations
//!
//! Write actions exposed to command dispatchers. Each action runs through
//! the same 401 refresh-and-retry-once path as the fetch layer.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mutation Flow                                    │
//! │                                                                         │
//! │  move_item("item-1", "loc-2")                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate ids ─── item-1 not cached? ──► Err(ValidationError)          │
//! │       │                                  (no request sent)              │
//! │       ▼                                                                 │
//! │  PUT /items/item-1 {"locationId": "loc-2"}                             │
//! │       │                                                                 │
//! │       ├── non-2xx / transport / auth ──► Ok(Failure(message))          │
//! │       ▼                                                                 │
//! │  patch cached item (copy-on-write, readers keep their view)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  request_refresh()  ──► reconciliation confirms or overwrites          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ok(Success("item-1"))                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Err` is reserved for caller mistakes. Anything the server or the network
//! does comes back as [`MutationOutcome::Failure`].

use std::collections::BTreeMap;
use std::sync::Arc;

use homebox_core::validation::{
    validate_description, validate_id, validate_name, validate_price, validate_quantity,
};
use homebox_core::wire::{created_id, field_id_by_name, parse_location};
use homebox_core::{CacheSnapshot, ValidationError};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api::ApiResponse;
use crate::coordinator::HomeboxCoordinator;
use crate::error::{SyncError, SyncResult};

/// Field type used when writing custom fields.
const TEXT_FIELD_TYPE: &str = "text";

// =============================================================================
// Outcomes and Requests
// =============================================================================

/// Result of a mutation that reached the server (or failed trying).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Id of the affected entity.
    Success(String),
    /// Message suitable for showing to the user.
    Failure(String),
}

impl MutationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MutationOutcome::Success(_))
    }

    pub fn detail(&self) -> &str {
        match self {
            MutationOutcome::Success(detail) | MutationOutcome::Failure(detail) => detail,
        }
    }
}

/// A new item, serialized as the `POST /items` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        NewItem {
            name: name.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_name("name", &self.name)?;
        validate_description(&self.description)?;
        if let Some(location_id) = &self.location_id {
            validate_id("location_id", location_id)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(price) = self.purchase_price {
            validate_price(price)?;
        }
        Ok(())
    }
}

/// A new location, serialized as the `POST /locations` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl NewLocation {
    pub fn new(name: impl Into<String>) -> Self {
        NewLocation {
            name: name.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_name("name", &self.name)?;
        validate_description(&self.description)?;
        if let Some(parent_id) = &self.parent_id {
            validate_id("parent_id", parent_id)?;
        }
        Ok(())
    }
}

/// Result of [`HomeboxCoordinator::ensure_locations`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationSyncReport {
    /// Names that were created, with their new ids.
    pub created: Vec<(String, String)>,
    /// Names already present in the cache.
    pub existing: Vec<String>,
    /// Names that could not be created, with the failure message.
    pub failed: Vec<(String, String)>,
}

// =============================================================================
// Operations
// =============================================================================

impl HomeboxCoordinator {
    /// Moves an item to another location.
    ///
    /// Only the item is checked against the cache; the target location may
    /// be newer than the last reconciliation.
    pub async fn move_item(&self, item_id: &str, location_id: &str) -> Result<MutationOutcome, ValidationError> {
        validate_id("item_id", item_id)?;
        validate_id("location_id", location_id)?;
        self.require_item(item_id).await?;

        let body = json!({ "locationId": location_id });
        let path = format!("/items/{}", item_id);
        match self.send_write(Method::PUT, &path, &body).await {
            Ok(_) => {
                self.patch_cache(|cache| cache.set_item_location(item_id, location_id)).await;
                self.request_refresh();
                info!(item_id, location_id, "Moved item");
                Ok(MutationOutcome::Success(item_id.to_string()))
            }
            Err(e) => Ok(failure("move item", e)),
        }
    }

    /// Creates an item. The new item reaches the cache through the
    /// follow-up reconciliation, so listeners see it as added.
    pub async fn create_item(&self, item: &NewItem) -> Result<MutationOutcome, ValidationError> {
        item.validate()?;

        let body = match serde_json::to_value(item) {
            Ok(body) => body,
            Err(e) => return Ok(MutationOutcome::Failure(format!("Could not encode item: {}", e))),
        };

        match self.send_create("/items", &body).await {
            Ok(created) => match created_id(&created) {
                Some(id) => {
                    self.request_refresh();
                    info!(item_id = %id, name = %item.name, "Created item");
                    Ok(MutationOutcome::Success(id))
                }
                None => Ok(missing_id("item")),
            },
            Err(e) => Ok(failure("create item", e)),
        }
    }

    /// Creates a location and adds it to the cache immediately.
    pub async fn create_location(&self, location: &NewLocation) -> Result<MutationOutcome, ValidationError> {
        location.validate()?;

        let mut body = json!({
            "name": location.name,
            "description": location.description,
        });
        if let Some(parent_id) = &location.parent_id {
            body["parentId"] = Value::String(parent_id.clone());
        }

        let created = match self.send_create("/locations", &body).await {
            Ok(created) => created,
            Err(e) => return Ok(failure("create location", e)),
        };

        let mut parsed = match parse_location(&created) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Created location response has no usable id");
                return Ok(missing_id("location"));
            }
        };
        if parsed.name.is_empty() {
            parsed.name = location.name.clone();
        }
        if parsed.parent_id.is_none() {
            parsed.parent_id = location.parent_id.clone();
        }

        let id = parsed.id.clone();
        self.patch_cache(move |cache| {
            cache.upsert_location(parsed);
            true
        })
        .await;
        self.request_refresh();
        info!(location_id = %id, name = %location.name, "Created location");
        Ok(MutationOutcome::Success(id))
    }

    /// Renames a cached location and updates its description.
    pub async fn update_location(
        &self,
        location_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<MutationOutcome, ValidationError> {
        validate_id("location_id", location_id)?;
        validate_name("name", name)?;
        if let Some(description) = description {
            validate_description(description)?;
        }
        if self.snapshot().await.location(location_id).is_none() {
            return Err(ValidationError::not_found("location", location_id));
        }

        let body = json!({
            "id": location_id,
            "name": name,
            "description": description.unwrap_or_default(),
        });
        let path = format!("/locations/{}", location_id);
        match self.send_write(Method::PUT, &path, &body).await {
            Ok(_) => {
                self.patch_cache(|cache| cache.rename_location(location_id, name, description))
                    .await;
                self.request_refresh();
                info!(location_id, name, "Updated location");
                Ok(MutationOutcome::Success(location_id.to_string()))
            }
            Err(e) => Ok(failure("update location", e)),
        }
    }

    /// Sets a text custom field on an item, updating the existing field
    /// when the item already carries one with this name.
    pub async fn set_item_field(
        &self,
        item_id: &str,
        field_name: &str,
        value: &str,
    ) -> Result<MutationOutcome, ValidationError> {
        validate_id("item_id", item_id)?;
        validate_name("field_name", field_name)?;
        let has_field = self.require_item(item_id).await?.fields.contains_key(field_name);

        let body = json!({
            "name": field_name,
            "type": TEXT_FIELD_TYPE,
            "value": value,
        });

        let existing_id = if has_field {
            match self.inner.api.fetch_item_fields(item_id).await {
                Ok(fields) => field_id_by_name(fields, field_name),
                Err(e) if e.is_auth_error() => return Ok(failure("read item fields", e)),
                Err(e) => {
                    debug!(item_id, error = %e, "Could not list item fields, creating instead");
                    None
                }
            }
        } else {
            None
        };

        let result = match &existing_id {
            Some(field_id) => {
                let path = format!("/items/{}/fields/{}", item_id, field_id);
                self.send_write(Method::PUT, &path, &body).await
            }
            None => {
                if has_field {
                    debug!(item_id, field_name, "Field id not found, creating new field");
                }
                let path = format!("/items/{}/fields", item_id);
                self.send_write(Method::POST, &path, &body).await
            }
        };

        match result {
            Ok(_) => {
                let value = Value::String(value.to_string());
                self.patch_cache(|cache| cache.set_item_field(item_id, field_name, value))
                    .await;
                self.request_refresh();
                info!(item_id, field_name, updated = existing_id.is_some(), "Set item field");
                Ok(MutationOutcome::Success(item_id.to_string()))
            }
            Err(e) => Ok(failure("set item field", e)),
        }
    }

    /// Creates every named location that the cache does not already know
    /// (names compare case-insensitively).
    pub async fn ensure_locations<I, S>(&self, names: I) -> LocationSyncReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = LocationSyncReport::default();

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if self.snapshot().await.find_location_by_name(name).is_some() {
                report.existing.push(name.to_string());
                continue;
            }

            match self.create_location(&NewLocation::new(name)).await {
                Ok(MutationOutcome::Success(id)) => report.created.push((name.to_string(), id)),
                Ok(MutationOutcome::Failure(message)) => report.failed.push((name.to_string(), message)),
                Err(e) => report.failed.push((name.to_string(), e.to_string())),
            }
        }

        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            failed = report.failed.len(),
            "Location sync finished"
        );
        report
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_item(&self, item_id: &str) -> Result<homebox_core::Item, ValidationError> {
        self.snapshot()
            .await
            .item(item_id)
            .cloned()
            .ok_or_else(|| ValidationError::not_found("item", item_id))
    }

    /// Sends a write and requires a 2xx status. The body is left unparsed;
    /// Homebox does not always answer updates with JSON.
    async fn send_write(&self, method: Method, path: &str, body: &Value) -> SyncResult<ApiResponse> {
        self.ensure_active()?;
        self.inner
            .api
            .execute(method, path, Some(body))
            .await?
            .expect_success()
    }

    /// POSTs a new entity and returns the created record.
    async fn send_create(&self, path: &str, body: &Value) -> SyncResult<Value> {
        self.send_write(Method::POST, path, body).await?.json()
    }

    /// Applies a patch to a private copy of the snapshot and swaps it in.
    async fn patch_cache<F>(&self, patch: F) -> bool
    where
        F: FnOnce(&mut CacheSnapshot) -> bool,
    {
        let mut cache = self.inner.cache.write().await;
        let mut next = CacheSnapshot::clone(&cache);
        let applied = patch(&mut next);
        if applied {
            *cache = Arc::new(next);
        }
        applied
    }
}

fn failure(action: &str, e: SyncError) -> MutationOutcome {
    warn!(action, error = %e, "Mutation failed");
    MutationOutcome::Failure(e.user_message())
}

fn missing_id(entity: &str) -> MutationOutcome {
    MutationOutcome::Failure(format!("Homebox did not return an id for the new {}", entity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::auth::Credentials;
    use crate::coordinator::{NoOpListener, SyncTimings};
    use httpmock::prelude::*;
    use std::time::Duration;

    async fn seeded(server: &MockServer) -> HomeboxCoordinator {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/locations");
                then.status(200).json_body(json!([
                    {"id": "loc-1", "name": "Garage"},
                    {"id": "loc-2", "name": "Attic"}
                ]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/items");
                then.status(200).json_body(json!([
                    {"id": "item-1", "name": "Drill", "locationId": "loc-1",
                     "fields": {"Coffee": "dark"}},
                    {"id": "item-2", "name": "Saw", "locationId": "loc-1"}
                ]));
            })
            .await;

        let api = ApiClient::with_credentials(
            server.url("/api/v1"),
            Credentials::Token("t".into()),
            Duration::from_secs(10),
        )
        .unwrap();
        let timings = SyncTimings {
            update_interval: Duration::from_secs(1800),
            cycle_timeout: Duration::from_secs(5),
            token_refresh_interval: Duration::from_secs(3600),
        };
        let coordinator = HomeboxCoordinator::from_parts(api, timings, Arc::new(NoOpListener));
        coordinator.refresh().await.unwrap();
        coordinator
    }

    #[test]
    fn test_new_item_body() {
        let mut item = NewItem::new("Lamp");
        item.location_id = Some("loc-1".into());
        item.quantity = Some(2);

        let body = serde_json::to_value(&item).unwrap();
        assert_eq!(body["name"], "Lamp");
        assert_eq!(body["locationId"], "loc-1");
        assert_eq!(body["quantity"], 2);
        assert!(body.get("assetId").is_none());
        assert!(body.get("labelIds").is_none());
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = MutationOutcome::Success("item-1".into());
        assert!(ok.is_success());
        assert_eq!(ok.detail(), "item-1");
        assert!(!MutationOutcome::Failure("nope".into()).is_success());
    }

    #[tokio::test]
    async fn test_move_unknown_item_sends_nothing() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path_contains("/api/v1/items/");
                then.status(200).json_body(json!({}));
            })
            .await;

        let err = coordinator.move_item("item-404", "loc-2").await.unwrap_err();
        assert!(matches!(err, ValidationError::NotFound { .. }));
        put.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_move_item_patches_cache() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v1/items/item-1")
                    .header("authorization", "Bearer t")
                    .json_body(json!({"locationId": "loc-2"}));
                then.status(200).json_body(json!({"id": "item-1"}));
            })
            .await;

        let before = coordinator.snapshot().await;
        let outcome = coordinator.move_item("item-1", "loc-2").await.unwrap();
        let after = coordinator.snapshot().await;
        assert_eq!(outcome, MutationOutcome::Success("item-1".into()));
        assert_eq!(after.item("item-1").unwrap().location_id.as_deref(), Some("loc-2"));
        assert_eq!(before.item("item-1").unwrap().location_id.as_deref(), Some("loc-1"));
        put.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_remote_rejection_is_failure() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v1/items/item-1");
                then.status(422).body("invalid location");
            })
            .await;

        let outcome = coordinator.move_item("item-1", "loc-9").await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("422"));
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.item("item-1").unwrap().location_id.as_deref(), Some("loc-1"));
    }

    #[tokio::test]
    async fn test_create_item_returns_id() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let post = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/items")
                    .json_body(json!({"name": "Lamp", "description": "", "locationId": "loc-2"}));
                then.status(201).json_body(json!({"id": "item-9", "name": "Lamp"}));
            })
            .await;

        let mut item = NewItem::new("Lamp");
        item.location_id = Some("loc-2".into());
        let outcome = coordinator.create_item(&item).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Success("item-9".into()));
        post.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_create_item_rejects_negative_quantity() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;

        let mut item = NewItem::new("Lamp");
        item.quantity = Some(-1);
        let err = coordinator.create_item(&item).await.unwrap_err();
        assert!(matches!(err, ValidationError::Negative { .. }));
    }

    #[tokio::test]
    async fn test_create_location_lands_in_cache() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/locations");
                then.status(200).json_body(json!({"id": "loc-3"}));
            })
            .await;

        let outcome = coordinator.create_location(&NewLocation::new("Basement")).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Success("loc-3".into()));

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.location("loc-3").unwrap().name, "Basement");
    }

    #[tokio::test]
    async fn test_create_location_without_id_fails() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/locations");
                then.status(200).json_body(json!({"name": "Basement"}));
            })
            .await;

        let outcome = coordinator.create_location(&NewLocation::new("Basement")).await.unwrap();
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_update_location_requires_cached_location() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;

        let err = coordinator.update_location("loc-404", "Shed", None).await.unwrap_err();
        assert!(matches!(err, ValidationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_location_renames() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v1/locations/loc-2");
                then.status(200).json_body(json!({"id": "loc-2", "name": "Loft"}));
            })
            .await;

        let outcome = coordinator.update_location("loc-2", "Loft", Some("upstairs")).await.unwrap();
        assert!(outcome.is_success());
        let snapshot = coordinator.snapshot().await;
        let location = snapshot.location("loc-2").unwrap();
        assert_eq!(location.name, "Loft");
        assert_eq!(location.description.as_deref(), Some("upstairs"));
    }

    #[tokio::test]
    async fn test_set_existing_field_updates_by_id() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/items/item-1/fields");
                then.status(200)
                    .json_body(json!({"fields": [{"id": "f-7", "name": "Coffee", "textValue": "dark"}]}));
            })
            .await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v1/items/item-1/fields/f-7")
                    .json_body(json!({"name": "Coffee", "type": "text", "value": "light"}));
                then.status(200).json_body(json!({"id": "f-7"}));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/items/item-1/fields");
                then.status(201).json_body(json!({"id": "f-8"}));
            })
            .await;

        let outcome = coordinator.set_item_field("item-1", "Coffee", "light").await.unwrap();
        let snapshot = coordinator.snapshot().await;
        assert!(outcome.is_success());
        assert_eq!(snapshot.item("item-1").unwrap().field_text("Coffee").as_deref(), Some("light"));
        update.assert_hits_async(1).await;
        create.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_set_new_field_creates() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/items/item-2/fields")
                    .json_body(json!({"name": "Coffee", "type": "text", "value": "medium"}));
                then.status(201).json_body(json!({"id": "f-8"}));
            })
            .await;

        let outcome = coordinator.set_item_field("item-2", "Coffee", "medium").await.unwrap();
        assert!(outcome.is_success());
        create.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_ensure_locations_skips_existing() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let post = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/locations")
                    .json_body(json!({"name": "Kitchen", "description": ""}));
                then.status(201).json_body(json!({"id": "loc-3", "name": "Kitchen"}));
            })
            .await;

        let report = coordinator.ensure_locations(["garage", "Kitchen", "  "]).await;
        assert_eq!(report.existing, vec!["garage".to_string()]);
        assert_eq!(report.created, vec![("Kitchen".to_string(), "loc-3".to_string())]);
        assert!(report.failed.is_empty());
        post.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_move_accepts_plain_text_reply() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v1/items/item-1");
                then.status(200).body("OK");
            })
            .await;

        let outcome = coordinator.move_item("item-1", "loc-2").await.unwrap();
        let snapshot = coordinator.snapshot().await;
        assert_eq!(outcome, MutationOutcome::Success("item-1".into()));
        assert_eq!(snapshot.item("item-1").unwrap().location_id.as_deref(), Some("loc-2"));
    }

    #[tokio::test]
    async fn test_create_location_requires_json_reply() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/locations");
                then.status(201).body("Created");
            })
            .await;

        let outcome = coordinator.create_location(&NewLocation::new("Basement")).await.unwrap();
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_move_retries_once_after_refresh() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v1/items/item-1")
                    .header("authorization", "Bearer t");
                then.status(401).body("token expired");
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/users/refresh")
                    .header("authorization", "Bearer t");
                then.status(200).json_body(json!({"token": "t2"}));
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v1/items/item-1")
                    .header("authorization", "Bearer t2");
                then.status(200).json_body(json!({"id": "item-1"}));
            })
            .await;

        let outcome = coordinator.move_item("item-1", "loc-2").await.unwrap();
        assert!(outcome.is_success());
        rejected.assert_hits_async(1).await;
        refresh.assert_hits_async(1).await;
        accepted.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_create_item_schedules_reconciliation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/locations");
                then.status(200).json_body(json!([{"id": "loc-1", "name": "Garage"}]));
            })
            .await;
        let items = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/items");
                then.status(200).json_body(json!([{"id": "item-1"}]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/items");
                then.status(201).json_body(json!({"id": "item-9"}));
            })
            .await;

        let api = ApiClient::with_credentials(
            server.url("/api/v1"),
            Credentials::Token("t".into()),
            Duration::from_secs(10),
        )
        .unwrap();
        let timings = SyncTimings {
            update_interval: Duration::from_secs(1800),
            cycle_timeout: Duration::from_secs(5),
            token_refresh_interval: Duration::from_secs(3600),
        };
        let coordinator = HomeboxCoordinator::from_parts(api, timings, Arc::new(NoOpListener));
        coordinator.refresh().await.unwrap();

        let outcome = coordinator.create_item(&NewItem::new("Lamp")).await.unwrap();
        assert!(outcome.is_success());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while items.hits_async().await < 2 {
            assert!(tokio::time::Instant::now() < deadline, "follow-up reconciliation never ran");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_writes_fail_after_shutdown() {
        let server = MockServer::start_async().await;
        let coordinator = seeded(&server).await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v1/items/item-1");
                then.status(200);
            })
            .await;

        coordinator.shutdown().await;
        let outcome = coordinator.move_item("item-1", "loc-2").await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("shutting down"));
        put.assert_hits_async(0).await;
    }
}
