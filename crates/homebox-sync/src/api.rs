//! # Homebox REST Client
//!
//! Authenticated requests against `/api/v1` with the refresh-and-retry-once
//! rule applied to every call.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ApiClient::execute                              │
//! │                                                                         │
//! │  snapshot token (t, generation g)                                      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  send with "Authorization: Bearer t"                                   │
//! │        │                                                                │
//! │        ├── transport failure ──────────────► SyncError::Transport      │
//! │        ├── status != 401 ──────────────────► ApiResponse               │
//! │        ▼                                                                │
//! │  401 → Authenticator::refresh_after_rejection(g)                       │
//! │        ├── refresh failed ─────────────────► TokenExpired/RefreshFailed│
//! │        ▼                                                                │
//! │  resend ONCE with the new token                                        │
//! │        ├── 401 again ──────────────────────► SyncError::AuthRejected   │
//! │        └── anything else ──────────────────► ApiResponse               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use homebox_core::credential::{bearer_header, redact};
use homebox_core::wire::{describe_shape, normalize_collection};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{Authenticator, Credentials};
use crate::config::HomeboxConfig;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Response
// =============================================================================

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: String,
}

impl ApiResponse {
    /// Requires exactly `200 OK`.
    pub fn expect_ok(self) -> SyncResult<Self> {
        if self.status == StatusCode::OK {
            Ok(self)
        } else {
            Err(self.into_status_error())
        }
    }

    /// Requires any 2xx status.
    pub fn expect_success(self) -> SyncResult<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(self.into_status_error())
        }
    }

    /// Parses the body as JSON. An empty body reads as `null`.
    pub fn json(&self) -> SyncResult<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body).map_err(|e| SyncError::MalformedResponse {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    fn into_status_error(self) -> SyncError {
        SyncError::HttpStatus {
            status: self.status.as_u16(),
            body: self.body,
            url: self.url,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Cheaply cloneable REST client sharing one connection pool and one token.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    auth: Arc<Authenticator>,
}

impl ApiClient {
    /// Creates a client from a validated configuration.
    pub fn new(config: &HomeboxConfig) -> SyncResult<Self> {
        Self::with_credentials(
            config.api_base_url()?,
            config.credentials(),
            config.request_timeout(),
        )
    }

    /// Creates a client for an explicit API base URL.
    pub fn with_credentials(
        base_url: impl Into<String>,
        credentials: Credentials,
        request_timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {}", e)))?;
        let base_url: String = base_url.into().trim_end_matches('/').to_string();
        let auth = Arc::new(Authenticator::new(http.clone(), base_url.clone(), credentials));

        Ok(ApiClient {
            http,
            base_url: base_url.into(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    // =========================================================================
    // Request Execution
    // =========================================================================

    /// Sends an authenticated request, refreshing and retrying once on 401.
    ///
    /// Any status other than 401 is returned as-is for the caller to judge.
    pub async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> SyncResult<ApiResponse> {
        self.auth.ensure_token().await?;

        let url = format!("{}{}", self.base_url, path);
        let (token, generation) = self.auth.token_store().snapshot().await;
        debug!(%method, %url, token = %redact(&token), "Sending request");

        let response = self.send(method.clone(), &url, body, &token).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(%url, body = %response.body, "Request rejected with 401, refreshing token");
        self.auth.refresh_after_rejection(generation).await?;

        let token = self.auth.token_store().get().await;
        let retry = self.send(method, &url, body, &token).await?;
        if retry.status == StatusCode::UNAUTHORIZED {
            warn!(%url, "Request still rejected after token refresh");
            return Err(SyncError::AuthRejected { url });
        }
        Ok(retry)
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Value>, token: &str) -> SyncResult<ApiResponse> {
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, bearer_header(token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let transport = |source| SyncError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        Ok(ApiResponse {
            status,
            url: url.to_string(),
            body,
        })
    }

    /// GET that must answer `200` with JSON.
    pub async fn get_json(&self, path: &str) -> SyncResult<Value> {
        self.execute(Method::GET, path, None).await?.expect_ok()?.json()
    }

    // =========================================================================
    // Collection Fetches
    // =========================================================================

    /// `GET /locations`, normalized to a plain record list.
    pub async fn fetch_locations(&self) -> SyncResult<Vec<Value>> {
        self.fetch_collection("/locations", "locations").await
    }

    /// `GET /items`, normalized to a plain record list.
    pub async fn fetch_items(&self) -> SyncResult<Vec<Value>> {
        self.fetch_collection("/items", "items").await
    }

    async fn fetch_collection(&self, path: &str, key: &str) -> SyncResult<Vec<Value>> {
        let body = self.get_json(path).await?;
        let shape = describe_shape(&body);
        match normalize_collection(body, key) {
            Some(records) => {
                debug!(path, count = records.len(), "Fetched collection");
                Ok(records)
            }
            None => {
                warn!(
                    path,
                    %shape,
                    "Unexpected response shape, expected a list or {{{}: [...]}}; treating as empty",
                    key
                );
                Ok(Vec::new())
            }
        }
    }

    /// `GET /items/{id}/fields`.
    pub async fn fetch_item_fields(&self, item_id: &str) -> SyncResult<Value> {
        self.get_json(&format!("/items/{}/fields", item_id)).await
    }

    /// `GET /users/me`.
    pub async fn whoami(&self) -> SyncResult<Value> {
        self.get_json("/users/me").await
    }

    /// Checks that the items endpoint is reachable with the current
    /// credentials and names the connection after the logged-in user.
    pub async fn verify_connection(&self) -> SyncResult<ConnectionInfo> {
        self.execute(Method::GET, "/items", None).await?.expect_ok()?;

        let email = match self.whoami().await {
            Ok(user) => user.get("email").and_then(Value::as_str).map(str::to_string),
            Err(e) => {
                debug!(error = %e, "User endpoint unavailable, using generic title");
                None
            }
        };
        Ok(ConnectionInfo::new(email))
    }
}

/// Result of a successful connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Display title, `Homebox (<email>)` when the user is known.
    pub title: String,
    pub email: Option<String>,
}

impl ConnectionInfo {
    fn new(email: Option<String>) -> Self {
        let title = match &email {
            Some(email) => format!("Homebox ({})", email),
            None => "Homebox".to_string(),
        };
        ConnectionInfo { title, email }
    }
}
