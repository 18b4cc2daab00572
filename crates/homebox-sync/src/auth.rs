//! # Token Store and Refresh Protocol
//!
//! Holds the bearer token and renews it when the server rejects it.
//!
//! ## Refresh Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Token Refresh State Machine                        │
//! │                                                                         │
//! │   401 on request (token generation g)                                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   acquire refresh lock ── generation moved past g? ──► Concurrent ✔    │
//! │        │                   (another request already refreshed)         │
//! │        ▼                                                                │
//! │   ATTEMPT_REFRESH_ENDPOINT                                             │
//! │     GET /users/refresh  ── 200 + token ──────────────► Endpoint ✔      │
//! │        │                                                                │
//! │        ▼ (no usable token)                                              │
//! │   ATTEMPT_RELOGIN (only with username + password)                      │
//! │     POST /users/login   ── 200 + token ──────────────► Login ✔         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   DONE(failure)                                                        │
//! │     static token, rejected  → TokenExpired  (user must act)            │
//! │     otherwise               → RefreshFailed (scheduler retries)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Token Storage
//! Tokens live in memory only, sanitized so they never carry a `Bearer `
//! prefix. Every adopted token bumps a generation counter, which is how a
//! request that saw a 401 tells whether someone else already fixed it.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use homebox_core::credential::{bearer_header, redact, sanitize_token};
use homebox_core::wire::token_of;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Credentials
// =============================================================================

/// The credential source handed to the sync layer at startup.
#[derive(Clone, PartialEq)]
pub enum Credentials {
    /// A static API token. Renewable only through the refresh endpoint.
    Token(String),

    /// Login credentials, with an optional token from a previous session.
    Login {
        username: String,
        password: String,
        token: Option<String>,
    },
}

impl Credentials {
    /// The token to start with, if any.
    pub fn initial_token(&self) -> Option<&str> {
        match self {
            Credentials::Token(token) => Some(token),
            Credentials::Login { token, .. } => token.as_deref(),
        }
    }

    /// True when a fresh token can be obtained by logging in.
    pub fn can_login(&self) -> bool {
        matches!(self, Credentials::Login { username, password, .. }
            if !username.is_empty() && !password.is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(token) => f.debug_tuple("Token").field(&redact(token)).finish(),
            Credentials::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"***")
                .finish_non_exhaustive(),
        }
    }
}

// =============================================================================
// Token Store
// =============================================================================

#[derive(Debug, Default)]
struct TokenState {
    token: String,
    generation: u64,
}

/// The current bearer token plus a counter of how often it changed.
#[derive(Debug, Default)]
pub struct TokenStore {
    state: RwLock<TokenState>,
}

impl TokenStore {
    /// Creates a store holding the sanitized form of `raw`.
    pub fn new(raw: Option<&str>) -> Self {
        TokenStore {
            state: RwLock::new(TokenState {
                token: sanitize_token(raw),
                generation: 0,
            }),
        }
    }

    /// The current token, without scheme prefix.
    pub async fn get(&self) -> String {
        self.state.read().await.token.clone()
    }

    /// The current token and its generation, read together.
    pub async fn snapshot(&self) -> (String, u64) {
        let state = self.state.read().await;
        (state.token.clone(), state.generation)
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Replaces the token with the sanitized form of `raw` and returns the
    /// new generation.
    pub async fn set(&self, raw: &str) -> u64 {
        let mut state = self.state.write().await;
        state.token = sanitize_token(Some(raw));
        state.generation += 1;
        state.generation
    }
}

// =============================================================================
// Refresh Outcome
// =============================================================================

/// Where a renewed token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    /// `GET /users/refresh` returned a token.
    Endpoint,

    /// `POST /users/login` returned a token.
    Login,

    /// Another caller refreshed while this one waited.
    Concurrent,
}

/// A failed attempt, remembered so callers that waited on it share it.
#[derive(Debug, Clone)]
enum RefreshFailure {
    Expired,
    Transient(String),
}

impl From<RefreshFailure> for SyncError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Expired => SyncError::TokenExpired,
            RefreshFailure::Transient(reason) => SyncError::RefreshFailed(reason),
        }
    }
}

/// Why one step of the protocol did not yield a token.
enum StepError {
    /// The server answered but gave no usable token.
    Rejected(String),
    /// The server could not be reached.
    Unreachable(String),
}

impl StepError {
    fn reason(&self) -> &str {
        match self {
            StepError::Rejected(r) | StepError::Unreachable(r) => r,
        }
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Runs the refresh protocol against the token store.
///
/// Only one refresh runs at a time. Callers that hit a 401 while a refresh
/// is in flight wait for it and reuse its result.
pub struct Authenticator {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    store: TokenStore,
    refresh_lock: Mutex<Option<RefreshFailure>>,
    completed_attempts: AtomicU64,
    last_refresh_at: RwLock<Option<DateTime<Utc>>>,
}

impl Authenticator {
    /// Creates an authenticator for the API rooted at `base_url`
    /// (e.g. `https://homebox.lan/api/v1`).
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, credentials: Credentials) -> Self {
        let store = TokenStore::new(credentials.initial_token());
        Authenticator {
            http,
            base_url: base_url.into(),
            credentials,
            store,
            refresh_lock: Mutex::new(None),
            completed_attempts: AtomicU64::new(0),
            last_refresh_at: RwLock::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// When a token was last adopted from the server.
    pub async fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh_at.read().await
    }

    /// Logs in first if there is no token yet but login credentials exist.
    pub async fn ensure_token(&self) -> SyncResult<()> {
        if !self.store.get().await.is_empty() || !self.credentials.can_login() {
            return Ok(());
        }

        let mut last_failure = self.refresh_lock.lock().await;
        if !self.store.get().await.is_empty() {
            return Ok(());
        }

        info!("No token yet, logging in");
        match self.login().await {
            Ok(token) => {
                *last_failure = None;
                self.adopt(&token).await;
                Ok(())
            }
            Err(step) => Err(SyncError::RefreshFailed(format!(
                "initial login failed: {}",
                step.reason()
            ))),
        }
    }

    /// Renews the token after a request carrying `rejected_generation` got
    /// a 401.
    pub async fn refresh_after_rejection(&self, rejected_generation: u64) -> SyncResult<RefreshSource> {
        let completed_before = self.completed_attempts.load(Ordering::SeqCst);
        let mut last_failure = self.refresh_lock.lock().await;

        if self.store.generation().await != rejected_generation {
            debug!("Token already renewed by a concurrent request");
            return Ok(RefreshSource::Concurrent);
        }

        if self.completed_attempts.load(Ordering::SeqCst) != completed_before {
            if let Some(failure) = last_failure.clone() {
                debug!("Reusing result of the refresh that just failed");
                return Err(failure.into());
            }
        }

        self.run_protocol(&mut last_failure).await
    }

    /// Renews the token unconditionally.
    pub async fn refresh_now(&self) -> SyncResult<RefreshSource> {
        let mut last_failure = self.refresh_lock.lock().await;
        self.run_protocol(&mut last_failure).await
    }

    /// Runs one attempt and records its outcome for waiting callers.
    async fn run_protocol(&self, last_failure: &mut Option<RefreshFailure>) -> SyncResult<RefreshSource> {
        let outcome = self.attempt().await;
        *last_failure = outcome.as_ref().err().cloned();
        self.completed_attempts.fetch_add(1, Ordering::SeqCst);
        outcome.map_err(SyncError::from)
    }

    /// The refresh endpoint first, then login when possible.
    async fn attempt(&self) -> Result<RefreshSource, RefreshFailure> {
        let current = self.store.get().await;
        debug!(token = %redact(&current), "Attempting token refresh");

        let endpoint_error = if current.is_empty() {
            StepError::Rejected("no token to refresh".to_string())
        } else {
            match self.call_refresh_endpoint(&current).await {
                Ok(token) => {
                    let generation = self.adopt(&token).await;
                    info!(generation, "Token refreshed via refresh endpoint");
                    return Ok(RefreshSource::Endpoint);
                }
                Err(e) => {
                    warn!(reason = %e.reason(), "Refresh endpoint did not return a token");
                    e
                }
            }
        };

        if self.credentials.can_login() {
            return match self.login().await {
                Ok(token) => {
                    let generation = self.adopt(&token).await;
                    info!(generation, "Token renewed via login");
                    Ok(RefreshSource::Login)
                }
                Err(e) => {
                    warn!(reason = %e.reason(), "Login did not return a token");
                    Err(RefreshFailure::Transient(format!(
                        "refresh endpoint: {}; login: {}",
                        endpoint_error.reason(),
                        e.reason()
                    )))
                }
            };
        }

        match endpoint_error {
            StepError::Rejected(reason) => {
                warn!(%reason, "Static token rejected and cannot be renewed by login");
                Err(RefreshFailure::Expired)
            }
            StepError::Unreachable(reason) => Err(RefreshFailure::Transient(reason)),
        }
    }

    async fn adopt(&self, raw: &str) -> u64 {
        let generation = self.store.set(raw).await;
        *self.last_refresh_at.write().await = Some(Utc::now());
        let shown = redact(&self.store.get().await);
        debug!(token = %shown, generation, "Adopted new token");
        generation
    }

    async fn call_refresh_endpoint(&self, token: &str) -> Result<String, StepError> {
        let url = format!("{}/users/refresh", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, bearer_header(token))
            .send()
            .await
            .map_err(|e| StepError::Unreachable(e.to_string()))?;
        Self::token_from(response).await
    }

    async fn login(&self) -> Result<String, StepError> {
        let Credentials::Login { username, password, .. } = &self.credentials else {
            return Err(StepError::Rejected("no login credentials configured".to_string()));
        };

        let url = format!("{}/users/login", self.base_url);
        debug!(%username, "Logging in to obtain a new token");
        let response = self
            .http
            .post(&url)
            .json(&json!({ "email": username, "password": password }))
            .send()
            .await
            .map_err(|e| StepError::Unreachable(e.to_string()))?;
        Self::token_from(response).await
    }

    async fn token_from(response: reqwest::Response) -> Result<String, StepError> {
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let reason = format!("HTTP {}: {}", status.as_u16(), body);
            // A server-side error says nothing about the token itself.
            return Err(if status.is_server_error() {
                StepError::Unreachable(reason)
            } else {
                StepError::Rejected(reason)
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StepError::Rejected(format!("unparseable body: {}", e)))?;
        token_of(&body).ok_or_else(|| StepError::Rejected("response has no token field".to_string()))
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn authenticator(server: &MockServer, credentials: Credentials) -> Authenticator {
        Authenticator::new(reqwest::Client::new(), server.url("/api/v1"), credentials)
    }

    fn login_credentials(token: Option<&str>) -> Credentials {
        Credentials::Login {
            username: "me@example.com".into(),
            password: "pw".into(),
            token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_token_store_sanitizes_and_counts() {
        let store = TokenStore::new(Some("Bearer abc"));
        assert_eq!(store.snapshot().await, ("abc".to_string(), 0));

        let generation = store.set("Bearer Bearer def").await;
        assert_eq!(generation, 1);
        assert_eq!(store.get().await, "def");
    }

    #[tokio::test]
    async fn test_refresh_endpoint_success() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/users/refresh")
                    .header("authorization", "Bearer old-token");
                then.status(200).json_body(serde_json::json!({"token": "Bearer new-token"}));
            })
            .await;

        let auth = authenticator(&server, Credentials::Token("old-token".into()));
        let source = auth.refresh_now().await.unwrap();

        assert_eq!(source, RefreshSource::Endpoint);
        assert_eq!(auth.token_store().get().await, "new-token");
        assert!(auth.last_refresh_at().await.is_some());
        refresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_falls_back_to_login() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/refresh");
                then.status(401).body("expired");
            })
            .await;
        let login = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/users/login")
                    .json_body(serde_json::json!({"email": "me@example.com", "password": "pw"}));
                then.status(200).json_body(serde_json::json!({"token": "fresh"}));
            })
            .await;

        let auth = authenticator(&server, login_credentials(Some("stale")));
        assert_eq!(auth.refresh_now().await.unwrap(), RefreshSource::Login);
        assert_eq!(auth.token_store().get().await, "fresh");
        login.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_static_token_rejected_is_expired() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/refresh");
                then.status(401);
            })
            .await;

        let auth = authenticator(&server, Credentials::Token("old".into()));
        let err = auth.refresh_now().await.unwrap_err();
        assert!(matches!(err, SyncError::TokenExpired));
        assert_eq!(auth.token_store().get().await, "old");
    }

    #[tokio::test]
    async fn test_static_token_server_error_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/refresh");
                then.status(503).body("maintenance");
            })
            .await;

        let auth = authenticator(&server, Credentials::Token("old".into()));
        let err = auth.refresh_now().await.unwrap_err();
        assert!(matches!(err, SyncError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_login_failure_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/refresh");
                then.status(200).json_body(serde_json::json!({"message": "no token here"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/users/login");
                then.status(500);
            })
            .await;

        let auth = authenticator(&server, login_credentials(Some("old")));
        let err = auth.refresh_now().await.unwrap_err();
        assert!(matches!(err, SyncError::RefreshFailed(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_concurrent_rejections_refresh_once() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/refresh");
                then.status(200)
                    .delay(Duration::from_millis(200))
                    .json_body(serde_json::json!({"token": "new"}));
            })
            .await;

        let auth = authenticator(&server, Credentials::Token("old".into()));
        let (first, second) = tokio::join!(
            auth.refresh_after_rejection(0),
            auth.refresh_after_rejection(0)
        );

        let mut sources = vec![first.unwrap(), second.unwrap()];
        sources.sort_by_key(|s| *s == RefreshSource::Concurrent);
        assert_eq!(sources, vec![RefreshSource::Endpoint, RefreshSource::Concurrent]);
        refresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_concurrent_rejections_share_failure() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/refresh");
                then.status(401).delay(Duration::from_millis(200));
            })
            .await;

        let auth = authenticator(&server, Credentials::Token("old".into()));
        let (first, second) = tokio::join!(
            auth.refresh_after_rejection(0),
            auth.refresh_after_rejection(0)
        );

        assert!(matches!(first, Err(SyncError::TokenExpired)));
        assert!(matches!(second, Err(SyncError::TokenExpired)));
        refresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_ensure_token_logs_in_once() {
        let server = MockServer::start_async().await;
        let login = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/users/login");
                then.status(200).json_body(serde_json::json!({"token": "first"}));
            })
            .await;

        let auth = authenticator(&server, login_credentials(None));
        auth.ensure_token().await.unwrap();
        auth.ensure_token().await.unwrap();

        assert_eq!(auth.token_store().get().await, "first");
        login.assert_hits_async(1).await;
    }
}
