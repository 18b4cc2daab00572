//! # Homebox Coordinator
//!
//! Owns the cache snapshot and runs reconciliation cycles against the
//! server. Mutation operations (see [`crate::mutations`]) live on the same
//! type.
//!
//! ## Coordinator Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      HomeboxCoordinator                                 │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  cache: RwLock<Arc<CacheSnapshot>>   (swapped whole, never merged)│  │
//! │  │  status: RwLock<CoordinatorStatus>                               │  │
//! │  │  cycle_lock: one reconciliation at a time                        │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  refresh()                                                             │
//! │    cycle already running? ──► Skipped                                  │
//! │    spawn fetch task ──► timeout(cycle_timeout)                         │
//! │       GET /locations ─► GET /items ─► SnapshotBuilder                  │
//! │    timed out / failed ──► keep old snapshot, status.last_error,        │
//! │                           listener.on_update_failed                    │
//! │    ok ──► diff old vs new ─► swap ─► listener.on_items_added/removed   │
//! │                                                                         │
//! │  request_refresh()  (after mutations)                                  │
//! │    sets a flag; whoever holds or next takes the cycle lock runs        │
//! │    exactly one follow-up cycle for all requests made meanwhile         │
//! │                                                                         │
//! │  start() ──► first refresh ──► spawn poller + token refresher          │
//! │  shutdown() ──► stop both tasks                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use homebox_core::{CacheSnapshot, ItemDiff, SnapshotBuilder};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::auth::RefreshSource;
use crate::config::HomeboxConfig;
use crate::error::{SyncError, SyncResult};
use crate::scheduler::{spawn_periodic, PeriodicTaskHandle};

// =============================================================================
// Coordinator Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStatus {
    /// Whether the most recent cycle succeeded.
    pub last_update_success: bool,

    /// When a cycle last succeeded.
    pub last_updated_at: Option<DateTime<Utc>>,

    /// Message of the most recent cycle failure, cleared on success.
    pub last_error: Option<String>,

    /// Failed cycles since the last success.
    pub consecutive_failures: u32,

    pub item_count: usize,
    pub location_count: usize,

    /// When a token was last obtained from the server.
    pub last_token_refresh_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Inventory Listener
// =============================================================================

/// Receives entity-lifecycle notifications after each cycle.
///
/// Called from the coordinator's task; implementations should hand work off
/// rather than block.
pub trait InventoryListener: Send + Sync {
    /// Items that appeared since the previous snapshot.
    fn on_items_added(&self, ids: &[String]);

    /// Items that disappeared since the previous snapshot.
    fn on_items_removed(&self, ids: &[String]);

    /// A cycle failed; the previous snapshot is still in place.
    fn on_update_failed(&self, _error: &SyncError) {}
}

/// No-op listener for testing.
pub struct NoOpListener;

impl InventoryListener for NoOpListener {
    fn on_items_added(&self, _ids: &[String]) {}
    fn on_items_removed(&self, _ids: &[String]) {}
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a call to [`HomeboxCoordinator::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new snapshot was swapped in.
    Applied(ItemDiff),

    /// Another cycle was already running.
    Skipped,
}

/// Result of a manual token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRefreshReport {
    pub success: bool,
    pub source: Option<RefreshSource>,
    /// Message suitable for showing to the user.
    pub message: String,
}

/// Intervals the coordinator schedules with.
#[derive(Debug, Clone, Copy)]
pub struct SyncTimings {
    pub update_interval: Duration,
    pub cycle_timeout: Duration,
    pub token_refresh_interval: Duration,
}

impl From<&HomeboxConfig> for SyncTimings {
    fn from(config: &HomeboxConfig) -> Self {
        SyncTimings {
            update_interval: config.update_interval(),
            cycle_timeout: config.cycle_timeout(),
            token_refresh_interval: config.token_refresh_interval(),
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

pub(crate) struct CoordinatorInner {
    pub(crate) api: ApiClient,
    pub(crate) cache: RwLock<Arc<CacheSnapshot>>,
    timings: SyncTimings,
    status: RwLock<CoordinatorStatus>,
    listener: Arc<dyn InventoryListener>,
    cycle_lock: Mutex<()>,
    rerun_requested: AtomicBool,
    stopped: AtomicBool,
    tasks: Mutex<Vec<PeriodicTaskHandle>>,
}

/// Cloneable handle to the shared cache and its background tasks.
#[derive(Clone)]
pub struct HomeboxCoordinator {
    pub(crate) inner: Arc<CoordinatorInner>,
}

impl HomeboxCoordinator {
    /// Creates a coordinator from a validated configuration.
    pub fn new(config: &HomeboxConfig) -> SyncResult<Self> {
        Self::with_listener(config, Arc::new(NoOpListener))
    }

    /// Creates a coordinator with a custom listener.
    pub fn with_listener(config: &HomeboxConfig, listener: Arc<dyn InventoryListener>) -> SyncResult<Self> {
        config.validate()?;
        let api = ApiClient::new(config)?;
        Ok(Self::from_parts(api, SyncTimings::from(config), listener))
    }

    /// Creates a coordinator around an existing client.
    pub fn from_parts(api: ApiClient, timings: SyncTimings, listener: Arc<dyn InventoryListener>) -> Self {
        HomeboxCoordinator {
            inner: Arc::new(CoordinatorInner {
                api,
                cache: RwLock::new(Arc::new(CacheSnapshot::new())),
                timings,
                status: RwLock::new(CoordinatorStatus::default()),
                listener,
                cycle_lock: Mutex::new(()),
                rerun_requested: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// The current snapshot. Readers keep a consistent view for as long as
    /// they hold the `Arc`.
    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.inner.cache.read().await.clone()
    }

    pub async fn status(&self) -> CoordinatorStatus {
        self.inner.status.read().await.clone()
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Fails once [`HomeboxCoordinator::shutdown`] has been called.
    pub(crate) fn ensure_active(&self) -> SyncResult<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            Err(SyncError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Runs one reconciliation cycle now, unless one is already running.
    pub async fn refresh(&self) -> SyncResult<CycleOutcome> {
        self.ensure_active()?;
        let outcome = {
            let Ok(_guard) = self.inner.cycle_lock.try_lock() else {
                debug!("Reconciliation already in flight, skipping");
                return Ok(CycleOutcome::Skipped);
            };
            self.run_cycle().await
        };
        self.drain_requests().await;
        outcome
    }

    /// Schedules a reconciliation without waiting for it.
    ///
    /// Requests made while a cycle is running coalesce into one follow-up
    /// cycle.
    pub fn request_refresh(&self) {
        self.inner.rerun_requested.store(true, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            this.drain_requests().await;
        });
    }

    async fn drain_requests(&self) {
        while self.inner.rerun_requested.load(Ordering::SeqCst) {
            if self.ensure_active().is_err() {
                return;
            }
            let Ok(_guard) = self.inner.cycle_lock.try_lock() else {
                return;
            };
            if !self.inner.rerun_requested.swap(false, Ordering::SeqCst) {
                return;
            }
            if let Err(e) = self.run_cycle().await {
                debug!(error = %e, "Requested reconciliation failed");
            }
        }
    }

    /// Fetch, build, diff, swap, notify. Caller holds the cycle lock.
    async fn run_cycle(&self) -> SyncResult<CycleOutcome> {
        let timeout = self.inner.timings.cycle_timeout;
        let api = self.inner.api.clone();

        // The fetch runs detached so that a timeout abandons it without
        // cancelling in-flight requests; a late result is dropped.
        let fetch = tokio::spawn(async move { fetch_snapshot(&api).await });
        let fetched = match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(SyncError::from(join_error)),
            Err(_) => Err(SyncError::Timeout(timeout)),
        };

        match fetched {
            Ok(snapshot) => Ok(CycleOutcome::Applied(self.apply(snapshot).await)),
            Err(e) => {
                self.record_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn apply(&self, next: CacheSnapshot) -> ItemDiff {
        let item_count = next.item_count();
        let location_count = next.location_count();

        let diff = {
            let mut cache = self.inner.cache.write().await;
            let diff = ItemDiff::between(&cache, &next);
            *cache = Arc::new(next);
            diff
        };

        {
            let mut status = self.inner.status.write().await;
            status.last_update_success = true;
            status.last_updated_at = Some(Utc::now());
            status.last_error = None;
            status.consecutive_failures = 0;
            status.item_count = item_count;
            status.location_count = location_count;
        }

        info!(
            items = item_count,
            locations = location_count,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Reconciliation cycle applied"
        );

        if !diff.added.is_empty() {
            let ids: Vec<String> = diff.added.iter().cloned().collect();
            self.inner.listener.on_items_added(&ids);
        }
        if !diff.removed.is_empty() {
            let ids: Vec<String> = diff.removed.iter().cloned().collect();
            self.inner.listener.on_items_removed(&ids);
        }

        diff
    }

    async fn record_failure(&self, e: &SyncError) {
        let failures = {
            let mut status = self.inner.status.write().await;
            status.last_update_success = false;
            status.last_error = Some(e.to_string());
            status.consecutive_failures += 1;
            status.consecutive_failures
        };

        match e {
            SyncError::TokenExpired => error!(error = %e, "Reconciliation failed, user action required"),
            _ => warn!(error = %e, consecutive_failures = failures, "Reconciliation failed, keeping previous snapshot"),
        }
        self.inner.listener.on_update_failed(e);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Runs the first reconciliation and, if it succeeds, spawns the poller
    /// and the token refresher. Calling `start` again while running is a
    /// no-op. A coordinator that was shut down cannot be restarted.
    pub async fn start(&self) -> SyncResult<()> {
        if self.is_running().await {
            debug!("Coordinator already started");
            return Ok(());
        }

        let base_url = self.inner.api.base_url().to_string();
        info!(%base_url, "Starting Homebox coordinator");

        if let CycleOutcome::Skipped = self.refresh().await? {
            debug!("Initial reconciliation overlapped a running cycle");
        }

        // The task lock is not held during the first cycle, so check again.
        let mut tasks = self.inner.tasks.lock().await;
        self.ensure_active()?;
        if !tasks.is_empty() {
            debug!("Coordinator started concurrently");
            return Ok(());
        }

        let poller = self.clone();
        tasks.push(spawn_periodic("reconciler", self.inner.timings.update_interval, move || {
            let coordinator = poller.clone();
            async move {
                // Failures are recorded in status and reported to the listener.
                let _ = coordinator.refresh().await;
            }
        }));

        let refresher = self.clone();
        tasks.push(spawn_periodic(
            "token-refresh",
            self.inner.timings.token_refresh_interval,
            move || {
                let coordinator = refresher.clone();
                async move {
                    coordinator.scheduled_token_refresh().await;
                }
            },
        ));

        info!("Homebox coordinator started");
        Ok(())
    }

    /// Stops the background tasks. The cache stays readable; further
    /// cycles and writes fail with [`SyncError::ShuttingDown`].
    pub async fn shutdown(&self) {
        info!("Shutting down Homebox coordinator");
        self.inner.stopped.store(true, Ordering::SeqCst);
        let tasks: Vec<PeriodicTaskHandle> = self.inner.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.shutdown().await;
        }
        info!("Homebox coordinator stopped");
    }

    /// True while the background tasks are running.
    pub async fn is_running(&self) -> bool {
        !self.inner.tasks.lock().await.is_empty()
    }

    // =========================================================================
    // Token Refresh
    // =========================================================================

    async fn scheduled_token_refresh(&self) {
        let auth = self.inner.api.authenticator();
        if !auth.credentials().can_login() {
            debug!("Static token configured, skipping scheduled refresh");
            return;
        }

        match auth.refresh_now().await {
            Ok(source) => {
                debug!(?source, "Scheduled token refresh succeeded");
                self.note_token_refresh().await;
            }
            Err(e) => warn!(error = %e, "Scheduled token refresh failed, will try again later"),
        }
    }

    /// Refreshes the token immediately and explains the outcome.
    pub async fn refresh_token(&self) -> TokenRefreshReport {
        let auth = self.inner.api.authenticator();
        match auth.refresh_now().await {
            Ok(source) => {
                self.note_token_refresh().await;
                info!(?source, "Manual token refresh succeeded");
                TokenRefreshReport {
                    success: true,
                    source: Some(source),
                    message: "Homebox token refreshed.".to_string(),
                }
            }
            Err(e) => {
                let message = match e {
                    SyncError::TokenExpired => {
                        "The configured API token cannot be refreshed automatically. \
                         Obtain a new token from Homebox and update the configuration."
                            .to_string()
                    }
                    _ => format!(
                        "Token refresh failed and will be retried at the next scheduled refresh: {}",
                        e
                    ),
                };
                warn!(error = %e, "Manual token refresh failed");
                TokenRefreshReport {
                    success: false,
                    source: None,
                    message,
                }
            }
        }
    }

    async fn note_token_refresh(&self) {
        let at = self.inner.api.authenticator().last_refresh_at().await;
        self.inner.status.write().await.last_token_refresh_at = at;
    }
}

/// Fetches locations then items and builds a snapshot.
async fn fetch_snapshot(api: &ApiClient) -> SyncResult<CacheSnapshot> {
    let locations = api.fetch_locations().await?;
    let items = api.fetch_items().await?;

    let mut builder = SnapshotBuilder::new();
    builder.add_locations(locations).add_items(items);
    for skipped in builder.skipped() {
        warn!(%skipped, "Skipping malformed record");
    }
    Ok(builder.build())
}
