//! The sync store: progress cache, single-flight refresh, and session-level
//! signals.
//!
//! One `SyncStore` is shared by every consumer in a session (graph canvas,
//! sidebar, neighbor list, detail view); cloning it is cheap and clones
//! observe the same state. Consumers may each run their own poll loop; all of
//! them funnel into `refresh`, which deduplicates overlapping calls into a
//! single in-flight request. The store is constructed explicitly and dropped
//! at logout — no ambient globals, so tests and multi-session use stay
//! isolated.

use crate::api::ProgressBackend;
use crate::error::{Result, SyncError};
use crate::progress::{Freshness, ProgressCache, ProgressMap, ProgressSnapshot, ProgressState};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Tunable windows. Production uses the defaults; tests shrink them.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cache age below which `refresh(force=false)` skips the network.
    pub ttl: Duration,
    /// How long an optimistic write is protected from poll-driven refreshes.
    pub suppression_window: Duration,
    /// How long a "just completed" notification stays active.
    pub notification_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(2),
            suppression_window: Duration::from_secs(2),
            notification_ttl: Duration::from_secs(5),
        }
    }
}

/// Fire-once "concept just completed" event, auto-expiring after
/// `notification_ttl` of display.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub node_id: String,
    pub raised_at: DateTime<Utc>,
    expires_at: Instant,
}

/// Cloneable failure carried through the shared in-flight future. Collapsed
/// back onto `SyncError` at the `refresh` boundary.
#[derive(Debug, Clone)]
enum FetchFailure {
    Unauthorized,
    Server { status: u16, message: String },
    Network(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Unauthorized => write!(f, "unauthorized"),
            FetchFailure::Server { status, message } => {
                write!(f, "server error {}: {}", status, message)
            }
            FetchFailure::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, std::result::Result<ProgressMap, FetchFailure>>>;

struct StoreInner {
    backend: Arc<dyn ProgressBackend>,
    config: SyncConfig,
    cache: Mutex<ProgressCache>,
    /// Single-flight slot: while a refresh is running, every caller awaits
    /// this same future. The running task clears the slot when done.
    in_flight: AsyncMutex<Option<SharedFetch>>,
    notifications: Mutex<Vec<CompletionNotice>>,
    unauthorized_tx: watch::Sender<bool>,
    unauthorized_fired: AtomicBool,
}

/// Cheap-to-clone handle to the shared per-session progress state.
#[derive(Clone)]
pub struct SyncStore {
    inner: Arc<StoreInner>,
}

impl SyncStore {
    pub fn new(backend: Arc<dyn ProgressBackend>, config: SyncConfig) -> Self {
        let (unauthorized_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(StoreInner {
                backend,
                config,
                cache: Mutex::new(ProgressCache::new()),
                in_flight: AsyncMutex::new(None),
                notifications: Mutex::new(Vec::new()),
                unauthorized_tx,
                unauthorized_fired: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ProgressBackend> {
        &self.inner.backend
    }

    /// Refresh the progress cache.
    ///
    /// - Fresh cache and `force == false`: returns the cached map, no network.
    /// - A refresh already in flight: awaits the same in-flight result, so N
    ///   overlapping callers cost one request.
    /// - Network failure: falls back to the last-known map (`Stale`) unless
    ///   the cache has never been populated (`Unavailable`).
    /// - 401: invalidates the cache, discards the credential, fires the
    ///   unauthorized signal once, and surfaces `Unauthorized`. Never retried.
    pub async fn refresh(&self, force: bool) -> Result<ProgressSnapshot> {
        if !force {
            let cache = self.inner.cache.lock().unwrap();
            if cache.is_fresh(self.inner.config.ttl) {
                return Ok(cache.snapshot(Freshness::Cached));
            }
        }

        let fut = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let store = self.clone();
                    let handle = tokio::spawn(async move {
                        let result = store.fetch_and_apply().await;
                        // Clear the slot so the next refresh starts a new
                        // request instead of observing a finished future.
                        *store.inner.in_flight.lock().await = None;
                        result
                    });
                    let fut: SharedFetch = handle
                        .map(|joined| match joined {
                            Ok(result) => result,
                            Err(e) => Err(FetchFailure::Network(format!(
                                "refresh task failed: {}",
                                e
                            ))),
                        })
                        .boxed()
                        .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        match fut.await {
            Ok(_) => Ok(self.inner.cache.lock().unwrap().snapshot(Freshness::Fresh)),
            Err(FetchFailure::Unauthorized) => Err(SyncError::Unauthorized),
            Err(failure) => {
                let cache = self.inner.cache.lock().unwrap();
                if cache.is_populated() {
                    Ok(cache.snapshot(Freshness::Stale))
                } else {
                    Err(SyncError::Unavailable(failure.to_string()))
                }
            }
        }
    }

    async fn fetch_and_apply(&self) -> std::result::Result<ProgressMap, FetchFailure> {
        match self.inner.backend.fetch_nodes().await {
            Ok(map) => {
                let mut cache = self.inner.cache.lock().unwrap();
                cache.apply_server_map(map);
                Ok(cache.snapshot(Freshness::Fresh).nodes)
            }
            Err(SyncError::Unauthorized) => {
                self.signal_unauthorized();
                Err(FetchFailure::Unauthorized)
            }
            Err(SyncError::Server { status, message }) => {
                eprintln!("[SYNC] refresh rejected: {} {}", status, message);
                Err(FetchFailure::Server { status, message })
            }
            Err(e) => Err(FetchFailure::Network(e.to_string())),
        }
    }

    /// Single-node refresh for the detail view. Applies the server state to
    /// the cache unless the id is inside a live suppression window, in which
    /// case the optimistic value is returned instead.
    pub async fn refresh_node(&self, node_id: &str) -> Result<Option<ProgressState>> {
        match self.inner.backend.fetch_node(node_id).await {
            Ok(Some(state)) => Ok(Some(self.with_cache(|cache| {
                if cache.is_suppressed(node_id) {
                    cache.get_or_default(node_id)
                } else {
                    cache.apply_local(node_id, state.clone(), Duration::ZERO);
                    state
                }
            }))),
            Ok(None) => Ok(None),
            Err(SyncError::Unauthorized) => {
                self.signal_unauthorized();
                Err(SyncError::Unauthorized)
            }
            Err(e) if e.is_degradable() => Ok(self.get_node(node_id)),
            Err(e) => Err(e),
        }
    }

    /// Cache view without touching the network. Freshness reflects TTL state.
    pub fn peek(&self) -> ProgressSnapshot {
        let cache = self.inner.cache.lock().unwrap();
        let freshness = if cache.is_fresh(self.inner.config.ttl) {
            Freshness::Cached
        } else {
            Freshness::Stale
        };
        cache.snapshot(freshness)
    }

    pub fn get_node(&self, id: &str) -> Option<ProgressState> {
        self.inner.cache.lock().unwrap().get(id).cloned()
    }

    /// Run `f` under the cache lock. The mutation coordinator uses this so
    /// its read-guard-write sequence is atomic against refreshes.
    pub(crate) fn with_cache<R>(&self, f: impl FnOnce(&mut ProgressCache) -> R) -> R {
        f(&mut self.inner.cache.lock().unwrap())
    }

    /// Drop cached progress; the next refresh hits the network regardless of
    /// TTL. Used after whole-graph mutations (reset, complete-all).
    pub fn invalidate(&self) {
        self.inner.cache.lock().unwrap().invalidate();
    }

    /// Discard the credential, invalidate the cache and fire the re-auth
    /// signal. Fires at most once per store lifetime, so a burst of 401s
    /// produces exactly one redirect.
    pub(crate) fn signal_unauthorized(&self) {
        self.inner.cache.lock().unwrap().invalidate();
        self.inner.backend.discard_credential();
        if !self.inner.unauthorized_fired.swap(true, Ordering::SeqCst) {
            eprintln!("[SYNC] credential rejected (401), signalling re-auth");
            let _ = self.inner.unauthorized_tx.send(true);
        }
    }

    /// Subscribe to the unauthorized signal. The top-level view redirects to
    /// re-authentication when this flips to true.
    pub fn unauthorized_watch(&self) -> watch::Receiver<bool> {
        self.inner.unauthorized_tx.subscribe()
    }

    // ---- Completion notifications -----------------------------------------

    pub(crate) fn push_completion(&self, node_id: &str) {
        let mut notices = self.inner.notifications.lock().unwrap();
        // Fire-once: a notice already showing for this node is not duplicated.
        if notices.iter().any(|n| n.node_id == node_id) {
            return;
        }
        notices.push(CompletionNotice {
            node_id: node_id.to_string(),
            raised_at: Utc::now(),
            expires_at: Instant::now() + self.inner.config.notification_ttl,
        });
    }

    pub(crate) fn cancel_completion(&self, node_id: &str) {
        self.inner
            .notifications
            .lock()
            .unwrap()
            .retain(|n| n.node_id != node_id);
    }

    /// Notices still inside their display window; expired ones are pruned.
    pub fn active_notifications(&self) -> Vec<CompletionNotice> {
        let now = Instant::now();
        let mut notices = self.inner.notifications.lock().unwrap();
        notices.retain(|n| n.expires_at > now);
        notices.clone()
    }
}
