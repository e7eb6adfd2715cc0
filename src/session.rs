//! Session façade.
//!
//! One `Session` per signed-in user: it owns the store, the mutation
//! coordinator and the visibility state, and hands schedulers to views as
//! they mount. Everything is torn down by dropping the session — progress
//! state never outlives the sign-in that produced it.

use crate::api::{HttpBackend, ProgressBackend, UserProfile};
use crate::error::Result;
use crate::mutate::{AdjustOutcome, MutationCoordinator};
use crate::progress::ProgressSnapshot;
use crate::scheduler::SyncScheduler;
use crate::settings;
use crate::store::{CompletionNotice, SyncConfig, SyncStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct Session {
    store: SyncStore,
    coordinator: MutationCoordinator,
    /// Tab/window visibility as last reported by the host.
    visible: AtomicBool,
    /// initialize-graph is fired once per session, on first mount.
    initialized: AtomicBool,
}

impl Session {
    pub fn new(backend: Arc<dyn ProgressBackend>, config: SyncConfig) -> Self {
        let store = SyncStore::new(backend, config);
        let coordinator = MutationCoordinator::new(store.clone());
        Self {
            store,
            coordinator,
            visible: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    /// Session against the configured server, with the stored credential.
    pub fn from_settings() -> Self {
        let s = settings::get();
        let backend = Arc::new(HttpBackend::new(&s.server_url, s.access_token.clone()));
        Self::new(backend, s.sync_config())
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    /// Called when a graph view mounts. The first mount fires the idempotent
    /// initialize-graph request without blocking the view.
    pub fn mount(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = self.store.clone();
        tokio::spawn(async move {
            match store.backend().initialize_graph().await {
                Ok(count) => println!("[SYNC] graph initialized ({} nodes)", count),
                Err(e) => eprintln!("[SYNC] initialize-graph failed: {}", e),
            }
        });
    }

    /// Start a poll loop for a mounted view. Dropping the returned scheduler
    /// stops it.
    pub fn start_polling(&self, interval: Duration) -> SyncScheduler {
        SyncScheduler::start(self.store.clone(), interval)
    }

    /// Report tab visibility. A hidden→visible transition forces an
    /// immediate refresh to recover from throttled background timers.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.visible.swap(visible, Ordering::SeqCst);
        if visible && !was_visible {
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.refresh(true).await {
                    eprintln!("[SYNC] visibility refresh failed: {}", e);
                }
            });
        }
    }

    pub async fn refresh(&self, force: bool) -> Result<ProgressSnapshot> {
        self.store.refresh(force).await
    }

    /// Single-node refresh for the detail view.
    pub async fn refresh_node(&self, node_id: &str) -> Result<Option<crate::progress::ProgressState>> {
        self.store.refresh_node(node_id).await
    }

    pub fn adjust_curiosity(&self, node_id: &str, delta: i32) -> AdjustOutcome {
        self.coordinator.adjust_curiosity(node_id, delta)
    }

    /// Verify the stored credential and return the signed-in user.
    pub async fn me(&self) -> Result<UserProfile> {
        self.store.backend().me().await
    }

    /// Ensure per-user progress rows exist for every concept. Idempotent.
    pub async fn initialize(&self) -> Result<u64> {
        self.store.backend().initialize_graph().await
    }

    /// Mark a concept completed directly (bypassing the score path) and
    /// return the neighbor ids the server unlocked.
    pub async fn complete_node(&self, node_id: &str) -> Result<Vec<String>> {
        self.store.backend().complete_node(node_id).await
    }

    pub fn active_notifications(&self) -> Vec<CompletionNotice> {
        self.store.active_notifications()
    }

    pub fn unauthorized_watch(&self) -> watch::Receiver<bool> {
        self.store.unauthorized_watch()
    }

    /// Clear all progress server-side, then refetch.
    pub async fn reset(&self) -> Result<ProgressSnapshot> {
        self.store.backend().reset_graph().await?;
        self.store.invalidate();
        self.store.refresh(true).await
    }

    /// Mark every node completed server-side, then refetch.
    pub async fn complete_all(&self) -> Result<ProgressSnapshot> {
        self.store.backend().complete_all().await?;
        self.store.invalidate();
        self.store.refresh(true).await
    }

    /// Drop the credential and cached progress. The session object itself
    /// should be dropped right after; it is kept only so callers can finish
    /// rendering the signed-out state.
    pub fn logout(&self) {
        self.store.backend().discard_credential();
        self.store.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressMap, ProgressState};
    use crate::testutil::ScriptedBackend;

    fn backend() -> Arc<ScriptedBackend> {
        let mut map = ProgressMap::new();
        map.insert(
            "moles".into(),
            ProgressState {
                is_unlocked: true,
                is_completed: false,
                curiosity_score: 2,
            },
        );
        Arc::new(ScriptedBackend::with_nodes(map))
    }

    #[tokio::test]
    async fn test_mount_initializes_once() {
        let backend = backend();
        let session = Session::new(backend.clone(), SyncConfig::default());

        session.mount();
        session.mount();
        session.mount();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn test_visibility_transition_forces_refresh() {
        let backend = backend();
        let session = Session::new(backend.clone(), SyncConfig::default());

        session.set_visible(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.fetch_count(), 0);

        session.set_visible(true);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.fetch_count(), 1);

        // Visible→visible is not a transition.
        session.set_visible(true);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_invalidates_and_refetches() {
        let backend = backend();
        let session = Session::new(backend.clone(), SyncConfig::default());

        session.refresh(false).await.unwrap();
        let snapshot = session.reset().await.unwrap();

        assert_eq!(backend.fetch_count(), 2);
        assert!(snapshot.nodes.contains_key("moles"));
    }

    #[tokio::test]
    async fn test_logout_drops_cache_and_credential() {
        let backend = backend();
        let session = Session::new(backend.clone(), SyncConfig::default());

        session.refresh(false).await.unwrap();
        assert!(session.store().get_node("moles").is_some());

        session.logout();
        assert!(session.store().get_node("moles").is_none());
        assert!(backend.credential_discarded());
    }
}
