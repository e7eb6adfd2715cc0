//! Polling scheduler.
//!
//! There is no push channel; consistency comes from polling plus
//! refetch-on-mutation. Each mounted view owns a `SyncScheduler` ticking at
//! its own cadence (the detail view polls tighter than the sidebar so
//! chat-driven score changes show up promptly). All tickers resolve through
//! the store's single-flight refresh, so extra consumers multiply timers but
//! never network calls. Dropping the scheduler aborts its task — an
//! unmounted view leaks no timers.

use crate::error::SyncError;
use crate::store::SyncStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct SyncScheduler {
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn a poll loop driving `refresh(force=false)` every `interval`.
    /// The first tick fires immediately (initial fetch on mount).
    pub fn start(store: SyncStore, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Catch up with one tick after a stall instead of a burst.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.refresh(false).await {
                    Ok(_) => {}
                    Err(SyncError::Unauthorized) => {
                        // The re-auth signal already fired and the credential
                        // is gone; polling again would just re-send nothing.
                        // Re-login builds a new session with new schedulers.
                        eprintln!("[POLL] credential rejected, stopping poll loop");
                        break;
                    }
                    Err(e) => {
                        // Transient failures keep the loop alive; the next
                        // poll may succeed.
                        eprintln!("[POLL] refresh failed: {}", e);
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
