//! Optimistic mutation coordinator.
//!
//! User actions land here, are applied to the cache immediately, and are sent
//! to the server from a detached task so the caller never waits on the
//! network. A successful mutation keeps the optimistic value (no refetch); a
//! failed one restores the state captured when that mutation was issued.
//!
//! Completion is a side effect of the score crossing the threshold and goes
//! out as an independent second request. Its failure is logged but not
//! reverted: score and completion reconcile separately, and the window of
//! inconsistency closes on the next successful poll.

use crate::error::SyncError;
use crate::progress::{ProgressState, COMPLETION_THRESHOLD, MAX_CURIOSITY};
use crate::store::SyncStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-concept mutation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

/// Result of `adjust_curiosity`, available before any network round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustOutcome {
    Applied { new_score: i32, completed: bool },
    /// Client-side bounds guard tripped; nothing was changed or sent.
    Rejected,
}

pub struct MutationCoordinator {
    store: SyncStore,
    /// Shared with the detached mutation tasks that resolve each phase.
    phases: Arc<Mutex<HashMap<String, MutationPhase>>>,
}

impl MutationCoordinator {
    pub fn new(store: SyncStore) -> Self {
        Self {
            store,
            phases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn phase(&self, node_id: &str) -> MutationPhase {
        self.phases
            .lock()
            .unwrap()
            .get(node_id)
            .copied()
            .unwrap_or(MutationPhase::Idle)
    }

    fn set_phase(&self, node_id: &str, phase: MutationPhase) {
        self.phases
            .lock()
            .unwrap()
            .insert(node_id.to_string(), phase);
    }

    /// Apply a ±1 curiosity delta optimistically and send it to the server.
    ///
    /// Bounds guards (silent no-ops, not errors): the resulting score may not
    /// go below 0 or above `MAX_CURIOSITY`, and a completed concept's score
    /// is frozen. Crossing above `COMPLETION_THRESHOLD` also marks the
    /// concept completed, raises a fire-once notification, and issues an
    /// independent complete request.
    ///
    /// Concurrent calls for the same id stack against the latest optimistic
    /// value, so rapid clicking accumulates; each failed request rolls back
    /// to the state captured when it was issued (last-rollback-wins).
    pub fn adjust_curiosity(&self, node_id: &str, delta: i32) -> AdjustOutcome {
        if delta != 1 && delta != -1 {
            return AdjustOutcome::Rejected;
        }

        let window = self.store.config().suppression_window;
        // Read-guard-write under one cache lock so a racing refresh cannot
        // interleave between the read and the optimistic write.
        let applied = self.store.with_cache(|cache| {
            let prior = cache.get_or_default(node_id);
            if prior.is_completed {
                return None; // score frozen after completion
            }
            let new_score = prior.curiosity_score + delta;
            if new_score < 0 || new_score > MAX_CURIOSITY {
                return None;
            }

            let newly_completed = new_score > COMPLETION_THRESHOLD;
            let next = ProgressState {
                is_unlocked: prior.is_unlocked || newly_completed,
                is_completed: newly_completed,
                curiosity_score: new_score,
            };
            cache.apply_local(node_id, next, window);
            Some((prior, new_score, newly_completed))
        });

        let (prior, new_score, newly_completed) = match applied {
            Some(applied) => applied,
            None => return AdjustOutcome::Rejected,
        };

        if newly_completed {
            self.store.push_completion(node_id);
        }
        self.set_phase(node_id, MutationPhase::Pending);
        self.spawn_score_mutation(node_id, delta, prior, newly_completed);
        if newly_completed {
            self.spawn_complete_mutation(node_id);
        }

        AdjustOutcome::Applied {
            new_score,
            completed: newly_completed,
        }
    }

    /// Detached score PATCH. Fire-and-forget from the caller's point of view;
    /// commit keeps the optimistic value, failure restores `prior`.
    fn spawn_score_mutation(
        &self,
        node_id: &str,
        delta: i32,
        prior: ProgressState,
        newly_completed: bool,
    ) {
        let store = self.store.clone();
        let node_id = node_id.to_string();
        let phases = Arc::clone(&self.phases);
        tokio::spawn(async move {
            match store.backend().adjust_curiosity(&node_id, delta).await {
                Ok(_) => {
                    phases
                        .lock()
                        .unwrap()
                        .insert(node_id.clone(), MutationPhase::Committed);
                }
                Err(e) => {
                    eprintln!("[MUTATE] curiosity {:+} on '{}' failed: {}", delta, node_id, e);
                    if matches!(e, SyncError::Unauthorized) {
                        store.signal_unauthorized();
                    }
                    let window = store.config().suppression_window;
                    store.with_cache(|cache| cache.restore(&node_id, prior, window));
                    if newly_completed {
                        store.cancel_completion(&node_id);
                    }
                    phases
                        .lock()
                        .unwrap()
                        .insert(node_id.clone(), MutationPhase::RolledBack);
                }
            }
        });
    }

    /// Detached complete PATCH, issued alongside the score mutation. Not
    /// transactional with it: failure here leaves the optimistic completion
    /// in place and lets the next poll reconcile.
    fn spawn_complete_mutation(&self, node_id: &str) {
        let store = self.store.clone();
        let node_id = node_id.to_string();
        tokio::spawn(async move {
            match store.backend().complete_node(&node_id).await {
                Ok(unlocked) => {
                    if !unlocked.is_empty() {
                        println!(
                            "[MUTATE] '{}' completed, server considered {} neighbor(s)",
                            node_id,
                            unlocked.len()
                        );
                    }
                }
                Err(e) => {
                    eprintln!(
                        "[MUTATE] complete on '{}' failed (will reconcile on next poll): {}",
                        node_id, e
                    );
                }
            }
        });
    }

}
