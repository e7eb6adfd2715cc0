//! Per-concept progress state and the shared cache behind the sync store.
//!
//! `ProgressCache` is the one mutable shared resource in the engine. It is
//! only ever written through two doors: wholesale replacement by a refresh
//! (`apply_server_map`) and targeted per-id overwrite by the optimistic
//! mutation coordinator (`apply_local` / `restore`). The suppression map is
//! what keeps those two writers from racing: a refresh that was in flight
//! before a mutation and resolves after it must not clobber the fresher
//! optimistic value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Curiosity score ceiling. Crossing above `COMPLETION_THRESHOLD` marks the
/// concept completed.
pub const MAX_CURIOSITY: i32 = 5;
pub const COMPLETION_THRESHOLD: i32 = 4;

/// Server-authoritative per-concept progress. Invariant: completed implies
/// unlocked; score stays in `[0, MAX_CURIOSITY]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub is_unlocked: bool,
    pub is_completed: bool,
    pub curiosity_score: i32,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            is_unlocked: false,
            is_completed: false,
            curiosity_score: 0,
        }
    }
}

/// Concept id → progress state.
pub type ProgressMap = HashMap<String, ProgressState>;

/// How trustworthy a snapshot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Came straight from a network response this call.
    Fresh,
    /// Served from cache inside the TTL window, no network issued.
    Cached,
    /// Network failed; this is the last-known data and may be out of date.
    Stale,
}

/// A read of the cache handed to consumers.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub nodes: ProgressMap,
    pub freshness: Freshness,
}

/// The shared progress cache. Wrapped in a mutex by the store; everything
/// here is synchronous and cheap.
#[derive(Debug, Default)]
pub struct ProgressCache {
    nodes: ProgressMap,
    last_fetched_at: Option<Instant>,
    /// Concept ids with a live optimistic value, mapped to the instant the
    /// protection expires. Refreshes skip these ids until expiry.
    suppressed: HashMap<String, Instant>,
    /// Bumped on every write. Lets detached tasks detect that the cache moved
    /// on while their request was in flight.
    generation: u64,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when the cache has been populated at least once.
    pub fn is_populated(&self) -> bool {
        self.last_fetched_at.is_some()
    }

    /// True when the last fetch is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.last_fetched_at
            .map(|at| at.elapsed() < ttl)
            .unwrap_or(false)
    }

    pub fn get(&self, id: &str) -> Option<&ProgressState> {
        self.nodes.get(id)
    }

    /// Current state for `id`, or the locked default if the server has not
    /// reported it yet.
    pub fn get_or_default(&self, id: &str) -> ProgressState {
        self.nodes.get(id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self, freshness: Freshness) -> ProgressSnapshot {
        ProgressSnapshot {
            nodes: self.nodes.clone(),
            freshness,
        }
    }

    /// Wholesale replacement from a server response. Ids inside a live
    /// suppression window keep their local value; expired entries are pruned
    /// as a side effect, so the next refresh after expiry is authoritative.
    pub fn apply_server_map(&mut self, mut incoming: ProgressMap) {
        let now = Instant::now();
        self.suppressed.retain(|_, expires| *expires > now);
        for (id, _) in self.suppressed.iter() {
            if let Some(local) = self.nodes.get(id) {
                incoming.insert(id.clone(), local.clone());
            }
        }
        self.nodes = incoming;
        self.last_fetched_at = Some(now);
        self.generation += 1;
    }

    /// Targeted optimistic overwrite, protected for `window` against
    /// in-flight refreshes.
    pub fn apply_local(&mut self, id: &str, state: ProgressState, window: Duration) {
        self.nodes.insert(id.to_string(), state);
        self.suppressed
            .insert(id.to_string(), Instant::now() + window);
        self.generation += 1;
    }

    /// Rollback to the state captured when a failed mutation was issued.
    /// Last-rollback-wins; the entry stays suppressed so a refresh racing the
    /// rollback cannot resurrect the reverted optimistic value.
    pub fn restore(&mut self, id: &str, state: ProgressState, window: Duration) {
        self.apply_local(id, state, window);
    }

    /// True while `id` is inside its suppression window.
    pub fn is_suppressed(&self, id: &str) -> bool {
        self.suppressed
            .get(id)
            .map(|expires| *expires > Instant::now())
            .unwrap_or(false)
    }

    /// Drop all contents and force the next refresh to hit the network.
    /// Used on 401 and on explicit whole-graph mutations (reset, complete-all).
    pub fn invalidate(&mut self) {
        self.nodes.clear();
        self.suppressed.clear();
        self.last_fetched_at = None;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(score: i32, unlocked: bool, completed: bool) -> ProgressState {
        ProgressState {
            is_unlocked: unlocked,
            is_completed: completed,
            curiosity_score: score,
        }
    }

    #[test]
    fn test_fresh_within_ttl() {
        let mut cache = ProgressCache::new();
        assert!(!cache.is_fresh(Duration::from_secs(2)));
        cache.apply_server_map(ProgressMap::new());
        assert!(cache.is_fresh(Duration::from_secs(2)));
        assert!(!cache.is_fresh(Duration::ZERO));
    }

    #[test]
    fn test_server_map_replaces_wholesale() {
        let mut cache = ProgressCache::new();
        let mut first = ProgressMap::new();
        first.insert("a".into(), state(2, true, false));
        first.insert("b".into(), state(0, false, false));
        cache.apply_server_map(first);

        let mut second = ProgressMap::new();
        second.insert("a".into(), state(3, true, false));
        cache.apply_server_map(second);

        assert_eq!(cache.get("a").unwrap().curiosity_score, 3);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_suppressed_id_survives_server_map() {
        let mut cache = ProgressCache::new();
        cache.apply_local("a", state(4, true, false), Duration::from_secs(60));

        let mut server = ProgressMap::new();
        server.insert("a".into(), state(2, true, false));
        cache.apply_server_map(server);

        // Optimistic value wins while the window is live.
        assert_eq!(cache.get("a").unwrap().curiosity_score, 4);
        assert!(cache.is_suppressed("a"));
    }

    #[test]
    fn test_expired_suppression_yields_to_server() {
        let mut cache = ProgressCache::new();
        cache.apply_local("a", state(4, true, false), Duration::ZERO);

        let mut server = ProgressMap::new();
        server.insert("a".into(), state(2, true, false));
        cache.apply_server_map(server);

        assert_eq!(cache.get("a").unwrap().curiosity_score, 2);
        assert!(!cache.is_suppressed("a"));
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let mut cache = ProgressCache::new();
        cache.apply_local("a", state(1, true, false), Duration::from_secs(60));
        cache.apply_server_map(ProgressMap::new());
        cache.invalidate();
        assert!(!cache.is_populated());
        assert!(cache.get("a").is_none());
        assert!(!cache.is_suppressed("a"));
    }

    #[test]
    fn test_generation_bumps_on_writes() {
        let mut cache = ProgressCache::new();
        let g0 = cache.generation();
        cache.apply_local("a", state(1, true, false), Duration::from_secs(1));
        let g1 = cache.generation();
        cache.apply_server_map(ProgressMap::new());
        let g2 = cache.generation();
        assert!(g0 < g1 && g1 < g2);
    }
}
