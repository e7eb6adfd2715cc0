//! Scripted in-process backend for engine tests.
//!
//! Responses are queued per endpoint; an empty queue falls back to the
//! backend's default node map. Gates (zero-permit semaphores) let tests hold
//! a request in flight and release it at a chosen moment, which is how the
//! single-flight and suppression-window races are made deterministic.

use crate::api::{ProgressBackend, UserProfile};
use crate::error::{Result, SyncError};
use crate::progress::{ProgressMap, ProgressState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub(crate) enum FetchOutcome {
    Nodes(ProgressMap),
    Unauthorized,
    NetworkDown,
}

pub(crate) enum MutationOutcome {
    Ok,
    Failed(u16),
    NetworkDown,
}

fn network_down() -> SyncError {
    SyncError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "network down",
    ))
}

pub(crate) struct ScriptedBackend {
    default_nodes: Mutex<ProgressMap>,
    fetch_script: Mutex<VecDeque<FetchOutcome>>,
    fetch_calls: AtomicUsize,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    adjust_script: Mutex<VecDeque<MutationOutcome>>,
    adjust_calls: Mutex<Vec<(String, i32)>>,
    adjust_gate: Mutex<Option<Arc<Semaphore>>>,
    complete_script: Mutex<VecDeque<MutationOutcome>>,
    complete_calls: Mutex<Vec<String>>,
    init_calls: AtomicUsize,
    discarded: AtomicBool,
}

impl ScriptedBackend {
    pub fn with_nodes(nodes: ProgressMap) -> Self {
        Self {
            default_nodes: Mutex::new(nodes),
            fetch_script: Mutex::new(VecDeque::new()),
            fetch_calls: AtomicUsize::new(0),
            fetch_gate: Mutex::new(None),
            adjust_script: Mutex::new(VecDeque::new()),
            adjust_calls: Mutex::new(Vec::new()),
            adjust_gate: Mutex::new(None),
            complete_script: Mutex::new(VecDeque::new()),
            complete_calls: Mutex::new(Vec::new()),
            init_calls: AtomicUsize::new(0),
            discarded: AtomicBool::new(false),
        }
    }

    pub fn set_nodes(&self, nodes: ProgressMap) {
        *self.default_nodes.lock().unwrap() = nodes;
    }

    pub fn script_fetch(&self, outcome: FetchOutcome) {
        self.fetch_script.lock().unwrap().push_back(outcome);
    }

    pub fn script_adjust(&self, outcome: MutationOutcome) {
        self.adjust_script.lock().unwrap().push_back(outcome);
    }

    pub fn script_complete(&self, outcome: MutationOutcome) {
        self.complete_script.lock().unwrap().push_back(outcome);
    }

    /// Hold every subsequent fetch until permits are added.
    pub fn gate_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold every subsequent curiosity mutation until permits are added.
    pub fn gate_adjusts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.adjust_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn adjust_log(&self) -> Vec<(String, i32)> {
        self.adjust_calls.lock().unwrap().clone()
    }

    pub fn complete_log(&self) -> Vec<String> {
        self.complete_calls.lock().unwrap().clone()
    }

    pub fn credential_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst)
    }

    async fn wait(gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl ProgressBackend for ScriptedBackend {
    async fn fetch_nodes(&self) -> Result<ProgressMap> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.fetch_gate.lock().unwrap().clone();
        Self::wait(gate).await;
        let scripted = self.fetch_script.lock().unwrap().pop_front();
        match scripted {
            Some(FetchOutcome::Nodes(map)) => Ok(map),
            Some(FetchOutcome::Unauthorized) => Err(SyncError::Unauthorized),
            Some(FetchOutcome::NetworkDown) => Err(network_down()),
            None => Ok(self.default_nodes.lock().unwrap().clone()),
        }
    }

    async fn fetch_node(&self, node_id: &str) -> Result<Option<ProgressState>> {
        Ok(self.default_nodes.lock().unwrap().get(node_id).cloned())
    }

    async fn adjust_curiosity(&self, node_id: &str, delta: i32) -> Result<i32> {
        self.adjust_calls
            .lock()
            .unwrap()
            .push((node_id.to_string(), delta));
        let gate = self.adjust_gate.lock().unwrap().clone();
        Self::wait(gate).await;
        let scripted = self.adjust_script.lock().unwrap().pop_front();
        match scripted {
            Some(MutationOutcome::Ok) | None => Ok(delta.max(0)),
            Some(MutationOutcome::Failed(status)) => Err(SyncError::MutationFailed { status }),
            Some(MutationOutcome::NetworkDown) => Err(network_down()),
        }
    }

    async fn complete_node(&self, node_id: &str) -> Result<Vec<String>> {
        self.complete_calls.lock().unwrap().push(node_id.to_string());
        let scripted = self.complete_script.lock().unwrap().pop_front();
        match scripted {
            Some(MutationOutcome::Ok) | None => Ok(Vec::new()),
            Some(MutationOutcome::Failed(status)) => Err(SyncError::MutationFailed { status }),
            Some(MutationOutcome::NetworkDown) => Err(network_down()),
        }
    }

    async fn initialize_graph(&self) -> Result<u64> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.default_nodes.lock().unwrap().len() as u64)
    }

    async fn reset_graph(&self) -> Result<()> {
        Ok(())
    }

    async fn complete_all(&self) -> Result<()> {
        Ok(())
    }

    async fn me(&self) -> Result<UserProfile> {
        Ok(UserProfile {
            id: "u-1".into(),
            email: "student@example.com".into(),
            name: "Student".into(),
        })
    }

    fn discard_credential(&self) {
        self.discarded.store(true, Ordering::SeqCst);
    }
}
