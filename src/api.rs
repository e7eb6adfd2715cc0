//! Server API: the `ProgressBackend` seam and its reqwest implementation.
//!
//! Everything the engine knows about the wire lives here. The trait exists so
//! the store and coordinator can be exercised against a scripted in-process
//! backend in tests; production code always talks through `HttpBackend`.
//!
//! All endpoints require a bearer credential. A 401 from any of them maps to
//! `SyncError::Unauthorized` — the store reacts by discarding the credential
//! and firing the re-auth signal, and never retries past it.

use crate::error::{Result, SyncError};
use crate::progress::{ProgressMap, ProgressState};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;

/// Authenticated user, as reported by `GET /auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Server operations the engine depends on.
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// `GET /api/user-nodes` — full per-user progress map.
    async fn fetch_nodes(&self) -> Result<ProgressMap>;

    /// `GET /api/user-nodes/{id}` — single-node variant for the detail view.
    async fn fetch_node(&self, node_id: &str) -> Result<Option<ProgressState>>;

    /// `PATCH /api/user-nodes/{id}/curiosity?score_delta=±1`. Returns the
    /// server-side score after the delta.
    async fn adjust_curiosity(&self, node_id: &str, delta: i32) -> Result<i32>;

    /// `PATCH /api/user-nodes/{id}/complete`. Returns neighbor ids the server
    /// considered for unlocking.
    async fn complete_node(&self, node_id: &str) -> Result<Vec<String>>;

    /// `POST /api/initialize-graph` — idempotent row seeding. Returns the
    /// node count reported by the server.
    async fn initialize_graph(&self) -> Result<u64>;

    /// `DELETE /api/reset-graph` — clears all progress for the user.
    async fn reset_graph(&self) -> Result<()>;

    /// `POST /api/complete-all-nodes`.
    async fn complete_all(&self) -> Result<()>;

    /// `GET /auth/me` — validates the stored credential.
    async fn me(&self) -> Result<UserProfile>;

    /// Forget the credential. Called by the store on 401.
    fn discard_credential(&self);
}

// Wire shapes. Unknown extra fields (the server also sends `neighbors`) are
// ignored by serde.

#[derive(Deserialize)]
struct UserNodesResponse {
    nodes: Vec<UserNodeRow>,
}

#[derive(Deserialize)]
struct UserNodeRow {
    node_id: String,
    #[serde(default)]
    is_unlocked: bool,
    #[serde(default)]
    is_completed: bool,
    #[serde(default)]
    curiosity_score: i32,
}

impl From<UserNodeRow> for ProgressState {
    fn from(row: UserNodeRow) -> Self {
        ProgressState {
            is_unlocked: row.is_unlocked,
            is_completed: row.is_completed,
            curiosity_score: row.curiosity_score,
        }
    }
}

#[derive(Deserialize)]
struct CuriosityResponse {
    curiosity_score: i32,
}

#[derive(Deserialize)]
struct CompleteResponse {
    #[serde(default)]
    unlocked_neighbors: Vec<String>,
}

#[derive(Deserialize)]
struct InitializeResponse {
    #[serde(default)]
    nodes_count: u64,
}

/// reqwest-backed implementation of `ProgressBackend`.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: &str) {
        *self.token.write().unwrap() = Some(token.to_string());
    }

    pub fn has_token(&self) -> bool {
        self.token.read().unwrap().is_some()
    }

    fn node_url(&self, node_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/user-nodes/{}{}",
            self.base_url,
            urlencoding::encode(node_id),
            suffix
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().unwrap().as_deref() {
            Some(token) => req.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Map status codes onto the error taxonomy, then deserialize.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProgressBackend for HttpBackend {
    async fn fetch_nodes(&self) -> Result<ProgressMap> {
        let url = format!("{}/api/user-nodes", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let body: UserNodesResponse = self.handle_response(response).await?;
        Ok(body
            .nodes
            .into_iter()
            .map(|row| (row.node_id.clone(), row.into()))
            .collect())
    }

    async fn fetch_node(&self, node_id: &str) -> Result<Option<ProgressState>> {
        let url = self.node_url(node_id, "");
        let response = self.authorize(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let row: UserNodeRow = self.handle_response(response).await?;
        Ok(Some(row.into()))
    }

    async fn adjust_curiosity(&self, node_id: &str, delta: i32) -> Result<i32> {
        let url = format!(
            "{}?score_delta={}",
            self.node_url(node_id, "/curiosity"),
            delta
        );
        let response = self.authorize(self.client.patch(&url)).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !status.is_success() {
            return Err(SyncError::MutationFailed {
                status: status.as_u16(),
            });
        }
        let body: CuriosityResponse = response.json().await?;
        Ok(body.curiosity_score)
    }

    async fn complete_node(&self, node_id: &str) -> Result<Vec<String>> {
        let url = self.node_url(node_id, "/complete");
        let response = self.authorize(self.client.patch(&url)).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if !status.is_success() {
            return Err(SyncError::MutationFailed {
                status: status.as_u16(),
            });
        }
        let body: CompleteResponse = response.json().await?;
        Ok(body.unlocked_neighbors)
    }

    async fn initialize_graph(&self) -> Result<u64> {
        let url = format!("{}/api/initialize-graph", self.base_url);
        let response = self.authorize(self.client.post(&url)).send().await?;
        let body: InitializeResponse = self.handle_response(response).await?;
        Ok(body.nodes_count)
    }

    async fn reset_graph(&self) -> Result<()> {
        let url = format!("{}/api/reset-graph", self.base_url);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        let _: serde_json::Value = self.handle_response(response).await?;
        Ok(())
    }

    async fn complete_all(&self) -> Result<()> {
        let url = format!("{}/api/complete-all-nodes", self.base_url);
        let response = self.authorize(self.client.post(&url)).send().await?;
        let _: serde_json::Value = self.handle_response(response).await?;
        Ok(())
    }

    async fn me(&self) -> Result<UserProfile> {
        let url = format!("{}/auth/me", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        self.handle_response(response).await
    }

    fn discard_credential(&self) {
        *self.token.write().unwrap() = None;
    }
}
