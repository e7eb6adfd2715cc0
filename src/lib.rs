//! curio — progress synchronization engine for a concept-graph learning app.
//!
//! The graph of learning concepts is a fixed, bundled document; per-user
//! progress (locked / unlocked / completed plus a 0-5 curiosity score) is
//! server-authoritative and mirrored here through a TTL'd cache, a
//! single-flight fetcher, polling schedulers and an optimistic mutation
//! coordinator with rollback. Rendering, rich text and chat are external
//! collaborators; this crate owns the state they all observe.

pub mod api;
pub mod error;
pub mod filter;
pub mod graph;
pub mod layout;
pub mod mutate;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{HttpBackend, ProgressBackend, UserProfile};
pub use error::{Result, SyncError};
pub use filter::FilterState;
pub use graph::{ConceptNode, GraphDocument, Relation};
pub use layout::{LayoutCache, Position};
pub use mutate::{AdjustOutcome, MutationCoordinator, MutationPhase};
pub use progress::{Freshness, ProgressMap, ProgressSnapshot, ProgressState};
pub use scheduler::SyncScheduler;
pub use session::Session;
pub use store::{CompletionNotice, SyncConfig, SyncStore};
