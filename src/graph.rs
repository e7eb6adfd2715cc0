//! Static concept graph document.
//!
//! The graph structure (concepts + relations) ships as a bundled JSON asset
//! in the Cytoscape shape the renderer consumes: `{ "nodes": [{"data": ...}],
//! "edges": [{"data": ...}] }`. It is loaded exactly once per process and is
//! immutable afterwards; per-user progress lives in the sync store, never
//! here.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// A single learning topic in the dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptNode {
    pub id: String,
    pub label: String,
    /// Categorical grouping used by the unit filter. Untagged concepts are
    /// always visible.
    pub unit: Option<String>,
    pub description: String,
}

/// A dependency/association between two concepts.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub source: String,
    pub target: String,
    pub description: Option<String>,
}

/// Immutable set of concepts and relations. Invariant: every relation
/// endpoint references an existing concept id.
#[derive(Debug, Clone)]
pub struct GraphDocument {
    nodes: Vec<ConceptNode>,
    relations: Vec<Relation>,
    index: HashMap<String, usize>,
}

// Wire shape of the bundled asset (Cytoscape elements).

#[derive(Deserialize)]
struct RawDocument {
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawNode {
    data: RawNodeData,
}

#[derive(Deserialize)]
struct RawNodeData {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct RawEdge {
    data: RawEdgeData,
}

#[derive(Deserialize)]
struct RawEdgeData {
    source: String,
    target: String,
    #[serde(default)]
    description: Option<String>,
}

impl GraphDocument {
    /// Parse and validate a document from its JSON source.
    ///
    /// Fails on duplicate concept ids and on relations whose endpoints do not
    /// reference an existing concept (dangling endpoints crash the renderer
    /// downstream, so they are rejected here).
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawDocument = serde_json::from_str(json)?;

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        let mut index = HashMap::with_capacity(raw.nodes.len());
        for raw_node in raw.nodes {
            let data = raw_node.data;
            if index.contains_key(&data.id) {
                return Err(SyncError::BadDocument(format!(
                    "duplicate concept id '{}'",
                    data.id
                )));
            }
            index.insert(data.id.clone(), nodes.len());
            nodes.push(ConceptNode {
                label: data.label.unwrap_or_else(|| data.id.clone()),
                id: data.id,
                unit: data.unit,
                description: data.description.unwrap_or_default(),
            });
        }

        let mut relations = Vec::with_capacity(raw.edges.len());
        for raw_edge in raw.edges {
            let data = raw_edge.data;
            for endpoint in [&data.source, &data.target] {
                if !index.contains_key(endpoint) {
                    return Err(SyncError::BadDocument(format!(
                        "relation endpoint '{}' references no concept",
                        endpoint
                    )));
                }
            }
            relations.push(Relation {
                source: data.source,
                target: data.target,
                description: data.description,
            });
        }

        Ok(Self {
            nodes,
            relations,
            index,
        })
    }

    /// Empty document, used as the degraded fallback when the bundled asset
    /// is malformed (render nothing rather than crash).
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            relations: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn nodes(&self) -> &[ConceptNode] {
        &self.nodes
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn node(&self, id: &str) -> Option<&ConceptNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Concept ids adjacent to `id` (relations are traversed both ways).
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        for rel in &self.relations {
            if rel.source == id {
                out.push(rel.target.as_str());
            } else if rel.target == id {
                out.push(rel.source.as_str());
            }
        }
        out
    }

    /// Distinct unit tags present in the document, sorted.
    pub fn units(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .filter_map(|n| n.unit.as_deref())
            .collect()
    }
}

/// Bundled graph asset, compiled into the binary.
const BUNDLED_DOCUMENT: &str = include_str!("../data/concepts.json");

static DOCUMENT: OnceLock<std::result::Result<GraphDocument, String>> = OnceLock::new();

/// Load the bundled graph document, parsing it on first call and returning
/// the memoized value afterwards. A malformed asset is reported once as
/// `BadDocument`; repeat calls keep returning the same error without
/// re-parsing.
pub fn load() -> Result<&'static GraphDocument> {
    let slot = DOCUMENT.get_or_init(|| match GraphDocument::parse(BUNDLED_DOCUMENT) {
        Ok(doc) => Ok(doc),
        Err(e) => {
            eprintln!("[GRAPH] bundled document failed to parse: {}", e);
            Err(e.to_string())
        }
    });
    match slot {
        Ok(doc) => Ok(doc),
        Err(msg) => Err(SyncError::BadDocument(msg.clone())),
    }
}
