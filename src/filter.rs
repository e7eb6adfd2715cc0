//! Unit filter: derives the visible subset of the graph.
//!
//! Pure functions of (document, filter state). Toggling a unit recomputes
//! visibility only — the document is never reloaded and positions never move.

use crate::graph::GraphDocument;
use std::collections::{HashMap, HashSet};

/// Independent on/off toggle per unit tag. Owned by the top-level view and
/// not persisted; units the state has never seen default to enabled.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    units: HashMap<String, bool>,
}

impl FilterState {
    /// All units of the document enabled.
    pub fn all_enabled(doc: &GraphDocument) -> Self {
        Self {
            units: doc.units().into_iter().map(|u| (u.to_string(), true)).collect(),
        }
    }

    pub fn set_enabled(&mut self, unit: &str, enabled: bool) {
        self.units.insert(unit.to_string(), enabled);
    }

    pub fn toggle(&mut self, unit: &str) {
        let current = self.is_enabled(unit);
        self.units.insert(unit.to_string(), !current);
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.units.get(unit).copied().unwrap_or(true)
    }
}

/// Visible node ids: unit enabled, or no unit tag at all.
pub fn visible_nodes(doc: &GraphDocument, state: &FilterState) -> HashSet<String> {
    doc.nodes()
        .iter()
        .filter(|n| n.unit.as_deref().map(|u| state.is_enabled(u)).unwrap_or(true))
        .map(|n| n.id.clone())
        .collect()
}

/// Visible relations: both endpoints visible. Returned as indices into
/// `doc.relations()`.
pub fn visible_relations(doc: &GraphDocument, state: &FilterState) -> Vec<usize> {
    let nodes = visible_nodes(doc, state);
    doc.relations()
        .iter()
        .enumerate()
        .filter(|(_, r)| nodes.contains(&r.source) && nodes.contains(&r.target))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> GraphDocument {
        let json = serde_json::json!({
            "nodes": [
                {"data": {"id": "a", "unit": "unit1"}},
                {"data": {"id": "b", "unit": "unit1"}},
                {"data": {"id": "c", "unit": "unit2"}},
                {"data": {"id": "d"}}
            ],
            "edges": [
                {"data": {"source": "a", "target": "b"}},
                {"data": {"source": "b", "target": "c"}},
                {"data": {"source": "c", "target": "d"}},
                {"data": {"source": "a", "target": "d"}}
            ]
        });
        GraphDocument::parse(&json.to_string()).unwrap()
    }

    #[test]
    fn test_all_visible_by_default() {
        let doc = doc();
        let state = FilterState::all_enabled(&doc);
        assert_eq!(visible_nodes(&doc, &state).len(), 4);
        assert_eq!(visible_relations(&doc, &state).len(), 4);
    }

    #[test]
    fn test_disabled_unit_hides_nodes_and_touching_relations() {
        let doc = doc();
        let mut state = FilterState::all_enabled(&doc);
        state.set_enabled("unit2", false);

        let nodes = visible_nodes(&doc, &state);
        assert!(nodes.contains("a") && nodes.contains("b"));
        assert!(!nodes.contains("c"));
        // Untagged node stays visible.
        assert!(nodes.contains("d"));

        // Every relation touching "c" disappears.
        let relations = visible_relations(&doc, &state);
        assert_eq!(relations, vec![0, 3]);
    }

    #[test]
    fn test_unknown_unit_defaults_enabled() {
        let state = FilterState::default();
        assert!(state.is_enabled("unit9"));
    }

    #[test]
    fn test_toggle_round_trips() {
        let doc = doc();
        let mut state = FilterState::all_enabled(&doc);
        state.toggle("unit1");
        assert!(!state.is_enabled("unit1"));
        assert_eq!(visible_nodes(&doc, &state).len(), 2);
        state.toggle("unit1");
        assert_eq!(visible_nodes(&doc, &state).len(), 4);
    }
}
