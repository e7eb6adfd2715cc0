//! Memoized force-directed layout.
//!
//! Positions are computed once per process from a seeded Fruchterman-Reingold
//! pass over the FULL, unfiltered graph, then reused by every later mount.
//! That keeps node positions visually stable across view changes and makes
//! the filter a pure hide/show: unaffected nodes never move. The cache is
//! derived data — safe to discard and recompute.

use crate::graph::GraphDocument;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub width: f32,
    pub height: f32,
    pub iterations: usize,
    /// Fixed seed: the same document always lays out the same way.
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            iterations: 300,
            seed: 0x5eed,
        }
    }
}

pub type LayoutCache = HashMap<String, Position>;

/// One Fruchterman-Reingold pass. Deterministic for a given (document, seed).
pub fn compute_layout(doc: &GraphDocument, config: &LayoutConfig) -> LayoutCache {
    let nodes = doc.nodes();
    let n = nodes.len();
    if n == 0 {
        return LayoutCache::new();
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut pos: Vec<(f32, f32)> = (0..n)
        .map(|_| {
            (
                rng.gen_range(0.0..config.width),
                rng.gen_range(0.0..config.height),
            )
        })
        .collect();

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();
    let edges: Vec<(usize, usize)> = doc
        .relations()
        .iter()
        .map(|r| (index[r.source.as_str()], index[r.target.as_str()]))
        .collect();

    let area = config.width * config.height;
    let k = (area / n as f32).sqrt();
    let mut temperature = config.width / 10.0;
    let cooling = temperature / (config.iterations as f32 + 1.0);

    let mut disp = vec![(0.0f32, 0.0f32); n];
    for _ in 0..config.iterations {
        for d in disp.iter_mut() {
            *d = (0.0, 0.0);
        }

        // Repulsion between every pair.
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = pos[i].0 - pos[j].0;
                let dy = pos[i].1 - pos[j].1;
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let force = k * k / dist;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                disp[i].0 += fx;
                disp[i].1 += fy;
                disp[j].0 -= fx;
                disp[j].1 -= fy;
            }
        }

        // Attraction along relations.
        for &(a, b) in &edges {
            let dx = pos[a].0 - pos[b].0;
            let dy = pos[a].1 - pos[b].1;
            let dist = (dx * dx + dy * dy).sqrt().max(0.01);
            let force = dist * dist / k;
            let (fx, fy) = (dx / dist * force, dy / dist * force);
            disp[a].0 -= fx;
            disp[a].1 -= fy;
            disp[b].0 += fx;
            disp[b].1 += fy;
        }

        // Displace, capped by temperature, clamped to the frame.
        for i in 0..n {
            let (dx, dy) = disp[i];
            let len = (dx * dx + dy * dy).sqrt().max(0.01);
            let step = len.min(temperature);
            pos[i].0 = (pos[i].0 + dx / len * step).clamp(0.0, config.width);
            pos[i].1 = (pos[i].1 + dy / len * step).clamp(0.0, config.height);
        }
        temperature = (temperature - cooling).max(0.0);
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            (
                node.id.clone(),
                Position {
                    x: pos[i].0,
                    y: pos[i].1,
                },
            )
        })
        .collect()
}

static LAYOUT: OnceLock<LayoutCache> = OnceLock::new();

/// Positions for the bundled document, computed on first call and reused for
/// the rest of the process lifetime.
pub fn memoized(doc: &GraphDocument) -> &'static LayoutCache {
    LAYOUT.get_or_init(|| {
        println!("[LAYOUT] computing initial layout for {} nodes", doc.nodes().len());
        compute_layout(doc, &LayoutConfig::default())
    })
}
