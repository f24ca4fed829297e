//! HNSW (Hierarchical Navigable Small World) approximate nearest-neighbour
//! graph over unit vectors.
//!
//! Stores vectors keyed by chunk id and answers top-k queries by cosine
//! distance. Removal is a soft delete: the node stays in the graph for
//! navigation but never appears in results. Queries over small graphs, or
//! with filters that reject most candidates, fall back to an exact scan so
//! results are always complete.
//!
//! # Performance
//! - Insert: O(log N) average
//! - Search: O(log N) average
//! - Memory: O(N × M)

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::embedding::cosine_distance;

/// Graphs at or below this size are scanned exactly.
const EXACT_SCAN_THRESHOLD: usize = 256;
/// Highest layer a node can be assigned to.
const MAX_LEVEL: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    slot: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug)]
struct Node {
    id: i64,
    vector: Vec<f32>,
    /// Neighbour slots per layer, `0..=level`.
    neighbors: Vec<Vec<usize>>,
    deleted: bool,
}

/// HNSW graph keyed by `i64` ids.
#[derive(Debug)]
pub struct AnnIndex {
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f64,
    nodes: Vec<Node>,
    slots: HashMap<i64, usize>,
    entry: Option<usize>,
    max_level: usize,
    live: usize,
    rng_state: u64,
}

impl Default for AnnIndex {
    fn default() -> Self {
        Self::new(16, 200, 64)
    }
}

impl AnnIndex {
    /// Create an empty graph.
    ///
    /// * `m`: neighbours per node per layer (layer 0 keeps `2 × m`).
    /// * `ef_construction`: beam width while inserting.
    /// * `ef_search`: minimum beam width while querying.
    pub fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        let m = m.max(2);
        Self {
            m,
            m_max0: m * 2,
            ef_construction: ef_construction.max(1),
            ef_search: ef_search.max(1),
            level_mult: 1.0 / (m as f64).ln(),
            nodes: Vec::new(),
            slots: HashMap::new(),
            entry: None,
            max_level: 0,
            live: 0,
            rng_state: 42,
        }
    }

    /// Number of live (not removed) vectors.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: i64) -> bool {
        self.slots
            .get(&id)
            .map(|&s| !self.nodes[s].deleted)
            .unwrap_or(false)
    }

    /// Add a vector. Re-inserting an existing id replaces its vector.
    pub fn insert(&mut self, id: i64, vector: Vec<f32>) {
        if self.slots.contains_key(&id) {
            self.remove(id);
            self.slots.remove(&id);
        }

        let level = self.select_level();
        let slot = self.nodes.len();
        self.nodes.push(Node {
            id,
            vector,
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.slots.insert(id, slot);
        self.live += 1;

        let Some(mut ep) = self.entry else {
            self.entry = Some(slot);
            self.max_level = level;
            return;
        };

        let query = self.nodes[slot].vector.clone();

        let mut layer = self.max_level;
        while layer > level {
            ep = self.greedy_closest(ep, &query, layer);
            layer -= 1;
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(ep, &query, self.ef_construction, layer);
            let limit = if layer == 0 { self.m_max0 } else { self.m };
            let selected: Vec<usize> = found
                .iter()
                .filter(|c| c.slot != slot)
                .take(limit)
                .map(|c| c.slot)
                .collect();

            for &neighbor in &selected {
                self.connect(slot, neighbor, layer);
                self.connect(neighbor, slot, layer);
                self.prune(neighbor, layer, limit);
            }

            if let Some(best) = found.first() {
                ep = best.slot;
            }
        }

        if level > self.max_level {
            self.entry = Some(slot);
            self.max_level = level;
        }
    }

    /// Soft-delete a vector. Returns `true` if it was live.
    pub fn remove(&mut self, id: i64) -> bool {
        match self.slots.get(&id) {
            Some(&slot) if !self.nodes[slot].deleted => {
                self.nodes[slot].deleted = true;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Return up to `k` live `(id, cosine_distance)` pairs accepted by
    /// `filter`, ordered by ascending distance.
    pub fn search<F>(&self, query: &[f32], k: usize, filter: F) -> Vec<(i64, f32)>
    where
        F: Fn(i64) -> bool,
    {
        if k == 0 || self.live == 0 {
            return Vec::new();
        }

        if self.live <= EXACT_SCAN_THRESHOLD {
            return self.exact_search(query, k, &filter);
        }

        let Some(mut ep) = self.entry else {
            return Vec::new();
        };
        for layer in (1..=self.max_level).rev() {
            ep = self.greedy_closest(ep, query, layer);
        }

        let ef = self.ef_search.max(k * 4);
        let results: Vec<(i64, f32)> = self
            .search_layer(ep, query, ef, 0)
            .into_iter()
            .filter(|c| {
                let node = &self.nodes[c.slot];
                !node.deleted && filter(node.id)
            })
            .take(k)
            .map(|c| (self.nodes[c.slot].id, c.distance))
            .collect();

        if results.len() < k {
            // The beam did not surface enough accepted vectors (selective
            // filter or heavy deletion); answer exactly instead.
            return self.exact_search(query, k, &filter);
        }
        results
    }

    fn exact_search(&self, query: &[f32], k: usize, filter: &dyn Fn(i64) -> bool) -> Vec<(i64, f32)> {
        let mut hits: Vec<(i64, f32)> = self
            .nodes
            .iter()
            .filter(|n| !n.deleted && filter(n.id))
            .map(|n| (n.id, cosine_distance(query, &n.vector)))
            .collect();
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        hits
    }

    /// Draw a level from the exponential distribution with a deterministic LCG.
    fn select_level(&mut self) -> usize {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = ((self.rng_state >> 11) as f64 / (1u64 << 53) as f64).max(1e-12);
        ((-r.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }

    fn distance(&self, slot: usize, query: &[f32]) -> f32 {
        cosine_distance(query, &self.nodes[slot].vector)
    }

    fn greedy_closest(&self, mut current: usize, query: &[f32], layer: usize) -> usize {
        let mut best = self.distance(current, query);
        loop {
            let mut changed = false;
            if let Some(neighbors) = self.nodes[current].neighbors.get(layer) {
                for &n in neighbors {
                    let d = self.distance(n, query);
                    if d < best {
                        best = d;
                        current = n;
                        changed = true;
                    }
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Beam search within one layer. Returns candidates by ascending distance.
    fn search_layer(&self, entry: usize, query: &[f32], ef: usize, layer: usize) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        let start = Candidate {
            distance: self.distance(entry, query),
            slot: entry,
        };
        visited.insert(entry);
        frontier.push(Reverse(start));
        best.push(start);

        while let Some(Reverse(current)) = frontier.pop() {
            let worst = best.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
            if current.distance > worst && best.len() >= ef {
                break;
            }

            let Some(neighbors) = self.nodes[current.slot].neighbors.get(layer) else {
                continue;
            };
            for &n in neighbors {
                if !visited.insert(n) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance(n, query),
                    slot: n,
                };
                let worst = best.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
                if best.len() < ef || candidate.distance < worst {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        let mut out = best.into_vec();
        out.sort();
        out
    }

    fn connect(&mut self, from: usize, to: usize, layer: usize) {
        let node = &mut self.nodes[from];
        while node.neighbors.len() <= layer {
            node.neighbors.push(Vec::new());
        }
        if !node.neighbors[layer].contains(&to) {
            node.neighbors[layer].push(to);
        }
    }

    fn prune(&mut self, slot: usize, layer: usize, limit: usize) {
        if self.nodes[slot].neighbors[layer].len() <= limit {
            return;
        }
        let base = self.nodes[slot].vector.clone();
        let mut scored: Vec<Candidate> = self.nodes[slot].neighbors[layer]
            .iter()
            .map(|&n| Candidate {
                distance: self.distance(n, &base),
                slot: n,
            })
            .collect();
        scored.sort();
        self.nodes[slot].neighbors[layer] = scored.into_iter().take(limit).map(|c| c.slot).collect();
    }
}
