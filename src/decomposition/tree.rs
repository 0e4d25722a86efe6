//! `TreeDecomposition`: a graph of `Bag`s connected by tree edges.
//!
//! Modeled as a stable node/edge-indexed graph, the same wrapping style the
//! teacher uses for `graph/undirected/adjacent_list.rs`'s `AdjacentListGraph`
//! over `petgraph::stable_graph::StableUnGraph`: removing and reattaching
//! bags during gluing and post-processing never invalidates another bag's
//! identity. `BagId`s are monotonic and independent of the underlying
//! `NodeIndex`, which a `StableUnGraph` may recycle after a removal.

use std::collections::HashMap;

use ahash::RandomState;
use fixedbitset::FixedBitSet;
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;

use crate::decomposition::bag::Bag;
use crate::error::{Error, Result};
use crate::graph::kernel::CanonicalGraph;
use crate::ids::{BagId, VertexId};

#[derive(Clone)]
pub struct TreeDecomposition {
    graph: StableUnGraph<Bag, (), usize>,
    index_of: HashMap<BagId, NodeIndex<usize>, RandomState>,
    next_id: usize,
    capacity: usize,
}

impl TreeDecomposition {
    pub fn new(capacity: usize) -> Self {
        Self {
            graph: StableUnGraph::with_capacity(0, 0),
            index_of: HashMap::default(),
            next_id: 0,
            capacity,
        }
    }

    /// The empty decomposition consisting of a single empty bag, the
    /// canonical result for the empty graph (SPEC_FULL.md §8 boundary case).
    pub fn trivial() -> Self {
        let mut td = Self::new(0);
        td.add_bag(std::iter::empty());
        td
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bag_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Max bag size minus one, or `-1` for the empty decomposition.
    pub fn width(&self) -> isize {
        self.graph
            .node_weights()
            .map(|b| b.len() as isize)
            .max()
            .map_or(-1, |m| m - 1)
    }

    pub fn add_bag(&mut self, vertices: impl IntoIterator<Item = VertexId>) -> BagId {
        let id = BagId::new(self.next_id);
        self.next_id += 1;
        let bag = Bag::from_vertices(id, self.capacity, vertices);
        let idx = self.graph.add_node(bag);
        self.index_of.insert(id, idx);
        id
    }

    pub fn add_tree_edge(&mut self, a: BagId, b: BagId) {
        let (ia, ib) = (self.index_of[&a], self.index_of[&b]);
        if !self.graph.contains_edge(ia, ib) {
            self.graph.add_edge(ia, ib, ());
        }
    }

    pub fn remove_tree_edge(&mut self, a: BagId, b: BagId) {
        let (ia, ib) = (self.index_of[&a], self.index_of[&b]);
        if let Some(e) = self.graph.find_edge(ia, ib) {
            self.graph.remove_edge(e);
        }
    }

    pub fn remove_bag(&mut self, id: BagId) -> Bag {
        let idx = self.index_of.remove(&id).expect("bag id must exist");
        self.graph.remove_node(idx).expect("node must exist")
    }

    pub fn bag(&self, id: BagId) -> &Bag {
        &self.graph[self.index_of[&id]]
    }

    pub fn bag_mut(&mut self, id: BagId) -> &mut Bag {
        let idx = self.index_of[&id];
        &mut self.graph[idx]
    }

    pub fn bag_ids(&self) -> impl Iterator<Item = BagId> + '_ {
        self.graph.node_weights().map(|b| b.id())
    }

    pub fn bags(&self) -> impl Iterator<Item = &Bag> + '_ {
        self.graph.node_weights()
    }

    pub fn neighbors(&self, id: BagId) -> impl Iterator<Item = BagId> + '_ {
        let idx = self.index_of[&id];
        self.graph
            .neighbors(idx)
            .map(move |n| self.graph[n].id())
    }

    pub fn tree_edges(&self) -> impl Iterator<Item = (BagId, BagId)> + '_ {
        self.graph
            .edge_references()
            .map(move |e| (self.graph[e.source()].id(), self.graph[e.target()].id()))
    }

    pub fn contains_tree_edge(&self, a: BagId, b: BagId) -> bool {
        let (ia, ib) = (self.index_of[&a], self.index_of[&b]);
        self.graph.find_edge(ia, ib).is_some()
    }

    /// Builds the decomposition induced by an elimination permutation
    /// (SPEC_FULL.md §3): each eliminated vertex gets a bag of `{v} ∪ N(v)`
    /// at the moment of elimination, connected to the bag of the next
    /// eliminated vertex that still appears in it.
    pub fn from_elimination_permutation(graph: &CanonicalGraph, permutation: &[VertexId]) -> Self {
        let mut working = graph.clone();
        let mut td = Self::new(graph.capacity());
        let mut bag_of_vertex: HashMap<VertexId, BagId, RandomState> = HashMap::default();
        let mut order = Vec::with_capacity(permutation.len());

        for &v in permutation {
            if !working.is_alive(v) {
                continue;
            }
            let mut members: Vec<VertexId> = working.neighbors(v).collect();
            members.push(v);
            let id = td.add_bag(members.iter().copied());
            bag_of_vertex.insert(v, id);
            order.push((v, id));
            working.eliminate_vertex(v);
        }

        for (i, &(v, id)) in order.iter().enumerate() {
            // Find the earliest later-eliminated vertex whose original bag
            // (fixed at elimination time) still contains `v`'s closed
            // neighborhood member set; this is exactly "the bag of the
            // next-eliminated vertex that appears in it" (SPEC_FULL.md §3).
            for &(_, later_id) in &order[(i + 1)..] {
                if td.bag(later_id).contains(v) {
                    td.add_tree_edge(id, later_id);
                    break;
                }
            }
        }
        td
    }

    /// Verifies the three decomposition invariants of SPEC_FULL.md §8
    /// against the original `graph`. Used only in tests and by callers that
    /// want a defensive check before trusting an externally produced
    /// decomposition.
    pub fn verify(&self, graph: &CanonicalGraph) -> Result<()> {
        let mut covered = FixedBitSet::with_capacity(graph.capacity());
        for bag in self.bags() {
            for v in bag.vertices() {
                covered.insert(v.index());
            }
        }
        for v in graph.vertices() {
            if !covered.contains(v.index()) {
                return Err(Error::InvariantViolation(format!(
                    "vertex {v} is not covered by any bag"
                )));
            }
        }

        for u in graph.vertices() {
            for v in graph.neighbors(u) {
                if v.index() <= u.index() {
                    continue;
                }
                let covered_edge = self
                    .bags()
                    .any(|b| b.contains(u) && b.contains(v));
                if !covered_edge {
                    return Err(Error::InvariantViolation(format!(
                        "edge {{{u}, {v}}} is not covered by any bag"
                    )));
                }
            }
        }

        for v in graph.vertices() {
            let containing: Vec<BagId> = self
                .bags()
                .filter(|b| b.contains(v))
                .map(|b| b.id())
                .collect();
            if containing.is_empty() {
                continue;
            }
            if !self.induced_subtree_is_connected(&containing) {
                return Err(Error::InvariantViolation(format!(
                    "bags containing vertex {v} do not form a connected subtree"
                )));
            }
        }
        Ok(())
    }

    /// The first bag (if any) that contains every vertex in `vertices`.
    /// Used to find the attachment point when stitching together the
    /// independently-solved decompositions of connected components or
    /// clique-separated atoms (SPEC_FULL.md §2, §4.7).
    pub fn find_bag_superset_of(&self, vertices: &[VertexId]) -> Option<BagId> {
        self.bags()
            .find(|b| vertices.iter().all(|&v| b.contains(v)))
            .map(|b| b.id())
    }

    /// Inserts every bag and tree edge of `other` into `self` under fresh
    /// `BagId`s (disjoint from `self`'s own), without connecting the two
    /// pieces. Returns the mapping from `other`'s old ids to their new ids
    /// so the caller can add the stitching tree edge itself. `other`'s
    /// vertex universe must not exceed `self.capacity()`.
    pub fn merge_disjoint(&mut self, other: TreeDecomposition) -> HashMap<BagId, BagId> {
        let mut mapping = HashMap::default();
        for bag in other.bags() {
            let new_id = self.add_bag(bag.vertices());
            mapping.insert(bag.id(), new_id);
        }
        for (a, b) in other.tree_edges() {
            self.add_tree_edge(mapping[&a], mapping[&b]);
        }
        mapping
    }

    fn induced_subtree_is_connected(&self, ids: &[BagId]) -> bool {
        if ids.len() <= 1 {
            return true;
        }
        let set: std::collections::HashSet<BagId> = ids.iter().copied().collect();
        let mut visited = std::collections::HashSet::new();
        let start = ids[0];
        let mut stack = vec![start];
        visited.insert(start);
        while let Some(b) = stack.pop() {
            for n in self.neighbors(b) {
                if set.contains(&n) && !visited.contains(&n) {
                    visited.insert(n);
                    stack.push(n);
                }
            }
        }
        visited.len() == ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> CanonicalGraph {
        let edges = (0..n - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1)));
        CanonicalGraph::from_edges(n, edges)
    }

    #[test]
    fn trivial_decomposition_has_width_minus_one() {
        let td = TreeDecomposition::trivial();
        assert_eq!(td.width(), -1);
        assert_eq!(td.bag_count(), 1);
    }

    #[test]
    fn path_permutation_yields_width_one() {
        let g = path(4);
        let perm: Vec<VertexId> = (0..4).map(VertexId::new).collect();
        let td = TreeDecomposition::from_elimination_permutation(&g, &perm);
        assert_eq!(td.width(), 1);
        td.verify(&g).unwrap();
    }

    #[test]
    fn clique_permutation_yields_single_bag() {
        let mut g = CanonicalGraph::new(4);
        for i in 0..4 {
            for j in (i + 1)..4 {
                g.add_edge(VertexId::new(i), VertexId::new(j));
            }
        }
        let perm: Vec<VertexId> = (0..4).map(VertexId::new).collect();
        let td = TreeDecomposition::from_elimination_permutation(&g, &perm);
        assert_eq!(td.width(), 3);
        td.verify(&g).unwrap();
    }

    #[test]
    fn verify_rejects_uncovered_edge() {
        let g = path(3);
        let mut td = TreeDecomposition::new(3);
        td.add_bag([VertexId::new(0)]);
        assert!(td.verify(&g).is_err());
    }
}
