//! The mutable undirected working graph.
//!
//! Vertices live in a fixed `0..capacity` id space (Design Notes:
//! "contiguous integer ids 0..n-1"); "deleting" a vertex only clears its
//! `alive` bit and its adjacency, it never reuses or reshuffles ids. Every
//! adjacency query is an O(1) bitset test and every mutation keeps
//! `edges_in_neighborhood` exactly up to date, the same invariant the
//! teacher's low-level graphs keep for their own bookkeeping counters
//! (`graph/directed/tree_backed.rs`'s parallel `in_edges`/`out_edges`
//! indices), but specialized here to bitsets per SPEC_FULL.md §3/§9.

use fixedbitset::FixedBitSet;

use crate::ids::VertexId;

/// Reversal record for `eliminate_vertex`. Reapplying it via
/// `de_eliminate_vertex` restores the graph bit-identically.
#[derive(Debug, Clone)]
pub struct EliminationInfo {
    pub vertex: VertexId,
    pub neighbors: FixedBitSet,
    pub added_edges: Vec<(VertexId, VertexId)>,
}

impl EliminationInfo {
    /// The width contributed by this elimination step: the bag is
    /// `{vertex} ∪ neighbors`.
    pub fn bag_width(&self) -> usize {
        self.neighbors.count_ones(..)
    }
}

#[derive(Clone)]
pub struct CanonicalGraph {
    capacity: usize,
    alive: FixedBitSet,
    adjacency: Vec<FixedBitSet>,
    degree: Vec<usize>,
    edges_in_neighborhood: Vec<usize>,
    edge_count: usize,
}

impl CanonicalGraph {
    pub fn new(n: usize) -> Self {
        Self {
            capacity: n,
            alive: {
                let mut bs = FixedBitSet::with_capacity(n);
                bs.set_range(.., true);
                bs
            },
            adjacency: vec![FixedBitSet::with_capacity(n); n],
            degree: vec![0; n],
            edges_in_neighborhood: vec![0; n],
            edge_count: 0,
        }
    }

    pub fn from_edges<I: IntoIterator<Item = (VertexId, VertexId)>>(n: usize, edges: I) -> Self {
        let mut g = Self::new(n);
        for (u, v) in edges {
            g.add_edge(u, v);
        }
        g
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vertex_count(&self) -> usize {
        self.alive.count_ones(..)
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_alive(&self, v: VertexId) -> bool {
        self.alive.contains(v.index())
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.alive.ones().map(VertexId::new)
    }

    pub fn degree(&self, v: VertexId) -> usize {
        self.degree[v.index()]
    }

    pub fn neighbors(&self, v: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.adjacency[v.index()].ones().map(VertexId::new)
    }

    pub fn neighbor_bitset(&self, v: VertexId) -> &FixedBitSet {
        &self.adjacency[v.index()]
    }

    /// `N[v]`: `v` together with its neighbors.
    pub fn closed_neighborhood_bitset(&self, v: VertexId) -> FixedBitSet {
        let mut bs = self.adjacency[v.index()].clone();
        bs.insert(v.index());
        bs
    }

    pub fn has_edge(&self, u: VertexId, v: VertexId) -> bool {
        u != v && self.adjacency[u.index()].contains(v.index())
    }

    /// Idempotent: returns whether a new edge was actually added.
    pub fn add_edge(&mut self, u: VertexId, v: VertexId) -> bool {
        if u == v || self.has_edge(u, v) {
            return false;
        }
        debug_assert!(self.is_alive(u) && self.is_alive(v));
        // Every z currently adjacent to both u and v gains one edge inside
        // its own neighborhood. u and v themselves also gain one internal
        // edge for each such z, since v (resp. u) is now a neighbor of u
        // (resp. v) that z already connects to.
        let common: FixedBitSet = {
            let mut c = self.adjacency[u.index()].clone();
            c.intersect_with(&self.adjacency[v.index()]);
            c
        };
        let shared = common.count_ones(..);
        for z in common.ones() {
            self.edges_in_neighborhood[z] += 1;
        }
        self.edges_in_neighborhood[u.index()] += shared;
        self.edges_in_neighborhood[v.index()] += shared;
        self.adjacency[u.index()].insert(v.index());
        self.adjacency[v.index()].insert(u.index());
        self.degree[u.index()] += 1;
        self.degree[v.index()] += 1;
        self.edge_count += 1;
        true
    }

    /// Idempotent: returns whether an edge was actually removed.
    pub fn remove_edge(&mut self, u: VertexId, v: VertexId) -> bool {
        if !self.has_edge(u, v) {
            return false;
        }
        let common: FixedBitSet = {
            let mut c = self.adjacency[u.index()].clone();
            c.intersect_with(&self.adjacency[v.index()]);
            c
        };
        let shared = common.count_ones(..);
        for z in common.ones() {
            self.edges_in_neighborhood[z] -= 1;
        }
        self.edges_in_neighborhood[u.index()] -= shared;
        self.edges_in_neighborhood[v.index()] -= shared;
        self.adjacency[u.index()].set(v.index(), false);
        self.adjacency[v.index()].set(u.index(), false);
        self.degree[u.index()] -= 1;
        self.degree[v.index()] -= 1;
        self.edge_count -= 1;
        true
    }

    /// Deletes `v` and all incident edges, without touching its neighbors'
    /// mutual adjacency (used by the Isolated/Leaf reduction rules, which
    /// never clique the neighborhood). Returns the neighbors `v` had.
    pub fn remove_vertex(&mut self, v: VertexId) -> Vec<VertexId> {
        let neighbors: Vec<VertexId> = self.neighbors(v).collect();
        for &x in &neighbors {
            self.remove_edge(v, x);
        }
        self.alive.set(v.index(), false);
        neighbors
    }

    pub fn edges_in_neighborhood(&self, v: VertexId) -> usize {
        self.edges_in_neighborhood[v.index()]
    }

    /// Missing edges within `N(v)`: the cost of cliquing `v`'s neighborhood.
    pub fn fill_in(&self, v: VertexId) -> usize {
        let d = self.degree(v);
        d * d.saturating_sub(1) / 2 - self.edges_in_neighborhood(v)
    }

    pub fn is_simplicial(&self, v: VertexId) -> bool {
        self.fill_in(v) == 0
    }

    /// Any simplicial vertex not in `forbidden`, or `None`.
    pub fn simplicial_vertex(&self, forbidden: &FixedBitSet) -> Option<VertexId> {
        self.vertices()
            .find(|&v| !forbidden.contains(v.index()) && self.is_simplicial(v))
    }

    /// A vertex `v` is almost-simplicial w.r.t. `w` iff `N(v) \ {w}` is a
    /// clique. Returns `(v, w)` for the first such `v` outside `forbidden`
    /// that has a *unique* witness `w` (SPEC_FULL.md §4.1).
    pub fn almost_simplicial_vertex(&self, forbidden: &FixedBitSet) -> Option<(VertexId, VertexId)> {
        'outer: for v in self.vertices() {
            if forbidden.contains(v.index()) || self.is_simplicial(v) {
                continue;
            }
            let neighbors: Vec<VertexId> = self.neighbors(v).collect();
            let mut witness = None;
            for &w in &neighbors {
                if self.is_clique_except(&neighbors, w) {
                    if witness.is_some() {
                        // More than one witness: not "almost-simplicial"
                        // under the spec's unique-witness reading.
                        continue 'outer;
                    }
                    witness = Some(w);
                }
            }
            if let Some(w) = witness {
                return Some((v, w));
            }
        }
        None
    }

    /// Whether `neighbors \ {except}` forms a clique.
    fn is_clique_except(&self, neighbors: &[VertexId], except: VertexId) -> bool {
        for i in 0..neighbors.len() {
            if neighbors[i] == except {
                continue;
            }
            for j in (i + 1)..neighbors.len() {
                if neighbors[j] == except {
                    continue;
                }
                if !self.has_edge(neighbors[i], neighbors[j]) {
                    return false;
                }
            }
        }
        true
    }

    /// Turns `N(v)` into a clique and deletes `v`. Returns a reversal record.
    pub fn eliminate_vertex(&mut self, v: VertexId) -> EliminationInfo {
        let neighbors = self.adjacency[v.index()].clone();
        let neighbor_list: Vec<VertexId> = neighbors.ones().map(VertexId::new).collect();
        let mut added_edges = Vec::new();
        for i in 0..neighbor_list.len() {
            for j in (i + 1)..neighbor_list.len() {
                if self.add_edge(neighbor_list[i], neighbor_list[j]) {
                    added_edges.push((neighbor_list[i], neighbor_list[j]));
                }
            }
        }
        for &x in &neighbor_list {
            self.remove_edge(v, x);
        }
        self.alive.set(v.index(), false);
        EliminationInfo {
            vertex: v,
            neighbors,
            added_edges,
        }
    }

    /// Reverses an `eliminate_vertex` call, restoring the graph
    /// bit-identically (SPEC_FULL.md §3/§8 round-trip law).
    pub fn de_eliminate_vertex(&mut self, info: &EliminationInfo) {
        self.alive.set(info.vertex.index(), true);
        for x in info.neighbors.ones() {
            self.add_edge(info.vertex, VertexId::new(x));
        }
        for &(x, y) in info.added_edges.iter().rev() {
            self.remove_edge(x, y);
        }
    }

    /// Merges `v` into `u`: every neighbor of `v` (other than `u`) becomes a
    /// neighbor of `u`, parallel edges are naturally deduplicated by the
    /// adjacency bitset, and `v` is deleted.
    pub fn contract(&mut self, u: VertexId, v: VertexId) {
        let v_neighbors: Vec<VertexId> = self.neighbors(v).collect();
        for x in v_neighbors {
            if x != u {
                self.add_edge(u, x);
            }
        }
        self.remove_vertex(v);
    }

    /// Partitions the alive vertex set into twin classes: vertices sharing
    /// the same open neighborhood (`false` twins) or the same closed
    /// neighborhood (`true` twins). Singleton classes are omitted.
    pub fn twin_decomposition(&self, true_twins: bool) -> Vec<Vec<VertexId>> {
        use std::collections::HashMap;
        let mut classes: HashMap<Vec<u32>, Vec<VertexId>> = HashMap::new();
        for v in self.vertices() {
            let bs = if true_twins {
                self.closed_neighborhood_bitset(v)
            } else {
                self.adjacency[v.index()].clone()
            };
            let key: Vec<u32> = bs.ones().map(|x| x as u32).collect();
            classes.entry(key).or_default().push(v);
        }
        classes.into_values().filter(|c| c.len() > 1).collect()
    }

    /// Number of vertices adjacent to both `u` and `v` (used by the
    /// edge-addition rule and the neighbor-improved lower bound).
    pub fn common_neighbor_count(&self, u: VertexId, v: VertexId) -> usize {
        let mut c = self.adjacency[u.index()].clone();
        c.intersect_with(&self.adjacency[v.index()]);
        c.count_ones(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> CanonicalGraph {
        let edges = (0..n - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1)));
        CanonicalGraph::from_edges(n, edges)
    }

    fn clique(n: usize) -> CanonicalGraph {
        let mut edges = vec![];
        for i in 0..n {
            for j in (i + 1)..n {
                edges.push((VertexId::new(i), VertexId::new(j)));
            }
        }
        CanonicalGraph::from_edges(n, edges)
    }

    #[test]
    fn add_edge_is_idempotent() {
        let mut g = CanonicalGraph::new(3);
        assert!(g.add_edge(VertexId::new(0), VertexId::new(1)));
        assert!(!g.add_edge(VertexId::new(0), VertexId::new(1)));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.degree(VertexId::new(0)), 1);
    }

    #[test]
    fn edges_in_neighborhood_tracks_triangle() {
        let mut g = CanonicalGraph::new(3);
        let (a, b, c) = (VertexId::new(0), VertexId::new(1), VertexId::new(2));
        g.add_edge(a, b);
        g.add_edge(b, c);
        assert_eq!(g.edges_in_neighborhood(b), 0);
        g.add_edge(a, c);
        // a and c are both now neighbors of b, and of each other.
        assert_eq!(g.edges_in_neighborhood(b), 1);
        assert!(g.is_simplicial(a));
        assert!(g.is_simplicial(b));
        assert!(g.is_simplicial(c));
    }

    #[test]
    fn fill_in_counts_missing_edges() {
        let mut g = CanonicalGraph::new(4);
        let (a, b, c, d) = (
            VertexId::new(0),
            VertexId::new(1),
            VertexId::new(2),
            VertexId::new(3),
        );
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(a, d);
        // N(a) = {b,c,d}, none adjacent to each other: fill-in 3.
        assert_eq!(g.fill_in(a), 3);
        g.add_edge(b, c);
        assert_eq!(g.fill_in(a), 2);
    }

    #[test]
    fn eliminate_then_de_eliminate_round_trips() {
        let mut g = path(5);
        let before = g.clone();
        let v = VertexId::new(2);
        let info = g.eliminate_vertex(v);
        assert!(!g.is_alive(v));
        g.de_eliminate_vertex(&info);
        assert!(g.is_alive(v));
        for u in before.vertices() {
            assert_eq!(
                g.neighbor_bitset(u).ones().collect::<Vec<_>>(),
                before.neighbor_bitset(u).ones().collect::<Vec<_>>()
            );
            assert_eq!(g.edges_in_neighborhood(u), before.edges_in_neighborhood(u));
            assert_eq!(g.degree(u), before.degree(u));
        }
        assert_eq!(g.edge_count(), before.edge_count());
    }

    #[test]
    fn eliminating_interior_path_vertex_cliques_its_two_neighbors() {
        let mut g = path(5);
        let v = VertexId::new(2);
        let info = g.eliminate_vertex(v);
        assert_eq!(info.bag_width(), 2);
        assert!(g.has_edge(VertexId::new(1), VertexId::new(3)));
    }

    #[test]
    fn clique_vertices_are_all_simplicial() {
        let g = clique(5);
        let forbidden = FixedBitSet::with_capacity(5);
        for v in g.vertices() {
            assert!(g.is_simplicial(v));
        }
        assert!(g.simplicial_vertex(&forbidden).is_some());
    }

    #[test]
    fn almost_simplicial_detects_star_plus_one_missing_edge() {
        // a-b, a-c, a-d, b-c (triangle a,b,c) but d not adjacent to b or c.
        let mut g = CanonicalGraph::new(4);
        let (a, b, c, d) = (
            VertexId::new(0),
            VertexId::new(1),
            VertexId::new(2),
            VertexId::new(3),
        );
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(a, d);
        g.add_edge(b, c);
        let forbidden = FixedBitSet::with_capacity(4);
        let (v, w) = g.almost_simplicial_vertex(&forbidden).unwrap();
        assert_eq!(v, a);
        assert_eq!(w, d);
    }

    #[test]
    fn contract_merges_neighborhoods_without_parallel_edges() {
        let mut g = path(4); // 0-1-2-3
        g.contract(VertexId::new(0), VertexId::new(1));
        assert!(!g.is_alive(VertexId::new(1)));
        assert!(g.has_edge(VertexId::new(0), VertexId::new(2)));
        assert_eq!(g.degree(VertexId::new(0)), 1);
    }

    #[test]
    fn twin_decomposition_groups_false_twins() {
        // star: center c, leaves a,b,d all only adjacent to c -> false twins.
        let mut g = CanonicalGraph::new(4);
        let (c, a, b, d) = (
            VertexId::new(0),
            VertexId::new(1),
            VertexId::new(2),
            VertexId::new(3),
        );
        g.add_edge(c, a);
        g.add_edge(c, b);
        g.add_edge(c, d);
        let classes = g.twin_decomposition(false);
        assert_eq!(classes.len(), 1);
        let mut class = classes[0].clone();
        class.sort();
        assert_eq!(class, vec![a, b, d]);
    }

    #[test]
    fn remove_vertex_deletes_without_cliquing() {
        let mut g = path(3);
        g.remove_vertex(VertexId::new(1));
        assert!(!g.has_edge(VertexId::new(0), VertexId::new(2)));
        assert_eq!(g.vertex_count(), 2);
    }
}
