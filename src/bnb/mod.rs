//! Memoized branch-and-bound decomposer over elimination orders
//! (SPEC_FULL.md §3, §4.4).

use std::collections::HashMap;

use ahash::RandomState;
use fixedbitset::FixedBitSet;
use log::{debug, trace};

use crate::bounds::minor_min_width;
use crate::config::SolverConfig;
use crate::decomposition::tree::TreeDecomposition;
use crate::error::{BudgetKind, Error};
use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;

/// A branch-and-bound search node. Equality and hashing are defined over
/// `eliminated` only (SPEC_FULL.md §3, §9): the future cost of a node
/// depends solely on which vertices remain, not on how they were reached.
#[derive(Debug, Clone)]
struct SearchKey(FixedBitSet);

impl PartialEq for SearchKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for SearchKey {}

impl std::hash::Hash for SearchKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for block in self.0.as_slice() {
            block.hash(state);
        }
    }
}

/// Outcome of a completed (sub-)search: the best remaining width found from
/// that node downward, and the vertex that was branched on to achieve it
/// (used to reconstruct the full permutation afterward).
#[derive(Debug, Clone, Copy)]
struct MemoEntry {
    remaining_width: usize,
    chosen_vertex: Option<VertexId>,
}

pub struct BranchAndBound<'a> {
    kernel: CanonicalGraph,
    config: &'a mut SolverConfig,
    memo: HashMap<SearchKey, MemoEntry, RandomState>,
    upper_bound: usize,
    best_permutation: Vec<VertexId>,
    clique: Vec<VertexId>,
    cancelled: bool,
}

/// Result of an exact run: the proven width (may equal the initial upper
/// bound if the budget ran out before improving it), the permutation that
/// achieves it, and whether the search was interrupted before proving
/// optimality (SPEC_FULL.md §7 cancellation-as-sentinel policy).
pub struct ExactResult {
    pub width: usize,
    pub permutation: Vec<VertexId>,
    pub cancelled: bool,
}

impl<'a> BranchAndBound<'a> {
    pub fn new(kernel: &CanonicalGraph, config: &'a mut SolverConfig) -> Self {
        Self {
            kernel: kernel.clone(),
            config,
            memo: HashMap::default(),
            upper_bound: usize::MAX,
            best_permutation: Vec::new(),
            clique: Vec::new(),
            cancelled: false,
        }
    }

    /// Runs the full search: initializes `ub` via min-fill and `lb` via
    /// minor-min-width, launches the search only if they differ, and
    /// returns the anytime-best permutation with its proven/achieved width.
    pub fn solve(mut self) -> ExactResult {
        let (initial_perm, initial_width) = crate::bounds::min_fill(&self.kernel, self.config, false);
        self.upper_bound = initial_width;
        self.best_permutation = initial_perm;
        debug!("b&b: initial upper bound {initial_width} from min-fill");

        let lb = minor_min_width(&self.kernel, self.config);
        if lb >= self.upper_bound {
            debug!("b&b: lower bound {lb} already matches upper bound, skipping search");
            let width = self.upper_bound;
            return self.finish(width);
        }

        self.clique = approximate_max_clique(&self.kernel);
        let mut working = self.kernel.clone();
        let eliminated = FixedBitSet::with_capacity(working.capacity());
        let mut companion: HashMap<SearchKey, VertexId, RandomState> = HashMap::default();
        let mut order = Vec::new();

        let found = self.search(&mut working, eliminated, None, 0, &mut companion, &mut order);
        if let Some(width) = found {
            if width < self.upper_bound {
                self.upper_bound = width;
                if let Some(perm) =
                    reconstruct_permutation(&self.kernel, &companion, self.kernel.vertex_count())
                {
                    self.best_permutation = perm;
                }
            }
        }
        let width = self.upper_bound;
        debug!("b&b: search finished, width {width}, cancelled {}", self.cancelled);
        self.finish(width)
    }

    fn finish(self, width: usize) -> ExactResult {
        ExactResult {
            width,
            permutation: self.best_permutation,
            cancelled: self.cancelled,
        }
    }

    /// Recursive search over elimination orders (SPEC_FULL.md §4.4). Returns
    /// the best remaining width found from this node, or `None` if every
    /// branch exceeded the current upper bound / the search was cancelled.
    #[allow(clippy::too_many_arguments)]
    fn search(
        &mut self,
        working: &mut CanonicalGraph,
        eliminated: FixedBitSet,
        current_vertex: Option<VertexId>,
        width_so_far: usize,
        companion: &mut HashMap<SearchKey, VertexId, RandomState>,
        _order_scratch: &mut Vec<VertexId>,
    ) -> Option<usize> {
        if self.config.is_cancelled() {
            self.cancelled = true;
            return None;
        }
        if working.vertex_count() == 0 {
            // SPEC_FULL.md §4.4 step 1: a leaf is a solution. The companion
            // table only has entries for ancestors that have already
            // returned (they're filled in post-order on the way back up),
            // so the permutation itself can't be reconstructed from here
            // yet — `solve()` does that once the full search returns —
            // but tightening `ub` immediately still sharpens every sibling
            // branch's pruning for the remainder of this search.
            if width_so_far < self.upper_bound {
                trace!("b&b: leaf improves upper bound to {width_so_far}");
                self.upper_bound = width_so_far;
            }
            return Some(width_so_far);
        }
        if width_so_far >= self.upper_bound {
            return None;
        }
        // minor-min-width is a lower bound on the width still to come;
        // combined with what's already been paid this prunes branches that
        // cannot beat `ub` regardless of future choices.
        if minor_min_width(working, self.config).max(width_so_far) >= self.upper_bound {
            return None;
        }

        let key = SearchKey(eliminated.clone());
        trace!("b&b: visiting node with {} eliminated, width so far {width_so_far}", eliminated.count_ones(..));
        if let Some(entry) = self.memo.get(&key) {
            return Some(entry.remaining_width);
        }

        let added = apply_edge_addition_rule(working, self.upper_bound);

        let children = self.branch_candidates(working, current_vertex);
        if children.is_empty() {
            revert_edge_addition(working, &added);
            self.memo.insert(
                key,
                MemoEntry {
                    remaining_width: width_so_far,
                    chosen_vertex: None,
                },
            );
            return Some(width_so_far);
        }

        let mut best: Option<(usize, VertexId)> = None;
        for v in children {
            let info = working.eliminate_vertex(v);
            let mut child_eliminated = eliminated.clone();
            child_eliminated.insert(v.index());
            let child_width = width_so_far.max(info.bag_width());

            if let Some(remaining) = self.search(
                working,
                child_eliminated,
                Some(v),
                child_width,
                companion,
                _order_scratch,
            ) {
                let candidate = remaining.max(info.bag_width());
                if best.map_or(true, |(w, _)| candidate < w) {
                    best = Some((candidate, v));
                }
            }
            working.de_eliminate_vertex(&info);
            if self.config.is_cancelled() {
                self.cancelled = true;
                break;
            }
        }

        revert_edge_addition(working, &added);

        match best {
            Some((width, vertex)) => {
                companion.insert(key.clone(), vertex);
                self.memo.insert(
                    key,
                    MemoEntry {
                        remaining_width: width,
                        chosen_vertex: Some(vertex),
                    },
                );
                Some(width)
            }
            None => None,
        }
    }

    /// Branching rule of SPEC_FULL.md §4.4 step 5: simplicial, else
    /// almost-simplicial, else one representative per twin class (skipping
    /// the symmetry-breaking clique and the current vertex's neighbors),
    /// else force-branch on a clique vertex.
    fn branch_candidates(
        &self,
        working: &CanonicalGraph,
        current_vertex: Option<VertexId>,
    ) -> Vec<VertexId> {
        let forbidden = clique_bitset(working, &self.clique);

        if let Some(v) = working.simplicial_vertex(&forbidden) {
            return vec![v];
        }
        if let Some((v, _w)) = working.almost_simplicial_vertex(&forbidden) {
            return vec![v];
        }

        let true_twins = working.twin_decomposition(true);
        let false_twins = working.twin_decomposition(false);
        let twins = if true_twins.len() >= false_twins.len() {
            true_twins
        } else {
            false_twins
        };

        let current_neighbors: FixedBitSet = current_vertex
            .map(|cv| working.neighbor_bitset(cv).clone())
            .unwrap_or_else(|| FixedBitSet::with_capacity(working.capacity()));

        // twin_decomposition partitions the vertex set into disjoint classes,
        // so at most one representative is ever picked per class here —
        // no separate dedup against already-chosen representatives is needed.
        let mut representatives: Vec<VertexId> = Vec::new();
        for class in &twins {
            for &candidate in class {
                if forbidden.contains(candidate.index())
                    || current_neighbors.contains(candidate.index())
                {
                    continue;
                }
                representatives.push(candidate);
                break;
            }
        }

        if representatives.is_empty() {
            for &v in &self.clique {
                if working.is_alive(v) {
                    return vec![v];
                }
            }
            // Nothing left to branch on but the residual graph is
            // nonempty and has no simplicial/almost-simplicial/twin
            // candidate outside the clique: any alive vertex keeps the
            // search terminating.
            if let Some(v) = working.vertices().next() {
                return vec![v];
            }
            return Vec::new();
        }

        representatives.sort_by(|&a, &b| {
            working
                .fill_in(b)
                .cmp(&working.fill_in(a))
                .then(a.index().cmp(&b.index()))
        });
        representatives
    }
}

fn clique_bitset(working: &CanonicalGraph, clique: &[VertexId]) -> FixedBitSet {
    let mut bs = FixedBitSet::with_capacity(working.capacity());
    for &v in clique {
        bs.insert(v.index());
    }
    bs
}

/// For every non-adjacent pair whose common-neighbor count exceeds `ub + 1`
/// and whose smaller degree exceeds `ub`, adds the edge (SPEC_FULL.md §4.4
/// step 4). Returns the added edges so the caller can reverse them.
fn apply_edge_addition_rule(working: &mut CanonicalGraph, ub: usize) -> Vec<(VertexId, VertexId)> {
    let vertices: Vec<VertexId> = working.vertices().collect();
    let mut added = Vec::new();
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let (u, v) = (vertices[i], vertices[j]);
            if working.has_edge(u, v) {
                continue;
            }
            let common = working.common_neighbor_count(u, v);
            let smaller_degree = working.degree(u).min(working.degree(v));
            if common > ub + 1 && smaller_degree > ub && working.add_edge(u, v) {
                added.push((u, v));
            }
        }
    }
    added
}

fn revert_edge_addition(working: &mut CanonicalGraph, added: &[(VertexId, VertexId)]) {
    for &(u, v) in added.iter().rev() {
        working.remove_edge(u, v);
    }
}

/// A cheap maximum-clique approximation (greedy extension from the
/// highest-degree vertex), used purely for symmetry breaking; it need not
/// be exact since any clique found is sound to eliminate last.
pub(crate) fn approximate_max_clique(graph: &CanonicalGraph) -> Vec<VertexId> {
    let mut vertices: Vec<VertexId> = graph.vertices().collect();
    vertices.sort_by_key(|&v| std::cmp::Reverse(graph.degree(v)));
    let mut clique = Vec::new();
    for v in vertices {
        if clique.iter().all(|&u| graph.has_edge(u, v)) {
            clique.push(v);
        }
    }
    clique
}

/// Reconstructs the elimination permutation from the companion table
/// (SPEC_FULL.md §4.4.3): starting from the empty bitset, repeatedly looks
/// up the next chosen vertex and appends it. Returns `None` if a lookup
/// fails before every vertex is placed (the search never improved the
/// initial upper bound).
fn reconstruct_permutation(
    kernel: &CanonicalGraph,
    companion: &HashMap<SearchKey, VertexId, RandomState>,
    n: usize,
) -> Option<Vec<VertexId>> {
    let mut eliminated = FixedBitSet::with_capacity(kernel.capacity());
    let mut permutation = Vec::with_capacity(n);
    loop {
        if permutation.len() == n {
            return Some(permutation);
        }
        let key = SearchKey(eliminated.clone());
        let &v = companion.get(&key)?;
        permutation.push(v);
        eliminated.insert(v.index());
    }
}

/// Convenience entry point: solves `kernel` exactly and returns the
/// resulting decomposition alongside the achieved width.
pub fn solve_exact(kernel: &CanonicalGraph, config: &mut SolverConfig) -> (TreeDecomposition, ExactResult) {
    let result = BranchAndBound::new(kernel, config).solve();
    let td = TreeDecomposition::from_elimination_permutation(kernel, &result.permutation);
    (td, result)
}

/// SPEC_FULL.md §5's heuristic estimate for the memoization table's
/// worst-case size: one entry per size-`ub` subset of the `n` kernel
/// vertices, each costing roughly `n + 32` bits (the bitset itself plus
/// bookkeeping).
pub fn estimated_memory_bytes(n: usize, ub: usize) -> u128 {
    let ub = ub.min(n) as u128;
    binomial(n as u128, ub).saturating_mul(n as u128 + 32) / 8
}

fn binomial(n: u128, k: u128) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        result = result.saturating_mul(n - i) / (i + 1);
    }
    result
}

/// Checks the B&B memoization table's estimated memory against `config`'s
/// budget, returning `Error::BudgetExceeded` when the caller should abandon
/// the exact path in favor of the heuristic one (SPEC_FULL.md §5, §7).
pub fn check_memory_budget(n: usize, ub: usize, config: &SolverConfig) -> crate::error::Result<()> {
    let estimate = estimated_memory_bytes(n, ub);
    if estimate > config.memory_budget_bytes() as u128 {
        return Err(Error::BudgetExceeded { kind: BudgetKind::Memory });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(n: usize) -> CanonicalGraph {
        let mut edges: Vec<_> = (0..n - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1))).collect();
        edges.push((VertexId::new(n - 1), VertexId::new(0)));
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

    fn grid3x3() -> CanonicalGraph {
        let mut g = CanonicalGraph::new(9);
        let idx = |r: usize, c: usize| r * 3 + c;
        for r in 0..3 {
            for c in 0..3 {
                if c + 1 < 3 {
                    g.add_edge(VertexId::new(idx(r, c)), VertexId::new(idx(r, c + 1)));
                }
                if r + 1 < 3 {
                    g.add_edge(VertexId::new(idx(r, c)), VertexId::new(idx(r + 1, c)));
                }
            }
        }
        g
    }

    #[test]
    fn clique_solves_immediately_at_n_minus_one() {
        let g = clique(5);
        let mut cfg = SolverConfig::with_seed(1);
        let (td, result) = solve_exact(&g, &mut cfg);
        assert_eq!(result.width, 4);
        assert_eq!(td.width(), 4);
    }

    #[test]
    fn cycle_five_has_width_two() {
        let g = cycle(5);
        let mut cfg = SolverConfig::with_seed(1);
        let (td, result) = solve_exact(&g, &mut cfg);
        assert_eq!(result.width, 2);
        td.verify(&g).unwrap();
    }

    #[test]
    fn grid_3x3_has_width_three() {
        let g = grid3x3();
        let mut cfg = SolverConfig::with_seed(2);
        let (td, result) = solve_exact(&g, &mut cfg);
        assert_eq!(result.width, 3);
        td.verify(&g).unwrap();
    }

    #[test]
    fn cancelled_search_still_returns_a_valid_decomposition() {
        let g = grid3x3();
        let mut cfg = SolverConfig::with_seed(3);
        cfg.cancellation().cancel();
        let (td, result) = solve_exact(&g, &mut cfg);
        assert!(result.cancelled);
        td.verify(&g).unwrap();
    }

    #[test]
    fn memory_estimate_grows_with_vertex_count() {
        assert!(estimated_memory_bytes(40, 10) > estimated_memory_bytes(20, 10));
    }

    #[test]
    fn memory_budget_check_passes_within_budget() {
        let cfg = SolverConfig::with_seed(1).with_memory_budget_bytes(1 << 30);
        assert!(check_memory_budget(20, 10, &cfg).is_ok());
    }

    #[test]
    fn memory_budget_check_reports_budget_exceeded() {
        let cfg = SolverConfig::with_seed(1).with_memory_budget_bytes(16);
        let err = check_memory_budget(60, 30, &cfg).unwrap_err();
        match err {
            Error::BudgetExceeded { kind } => assert_eq!(kind, BudgetKind::Memory),
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
    }
}
