//! The reduction engine (SPEC_FULL.md §4.2): a pipeline of width-preserving
//! graph reductions applied to a fix-point, producing a residual kernel
//! graph plus the partial elimination it performed along the way.
//!
//! Every rule's action bottoms out in a single `eliminate_vertex` call: a
//! degree-0/1 vertex has no pairs left to clique, and a simplicial vertex's
//! neighborhood is already a clique, so "delete" and "eliminate" coincide
//! for those rules. That means the bag each rule would produce is exactly
//! the bag `TreeDecomposition::from_elimination_permutation` derives for a
//! vertex at its position in an elimination order — so the canonical glue
//! (SPEC_FULL.md §9) is just running that reconstruction over the
//! concatenation of this engine's permutation and the kernel's own.
//! `glue_via_permutation` takes that fast path whenever the kernel itself
//! was solved down to a flat elimination permutation. When the kernel was
//! instead solved atom-by-atom and stitched back together by separator
//! (SPEC_FULL.md §4.7), there is no single permutation for it — the
//! composed decomposition's bags have to be grafted onto the reduction's
//! own bags directly, which is what `glue_general` does.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;
use log::{debug, trace};

use crate::config::SolverConfig;
use crate::decomposition::tree::TreeDecomposition;
use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;

/// Output of a reduction run: the residual kernel, the order in which
/// vertices were removed (an elimination permutation over the vertices
/// that left the graph), the bag each removal produced, the highest
/// lower-bound raise observed, and whether the graph reduced away entirely.
pub struct ReductionResult {
    pub kernel: CanonicalGraph,
    pub permutation: Vec<VertexId>,
    pub bags: Vec<Vec<VertexId>>,
    pub lower_bound_raise: usize,
    pub fully_reduced: bool,
}

/// Runs the rule pipeline of SPEC_FULL.md §4.2 to a fix-point. `lower_bound`
/// gates the Almost-simplicial rule, which only fires when the candidate's
/// degree does not exceed it (a degree above the already-known lower bound
/// cannot make the decomposition any narrower than an exact solve would
/// anyway, so eliminating it early would just be extra, unguarded work).
/// Checks `config`'s cancellation flag once per fix-point iteration
/// (SPEC_FULL.md §5), returning whatever has been reduced so far.
pub fn reduce(graph: &CanonicalGraph, lower_bound: usize, config: &SolverConfig) -> ReductionResult {
    let mut working = graph.clone();
    let mut permutation = Vec::new();
    let mut bags = Vec::new();
    let mut lower_bound_raise = 0usize;

    let mut queue: VecDeque<VertexId> = VecDeque::new();
    let mut queued = FixedBitSet::with_capacity(working.capacity());
    for v in working.vertices().collect::<Vec<_>>() {
        if working.degree(v) <= 2 {
            queue.push_back(v);
            queued.insert(v.index());
        }
    }
    drain_low_degree(
        &mut working,
        &mut queue,
        &mut queued,
        &mut permutation,
        &mut bags,
        &mut lower_bound_raise,
    );

    loop {
        if config.is_cancelled() {
            debug!("reduction: cancelled mid fix-point, {} vertices left in kernel", working.vertex_count());
            break;
        }
        let next = find_triangle(&working)
            .map(|v| (v, 4))
            .or_else(|| find_buddy(&working).map(|v| (v, 4)))
            .or_else(|| find_cube(&working).map(|v| (v, 4)))
            .or_else(|| {
                let none = FixedBitSet::with_capacity(working.capacity());
                working.simplicial_vertex(&none).map(|v| (v, working.degree(v)))
            })
            .or_else(|| find_guarded_almost_simplicial(&working, lower_bound).map(|(v, _w)| (v, 0)));

        let Some((v, raise)) = next else {
            break;
        };
        trace!("reduction: rule firing on vertex {v}, lower-bound raise {raise}");
        apply_elimination(
            &mut working,
            v,
            raise,
            &mut permutation,
            &mut bags,
            &mut lower_bound_raise,
            &mut queue,
            &mut queued,
        );
        drain_low_degree(
            &mut working,
            &mut queue,
            &mut queued,
            &mut permutation,
            &mut bags,
            &mut lower_bound_raise,
        );
    }

    let fully_reduced = working.vertex_count() == 0;
    debug!(
        "reduction: {} -> {} vertices, lower bound raised to {lower_bound_raise}, fully reduced: {fully_reduced}",
        graph.vertex_count(),
        working.vertex_count()
    );
    ReductionResult {
        kernel: working,
        permutation,
        bags,
        lower_bound_raise,
        fully_reduced,
    }
}

fn drain_low_degree(
    working: &mut CanonicalGraph,
    queue: &mut VecDeque<VertexId>,
    queued: &mut FixedBitSet,
    permutation: &mut Vec<VertexId>,
    bags: &mut Vec<Vec<VertexId>>,
    lower_bound_raise: &mut usize,
) {
    while let Some(v) = queue.pop_front() {
        queued.set(v.index(), false);
        if !working.is_alive(v) {
            continue;
        }
        let deg = working.degree(v);
        if deg > 2 {
            continue;
        }
        // Isolated: raise 1; Leaf: raise 2; Series: raise 3.
        let raise = match deg {
            0 => 1,
            1 => 2,
            _ => 3,
        };
        apply_elimination(working, v, raise, permutation, bags, lower_bound_raise, queue, queued);
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_elimination(
    working: &mut CanonicalGraph,
    v: VertexId,
    raise: usize,
    permutation: &mut Vec<VertexId>,
    bags: &mut Vec<Vec<VertexId>>,
    lower_bound_raise: &mut usize,
    queue: &mut VecDeque<VertexId>,
    queued: &mut FixedBitSet,
) {
    let neighbors: Vec<VertexId> = working.neighbors(v).collect();
    let mut bag = neighbors.clone();
    bag.push(v);
    working.eliminate_vertex(v);
    permutation.push(v);
    bags.push(bag);
    *lower_bound_raise = (*lower_bound_raise).max(raise);
    for n in neighbors {
        if working.is_alive(n) && working.degree(n) <= 2 && !queued.contains(n.index()) {
            queue.push_back(n);
            queued.insert(n.index());
        }
    }
}

/// Degree-3 vertex with at least one edge among its neighbors.
fn find_triangle(working: &CanonicalGraph) -> Option<VertexId> {
    working
        .vertices()
        .find(|&v| working.degree(v) == 3 && working.edges_in_neighborhood(v) >= 1)
}

/// Two non-adjacent degree-3 vertices with the same open neighborhood:
/// only one (the lower-indexed one) needs eliminating, the other is left
/// for the kernel (or a later pass, once the shared neighborhood shrinks).
fn find_buddy(working: &CanonicalGraph) -> Option<VertexId> {
    working
        .twin_decomposition(false)
        .into_iter()
        .filter(|class| class.len() >= 2 && working.degree(class[0]) == 3)
        .map(|class| *class.iter().min_by_key(|v| v.index()).unwrap())
        .min_by_key(|v| v.index())
}

/// Degree-3 vertex `v` with an independent neighborhood `{a,b,c}` (so
/// Triangle does not already apply) for which a fourth vertex `d` is
/// adjacent to all of `a,b,c` — the "cube corner" pattern of SPEC_FULL.md
/// §4.2. `d`'s existence is only used to pick *when* eliminating `v` is
/// profitable; eliminating it is always safe regardless (standard
/// elimination never increases the decomposition's width beyond `deg(v)`),
/// so unlike the source's "adjusted neighborhood" shortcut this always
/// cliques the full neighborhood rather than inferring which of the three
/// edges `d` already makes redundant.
fn find_cube(working: &CanonicalGraph) -> Option<VertexId> {
    for v in working.vertices() {
        if working.degree(v) != 3 || working.edges_in_neighborhood(v) != 0 {
            continue;
        }
        let nb: Vec<VertexId> = working.neighbors(v).collect();
        let has_opposite_corner = working
            .vertices()
            .any(|d| d != v && nb.iter().all(|&x| working.has_edge(d, x)));
        if has_opposite_corner {
            return Some(v);
        }
    }
    None
}

/// Like `CanonicalGraph::almost_simplicial_vertex`, but additionally
/// requires `deg(v) <= lower_bound` (SPEC_FULL.md §4.2's guard column),
/// which the generic kernel query has no notion of.
fn find_guarded_almost_simplicial(working: &CanonicalGraph, lower_bound: usize) -> Option<(VertexId, VertexId)> {
    let none = FixedBitSet::with_capacity(working.capacity());
    let mut forbidden = none.clone();
    loop {
        let (v, w) = working.almost_simplicial_vertex(&forbidden)?;
        if working.degree(v) <= lower_bound {
            return Some((v, w));
        }
        forbidden.insert(v.index());
    }
}

/// Permutation-based glue (SPEC_FULL.md §9): appends the kernel's own
/// elimination permutation after this engine's, and rebuilds the whole
/// decomposition from the concatenation in one pass.
pub fn glue_via_permutation(
    graph: &CanonicalGraph,
    reduction: &ReductionResult,
    kernel_permutation: &[VertexId],
) -> TreeDecomposition {
    let mut full = reduction.permutation.clone();
    full.extend_from_slice(kernel_permutation);
    TreeDecomposition::from_elimination_permutation(graph, &full)
}

/// General-purpose glue (SPEC_FULL.md §4.2/§9): pops `bags` in reverse
/// creation order and attaches each as a new bag adjacent to any existing
/// bag that contains all but at most one of its vertices, or as an
/// unattached fresh leaf if none qualifies. This is the only glue that
/// works when `kernel_decomposition` was assembled from several
/// independently solved atoms rather than a single permutation.
pub fn glue_general(mut kernel_decomposition: TreeDecomposition, bags: &[Vec<VertexId>]) -> TreeDecomposition {
    for bag_vertices in bags.iter().rev() {
        let existing_ids: Vec<_> = kernel_decomposition.bag_ids().collect();
        let mut best = None;
        for id in existing_ids {
            let missing = bag_vertices
                .iter()
                .filter(|&&v| !kernel_decomposition.bag(id).contains(v))
                .count();
            if missing <= 1 {
                best = Some(id);
                break;
            }
        }
        let new_id = kernel_decomposition.add_bag(bag_vertices.iter().copied());
        if let Some(existing) = best {
            kernel_decomposition.add_tree_edge(new_id, existing);
        }
    }
    kernel_decomposition
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> CanonicalGraph {
        let edges = (0..n - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1)));
        CanonicalGraph::from_edges(n, edges)
    }

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

    #[test]
    fn path_fully_reduces_via_low_degree_rules_alone() {
        let g = path(6);
        let config = SolverConfig::with_seed(0);
        let result = reduce(&g, 0, &config);
        assert!(result.fully_reduced);
        assert_eq!(result.permutation.len(), 6);
        let td = glue_via_permutation(&g, &result, &[]);
        assert_eq!(td.width(), 1);
        td.verify(&g).unwrap();
    }

    #[test]
    fn clique_is_untouched_by_reduction_until_down_to_the_kernel() {
        // Every vertex of a clique is simplicial, so reduction removes the
        // whole thing one vertex at a time without ever raising width
        // beyond n-1.
        let g = clique(4);
        let config = SolverConfig::with_seed(0);
        let result = reduce(&g, 3, &config);
        assert!(result.fully_reduced);
        let td = glue_via_permutation(&g, &result, &[]);
        assert_eq!(td.width(), 3);
        td.verify(&g).unwrap();
    }

    #[test]
    fn two_triangles_sharing_an_edge_reduce_to_width_two() {
        // SPEC_FULL.md §8 end-to-end scenario 4.
        let mut g = CanonicalGraph::new(6);
        let edges = [(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (3, 5), (4, 5)];
        for (u, v) in edges {
            g.add_edge(VertexId::new(u), VertexId::new(v));
        }
        let config = SolverConfig::with_seed(0);
        let result = reduce(&g, 0, &config);
        assert!(result.fully_reduced);
        let td = glue_via_permutation(&g, &result, &[]);
        assert_eq!(td.width(), 2);
        td.verify(&g).unwrap();
    }

    #[test]
    fn fallback_glue_agrees_with_canonical_glue_on_width() {
        let g = cycle(6);
        let config = SolverConfig::with_seed(0);
        let result = reduce(&g, 0, &config);
        let canonical = glue_via_permutation(&g, &result, &[]);
        let fallback = glue_general(TreeDecomposition::new(g.capacity()), &result.bags);
        assert_eq!(canonical.width(), fallback.width());
    }

    #[test]
    fn reduction_is_idempotent_on_the_residual_kernel() {
        let g = clique(4);
        let config = SolverConfig::with_seed(0);
        let first = reduce(&g, 3, &config);
        assert!(first.fully_reduced);
        // Re-reducing the (empty) kernel changes nothing further.
        let second = reduce(&first.kernel, 3, &config);
        assert!(second.fully_reduced);
        assert!(second.permutation.is_empty());
    }

    #[test]
    fn cancellation_stops_the_fix_point_early() {
        // A clique's vertices all have degree n-1 > 2, so the low-degree
        // BFS is a no-op and every elimination happens inside the
        // cancellable fix-point loop via the Simplicial rule.
        let g = clique(5);
        let config = SolverConfig::with_seed(0);
        config.cancellation().cancel();
        let result = reduce(&g, 4, &config);
        assert!(!result.fully_reduced);
        assert_eq!(result.kernel.vertex_count(), 5);
    }

    #[test]
    fn almost_simplicial_guard_blocks_high_degree_candidates() {
        // a's neighborhood {b,c,d} minus witness d is a clique (b-c edge
        // present), but deg(a) = 3 exceeds a lower bound of 1, so the rule
        // must not fire even though the pattern matches.
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
        let found = find_guarded_almost_simplicial(&g, 1);
        assert!(found.is_none());
        let found = find_guarded_almost_simplicial(&g, 3);
        assert_eq!(found, Some((a, d)));
    }
}
