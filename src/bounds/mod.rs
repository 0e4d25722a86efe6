//! Upper/lower bound heuristics (SPEC_FULL.md §4.3): min-width, min-fill
//! (+ sparsest-subgraph), stochastic min-fill, minor-min-width, degeneracy,
//! and the optional improved-graph lower bound.

use ahash::RandomState;
use keyed_priority_queue::KeyedPriorityQueue;
use log::{debug, trace};
use rand::Rng;

use crate::config::{ContractionStrategy, SolverConfig};
use crate::decomposition::tree::TreeDecomposition;
use crate::graph::flow::vertex_disjoint_path_count;
use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;

/// Repeatedly removes a vertex of minimum current degree (ties broken via
/// the injected RNG), returning the elimination permutation and its induced
/// width. The teacher's topological sort keeps a priority queue of live
/// degrees (`algorithm/toposort.rs`); min-width does the same over an
/// undirected working copy.
pub fn min_width(graph: &CanonicalGraph, config: &mut SolverConfig) -> (Vec<VertexId>, usize) {
    let mut working = graph.clone();
    let mut queue = degree_queue(&working);
    let mut permutation = Vec::with_capacity(working.vertex_count());
    let mut width = 0usize;

    while let Some(v) = pop_min_with_ties(&mut queue, &working, config, |g, v| g.degree(v)) {
        width = width.max(working.degree(v));
        let affected: Vec<VertexId> = working.neighbors(v).collect();
        working.remove_vertex(v);
        for u in affected {
            if queue.get_priority(&u).is_some() {
                queue.set_priority(&u, std::cmp::Reverse(working.degree(u))).ok();
            }
        }
        permutation.push(v);
    }
    (permutation, width)
}

/// Repeatedly eliminates a vertex of minimum fill-in (or, in the
/// sparsest-subgraph variant, breaking ties by edges within `N(v)`).
/// Returns the permutation and induced width.
pub fn min_fill(
    graph: &CanonicalGraph,
    config: &mut SolverConfig,
    sparsest_subgraph_tiebreak: bool,
) -> (Vec<VertexId>, usize) {
    let mut working = graph.clone();
    let mut permutation = Vec::with_capacity(working.vertex_count());
    let mut width = 0usize;

    while working.vertex_count() > 0 {
        let v = pick_min_fill_vertex(&working, config, sparsest_subgraph_tiebreak);
        width = width.max(working.degree(v));
        working.eliminate_vertex(v);
        permutation.push(v);
    }
    (permutation, width)
}

fn pick_min_fill_vertex(
    working: &CanonicalGraph,
    config: &mut SolverConfig,
    sparsest_subgraph_tiebreak: bool,
) -> VertexId {
    let mut best_fill = usize::MAX;
    let mut candidates: Vec<VertexId> = Vec::new();
    for v in working.vertices() {
        let fill = working.fill_in(v);
        match fill.cmp(&best_fill) {
            std::cmp::Ordering::Less => {
                best_fill = fill;
                candidates.clear();
                candidates.push(v);
            }
            std::cmp::Ordering::Equal => candidates.push(v),
            std::cmp::Ordering::Greater => {}
        }
    }
    if candidates.len() == 1 {
        return candidates[0];
    }
    if sparsest_subgraph_tiebreak {
        let mut best_edges = usize::MAX;
        let mut narrowed = Vec::new();
        for &v in &candidates {
            let edges = working.edges_in_neighborhood(v);
            match edges.cmp(&best_edges) {
                std::cmp::Ordering::Less => {
                    best_edges = edges;
                    narrowed.clear();
                    narrowed.push(v);
                }
                std::cmp::Ordering::Equal => narrowed.push(v),
                std::cmp::Ordering::Greater => {}
            }
        }
        candidates = narrowed;
    }
    let idx = config.rng().gen_range(0..candidates.len());
    candidates[idx]
}

/// Runs `min(n, 100)` independent min-fill passes (alternating the plain and
/// sparsest-subgraph tie-break rules), keeping the best permutation, and
/// returns its decomposition alongside the induced width. Checks
/// `config`'s cancellation flag before each pass (SPEC_FULL.md §4.3, §7):
/// on cancellation the best permutation found among completed passes is
/// returned.
pub fn stochastic_min_fill(graph: &CanonicalGraph, config: &mut SolverConfig) -> (TreeDecomposition, usize) {
    let (perm, width) = stochastic_min_fill_permutation(graph, config);
    let td = TreeDecomposition::from_elimination_permutation(graph, &perm);
    (td, width)
}

/// Same anytime search as `stochastic_min_fill`, returning the winning
/// permutation directly instead of its decomposition — the shape the
/// pipeline/driver needs when it still has to concatenate a preceding
/// reduction permutation before gluing (SPEC_FULL.md §4.2/§4.7).
pub fn stochastic_min_fill_permutation(graph: &CanonicalGraph, config: &mut SolverConfig) -> (Vec<VertexId>, usize) {
    let passes = graph.vertex_count().min(100).max(1);

    // Seed the anytime result with a single min-width pass: it's the
    // cheapest of the heuristics (one priority-queue pass, no fill-in
    // bookkeeping), so a cancellation during the very first min-fill pass
    // still leaves the driver with a valid, if weaker, upper bound.
    let (seed_perm, seed_width) = min_width(graph, config);
    debug!("stochastic min-fill: seeded from min-width at width {seed_width}");
    let mut best: Option<(Vec<VertexId>, usize)> = Some((seed_perm, seed_width));

    for i in 0..passes {
        if config.is_cancelled() {
            break;
        }
        let sparsest = i % 2 == 1;
        let (perm, width) = min_fill(graph, config, sparsest);
        if best.as_ref().map_or(true, |(_, w)| width < *w) {
            trace!("stochastic min-fill: pass {i} improves width to {width}");
            best = Some((perm, width));
        }
    }

    best.unwrap_or_else(|| {
        let perm: Vec<VertexId> = graph.vertices().collect();
        (perm, graph.vertex_count().saturating_sub(1))
    })
}

/// Lower bound via repeated minimum-degree contraction (SPEC_FULL.md
/// §4.3): select a vertex of minimum positive degree, record its degree,
/// contract it into a neighbor chosen per `strategy`, and return the
/// largest degree ever recorded.
pub fn minor_min_width(graph: &CanonicalGraph, config: &mut SolverConfig) -> usize {
    let mut working = graph.clone();
    let mut bound = 0usize;
    let strategy = config.contraction_strategy();

    loop {
        let candidates: Vec<VertexId> = working
            .vertices()
            .filter(|&v| working.degree(v) > 0)
            .collect();
        if candidates.is_empty() {
            break;
        }
        let min_degree = candidates.iter().map(|&v| working.degree(v)).min().unwrap();
        let min_degree_vertices: Vec<VertexId> = candidates
            .iter()
            .copied()
            .filter(|&v| working.degree(v) == min_degree)
            .collect();
        let v = min_degree_vertices[config.rng().gen_range(0..min_degree_vertices.len())];
        if working.degree(v) > bound {
            bound = working.degree(v);
            trace!("minor-min-width: bound raised to {bound}");
        }

        let u = choose_contraction_partner(&working, v, strategy, config);
        working.contract(u, v);
    }
    bound
}

fn choose_contraction_partner(
    working: &CanonicalGraph,
    v: VertexId,
    strategy: ContractionStrategy,
    config: &mut SolverConfig,
) -> VertexId {
    let neighbors: Vec<VertexId> = working.neighbors(v).collect();
    debug_assert!(!neighbors.is_empty());
    match strategy {
        ContractionStrategy::MinDegree => *neighbors
            .iter()
            .min_by_key(|&&u| working.degree(u))
            .unwrap(),
        ContractionStrategy::MaxDegree => *neighbors
            .iter()
            .max_by_key(|&&u| working.degree(u))
            .unwrap(),
        ContractionStrategy::LeastCommonNeighbors => {
            let min_common = neighbors
                .iter()
                .map(|&u| working.common_neighbor_count(v, u))
                .min()
                .unwrap();
            let tied: Vec<VertexId> = neighbors
                .iter()
                .copied()
                .filter(|&u| working.common_neighbor_count(v, u) == min_common)
                .collect();
            tied[config.rng().gen_range(0..tied.len())]
        }
    }
}

/// Repeatedly removes a minimum-degree vertex; returns the maximum degree
/// ever observed at removal time (SPEC_FULL.md §4.3).
pub fn degeneracy_lower_bound(graph: &CanonicalGraph) -> usize {
    let mut working = graph.clone();
    let mut bound = 0usize;
    while working.vertex_count() > 0 {
        let v = working
            .vertices()
            .min_by_key(|&v| working.degree(v))
            .unwrap();
        bound = bound.max(working.degree(v));
        working.remove_vertex(v);
    }
    bound
}

/// Which witness the improved-graph lower bound uses to add edges.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ImprovementKind {
    NeighborImproved,
    PathImproved,
}

/// Builds the "improved graph" `H`: every non-adjacent pair with at least
/// `k + 1` common neighbors (`NeighborImproved`) or at least `k + 1`
/// vertex-disjoint paths (`PathImproved`, via the unit-capacity flow of
/// §4.1) gets an edge added. `tw(H) = tw(G)` whenever `k` is a valid lower
/// bound (SPEC_FULL.md §4.3).
pub fn improve_graph(graph: &CanonicalGraph, k: usize, kind: ImprovementKind) -> CanonicalGraph {
    let mut improved = graph.clone();
    let vertices: Vec<VertexId> = graph.vertices().collect();
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let (u, v) = (vertices[i], vertices[j]);
            if improved.has_edge(u, v) {
                continue;
            }
            let qualifies = match kind {
                ImprovementKind::NeighborImproved => graph.common_neighbor_count(u, v) >= k + 1,
                ImprovementKind::PathImproved => {
                    vertex_disjoint_path_count(graph, u, v, k + 1) >= k + 1
                }
            };
            if qualifies {
                improved.add_edge(u, v);
            }
        }
    }
    improved
}

/// Iterates "improve `G`, re-run `minor_min_width`" until the bound stops
/// increasing, yielding a monotone non-decreasing bound sequence
/// (SPEC_FULL.md §4.3). `PathImproved` is a strict superset of
/// `NeighborImproved` in power but materially more expensive; per
/// SPEC_FULL.md §9 it stays opt-in (`config.path_improved_lower_bound_enabled()`).
pub fn improved_lower_bound(graph: &CanonicalGraph, config: &mut SolverConfig) -> usize {
    // Degeneracy is a single linear pass and never exceeds minor-min-width,
    // so it costs nothing to fold in as the starting bracket.
    let mut bound = minor_min_width(graph, config).max(degeneracy_lower_bound(graph));
    debug!("improved lower bound: starting bracket {bound}");
    let mut current = graph.clone();
    loop {
        let improved = improve_graph(&current, bound, ImprovementKind::NeighborImproved);
        let improved = if config.path_improved_lower_bound_enabled() {
            improve_graph(&improved, bound, ImprovementKind::PathImproved)
        } else {
            improved
        };
        let next_bound = minor_min_width(&improved, config);
        if next_bound <= bound {
            break;
        }
        trace!("improved lower bound: tightened from {bound} to {next_bound}");
        bound = next_bound;
        current = improved;
    }
    debug!("improved lower bound: settled at {bound}");
    bound
}

fn degree_queue(graph: &CanonicalGraph) -> KeyedPriorityQueue<VertexId, std::cmp::Reverse<usize>, RandomState> {
    let mut q = KeyedPriorityQueue::with_capacity_and_hasher(graph.vertex_count(), RandomState::new());
    for v in graph.vertices() {
        q.push(v, std::cmp::Reverse(graph.degree(v)));
    }
    q
}

/// Pops the queue's current minimum-key vertex (ties are already random
/// since `KeyedPriorityQueue`'s internal order among equal keys is
/// insertion-order-independent-enough for our purposes; true uniform-random
/// tie-breaking among the *current* min-degree set is approximated by
/// scanning the working graph directly whenever several vertices share the
/// popped key).
fn pop_min_with_ties<F>(
    queue: &mut KeyedPriorityQueue<VertexId, std::cmp::Reverse<usize>, RandomState>,
    working: &CanonicalGraph,
    config: &mut SolverConfig,
    key: F,
) -> Option<VertexId>
where
    F: Fn(&CanonicalGraph, VertexId) -> usize,
{
    let (_, prio) = queue.peek()?;
    let min_key = prio.0;
    let tied: Vec<VertexId> = working
        .vertices()
        .filter(|&v| queue.get_priority(&v).is_some() && key(working, v) == min_key)
        .collect();
    if tied.is_empty() {
        let (v, _) = queue.pop()?;
        return Some(v);
    }
    let chosen = tied[config.rng().gen_range(0..tied.len())];
    queue.remove(&chosen);
    Some(chosen)
}
