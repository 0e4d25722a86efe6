//! Driver / orchestration layer (SPEC_FULL.md §4.7): the three public entry
//! points `solve_smart`, `solve_exact`, and `solve_heuristic`. Each splits the
//! input graph into connected components, reduces, brackets the reduced
//! kernel with a lower and upper bound, and either accepts the upper bound
//! outright (bounds agree) or refines it with the exact core, before gluing
//! everything back into one decomposition.
//!
//! `Smart` additionally splits each post-reduction kernel into clique-
//! separated atoms and solves each independently when the kernel is small
//! enough, matching the teacher's preference for attacking the smallest
//! self-contained subproblem a structural decomposition can hand it.

use log::{debug, info, warn};

use crate::bnb;
use crate::bounds;
use crate::config::SolverConfig;
use crate::decomposition::tree::TreeDecomposition;
use crate::graph::components::{atoms, connected_components, induced_subgraph};
use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;
use crate::reduction::{self, ReductionResult};
use crate::sat;

/// Size above which the *Smart* driver skips the exact core entirely and
/// falls back to the heuristic permutation (SPEC_FULL.md §4.7).
const SMART_EXACT_VERTEX_LIMIT: usize = 600;
/// Component/atom size range in which *Smart* runs the reduction engine at
/// all; outside it, reduction's fix-point search costs more than it saves.
const SMART_REDUCTION_MIN: usize = 20;
const SMART_REDUCTION_MAX: usize = 1000;
/// *Heuristic* refines via SAT below this many kernel vertices, and via
/// local search otherwise.
const HEURISTIC_SAT_LIMIT: usize = 60;

/// The reference end-to-end path: always reduce, always refine the kernel
/// with the exact core, regardless of size.
pub fn solve_exact(graph: &CanonicalGraph, config: &SolverConfig) -> TreeDecomposition {
    solve_by_component(graph, config, |kernel, cfg| {
        solve_kernel_exact(kernel, cfg)
    })
}

/// Reduction plus stochastic min-fill; refines the small-enough kernel via
/// SAT, and a larger one via local-search permutation improvement.
pub fn solve_heuristic(graph: &CanonicalGraph, config: &SolverConfig) -> TreeDecomposition {
    solve_by_component(graph, config, |kernel, cfg| {
        let mut cfg = cfg.clone();
        let result = reduction::reduce(kernel, 0, &cfg);
        let permutation = if result.kernel.vertex_count() < HEURISTIC_SAT_LIMIT {
            refine_small_kernel_via_sat(&result.kernel, &mut cfg)
        } else {
            let (perm, _width) = bounds::stochastic_min_fill_permutation(&result.kernel, &mut cfg);
            local_search_improve(&result.kernel, perm, &mut cfg)
        };
        reduction::glue_via_permutation(kernel, &result, &permutation)
    })
}

/// Heuristically selects between the exact and heuristic paths using the
/// size thresholds of SPEC_FULL.md §4.7, and additionally splits each
/// reduced kernel into clique-separated atoms so the exact core only ever
/// sees the smallest subproblem it needs to.
pub fn solve_smart(graph: &CanonicalGraph, config: &SolverConfig) -> TreeDecomposition {
    solve_by_component(graph, config, solve_kernel_smart)
}

/// Splits `graph` into connected components, solves each independently with
/// `solve_kernel`, and stitches the results back together. Disjoint
/// components share no vertex, so any bag-to-bag tree edge glues them
/// correctly; the first component's decomposition seeds the merge.
///
/// When `config.parallel()` is set and there is more than one component,
/// each component is solved on its own scoped thread with its own
/// `derive_for_component` RNG stream and a private working graph (SPEC_FULL.md
/// §5); the only state shared between workers is the result list, collected
/// under a mutex as an insert-only operation.
fn solve_by_component(
    graph: &CanonicalGraph,
    config: &SolverConfig,
    solve_kernel: impl Fn(&CanonicalGraph, &SolverConfig) -> TreeDecomposition + Sync,
) -> TreeDecomposition {
    let components = connected_components(graph);
    if components.is_empty() {
        return TreeDecomposition::trivial();
    }
    info!("split into {} connected component(s)", components.len());

    let mut pieces: Vec<TreeDecomposition> = if config.parallel() && components.len() > 1 {
        info!("solving {} components concurrently", components.len());
        let results: std::sync::Mutex<Vec<TreeDecomposition>> =
            std::sync::Mutex::new(Vec::with_capacity(components.len()));
        std::thread::scope(|scope| {
            for (i, comp) in components.iter().enumerate() {
                let solve_kernel = &solve_kernel;
                let results = &results;
                scope.spawn(move || {
                    let (local_graph, members) = induced_subgraph(graph, comp);
                    debug!(
                        "component {i}: {} vertices, {} edges",
                        local_graph.vertex_count(),
                        local_graph.edge_count()
                    );
                    let component_config = config.derive_for_component(i as u64);
                    let local_td = solve_kernel(&local_graph, &component_config);
                    let remapped = remap_decomposition(&local_td, &members, graph.capacity());
                    results.lock().expect("component worker thread panicked while holding the results lock").push(remapped);
                });
            }
        });
        results.into_inner().expect("component worker thread panicked while holding the results lock")
    } else {
        let mut pieces = Vec::with_capacity(components.len());
        for (i, comp) in components.iter().enumerate() {
            let (local_graph, members) = induced_subgraph(graph, comp);
            debug!(
                "component {i}: {} vertices, {} edges",
                local_graph.vertex_count(),
                local_graph.edge_count()
            );
            let component_config = config.derive_for_component(i as u64);
            let local_td = solve_kernel(&local_graph, &component_config);
            pieces.push(remap_decomposition(&local_td, &members, graph.capacity()));
        }
        pieces
    };

    let mut merged = pieces.remove(0);
    for piece in pieces {
        let anchor = merged.bag_ids().next();
        let mapping = merged.merge_disjoint(piece.clone());
        if let (Some(anchor), Some(&first_new)) = (anchor, piece.bag_ids().next().map(|id| mapping[&id]).as_ref())
        {
            merged.add_tree_edge(anchor, first_new);
        }
    }
    info!("final decomposition width {}", merged.width());
    merged
}

/// Rewrites a decomposition produced over `induced_subgraph`'s local ids
/// back into the caller's original vertex space.
fn remap_decomposition(td: &TreeDecomposition, local_to_original: &[VertexId], capacity: usize) -> TreeDecomposition {
    let mut remapped = TreeDecomposition::new(capacity);
    let mut id_map = std::collections::HashMap::new();
    for bag in td.bags() {
        let vertices: Vec<VertexId> = bag.vertices().map(|v| local_to_original[v.index()]).collect();
        id_map.insert(bag.id(), remapped.add_bag(vertices));
    }
    for (a, b) in td.tree_edges() {
        remapped.add_tree_edge(id_map[&a], id_map[&b]);
    }
    remapped
}

/// Reduces `kernel`, then refines with the exact core (SAT if it is
/// available and the kernel is small enough for the oracle to help,
/// B&B otherwise) regardless of size. Used by the `Exact` driver.
fn solve_kernel_exact(kernel: &CanonicalGraph, config: &SolverConfig) -> TreeDecomposition {
    let mut cfg = config.clone();
    let lb = bounds::improved_lower_bound(kernel, &mut cfg);
    let result = reduction::reduce(kernel, lb, &cfg);
    let permutation = exact_kernel_permutation(&result.kernel, &cfg);
    reduction::glue_via_permutation(kernel, &result, &permutation)
}

/// The `Smart` driver's per-component/atom policy: skip reduction outside
/// the size window it pays off in, skip the exact core entirely above
/// `SMART_EXACT_VERTEX_LIMIT`, and otherwise split the reduced kernel into
/// atoms so the exact core only ever solves a small clique-separated piece.
fn solve_kernel_smart(kernel: &CanonicalGraph, config: &SolverConfig) -> TreeDecomposition {
    let mut cfg = config.clone();
    let n = kernel.vertex_count();

    if n > SMART_EXACT_VERTEX_LIMIT {
        info!("smart: {n} vertices exceeds exact limit, falling back to heuristic path");
        let (perm, _width) = bounds::stochastic_min_fill_permutation(kernel, &mut cfg);
        return TreeDecomposition::from_elimination_permutation(kernel, &perm);
    }

    let lb = bounds::improved_lower_bound(kernel, &mut cfg);
    let in_reduction_window = (SMART_REDUCTION_MIN..=SMART_REDUCTION_MAX).contains(&n);
    let result = if in_reduction_window {
        reduction::reduce(kernel, lb, &cfg)
    } else {
        ReductionResult {
            kernel: kernel.clone(),
            permutation: Vec::new(),
            bags: Vec::new(),
            lower_bound_raise: 0,
            fully_reduced: kernel.vertex_count() == 0,
        }
    };
    debug!(
        "smart reduction ({}): {} -> {} vertices",
        in_reduction_window,
        n,
        result.kernel.vertex_count()
    );

    if result.fully_reduced {
        return reduction::glue_via_permutation(kernel, &result, &[]);
    }

    let atom_sets = atoms(&result.kernel);
    if atom_sets.len() <= 1 {
        let permutation = exact_kernel_permutation(&result.kernel, &cfg);
        return reduction::glue_via_permutation(kernel, &result, &permutation);
    }

    info!("smart: kernel split into {} atom(s)", atom_sets.len());
    let mut kernel_td = TreeDecomposition::new(result.kernel.capacity());
    let mut first_bag_each = Vec::with_capacity(atom_sets.len());
    for (i, atom_vertices) in atom_sets.iter().enumerate() {
        let (atom_graph, members) = induced_subgraph(&result.kernel, atom_vertices);
        let atom_config = cfg.derive_for_component(i as u64);
        let atom_td = if atom_graph.vertex_count() <= cfg.atom_exact_limit() {
            solve_kernel_exact(&atom_graph, &atom_config)
        } else {
            let mut ac = atom_config;
            let (perm, _w) = bounds::stochastic_min_fill_permutation(&atom_graph, &mut ac);
            TreeDecomposition::from_elimination_permutation(&atom_graph, &perm)
        };
        let atom_td = remap_decomposition(&atom_td, &members, result.kernel.capacity());
        let mapping = kernel_td.merge_disjoint(atom_td.clone());
        first_bag_each.push(atom_td.bag_ids().next().map(|id| mapping[&id]));
    }
    stitch_atoms_by_separator(&mut kernel_td, &result.kernel, &atom_sets, &first_bag_each);

    reduction::glue_general(kernel_td, &result.bags)
}

/// Connects each atom's decomposition fragment to the one before it via a
/// bag that covers the clique separator between them, or an arbitrary
/// already-placed bag if the two atoms happen to share no vertex (can only
/// happen for independent connected pieces the atom splitter also caught).
fn stitch_atoms_by_separator(
    kernel_td: &mut TreeDecomposition,
    kernel: &CanonicalGraph,
    atom_sets: &[fixedbitset::FixedBitSet],
    first_bag_each: &[Option<crate::ids::BagId>],
) {
    for i in 1..atom_sets.len() {
        let shared: Vec<VertexId> = (0..kernel.capacity())
            .filter(|&idx| atom_sets[i].contains(idx))
            .filter(|&idx| atom_sets[..i].iter().any(|prior| prior.contains(idx)))
            .map(VertexId::new)
            .collect();

        let anchor = if shared.is_empty() {
            first_bag_each[..i].iter().flatten().next().copied()
        } else {
            kernel_td.find_bag_superset_of(&shared)
        };
        if let (Some(anchor), Some(new_bag)) = (anchor, first_bag_each[i]) {
            kernel_td.add_tree_edge(anchor, new_bag);
        }
    }
}

/// Chooses SAT or B&B for an already-reduced kernel based on its size, the
/// way `Smart`/`Exact` both do once they have a kernel small enough to hand
/// the exact core. Falls back to B&B if the oracle cannot be constructed
/// (SPEC_FULL.md §7's `OracleUnavailable` degrade-to-B&B rule); `VarisatOracle`
/// cannot itself fail to construct, so this only guards future backends.
fn exact_kernel_permutation(kernel: &CanonicalGraph, config: &SolverConfig) -> Vec<VertexId> {
    let mut cfg = config.clone();
    if kernel.vertex_count() <= 1 {
        return kernel.vertices().collect();
    }
    let (ub_perm, ub_width) = bounds::stochastic_min_fill_permutation(kernel, &mut cfg);
    let mut lb = bounds::improved_lower_bound(kernel, &mut cfg);
    if lb < ub_width && kernel.vertex_count() <= 12 {
        // Small enough to afford the SAT lower bound's ascending-k scan as a
        // cross-check against the cheaper contraction-based bound.
        lb = lb.max(sat::decomposer::lower_bound(kernel, lb, &cfg));
    }
    if lb >= ub_width {
        debug!("bounds agree at {ub_width}, skipping exact core");
        return ub_perm;
    }

    info!("exact core: bracketed width in [{lb}, {ub_width}], entering SAT");
    match sat::decomposer::solve_exact(kernel, ub_width, lb, &cfg) {
        Some(result) => {
            info!("exact core: proved width {}", result.width);
            result.permutation
        }
        None => {
            warn!("SAT oracle produced no result, falling back to branch-and-bound");
            if let Err(err) = bnb::check_memory_budget(kernel.vertex_count(), ub_width, &cfg) {
                warn!("{err}, abandoning exact path for the heuristic permutation");
                return ub_perm;
            }
            let (_td, result) = bnb::solve_exact(kernel, &mut cfg);
            if result.cancelled {
                warn!("branch-and-bound cancelled before proving optimality");
            }
            result.permutation
        }
    }
}

/// The `Heuristic` driver's small-kernel refinement: a single SAT decision
/// call starting from the stochastic min-fill upper bound, falling back to
/// that upper bound's own permutation if the oracle is unavailable.
fn refine_small_kernel_via_sat(kernel: &CanonicalGraph, config: &mut SolverConfig) -> Vec<VertexId> {
    let (ub_perm, ub_width) = bounds::stochastic_min_fill_permutation(kernel, config);
    match sat::decomposer::solve_exact(kernel, ub_width, 0, config) {
        Some(result) => result.permutation,
        None => ub_perm,
    }
}

/// Local-search refinement for the `Heuristic` driver's large-kernel path
/// (SPEC_FULL.md §4.7): repeatedly swaps a random adjacent pair of the
/// permutation, keeping the swap only if it does not worsen the width it
/// induces. Cooperative-cancellation friendly: checked once per iteration.
fn local_search_improve(kernel: &CanonicalGraph, mut permutation: Vec<VertexId>, config: &mut SolverConfig) -> Vec<VertexId> {
    use rand::Rng;

    let mut best_width = permutation_width(kernel, &permutation);
    let n = permutation.len();
    if n < 2 {
        return permutation;
    }

    let iterations = (n * 20).min(20_000);
    for _ in 0..iterations {
        if config.is_cancelled() {
            break;
        }
        let i = config.rng().gen_range(0..n - 1);
        permutation.swap(i, i + 1);
        let width = permutation_width(kernel, &permutation);
        if width <= best_width {
            best_width = width;
        } else {
            permutation.swap(i, i + 1);
        }
    }
    permutation
}

/// The width of the decomposition a permutation induces, without building
/// the decomposition itself.
fn permutation_width(kernel: &CanonicalGraph, permutation: &[VertexId]) -> usize {
    let mut working = kernel.clone();
    let mut width = 0usize;
    for &v in permutation {
        if !working.is_alive(v) {
            continue;
        }
        width = width.max(working.degree(v));
        working.eliminate_vertex(v);
    }
    width
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

    fn grid_3x3() -> CanonicalGraph {
        let idx = |r: usize, c: usize| VertexId::new(r * 3 + c);
        let mut edges = vec![];
        for r in 0..3 {
            for c in 0..3 {
                if c + 1 < 3 {
                    edges.push((idx(r, c), idx(r, c + 1)));
                }
                if r + 1 < 3 {
                    edges.push((idx(r, c), idx(r + 1, c)));
                }
            }
        }
        CanonicalGraph::from_edges(9, edges)
    }

    fn petersen() -> CanonicalGraph {
        // outer 5-cycle 0..5, inner 5-pentagram 5..10, spokes i -- i+5.
        let mut edges = vec![];
        for i in 0..5 {
            edges.push((VertexId::new(i), VertexId::new((i + 1) % 5)));
            edges.push((VertexId::new(5 + i), VertexId::new(5 + (i + 2) % 5)));
            edges.push((VertexId::new(i), VertexId::new(5 + i)));
        }
        CanonicalGraph::from_edges(10, edges)
    }

    #[test]
    fn petersen_graph_solves_to_width_four() {
        let g = petersen();
        let config = SolverConfig::with_seed(11);
        let td = solve_exact(&g, &config);
        assert_eq!(td.width(), 4);
        td.verify(&g).unwrap();
    }

    #[test]
    fn empty_graph_yields_trivial_decomposition() {
        let g = CanonicalGraph::new(0);
        let config = SolverConfig::with_seed(0);
        let td = solve_exact(&g, &config);
        assert_eq!(td.width(), -1);
    }

    #[test]
    fn path_solves_to_width_one_on_every_driver() {
        let g = path(6);
        let config = SolverConfig::with_seed(1);
        for td in [solve_exact(&g, &config), solve_heuristic(&g, &config), solve_smart(&g, &config)] {
            assert_eq!(td.width(), 1);
            td.verify(&g).unwrap();
        }
    }

    #[test]
    fn clique_solves_to_n_minus_one() {
        let g = clique(5);
        let config = SolverConfig::with_seed(2);
        let td = solve_exact(&g, &config);
        assert_eq!(td.width(), 4);
        td.verify(&g).unwrap();
    }

    #[test]
    fn cycle_five_solves_to_width_two() {
        let g = cycle(5);
        let config = SolverConfig::with_seed(3);
        let td = solve_exact(&g, &config);
        assert_eq!(td.width(), 2);
        td.verify(&g).unwrap();
    }

    #[test]
    fn grid_3x3_solves_to_width_three() {
        let g = grid_3x3();
        let config = SolverConfig::with_seed(4);
        let td = solve_exact(&g, &config);
        assert_eq!(td.width(), 3);
        td.verify(&g).unwrap();
    }

    #[test]
    fn disconnected_graph_glues_components_together() {
        let mut g = CanonicalGraph::new(6);
        g.add_edge(VertexId::new(0), VertexId::new(1));
        g.add_edge(VertexId::new(1), VertexId::new(2));
        g.add_edge(VertexId::new(3), VertexId::new(4));
        g.add_edge(VertexId::new(4), VertexId::new(5));
        let config = SolverConfig::with_seed(5);
        let td = solve_exact(&g, &config);
        assert_eq!(td.width(), 1);
        td.verify(&g).unwrap();
    }

    #[test]
    fn parallel_mode_agrees_with_sequential_on_a_disconnected_graph() {
        let mut g = CanonicalGraph::new(9);
        g.add_edge(VertexId::new(0), VertexId::new(1));
        g.add_edge(VertexId::new(1), VertexId::new(2));
        g.add_edge(VertexId::new(3), VertexId::new(4));
        g.add_edge(VertexId::new(4), VertexId::new(5));
        g.add_edge(VertexId::new(5), VertexId::new(3));
        g.add_edge(VertexId::new(6), VertexId::new(7));
        g.add_edge(VertexId::new(7), VertexId::new(8));
        g.add_edge(VertexId::new(8), VertexId::new(6));

        let sequential_config = SolverConfig::with_seed(9);
        let sequential = solve_exact(&g, &sequential_config);

        let parallel_config = SolverConfig::with_seed(9).with_parallel(true);
        let parallel = solve_exact(&g, &parallel_config);

        assert_eq!(parallel.width(), sequential.width());
        parallel.verify(&g).unwrap();
    }

    #[test]
    fn heuristic_width_never_beats_exact_width() {
        let g = grid_3x3();
        let config = SolverConfig::with_seed(6);
        let exact = solve_exact(&g, &config);
        let heuristic = solve_heuristic(&g, &config);
        assert!(heuristic.width() >= exact.width());
    }

    #[test]
    fn smart_agrees_with_exact_on_small_graphs() {
        let g = cycle(6);
        let config = SolverConfig::with_seed(7);
        let exact = solve_exact(&g, &config);
        let smart = solve_smart(&g, &config);
        assert_eq!(smart.width(), exact.width());
    }
}
