//! Connected components and clique-separated atoms (SPEC_FULL.md §4.1, §4.7).
//!
//! The BFS here walks the same way the teacher's low-level graphs expose
//! `remove_vertex`'s incident-edge set: a plain worklist over ids, no
//! hashing, since ids are already dense and bitset-backed.

use fixedbitset::FixedBitSet;

use crate::graph::flow::minimal_separator;
use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;

/// The alive vertex sets of each connected component of `graph`.
pub fn connected_components(graph: &CanonicalGraph) -> Vec<FixedBitSet> {
    let mut visited = FixedBitSet::with_capacity(graph.capacity());
    let mut components = Vec::new();
    for start in graph.vertices() {
        if visited.contains(start.index()) {
            continue;
        }
        let mut comp = FixedBitSet::with_capacity(graph.capacity());
        let mut stack = vec![start];
        visited.insert(start.index());
        comp.insert(start.index());
        while let Some(v) = stack.pop() {
            for u in graph.neighbors(v) {
                if !visited.contains(u.index()) {
                    visited.insert(u.index());
                    comp.insert(u.index());
                    stack.push(u);
                }
            }
        }
        components.push(comp);
    }
    components
}

/// Builds the induced subgraph on `vertices`, returning the new graph and a
/// map from new canonical id to the original `VertexId`.
pub fn induced_subgraph(graph: &CanonicalGraph, vertices: &FixedBitSet) -> (CanonicalGraph, Vec<VertexId>) {
    let members: Vec<VertexId> = vertices.ones().map(VertexId::new).collect();
    let mut local_of = vec![usize::MAX; graph.capacity()];
    for (local, &orig) in members.iter().enumerate() {
        local_of[orig.index()] = local;
    }
    let mut edges = Vec::new();
    for &v in &members {
        for u in graph.neighbors(v) {
            if u.index() > v.index() && vertices.contains(u.index()) {
                edges.push((
                    VertexId::new(local_of[v.index()]),
                    VertexId::new(local_of[u.index()]),
                ));
            }
        }
    }
    (CanonicalGraph::from_edges(members.len(), edges), members)
}

/// Splits `graph` into *atoms*: maximal subgraphs with no clique minimal
/// separator. Each atom is found by repeatedly probing for a clique
/// separator between non-adjacent pairs and recursing on the resulting
/// pieces (plus the separator itself, which belongs to both sides, joined
/// back in by the caller's gluing step). Returns the alive-vertex bitsets of
/// each atom.
pub fn atoms(graph: &CanonicalGraph) -> Vec<FixedBitSet> {
    let mut result = Vec::new();
    for comp in connected_components(graph) {
        split_into_atoms(graph, comp, &mut result);
    }
    result
}

fn split_into_atoms(graph: &CanonicalGraph, component: FixedBitSet, result: &mut Vec<FixedBitSet>) {
    let members: Vec<VertexId> = component.ones().map(VertexId::new).collect();
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            let (u, v) = (members[i], members[j]);
            if graph.has_edge(u, v) {
                continue;
            }
            if let Some(sep) = minimal_separator(graph, u, v) {
                if sep.len() < 2 || !is_clique(graph, &sep) {
                    continue;
                }
                if let Some((left, right)) = split_by_separator(graph, &component, &sep) {
                    split_into_atoms(graph, left, result);
                    split_into_atoms(graph, right, result);
                    return;
                }
            }
        }
    }
    result.push(component);
}

fn is_clique(graph: &CanonicalGraph, vertices: &[VertexId]) -> bool {
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            if !graph.has_edge(vertices[i], vertices[j]) {
                return false;
            }
        }
    }
    true
}

/// Removes `separator` from `component` and finds the two sides of the
/// resulting disconnection (each side plus the separator forms one atom
/// piece), or `None` if the separator does not actually disconnect the
/// component into at least two nonempty pieces.
fn split_by_separator(
    graph: &CanonicalGraph,
    component: &FixedBitSet,
    separator: &[VertexId],
) -> Option<(FixedBitSet, FixedBitSet)> {
    let mut remaining = component.clone();
    for &s in separator {
        remaining.set(s.index(), false);
    }
    let start = remaining.ones().next()?;
    let mut visited = FixedBitSet::with_capacity(graph.capacity());
    let mut stack = vec![VertexId::new(start)];
    visited.insert(start);
    while let Some(v) = stack.pop() {
        for u in graph.neighbors(v) {
            if remaining.contains(u.index()) && !visited.contains(u.index()) {
                visited.insert(u.index());
                stack.push(u);
            }
        }
    }
    let mut rest = remaining.clone();
    rest.difference_with(&visited);
    if rest.count_ones(..) == 0 {
        return None;
    }
    for &s in separator {
        visited.insert(s.index());
        rest.insert(s.index());
    }
    Some((visited, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_disjoint_edges_are_two_components() {
        let mut g = CanonicalGraph::new(4);
        g.add_edge(VertexId::new(0), VertexId::new(1));
        g.add_edge(VertexId::new(2), VertexId::new(3));
        let comps = connected_components(&g);
        assert_eq!(comps.len(), 2);
    }

    #[test]
    fn two_triangles_sharing_an_edge_have_one_atom() {
        // a-b-c triangle and b-c-d triangle sharing edge b-c: the only
        // separator {b,c} is a clique, but the classical atom decomposition
        // of a graph whose separators are all edges of size < 2 is left
        // whole since it needs >= 2 vertices acting as a genuine separator
        // creating >=2 nontrivial remaining pieces; here removing {b,c}
        // isolates `a` and `d` each as trivial singletons, which is exactly
        // two atom pieces {a,b,c} and {b,c,d}.
        let mut g = CanonicalGraph::new(4);
        let (a, b, c, d) = (
            VertexId::new(0),
            VertexId::new(1),
            VertexId::new(2),
            VertexId::new(3),
        );
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(b, c);
        g.add_edge(b, d);
        g.add_edge(c, d);
        let atoms = atoms(&g);
        assert!(atoms.len() >= 1);
        for atom in &atoms {
            assert!(atom.count_ones(..) <= 3);
        }
    }

    #[test]
    fn induced_subgraph_preserves_edges() {
        let mut g = CanonicalGraph::new(4);
        g.add_edge(VertexId::new(0), VertexId::new(1));
        g.add_edge(VertexId::new(1), VertexId::new(2));
        g.add_edge(VertexId::new(2), VertexId::new(3));
        let mut keep = FixedBitSet::with_capacity(4);
        keep.insert(0);
        keep.insert(1);
        keep.insert(2);
        let (sub, members) = induced_subgraph(&g, &keep);
        assert_eq!(sub.vertex_count(), 3);
        assert_eq!(sub.edge_count(), 2);
        assert_eq!(members.len(), 3);
    }
}
