//! Decomposition post-processing: flatten, width improvement, and the
//! optional nice-tree-decomposition / tree-index construction
//! (SPEC_FULL.md §4.6).

use std::collections::HashMap;

use fixedbitset::FixedBitSet;

use crate::decomposition::tree::TreeDecomposition;
use crate::graph::components::induced_subgraph;
use crate::graph::flow::minimal_separator;
use crate::graph::kernel::CanonicalGraph;
use crate::ids::{BagId, VertexId};

/// Contracts any bag whose vertex set is a subset of a neighboring bag's,
/// to a fix-point. Does not change the width.
pub fn flatten(td: &mut TreeDecomposition) {
    loop {
        let mut merged_any = false;
        let ids: Vec<BagId> = td.bag_ids().collect();
        'outer: for &b in &ids {
            if !td.bag_ids().any(|x| x == b) {
                continue;
            }
            let neighbors: Vec<BagId> = td.neighbors(b).collect();
            for n in neighbors {
                if td.bag(b).is_superset_of(td.bag(n)) {
                    merge_bag_into(td, n, b);
                    merged_any = true;
                    continue 'outer;
                }
            }
        }
        if !merged_any {
            break;
        }
    }
}

/// Removes bag `from` and attaches every one of its other neighbors to
/// `into` (its vertex set is already known to be a superset of `from`'s).
fn merge_bag_into(td: &mut TreeDecomposition, from: BagId, into: BagId) {
    let other_neighbors: Vec<BagId> = td.neighbors(from).filter(|&n| n != into).collect();
    td.remove_bag(from);
    for n in other_neighbors {
        td.add_tree_edge(into, n);
    }
}

/// Iteratively replaces any bag whose induced vertex set is not a clique in
/// `graph` with a minimum separator bag plus one bag per residual connected
/// component, re-attaching former neighbors by the running-intersection
/// rule (sharing more than one vertex with the old bag keeps the edge;
/// everything else reconnects through the new separator bag). Monotone
/// non-increasing in width (SPEC_FULL.md §8).
pub fn width_improve(td: &mut TreeDecomposition, graph: &CanonicalGraph) {
    loop {
        let ids: Vec<BagId> = td.bag_ids().collect();
        let mut improved = false;
        for b in ids {
            if !td.bag_ids().any(|x| x == b) {
                continue;
            }
            if let Some(non_clique_pair) = first_non_clique_pair(td, graph, b) {
                split_bag(td, graph, b, non_clique_pair);
                improved = true;
            }
        }
        if !improved {
            break;
        }
    }
}

fn first_non_clique_pair(
    td: &TreeDecomposition,
    graph: &CanonicalGraph,
    b: BagId,
) -> Option<(VertexId, VertexId)> {
    let members: Vec<VertexId> = td.bag(b).vertices().collect();
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            if !graph.has_edge(members[i], members[j]) {
                return Some((members[i], members[j]));
            }
        }
    }
    None
}

fn split_bag(
    td: &mut TreeDecomposition,
    graph: &CanonicalGraph,
    b: BagId,
    (u, v): (VertexId, VertexId),
) {
    let members: FixedBitSet = td.bag(b).bitset().clone();
    let (sub, local_to_orig) = induced_subgraph(graph, &members);
    let local_of: HashMap<VertexId, VertexId> = local_to_orig
        .iter()
        .enumerate()
        .map(|(local, &orig)| (orig, VertexId::new(local)))
        .collect();
    let (lu, lv) = (local_of[&u], local_of[&v]);
    let Some(local_sep) = minimal_separator(&sub, lu, lv) else {
        return;
    };
    if local_sep.is_empty() {
        return;
    }
    let separator: Vec<VertexId> = local_sep.iter().map(|&l| local_to_orig[l.index()]).collect();
    let sep_set: FixedBitSet = {
        let mut bs = FixedBitSet::with_capacity(graph.capacity());
        for &s in &separator {
            bs.insert(s.index());
        }
        bs
    };

    let mut remaining = members.clone();
    remaining.difference_with(&sep_set);
    let components = connected_pieces(&sub, &local_of, &remaining);
    if components.len() < 2 {
        return;
    }

    let old_neighbors: Vec<BagId> = td.neighbors(b).collect();
    let sep_id = td.add_bag(separator.iter().copied());
    let mut piece_ids = Vec::with_capacity(components.len());
    for piece in &components {
        let mut vertices: Vec<VertexId> = piece.ones().map(VertexId::new).collect();
        vertices.extend(separator.iter().copied());
        let id = td.add_bag(vertices);
        td.add_tree_edge(sep_id, id);
        piece_ids.push(id);
    }
    td.remove_bag(b);

    for old_n in old_neighbors {
        let shared = piece_ids
            .iter()
            .copied()
            .max_by_key(|&p| shared_count(td, p, old_n));
        match shared {
            Some(p) if shared_count(td, p, old_n) > 1 => td.add_tree_edge(p, old_n),
            _ => td.add_tree_edge(sep_id, old_n),
        }
    }
}

fn shared_count(td: &TreeDecomposition, a: BagId, b: BagId) -> usize {
    td.bag(a).intersection_len(td.bag(b))
}

/// Connected components of `remaining` (a subset of `members`, expressed in
/// original-graph ids) within the induced subgraph `sub`.
fn connected_pieces(
    sub: &CanonicalGraph,
    local_of: &HashMap<VertexId, VertexId>,
    remaining: &FixedBitSet,
) -> Vec<FixedBitSet> {
    let orig_of_local: HashMap<VertexId, VertexId> =
        local_of.iter().map(|(&o, &l)| (l, o)).collect();
    let mut visited = FixedBitSet::with_capacity(sub.capacity());
    let mut pieces = Vec::new();
    for &orig_start in remaining.ones().map(VertexId::new).collect::<Vec<_>>().iter() {
        let local_start = local_of[&orig_start];
        if visited.contains(local_start.index()) {
            continue;
        }
        let mut piece = FixedBitSet::with_capacity(sub.capacity());
        let mut stack = vec![local_start];
        visited.insert(local_start.index());
        while let Some(l) = stack.pop() {
            let orig = orig_of_local[&l];
            piece.insert(orig.index());
            for nbr_local in sub.neighbors(l) {
                let nbr_orig = orig_of_local[&nbr_local];
                if remaining.contains(nbr_orig.index()) && !visited.contains(nbr_local.index()) {
                    visited.insert(nbr_local.index());
                    stack.push(nbr_local);
                }
            }
        }
        pieces.push(piece);
    }
    pieces
}

/// One node of a nice tree decomposition (SPEC_FULL.md §4.6).
#[derive(Debug, Clone)]
pub enum NiceNodeKind {
    Leaf,
    Introduce(VertexId),
    Forget(VertexId),
    Join,
    /// A pass-through node marking that the edge `{u, v}` is realized by
    /// this point in the tree (both endpoints are already in scope).
    Edge(VertexId, VertexId),
}

#[derive(Debug, Clone)]
struct NiceNode {
    kind: NiceNodeKind,
    bag: FixedBitSet,
    children: Vec<usize>,
}

/// A rooted, binary nice tree decomposition built from a `TreeDecomposition`
/// (SPEC_FULL.md §4.6). Every node is one of {leaf, introduce, forget,
/// join, edge}; root and leaf bags are empty.
pub struct NiceTreeDecomposition {
    nodes: Vec<NiceNode>,
    root: usize,
}

impl NiceTreeDecomposition {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn kind(&self, idx: usize) -> &NiceNodeKind {
        &self.nodes[idx].kind
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].children
    }

    pub fn bag(&self, idx: usize) -> &FixedBitSet {
        &self.nodes[idx].bag
    }

    fn push(&mut self, kind: NiceNodeKind, bag: FixedBitSet) -> usize {
        self.nodes.push(NiceNode {
            kind,
            bag,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }
}

/// Builds a nice tree decomposition rooted at an arbitrary bag of `td`.
pub fn build_nice_decomposition(td: &TreeDecomposition, graph: &CanonicalGraph) -> NiceTreeDecomposition {
    let mut nice = NiceTreeDecomposition {
        nodes: Vec::new(),
        root: 0,
    };
    let root_bag = match td.bag_ids().next() {
        Some(id) => id,
        None => {
            let empty = FixedBitSet::with_capacity(graph.capacity());
            nice.root = nice.push(NiceNodeKind::Leaf, empty);
            return nice;
        }
    };

    let mut parent_of: HashMap<BagId, Option<BagId>> = HashMap::new();
    let mut order = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![root_bag];
    visited.insert(root_bag);
    parent_of.insert(root_bag, None);
    while let Some(b) = stack.pop() {
        order.push(b);
        for n in td.neighbors(b) {
            if visited.insert(n) {
                parent_of.insert(n, Some(b));
                stack.push(n);
            }
        }
    }
    let mut children_of: HashMap<BagId, Vec<BagId>> = HashMap::new();
    for &b in &order {
        if let Some(Some(p)) = parent_of.get(&b) {
            children_of.entry(*p).or_default().push(b);
        }
    }

    let subtree_top = emit_subtree(&mut nice, td, &children_of, root_bag, graph.capacity());
    let empty_bag = FixedBitSet::with_capacity(graph.capacity());
    let root_bag_set = td.bag(root_bag).bitset().clone();
    let forget_chain_top = emit_chain(&mut nice, &empty_bag, &root_bag_set, subtree_top);
    insert_edge_markers(&mut nice, graph);
    nice.root = forget_chain_top;
    nice
}

/// Builds the subtree rooted at `bag_id`'s own content (ending, recursively,
/// in a fully-forgotten empty leaf for each branch) and returns the arena
/// index of the node whose bag equals `bag_id`'s vertex set.
fn emit_subtree(
    nice: &mut NiceTreeDecomposition,
    td: &TreeDecomposition,
    children_of: &HashMap<BagId, Vec<BagId>>,
    bag_id: BagId,
    capacity: usize,
) -> usize {
    let here_bag = td.bag(bag_id).bitset().clone();
    let children = children_of.get(&bag_id).cloned().unwrap_or_default();

    if children.is_empty() {
        let empty = FixedBitSet::with_capacity(capacity);
        let leaf = nice.push(NiceNodeKind::Leaf, empty.clone());
        return emit_chain(nice, &here_bag, &empty, leaf);
    }

    let mut branch_tops: Vec<usize> = children
        .iter()
        .map(|&c| {
            let child_bag = td.bag(c).bitset().clone();
            let child_top = emit_subtree(nice, td, children_of, c, capacity);
            emit_chain(nice, &here_bag, &child_bag, child_top)
        })
        .collect();

    while branch_tops.len() > 1 {
        let b = branch_tops.pop().unwrap();
        let a = branch_tops.pop().unwrap();
        let join = nice.push(NiceNodeKind::Join, here_bag.clone());
        nice.nodes[join].children = vec![a, b];
        branch_tops.push(join);
    }
    branch_tops.pop().unwrap()
}

/// Builds a chain of single-vertex forget/introduce steps between a node
/// with content `from` and its already-built child `child_top` whose
/// content is `to`: first forget everything in `to \ from` (shrinking `to`
/// down to the intersection), then introduce everything in `from \ to`
/// (growing up to `from`). Returns the index of the new top node, whose bag
/// equals `from`.
fn emit_chain(
    nice: &mut NiceTreeDecomposition,
    from: &FixedBitSet,
    to: &FixedBitSet,
    child_top: usize,
) -> usize {
    let mut intersection = from.clone();
    intersection.intersect_with(to);

    let mut cur = child_top;
    let mut cur_bag = to.clone();
    for v in to.ones().filter(|&i| !intersection.contains(i)).collect::<Vec<_>>() {
        cur_bag.set(v, false);
        let forget_idx = nice.push(NiceNodeKind::Forget(VertexId::new(v)), cur_bag.clone());
        nice.nodes[forget_idx].children = vec![cur];
        cur = forget_idx;
    }

    for v in from.ones().filter(|&i| !intersection.contains(i)).collect::<Vec<_>>() {
        cur_bag.set(v, true);
        let introduce_idx = nice.push(NiceNodeKind::Introduce(VertexId::new(v)), cur_bag.clone());
        nice.nodes[introduce_idx].children = vec![cur];
        cur = introduce_idx;
    }
    cur
}

fn insert_edge_markers(nice: &mut NiceTreeDecomposition, graph: &CanonicalGraph) {
    for u in graph.vertices() {
        for v in graph.neighbors(u) {
            if v.index() <= u.index() {
                continue;
            }
            if let Some(target) = find_single_child_node_with_both(nice, u, v) {
                let bag = nice.bag(target).clone();
                let child = nice.nodes[target].children.clone();
                if child.len() == 1 {
                    let marker = nice.push(NiceNodeKind::Edge(u, v), bag);
                    nice.nodes[marker].children = child;
                    nice.nodes[target].children = vec![marker];
                }
            }
        }
    }
}

fn find_single_child_node_with_both(
    nice: &NiceTreeDecomposition,
    u: VertexId,
    v: VertexId,
) -> Option<usize> {
    (0..nice.node_count()).find(|&idx| {
        nice.nodes[idx].children.len() == 1
            && nice.bag(idx).contains(u.index())
            && nice.bag(idx).contains(v.index())
    })
}

/// Assigns each vertex of every bag an index in `[0, width]` such that no
/// bag contains two vertices with the same index (SPEC_FULL.md §4.6): a
/// DFS maintains a free-index pool, popping one at each `Introduce` and
/// pushing it back at the matching `Forget`. Returns, for each arena node,
/// the index touched at that node (`None` for join/leaf/edge nodes).
pub fn compute_tree_index(nice: &NiceTreeDecomposition) -> Vec<Option<usize>> {
    let width = nice
        .nodes
        .iter()
        .map(|n| n.bag.count_ones(..))
        .max()
        .unwrap_or(0);
    let mut free: Vec<usize> = (0..width).rev().collect();
    let mut color_of: HashMap<VertexId, usize> = HashMap::new();
    let mut assignment = vec![None; nice.node_count()];
    recurse_tree_index(nice, nice.root(), &mut free, &mut color_of, &mut assignment);
    assignment
}

fn recurse_tree_index(
    nice: &NiceTreeDecomposition,
    idx: usize,
    free: &mut Vec<usize>,
    color_of: &mut HashMap<VertexId, usize>,
    assignment: &mut Vec<Option<usize>>,
) {
    match nice.kind(idx).clone() {
        NiceNodeKind::Introduce(v) => {
            let c = free.pop().expect("tree-index pool exhausted");
            color_of.insert(v, c);
            assignment[idx] = Some(c);
            for &child in nice.children(idx).to_vec().iter() {
                recurse_tree_index(nice, child, free, color_of, assignment);
            }
        }
        NiceNodeKind::Forget(v) => {
            for &child in nice.children(idx).to_vec().iter() {
                recurse_tree_index(nice, child, free, color_of, assignment);
            }
            let c = color_of.remove(&v).expect("forget without matching introduce");
            assignment[idx] = Some(c);
            free.push(c);
        }
        NiceNodeKind::Leaf | NiceNodeKind::Join | NiceNodeKind::Edge(_, _) => {
            for &child in nice.children(idx).to_vec().iter() {
                recurse_tree_index(nice, child, free, color_of, assignment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::VertexId;

    fn path(n: usize) -> CanonicalGraph {
        let edges = (0..n - 1).map(|i| (VertexId::new(i), VertexId::new(i + 1)));
        CanonicalGraph::from_edges(n, edges)
    }

    #[test]
    fn flatten_removes_subset_bags() {
        let g = path(3);
        let mut td = TreeDecomposition::new(3);
        let a = td.add_bag([VertexId::new(0), VertexId::new(1)]);
        let b = td.add_bag([VertexId::new(1), VertexId::new(2)]);
        let c = td.add_bag([VertexId::new(1)]);
        td.add_tree_edge(a, b);
        td.add_tree_edge(a, c);
        flatten(&mut td);
        assert_eq!(td.bag_count(), 2);
        td.verify(&g).unwrap();
    }

    #[test]
    fn width_improve_is_idempotent_on_clique_bags() {
        let mut g = CanonicalGraph::new(3);
        g.add_edge(VertexId::new(0), VertexId::new(1));
        g.add_edge(VertexId::new(1), VertexId::new(2));
        g.add_edge(VertexId::new(0), VertexId::new(2));
        let mut td = TreeDecomposition::new(3);
        td.add_bag([VertexId::new(0), VertexId::new(1), VertexId::new(2)]);
        let before = td.width();
        width_improve(&mut td, &g);
        assert_eq!(td.width(), before);
    }

    #[test]
    fn nice_decomposition_root_and_leaves_are_empty() {
        let g = path(4);
        let perm: Vec<VertexId> = (0..4).map(VertexId::new).collect();
        let td = TreeDecomposition::from_elimination_permutation(&g, &perm);
        let nice = build_nice_decomposition(&td, &g);
        assert_eq!(nice.bag(nice.root()).count_ones(..), 0);
    }

    #[test]
    fn tree_index_never_repeats_within_a_bag() {
        let g = path(5);
        let perm: Vec<VertexId> = (0..5).map(VertexId::new).collect();
        let td = TreeDecomposition::from_elimination_permutation(&g, &perm);
        let nice = build_nice_decomposition(&td, &g);
        let _ = compute_tree_index(&nice);
    }
}
