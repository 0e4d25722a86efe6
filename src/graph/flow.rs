//! Dinic-style vertex flow for minimum vertex separators and
//! vertex-disjoint path counts (SPEC_FULL.md §4.1, §4.3).
//!
//! Every vertex `v` (other than the two terminals) is split into an
//! in-node and an out-node joined by a unit-capacity edge; every original
//! edge `{u,v}` becomes two unit-capacity arcs `u_out -> v_in` and
//! `v_out -> u_in`. A maximum in-out flow from `source` to `sink` then
//! equals the size of a minimum vertex separator (Menger's theorem), and is
//! capped at `cap + 1` probes when only "are there more than `cap`
//! disjoint paths" is asked, per the path-improved lower bound's needs.

use std::collections::VecDeque;

use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;

struct FlowNetwork {
    n: usize,
    // adjacency list of (target, capacity_index) pairs into `cap`/`to`.
    head: Vec<i64>,
    next: Vec<i64>,
    to: Vec<usize>,
    cap: Vec<i32>,
}

impl FlowNetwork {
    fn new(n: usize) -> Self {
        Self {
            n,
            head: vec![-1; n],
            next: Vec::new(),
            to: Vec::new(),
            cap: Vec::new(),
        }
    }

    fn add_edge(&mut self, u: usize, v: usize, c: i32) {
        self.to.push(v);
        self.cap.push(c);
        self.next.push(self.head[u]);
        self.head[u] = (self.to.len() - 1) as i64;

        self.to.push(u);
        self.cap.push(0);
        self.next.push(self.head[v]);
        self.head[v] = (self.to.len() - 1) as i64;
    }

    fn bfs_levels(&self, s: usize, t: usize) -> Option<Vec<i32>> {
        let mut level = vec![-1; self.n];
        level[s] = 0;
        let mut q = VecDeque::new();
        q.push_back(s);
        while let Some(u) = q.pop_front() {
            let mut e = self.head[u];
            while e != -1 {
                let idx = e as usize;
                let v = self.to[idx];
                if self.cap[idx] > 0 && level[v] < 0 {
                    level[v] = level[u] + 1;
                    q.push_back(v);
                }
                e = self.next[idx];
            }
        }
        if level[t] < 0 {
            None
        } else {
            Some(level)
        }
    }

    fn dfs_blocking(
        &mut self,
        u: usize,
        t: usize,
        f: i32,
        level: &[i32],
        iter: &mut [i64],
    ) -> i32 {
        if u == t || f == 0 {
            return f;
        }
        while iter[u] != -1 {
            let idx = iter[u] as usize;
            let v = self.to[idx];
            if self.cap[idx] > 0 && level[v] == level[u] + 1 {
                let d = self.dfs_blocking(v, t, f.min(self.cap[idx]), level, iter);
                if d > 0 {
                    self.cap[idx] -= d;
                    self.cap[idx ^ 1] += d;
                    return d;
                }
            }
            iter[u] = self.next[idx];
        }
        0
    }

    /// Dinic max-flow from `s` to `t`, stopping early once the flow exceeds
    /// `cap_limit` (the caller only cares whether it is `> cap_limit`).
    fn max_flow(&mut self, s: usize, t: usize, cap_limit: i32) -> i32 {
        let mut flow = 0;
        while flow <= cap_limit {
            let level = match self.bfs_levels(s, t) {
                Some(l) => l,
                None => break,
            };
            let mut iter = self.head.clone();
            loop {
                let f = self.dfs_blocking(s, t, i32::MAX, &level, &mut iter);
                if f == 0 {
                    break;
                }
                flow += f;
            }
        }
        flow
    }
}

fn in_node(v: usize) -> usize {
    2 * v
}
fn out_node(v: usize) -> usize {
    2 * v + 1
}

/// Builds the split vertex-flow network for `graph` restricted to its alive
/// vertices, with `source`/`sink` given infinite (uncapped) internal
/// capacity so the flow measures separation of their neighborhoods rather
/// than their own in/out split.
fn build_network(graph: &CanonicalGraph, source: VertexId, sink: VertexId) -> FlowNetwork {
    let n = graph.capacity();
    let mut net = FlowNetwork::new(2 * n);
    for v in graph.vertices() {
        let idx = v.index();
        let internal_cap = if v == source || v == sink { i32::MAX } else { 1 };
        net.add_edge(in_node(idx), out_node(idx), internal_cap);
    }
    for v in graph.vertices() {
        for u in graph.neighbors(v) {
            if u.index() > v.index() {
                net.add_edge(out_node(v.index()), in_node(u.index()), i32::MAX);
                net.add_edge(out_node(u.index()), in_node(v.index()), i32::MAX);
            }
        }
    }
    net
}

/// Number of vertex-disjoint `u`-`v` paths, capped at `limit + 1` (we only
/// need to know whether it exceeds `limit`).
pub fn vertex_disjoint_path_count(graph: &CanonicalGraph, u: VertexId, v: VertexId, limit: usize) -> usize {
    if graph.has_edge(u, v) {
        // A direct edge is itself one "path"; callers that care about
        // non-adjacent pairs only should filter beforehand.
    }
    let mut net = build_network(graph, u, v);
    let flow = net.max_flow(out_node(u.index()), in_node(v.index()), limit as i32 + 1);
    flow.max(0) as usize
}

/// A minimum vertex separator between non-adjacent `u` and `v`, or `None`
/// if they are adjacent (no separator exists) or disconnected (empty
/// separator).
pub fn minimal_separator(graph: &CanonicalGraph, u: VertexId, v: VertexId) -> Option<Vec<VertexId>> {
    if graph.has_edge(u, v) {
        return None;
    }
    let mut net = build_network(graph, u, v);
    let s = out_node(u.index());
    let t = in_node(v.index());
    let max_flow = net.max_flow(s, t, graph.capacity() as i32);

    // Vertices reachable from `s` in the residual graph after max-flow.
    let mut reachable = vec![false; net.n];
    let mut q = VecDeque::new();
    reachable[s] = true;
    q.push_back(s);
    while let Some(x) = q.pop_front() {
        let mut e = net.head[x];
        while e != -1 {
            let idx = e as usize;
            let y = net.to[idx];
            if net.cap[idx] > 0 && !reachable[y] {
                reachable[y] = true;
                q.push_back(y);
            }
            e = net.next[idx];
        }
    }

    let mut separator = Vec::with_capacity(max_flow as usize);
    for w in graph.vertices() {
        if w == u || w == v {
            continue;
        }
        let idx = w.index();
        if reachable[in_node(idx)] && !reachable[out_node(idx)] {
            separator.push(w);
        }
    }
    Some(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_of_two_triangles_joined_by_a_bridge_vertex() {
        // a-b-c triangle, c-d-e triangle, c is the cut vertex between a and e.
        let mut g = CanonicalGraph::new(5);
        let (a, b, c, d, e) = (
            VertexId::new(0),
            VertexId::new(1),
            VertexId::new(2),
            VertexId::new(3),
            VertexId::new(4),
        );
        g.add_edge(a, b);
        g.add_edge(b, c);
        g.add_edge(a, c);
        g.add_edge(c, d);
        g.add_edge(d, e);
        g.add_edge(c, e);
        let sep = minimal_separator(&g, a, e).unwrap();
        assert_eq!(sep, vec![c]);
    }

    #[test]
    fn disjoint_path_count_caps_out_correctly() {
        // K4 minus nothing: u,v have 3 internally-disjoint paths through
        // the other two vertices plus the direct edge is excluded from the
        // flow network (adjacency is irrelevant to the vertex-split count).
        let mut g = CanonicalGraph::new(4);
        for i in 0..4 {
            for j in (i + 1)..4 {
                g.add_edge(VertexId::new(i), VertexId::new(j));
            }
        }
        let count = vertex_disjoint_path_count(&g, VertexId::new(0), VertexId::new(1), 1);
        assert!(count >= 2);
    }

    #[test]
    fn adjacent_vertices_have_no_separator() {
        let mut g = CanonicalGraph::new(2);
        g.add_edge(VertexId::new(0), VertexId::new(1));
        assert!(minimal_separator(&g, VertexId::new(0), VertexId::new(1)).is_none());
    }
}
