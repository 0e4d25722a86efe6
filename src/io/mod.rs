//! The two free functions at the library's I/O boundary (SPEC_FULL.md §6):
//! `parse_dimacs` reads the DIMACS-like tree-width input format into a
//! `CanonicalGraph` plus the bidirectional mapping back to the caller's
//! 1-indexed vertex numbering, and `write_pace_td` renders a solved
//! `TreeDecomposition` as a PACE `.td` file. Everywhere else in the crate
//! operates purely on canonical ids; this module is the only place the
//! caller's numbering is ever seen.

use std::io::Write;

use bimap::BiMap;

use crate::decomposition::tree::TreeDecomposition;
use crate::error::{Error, Result};
use crate::graph::kernel::CanonicalGraph;
use crate::ids::VertexId;

/// Parses the DIMACS-like tree-width format: a `p tw n m` problem line
/// (comment lines starting with `c` are skipped), followed by `m` edge
/// lines `u v` with vertices 1-indexed. Parallel edges are silently
/// deduplicated; a self-loop is rejected with the offending line number.
pub fn parse_dimacs(input: &str) -> Result<(CanonicalGraph, BiMap<usize, VertexId>)> {
    let mut n = None;
    let mut graph = None;
    let mut mapping = BiMap::new();

    for (line_no, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("p tw") {
            let mut fields = rest.split_whitespace();
            let declared_n: usize = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::MalformedInput {
                    line: line_no + 1,
                    reason: "missing vertex count on problem line".to_string(),
                })?;
            n = Some(declared_n);
            graph = Some(CanonicalGraph::new(declared_n));
            for external in 1..=declared_n {
                mapping.insert(external, VertexId::new(external - 1));
            }
            continue;
        }

        let g = graph.as_mut().ok_or_else(|| Error::MalformedInput {
            line: line_no + 1,
            reason: "edge line appeared before the problem line".to_string(),
        })?;
        let total = n.unwrap();

        let mut fields = line.split_whitespace();
        let u: usize = fields.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::MalformedInput {
            line: line_no + 1,
            reason: "edge line missing first endpoint".to_string(),
        })?;
        let v: usize = fields.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::MalformedInput {
            line: line_no + 1,
            reason: "edge line missing second endpoint".to_string(),
        })?;
        if u == 0 || v == 0 || u > total || v > total {
            return Err(Error::MalformedInput {
                line: line_no + 1,
                reason: format!("edge endpoint out of range 1..={total}"),
            });
        }
        if u == v {
            return Err(Error::MalformedInput {
                line: line_no + 1,
                reason: "self-loops are not permitted".to_string(),
            });
        }
        g.add_edge(VertexId::new(u - 1), VertexId::new(v - 1));
    }

    let graph = graph.ok_or_else(|| Error::MalformedInput {
        line: 0,
        reason: "no problem line (\"p tw n m\") found".to_string(),
    })?;
    Ok((graph, mapping))
}

/// Renders `td` as a PACE `.td` file: header line `s td <numBags> <width+1>
/// <n>`, one `b <id> v1 v2 ...` line per bag, then one `i j` line per tree
/// edge, all 1-indexed.
pub fn write_pace_td(td: &TreeDecomposition, out: &mut impl Write) -> std::io::Result<()> {
    let width = (td.width() + 1).max(0);
    writeln!(out, "s td {} {} {}", td.bag_count(), width, td.capacity())?;

    let mut ids: Vec<_> = td.bag_ids().collect();
    ids.sort_by_key(|id| id.index());
    for id in &ids {
        let bag = td.bag(*id);
        write!(out, "b {}", id.index() + 1)?;
        let mut vertices: Vec<usize> = bag.vertices().map(|v| v.index() + 1).collect();
        vertices.sort_unstable();
        for v in vertices {
            write!(out, " {v}")?;
        }
        writeln!(out)?;
    }

    for (a, b) in td.tree_edges() {
        writeln!(out, "{} {}", a.index() + 1, b.index() + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_four_problem() {
        let input = "p tw 4 3\n1 2\n2 3\n3 4\n";
        let (graph, mapping) = parse_dimacs(input).unwrap();
        assert_eq!(graph.vertex_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(mapping.get_by_left(&1), Some(&VertexId::new(0)));
    }

    #[test]
    fn rejects_self_loop_with_line_number() {
        let input = "p tw 2 1\n1 1\n";
        let err = parse_dimacs(input).unwrap_err();
        match err {
            Error::MalformedInput { line, .. } => assert_eq!(line, 2),
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }

    #[test]
    fn deduplicates_parallel_edges() {
        let input = "p tw 2 2\n1 2\n2 1\n";
        let (graph, _mapping) = parse_dimacs(input).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn comment_lines_are_skipped() {
        let input = "c a comment\np tw 2 1\nc another comment\n1 2\n";
        let (graph, _mapping) = parse_dimacs(input).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn round_trips_path_four_to_the_literal_expected_header() {
        let input = "p tw 4 3\n1 2\n2 3\n3 4\n";
        let (graph, _mapping) = parse_dimacs(input).unwrap();
        let perm: Vec<VertexId> = (0..4).map(VertexId::new).collect();
        let td = TreeDecomposition::from_elimination_permutation(&graph, &perm);

        let mut buf = Vec::new();
        write_pace_td(&td, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("s td 3 2 4\n"));
    }
}
