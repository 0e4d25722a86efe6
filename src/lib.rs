//! Tree decomposition and tree-width computation: reduction rules,
//! min-fill/min-width bounds, a branch-and-bound exact decomposer, and a
//! SAT-based exact decomposer, tied together by a driver that splits on
//! connected components and clique-separated atoms.
//!
//! The library surface a host binary needs is small: [`io::parse_dimacs`]
//! and [`io::write_pace_td`] at the edges, and the three drivers in
//! [`pipeline`] (`solve_smart`, `solve_exact`, `solve_heuristic`) in
//! between. Everything else is public mainly so the pieces can be tested
//! and benchmarked in isolation.

pub mod bnb;
pub mod bounds;
pub mod config;
pub mod decomposition;
pub mod error;
pub mod graph;
pub mod ids;
pub mod io;
pub mod partition;
pub mod pipeline;
pub mod reduction;
pub mod sat;

pub use config::SolverConfig;
pub use decomposition::TreeDecomposition;
pub use error::{Error, Result};
pub use graph::CanonicalGraph;
pub use ids::{BagId, VertexId};
pub use io::{parse_dimacs, write_pace_td};
pub use pipeline::{solve_exact, solve_heuristic, solve_smart};
