//! The mutable undirected working graph (§4.1) and the structural queries
//! built on top of it: connected components, clique-minimal-separator
//! atoms, and the Dinic-style vertex flow backing minimum separators and
//! disjoint-path counts.

pub mod kernel;
pub mod flow;
pub mod components;
pub use self::kernel::{CanonicalGraph, EliminationInfo};
pub use self::components::{atoms, connected_components, induced_subgraph};
