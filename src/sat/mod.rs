//! SAT-based exact decomposer (SPEC_FULL.md §4.5): an ordering/arc CNF
//! encoding, incremental cardinality constraints, a `SatOracle` trait with
//! a default adapter, and the iterative decision procedure that drives it.

pub mod cardinality;
pub mod decomposer;
pub mod encoding;
pub mod formula;
pub mod oracle;
