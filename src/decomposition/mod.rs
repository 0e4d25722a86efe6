//! The `TreeDecomposition` model: bags, tree edges, validity checks, and
//! width-improving post-processing (SPEC_FULL.md §3, §4.6).

pub mod bag;
pub use self::bag::*;
pub mod tree;
pub use self::tree::*;
pub mod postprocess;
