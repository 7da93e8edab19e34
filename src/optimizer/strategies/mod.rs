//! Optimization Strategies
//!
//! Exact dispatch optimizers behind the [`DispatchOptimizer`](super::DispatchOptimizer)
//! seam. The rule-based fallback lives in [`fallback`](super::fallback) because
//! it never fails and needs no strategy plumbing.
//! - MILP: Mixed-integer linear programming optimizer (good_lp)

pub mod milp;

pub use milp::*;
