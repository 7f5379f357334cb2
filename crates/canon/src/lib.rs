//! Canonicalization passes for the toccata graph IR.
//!
//! [`rules`] decides per-node canonical forms, [`solver`] applies them
//! through a worklist, and [`canonicalize_all`] fans a solver out over
//! independent graphs in parallel. Every graph is owned by exactly one
//! worker for the duration of its run; the only shared state is the
//! read-only [`CanonTool`].

pub mod rules;
pub mod solver;

pub use rules::{canonical, CanonTool, Canonical};
pub use solver::CanonSolver;

use rayon::prelude::*;
use toccata_graph::{Graph, Result};

/// Canonicalizes each graph on a separate worker. Returns the total
/// number of rewrites across all graphs.
pub fn canonicalize_all(graphs: &mut [Graph], tool: CanonTool) -> Result<usize> {
    let counts: Vec<Result<usize>> = graphs
        .par_iter_mut()
        .map(|graph| CanonSolver::new().run(graph, &tool))
        .collect();
    counts.into_iter().try_fold(0, |acc, count| Ok(acc + count?))
}
