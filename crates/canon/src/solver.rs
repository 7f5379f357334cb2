//! Worklist canonicalization driver.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use toccata_graph::{Graph, NodeId, Result};
use tracing::trace;

use crate::rules::{canonical, CanonTool, Canonical};

/// Repeatedly pops candidate nodes, asks for their canonical form, and
/// applies the answer until the worklist drains.
///
/// Re-running a solver on an already-canonical graph performs zero
/// rewrites, and because every rule is local and none re-enables another
/// of the family, the visit order of independent nodes does not change
/// the final graph.
#[derive(Debug, Default)]
pub struct CanonSolver {
    worklist: VecDeque<NodeId>,
    in_list: FxHashSet<NodeId>,
}

impl CanonSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizes every live node to a fixpoint. Returns the number
    /// of rewrites applied.
    pub fn run(&mut self, graph: &mut Graph, tool: &CanonTool) -> Result<usize> {
        self.clear();
        for node in graph.iter_live() {
            self.push(node);
        }
        self.solve(graph, tool)
    }

    /// Canonicalizes starting only from `seeds`, for callers that know
    /// which nodes a preceding pass touched.
    pub fn run_from(
        &mut self,
        graph: &mut Graph,
        tool: &CanonTool,
        seeds: impl IntoIterator<Item = NodeId>,
    ) -> Result<usize> {
        self.clear();
        for node in seeds {
            self.push(node);
        }
        self.solve(graph, tool)
    }

    fn solve(&mut self, graph: &mut Graph, tool: &CanonTool) -> Result<usize> {
        let mut rewrites = 0;
        while let Some(node) = self.pop() {
            if !graph.is_live(node) {
                continue;
            }
            match canonical(graph, node, tool) {
                Canonical::Already => {}
                Canonical::ReplaceFixed(kind) => {
                    self.enqueue_neighborhood(graph, node);
                    let new = graph.add(kind);
                    graph.replace_fixed(node, new)?;
                    self.push(new);
                    trace!(old = ?node, ?new, "replaced with canonical form");
                    rewrites += 1;
                }
                Canonical::Remove => {
                    self.enqueue_neighborhood(graph, node);
                    graph.remove_fixed(node)?;
                    trace!(?node, "removed during canonicalization");
                    rewrites += 1;
                }
            }
        }
        Ok(rewrites)
    }

    /// A rewrite can make the nodes around the rewritten one
    /// non-canonical, so they go back on the list before it is applied.
    fn enqueue_neighborhood(&mut self, graph: &Graph, node: NodeId) {
        if let Some(pred) = graph.predecessor(node) {
            self.push(pred);
        }
        for succ in graph.successors(node) {
            self.push(succ);
        }
        for u in graph.usages(node) {
            self.push(u.user);
        }
        for input in graph.inputs(node) {
            self.push(input.node);
        }
    }

    fn push(&mut self, node: NodeId) {
        if self.in_list.insert(node) {
            self.worklist.push_back(node);
        }
    }

    fn pop(&mut self) -> Option<NodeId> {
        let node = self.worklist.pop_front()?;
        self.in_list.remove(&node);
        Some(node)
    }

    pub fn clear(&mut self) {
        self.worklist.clear();
        self.in_list.clear();
    }
}
