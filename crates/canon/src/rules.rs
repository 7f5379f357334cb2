//! Per-kind canonical-form decisions.
//!
//! A rule looks at one node, its neighbors, its usage set, and the
//! graph's stage flags, and reports what the node's canonical form is.
//! Rules never mutate; applying the decision is the
//! [solver](crate::solver)'s job.

use toccata_graph::{EdgeKind, Graph, NodeId, NodeKind, StageFlag};

/// Outcome of asking a node for its canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    /// The node is already canonical; nothing to do.
    Already,
    /// Replace the node with a fresh fixed node of the given kind,
    /// splicing control edges and usages over.
    ReplaceFixed(NodeKind),
    /// Remove the node entirely, splicing control through it.
    Remove,
}

/// Context a driver hands to rules.
///
/// `all_usages_available` is `false` while the graph is still being
/// built or inlined into; usage-count-based rewrites are unsound on such
/// partial graphs and must report [`Canonical::Already`].
#[derive(Debug, Clone, Copy)]
pub struct CanonTool {
    all_usages_available: bool,
}

impl CanonTool {
    pub fn new(all_usages_available: bool) -> Self {
        Self {
            all_usages_available,
        }
    }

    pub fn all_usages_available(&self) -> bool {
        self.all_usages_available
    }
}

/// Computes the canonical form of `node` under the current graph state.
pub fn canonical(graph: &Graph, node: NodeId, tool: &CanonTool) -> Canonical {
    match graph.kind(node) {
        NodeKind::KillingBegin { .. } | NodeKind::MultiKillingBegin { .. } => {
            canonical_killing_begin(graph, node, tool)
        }
        NodeKind::Begin => canonical_begin(graph, node, tool),
        _ => Canonical::Already,
    }
}

/// The governing predicate for every begin rule: a predecessor with two
/// control successors (an exception shape) pins its begins in place.
fn guards_exception_edge(graph: &Graph, node: NodeId) -> bool {
    graph
        .predecessor(node)
        .is_some_and(|p| graph.kind(p).successor_slots() == 2)
}

/// A killing begin reduces to a plain begin once its kill no longer
/// orders anything.
///
/// Before floating reads are introduced, memory ordering is implicit in
/// control flow and the kill is always removable, except on an exception
/// edge. From that stage on, memory-dependency edges are real graph
/// edges, so the reduction additionally needs full usage information and
/// an empty memory usage set.
fn canonical_killing_begin(graph: &Graph, node: NodeId, tool: &CanonTool) -> Canonical {
    if graph.is_before_stage(StageFlag::FloatingReads) {
        if !guards_exception_edge(graph, node) {
            return Canonical::ReplaceFixed(NodeKind::Begin);
        }
    } else if tool.all_usages_available()
        && !guards_exception_edge(graph, node)
        && !graph.has_usages_of(node, EdgeKind::Memory)
    {
        return Canonical::ReplaceFixed(NodeKind::Begin);
    }
    Canonical::Already
}

/// A plain begin directly after another begin anchors nothing the
/// earlier one could not; with zero usages it can be spliced out.
fn canonical_begin(graph: &Graph, node: NodeId, tool: &CanonTool) -> Canonical {
    if !tool.all_usages_available() {
        return Canonical::Already;
    }
    let Some(pred) = graph.predecessor(node) else {
        return Canonical::Already;
    };
    if !graph.kind(pred).is_begin() {
        return Canonical::Already;
    }
    if graph.usage_count(node) != 0 || graph.successor(node, 0).is_none() {
        return Canonical::Already;
    }
    Canonical::Remove
}

#[cfg(test)]
mod tests {
    use super::*;
    use toccata_graph::{FieldRef, LocationIdentity};

    #[test]
    fn non_begin_kinds_are_always_canonical() {
        let mut graph = Graph::new();
        let ret = graph.add(NodeKind::Return);
        let c = graph.add(NodeKind::Constant { value: 0 });
        let tool = CanonTool::new(true);
        assert_eq!(canonical(&graph, ret, &tool), Canonical::Already);
        assert_eq!(canonical(&graph, c, &tool), Canonical::Already);
        assert_eq!(canonical(&graph, graph.root(), &tool), Canonical::Already);
    }

    #[test]
    fn begin_after_begin_is_removable() {
        let mut graph = Graph::new();
        let b1 = graph.add(NodeKind::Begin);
        let b2 = graph.add(NodeKind::Begin);
        let ret = graph.add(NodeKind::Return);
        graph.set_successor(graph.root(), 0, b1).unwrap();
        graph.set_successor(b1, 0, b2).unwrap();
        graph.set_successor(b2, 0, ret).unwrap();

        let tool = CanonTool::new(true);
        // b1 follows start, not a begin; only b2 collapses.
        assert_eq!(canonical(&graph, b1, &tool), Canonical::Already);
        assert_eq!(canonical(&graph, b2, &tool), Canonical::Remove);

        // Without full usage information neither moves.
        let partial = CanonTool::new(false);
        assert_eq!(canonical(&graph, b2, &partial), Canonical::Already);
    }

    #[test]
    fn begin_after_non_begin_is_the_anchor_point() {
        let mut graph = Graph::new();
        let write = graph.add(NodeKind::Write {
            location: LocationIdentity::Field(FieldRef(0)),
        });
        let begin = graph.add(NodeKind::Begin);
        let ret = graph.add(NodeKind::Return);
        graph.set_successor(graph.root(), 0, write).unwrap();
        graph.set_successor(write, 0, begin).unwrap();
        graph.set_successor(begin, 0, ret).unwrap();

        // Usage-free or not, a begin after a non-begin predecessor is
        // the anchor for that position and stays.
        let tool = CanonTool::new(true);
        assert_eq!(canonical(&graph, begin, &tool), Canonical::Already);
    }

    #[test]
    fn anchored_begin_stays() {
        let mut graph = Graph::new();
        let b1 = graph.add(NodeKind::Begin);
        let b2 = graph.add(NodeKind::Begin);
        let ret = graph.add(NodeKind::Return);
        graph.set_successor(graph.root(), 0, b1).unwrap();
        graph.set_successor(b1, 0, b2).unwrap();
        graph.set_successor(b2, 0, ret).unwrap();

        // A floating node anchored at b2 keeps it alive.
        let read = graph.add(NodeKind::Read {
            location: LocationIdentity::Field(FieldRef(0)),
        });
        graph.add_input(read, EdgeKind::Value, b2).unwrap();

        let tool = CanonTool::new(true);
        assert_eq!(canonical(&graph, b2, &tool), Canonical::Already);
    }
}
