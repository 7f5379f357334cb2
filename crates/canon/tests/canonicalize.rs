//! End-to-end canonicalization scenarios for the killing-begin rule
//! family.

use toccata_canon::{canonicalize_all, CanonSolver, CanonTool};
use toccata_graph::{EdgeKind, FieldRef, Graph, LocationIdentity, NodeId, NodeKind, StageFlag};

fn field(n: u32) -> LocationIdentity {
    LocationIdentity::Field(FieldRef(n))
}

/// `start -> write(f0) -> killing_begin(f1) -> return`.
fn chain_with_kill(kill_kind: NodeKind) -> (Graph, NodeId, NodeId, NodeId) {
    let mut graph = Graph::new();
    let write = graph.add(NodeKind::Write { location: field(0) });
    let kill = graph.add(kill_kind);
    let ret = graph.add(NodeKind::Return);
    graph.set_successor(graph.root(), 0, write).unwrap();
    graph.set_successor(write, 0, kill).unwrap();
    graph.set_successor(kill, 0, ret).unwrap();
    (graph, write, kill, ret)
}

/// Before the floating-reads stage a usage-free killing begin behind a
/// plain predecessor reduces to a plain begin.
#[test]
fn kill_reduces_before_floating_reads() {
    let (mut graph, write, kill, ret) = chain_with_kill(NodeKind::KillingBegin {
        location: field(1),
    });

    let tool = CanonTool::new(true);
    let rewrites = CanonSolver::new().run(&mut graph, &tool).unwrap();
    assert_eq!(rewrites, 1);
    assert!(!graph.is_live(kill));

    let begin = graph.successor(write, 0).unwrap();
    assert_eq!(*graph.kind(begin), NodeKind::Begin);
    assert_eq!(graph.successor(begin, 0), Some(ret));
}

/// Before the floating-reads stage the reduction does not depend on the
/// usage set: a memory edge hung on the kill early is dropped with it.
#[test]
fn kill_with_premature_memory_usage_still_reduces() {
    let (mut graph, write, kill, ret) = chain_with_kill(NodeKind::KillingBegin {
        location: field(1),
    });
    let read = graph.add(NodeKind::Read { location: field(1) });
    graph.add_input(read, EdgeKind::Memory, kill).unwrap();

    let tool = CanonTool::new(true);
    let rewrites = CanonSolver::new().run(&mut graph, &tool).unwrap();
    assert_eq!(rewrites, 1);
    assert!(!graph.is_live(kill));
    assert!(graph.inputs(read).is_empty());

    let begin = graph.successor(write, 0).unwrap();
    assert_eq!(*graph.kind(begin), NodeKind::Begin);
    assert_eq!(graph.successor(begin, 0), Some(ret));
}

/// An exception-edge predecessor pins the kill in place at any stage.
#[test]
fn kill_behind_exception_edge_is_pinned() {
    let mut graph = Graph::new();
    let call = graph.add(NodeKind::WithException);
    let kill = graph.add(NodeKind::KillingBegin {
        location: field(1),
    });
    let exceptional = graph.add(NodeKind::Begin);
    let ret = graph.add(NodeKind::Return);
    let unwind = graph.add(NodeKind::Return);
    graph.set_successor(graph.root(), 0, call).unwrap();
    graph.set_successor(call, 0, kill).unwrap();
    graph.set_successor(call, 1, exceptional).unwrap();
    graph.set_successor(kill, 0, ret).unwrap();
    graph.set_successor(exceptional, 0, unwind).unwrap();

    let tool = CanonTool::new(true);
    let rewrites = CanonSolver::new().run(&mut graph, &tool).unwrap();
    assert_eq!(rewrites, 0);
    assert!(matches!(graph.kind(kill), NodeKind::KillingBegin { .. }));

    // Marking the stage does not unpin it either.
    graph.mark_stage(StageFlag::FloatingReads).unwrap();
    let rewrites = CanonSolver::new().run(&mut graph, &tool).unwrap();
    assert_eq!(rewrites, 0);
    assert!(matches!(graph.kind(kill), NodeKind::KillingBegin { .. }));
}

/// After floating reads, a memory usage keeps the kill alive; dropping
/// the usage makes the next pass reduce it.
#[test]
fn kill_reduces_once_memory_usage_is_gone() {
    let (mut graph, write, kill, _ret) = chain_with_kill(NodeKind::KillingBegin {
        location: field(1),
    });
    graph.mark_stage(StageFlag::FloatingReads).unwrap();

    let read = graph.add(NodeKind::Read { location: field(1) });
    graph.add_input(read, EdgeKind::Memory, kill).unwrap();

    let tool = CanonTool::new(true);
    assert_eq!(CanonSolver::new().run(&mut graph, &tool).unwrap(), 0);
    assert!(matches!(graph.kind(kill), NodeKind::KillingBegin { .. }));

    graph.remove_input(read, EdgeKind::Memory, kill).unwrap();
    assert_eq!(CanonSolver::new().run(&mut graph, &tool).unwrap(), 1);
    assert!(!graph.is_live(kill));
    assert_eq!(*graph.kind(graph.successor(write, 0).unwrap()), NodeKind::Begin);
}

/// Without full usage information nothing reduces after the stage, no
/// matter the usage count.
#[test]
fn partial_graphs_are_left_alone() {
    let (mut graph, _write, kill, _ret) = chain_with_kill(NodeKind::KillingBegin {
        location: field(1),
    });
    graph.mark_stage(StageFlag::FloatingReads).unwrap();

    let partial = CanonTool::new(false);
    assert_eq!(CanonSolver::new().run(&mut graph, &partial).unwrap(), 0);
    assert!(matches!(graph.kind(kill), NodeKind::KillingBegin { .. }));
}

/// The multi-kill variant follows the same state machine.
#[test]
fn multi_kill_reduces_like_single_kill() {
    let (mut graph, write, kill, _ret) =
        chain_with_kill(NodeKind::multi_killing_begin([field(1), field(2)]));

    let tool = CanonTool::new(true);
    assert_eq!(CanonSolver::new().run(&mut graph, &tool).unwrap(), 1);
    assert!(!graph.is_live(kill));
    assert_eq!(*graph.kind(graph.successor(write, 0).unwrap()), NodeKind::Begin);
}

/// Canonicalizing an already-canonical graph performs zero rewrites.
#[test]
fn canonicalization_is_idempotent() {
    let (mut graph, _write, _kill, _ret) = chain_with_kill(NodeKind::KillingBegin {
        location: field(1),
    });

    let tool = CanonTool::new(true);
    let first = CanonSolver::new().run(&mut graph, &tool).unwrap();
    assert!(first > 0);
    assert_eq!(CanonSolver::new().run(&mut graph, &tool).unwrap(), 0);
    assert_eq!(CanonSolver::new().run(&mut graph, &tool).unwrap(), 0);
}

/// `start -> kill(f1) -> kill(f2) -> return`, canonicalized from
/// different seed orders, ends in the same shape: a single plain begin.
#[test]
fn visit_order_does_not_change_the_result() {
    fn build() -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::new();
        let k1 = graph.add(NodeKind::KillingBegin {
            location: field(1),
        });
        let k2 = graph.add(NodeKind::KillingBegin {
            location: field(2),
        });
        let ret = graph.add(NodeKind::Return);
        graph.set_successor(graph.root(), 0, k1).unwrap();
        graph.set_successor(k1, 0, k2).unwrap();
        graph.set_successor(k2, 0, ret).unwrap();
        (graph, k1, k2)
    }

    fn shape(graph: &Graph) -> Vec<NodeKind> {
        let mut kinds = Vec::new();
        let mut cursor = Some(graph.root());
        while let Some(node) = cursor {
            kinds.push(graph.kind(node).clone());
            cursor = graph.successor(node, 0);
        }
        kinds
    }

    let tool = CanonTool::new(true);

    let (mut forward, f1, f2) = build();
    CanonSolver::new()
        .run_from(&mut forward, &tool, [f1, f2])
        .unwrap();

    let (mut backward, b1, b2) = build();
    CanonSolver::new()
        .run_from(&mut backward, &tool, [b2, b1])
        .unwrap();

    let expected = vec![NodeKind::Start, NodeKind::Begin, NodeKind::Return];
    assert_eq!(shape(&forward), expected);
    assert_eq!(shape(&backward), expected);
}

/// Merge/end association edges survive canonicalization untouched.
#[test]
fn merge_shape_is_preserved() {
    let mut graph = Graph::new();
    let call = graph.add(NodeKind::WithException);
    let normal = graph.add(NodeKind::Begin);
    let exceptional = graph.add(NodeKind::Begin);
    let end1 = graph.add(NodeKind::End);
    let end2 = graph.add(NodeKind::End);
    let merge = graph.add(NodeKind::Merge);
    let ret = graph.add(NodeKind::Return);

    graph.set_successor(graph.root(), 0, call).unwrap();
    graph.set_successor(call, 0, normal).unwrap();
    graph.set_successor(call, 1, exceptional).unwrap();
    graph.set_successor(normal, 0, end1).unwrap();
    graph.set_successor(exceptional, 0, end2).unwrap();
    graph.set_successor(merge, 0, ret).unwrap();
    graph.add_input(merge, EdgeKind::Association, end1).unwrap();
    graph.add_input(merge, EdgeKind::Association, end2).unwrap();

    let tool = CanonTool::new(true);
    let rewrites = CanonSolver::new().run(&mut graph, &tool).unwrap();
    assert_eq!(rewrites, 0);
    assert!(graph.is_live(normal));
    assert!(graph.is_live(exceptional));
    assert_eq!(graph.usage_count(end1), 1);
    assert_eq!(graph.usage_count(end2), 1);
}

/// Independent graphs canonicalize on parallel workers with no shared
/// mutable state.
#[test]
fn parallel_canonicalization_over_independent_graphs() {
    let mut graphs: Vec<Graph> = (0..8)
        .map(|i| {
            let (graph, ..) = chain_with_kill(NodeKind::KillingBegin {
                location: field(i),
            });
            graph
        })
        .collect();

    let total = canonicalize_all(&mut graphs, CanonTool::new(true)).unwrap();
    assert_eq!(total, 8);
    for graph in &graphs {
        assert!(graph
            .iter_live()
            .all(|n| !matches!(graph.kind(n), NodeKind::KillingBegin { .. })));
    }
}
