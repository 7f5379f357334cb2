//! The mutable node graph.
//!
//! Nodes live in an entity arena and are referenced by stable
//! [`NodeId`]s. Input edges and control successor edges each maintain a
//! derived reverse view (usage sets and predecessor lists) that is updated
//! in the same mutation, so the forward and reverse views can never
//! disagree. Deleted slots are tombstoned, never reused, so a stale handle
//! fails loudly instead of aliasing a new node.

use std::collections::BTreeSet;

use cranelift_entity::{packed_option::PackedOption, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::{
    error::{GraphError, Result},
    location::LocationIdentity,
    node::{EdgeKind, NodeId, NodeKind},
    stage::{StageFlag, StageFlags},
};

/// A typed input edge, stored on the using node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub kind: EdgeKind,
    pub node: NodeId,
}

/// A reverse entry in a node's usage set: `user` has at least one input
/// edge of `kind` pointing at the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Use {
    pub user: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    live: bool,
    inputs: SmallVec<[Input; 4]>,
    succs: SmallVec<[PackedOption<NodeId>; 2]>,
}

pub struct Graph {
    nodes: PrimaryMap<NodeId, NodeData>,
    users: SecondaryMap<NodeId, BTreeSet<Use>>,
    preds: SecondaryMap<NodeId, SmallVec<[NodeId; 2]>>,
    stages: StageFlags,
    root: NodeId,
}

impl Graph {
    /// Creates a graph containing only its [`NodeKind::Start`] root.
    pub fn new() -> Self {
        let mut nodes = PrimaryMap::default();
        let root = nodes.push(NodeData {
            kind: NodeKind::Start,
            live: true,
            inputs: SmallVec::new(),
            succs: SmallVec::from_elem(PackedOption::default(), 1),
        });
        Self {
            nodes,
            users: SecondaryMap::new(),
            preds: SecondaryMap::new(),
            stages: StageFlags::new(),
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    // ---------------------------------------------------------- stages

    pub fn stages(&self) -> StageFlags {
        self.stages
    }

    pub fn is_before_stage(&self, flag: StageFlag) -> bool {
        self.stages.is_before(flag)
    }

    pub fn is_after_stage(&self, flag: StageFlag) -> bool {
        self.stages.is_after(flag)
    }

    /// Records that the given compilation phase has completed. Flags are
    /// monotonic; marking one twice indicates a mis-sequenced pipeline.
    pub fn mark_stage(&mut self, flag: StageFlag) -> Result<()> {
        if !self.stages.mark(flag) {
            return Err(GraphError::StageAlreadyMarked {
                flag,
                stages: self.stages,
            });
        }
        Ok(())
    }

    // ----------------------------------------------------- node access

    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        debug_assert!(kind.killed_locations().iter().all(|l| l.is_mutable()));
        let slots = kind.successor_slots();
        self.nodes.push(NodeData {
            kind,
            live: true,
            inputs: SmallVec::new(),
            succs: SmallVec::from_elem(PackedOption::default(), slots),
        })
    }

    /// Adds a node with its input edges wired in one step. Unlike
    /// [`Graph::add`], kill declarations are validated in every build.
    pub fn add_with_inputs(
        &mut self,
        kind: NodeKind,
        inputs: &[(EdgeKind, NodeId)],
    ) -> Result<NodeId> {
        self.ensure_killable(&kind)?;
        let node = self.add(kind);
        for &(kind, target) in inputs {
            self.add_input(node, kind, target)?;
        }
        Ok(node)
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        debug_assert!(self.nodes[node].live);
        &self.nodes[node].kind
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        self.nodes.is_valid(node) && self.nodes[node].live
    }

    pub fn iter_live(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter_map(|(id, data)| data.live.then_some(id))
    }

    pub fn live_count(&self) -> usize {
        self.iter_live().count()
    }

    // ----------------------------------------------------- input edges

    pub fn inputs(&self, node: NodeId) -> &[Input] {
        &self.nodes[node].inputs
    }

    /// Adds an input edge of `kind` from `user` to `target` and records
    /// the reverse usage in the same mutation.
    pub fn add_input(&mut self, user: NodeId, kind: EdgeKind, target: NodeId) -> Result<()> {
        self.ensure_live(user)?;
        self.ensure_live(target)?;
        if !self.nodes[target].kind.allowed_usage_kinds().contains(&kind) {
            return Err(GraphError::DisallowedUsage {
                node: target,
                user,
                kind,
            });
        }
        self.nodes[user].inputs.push(Input { kind, node: target });
        self.users[target].insert(Use { user, kind });
        Ok(())
    }

    /// Removes one input edge of `kind` from `user` to `target`. The
    /// reverse usage entry is dropped only when this was the last such
    /// edge, which keeps the symmetry invariant exact for duplicates.
    pub fn remove_input(&mut self, user: NodeId, kind: EdgeKind, target: NodeId) -> Result<()> {
        self.ensure_live(user)?;
        let inputs = &mut self.nodes[user].inputs;
        let Some(pos) = inputs
            .iter()
            .position(|i| i.kind == kind && i.node == target)
        else {
            return Err(GraphError::InvariantViolation {
                reason: "no such input edge",
                node: user,
                stages: self.stages,
            });
        };
        inputs.remove(pos);
        if !inputs.iter().any(|i| i.kind == kind && i.node == target) {
            self.users[target].remove(&Use { user, kind });
        }
        Ok(())
    }

    // ----------------------------------------------------------- usages

    pub fn usages(&self, node: NodeId) -> impl Iterator<Item = Use> + '_ {
        self.users[node].iter().copied()
    }

    pub fn usage_count(&self, node: NodeId) -> usize {
        self.users[node].len()
    }

    pub fn has_usages_of(&self, node: NodeId, kind: EdgeKind) -> bool {
        self.users[node].iter().any(|u| u.kind == kind)
    }

    /// Snapshot of the usage set, for diagnostics.
    pub fn usage_snapshot(&self, node: NodeId) -> Vec<(NodeId, EdgeKind)> {
        self.users[node].iter().map(|u| (u.user, u.kind)).collect()
    }

    /// Rewires every input edge pointing at `old` to point at `new`.
    /// `old` has zero usages afterwards. Fails without partial rewiring
    /// if any existing usage kind is not allowed on `new`.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        self.ensure_live(old)?;
        self.ensure_live(new)?;
        debug_assert_ne!(old, new);

        let allowed = self.nodes[new].kind.allowed_usage_kinds();
        if let Some(bad) = self.users[old].iter().find(|u| !allowed.contains(&u.kind)) {
            return Err(GraphError::DisallowedUsage {
                node: new,
                user: bad.user,
                kind: bad.kind,
            });
        }

        let uses = std::mem::take(&mut self.users[old]);
        for u in &uses {
            for input in &mut self.nodes[u.user].inputs {
                if input.node == old {
                    input.node = new;
                }
            }
        }
        self.users[new].extend(uses);
        Ok(())
    }

    // ------------------------------------------------- successor edges

    pub fn successor(&self, node: NodeId, slot: usize) -> Option<NodeId> {
        self.nodes[node].succs.get(slot).and_then(|s| s.expand())
    }

    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node].succs.iter().filter_map(|s| s.expand())
    }

    pub fn predecessors(&self, node: NodeId) -> &[NodeId] {
        &self.preds[node]
    }

    /// The unique control predecessor, or `None` if there are zero or
    /// several.
    pub fn predecessor(&self, node: NodeId) -> Option<NodeId> {
        match self.preds[node].as_slice() {
            [pred] => Some(*pred),
            _ => None,
        }
    }

    pub fn set_successor(&mut self, node: NodeId, slot: usize, succ: NodeId) -> Result<()> {
        self.ensure_live(node)?;
        self.ensure_live(succ)?;
        debug_assert!(self.nodes[succ].kind.is_fixed());
        if slot >= self.nodes[node].succs.len() {
            return Err(GraphError::InvariantViolation {
                reason: "successor slot out of range",
                node,
                stages: self.stages,
            });
        }
        if let Some(old) = self.nodes[node].succs[slot].expand() {
            self.unlink_pred(old, node);
        }
        self.nodes[node].succs[slot] = succ.into();
        self.preds[succ].push(node);
        Ok(())
    }

    pub fn clear_successor(&mut self, node: NodeId, slot: usize) -> Result<Option<NodeId>> {
        self.ensure_live(node)?;
        if slot >= self.nodes[node].succs.len() {
            return Err(GraphError::InvariantViolation {
                reason: "successor slot out of range",
                node,
                stages: self.stages,
            });
        }
        let old = self.nodes[node].succs[slot].take();
        if let Some(old) = old {
            self.unlink_pred(old, node);
        }
        Ok(old)
    }

    fn unlink_pred(&mut self, node: NodeId, pred: NodeId) {
        let preds = &mut self.preds[node];
        if let Some(pos) = preds.iter().position(|p| *p == pred) {
            preds.remove(pos);
        }
    }

    fn successor_slot_of(&self, pred: NodeId, node: NodeId) -> Option<usize> {
        self.nodes[pred]
            .succs
            .iter()
            .position(|s| s.expand() == Some(node))
    }

    // --------------------------------------------------------- removal

    /// Deletes a node.
    ///
    /// Precondition (two branches, both load-bearing): the node has zero
    /// memory usages, or the graph is still before
    /// [`StageFlag::FloatingReads`], where memory usages are not yet
    /// meaningful. Usages of any other kind always block deletion, and a
    /// begin guarding the successor edge of a two-successor node may not
    /// be deleted at any stage.
    pub fn delete(&mut self, node: NodeId) -> Result<()> {
        self.ensure_live(node)?;

        let blocking: Vec<Use> = self.users[node]
            .iter()
            .filter(|u| {
                u.kind != EdgeKind::Memory || !self.stages.is_before(StageFlag::FloatingReads)
            })
            .copied()
            .collect();
        if !blocking.is_empty() {
            return Err(GraphError::DeleteWithUsages {
                node,
                usages: blocking.iter().map(|u| (u.user, u.kind)).collect(),
                stages: self.stages,
            });
        }

        if self.nodes[node].kind.is_begin() {
            let guards_exception = self
                .predecessor(node)
                .is_some_and(|p| self.nodes[p].kind.successor_slots() == 2);
            if guards_exception {
                return Err(GraphError::InvariantViolation {
                    reason: "cannot delete begin guarding an exception edge",
                    node,
                    stages: self.stages,
                });
            }
        }

        // Pre-floating-reads memory usages are dropped together with the
        // node, so the users keep no dangling edges.
        let stale = std::mem::take(&mut self.users[node]);
        for u in &stale {
            self.nodes[u.user].inputs.retain(|i| i.node != node);
        }

        let inputs = std::mem::take(&mut self.nodes[node].inputs);
        for input in inputs {
            self.users[input.node].remove(&Use {
                user: node,
                kind: input.kind,
            });
        }

        for slot in 0..self.nodes[node].succs.len() {
            if let Some(succ) = self.nodes[node].succs[slot].take() {
                self.unlink_pred(succ, node);
            }
        }

        let preds = std::mem::take(&mut self.preds[node]);
        for p in preds {
            if let Some(slot) = self.successor_slot_of(p, node) {
                self.nodes[p].succs[slot] = PackedOption::default();
            }
        }

        self.nodes[node].live = false;
        Ok(())
    }

    /// Removes a single-successor fixed node from the control flow,
    /// splicing its predecessors through to its successor, then deletes
    /// it. The deletion precondition of [`Graph::delete`] applies.
    pub fn remove_fixed(&mut self, node: NodeId) -> Result<()> {
        self.ensure_live(node)?;
        if let Some(succ) = self.successor(node, 0) {
            self.clear_successor(node, 0)?;
            for p in self.preds[node].clone() {
                if let Some(slot) = self.successor_slot_of(p, node) {
                    self.set_successor(p, slot, succ)?;
                }
            }
        }
        self.delete(node)
    }

    /// Replaces a fixed node in place: usages, predecessor links, and
    /// successor edges all move to `new`, then `old` is deleted.
    ///
    /// Memory usages of `old` that `new` cannot admit are dropped rather
    /// than rewired while the graph is still before
    /// [`StageFlag::FloatingReads`], matching [`Graph::delete`]; at or
    /// after that stage they make the replacement fail.
    pub fn replace_fixed(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        self.ensure_live(old)?;
        self.ensure_live(new)?;
        if self.stages.is_before(StageFlag::FloatingReads)
            && !self.nodes[new]
                .kind
                .allowed_usage_kinds()
                .contains(&EdgeKind::Memory)
        {
            self.drop_premature_memory_usages(old);
        }
        self.replace_at_usages(old, new)?;

        for p in self.preds[old].clone() {
            if let Some(slot) = self.successor_slot_of(p, old) {
                self.set_successor(p, slot, new)?;
            }
        }
        for slot in 0..self.nodes[old].succs.len() {
            if let Some(succ) = self.clear_successor(old, slot)? {
                self.set_successor(new, slot, succ)?;
            }
        }
        self.delete(old)
    }

    /// Anchors `next` behind a begin that kills `location`. If `next` is
    /// already a killing begin it is returned as-is; otherwise a fresh
    /// [`NodeKind::KillingBegin`] is spliced in front of it.
    pub fn begin_anchoring(&mut self, next: NodeId, location: LocationIdentity) -> Result<NodeId> {
        self.ensure_live(next)?;
        if matches!(self.nodes[next].kind, NodeKind::KillingBegin { .. }) {
            return Ok(next);
        }
        let kind = NodeKind::KillingBegin { location };
        self.ensure_killable(&kind)?;
        let begin = self.add(kind);
        for p in self.preds[next].clone() {
            if let Some(slot) = self.successor_slot_of(p, next) {
                self.set_successor(p, slot, begin)?;
            }
        }
        self.set_successor(begin, 0, next)?;
        Ok(begin)
    }

    fn ensure_killable(&self, kind: &NodeKind) -> Result<()> {
        if let Some(location) = kind.killed_locations().iter().find(|l| !l.is_mutable()) {
            return Err(GraphError::ImmutableKill {
                location: *location,
                stages: self.stages,
            });
        }
        Ok(())
    }

    /// Drops every memory usage of `node` together with the forward
    /// edges. Only legal before [`StageFlag::FloatingReads`], where
    /// memory edges are not yet meaningful.
    fn drop_premature_memory_usages(&mut self, node: NodeId) {
        debug_assert!(self.stages.is_before(StageFlag::FloatingReads));
        let stale: Vec<Use> = self.users[node]
            .iter()
            .filter(|u| u.kind == EdgeKind::Memory)
            .copied()
            .collect();
        for u in stale {
            self.nodes[u.user]
                .inputs
                .retain(|i| !(i.kind == EdgeKind::Memory && i.node == node));
            self.users[node].remove(&u);
        }
    }

    fn ensure_live(&self, node: NodeId) -> Result<()> {
        if !self.is_live(node) {
            return Err(GraphError::InvariantViolation {
                reason: "reference to deleted node",
                node,
                stages: self.stages,
            });
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
