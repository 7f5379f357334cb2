//! Node kinds and their static capabilities.
//!
//! The node catalogue is a closed set of tagged variants. Everything the
//! rest of the crate needs to know about a kind — how many control
//! successors it has, which locations it kills, which usage kinds may
//! point at it, what it costs — is answered by capability queries on
//! [`NodeKind`], never by downcasting.

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use crate::location::LocationIdentity;

/// An opaque reference to a node in a [`Graph`](crate::Graph).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);
entity_impl!(NodeId, "node");

/// The type of an input edge.
///
/// Control flow is expressed through successor lists, not input edges, so
/// there is no control kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// A data dependency.
    Value,
    /// A memory-ordering dependency on a kill or read.
    Memory,
    /// A structural link, e.g. a merge referencing its forwarding ends.
    Association,
}

/// Estimated execution cost class of a node. Consumed by scheduling;
/// opaque metadata at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CycleClass {
    Cycles0,
    Cycles1,
    Cycles2,
    CyclesUnknown,
}

/// Estimated code size class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeClass {
    Size0,
    Size1,
    Size2,
    SizeUnknown,
}

/// Static cost descriptor attached to every node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeCost {
    pub cycles: CycleClass,
    pub size: SizeClass,
}

impl NodeCost {
    pub const FREE: Self = Self {
        cycles: CycleClass::Cycles0,
        size: SizeClass::Size0,
    };

    const fn new(cycles: CycleClass, size: SizeClass) -> Self {
        Self { cycles, size }
    }
}

/// The closed node catalogue.
///
/// This is a representative slice of a production catalogue: the control
/// skeleton (start/begin/merge/exception shapes), the memory-kill family,
/// and just enough floating value/memory kinds to exercise the framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Graph root; one successor.
    Start,
    /// Plain control anchor: a fixed point floating nodes may attach to.
    Begin,
    /// A begin that kills a single memory location. Reads and writes of
    /// that location anchored here are ordered after this point.
    KillingBegin { location: LocationIdentity },
    /// A begin killing a declared set of locations.
    MultiKillingBegin {
        locations: SmallVec<[LocationIdentity; 2]>,
    },
    /// A node with a normal and an exceptional successor. The begin on
    /// each successor edge is structurally required.
    WithException,
    /// Forwards control to a merge.
    End,
    /// Joins several ends; referenced by them through association edges.
    Merge,
    /// Graph exit with an optional value input.
    Return,
    /// Floating function parameter.
    Param { index: u32 },
    /// Floating constant.
    Constant { value: i64 },
    /// Floating memory read. Once floating reads are introduced it
    /// carries a memory input naming the kill it is ordered after.
    Read { location: LocationIdentity },
    /// Fixed memory write; kills its location.
    Write { location: LocationIdentity },
}

impl NodeKind {
    pub fn multi_killing_begin(locations: impl IntoIterator<Item = LocationIdentity>) -> Self {
        Self::MultiKillingBegin {
            locations: locations.into_iter().collect(),
        }
    }

    /// Number of control successor slots this kind carries.
    pub fn successor_slots(&self) -> usize {
        match self {
            Self::Start
            | Self::Begin
            | Self::KillingBegin { .. }
            | Self::MultiKillingBegin { .. }
            | Self::Merge
            | Self::Write { .. } => 1,
            Self::WithException => 2,
            Self::End
            | Self::Return
            | Self::Param { .. }
            | Self::Constant { .. }
            | Self::Read { .. } => 0,
        }
    }

    /// A fixed node participates in control flow; a floating node is
    /// ordered only by its dependencies.
    pub fn is_fixed(&self) -> bool {
        !matches!(
            self,
            Self::Param { .. } | Self::Constant { .. } | Self::Read { .. }
        )
    }

    pub fn is_begin(&self) -> bool {
        matches!(
            self,
            Self::Begin | Self::KillingBegin { .. } | Self::MultiKillingBegin { .. }
        )
    }

    /// The memory-kill capability: the locations this node invalidates.
    /// Empty for non-killing kinds.
    pub fn killed_locations(&self) -> &[LocationIdentity] {
        match self {
            Self::KillingBegin { location } | Self::Write { location } => {
                std::slice::from_ref(location)
            }
            Self::MultiKillingBegin { locations } => locations,
            _ => &[],
        }
    }

    /// Whether this node invalidates storage that may alias `location`.
    pub fn kills(&self, location: LocationIdentity) -> bool {
        self.killed_locations().iter().any(|l| l.aliases(location))
    }

    /// The usage kinds that may point at a node of this kind.
    ///
    /// Memory usages are only meaningful on nodes that produce or kill
    /// memory state; [`Graph::add_input`](crate::Graph::add_input) and
    /// [`Graph::replace_at_usages`](crate::Graph::replace_at_usages)
    /// enforce this.
    pub fn allowed_usage_kinds(&self) -> &'static [EdgeKind] {
        match self {
            Self::Start
            | Self::KillingBegin { .. }
            | Self::MultiKillingBegin { .. }
            | Self::Read { .. } => &[EdgeKind::Value, EdgeKind::Memory],
            Self::Write { .. } => &[EdgeKind::Memory],
            Self::Begin | Self::WithException | Self::Param { .. } | Self::Constant { .. } => {
                &[EdgeKind::Value]
            }
            Self::End => &[EdgeKind::Association],
            Self::Merge => &[EdgeKind::Value, EdgeKind::Association],
            Self::Return => &[],
        }
    }

    pub fn cost(&self) -> NodeCost {
        match self {
            Self::Start
            | Self::Begin
            | Self::KillingBegin { .. }
            | Self::MultiKillingBegin { .. }
            | Self::End
            | Self::Merge
            | Self::Param { .. } => NodeCost::FREE,
            Self::Constant { .. } => NodeCost::new(CycleClass::Cycles0, SizeClass::Size1),
            Self::WithException | Self::Return => {
                NodeCost::new(CycleClass::Cycles1, SizeClass::Size1)
            }
            Self::Read { .. } | Self::Write { .. } => {
                NodeCost::new(CycleClass::Cycles2, SizeClass::Size1)
            }
        }
    }

    pub fn as_text(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Begin => "begin",
            Self::KillingBegin { .. } => "killing_begin",
            Self::MultiKillingBegin { .. } => "multi_killing_begin",
            Self::WithException => "with_exception",
            Self::End => "end",
            Self::Merge => "merge",
            Self::Return => "return",
            Self::Param { .. } => "param",
            Self::Constant { .. } => "const",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
        }
    }
}
