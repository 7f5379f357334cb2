//! Compilation stage flags.
//!
//! A [`Graph`](crate::Graph) records which compilation phases have already
//! run as a monotonic set of [`StageFlag`]s. Passes query the flags through
//! `is_before_stage`/`is_after_stage` instead of carrying their own
//! booleans, so "is this rewrite legal yet" has a single source of truth.

use std::fmt;

/// A named compilation phase marker.
///
/// Declaration order is compilation order; the total order over flags is
/// the discriminant order. New stages extend the vocabulary without
/// touching existing callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum StageFlag {
    /// High-tier lowering has replaced language-level operations.
    HighTierLowering,
    /// Memory-dependency edges for reads are first-class graph edges from
    /// this point on; before it, memory ordering is implicit in control
    /// flow.
    FloatingReads,
    /// Guards have been moved to their anchors.
    GuardMovement,
    /// Floating reads have been fixed back into the control flow.
    FixedReads,
    /// Memory accesses have explicit address computations.
    AddressLowering,
}

impl StageFlag {
    pub const ALL: [StageFlag; 5] = [
        StageFlag::HighTierLowering,
        StageFlag::FloatingReads,
        StageFlag::GuardMovement,
        StageFlag::FixedReads,
        StageFlag::AddressLowering,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// The set of stages a graph has completed.
///
/// Flags are only ever added over the lifetime of a graph; see
/// [`Graph::mark_stage`](crate::Graph::mark_stage).
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageFlags(u8);

impl StageFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(self, flag: StageFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// `true` until `flag` is marked, `false` forever after.
    pub fn is_before(self, flag: StageFlag) -> bool {
        !self.is_set(flag)
    }

    pub fn is_after(self, flag: StageFlag) -> bool {
        self.is_set(flag)
    }

    /// Adds `flag` to the set. Returns `false` if it was already set.
    pub(crate) fn mark(&mut self, flag: StageFlag) -> bool {
        if self.is_set(flag) {
            return false;
        }
        self.0 |= flag.bit();
        true
    }

    pub fn iter(self) -> impl Iterator<Item = StageFlag> {
        StageFlag::ALL.into_iter().filter(move |f| self.is_set(*f))
    }
}

impl fmt::Debug for StageFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
