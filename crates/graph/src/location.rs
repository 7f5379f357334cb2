//! Abstract memory location identities.
//!
//! A [`LocationIdentity`] names a class of storage (a field, an array
//! element kind, or "any location") without committing to a concrete
//! address. Memory-ordering decisions everywhere else in the compiler are
//! phrased in terms of the [`aliases`](LocationIdentity::aliases) predicate
//! between two identities.

use std::fmt;

/// An interned token identifying a field declaration.
///
/// The host-runtime metadata provider hands these out; this crate only
/// compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldRef(pub u32);

/// Element kind of an array element location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    I8,
    I16,
    I32,
    I64,
    Object,
}

/// An abstract memory location.
///
/// Two identities are either equal (same location class), provably
/// disjoint, or [`Any`](LocationIdentity::Any), which must be treated as
/// aliasing everything including itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationIdentity {
    /// The wildcard location; aliases every identity, itself included.
    Any,
    /// A field class. Distinct fields are disjoint.
    Field(FieldRef),
    /// An array element class, partitioned by element kind.
    ArrayElement(ElementKind),
    /// Storage that is initialized once and never killed afterwards.
    Immutable(FieldRef),
}

impl LocationIdentity {
    pub const ANY: Self = Self::Any;

    pub fn is_any(self) -> bool {
        matches!(self, Self::Any)
    }

    /// An immutable location may never appear in a kill declaration.
    pub fn is_mutable(self) -> bool {
        !matches!(self, Self::Immutable(_))
    }

    /// Returns `true` unless `self` and `other` provably refer to disjoint
    /// storage.
    ///
    /// Total and side-effect free. `Any` aliases everything; otherwise
    /// equality decides.
    pub fn aliases(self, other: Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for LocationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Any => write!(f, "ANY_LOCATION"),
            Self::Field(field) => write!(f, "field{}", field.0),
            Self::ArrayElement(kind) => write!(f, "array[{kind:?}]"),
            Self::Immutable(field) => write!(f, "immutable field{}", field.0),
        }
    }
}
