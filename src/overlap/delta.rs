//! Delta rules: how edge-state fragments from a neighbouring partition fuse with
//! the local state.
//!
//! Both marking algorithms are monotone. Refinement only ever adds marks, so an
//! incoming mark is OR-ed in; derefinement only ever removes marks, so an incoming
//! unmark is AND-ed in. Either way a fragment can be applied any number of times
//! and in any order with the same result.

use crate::topology::ids::EdgeKey;

/// *Delta* encapsulates restriction & fusion for an edge flag of type `V`.
pub trait Delta<V>: Sized {
    /// What a *restricted* value looks like (often identical to `V`).
    type Part: Send;

    /// Extract the part of `v` that travels to a neighbour.
    fn restrict(v: &V) -> Self::Part;

    /// Merge an incoming fragment into the local value.
    fn fuse(local: &mut V, incoming: Self::Part);
}

/// `needs_refinement`: once marked anywhere, marked everywhere.
#[derive(Copy, Clone, Debug)]
pub struct RefineMarkDelta;

impl Delta<bool> for RefineMarkDelta {
    type Part = bool;
    #[inline]
    fn restrict(v: &bool) -> bool {
        *v
    }
    #[inline]
    fn fuse(local: &mut bool, incoming: bool) {
        *local |= incoming;
    }
}

/// `needs_derefinement`: survives only if every partition keeps it.
#[derive(Copy, Clone, Debug)]
pub struct DerefineMarkDelta;

impl Delta<bool> for DerefineMarkDelta {
    type Part = bool;
    #[inline]
    fn restrict(v: &bool) -> bool {
        *v
    }
    #[inline]
    fn fuse(local: &mut bool, incoming: bool) {
        *local &= incoming;
    }
}

/// The only two state changes that cross partition boundaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeltaKind {
    /// `needs_refinement` became true.
    MarkRefine,
    /// `needs_derefinement` became false.
    UnmarkDerefine,
}

impl DeltaKind {
    /// Flag value the change carries.
    #[inline]
    pub fn part(self) -> bool {
        match self {
            DeltaKind::MarkRefine => RefineMarkDelta::restrict(&true),
            DeltaKind::UnmarkDerefine => DerefineMarkDelta::restrict(&false),
        }
    }

    /// Apply the change to a local flag; returns whether it changed.
    pub fn fuse_into(self, local: &mut bool) -> bool {
        let before = *local;
        match self {
            DeltaKind::MarkRefine => RefineMarkDelta::fuse(local, self.part()),
            DeltaKind::UnmarkDerefine => DerefineMarkDelta::fuse(local, self.part()),
        }
        before != *local
    }
}

/// One edge-state change addressed by the partition-independent edge key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeDelta {
    pub key: EdgeKey,
    pub kind: DeltaKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refine_marks_or() {
        let mut v = false;
        assert!(DeltaKind::MarkRefine.fuse_into(&mut v));
        assert!(v);
        assert!(!DeltaKind::MarkRefine.fuse_into(&mut v));
        RefineMarkDelta::fuse(&mut v, false);
        assert!(v);
    }

    #[test]
    fn derefine_marks_and() {
        let mut v = true;
        DerefineMarkDelta::fuse(&mut v, true);
        assert!(v);
        assert!(DeltaKind::UnmarkDerefine.fuse_into(&mut v));
        assert!(!v);
        DerefineMarkDelta::fuse(&mut v, true);
        assert!(!v);
    }
}
