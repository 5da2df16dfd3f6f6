//! Strong handles for mesh entities.
//!
//! - [`NodeId`]: global node identity, a transparent `NonZeroU64` (0 is reserved as
//!   an invalid sentinel). Node ids must agree across partitions, so they are what
//!   travels on the wire.
//! - [`EdgeId`] / [`TetId`]: partition-local arena indices into the
//!   [`EdgeStore`](crate::topology::edge_store::EdgeStore) and
//!   [`TetStore`](crate::topology::tet_store::TetStore). They are stable for the
//!   lifetime of the mesh because records are never deleted.
//! - [`EdgeKey`]: the sorted node pair of an edge; the cross-partition identity of
//!   an edge.

use crate::amr_error::AmrError;
use std::{fmt, num::NonZeroU64};

/// Global node identity.
///
/// # Memory layout
/// `repr(transparent)` over `NonZeroU64`, so `Option<NodeId>` is 8 bytes and the id
/// can be shipped as a plain `u64`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct NodeId(NonZeroU64);

impl NodeId {
    /// Creates a new `NodeId` from a raw `u64` value.
    ///
    /// # Errors
    /// [`AmrError::InvalidNodeId`] if `raw == 0`.
    ///
    /// ```rust
    /// # use tet_amr::topology::ids::NodeId;
    /// let n = NodeId::new(7).unwrap();
    /// assert_eq!(n.get(), 7);
    /// assert!(NodeId::new(0).is_err());
    /// ```
    #[inline]
    pub fn new(raw: u64) -> Result<Self, AmrError> {
        NonZeroU64::new(raw)
            .map(NodeId)
            .ok_or(AmrError::InvalidNodeId)
    }

    /// Returns the inner `u64` value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeId").field(&self.get()).finish()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(feature = "mpi-support")]
unsafe impl mpi::datatype::Equivalence for NodeId {
    type Out = <u64 as mpi::datatype::Equivalence>::Out;

    fn equivalent_datatype() -> Self::Out {
        u64::equivalent_datatype()
    }
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug,
            serde::Serialize, serde::Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(index: u32) -> Self {
                $name(index)
            }

            /// Position in the owning arena.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Handle of the record at `index`; arenas are capped at `u32::MAX` records.
            pub(crate) fn from_index(index: usize) -> Result<Self, AmrError> {
                u32::try_from(index)
                    .ok()
                    .filter(|&i| i < u32::MAX)
                    .map($name)
                    .ok_or(AmrError::ArenaOverflow {
                        arena: stringify!($name),
                    })
            }
        }
    };
}

arena_id!(
    /// Partition-local edge handle.
    EdgeId
);
arena_id!(
    /// Partition-local tetrahedron handle.
    TetId
);

/// Unordered node pair identifying an edge, stored sorted.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct EdgeKey {
    lo: NodeId,
    hi: NodeId,
}

impl EdgeKey {
    /// Build the key of the edge `a`–`b`. Endpoints may be given in any order;
    /// a degenerate pair (`a == b`) yields `None`.
    #[inline]
    pub fn new(a: NodeId, b: NodeId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(EdgeKey { lo: a, hi: b }),
            std::cmp::Ordering::Greater => Some(EdgeKey { lo: b, hi: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    #[inline]
    pub fn nodes(self) -> [NodeId; 2] {
        [self.lo, self.hi]
    }

    #[inline]
    pub fn contains(self, n: NodeId) -> bool {
        self.lo == n || self.hi == n
    }
}

impl fmt::Debug for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeKey({}-{})", self.lo, self.hi)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}
