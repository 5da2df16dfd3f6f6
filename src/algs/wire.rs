//! Fixed, versioned, little-endian wire types for boundary messages.
//!
//! A message is one [`WireHdr`] followed by `count` records of the kind's record
//! type. Votes carry no records; their flag travels in `count`.

use crate::amr_error::AmrError;
use crate::overlap::delta::{DeltaKind, EdgeDelta};
use crate::topology::ids::{EdgeKey, NodeId};
use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Record kinds carried in [`WireHdr::kind`].
pub const KIND_DELTAS: u16 = 1;
pub const KIND_VOTE: u16 = 2;
pub const KIND_NODE_PROPOSALS: u16 = 3;
pub const KIND_COMMIT: u16 = 4;

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), AmrError> {
    if actual == expected {
        Ok(())
    } else {
        Err(AmrError::Wire(format!(
            "expected {expected} bytes, got {actual}"
        )))
    }
}

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16, // = WIRE_VERSION.to_le()
    pub kind_le: u16,
    pub round_le: u32,
    pub count_le: u32,
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16, round: u32, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            round_le: round.to_le(),
            count_le: (count as u32).to_le(),
            reserved_le: 0,
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn round(&self) -> u32 {
        u32::from_le(self.round_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

/// An edge-state change: the edge key and the [`DeltaKind`] code.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireEdgeDelta {
    pub lo_le: u64,
    pub hi_le: u64,
    pub kind_le: u32, // 1 = mark refine, 2 = unmark derefine
    pub _pad: u32,
}

impl WireEdgeDelta {
    pub fn new(d: &EdgeDelta) -> Self {
        let [lo, hi] = d.key.nodes();
        let kind: u32 = match d.kind {
            DeltaKind::MarkRefine => 1,
            DeltaKind::UnmarkDerefine => 2,
        };
        Self {
            lo_le: lo.get().to_le(),
            hi_le: hi.get().to_le(),
            kind_le: kind.to_le(),
            _pad: 0,
        }
    }

    pub fn decode(&self) -> Result<EdgeDelta, AmrError> {
        let key = decode_key(self.lo_le, self.hi_le)?;
        let kind = match u32::from_le(self.kind_le) {
            1 => DeltaKind::MarkRefine,
            2 => DeltaKind::UnmarkDerefine,
            other => return Err(AmrError::Wire(format!("unknown delta kind {other}"))),
        };
        Ok(EdgeDelta { key, kind })
    }
}

/// A proposed split-node id for a shared edge.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireProposal {
    pub lo_le: u64,
    pub hi_le: u64,
    pub node_le: u64,
}

impl WireProposal {
    pub fn new(key: EdgeKey, node: NodeId) -> Self {
        let [lo, hi] = key.nodes();
        Self {
            lo_le: lo.get().to_le(),
            hi_le: hi.get().to_le(),
            node_le: node.get().to_le(),
        }
    }

    pub fn decode(&self) -> Result<(EdgeKey, NodeId), AmrError> {
        Ok((
            decode_key(self.lo_le, self.hi_le)?,
            decode_node(self.node_le)?,
        ))
    }
}

fn decode_node(raw_le: u64) -> Result<NodeId, AmrError> {
    NodeId::new(u64::from_le(raw_le)).map_err(|_| AmrError::Wire("zero node id".into()))
}

fn decode_key(lo_le: u64, hi_le: u64) -> Result<EdgeKey, AmrError> {
    EdgeKey::new(decode_node(lo_le)?, decode_node(hi_le)?)
        .ok_or_else(|| AmrError::Wire("degenerate edge".into()))
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WireHdr>() == 16);
    assert!(size_of::<WireEdgeDelta>() == 24);
    assert!(align_of::<WireEdgeDelta>() == 8);
    assert!(size_of::<WireProposal>() == 24);
};

/// What partitions tell each other during a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundaryMessage {
    /// Edge-state changes on edges shared with the receiver.
    Deltas(Vec<EdgeDelta>),
    /// Termination vote of one exchange round.
    Vote { pending: bool },
    /// Proposed ids for new split nodes on shared edges.
    NodeProposals(Vec<(EdgeKey, NodeId)>),
    /// Commit vote at the end of a cycle.
    Commit { ready: bool },
}

impl BoundaryMessage {
    pub fn kind(&self) -> u16 {
        match self {
            BoundaryMessage::Deltas(_) => KIND_DELTAS,
            BoundaryMessage::Vote { .. } => KIND_VOTE,
            BoundaryMessage::NodeProposals(_) => KIND_NODE_PROPOSALS,
            BoundaryMessage::Commit { .. } => KIND_COMMIT,
        }
    }

    /// Serialize with the exchange round number `round`.
    pub fn encode(&self, round: u32) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            BoundaryMessage::Deltas(ds) => {
                out.extend_from_slice(bytemuck::bytes_of(&WireHdr::new(self.kind(), round, ds.len())));
                for d in ds {
                    out.extend_from_slice(bytemuck::bytes_of(&WireEdgeDelta::new(d)));
                }
            }
            BoundaryMessage::NodeProposals(ps) => {
                out.extend_from_slice(bytemuck::bytes_of(&WireHdr::new(self.kind(), round, ps.len())));
                for &(k, n) in ps {
                    out.extend_from_slice(bytemuck::bytes_of(&WireProposal::new(k, n)));
                }
            }
            BoundaryMessage::Vote { pending: flag } | BoundaryMessage::Commit { ready: flag } => {
                out.extend_from_slice(bytemuck::bytes_of(&WireHdr::new(
                    self.kind(),
                    round,
                    usize::from(*flag),
                )));
            }
        }
        out
    }

    /// Parse a message; returns its round number and payload.
    pub fn decode(bytes: &[u8]) -> Result<(u32, BoundaryMessage), AmrError> {
        let hdr_len = size_of::<WireHdr>();
        if bytes.len() < hdr_len {
            return Err(AmrError::Wire(format!("short message: {} bytes", bytes.len())));
        }
        let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..hdr_len]);
        if hdr.version() != WIRE_VERSION {
            return Err(AmrError::Wire(format!(
                "wire version {} (expected {WIRE_VERSION})",
                hdr.version()
            )));
        }
        let body = &bytes[hdr_len..];
        let msg = match hdr.kind() {
            KIND_DELTAS => BoundaryMessage::Deltas(records::<WireEdgeDelta, _>(
                body,
                hdr.count(),
                WireEdgeDelta::decode,
            )?),
            KIND_NODE_PROPOSALS => BoundaryMessage::NodeProposals(records::<WireProposal, _>(
                body,
                hdr.count(),
                WireProposal::decode,
            )?),
            KIND_VOTE => {
                expect_exact_len(body.len(), 0)?;
                BoundaryMessage::Vote {
                    pending: hdr.count() != 0,
                }
            }
            KIND_COMMIT => {
                expect_exact_len(body.len(), 0)?;
                BoundaryMessage::Commit {
                    ready: hdr.count() != 0,
                }
            }
            other => return Err(AmrError::Wire(format!("unknown message kind {other}"))),
        };
        Ok((hdr.round(), msg))
    }
}

fn records<W: Pod, T>(
    body: &[u8],
    count: usize,
    decode: impl Fn(&W) -> Result<T, AmrError>,
) -> Result<Vec<T>, AmrError> {
    let size = size_of::<W>();
    expect_exact_len(body.len(), count * size)?;
    body.chunks_exact(size)
        .map(|chunk| decode(&bytemuck::pod_read_unaligned::<W>(chunk)))
        .collect()
}
