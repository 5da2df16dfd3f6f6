//! Reference split templates for tetrahedra.
//!
//! # Local numbering
//! A tet stores its vertices `v0..v3` (positively oriented) and its edges in the
//! fixed local order
//!
//! | local edge | 0 | 1 | 2 | 3 | 4 | 5 |
//! |------------|---|---|---|---|---|---|
//! | vertices   | (0,1) | (1,2) | (2,0) | (0,3) | (1,3) | (2,3) |
//!
//! Faces are numbered by the opposite vertex: face `i` is the triangle that does not
//! contain `v_i`. Sets of local edges are 6-bit masks (`bit e` ⇔ edge `e`).
//!
//! # Templates
//! Only the isotropic edge-midpoint family is supported:
//! - **1:2** bisection of one edge,
//! - **1:4** subdivision of one face (the apex stays),
//! - **1:8** octasection (four corner tets plus the inner octahedron cut along one
//!   diagonal).
//!
//! Every face of a tet ends up with 0, 1 or 3 split edges under these templates, and
//! the subdivision of a triangle is fully determined by its split edges. Two tets that
//! agree on which shared edges are split therefore agree on the shared face.

use crate::topology::ids::NodeId;
use once_cell::sync::Lazy;
use std::fmt;

/// Vertex pair of each local edge.
pub const EDGE_VERTICES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];

/// Vertices of each face; face `i` is opposite vertex `i`.
pub const FACE_VERTICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];

/// Local edge mask of each face.
pub const FACE_EDGES: [u8; 4] = [0b110010, 0b101100, 0b011001, 0b000111];

/// Mask with all six edges set.
pub const ALL_EDGES: u8 = 0b111111;

/// Octahedron diagonals usable by the 1:8 template: `(edge, opposite edge, ring)`.
/// The ring lists the remaining four edges so that consecutive entries share a vertex.
pub const DIAGONALS: [(usize, usize, [usize; 4]); 3] = [
    (0, 5, [1, 4, 3, 2]),
    (1, 3, [0, 4, 5, 2]),
    (2, 4, [0, 1, 5, 3]),
];

/// Local index of the edge joining local vertices `i` and `j`.
pub fn local_edge(i: usize, j: usize) -> Option<usize> {
    EDGE_VERTICES
        .iter()
        .position(|&[a, b]| (a == i && b == j) || (a == j && b == i))
}

/// Iterate the local edges set in `mask`.
pub fn edges_in(mask: u8) -> impl Iterator<Item = usize> {
    (0..6).filter(move |e| mask & (1 << e) != 0)
}

/// Which template produced (or will produce) a tet's children.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SplitPattern {
    /// Bisection of local edge `edge`.
    OneToTwo { edge: u8 },
    /// Subdivision of local face `face`.
    OneToFour { face: u8 },
    /// Octasection.
    OneToEight,
}

impl SplitPattern {
    /// Local edges split by this pattern.
    pub fn edge_mask(self) -> u8 {
        match self {
            SplitPattern::OneToTwo { edge } => 1 << edge,
            SplitPattern::OneToFour { face } => FACE_EDGES[face as usize],
            SplitPattern::OneToEight => ALL_EDGES,
        }
    }

    /// Template whose split edges are exactly `mask`, if any.
    pub fn from_edge_mask(mask: u8) -> Option<Self> {
        let mask = mask & ALL_EDGES;
        if mask == ALL_EDGES {
            return Some(SplitPattern::OneToEight);
        }
        if mask.count_ones() == 1 {
            return Some(SplitPattern::OneToTwo {
                edge: mask.trailing_zeros() as u8,
            });
        }
        FACE_EDGES
            .iter()
            .position(|&f| f == mask)
            .map(|face| SplitPattern::OneToFour { face: face as u8 })
    }

    /// Number of children the template creates.
    pub fn child_count(self) -> usize {
        match self {
            SplitPattern::OneToTwo { .. } => 2,
            SplitPattern::OneToFour { .. } => 4,
            SplitPattern::OneToEight => 8,
        }
    }
}

impl fmt::Display for SplitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitPattern::OneToTwo { edge } => write!(f, "1:2 on edge {edge}"),
            SplitPattern::OneToFour { face } => write!(f, "1:4 on face {face}"),
            SplitPattern::OneToEight => write!(f, "1:8"),
        }
    }
}

/// Compatibility class of a marked-edge mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkClass {
    /// No edge marked.
    Unmarked,
    /// Class 1: the mask already is a template.
    Compatible(SplitPattern),
    /// Class 2: marking `added` (one edge) completes `pattern`.
    NeedsCompletion { pattern: SplitPattern, added: u8 },
    /// Class 3: irregular; all six edges must be marked.
    Irregular,
}

impl MarkClass {
    /// 1, 2 or 3; 0 for an unmarked tet.
    pub fn number(self) -> u8 {
        match self {
            MarkClass::Unmarked => 0,
            MarkClass::Compatible(_) => 1,
            MarkClass::NeedsCompletion { .. } => 2,
            MarkClass::Irregular => 3,
        }
    }

    /// The template the mask resolves to, `None` when unmarked.
    pub fn target(self) -> Option<SplitPattern> {
        match self {
            MarkClass::Unmarked => None,
            MarkClass::Compatible(p) | MarkClass::NeedsCompletion { pattern: p, .. } => Some(p),
            MarkClass::Irregular => Some(SplitPattern::OneToEight),
        }
    }

    /// Smallest template mask containing the classified mask (0 when unmarked).
    pub fn completed_mask(self) -> u8 {
        self.target().map_or(0, SplitPattern::edge_mask)
    }
}

fn classify_uncached(mask: u8) -> MarkClass {
    if mask == 0 {
        return MarkClass::Unmarked;
    }
    if let Some(p) = SplitPattern::from_edge_mask(mask) {
        return MarkClass::Compatible(p);
    }
    match mask.count_ones() {
        // Two edges sharing a vertex lie on exactly one common face.
        2 => FACE_EDGES
            .iter()
            .position(|&f| f & mask == mask)
            .map_or(MarkClass::Irregular, |face| MarkClass::NeedsCompletion {
                pattern: SplitPattern::OneToFour { face: face as u8 },
                added: FACE_EDGES[face] & !mask,
            }),
        5 => MarkClass::NeedsCompletion {
            pattern: SplitPattern::OneToEight,
            added: ALL_EDGES & !mask,
        },
        _ => MarkClass::Irregular,
    }
}

static CLASSIFICATION: Lazy<[MarkClass; 64]> = Lazy::new(|| {
    let mut table = [MarkClass::Unmarked; 64];
    for (mask, slot) in table.iter_mut().enumerate() {
        *slot = classify_uncached(mask as u8);
    }
    table
});

/// Classify a marked-edge mask (classes tried 1 → 2 → 3).
#[inline]
pub fn classify(mask: u8) -> MarkClass {
    CLASSIFICATION[(mask & ALL_EDGES) as usize]
}

/// Child connectivity of `pattern` applied to a tet with `vertices`.
///
/// `midpoints[e]` must hold the split node of every local edge in the pattern;
/// `diagonal` selects the entry of [`DIAGONALS`] used by the 1:8 interior and is
/// ignored otherwise. Returns `None` when a required midpoint is missing.
///
/// Children are built by vertex replacement and keep the parent's orientation,
/// except the inner 1:8 tets whose orientation depends on the diagonal; callers
/// orient those with coordinates.
pub fn subdivide(
    pattern: SplitPattern,
    vertices: [NodeId; 4],
    midpoints: &[Option<NodeId>; 6],
    diagonal: usize,
) -> Option<Vec<[NodeId; 4]>> {
    let mid = |i: usize, j: usize| local_edge(i, j).and_then(|e| midpoints[e]);
    match pattern {
        SplitPattern::OneToTwo { edge } => {
            let [i, j] = EDGE_VERTICES[edge as usize];
            let m = midpoints[edge as usize]?;
            let mut first = vertices;
            first[j] = m;
            let mut second = vertices;
            second[i] = m;
            Some(vec![first, second])
        }
        SplitPattern::OneToFour { face } => {
            let [a, b, c] = FACE_VERTICES[face as usize];
            let (mab, mbc, mca) = (mid(a, b)?, mid(b, c)?, mid(c, a)?);
            let replace = |pairs: [(usize, NodeId); 2]| {
                let mut t = vertices;
                for (slot, n) in pairs {
                    t[slot] = n;
                }
                t
            };
            let mut center = vertices;
            center[a] = mab;
            center[b] = mbc;
            center[c] = mca;
            Some(vec![
                replace([(b, mab), (c, mca)]),
                replace([(a, mab), (c, mbc)]),
                replace([(a, mca), (b, mbc)]),
                center,
            ])
        }
        SplitPattern::OneToEight => {
            let mut children = Vec::with_capacity(8);
            for v in 0..4 {
                let mut t = vertices;
                for (w, slot) in t.iter_mut().enumerate() {
                    if w != v {
                        *slot = mid(v, w)?;
                    }
                }
                children.push(t);
            }
            let (p, q, ring) = DIAGONALS[diagonal % DIAGONALS.len()];
            let (mp, mq) = (midpoints[p]?, midpoints[q]?);
            for k in 0..4 {
                let r0 = midpoints[ring[k]]?;
                let r1 = midpoints[ring[(k + 1) % 4]]?;
                children.push([mp, r0, r1, mq]);
            }
            Some(children)
        }
    }
}
