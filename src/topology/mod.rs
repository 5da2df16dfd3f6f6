//! Mesh topology of one partition.
//!
//! This module provides the stores behind the adaptation engine:
//! - [`ids`]: node, edge and tet identifiers
//! - [`node_connectivity`], [`edge_store`], [`tet_store`], [`active`]: arena stores
//!   that never forget a record
//! - [`templates`]: local numbering, split patterns and the mark classification
//! - [`refine`] and [`coarsen`]: the refine/derefine operators
//! - [`validation`]: conformity, manifold and orientation checks
//!
//! Most users will only touch [`mesh::TetMesh`] through [`crate::adapt::MeshAdapter`].

pub mod active;
pub mod coarsen;
pub mod edge_store;
pub mod ids;
pub mod mesh;
pub mod node_connectivity;
pub mod refine;
pub mod templates;
pub mod tet_store;
pub mod validation;

pub use ids::{EdgeId, EdgeKey, NodeId, TetId};
pub use mesh::{InitialMesh, TetMesh};
