//! Overlap module: state shared between mesh partitions.
//!
//! Partitions overlap on shared nodes; an edge is shared with a rank when both its
//! endpoints are. The [`delta`] submodule describes how edge-state changes on
//! those shared edges fuse across partitions.

pub mod delta;
