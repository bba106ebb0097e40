//! Error types for the adaptive-subdiv crate.

use thiserror::Error;

/// Main error type for adaptive-subdiv operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid topology descriptor.
    #[error("Invalid topology descriptor: {0}")]
    InvalidTopology(String),

    /// A mesh without faces was handed to the refiner.
    #[error("Mesh has no faces")]
    EmptyMesh,

    /// Walking the faces around a vertex did not close nor hit a boundary.
    #[error("Edge ring around vertex {vertex} does not terminate")]
    CorruptRing { vertex: usize },

    /// The four edges of a face do not connect its four vertices.
    #[error("Edges of face {face} do not form a closed loop")]
    OpenFaceLoop { face: usize },

    /// Classification finished with two faces disagreeing about an edge.
    #[error("Edge {edge} is still critical after classification")]
    UnresolvedCriticalEdge { edge: usize },

    /// Index out of bounds.
    #[error("Index {index} out of bounds (max: {max})")]
    IndexOutOfBounds { index: usize, max: usize },

    /// A raw vertex type code that is not a [`VertexType`](crate::far::VertexType).
    #[error("Invalid vertex type code: {0}")]
    InvalidVertexType(u8),

    /// Invalid buffer size.
    #[error("Invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },

    /// A refinement parameter is out of its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
