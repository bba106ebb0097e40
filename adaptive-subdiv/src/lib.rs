//#![warn(missing_docs)]
//! # Adaptive Quad Mesh Subdivision
//!
//! A tolerance driven, feature adaptive subdivision engine for quadrilateral
//! control meshes with creases.
//!
//! Given a quad mesh with a per-edge *smoothness* and a per-vertex
//! [`VertexType`](far::VertexType), the engine repeatedly
//!
//! 1. decides, face by face, whether a face still needs refinement,
//! 2. makes that decision topologically consistent across neighbors (faces
//!    next to a finer neighbor on two sides become three-quad *Y* faces, so
//!    no T-junctions appear),
//! 3. builds the next generation of vertices, edges and faces, and
//! 4. places the vertices with crease aware *BLZ* weights,
//!
//! until no vertex moves by more than a tolerance or a maximum depth is
//! reached.
//!
//! ## Example
//!
//! ```
//! use adaptive_subdiv::far::{AdaptiveRefinementOptions, TopologyDescriptor, TopologyRefiner};
//!
//! // A single unit quad.
//! let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
//! let control = TopologyDescriptor::new(4, &positions, &[0, 1, 2, 3])?.into_level()?;
//!
//! let mut refiner = TopologyRefiner::new(
//!     control,
//!     AdaptiveRefinementOptions {
//!         tolerance: 0.0,
//!         max_depth: 1,
//!         ..Default::default()
//!     },
//! )?;
//! refiner.refine_adaptive(&[])?;
//!
//! let level = refiner.level();
//! assert_eq!(level.vertex_count(), 9);
//! assert_eq!(level.edge_count(), 12);
//! assert_eq!(level.face_count(), 4);
//! # Ok::<(), adaptive_subdiv::Error>(())
//! ```
//!
//! ## Features
#![doc = document_features::document_features!()]
//!
//! ## Conventions
//!
//! * Faces are quads with counter-clockwise winding. Edge `i` of a face
//!   connects its vertex `i` with vertex `(i + 1) % 4`.
//! * Indices are [`Index`]es (`u32`). Anything that can only be positive
//!   (counts, depths, valences) is `usize`.
//! * A refinement never mutates a level in place. Each pass builds a fresh
//!   [`TopologyLevel`](far::TopologyLevel) and the old one is dropped.

pub mod error;
pub mod far;
pub mod normals;

#[cfg(feature = "tri_mesh_buffers")]
pub mod tri_mesh_buffers;

pub use error::{Error, Result};

/// A vertex, edge, or face index in the topology.
///
/// # Examples
///
/// ```
/// use adaptive_subdiv::Index;
///
/// // Create an index from a u32
/// let idx = Index::from(42u32);
/// assert_eq!(idx.0, 42);
///
/// // Convert back to usize
/// let as_usize: usize = idx.into();
/// assert_eq!(as_usize, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{_0}")]
#[repr(transparent)]
pub struct Index(pub u32);

impl Index {
    /// Returns the index as a `usize`, for addressing slices.
    #[inline]
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Index {
    fn from(value: u32) -> Self {
        Index(value)
    }
}

impl From<Index> for u32 {
    fn from(index: Index) -> Self {
        index.0
    }
}

impl From<usize> for Index {
    fn from(value: usize) -> Self {
        Index(value as u32)
    }
}

impl From<Index> for usize {
    fn from(index: Index) -> Self {
        index.0 as usize
    }
}

#[macro_use]
extern crate derive_more;
