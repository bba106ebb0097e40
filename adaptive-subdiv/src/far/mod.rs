//! `Far` is the primary API layer for turning client-supplied quad meshes into
//! adaptively refined ones.
//!
//! The two main aspects of the process are Topology Refinement and Primvar
//! Refinement.
//!
//! ## Topology Refinement
//! Topology refinement splits the mesh topology to generate new vertices,
//! edges, and faces. Which faces are split is decided per pass: a face is
//! refined as long as the vertices it touched moved by more than a tolerance
//! in the previous pass. Faces bordering a finer neighbor are split into three
//! quads instead of four so the result never contains a T-junction.
//!
//! The main types in `far` related to topology refinement are:
//!
//! * [`TopologyDescriptor`] – Describes a mesh.
//! * [`TopologyRefiner`] – Encapsulates adaptive mesh refinement.
//! * [`TopologyLevel`] – Represents one generation of the mesh.
//! * [`Classification`] – Per-face subdivision states of one pass.
//! * [`RefinementPass`] – The topology one pass produces and how it relates
//!   to the previous generation.
//!
//! ## Vertex Placement
//! New vertices are placed with crease aware weights. Each new vertex is a
//! weighted sum of vertices of the previous generation; these weights are
//! collected in a [`StencilTable`] per pass by the [`VertexSolver`].
//!
//! ## Primitive Variable Refinement
//! Primitive variable (primvar) refinement computes values for primvar data
//! (colors, texture coordinates, etc.) on the refined mesh. The
//! [`PrimvarRefiner`] reuses the stencils of each pass for per-vertex data,
//! so the data follows the geometry exactly.
pub mod topology_descriptor;
pub use topology_descriptor::*;

pub mod topology_level;
pub use topology_level::*;

pub mod classification;
pub use classification::*;

pub mod refinement_pass;
pub use refinement_pass::*;

pub mod stencil_table;
pub use stencil_table::*;

pub mod vertex_solver;
pub use vertex_solver::*;

pub mod topology_refiner;
pub use topology_refiner::*;

pub mod primvar_refiner;
pub use primvar_refiner::*;
