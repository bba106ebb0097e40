//! One generation of a quad mesh and the queries to walk it.
//!
//! A [`TopologyLevel`] is a flat structure-of-arrays: vertices, edges and
//! faces refer to each other only through [`Index`]es. Each face stores its
//! four vertices and four edges in winding order and each edge stores the (at
//! most two) faces it borders. That is enough to walk the faces around a
//! vertex without a full half-edge structure, see [`TopologyLevel::ring()`].
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{Error, Index, Result};

pub type Point = ultraviolet::Vec3;
pub type Vector = ultraviolet::Vec3;

/// Sharpness at or above which an edge is infinitely sharp.
///
/// The value 10 is chosen for historical reasons. An edge with a smoothness
/// of `0` maps to this and stays sharp across any number of passes.
pub const MAX_SHARPNESS: f32 = 10.0;

pub(crate) const EPSILON: f32 = 1.0e-12;

/// How the subdivision rules treat a vertex.
#[repr(u8)]
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive, Display,
)]
pub enum VertexType {
    /// Positioned by the smooth rule unless incident creases say otherwise.
    #[display("smooth")]
    Smooth = 0,
    /// Lies on a crease curve.
    #[display("crease")]
    Crease = 1,
    /// Never moves.
    #[display("corner")]
    Corner = 2,
}

impl VertexType {
    /// Converts a raw type code, as found in flat host buffers.
    pub fn from_code(code: u8) -> Result<Self> {
        Self::try_from(code).map_err(|_| Error::InvalidVertexType(code))
    }
}

/// A vertex of a [`TopologyLevel`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: Point,
    pub kind: VertexType,
    /// Any one incident edge. `None` for isolated vertices.
    pub first_edge: Option<Index>,
}

impl Vertex {
    #[inline]
    pub fn new(position: Point, kind: VertexType) -> Self {
        Self {
            position,
            kind,
            first_edge: None,
        }
    }
}

/// An edge of a [`TopologyLevel`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Edge {
    pub vertices: [Index; 2],
    /// `faces[0]` is the face in which the edge runs `vertices[0] ->
    /// vertices[1]`, `faces[1]` the one in which it runs backwards. The
    /// latter is `None` on a boundary.
    pub faces: [Option<Index>; 2],
    /// `1` is fully smooth, `0` fully sharp.
    pub smoothness: f32,
}

impl Edge {
    /// Returns `true` if only one face borders this edge.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.faces[1].is_none()
    }

    /// Returns the sharpness of this edge in `[0, MAX_SHARPNESS)` or
    /// infinity.
    ///
    /// Boundary edges are always infinitely sharp.
    pub fn sharpness(&self) -> f32 {
        if self.is_boundary() {
            return f32::INFINITY;
        }
        let sharpness = (1.0 - self.smoothness.clamp(0.0, 1.0)) * MAX_SHARPNESS;
        if MAX_SHARPNESS <= sharpness {
            f32::INFINITY
        } else {
            sharpness
        }
    }

    /// Returns the vertex at the other end of the edge.
    #[inline]
    pub fn other_vertex(&self, vertex: Index) -> Option<Index> {
        if self.vertices[0] == vertex {
            Some(self.vertices[1])
        } else if self.vertices[1] == vertex {
            Some(self.vertices[0])
        } else {
            None
        }
    }
}

/// A quad face of a [`TopologyLevel`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Face {
    pub vertices: [Index; 4],
    /// `edges[i]` connects `vertices[i]` and `vertices[(i + 1) % 4]`.
    pub edges: [Index; 4],
}

impl Face {
    /// Returns the local index of `vertex` in this face.
    #[inline]
    pub fn corner(&self, vertex: Index) -> Option<usize> {
        self.vertices.iter().position(|&v| v == vertex)
    }

    /// Returns the local index of `edge` in this face.
    #[inline]
    pub fn slot(&self, edge: Index) -> Option<usize> {
        self.edges.iter().position(|&e| e == edge)
    }
}

/// The edges around a vertex, in order, and the faces between them.
///
/// For a closed ring `faces[i]` lies between `edges[i]` and
/// `edges[(i + 1) % len]`. For an open (boundary) ring it lies between
/// `edges[i]` and `edges[i + 1]`, so there is one face less than edges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ring {
    pub edges: Vec<Index>,
    pub faces: Vec<Index>,
    pub closed: bool,
}

impl Ring {
    /// Number of faces incident to the vertex.
    #[inline]
    pub fn valence(&self) -> usize {
        self.faces.len()
    }

    /// Returns the two edges the face at `position` in [`faces`](Self::faces)
    /// lies between.
    #[inline]
    pub fn face_edges(&self, position: usize) -> (Index, Index) {
        let next = (position + 1) % self.edges.len();
        (self.edges[position], self.edges[next])
    }
}

/// One complete, self-consistent generation of a quad mesh.
///
/// Levels are immutable once built. A refinement pass produces a new level
/// from an old one; see [`TopologyRefiner`](super::TopologyRefiner).
#[derive(Clone, Debug, Default)]
pub struct TopologyLevel {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) faces: Vec<Face>,
}

/// ### Methods to Inspect the Overall Inventory of Components
impl TopologyLevel {
    /// Creates a level from its component arrays.
    ///
    /// The `first_edge` of every vertex is recomputed. The result is
    /// validated, see [`validate()`](Self::validate).
    pub fn from_parts(vertices: Vec<Vertex>, edges: Vec<Edge>, faces: Vec<Face>) -> Result<Self> {
        let level = Self::from_parts_unchecked(vertices, edges, faces);
        level.validate()?;
        Ok(level)
    }

    pub(crate) fn from_parts_unchecked(
        vertices: Vec<Vertex>,
        edges: Vec<Edge>,
        faces: Vec<Face>,
    ) -> Self {
        let mut level = Self {
            vertices,
            edges,
            faces,
        };
        level.link_first_edges();
        level
    }

    fn link_first_edges(&mut self) {
        for vertex in self.vertices.iter_mut() {
            vertex.first_edge = None;
        }
        for (index, edge) in self.edges.iter().enumerate() {
            for v in edge.vertices {
                if let Some(vertex) = self.vertices.get_mut(v.get()) {
                    vertex.first_edge.get_or_insert(index.into());
                }
            }
        }
    }

    /// Returns the number of vertices in this level.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the number of edges in this level.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the number of faces in this level.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[inline]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[inline]
    pub fn vertex(&self, vertex: Index) -> Option<&Vertex> {
        self.vertices.get(vertex.get())
    }

    #[inline]
    pub fn edge(&self, edge: Index) -> Option<&Edge> {
        self.edges.get(edge.get())
    }

    #[inline]
    pub fn face(&self, face: Index) -> Option<&Face> {
        self.faces.get(face.get())
    }

    /// Returns the vertex positions as nested `[x, y, z]` triples.
    pub fn points(&self) -> Vec<[f32; 3]> {
        self.vertices
            .iter()
            .map(|v| [v.position.x, v.position.y, v.position.z])
            .collect()
    }

    /// Returns an iterator over the face vertices of this level.
    pub fn face_vertices_iter(&self) -> FaceVerticesIter<'_> {
        FaceVerticesIter {
            faces: self.faces.iter(),
        }
    }
}

/// An iterator over the face vertices of a [`TopologyLevel`].
#[derive(Clone)]
pub struct FaceVerticesIter<'a> {
    faces: std::slice::Iter<'a, Face>,
}

impl<'a> Iterator for FaceVerticesIter<'a> {
    type Item = &'a [Index];

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.faces.next().map(|face| &face.vertices[..])
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.faces.size_hint()
    }
}

impl ExactSizeIterator for FaceVerticesIter<'_> {}

/// ### Methods to Inspect Topological Relationships for Individual Components
impl TopologyLevel {
    /// Returns the vertex following `vertex` in the winding of `face`.
    #[inline]
    pub fn next_vertex(&self, vertex: Index, face: Index) -> Option<Index> {
        let face = self.face(face)?;
        face.corner(vertex).map(|i| face.vertices[(i + 1) % 4])
    }

    /// Returns the vertex preceding `vertex` in the winding of `face`.
    #[inline]
    pub fn prev_vertex(&self, vertex: Index, face: Index) -> Option<Index> {
        let face = self.face(face)?;
        face.corner(vertex).map(|i| face.vertices[(i + 3) % 4])
    }

    /// Returns the vertex diagonally across `face` from `vertex`.
    #[inline]
    pub fn opposite_vertex(&self, vertex: Index, face: Index) -> Option<Index> {
        let face = self.face(face)?;
        face.corner(vertex).map(|i| face.vertices[(i + 2) % 4])
    }

    /// Returns the edges and faces around `vertex`, in order.
    ///
    /// The walk goes from face to face, each time taking the other edge of
    /// the current face that touches the vertex. It stops when it arrives
    /// back at the start edge (interior vertex) or at an edge with no face
    /// on the far side (boundary vertex). In the latter case the walk is
    /// repeated from the other side of the start edge and both halves are
    /// joined.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptRing`] if the walk neither closes nor reaches a
    /// boundary within `edge_count() + 1` steps, or visits a face that does
    /// not contain the vertex.
    pub fn ring(&self, vertex: Index) -> Result<Ring> {
        let start = match self.vertex(vertex) {
            Some(v) => match v.first_edge {
                Some(edge) => edge,
                None => return Ok(Ring::default()),
            },
            None => {
                return Err(Error::IndexOutOfBounds {
                    index: vertex.get(),
                    max: self.vertices.len(),
                })
            }
        };
        let start_faces = self
            .edge(start)
            .ok_or(Error::CorruptRing {
                vertex: vertex.get(),
            })?
            .faces;

        let (forward_edges, forward_faces, closed) = self.walk(vertex, start, start_faces[0])?;
        if closed {
            return Ok(Ring {
                edges: forward_edges,
                faces: forward_faces,
                closed: true,
            });
        }

        let (backward_edges, backward_faces) = match start_faces[1] {
            Some(face) => {
                let (edges, faces, closed) = self.walk(vertex, start, Some(face))?;
                if closed {
                    // One direction closed the loop, the other did not.
                    return Err(Error::CorruptRing {
                        vertex: vertex.get(),
                    });
                }
                (edges, faces)
            }
            None => (vec![start], Vec::new()),
        };

        let mut edges: Vec<Index> = backward_edges.into_iter().rev().collect();
        edges.extend(forward_edges.into_iter().skip(1));
        let mut faces: Vec<Index> = backward_faces.into_iter().rev().collect();
        faces.extend(forward_faces);

        Ok(Ring {
            edges,
            faces,
            closed: false,
        })
    }

    fn walk(
        &self,
        vertex: Index,
        start: Index,
        first_face: Option<Index>,
    ) -> Result<(Vec<Index>, Vec<Index>, bool)> {
        let corrupt = || Error::CorruptRing {
            vertex: vertex.get(),
        };
        let mut edges = vec![start];
        let mut faces = Vec::new();
        let mut edge = start;
        let mut face = first_face;

        for _ in 0..=self.edges.len() {
            let Some(current) = face else {
                return Ok((edges, faces, false));
            };
            faces.push(current);

            let quad = self.face(current).ok_or_else(corrupt)?;
            let corner = quad.corner(vertex).ok_or_else(corrupt)?;
            let (outgoing, incoming) = (quad.edges[corner], quad.edges[(corner + 3) % 4]);
            let next = if outgoing == edge {
                incoming
            } else if incoming == edge {
                outgoing
            } else {
                return Err(corrupt());
            };

            if next == start {
                return Ok((edges, faces, true));
            }
            edges.push(next);

            let [a, b] = self.edge(next).ok_or_else(corrupt)?.faces;
            face = if a == Some(current) {
                b
            } else if b == Some(current) {
                a
            } else {
                return Err(corrupt());
            };
            edge = next;
        }

        Err(corrupt())
    }

    /// Identify the edge matching the given vertex pair.
    pub fn find_edge(&self, vertex0: Index, vertex1: Index) -> Option<Index> {
        let ring = self.ring(vertex0).ok()?;
        ring.edges.into_iter().find(|&e| {
            self.edges[e.get()].other_vertex(vertex0) == Some(vertex1)
        })
    }

    /// Returns `true` if the edge is a boundary.
    #[inline]
    pub fn is_edge_boundary(&self, edge: Index) -> bool {
        self.edge(edge).is_some_and(Edge::is_boundary)
    }

    /// Returns `true` if the vertex is on a boundary.
    pub fn is_vertex_boundary(&self, vertex: Index) -> Result<bool> {
        let ring = self.ring(vertex)?;
        Ok(!ring.edges.is_empty() && !ring.closed)
    }
}

/// ### Geometry
impl TopologyLevel {
    /// Returns the average of the four corners of `face`.
    pub fn face_centroid(&self, face: &Face) -> Point {
        face.vertices
            .iter()
            .fold(Point::zero(), |sum, v| sum + self.vertices[v.get()].position)
            * 0.25
    }

    /// Returns the unit normal of `face`, from the cross product of its
    /// diagonals.
    ///
    /// `None` if the face is degenerate.
    pub fn face_normal(&self, face: &Face) -> Option<Vector> {
        let p = |i: usize| self.vertices[face.vertices[i].get()].position;
        let normal = (p(2) - p(0)).cross(p(3) - p(1));
        let mag_sq = normal.mag_sq();
        if mag_sq < EPSILON {
            None
        } else {
            Some(normal / mag_sq.sqrt())
        }
    }
}

/// ### Validation
impl TopologyLevel {
    /// Checks that the level is self-consistent.
    ///
    /// * All indices are in bounds.
    /// * Every face's edges connect its vertices in a closed loop.
    /// * Every edge is referenced by exactly the faces it lists, the first
    ///   one running along it and the second one against it.
    /// * Walking around every vertex terminates and visits all faces that use
    ///   the vertex (no bow-ties).
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len();
        let edge_count = self.edges.len();
        let face_count = self.faces.len();

        let check = |index: Index, max: usize| {
            if index.get() < max {
                Ok(())
            } else {
                Err(Error::IndexOutOfBounds {
                    index: index.get(),
                    max,
                })
            }
        };

        for edge in &self.edges {
            for v in edge.vertices {
                check(v, vertex_count)?;
            }
            for f in edge.faces.iter().flatten() {
                check(*f, face_count)?;
            }
            if edge.vertices[0] == edge.vertices[1] {
                return Err(Error::InvalidTopology(format!(
                    "Edge collapses onto vertex {}.",
                    edge.vertices[0]
                )));
            }
            if edge.faces[0].is_none() {
                return Err(Error::InvalidTopology(
                    "Edge without a leading face.".to_string(),
                ));
            }
        }

        let mut references = vec![0usize; edge_count];
        let mut corners = vec![0usize; vertex_count];

        for (f, face) in self.faces.iter().enumerate() {
            for i in 0..4 {
                check(face.vertices[i], vertex_count)?;
                check(face.edges[i], edge_count)?;
            }
            for i in 0..4 {
                let from = face.vertices[i];
                let to = face.vertices[(i + 1) % 4];
                let e = face.edges[i];
                let edge = &self.edges[e.get()];
                let side = if edge.vertices == [from, to] {
                    0
                } else if edge.vertices == [to, from] {
                    1
                } else {
                    return Err(Error::OpenFaceLoop { face: f });
                };
                if edge.faces[side] != Some(f.into()) {
                    return Err(Error::InvalidTopology(format!(
                        "Face {f} uses edge {e} but the edge does not list it on that side."
                    )));
                }
                references[e.get()] += 1;
                corners[from.get()] += 1;
            }
        }

        for (e, edge) in self.edges.iter().enumerate() {
            let listed = edge.faces.iter().flatten().count();
            if references[e] != listed {
                return Err(Error::InvalidTopology(format!(
                    "Edge {e} lists {listed} faces but is used {} times.",
                    references[e]
                )));
            }
        }

        for v in 0..vertex_count {
            let ring = self.ring(v.into())?;
            if ring.valence() != corners[v] {
                return Err(Error::InvalidTopology(format!(
                    "Vertex {v} is non-manifold ({} of {} faces reachable).",
                    ring.valence(),
                    corners[v]
                )));
            }
        }

        Ok(())
    }
}
