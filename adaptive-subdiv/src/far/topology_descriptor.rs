//! A container holding references to raw quad mesh data.
//!
//! ## Example
//! ```
//! # use adaptive_subdiv::far::TopologyDescriptor;
//! // The positions as a flat buffer.
//! let positions = [
//!     0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, //
//!     0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 2.0, 1.0, 0.0,
//! ];
//!
//! // Two quads sharing the edge 1-4.
//! let mut strip = TopologyDescriptor::new(6, &positions, &[0, 1, 4, 3, 1, 2, 5, 4])?;
//!
//! // Make the shared edge a fully sharp crease.
//! strip.creases(&[1, 4], &[0.0]);
//!
//! let level = strip.into_level()?;
//! assert_eq!(level.edge_count(), 7);
//! # Ok::<(), adaptive_subdiv::Error>(())
//! ```
//!
//! ## Smoothness and Creases
//! Every edge carries a *smoothness* in `[0, 1]`. The default, `1`, lets the
//! surface bend freely across the edge. `0` makes the edge an infinitely sharp
//! crease: the refined surface keeps a tangent discontinuity there and the
//! edge's midpoints stay on the straight line between its end points.
//!
//! Values in between make the crease *semi-sharp*. Internally smoothness `s`
//! maps to a sharpness of `(1 - s) * MAX_SHARPNESS`; an edge stays sharp for
//! as many refinement passes as its sharpness and is blended toward the smooth
//! rule in the pass where the depth crosses it. This gives fillet-like
//! transitions without adding extra rows of control vertices.
//!
//! Boundary edges are always treated as infinitely sharp.
use hashbrown::HashMap;

use super::topology_level::{Edge, Face, Point, TopologyLevel, Vertex, VertexType};
use crate::{Error, Index, Result};

/// A `TopologyDescriptor` holds references to raw quad mesh data as flat
/// buffers.
///
/// This is used to construct the control [`TopologyLevel`] handed to a
/// [`TopologyRefiner`](crate::far::TopologyRefiner).
///
/// See the [module level documentation](crate::far::topology_descriptor) for
/// an example.
#[derive(Clone, Debug)]
pub struct TopologyDescriptor<'a> {
    vertices_len: usize,
    positions: &'a [f32],
    face_vertex_indices: &'a [u32],
    crease_vertex_pairs: &'a [u32],
    crease_smoothness: &'a [f32],
    corner_vertices: &'a [u32],
    vertex_types: Option<VertexTypes<'a>>,
}

#[derive(Clone, Debug)]
enum VertexTypes<'a> {
    Typed(&'a [VertexType]),
    Codes(&'a [u8]),
}

impl<'a> TopologyDescriptor<'a> {
    /// Describes a quad mesh. This is turned into a [`TopologyLevel`] with
    /// [`into_level()`](Self::into_level).
    ///
    /// # Arguments
    ///
    /// * `vertices_len` - The number of vertices in the mesh.
    /// * `positions` - `3 * vertices_len` coordinates.
    /// * `face_vertex_indices` - Four vertex indices per face, counter-clockwise.
    #[inline]
    pub fn new(
        vertices_len: usize,
        positions: &'a [f32],
        face_vertex_indices: &'a [u32],
    ) -> Result<TopologyDescriptor<'a>> {
        if positions.len() != 3 * vertices_len {
            return Err(Error::InvalidBufferSize {
                expected: 3 * vertices_len,
                actual: positions.len(),
            });
        }
        if face_vertex_indices.len() % 4 != 0 {
            return Err(Error::InvalidTopology(
                "The number of face vertex indices is not a multiple of four.".to_string(),
            ));
        }
        for (i, &vertex_index) in face_vertex_indices.iter().enumerate() {
            if vertices_len <= (vertex_index as usize) {
                return Err(Error::InvalidTopology(format!(
                    "Vertex index[{i}] = {vertex_index} is out of range (should be < {vertices_len})."
                )));
            }
        }

        Ok(Self {
            vertices_len,
            positions,
            face_vertex_indices,
            crease_vertex_pairs: &[],
            crease_smoothness: &[],
            corner_vertices: &[],
            vertex_types: None,
        })
    }

    /// Sets edge smoothness for the edges given as vertex pairs.
    ///
    /// * `vertex_pairs` - Two vertex indices per edge.
    /// * `smoothness` - One value in `[0, 1]` per edge.
    #[inline]
    pub fn creases(&mut self, vertex_pairs: &'a [u32], smoothness: &'a [f32]) -> &mut Self {
        self.crease_vertex_pairs = vertex_pairs;
        self.crease_smoothness = smoothness;
        self
    }

    /// Marks the given vertices as [`Corner`](VertexType::Corner)s.
    #[inline]
    pub fn corners(&mut self, vertices: &'a [u32]) -> &mut Self {
        self.corner_vertices = vertices;
        self
    }

    /// Sets the type of every vertex.
    #[inline]
    pub fn vertex_types(&mut self, vertex_types: &'a [VertexType]) -> &mut Self {
        self.vertex_types = Some(VertexTypes::Typed(vertex_types));
        self
    }

    /// Sets the type of every vertex from raw codes (`0` smooth, `1` crease,
    /// `2` corner).
    #[inline]
    pub fn vertex_type_codes(&mut self, codes: &'a [u8]) -> &mut Self {
        self.vertex_types = Some(VertexTypes::Codes(codes));
        self
    }

    /// Returns the number of faces described.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.face_vertex_indices.len() / 4
    }

    /// Builds the level this descriptor describes.
    ///
    /// Edges are derived from the faces. Each undirected vertex pair becomes
    /// one edge, oriented along the first face that uses it.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidTopology`] for degenerate faces, an edge used twice in
    ///   the same direction (inconsistent winding) or by more than two faces,
    ///   or creases that name no edge.
    /// * [`Error::InvalidBufferSize`] for mismatched crease or vertex type
    ///   buffers.
    /// * [`Error::InvalidArgument`] for smoothness values outside `[0, 1]`.
    pub fn into_level(&self) -> Result<TopologyLevel> {
        let mut vertices = self.build_vertices()?;
        let (mut edges, faces, lookup) = self.build_edges_and_faces()?;

        if self.crease_vertex_pairs.len() != 2 * self.crease_smoothness.len() {
            return Err(Error::InvalidBufferSize {
                expected: 2 * self.crease_smoothness.len(),
                actual: self.crease_vertex_pairs.len(),
            });
        }
        for (pair, &smoothness) in self
            .crease_vertex_pairs
            .chunks_exact(2)
            .zip(self.crease_smoothness)
        {
            if !(0.0..=1.0).contains(&smoothness) {
                return Err(Error::InvalidArgument(format!(
                    "Smoothness {smoothness} is outside [0, 1]."
                )));
            }
            let edge = lookup.get(&edge_key(pair[0], pair[1])).ok_or_else(|| {
                Error::InvalidTopology(format!(
                    "Crease {}-{} is not an edge of the mesh.",
                    pair[0], pair[1]
                ))
            })?;
            edges[edge.get()].smoothness = smoothness;
        }

        for &corner in self.corner_vertices {
            let vertex = vertices
                .get_mut(corner as usize)
                .ok_or(Error::IndexOutOfBounds {
                    index: corner as usize,
                    max: self.vertices_len,
                })?;
            vertex.kind = VertexType::Corner;
        }

        let level = TopologyLevel::from_parts_unchecked(vertices, edges, faces);

        #[cfg(feature = "topology_validation")]
        level.validate()?;

        Ok(level)
    }

    fn build_vertices(&self) -> Result<Vec<Vertex>> {
        let kinds: Vec<VertexType> = match &self.vertex_types {
            None => vec![VertexType::Smooth; self.vertices_len],
            Some(types) => {
                let len = match types {
                    VertexTypes::Typed(t) => t.len(),
                    VertexTypes::Codes(c) => c.len(),
                };
                if len != self.vertices_len {
                    return Err(Error::InvalidBufferSize {
                        expected: self.vertices_len,
                        actual: len,
                    });
                }
                match types {
                    VertexTypes::Typed(t) => t.to_vec(),
                    VertexTypes::Codes(c) => c
                        .iter()
                        .map(|&code| VertexType::from_code(code))
                        .collect::<Result<_>>()?,
                }
            }
        };

        Ok(self
            .positions
            .chunks_exact(3)
            .zip(kinds)
            .map(|(p, kind)| Vertex::new(Point::new(p[0], p[1], p[2]), kind))
            .collect())
    }

    #[allow(clippy::type_complexity)]
    fn build_edges_and_faces(&self) -> Result<(Vec<Edge>, Vec<Face>, HashMap<(u32, u32), Index>)> {
        let face_count = self.face_count();
        let mut edges: Vec<Edge> = Vec::with_capacity(2 * face_count + 2);
        let mut faces = Vec::with_capacity(face_count);
        let mut lookup: HashMap<(u32, u32), Index> = HashMap::with_capacity(2 * face_count + 2);

        for (f, quad) in self.face_vertex_indices.chunks_exact(4).enumerate() {
            for i in 0..4 {
                if quad[(i + 1)..].contains(&quad[i]) {
                    return Err(Error::InvalidTopology(format!(
                        "Face {f} uses vertex {} more than once.",
                        quad[i]
                    )));
                }
            }

            let mut face_edges = [Index(0); 4];
            for i in 0..4 {
                let (from, to) = (quad[i], quad[(i + 1) % 4]);
                let face = Index::from(f);

                face_edges[i] = match lookup.get(&edge_key(from, to)) {
                    Some(&e) => {
                        let edge = &mut edges[e.get()];
                        if edge.vertices[0] == Index(from) {
                            return Err(Error::InvalidTopology(format!(
                                "Edge {from}-{to} is used twice in the same direction."
                            )));
                        }
                        if edge.faces[1].is_some() {
                            return Err(Error::InvalidTopology(format!(
                                "Edge {from}-{to} is shared by more than two faces."
                            )));
                        }
                        edge.faces[1] = Some(face);
                        e
                    }
                    None => {
                        let e = Index::from(edges.len());
                        edges.push(Edge {
                            vertices: [Index(from), Index(to)],
                            faces: [Some(face), None],
                            smoothness: 1.0,
                        });
                        lookup.insert(edge_key(from, to), e);
                        e
                    }
                };
            }

            faces.push(Face {
                vertices: [
                    Index(quad[0]),
                    Index(quad[1]),
                    Index(quad[2]),
                    Index(quad[3]),
                ],
                edges: face_edges,
            });
        }

        Ok((edges, faces, lookup))
    }
}

#[inline]
const fn edge_key(v0: u32, v1: u32) -> (u32, u32) {
    if v0 <= v1 {
        (v0, v1)
    } else {
        (v1, v0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: [f32; 12] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];

    #[test]
    fn test_single_quad() {
        let level = TopologyDescriptor::new(4, &QUAD, &[0, 1, 2, 3])
            .unwrap()
            .into_level()
            .unwrap();
        assert_eq!(level.vertex_count(), 4);
        assert_eq!(level.edge_count(), 4);
        assert!(level.edges().iter().all(Edge::is_boundary));
        assert!(level.vertices().iter().all(|v| v.first_edge.is_some()));
    }

    #[test]
    fn test_buffer_sizes_are_checked() {
        assert!(matches!(
            TopologyDescriptor::new(5, &QUAD, &[0, 1, 2, 3]),
            Err(Error::InvalidBufferSize { expected: 15, actual: 12 })
        ));
        assert!(TopologyDescriptor::new(4, &QUAD, &[0, 1, 2]).is_err());
        assert!(TopologyDescriptor::new(4, &QUAD, &[0, 1, 2, 4]).is_err());
    }

    #[test]
    fn test_degenerate_face_is_rejected() {
        let descriptor = TopologyDescriptor::new(4, &QUAD, &[0, 1, 1, 3]).unwrap();
        assert!(matches!(
            descriptor.into_level(),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_inconsistent_winding_is_rejected() {
        let positions = [0.0f32; 18];
        let descriptor =
            TopologyDescriptor::new(6, &positions, &[0, 1, 4, 3, 4, 1, 2, 5]).unwrap();
        assert!(descriptor.into_level().is_ok());

        // Second face wound the other way round.
        let descriptor =
            TopologyDescriptor::new(6, &positions, &[0, 1, 4, 3, 1, 4, 5, 2]).unwrap();
        assert!(matches!(
            descriptor.into_level(),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_creases_and_vertex_types() {
        let mut descriptor = TopologyDescriptor::new(4, &QUAD, &[0, 1, 2, 3]).unwrap();
        descriptor
            .creases(&[1, 0], &[0.25])
            .vertex_type_codes(&[0, 1, 1, 0])
            .corners(&[3]);
        let level = descriptor.into_level().unwrap();

        let e = level.find_edge(Index(0), Index(1)).unwrap();
        assert_eq!(level.edge(e).unwrap().smoothness, 0.25);
        assert_eq!(level.vertices()[1].kind, VertexType::Crease);
        assert_eq!(level.vertices()[3].kind, VertexType::Corner);
    }

    #[test]
    fn test_invalid_creases() {
        let mut descriptor = TopologyDescriptor::new(4, &QUAD, &[0, 1, 2, 3]).unwrap();
        descriptor.creases(&[0, 2], &[0.0]);
        assert!(matches!(
            descriptor.into_level(),
            Err(Error::InvalidTopology(_))
        ));

        descriptor.creases(&[0, 1], &[1.5]);
        assert!(matches!(
            descriptor.into_level(),
            Err(Error::InvalidArgument(_))
        ));

        descriptor.creases(&[0, 1, 1], &[0.5]);
        assert!(matches!(
            descriptor.into_level(),
            Err(Error::InvalidBufferSize { .. })
        ));
    }

    #[test]
    fn test_invalid_vertex_type_code() {
        let mut descriptor = TopologyDescriptor::new(4, &QUAD, &[0, 1, 2, 3]).unwrap();
        descriptor.vertex_type_codes(&[0, 0, 7, 0]);
        assert!(matches!(
            descriptor.into_level(),
            Err(Error::InvalidVertexType(7))
        ));
    }
}
