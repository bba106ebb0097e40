//! Materializing the next generation from a classified one.
//!
//! A [`RefinementPass`] is built from a [`TopologyLevel`] and a propagated
//! [`Classification`] in one sweep. Its layout is fixed:
//!
//! * **Vertices** – the old vertices keep their indices. One midpoint per
//!   split edge follows, in edge order, then one center per refined face, in
//!   face order.
//! * **Edges** – old edge `i` stays edge `i`. If it is split it becomes the
//!   half touching its first vertex. The second halves follow in edge order,
//!   then the four spokes of each [`Subdivide`](FaceState::Subdivide) face,
//!   then the three spokes of each `Y` face.
//! * **Faces** – each old face is replaced by its children, in face order:
//!   one copy for [`Final`](FaceState::Final), four quads for
//!   [`Subdivide`](FaceState::Subdivide), three for a `Y` face.
//!
//! Positions of the new level are *linear*: midpoints sit halfway along their
//! edge, centers at the face centroid. Smoothing them is the job of the
//! [`VertexSolver`](super::VertexSolver).
use tracing::trace;

use super::{
    classification::{Classification, FaceState},
    topology_level::{Edge, Face, TopologyLevel, Vertex, VertexType},
};
use crate::{Error, Index, Result};

/// Where a vertex of a refined level comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexOrigin {
    /// A vertex of the previous level.
    Original(Index),
    /// The midpoint of a split edge of the previous level.
    EdgeMidpoint(Index),
    /// The center of a refined face of the previous level.
    FaceCenter(Index),
}

/// Parent of a refined face and where its corners lie in the parent.
///
/// `uvs[i]` is the position of corner `i` in the bilinear parameterization of
/// the parent face, whose corners are at `(0, 0)`, `(1, 0)`, `(1, 1)` and
/// `(0, 1)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FaceOrigin {
    pub parent: Index,
    pub uvs: [[f32; 2]; 4],
}

const CORNER_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
const CENTER_UV: [f32; 2] = [0.5, 0.5];

#[inline]
fn midpoint_uv(slot: usize) -> [f32; 2] {
    let (a, b) = (CORNER_UVS[slot], CORNER_UVS[(slot + 1) % 4]);
    [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1])]
}

/// The result of one refinement pass.
#[derive(Clone, Debug)]
pub struct RefinementPass {
    level: TopologyLevel,
    parent_vertex_count: usize,
    states: Vec<FaceState>,
    vertex_origins: Vec<VertexOrigin>,
    edge_parents: Vec<Option<Index>>,
    face_origins: Vec<FaceOrigin>,
    child_offsets: Vec<Index>,
    midpoints: Vec<Option<Index>>,
    centers: Vec<Option<Index>>,
}

impl RefinementPass {
    /// Builds the next generation of `level`.
    ///
    /// `classification` must have been [propagated](Classification::propagate)
    /// over `level`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidBufferSize`] if the classification belongs to a level
    ///   with a different number of faces or edges.
    /// * [`Error::UnresolvedCriticalEdge`] if two faces still disagree about
    ///   an edge.
    /// * With the `topology_validation` feature, any error
    ///   [`TopologyLevel::validate()`] reports for the new level.
    pub fn build(level: &TopologyLevel, classification: &Classification) -> Result<Self> {
        if classification.states().len() != level.face_count() {
            return Err(Error::InvalidBufferSize {
                expected: level.face_count(),
                actual: classification.states().len(),
            });
        }
        for edge in 0..level.edge_count() {
            if classification.is_critical(level, edge.into())? {
                return Err(Error::UnresolvedCriticalEdge { edge });
            }
        }

        let mut builder = PassBuilder::new(level, classification);
        builder.add_vertices();
        builder.add_split_edges();
        builder.add_faces()?;
        builder.link_edge_faces();

        let pass = builder.finish();

        trace!(
            "Refinement pass: {} -> {} vertices, {} -> {} edges, {} -> {} faces",
            level.vertex_count(),
            pass.level.vertex_count(),
            level.edge_count(),
            pass.level.edge_count(),
            level.face_count(),
            pass.level.face_count()
        );

        #[cfg(feature = "topology_validation")]
        pass.level.validate()?;

        Ok(pass)
    }

    /// The refined level, with linear positions.
    #[inline]
    pub fn level(&self) -> &TopologyLevel {
        &self.level
    }

    pub fn into_level(self) -> TopologyLevel {
        self.level
    }

    pub(crate) fn level_mut(&mut self) -> &mut TopologyLevel {
        &mut self.level
    }

    /// Moves the level out, leaving an empty one behind.
    pub(crate) fn take_level(&mut self) -> TopologyLevel {
        std::mem::take(&mut self.level)
    }

    /// The states the faces of the previous level were refined with.
    #[inline]
    pub fn states(&self) -> &[FaceState] {
        &self.states
    }

    /// Where each vertex of the refined level comes from.
    #[inline]
    pub fn vertex_origins(&self) -> &[VertexOrigin] {
        &self.vertex_origins
    }

    /// The edge of the previous level each refined edge lies on. `None` for
    /// spokes, which lie inside a face.
    #[inline]
    pub fn edge_parents(&self) -> &[Option<Index>] {
        &self.edge_parents
    }

    /// The parent face of each refined face.
    #[inline]
    pub fn face_origins(&self) -> &[FaceOrigin] {
        &self.face_origins
    }

    /// The refined faces that replace face `parent` of the previous level.
    pub fn children(&self, parent: Index) -> std::ops::Range<usize> {
        let start = self.child_offsets[parent.get()].get();
        start..start + self.states[parent.get()].child_count()
    }

    /// The midpoint vertex of edge `edge` of the previous level, if it was
    /// split.
    #[inline]
    pub fn midpoint(&self, edge: Index) -> Option<Index> {
        self.midpoints.get(edge.get()).copied().flatten()
    }

    /// The center vertex of face `face` of the previous level, if it was
    /// refined.
    #[inline]
    pub fn center(&self, face: Index) -> Option<Index> {
        self.centers.get(face.get()).copied().flatten()
    }

    /// Number of vertices of the previous level.
    #[inline]
    pub fn parent_vertex_count(&self) -> usize {
        self.parent_vertex_count
    }
}

/// The two halves an old face side maps to, seen from the face.
#[derive(Copy, Clone, Debug)]
struct Side {
    /// Touches the face's vertex `slot`.
    near: Index,
    /// Touches the face's vertex `slot + 1`.
    far: Index,
    midpoint: Option<Index>,
}

struct PassBuilder<'a> {
    old: &'a TopologyLevel,
    classification: &'a Classification,

    vertices: Vec<Vertex>,
    vertex_origins: Vec<VertexOrigin>,
    edges: Vec<Edge>,
    edge_parents: Vec<Option<Index>>,
    faces: Vec<Face>,
    face_origins: Vec<FaceOrigin>,
    child_offsets: Vec<Index>,

    midpoints: Vec<Option<Index>>,
    second_halves: Vec<Option<Index>>,
    centers: Vec<Option<Index>>,
}

impl<'a> PassBuilder<'a> {
    fn new(old: &'a TopologyLevel, classification: &'a Classification) -> Self {
        Self {
            old,
            classification,
            vertices: Vec::with_capacity(2 * old.vertex_count()),
            vertex_origins: Vec::with_capacity(2 * old.vertex_count()),
            edges: Vec::with_capacity(2 * old.edge_count()),
            edge_parents: Vec::with_capacity(2 * old.edge_count()),
            faces: Vec::with_capacity(4 * old.face_count()),
            face_origins: Vec::with_capacity(4 * old.face_count()),
            child_offsets: Vec::with_capacity(old.face_count()),
            midpoints: vec![None; old.edge_count()],
            second_halves: vec![None; old.edge_count()],
            centers: vec![None; old.face_count()],
        }
    }

    fn add_vertices(&mut self) {
        let (old, classification) = (self.old, self.classification);
        for (v, vertex) in old.vertices.iter().enumerate() {
            self.vertices.push(Vertex::new(vertex.position, vertex.kind));
            self.vertex_origins.push(VertexOrigin::Original(v.into()));
        }

        for (e, edge) in old.edges.iter().enumerate() {
            if classification.is_edge_split(e.into()) {
                let [a, b] = edge.vertices.map(|v| old.vertices[v.get()].position);
                self.midpoints[e] = Some(self.vertices.len().into());
                self.vertices
                    .push(Vertex::new((a + b) * 0.5, VertexType::Smooth));
                self.vertex_origins.push(VertexOrigin::EdgeMidpoint(e.into()));
            }
        }

        for (f, face) in old.faces.iter().enumerate() {
            if !classification.state(f.into()).is_final() {
                self.centers[f] = Some(self.vertices.len().into());
                self.vertices.push(Vertex::new(
                    old.face_centroid(face),
                    VertexType::Smooth,
                ));
                self.vertex_origins.push(VertexOrigin::FaceCenter(f.into()));
            }
        }
    }

    fn add_split_edges(&mut self) {
        let old = self.old;
        for (e, edge) in old.edges.iter().enumerate() {
            let first = match self.midpoints[e] {
                Some(m) => [edge.vertices[0], m],
                None => edge.vertices,
            };
            self.push_edge(first, edge.smoothness, Some(e.into()));
        }

        for (e, edge) in old.edges.iter().enumerate() {
            if let Some(m) = self.midpoints[e] {
                self.second_halves[e] = Some(self.edges.len().into());
                self.push_edge([m, edge.vertices[1]], edge.smoothness, Some(e.into()));
            }
        }
    }

    fn push_edge(&mut self, vertices: [Index; 2], smoothness: f32, parent: Option<Index>) -> Index {
        let index = Index::from(self.edges.len());
        self.edges.push(Edge {
            vertices,
            faces: [None, None],
            smoothness,
        });
        self.edge_parents.push(parent);
        index
    }

    fn side(&self, face: &Face, slot: usize) -> Side {
        let e = face.edges[slot];
        let midpoint = self.midpoints[e.get()];
        let second = self.second_halves[e.get()];
        match second {
            Some(second) if self.old.edges[e.get()].vertices[0] == face.vertices[slot] => Side {
                near: e,
                far: second,
                midpoint,
            },
            Some(second) => Side {
                near: second,
                far: e,
                midpoint,
            },
            None => Side {
                near: e,
                far: e,
                midpoint: None,
            },
        }
    }

    fn add_faces(&mut self) -> Result<()> {
        let classification = self.classification;
        let states = classification.states();

        // Spokes come in two bands, all `Subdivide` faces first.
        let mut spokes: Vec<Option<[Index; 4]>> = vec![None; self.old.face_count()];
        for (f, state) in states.iter().enumerate() {
            if let (FaceState::Subdivide, Some(center)) = (state, self.centers[f]) {
                let face = self.old.faces[f];
                let mut face_spokes = [Index(0); 4];
                for (slot, spoke) in face_spokes.iter_mut().enumerate() {
                    let midpoint = self
                        .side(&face, slot)
                        .midpoint
                        .ok_or(Error::UnresolvedCriticalEdge {
                            edge: face.edges[slot].get(),
                        })?;
                    *spoke = self.push_edge([midpoint, center], 1.0, None);
                }
                spokes[f] = Some(face_spokes);
            }
        }
        for (f, state) in states.iter().enumerate() {
            let rotation = match state {
                FaceState::Yv4 => 0,
                FaceState::Yv2 => 2,
                _ => continue,
            };
            let (face, center) = (self.old.faces[f], self.center_of(f)?);
            let m1 = self.split_midpoint(&face, rotation)?;
            let m2 = self.split_midpoint(&face, rotation + 1)?;
            let fan = face.vertices[(rotation + 3) % 4];
            spokes[f] = Some([
                self.push_edge([m1, center], 1.0, None),
                self.push_edge([m2, center], 1.0, None),
                self.push_edge([center, fan], 1.0, None),
                Index(0),
            ]);
        }

        for (f, &state) in states.iter().enumerate() {
            self.child_offsets.push(self.faces.len().into());
            let face = self.old.faces[f];
            let parent = Index::from(f);

            match (state, spokes[f]) {
                (FaceState::Final, _) => {
                    self.push_face(face.vertices, face.edges, parent, CORNER_UVS);
                }
                (FaceState::Subdivide, Some(spokes)) => {
                    self.add_subdivide_children(&face, parent, spokes)?
                }
                (FaceState::Yv4, Some(spokes)) => {
                    self.add_y_children(&face, parent, 0, spokes)?
                }
                (FaceState::Yv2, Some(spokes)) => {
                    self.add_y_children(&face, parent, 2, spokes)?
                }
                _ => return Err(Error::OpenFaceLoop { face: f }),
            }
        }

        Ok(())
    }

    fn center_of(&self, face: usize) -> Result<Index> {
        self.centers[face].ok_or(Error::OpenFaceLoop { face })
    }

    fn split_midpoint(&self, face: &Face, slot: usize) -> Result<Index> {
        self.side(face, slot % 4)
            .midpoint
            .ok_or(Error::UnresolvedCriticalEdge {
                edge: face.edges[slot % 4].get(),
            })
    }

    /// Child `i` is `(v[i], m[i], c, m[i - 1])`.
    fn add_subdivide_children(&mut self, face: &Face, parent: Index, spokes: [Index; 4]) -> Result<()> {
        let center = self.center_of(parent.get())?;
        for i in 0..4 {
            let prev = (i + 3) % 4;
            let (side, prev_side) = (self.side(face, i), self.side(face, prev));
            let (Some(m), Some(m_prev)) = (side.midpoint, prev_side.midpoint) else {
                return Err(Error::UnresolvedCriticalEdge {
                    edge: face.edges[i].get(),
                });
            };
            self.push_face(
                [face.vertices[i], m, center, m_prev],
                [side.near, spokes[i], spokes[prev], prev_side.far],
                parent,
                [CORNER_UVS[i], midpoint_uv(i), CENTER_UV, midpoint_uv(prev)],
            );
        }
        Ok(())
    }

    /// With `r` the rotation, sides `r` and `r + 1` are split at `m1` and
    /// `m2` and the fan vertex is `v[r + 3]`. The children are
    /// `(v[r], m1, c, v[r + 3])`, `(v[r + 1], m2, c, m1)` and
    /// `(v[r + 2], v[r + 3], c, m2)`.
    fn add_y_children(
        &mut self,
        face: &Face,
        parent: Index,
        r: usize,
        spokes: [Index; 4],
    ) -> Result<()> {
        let center = self.center_of(parent.get())?;
        let at = |i: usize| (r + i) % 4;
        let (s1, s2) = (self.side(face, at(0)), self.side(face, at(1)));
        let (Some(m1), Some(m2)) = (s1.midpoint, s2.midpoint) else {
            return Err(Error::UnresolvedCriticalEdge {
                edge: face.edges[at(0)].get(),
            });
        };
        let [spoke1, spoke2, spoke_fan, _] = spokes;
        let v = |i: usize| face.vertices[at(i)];
        let uv = |i: usize| CORNER_UVS[at(i)];

        self.push_face(
            [v(0), m1, center, v(3)],
            [s1.near, spoke1, spoke_fan, face.edges[at(3)]],
            parent,
            [uv(0), midpoint_uv(at(0)), CENTER_UV, uv(3)],
        );
        self.push_face(
            [v(1), m2, center, m1],
            [s2.near, spoke2, spoke1, s1.far],
            parent,
            [uv(1), midpoint_uv(at(1)), CENTER_UV, midpoint_uv(at(0))],
        );
        self.push_face(
            [v(2), v(3), center, m2],
            [face.edges[at(2)], spoke_fan, spoke2, s2.far],
            parent,
            [uv(2), uv(3), CENTER_UV, midpoint_uv(at(1))],
        );
        Ok(())
    }

    fn push_face(&mut self, vertices: [Index; 4], edges: [Index; 4], parent: Index, uvs: [[f32; 2]; 4]) {
        self.faces.push(Face { vertices, edges });
        self.face_origins.push(FaceOrigin { parent, uvs });
    }

    /// Sets `faces` of every new edge from the winding of the new faces.
    fn link_edge_faces(&mut self) {
        for (f, face) in self.faces.iter().enumerate() {
            for (slot, &e) in face.edges.iter().enumerate() {
                let edge = &mut self.edges[e.get()];
                let side = usize::from(edge.vertices[0] != face.vertices[slot]);
                edge.faces[side] = Some(f.into());
            }
        }
    }

    fn finish(self) -> RefinementPass {
        RefinementPass {
            level: TopologyLevel::from_parts_unchecked(self.vertices, self.edges, self.faces),
            parent_vertex_count: self.old.vertex_count(),
            states: self.classification.states().to_vec(),
            vertex_origins: self.vertex_origins,
            edge_parents: self.edge_parents,
            face_origins: self.face_origins,
            child_offsets: self.child_offsets,
            midpoints: self.midpoints,
            centers: self.centers,
        }
    }
}
