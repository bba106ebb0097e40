//! Crease aware placement of the vertices of a refined level.
//!
//! The rules are a quad mesh form of Catmull-Clark with Biermann, Levin and
//! Zorin style crease handling (*BLZ*). Only vertices touching a refined face
//! are recomputed; everything else keeps its position.
//!
//! ## Edge Classes
//! Each pass happens at a depth `d`, counting from `0`. With `s` the
//! [`sharpness()`](super::Edge::sharpness) of an edge, the edge is
//!
//! * *sharp* if `s - d >= 1`,
//! * *hard* with weight `s - d` if `0 < s - d < 1`,
//! * smooth otherwise.
//!
//! ## Vertex Rules
//! With `k` the number of faces around a vertex `v`, the smooth rule weighs
//! `v` with `1 - 7 / (4k)`, each edge neighbor with `3 / (2k²)` and each
//! diagonal neighbor with `1 / (4k²)`. The *crease point* is
//! `0.75 v + 0.125 (n₀ + n₁)` for the far ends `n₀`, `n₁` of two edges.
//!
//! | sharp | hard | new position                                            |
//! |-------|------|---------------------------------------------------------|
//! | 0     | ≤ 1  | smooth rule                                             |
//! | 0     | 2    | smooth rule blended toward the crease point of the hard edges by their mean weight |
//! | 0     | > 2  | unchanged                                               |
//! | 1     | any  | smooth rule blended toward `v` by the first hard weight  |
//! | 2     | any  | crease point blended toward `v` by the mean hard weight  |
//! | > 2   | any  | unchanged, becomes a [`Corner`](VertexType::Corner)     |
//!
//! [`Corner`](VertexType::Corner) vertices, and vertices with exactly two
//! edges that are both sharp, never move.
//!
//! A [`Crease`](VertexType::Crease) vertex is positioned by the table above
//! but keeps its type in the refined level and counts as a crease end point
//! for the midpoint rule, unless it becomes a corner. Vertices placed between
//! two sharp edges are typed `Crease` too, so they carry the type into later
//! passes.
//!
//! ## Edge Midpoints
//! The midpoint of a split edge weighs its end points with `3/8` and the four
//! other vertices of its two faces with `1/16` each. If exactly one end point
//! is on a crease or a corner, the weights of the end points are shifted by
//! `γ = cos(θ) / 4`: `3/8 + γ` for the smooth one, `3/8 - γ` for the other.
//! `θ` is `π / k` at a crease and `π / (2k)` at a corner, with `k` the number
//! of faces in the sector between the sharp edges the midpoint lies in. The
//! result is blended toward the plain midpoint by `clamp(s - d, 0, 1)`.
use std::f32::consts::PI;

use tracing::trace;

use super::{
    classification::Classification,
    refinement_pass::{RefinementPass, VertexOrigin},
    stencil_table::{StencilBuilder, StencilTable},
    topology_level::{Edge, Point, Ring, TopologyLevel, Vector, VertexType, EPSILON},
};
use crate::{Error, Index, Result};

/// How an edge acts in a pass at a given depth.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EdgeClass {
    Smooth,
    /// Partially sharp, with the given weight in `(0, 1)`.
    Hard(f32),
    Sharp,
}

impl EdgeClass {
    /// Classifies `edge` for a pass at `depth`.
    pub fn of(edge: &Edge, depth: usize) -> Self {
        let remaining = edge.sharpness() - depth as f32;
        if 1.0 <= remaining {
            EdgeClass::Sharp
        } else if 0.0 < remaining {
            EdgeClass::Hard(remaining)
        } else {
            EdgeClass::Smooth
        }
    }

    /// How far a new midpoint of this edge stays on the straight line, in
    /// `[0, 1]`.
    #[inline]
    pub fn linearity(self) -> f32 {
        match self {
            EdgeClass::Smooth => 0.0,
            EdgeClass::Hard(weight) => weight,
            EdgeClass::Sharp => 1.0,
        }
    }
}

/// What an edge end point looks like to the midpoint rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Endpoint {
    Smooth,
    Crease,
    Corner,
}

/// Rule outcome for one vertex of the previous level.
#[derive(Clone, Debug)]
struct VertexRule {
    stencil: StencilBuilder,
    kind: VertexType,
    endpoint: Endpoint,
    ring: Ring,
}

/// The positions, types and displacements of a refined level.
#[derive(Clone, Debug)]
pub struct VertexSolution {
    stencils: StencilTable,
    positions: Vec<Point>,
    kinds: Vec<VertexType>,
    displacements: Vec<f32>,
}

impl VertexSolution {
    /// One stencil per refined vertex, over the vertices of the previous
    /// level.
    #[inline]
    pub fn stencils(&self) -> &StencilTable {
        &self.stencils
    }

    #[inline]
    pub fn positions(&self) -> &[Point] {
        &self.positions
    }

    #[inline]
    pub fn kinds(&self) -> &[VertexType] {
        &self.kinds
    }

    /// How far each vertex moved off its linear position, measured along
    /// the normal of the previous level.
    #[inline]
    pub fn displacements(&self) -> &[f32] {
        &self.displacements
    }

    pub fn max_displacement(&self) -> f32 {
        self.displacements.iter().copied().fold(0.0, f32::max)
    }

    /// Writes positions and types into the level of `pass`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBufferSize`] if the solution was computed for another
    /// pass.
    pub fn apply(&self, pass: &mut RefinementPass) -> Result<()> {
        let level = pass.level_mut();
        if level.vertex_count() != self.positions.len() {
            return Err(Error::InvalidBufferSize {
                expected: level.vertex_count(),
                actual: self.positions.len(),
            });
        }
        for ((vertex, &position), &kind) in level
            .vertices
            .iter_mut()
            .zip(&self.positions)
            .zip(&self.kinds)
        {
            vertex.position = position;
            vertex.kind = kind;
        }
        Ok(())
    }
}

/// Places the vertices of a [`RefinementPass`].
#[derive(Copy, Clone, Debug)]
pub struct VertexSolver<'a> {
    level: &'a TopologyLevel,
    classification: &'a Classification,
    depth: usize,
}

impl<'a> VertexSolver<'a> {
    /// A solver for passes over `level` at refinement depth `depth`.
    pub fn new(level: &'a TopologyLevel, classification: &'a Classification, depth: usize) -> Self {
        Self {
            level,
            classification,
            depth,
        }
    }

    /// Computes stencils, positions, types and displacements for all
    /// vertices of `pass`.
    ///
    /// # Errors
    ///
    /// * [`Error::CorruptRing`] if the faces around a moving vertex do not
    ///   form a fan.
    /// * [`Error::InvalidBufferSize`] if `pass` was not built from this
    ///   solver's level.
    pub fn solve(&self, pass: &RefinementPass) -> Result<VertexSolution> {
        if pass.parent_vertex_count() != self.level.vertex_count() {
            return Err(Error::InvalidBufferSize {
                expected: self.level.vertex_count(),
                actual: pass.parent_vertex_count(),
            });
        }

        let rules = self.vertex_rules()?;
        let refined = pass.level();

        let mut stencils = Vec::with_capacity(refined.vertex_count());
        let mut kinds = Vec::with_capacity(refined.vertex_count());
        for (v, origin) in pass.vertex_origins().iter().enumerate() {
            let (stencil, kind) = match *origin {
                VertexOrigin::Original(parent) => match &rules[parent.get()] {
                    Some(rule) => (rule.stencil.clone(), rule.kind),
                    None => (
                        StencilBuilder::identity(parent),
                        refined.vertices[v].kind,
                    ),
                },
                VertexOrigin::EdgeMidpoint(edge) => self.edge_point(edge, &rules)?,
                VertexOrigin::FaceCenter(face) => (self.face_point(face), VertexType::Smooth),
            };
            stencils.push(stencil);
            kinds.push(kind);
        }

        let stencils = StencilTable::from_stencils(self.level.vertex_count(), stencils);
        let control: Vec<Point> = self.level.vertices.iter().map(|v| v.position).collect();
        let positions = stencils.update_points(&control)?;
        let displacements = self.displacements(pass, &positions);

        let solution = VertexSolution {
            stencils,
            positions,
            kinds,
            displacements,
        };

        trace!(
            "Placed {} vertices at depth {}, max displacement {}",
            solution.positions.len(),
            self.depth,
            solution.max_displacement()
        );

        Ok(solution)
    }

    /// Rules for every vertex that is a corner of a refined face. `None` for
    /// the others, which stay where they are.
    fn vertex_rules(&self) -> Result<Vec<Option<VertexRule>>> {
        let mut moving = vec![false; self.level.vertex_count()];
        for (face, state) in self.level.faces.iter().zip(self.classification.states()) {
            if !state.is_final() {
                for v in face.vertices {
                    moving[v.get()] = true;
                }
            }
        }

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            moving
                .par_iter()
                .enumerate()
                .map(|(v, &m)| m.then(|| self.vertex_rule(v.into())).transpose())
                .collect()
        }

        #[cfg(not(feature = "rayon"))]
        {
            moving
                .iter()
                .enumerate()
                .map(|(v, &m)| m.then(|| self.vertex_rule(v.into())).transpose())
                .collect()
        }
    }

    fn vertex_rule(&self, v: Index) -> Result<VertexRule> {
        let vertex = &self.level.vertices[v.get()];
        let ring = self.level.ring(v)?;
        let frozen = |kind, endpoint, ring| VertexRule {
            stencil: StencilBuilder::identity(v),
            kind,
            endpoint,
            ring,
        };

        let mut sharp = Vec::with_capacity(2);
        let mut hard = Vec::with_capacity(2);
        for &e in &ring.edges {
            let edge = &self.level.edges[e.get()];
            let far = edge.other_vertex(v).ok_or(Error::CorruptRing { vertex: v.get() })?;
            match EdgeClass::of(edge, self.depth) {
                EdgeClass::Sharp => sharp.push(far),
                EdgeClass::Hard(weight) => hard.push((far, weight)),
                EdgeClass::Smooth => (),
            }
        }

        if vertex.kind == VertexType::Corner
            || 2 < sharp.len()
            || (ring.edges.len() == 2 && sharp.len() == 2)
        {
            return Ok(frozen(VertexType::Corner, Endpoint::Corner, ring));
        }

        let identity = StencilBuilder::identity(v);
        let mean_hard = || hard.iter().map(|&(_, w)| w).sum::<f32>() / hard.len().max(1) as f32;

        let rule = match (sharp.len(), hard.len()) {
            (2, _) => VertexRule {
                stencil: StencilBuilder::lerp(
                    &self.crease_point(v, sharp[0], sharp[1]),
                    &identity,
                    mean_hard(),
                ),
                kind: VertexType::Crease,
                endpoint: Endpoint::Crease,
                ring,
            },
            (1, _) => {
                let weight = hard.first().map_or(0.0, |&(_, w)| w);
                VertexRule {
                    stencil: StencilBuilder::lerp(&self.smooth_point(v, &ring)?, &identity, weight),
                    kind: VertexType::Smooth,
                    endpoint: Endpoint::Smooth,
                    ring,
                }
            }
            (_, 2) => VertexRule {
                stencil: StencilBuilder::lerp(
                    &self.smooth_point(v, &ring)?,
                    &self.crease_point(v, hard[0].0, hard[1].0),
                    mean_hard(),
                ),
                kind: VertexType::Smooth,
                endpoint: Endpoint::Smooth,
                ring,
            },
            (_, 0..=1) => VertexRule {
                stencil: self.smooth_point(v, &ring)?,
                kind: VertexType::Smooth,
                endpoint: Endpoint::Smooth,
                ring,
            },
            // Several semi-sharp edges meet here. Leave the vertex alone for
            // this pass.
            _ => frozen(VertexType::Smooth, Endpoint::Smooth, ring),
        };

        Ok(match vertex.kind {
            VertexType::Crease => VertexRule {
                kind: VertexType::Crease,
                endpoint: Endpoint::Crease,
                ..rule
            },
            _ => rule,
        })
    }

    fn smooth_point(&self, v: Index, ring: &Ring) -> Result<StencilBuilder> {
        // Open rings always have two sharp boundary edges.
        if !ring.closed || ring.faces.is_empty() {
            return Err(Error::CorruptRing { vertex: v.get() });
        }
        let k = ring.valence() as f32;
        let mut stencil = StencilBuilder::default();
        stencil.add(v, 1.0 - 7.0 / (4.0 * k));
        for &e in &ring.edges {
            if let Some(n) = self.level.edges[e.get()].other_vertex(v) {
                stencil.add(n, 3.0 / (2.0 * k * k));
            }
        }
        for &f in &ring.faces {
            let d = self
                .level
                .opposite_vertex(v, f)
                .ok_or(Error::CorruptRing { vertex: v.get() })?;
            stencil.add(d, 1.0 / (4.0 * k * k));
        }
        Ok(stencil)
    }

    fn crease_point(&self, v: Index, n0: Index, n1: Index) -> StencilBuilder {
        let mut stencil = StencilBuilder::default();
        stencil.add(v, 0.75).add(n0, 0.125).add(n1, 0.125);
        stencil
    }

    fn edge_point(&self, e: Index, rules: &[Option<VertexRule>]) -> Result<(StencilBuilder, VertexType)> {
        let edge = &self.level.edges[e.get()];
        let [v0, v1] = edge.vertices;
        let class = EdgeClass::of(edge, self.depth);
        let kind = if class == EdgeClass::Sharp {
            VertexType::Crease
        } else {
            VertexType::Smooth
        };

        let mut linear = StencilBuilder::default();
        linear.add(v0, 0.5).add(v1, 0.5);

        let linearity = class.linearity();
        let (Some(f0), Some(f1)) = (edge.faces[0], edge.faces[1]) else {
            return Ok((linear, kind));
        };
        if 1.0 <= linearity {
            return Ok((linear, kind));
        }

        let (mut w0, mut w1) = (0.375, 0.375);
        let endpoint = |v: Index| {
            rules[v.get()]
                .as_ref()
                .map_or((Endpoint::Smooth, None), |r| (r.endpoint, Some(&r.ring)))
        };
        match (endpoint(v0), endpoint(v1)) {
            ((Endpoint::Smooth, _), (creased, Some(ring))) if creased != Endpoint::Smooth => {
                let gamma = self.gamma(creased, ring, e);
                w0 += gamma;
                w1 -= gamma;
            }
            ((creased, Some(ring)), (Endpoint::Smooth, _)) if creased != Endpoint::Smooth => {
                let gamma = self.gamma(creased, ring, e);
                w0 -= gamma;
                w1 += gamma;
            }
            _ => (),
        }

        let mut smooth = StencilBuilder::default();
        smooth.add(v0, w0).add(v1, w1);
        for face in [f0, f1] {
            let quad = &self.level.faces[face.get()];
            for &w in &quad.vertices {
                if w != v0 && w != v1 {
                    smooth.add(w, 0.0625);
                }
            }
        }

        Ok((StencilBuilder::lerp(&smooth, &linear, linearity), kind))
    }

    fn gamma(&self, endpoint: Endpoint, ring: &Ring, edge: Index) -> f32 {
        let k = self.sector_size(ring, edge) as f32;
        let theta = match endpoint {
            Endpoint::Corner => PI / (2.0 * k),
            _ => PI / k,
        };
        theta.cos() / 4.0
    }

    /// Number of faces between the sharp edges around `edge` in `ring`.
    fn sector_size(&self, ring: &Ring, edge: Index) -> usize {
        let (n, m) = (ring.edges.len(), ring.faces.len());
        let Some(p) = ring.edges.iter().position(|&e| e == edge) else {
            return m.max(1);
        };
        let is_sharp = |i: usize| {
            EdgeClass::of(&self.level.edges[ring.edges[i].get()], self.depth) == EdgeClass::Sharp
        };

        // Face `i` lies between edge `i` and edge `i + 1`.
        let mut size = 0;
        let mut i = p;
        while i < m && size < m {
            size += 1;
            i = (i + 1) % n;
            if i == p || is_sharp(i) {
                break;
            }
        }

        let mut i = p;
        while size < m {
            let face = match i {
                0 if ring.closed => n - 1,
                0 => break,
                _ => i - 1,
            };
            size += 1;
            if is_sharp(face) {
                break;
            }
            i = face;
        }

        size.max(1)
    }

    fn face_point(&self, face: Index) -> StencilBuilder {
        let mut stencil = StencilBuilder::default();
        for &v in &self.level.faces[face.get()].vertices {
            stencil.add(v, 0.25);
        }
        stencil
    }

    fn displacements(&self, pass: &RefinementPass, positions: &[Point]) -> Vec<f32> {
        let face_normals: Vec<Option<Vector>> = self
            .level
            .faces
            .iter()
            .map(|face| self.level.face_normal(face))
            .collect();
        let mut vertex_normals = vec![Vector::zero(); self.level.vertex_count()];
        for (face, normal) in self.level.faces.iter().zip(&face_normals) {
            if let Some(normal) = normal {
                for v in face.vertices {
                    vertex_normals[v.get()] += *normal;
                }
            }
        }

        let faces_normal = |faces: &[Option<Index>]| {
            faces
                .iter()
                .flatten()
                .filter_map(|f| face_normals[f.get()])
                .fold(Vector::zero(), |sum, n| sum + n)
        };

        pass.vertex_origins()
            .iter()
            .zip(pass.level().vertices())
            .zip(positions)
            .map(|((origin, linear), &position)| {
                let normal = match *origin {
                    VertexOrigin::Original(v) => vertex_normals[v.get()],
                    VertexOrigin::EdgeMidpoint(e) => faces_normal(&self.level.edges[e.get()].faces[..]),
                    VertexOrigin::FaceCenter(f) => face_normals[f.get()].unwrap_or(Vector::zero()),
                };
                let delta = position - linear.position;
                let mag_sq = normal.mag_sq();
                if mag_sq < EPSILON {
                    delta.mag()
                } else {
                    (delta.dot(normal) / mag_sq.sqrt()).abs()
                }
            })
            .collect()
    }
}
