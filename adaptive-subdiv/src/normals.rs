//! # Shading Normals
//!
//! Angle weighted normals for a refined [`TopologyLevel`].
//!
//! Besides one normal per face and one per vertex, [`compute_normals()`]
//! produces one normal per face corner. Around a vertex the faces are split
//! into *segments* at sharp edges and every corner gets the average normal of
//! its segment only. Corner vertices put each face in a segment of its own.
//! This keeps creases visibly sharp when the level is rendered.
use itertools::Itertools;
use tracing::warn;

use crate::{
    far::{topology_level::EPSILON, EdgeClass, Face, Point, TopologyLevel, Vector, VertexType},
    Index, Result,
};

/// Face, vertex and face corner normals of a [`TopologyLevel`].
///
/// All normals are unit length or zero, the latter only where the geometry is
/// degenerate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normals {
    /// One normal per face.
    pub face: Vec<Vector>,
    /// One smooth normal per vertex, ignoring creases.
    pub vertex: Vec<Vector>,
    /// Four normals per face, in the face's corner order.
    pub corner: Vec<[Vector; 4]>,
}

impl Normals {
    /// Returns the normal of `face` at its corner `corner`.
    #[inline]
    pub fn corner(&self, face: Index, corner: usize) -> Option<Vector> {
        self.corner
            .get(face.get())
            .and_then(|corners| corners.get(corner))
            .copied()
    }
}

/// Computes the normals of `level`.
///
/// `depth` is the number of refinement passes that produced `level`. Edges
/// are split with the same sharpness bookkeeping the refinement uses, see
/// [`EdgeClass::of()`]. Only edges that are still fully sharp at `depth`
/// split a ring.
///
/// # Errors
///
/// [`Error::CorruptRing`](crate::Error::CorruptRing) if the faces around a
/// vertex cannot be walked.
pub fn compute_normals(level: &TopologyLevel, depth: usize) -> Result<Normals> {
    let mut degenerate = 0usize;

    let face: Vec<Vector> = level
        .faces()
        .iter()
        .map(|face| {
            level.face_normal(face).unwrap_or_else(|| {
                degenerate += 1;
                Vector::zero()
            })
        })
        .collect();

    let angles: Vec<[f32; 4]> = level
        .faces()
        .iter()
        .map(|face| corner_angles(level, face))
        .collect();

    let mut vertex = vec![Vector::zero(); level.vertex_count()];
    let mut corner = face.iter().map(|&n| [n; 4]).collect::<Vec<_>>();

    for (index, normal) in vertex.iter_mut().enumerate() {
        let v = Index::from(index);
        let ring = level.ring(v)?;
        if ring.faces.is_empty() {
            continue;
        }

        // Weighted face normals around the vertex, in ring order.
        let weighted: Vec<(usize, Vector)> = ring
            .faces
            .iter()
            .map(|&f| {
                let quad = &level.faces()[f.get()];
                let c = quad.corner(v).unwrap_or(0);
                (c, face[f.get()] * angles[f.get()][c])
            })
            .collect();

        let sum = weighted
            .iter()
            .fold(Vector::zero(), |sum, (_, n)| sum + *n);
        *normal = normalized(sum).unwrap_or_else(|| {
            degenerate += 1;
            Vector::zero()
        });

        let segment_of: Vec<usize> = if level.vertices()[index].kind == VertexType::Corner {
            (0..ring.faces.len()).collect()
        } else {
            let sharp: Vec<bool> = ring
                .edges
                .iter()
                .map(|e| EdgeClass::of(&level.edges()[e.get()], depth) == EdgeClass::Sharp)
                .collect();
            segments(&sharp, ring.closed, ring.faces.len())
        };

        let segment_count = segment_of.iter().max().map_or(0, |&s| s + 1);
        let mut sums = vec![Vector::zero(); segment_count];
        for (&segment, (_, n)) in segment_of.iter().zip(&weighted) {
            sums[segment] += *n;
        }

        for ((&f, &segment), (c, _)) in ring.faces.iter().zip(&segment_of).zip(&weighted) {
            corner[f.get()][*c] = normalized(sums[segment]).unwrap_or_else(|| {
                degenerate += 1;
                face[f.get()]
            });
        }
    }

    if 0 < degenerate {
        warn!(count = degenerate, "Skipped degenerate normal contributions.");
    }

    Ok(Normals {
        face,
        vertex,
        corner,
    })
}

/// Assigns each face of a ring to a segment.
///
/// `sharp[i]` tells whether ring edge `i` splits. Face `i` sits between edges
/// `i` and `i + 1`, so a new segment starts at face `i` when edge `i` is
/// sharp.
fn segments(sharp: &[bool], closed: bool, face_count: usize) -> Vec<usize> {
    let mut segment = 0;
    let mut result = Vec::with_capacity(face_count);
    for i in 0..face_count {
        if 0 < i && sharp[i] {
            segment += 1;
        }
        result.push(segment);
    }

    // The first and last face of a closed ring are neighbors across edge 0.
    if closed && !sharp[0] && 0 < segment {
        for s in result.iter_mut().filter(|s| **s == segment) {
            *s = 0;
        }
    }
    result
}

/// Returns the interior angle at each corner of `face`.
fn corner_angles(level: &TopologyLevel, face: &Face) -> [f32; 4] {
    let p = |v: &Index| level.vertices()[v.get()].position;
    let mut angles = [0.0; 4];
    // Windows are (prev, corner, next) starting at corner 1.
    for (i, (prev, current, next)) in face
        .vertices
        .iter()
        .map(p)
        .circular_tuple_windows::<(Point, Point, Point)>()
        .enumerate()
    {
        angles[(i + 1) % 4] = angle(prev - current, next - current);
    }
    angles
}

#[inline]
fn angle(a: Vector, b: Vector) -> f32 {
    let mag = (a.mag_sq() * b.mag_sq()).sqrt();
    if mag < EPSILON {
        0.0
    } else {
        (a.dot(b) / mag).clamp(-1.0, 1.0).acos()
    }
}

#[inline]
fn normalized(v: Vector) -> Option<Vector> {
    let mag_sq = v.mag_sq();
    (EPSILON <= mag_sq).then(|| v / mag_sq.sqrt())
}
