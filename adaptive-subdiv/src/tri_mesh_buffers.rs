//! # Triangle Buffer Conversion
//!
//! Helper for turning a refined [`TopologyLevel`] into triangle mesh buffers
//! for use with realtime rendering.
use itertools::Itertools;
use slice_of_array::prelude::*;

use crate::{
    far::{TopologyLevel, Vector},
    normals::Normals,
    Error, Result,
};

/// Returns a flat [`u32`] triangle index buffer and two flat, matching point
/// and normal buffers with three `f32`s per entry.
///
/// All the faces are disconnected. I.e. points & normals are duplicated for
/// each face corner so crease normals from [`Normals::corner`] survive.
///
/// Each quad `(v0, v1, v2, v3)` becomes the triangles `(v0, v1, v2)` and
/// `(v0, v2, v3)`.
///
/// # Errors
///
/// [`Error::InvalidBufferSize`] if `normals` were not computed for `level`.
pub fn to_triangle_mesh_buffers(
    level: &TopologyLevel,
    normals: &Normals,
) -> Result<(Vec<u32>, Vec<f32>, Vec<f32>)> {
    if normals.corner.len() != level.face_count() {
        return Err(Error::InvalidBufferSize {
            expected: level.face_count(),
            actual: normals.corner.len(),
        });
    }

    let (points_nested, normals_nested): (Vec<[f32; 3]>, Vec<[f32; 3]>) = level
        .faces()
        .iter()
        .zip(&normals.corner)
        .flat_map(|(face, corners)| {
            face.vertices
                .iter()
                .zip(corners)
                .map(|(v, &normal)| {
                    (
                        as_array(level.vertices()[v.get()].position),
                        as_array(normal),
                    )
                })
                .collect_vec()
        })
        .unzip();

    let triangle_face_index = (0..level.face_count() as u32)
        .flat_map(|face| {
            let base = 4 * face;
            [base, base + 1, base + 2, base, base + 2, base + 3]
        })
        .collect();

    Ok((
        triangle_face_index,
        points_nested.flat().to_vec(),
        normals_nested.flat().to_vec(),
    ))
}

#[inline]
fn as_array(v: Vector) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{far::TopologyDescriptor, normals::compute_normals};
    use approx::assert_relative_eq;

    #[test]
    fn test_quad_is_split_along_first_diagonal() {
        let level = TopologyDescriptor::new(
            4,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2, 3],
        )
        .unwrap()
        .into_level()
        .unwrap();
        let normals = compute_normals(&level, 0).unwrap();

        let (index, points, normals) = to_triangle_mesh_buffers(&level, &normals).unwrap();
        assert_eq!(index, [0, 1, 2, 0, 2, 3]);
        assert_eq!(&points[6..9], &[1.0, 1.0, 0.0]);
        assert_eq!(normals.len(), 12);
        for n in normals.chunks_exact(3) {
            assert_relative_eq!(n[2], 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mismatched_normals() {
        let level = TopologyDescriptor::new(
            4,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2, 3],
        )
        .unwrap()
        .into_level()
        .unwrap();
        assert!(matches!(
            to_triangle_mesh_buffers(&level, &Normals::default()),
            Err(Error::InvalidBufferSize {
                expected: 1,
                actual: 0
            })
        ));
    }
}
