//! Refinement of primitive variables.
//!
//! Primvar data comes in three shapes, each refined differently:
//!
//! * **Vertex** data (one value per vertex) is blended with the same
//!   stencils as the positions, see [`PrimvarRefiner::interpolate()`].
//! * **Face uniform** data (one value per face) is copied to every child
//!   face, see [`PrimvarRefiner::interpolate_face_uniform()`].
//! * **Face varying** data (one value per face corner, e.g. texture
//!   coordinates with seams) is interpolated bilinearly over the parent face,
//!   see [`PrimvarRefiner::interpolate_face_varying()`].
//!
//! All values are flat `f32` buffers with `width` floats per element.
//!
//! ## Example
//! ```
//! # use adaptive_subdiv::far::{
//! #     AdaptiveRefinementOptions, PrimvarRefiner, TopologyDescriptor, TopologyRefiner,
//! # };
//! let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
//! let control = TopologyDescriptor::new(4, &positions, &[0, 1, 2, 3])?.into_level()?;
//! let mut refiner = TopologyRefiner::new(control, AdaptiveRefinementOptions::default())?;
//! refiner.refine_adaptive(&[])?;
//!
//! // One temperature per vertex.
//! let temperatures = [0.0, 1.0, 2.0, 1.0];
//! let refined = PrimvarRefiner::new(&refiner).interpolate_all(1, &temperatures)?;
//! assert_eq!(refined.len(), refiner.level().vertex_count());
//! # Ok::<(), adaptive_subdiv::Error>(())
//! ```
use super::topology_refiner::{PassRecord, TopologyRefiner};
use crate::{Error, Index, Result};

/// Applies the refinement recorded in a [`TopologyRefiner`] to primvar data.
#[derive(Copy, Clone, Debug)]
pub struct PrimvarRefiner<'a> {
    refiner: &'a TopologyRefiner,
}

impl<'a> PrimvarRefiner<'a> {
    pub fn new(refiner: &'a TopologyRefiner) -> PrimvarRefiner<'a> {
        Self { refiner }
    }

    fn pass(&self, pass: usize) -> Result<&'a PassRecord> {
        self.refiner
            .passes()
            .get(pass)
            .ok_or(Error::IndexOutOfBounds {
                index: pass,
                max: self.refiner.passes().len(),
            })
    }

    /// Refines per-vertex data from the input to the output of `pass`.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfBounds`] if there is no such pass.
    /// * [`Error::InvalidBufferSize`] if `src` does not hold `width` floats
    ///   per input vertex.
    pub fn interpolate(&self, pass: usize, width: usize, src: &[f32]) -> Result<Vec<f32>> {
        self.pass(pass)?.stencils().update_values(src, width)
    }

    /// Refines per-vertex data of tuples, e.g. colors as `[f32; 4]`.
    pub fn interpolate_elements<const N: usize>(
        &self,
        pass: usize,
        src: &[[f32; N]],
    ) -> Result<Vec<[f32; N]>> {
        let refined = self.interpolate(pass, N, bytemuck::cast_slice(src))?;
        Ok(bytemuck::cast_slice(&refined[..]).to_vec())
    }

    /// Copies per-face data of each input face of `pass` to its children.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfBounds`] if there is no such pass.
    /// * [`Error::InvalidBufferSize`] if `src` does not hold `width` floats
    ///   per input face.
    pub fn interpolate_face_uniform(&self, pass: usize, width: usize, src: &[f32]) -> Result<Vec<f32>> {
        let record = self.pass(pass)?;
        check_len(src, width * record.input_face_count())?;

        let mut dst = Vec::with_capacity(width * record.output_face_count());
        for origin in record.face_origins() {
            let parent = origin.parent.get();
            dst.extend_from_slice(&src[parent * width..(parent + 1) * width]);
        }
        Ok(dst)
    }

    /// Interpolates per-face-corner data bilinearly over each input face of
    /// `pass`.
    ///
    /// `src` holds `4 * width` floats per input face, in corner order.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfBounds`] if there is no such pass.
    /// * [`Error::InvalidBufferSize`] if `src` has the wrong length.
    pub fn interpolate_face_varying(&self, pass: usize, width: usize, src: &[f32]) -> Result<Vec<f32>> {
        let record = self.pass(pass)?;
        check_len(src, 4 * width * record.input_face_count())?;

        let mut dst = vec![0.0; 4 * width * record.output_face_count()];
        if width == 0 {
            return Ok(dst);
        }
        for (corners, origin) in dst.chunks_exact_mut(4 * width).zip(record.face_origins()) {
            let parent = origin.parent.get();
            let values = &src[4 * width * parent..4 * width * (parent + 1)];
            for (corner, [u, v]) in corners.chunks_exact_mut(width).zip(origin.uvs) {
                let weights = [(1.0 - u) * (1.0 - v), u * (1.0 - v), u * v, (1.0 - u) * v];
                for (value, weight) in values.chunks_exact(width).zip(weights) {
                    for (c, x) in corner.iter_mut().zip(value) {
                        *c += weight * x;
                    }
                }
            }
        }
        Ok(dst)
    }

    /// Refines per-vertex data of the control mesh to the final level.
    pub fn interpolate_all(&self, width: usize, src: &[f32]) -> Result<Vec<f32>> {
        self.through_all_passes(src, |pass, values| self.interpolate(pass, width, values))
    }

    /// Copies per-face data of the control mesh to the faces of the final
    /// level.
    pub fn interpolate_face_uniform_all(&self, width: usize, src: &[f32]) -> Result<Vec<f32>> {
        self.through_all_passes(src, |pass, values| {
            self.interpolate_face_uniform(pass, width, values)
        })
    }

    /// Interpolates per-face-corner data of the control mesh to the faces of
    /// the final level.
    pub fn interpolate_face_varying_all(&self, width: usize, src: &[f32]) -> Result<Vec<f32>> {
        self.through_all_passes(src, |pass, values| {
            self.interpolate_face_varying(pass, width, values)
        })
    }

    fn through_all_passes(
        &self,
        src: &[f32],
        step: impl Fn(usize, &[f32]) -> Result<Vec<f32>>,
    ) -> Result<Vec<f32>> {
        let mut values = src.to_vec();
        for pass in 0..self.refiner.passes().len() {
            values = step(pass, &values)?;
        }
        Ok(values)
    }

    /// Returns the control face each face of the final level lies in.
    pub fn base_faces(&self) -> Vec<Index> {
        let mut faces: Vec<Index> = (0..self.refiner.base_level().face_count())
            .map(Index::from)
            .collect();
        for record in self.refiner.passes() {
            faces = record
                .face_origins()
                .iter()
                .map(|origin| faces[origin.parent.get()])
                .collect();
        }
        faces
    }
}

#[inline]
fn check_len(src: &[f32], expected: usize) -> Result<()> {
    if src.len() == expected {
        Ok(())
    } else {
        Err(Error::InvalidBufferSize {
            expected,
            actual: src.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::far::{AdaptiveRefinementOptions, TopologyDescriptor};
    use approx::assert_relative_eq;

    fn refined_quad() -> TopologyRefiner {
        let level = TopologyDescriptor::new(
            4,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2, 3],
        )
        .unwrap()
        .into_level()
        .unwrap();
        let mut refiner = TopologyRefiner::new(
            level,
            AdaptiveRefinementOptions {
                tolerance: 0.0,
                max_depth: 1,
                ..Default::default()
            },
        )
        .unwrap();
        refiner.refine_adaptive(&[]).unwrap();
        refiner
    }

    #[test]
    fn test_vertex_data_follows_positions() {
        let refiner = refined_quad();
        let primvars = PrimvarRefiner::new(&refiner);

        let points: Vec<[f32; 3]> = refiner.base_level().points();
        let refined = primvars.interpolate_elements(0, &points).unwrap();
        for (value, point) in refined.iter().zip(refiner.level().points()) {
            for i in 0..3 {
                assert_relative_eq!(value[i], point[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_face_uniform_is_replicated() {
        let refiner = refined_quad();
        let refined = PrimvarRefiner::new(&refiner)
            .interpolate_face_uniform(0, 2, &[7.0, 8.0])
            .unwrap();
        assert_eq!(refined, [7.0, 8.0].repeat(4));
    }

    #[test]
    fn test_face_varying_is_bilinear() {
        let refiner = refined_quad();
        let uvs = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let refined = PrimvarRefiner::new(&refiner)
            .interpolate_face_varying_all(2, &uvs)
            .unwrap();

        // The corner uvs of the unit square are its positions.
        let level = refiner.level();
        for (face, corners) in level.faces().iter().zip(refined.chunks_exact(8)) {
            for (v, uv) in face.vertices.iter().zip(corners.chunks_exact(2)) {
                let p = level.vertices()[v.get()].position;
                assert_relative_eq!(uv[0], p.x, epsilon = 1e-6);
                assert_relative_eq!(uv[1], p.y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_wrong_sizes() {
        let refiner = refined_quad();
        let primvars = PrimvarRefiner::new(&refiner);
        assert!(matches!(
            primvars.interpolate(0, 3, &[0.0; 9]),
            Err(Error::InvalidBufferSize {
                expected: 12,
                actual: 9
            })
        ));
        assert!(matches!(
            primvars.interpolate(1, 1, &[0.0; 4]),
            Err(Error::IndexOutOfBounds { index: 1, max: 1 })
        ));
        assert!(matches!(
            primvars.interpolate_face_varying(0, 1, &[0.0; 3]),
            Err(Error::InvalidBufferSize { .. })
        ));
    }

    #[test]
    fn test_base_faces() {
        let refiner = refined_quad();
        assert_eq!(PrimvarRefiner::new(&refiner).base_faces(), vec![Index(0); 4]);
    }
}
