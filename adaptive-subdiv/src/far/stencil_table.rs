//! Table of refinement stencils.
//!
//! Every vertex of a refined generation is a linear blend of vertices of the
//! previous generation. A stencil assigns a series of control vertex indices a
//! blending weight each. When the control vertices move, or when other data
//! lives on them, the refined values are recomputed simply by applying the
//! weights again.
//!
//! ## Example
//! ```
//! # use adaptive_subdiv::far::{StencilBuilder, StencilTable};
//! # use adaptive_subdiv::Index;
//! let mut midpoint = StencilBuilder::default();
//! midpoint.add(Index(0), 0.5).add(Index(1), 0.5);
//!
//! let table = StencilTable::from_stencils(2, vec![
//!     StencilBuilder::identity(Index(0)),
//!     StencilBuilder::identity(Index(1)),
//!     midpoint,
//! ]);
//!
//! let refined = table.update_values(&[0.0, 0.0, 4.0, 2.0], 2)?;
//! assert_eq!(refined, vec![0.0, 0.0, 4.0, 2.0, 2.0, 1.0]);
//! # Ok::<(), adaptive_subdiv::Error>(())
//! ```
use super::topology_level::Point;
use crate::{Error, Index, Result};

/// Gives read access to a single stencil in a [`StencilTable`].
#[derive(Copy, Clone, Debug)]
pub struct Stencil<'a> {
    indices: &'a [Index],
    weights: &'a [f32],
}

impl<'a> Stencil<'a> {
    /// Returns the indices of the control vertices.
    #[inline]
    pub fn indices(&self) -> &'a [Index] {
        self.indices
    }

    /// Returns the stencil interpolation weights.
    #[inline]
    pub fn weights(&self) -> &'a [f32] {
        self.weights
    }

    /// Returns the sum of the weights. `1` for any affine combination.
    pub fn weight_sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Iterates over `(index, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Index, f32)> + 'a {
        self.indices.iter().copied().zip(self.weights.iter().copied())
    }

    fn blend(&self, values: &[f32], width: usize, out: &mut [f32]) {
        out.iter_mut().for_each(|o| *o = 0.0);
        for (index, weight) in self.iter() {
            let src = &values[index.get() * width..(index.get() + 1) * width];
            for (o, s) in out.iter_mut().zip(src) {
                *o += weight * s;
            }
        }
    }

    fn blend_points(&self, points: &[Point]) -> Point {
        self.iter()
            .fold(Point::zero(), |sum, (index, weight)| {
                sum + points[index.get()] * weight
            })
    }
}

/// A stencil under construction.
///
/// Adding the same index twice accumulates its weight, so rules can be
/// written as a sum of terms without caring whether the terms overlap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StencilBuilder {
    entries: Vec<(Index, f32)>,
}

impl StencilBuilder {
    /// A stencil that copies one control vertex.
    pub fn identity(index: Index) -> Self {
        Self {
            entries: vec![(index, 1.0)],
        }
    }

    /// Adds `weight` to the weight of `index`.
    pub fn add(&mut self, index: Index, weight: f32) -> &mut Self {
        match self.entries.iter_mut().find(|(i, _)| *i == index) {
            Some((_, w)) => *w += weight,
            None => self.entries.push((index, weight)),
        }
        self
    }

    /// Adds `other` scaled by `scale`.
    pub fn add_scaled(&mut self, other: &StencilBuilder, scale: f32) -> &mut Self {
        for &(index, weight) in &other.entries {
            self.add(index, weight * scale);
        }
        self
    }

    /// Returns `(1 - t) * a + t * b`.
    pub fn lerp(a: &StencilBuilder, b: &StencilBuilder, t: f32) -> StencilBuilder {
        if t <= 0.0 {
            return a.clone();
        }
        if 1.0 <= t {
            return b.clone();
        }
        let mut result = StencilBuilder::default();
        result.add_scaled(a, 1.0 - t).add_scaled(b, t);
        result
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the weight of `index`, `0` if it does not contribute.
    pub fn weight(&self, index: Index) -> f32 {
        self.entries
            .iter()
            .find(|(i, _)| *i == index)
            .map_or(0.0, |&(_, w)| w)
    }
}

/// Container for stencil data.
///
/// Stencils are stored back to back. Stencil `i` owns
/// `sizes()[i]` entries of [`control_indices()`](Self::control_indices) and
/// [`weights()`](Self::weights), starting at `offsets()[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StencilTable {
    control_vertex_count: usize,
    sizes: Vec<u32>,
    offsets: Vec<Index>,
    indices: Vec<Index>,
    weights: Vec<f32>,
}

impl StencilTable {
    /// Packs the given stencils into a table over `control_vertex_count`
    /// control vertices. Entries with a zero weight are dropped.
    pub fn from_stencils(control_vertex_count: usize, stencils: Vec<StencilBuilder>) -> Self {
        let total = stencils.iter().map(StencilBuilder::len).sum();
        let mut table = Self {
            control_vertex_count,
            sizes: Vec::with_capacity(stencils.len()),
            offsets: Vec::with_capacity(stencils.len()),
            indices: Vec::with_capacity(total),
            weights: Vec::with_capacity(total),
        };

        for stencil in stencils {
            table.offsets.push(table.indices.len().into());
            let mut size = 0;
            for (index, weight) in stencil.entries {
                if weight != 0.0 {
                    table.indices.push(index);
                    table.weights.push(weight);
                    size += 1;
                }
            }
            table.sizes.push(size);
        }

        table
    }

    /// Returns the number of stencils in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Returns the number of control vertices indexed in the table.
    #[inline]
    pub fn control_vertex_count(&self) -> usize {
        self.control_vertex_count
    }

    /// Returns a Stencil at index i in the table.
    #[inline]
    pub fn stencil(&self, i: Index) -> Option<Stencil<'_>> {
        let size = *self.sizes.get(i.get())? as usize;
        let offset = self.offsets[i.get()].get();
        Some(Stencil {
            indices: &self.indices[offset..offset + size],
            weights: &self.weights[offset..offset + size],
        })
    }

    /// Iterates over all stencils in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Stencil<'_>> + '_ {
        self.sizes
            .iter()
            .zip(&self.offsets)
            .map(move |(&size, offset)| {
                let range = offset.get()..offset.get() + size as usize;
                Stencil {
                    indices: &self.indices[range.clone()],
                    weights: &self.weights[range],
                }
            })
    }

    /// Returns the number of control vertices of each stencil in the table.
    #[inline]
    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// Returns the offset to a given stencil.
    #[inline]
    pub fn offsets(&self) -> &[Index] {
        &self.offsets
    }

    /// Returns the indices of the control vertices.
    #[inline]
    pub fn control_indices(&self) -> &[Index] {
        &self.indices
    }

    /// Returns the stencil interpolation weights.
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Applies the stencils to `values`, `width` floats per control vertex.
    ///
    /// Returns `width` floats per stencil.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBufferSize`] if `values` does not hold exactly
    /// `width` floats per control vertex.
    pub fn update_values(&self, values: &[f32], width: usize) -> Result<Vec<f32>> {
        if values.len() != width * self.control_vertex_count {
            return Err(Error::InvalidBufferSize {
                expected: width * self.control_vertex_count,
                actual: values.len(),
            });
        }
        let mut refined = vec![0.0; width * self.len()];
        if width == 0 {
            return Ok(refined);
        }

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            let stencils: Vec<Stencil<'_>> = self.iter().collect();
            refined
                .par_chunks_exact_mut(width)
                .zip(stencils.par_iter())
                .for_each(|(out, stencil)| stencil.blend(values, width, out));
        }

        #[cfg(not(feature = "rayon"))]
        for (out, stencil) in refined.chunks_exact_mut(width).zip(self.iter()) {
            stencil.blend(values, width, out);
        }

        Ok(refined)
    }

    /// Applies the stencils to positions.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBufferSize`] if there is not one point per control
    /// vertex.
    pub fn update_points(&self, points: &[Point]) -> Result<Vec<Point>> {
        if points.len() != self.control_vertex_count {
            return Err(Error::InvalidBufferSize {
                expected: self.control_vertex_count,
                actual: points.len(),
            });
        }

        Ok(self.blend_points(points))
    }

    #[cfg(not(feature = "rayon"))]
    fn blend_points(&self, points: &[Point]) -> Vec<Point> {
        self.iter()
            .map(|stencil| stencil.blend_points(points))
            .collect()
    }

    #[cfg(feature = "rayon")]
    fn blend_points(&self, points: &[Point]) -> Vec<Point> {
        use rayon::prelude::*;
        let stencils: Vec<Stencil<'_>> = self.iter().collect();
        stencils
            .par_iter()
            .map(|stencil| stencil.blend_points(points))
            .collect()
    }
}
