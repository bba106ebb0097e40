//! Topology refinement.
//!
//! [`TopologyRefiner`] is the entry point of `far`. It owns a control
//! [`TopologyLevel`], refines it adaptively and gives access to the refined
//! mesh topology.
//!
//! Each pass
//!
//! 1. classifies the faces of the current level and makes the states of
//!    neighbors agree (see [`Classification`]),
//! 2. builds the next level (see [`RefinementPass`]),
//! 3. places its vertices (see [`VertexSolver`]), and
//! 4. keeps refining the children of a face only if one of its corners or
//!    split edge midpoints moved by more than the
//!    [`tolerance`](AdaptiveRefinementOptions::tolerance).
//!
//! The result can be accessed via:
//! * [`level()`](TopologyRefiner::level()) – The refined topology.
//! * [`passes()`](TopologyRefiner::passes()) – What each pass did, as used by
//!   the [`PrimvarRefiner`](super::PrimvarRefiner).
//! * [`edge_lineage()`](TopologyRefiner::edge_lineage()) – The control edge
//!   each refined edge lies on, if requested.
use tracing::debug;

use super::{
    classification::{Classification, FaceState},
    refinement_pass::{FaceOrigin, RefinementPass, VertexOrigin},
    stencil_table::StencilTable,
    topology_level::TopologyLevel,
    vertex_solver::VertexSolver,
};
use crate::{Error, Index, Result};

/// Adaptive topology refinement options.
///
/// # Examples
///
/// ```
/// use adaptive_subdiv::far::AdaptiveRefinementOptions;
///
/// let options = AdaptiveRefinementOptions {
///     tolerance: 0.001,
///     ..Default::default()
/// };
/// assert_eq!(options.max_depth, 4);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AdaptiveRefinementOptions {
    /// A face keeps being refined while a vertex it touches moves by more
    /// than this, measured along the surface normal. Must be finite and not
    /// negative.
    pub tolerance: f32,
    /// Maximum number of passes. Must be at least `1`.
    pub max_depth: usize,
    /// Record, for every refined edge, the control mesh edge it lies on.
    pub track_edge_lineage: bool,
}

impl Default for AdaptiveRefinementOptions {
    /// Create adaptive refinement options with the following defaults:
    ///
    /// | Property             | Value   |
    /// |----------------------|---------|
    /// | `tolerance`          | `0.01`  |
    /// | `max_depth`          | `4`     |
    /// | `track_edge_lineage` | `false` |
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_depth: 4,
            track_edge_lineage: false,
        }
    }
}

impl AdaptiveRefinementOptions {
    fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "Tolerance must be finite and not negative, got {}.",
                self.tolerance
            )));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidArgument(
                "Maximum depth must be at least 1.".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one refinement pass did.
#[derive(Clone, Debug)]
pub struct PassRecord {
    depth: usize,
    pass: RefinementPass,
    stencils: StencilTable,
    max_displacement: f32,
    refinable_faces: usize,
}

impl PassRecord {
    /// The depth the pass ran at, counting from `0`.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The state each face of the pass' input level was refined with.
    #[inline]
    pub fn states(&self) -> &[FaceState] {
        self.pass.states()
    }

    /// Returns the number of input faces in `state`.
    pub fn count(&self, state: FaceState) -> usize {
        self.states().iter().filter(|&&s| s == state).count()
    }

    /// One stencil per output vertex, over the input vertices.
    #[inline]
    pub fn stencils(&self) -> &StencilTable {
        &self.stencils
    }

    #[inline]
    pub fn vertex_origins(&self) -> &[VertexOrigin] {
        self.pass.vertex_origins()
    }

    #[inline]
    pub fn edge_parents(&self) -> &[Option<Index>] {
        self.pass.edge_parents()
    }

    #[inline]
    pub fn face_origins(&self) -> &[FaceOrigin] {
        self.pass.face_origins()
    }

    /// The output faces that replace input face `parent`.
    #[inline]
    pub fn children(&self, parent: Index) -> std::ops::Range<usize> {
        self.pass.children(parent)
    }

    /// Number of vertices of the input level.
    #[inline]
    pub fn input_vertex_count(&self) -> usize {
        self.stencils.control_vertex_count()
    }

    /// Number of vertices of the output level.
    #[inline]
    pub fn output_vertex_count(&self) -> usize {
        self.stencils.len()
    }

    /// Number of faces of the input level.
    #[inline]
    pub fn input_face_count(&self) -> usize {
        self.pass.states().len()
    }

    /// Number of faces of the output level.
    #[inline]
    pub fn output_face_count(&self) -> usize {
        self.pass.face_origins().len()
    }

    /// The largest distance a vertex moved in this pass.
    #[inline]
    pub fn max_displacement(&self) -> f32 {
        self.max_displacement
    }

    /// Number of output faces handed on as refinable to the next pass.
    #[inline]
    pub fn refinable_faces(&self) -> usize {
        self.refinable_faces
    }
}

/// Stores a control mesh and its adaptive refinement.
#[derive(Clone, Debug)]
pub struct TopologyRefiner {
    base: TopologyLevel,
    level: Option<TopologyLevel>,
    options: AdaptiveRefinementOptions,
    passes: Vec<PassRecord>,
    edge_lineage: Option<Vec<Option<Index>>>,
}

impl TopologyRefiner {
    /// Create a new topology refiner for the control mesh `base`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] for a negative or non-finite tolerance or
    ///   a maximum depth of `0`.
    /// * [`Error::EmptyMesh`] if `base` has no faces.
    /// * Any error [`TopologyLevel::validate()`] reports for `base`.
    pub fn new(base: TopologyLevel, options: AdaptiveRefinementOptions) -> Result<Self> {
        options.validate()?;
        if base.face_count() == 0 {
            return Err(Error::EmptyMesh);
        }
        base.validate()?;

        Ok(Self {
            base,
            level: None,
            options,
            passes: Vec::new(),
            edge_lineage: None,
        })
    }

    /// Returns the refinement options.
    #[inline]
    pub fn options(&self) -> AdaptiveRefinementOptions {
        self.options
    }

    /// Returns the control mesh.
    #[inline]
    pub fn base_level(&self) -> &TopologyLevel {
        &self.base
    }

    /// Returns the most refined level. This is the control mesh until
    /// [`refine_adaptive()`](Self::refine_adaptive) was called.
    #[inline]
    pub fn level(&self) -> &TopologyLevel {
        self.level.as_ref().unwrap_or(&self.base)
    }

    /// Consumes the refiner and returns the most refined level.
    pub fn into_level(self) -> TopologyLevel {
        self.level.unwrap_or(self.base)
    }

    /// Returns the number of levels, including the control mesh.
    #[inline]
    pub fn refinement_levels(&self) -> usize {
        self.passes.len() + 1
    }

    /// Returns the passes run by the last refinement, in order.
    #[inline]
    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    /// For every edge of [`level()`](Self::level), the control mesh edge it
    /// lies on. `None` for edges inside a control face.
    ///
    /// Only recorded if
    /// [`track_edge_lineage`](AdaptiveRefinementOptions::track_edge_lineage)
    /// is set.
    #[inline]
    pub fn edge_lineage(&self) -> Option<&[Option<Index>]> {
        self.edge_lineage.as_deref()
    }

    /// Refine the topology adaptively.
    ///
    /// Refinement always starts from the control mesh; an earlier refinement
    /// is discarded.
    ///
    /// * `selected_faces` - Control faces to start refining. Empty means all
    ///   faces.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfBounds`] for a selected face that does not exist.
    /// * Any topology error of a pass. The refiner is left unrefined then.
    pub fn refine_adaptive(&mut self, selected_faces: &[Index]) -> Result<()> {
        self.unrefine();

        let mut refine = vec![selected_faces.is_empty(); self.base.face_count()];
        for &face in selected_faces {
            match refine.get_mut(face.get()) {
                Some(r) => *r = true,
                None => {
                    return Err(Error::IndexOutOfBounds {
                        index: face.get(),
                        max: self.base.face_count(),
                    })
                }
            }
        }

        debug!(
            "Refining {} of {} faces, tolerance {}, max depth {}",
            refine.iter().filter(|&&r| r).count(),
            self.base.face_count(),
            self.options.tolerance,
            self.options.max_depth
        );

        let mut current: Option<TopologyLevel> = None;
        let mut passes = Vec::new();
        let mut lineage: Option<Vec<Option<Index>>> = self
            .options
            .track_edge_lineage
            .then(|| (0..self.base.edge_count()).map(|e| Some(e.into())).collect());

        for depth in 0..self.options.max_depth {
            let level = current.as_ref().unwrap_or(&self.base);

            let mut classification = Classification::new(level, &refine)?;
            classification.propagate(level)?;
            if classification.is_all_final() {
                break;
            }

            let mut pass = RefinementPass::build(level, &classification)?;
            let solution = VertexSolver::new(level, &classification, depth).solve(&pass)?;
            solution.apply(&mut pass)?;

            refine = self.refinable_children(&pass, solution.displacements());
            let refinable_faces = refine.iter().filter(|&&r| r).count();

            if let Some(lineage) = lineage.as_mut() {
                *lineage = pass
                    .edge_parents()
                    .iter()
                    .map(|parent| parent.and_then(|p| lineage[p.get()]))
                    .collect();
            }

            let next = pass.take_level();
            passes.push(PassRecord {
                depth,
                pass,
                stencils: solution.stencils().clone(),
                max_displacement: solution.max_displacement(),
                refinable_faces,
            });

            debug!(
                "Pass {}: {} subdivided, {} y-v2, {} y-v4, {} final -> {} vertices, {} edges, {} faces, {} refinable",
                depth,
                classification.count(FaceState::Subdivide),
                classification.count(FaceState::Yv2),
                classification.count(FaceState::Yv4),
                classification.count(FaceState::Final),
                next.vertex_count(),
                next.edge_count(),
                next.face_count(),
                refinable_faces
            );

            current = Some(next);
            if refinable_faces == 0 {
                break;
            }
        }

        self.level = current;
        self.passes = passes;
        self.edge_lineage = lineage;
        Ok(())
    }

    /// Marks the children of every refined face one of whose corners or
    /// split edge midpoints moved by more than the tolerance.
    fn refinable_children(&self, pass: &RefinementPass, displacements: &[f32]) -> Vec<bool> {
        let moved = |v: Index| self.options.tolerance < displacements[v.get()];
        let input_faces = pass.states().len();
        let mut refine = vec![false; pass.level().face_count()];

        // A child corner at uv (0.5, 0.5) is the parent's center, every other
        // one is a corner or a split edge midpoint of the parent.
        for f in 0..input_faces {
            let parent = Index::from(f);
            if pass.states()[f].is_final() {
                continue;
            }
            let children = pass.children(parent);
            let keep = children.clone().any(|child| {
                let face = &pass.level().faces()[child];
                face.vertices
                    .iter()
                    .zip(pass.face_origins()[child].uvs)
                    .any(|(&v, uv)| uv != [0.5, 0.5] && moved(v))
            });
            if keep {
                refine[children].iter_mut().for_each(|r| *r = true);
            }
        }

        refine
    }

    /// Discards the refinement, keeping only the control mesh.
    pub fn unrefine(&mut self) {
        self.level = None;
        self.passes.clear();
        self.edge_lineage = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::far::TopologyDescriptor;

    fn unit_quad() -> TopologyLevel {
        TopologyDescriptor::new(
            4,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2, 3],
        )
        .unwrap()
        .into_level()
        .unwrap()
    }

    #[test]
    fn test_options_default() {
        let options = AdaptiveRefinementOptions::default();
        assert_eq!(options.tolerance, 0.01);
        assert_eq!(options.max_depth, 4);
        assert!(!options.track_edge_lineage);
    }

    #[test]
    fn test_invalid_options() {
        for options in [
            AdaptiveRefinementOptions {
                tolerance: -1.0,
                ..Default::default()
            },
            AdaptiveRefinementOptions {
                tolerance: f32::NAN,
                ..Default::default()
            },
            AdaptiveRefinementOptions {
                max_depth: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                TopologyRefiner::new(unit_quad(), options),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_empty_mesh() {
        assert!(matches!(
            TopologyRefiner::new(TopologyLevel::default(), Default::default()),
            Err(Error::EmptyMesh)
        ));
    }

    #[test]
    fn test_selection_out_of_bounds() {
        let mut refiner = TopologyRefiner::new(unit_quad(), Default::default()).unwrap();
        assert!(matches!(
            refiner.refine_adaptive(&[Index(1)]),
            Err(Error::IndexOutOfBounds { index: 1, max: 1 })
        ));
    }

    #[test]
    fn test_flat_quad_stops_after_one_pass() {
        let mut refiner = TopologyRefiner::new(
            unit_quad(),
            AdaptiveRefinementOptions {
                tolerance: 0.0,
                max_depth: 5,
                track_edge_lineage: true,
            },
        )
        .unwrap();
        refiner.refine_adaptive(&[]).unwrap();

        assert_eq!(refiner.passes().len(), 1);
        assert_eq!(refiner.refinement_levels(), 2);
        assert_eq!(refiner.passes()[0].refinable_faces(), 0);
        assert_eq!(refiner.level().face_count(), 4);

        let lineage = refiner.edge_lineage().unwrap();
        assert_eq!(lineage.len(), 12);
        assert_eq!(lineage.iter().filter(|l| l.is_none()).count(), 4);

        refiner.unrefine();
        assert_eq!(refiner.level().face_count(), 1);
        assert!(refiner.edge_lineage().is_none());
    }
}
