//! Per-face subdivision states and critical edge propagation.
//!
//! Before a refinement pass every face is in one of four [`FaceState`]s. A
//! face that is split into four must not sit next to a face that leaves the
//! shared edge whole, or the refined mesh has a T-junction. Such an edge is
//! *critical*.
//!
//! [`Classification::propagate()`] resolves all critical edges by promoting
//! the under-committed face of each one to the weakest state that splits the
//! edge. Promotions only ever go up the lattice
//! `Final < {Yv2, Yv4} < Subdivide`, so the process terminates.
use tracing::trace;

use super::topology_level::TopologyLevel;
use crate::{Error, Index, Result};

/// How a face is refined in the next pass.
///
/// There are only two Y orientations. A face next to a split edge that would
/// need any other orientation is promoted to [`Subdivide`](Self::Subdivide),
/// which splits its remaining sides in turn. On regular grids these
/// promotions run along the diagonal to the mesh boundary, so refining a
/// single selected face is not local: one `Subdivide` face per grid row along
/// its diagonal is to be expected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum FaceState {
    /// Copied unchanged.
    #[display("final")]
    Final,
    /// Split into four quads.
    #[display("subdivide")]
    Subdivide,
    /// Split into three quads fanning around vertex 2. Sides `e3` and `e4`
    /// are split, `e1` and `e2` stay whole.
    #[display("y-v2")]
    Yv2,
    /// Split into three quads fanning around vertex 4. Sides `e1` and `e2`
    /// are split, `e3` and `e4` stay whole.
    #[display("y-v4")]
    Yv4,
}

impl FaceState {
    /// Returns `true` if a face in this state splits its side `slot`.
    #[inline]
    pub const fn splits(self, slot: usize) -> bool {
        match self {
            FaceState::Final => false,
            FaceState::Subdivide => true,
            FaceState::Yv2 => 2 <= slot,
            FaceState::Yv4 => slot < 2,
        }
    }

    #[inline]
    pub const fn is_final(self) -> bool {
        matches!(self, FaceState::Final)
    }

    /// Number of faces this face turns into.
    #[inline]
    pub const fn child_count(self) -> usize {
        match self {
            FaceState::Final => 1,
            FaceState::Subdivide => 4,
            FaceState::Yv2 | FaceState::Yv4 => 3,
        }
    }

    const fn rank(self) -> u8 {
        match self {
            FaceState::Final => 0,
            FaceState::Yv2 | FaceState::Yv4 => 1,
            FaceState::Subdivide => 2,
        }
    }
}

/// The pair of sides of a face an edge lies on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SidePair {
    /// `e1` or `e2`.
    Lower,
    /// `e3` or `e4`.
    Upper,
}

impl SidePair {
    #[inline]
    const fn of(slot: usize) -> Self {
        if slot < 2 {
            SidePair::Lower
        } else {
            SidePair::Upper
        }
    }

    /// The `Y` state that splits this pair.
    #[inline]
    const fn y_state(self) -> FaceState {
        match self {
            SidePair::Lower => FaceState::Yv4,
            SidePair::Upper => FaceState::Yv2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Resolution {
    Consistent,
    PromoteFirst(FaceState),
    PromoteSecond(FaceState),
}

/// The case table. `a` and `b` are the states of the two faces of an edge,
/// `pa` and `pb` the side pair the edge lies on in each.
fn resolve(a: FaceState, pa: SidePair, b: FaceState, pb: SidePair) -> Resolution {
    use FaceState::*;
    use Resolution::*;
    use SidePair::*;

    // Both split (or both keep) the edge: nothing to do. Otherwise promote
    // the face that keeps it.
    let either = |a_splits: bool, b_splits: bool, a_to: FaceState, b_to: FaceState| match (
        a_splits, b_splits,
    ) {
        (true, false) => PromoteSecond(b_to),
        (false, true) => PromoteFirst(a_to),
        _ => Consistent,
    };

    match (a, b) {
        (Final, Final) => Consistent,
        (Subdivide, Subdivide) => Consistent,

        (Subdivide, Final) => PromoteSecond(pb.y_state()),
        (Final, Subdivide) => PromoteFirst(pa.y_state()),

        (Subdivide, Yv2) => either(true, pb == Upper, Subdivide, Subdivide),
        (Subdivide, Yv4) => either(true, pb == Lower, Subdivide, Subdivide),
        (Yv2, Subdivide) => either(pa == Upper, true, Subdivide, Subdivide),
        (Yv4, Subdivide) => either(pa == Lower, true, Subdivide, Subdivide),

        (Yv2, Final) => either(pa == Upper, false, Subdivide, pb.y_state()),
        (Yv4, Final) => either(pa == Lower, false, Subdivide, pb.y_state()),
        (Final, Yv2) => either(false, pb == Upper, pa.y_state(), Subdivide),
        (Final, Yv4) => either(false, pb == Lower, pa.y_state(), Subdivide),

        (Yv2, Yv2) => either(pa == Upper, pb == Upper, Subdivide, Subdivide),
        (Yv2, Yv4) => either(pa == Upper, pb == Lower, Subdivide, Subdivide),
        (Yv4, Yv2) => either(pa == Lower, pb == Upper, Subdivide, Subdivide),
        (Yv4, Yv4) => either(pa == Lower, pb == Lower, Subdivide, Subdivide),
    }
}

/// Subdivision states of all faces of one level, plus the per-edge split
/// marks derived from them.
///
/// This is scratch state for a single pass. It refers to a
/// [`TopologyLevel`] by index only and is dropped once the pass is built.
#[derive(Clone, Debug)]
pub struct Classification {
    states: Vec<FaceState>,
    split_edges: Vec<bool>,
    promotions: usize,
}

impl Classification {
    /// Classifies every face of `level` as [`Subdivide`](FaceState::Subdivide)
    /// if `refine[face]` is set, [`Final`](FaceState::Final) otherwise.
    pub fn new(level: &TopologyLevel, refine: &[bool]) -> Result<Self> {
        if refine.len() != level.face_count() {
            return Err(Error::InvalidBufferSize {
                expected: level.face_count(),
                actual: refine.len(),
            });
        }
        Self::from_states(
            level,
            refine
                .iter()
                .map(|&r| {
                    if r {
                        FaceState::Subdivide
                    } else {
                        FaceState::Final
                    }
                })
                .collect(),
        )
    }

    /// Uses the given states as the starting point.
    pub fn from_states(level: &TopologyLevel, states: Vec<FaceState>) -> Result<Self> {
        if states.len() != level.face_count() {
            return Err(Error::InvalidBufferSize {
                expected: level.face_count(),
                actual: states.len(),
            });
        }
        let mut classification = Self {
            states,
            split_edges: vec![false; level.edge_count()],
            promotions: 0,
        };
        classification.mark_split_edges(level)?;
        Ok(classification)
    }

    #[inline]
    pub fn state(&self, face: Index) -> FaceState {
        self.states[face.get()]
    }

    #[inline]
    pub fn states(&self) -> &[FaceState] {
        &self.states
    }

    /// Returns the number of faces in `state`.
    pub fn count(&self, state: FaceState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    /// Returns `true` if no face is refined.
    pub fn is_all_final(&self) -> bool {
        self.states.iter().all(|s| s.is_final())
    }

    /// Number of promotions the last [`propagate()`](Self::propagate) made.
    #[inline]
    pub fn promotions(&self) -> usize {
        self.promotions
    }

    /// Returns `true` if `edge` is split by at least one of its faces.
    #[inline]
    pub fn is_edge_split(&self, edge: Index) -> bool {
        self.split_edges[edge.get()]
    }

    /// Returns `true` if the two faces of `edge` disagree on whether it is
    /// split. Boundary edges are never critical.
    pub fn is_critical(&self, level: &TopologyLevel, edge: Index) -> Result<bool> {
        let e = &level.edges[edge.get()];
        let (Some(a), Some(b)) = (e.faces[0], e.faces[1]) else {
            return Ok(false);
        };
        let (slot_a, slot_b) = (slot(level, a, edge)?, slot(level, b, edge)?);
        Ok(self.state(a).splits(slot_a) != self.state(b).splits(slot_b))
    }

    /// Promotes faces until no edge is critical.
    ///
    /// # Errors
    ///
    /// [`Error::OpenFaceLoop`] if an edge names a face that does not use it,
    /// [`Error::UnresolvedCriticalEdge`] if an edge is still critical after
    /// the work list ran empty.
    pub fn propagate(&mut self, level: &TopologyLevel) -> Result<()> {
        let mut queued = vec![false; level.edge_count()];
        let mut stack = self.critical_edges(level)?;
        for e in &stack {
            queued[e.get()] = true;
        }
        let seeded = stack.len();
        self.promotions = 0;

        while let Some(edge) = stack.pop() {
            queued[edge.get()] = false;

            let e = &level.edges[edge.get()];
            let (Some(a), Some(b)) = (e.faces[0], e.faces[1]) else {
                continue;
            };
            let (slot_a, slot_b) = (slot(level, a, edge)?, slot(level, b, edge)?);

            let (face, state) = match resolve(
                self.state(a),
                SidePair::of(slot_a),
                self.state(b),
                SidePair::of(slot_b),
            ) {
                Resolution::Consistent => continue,
                Resolution::PromoteFirst(state) => (a, state),
                Resolution::PromoteSecond(state) => (b, state),
            };

            debug_assert!(self.state(face).rank() < state.rank());
            self.states[face.get()] = state;
            self.promotions += 1;

            for other in level.faces[face.get()].edges {
                if !queued[other.get()] && self.is_critical(level, other)? {
                    queued[other.get()] = true;
                    stack.push(other);
                }
            }
        }

        if let Some(edge) = self.critical_edges(level)?.first() {
            return Err(Error::UnresolvedCriticalEdge { edge: edge.get() });
        }

        trace!(
            "Critical edge propagation: {} seeded, {} promotions",
            seeded,
            self.promotions
        );

        self.mark_split_edges(level)
    }

    #[cfg(not(feature = "rayon"))]
    fn critical_edges(&self, level: &TopologyLevel) -> Result<Vec<Index>> {
        let mut critical = Vec::new();
        for edge in 0..level.edge_count() {
            if self.is_critical(level, edge.into())? {
                critical.push(edge.into());
            }
        }
        Ok(critical)
    }

    #[cfg(feature = "rayon")]
    fn critical_edges(&self, level: &TopologyLevel) -> Result<Vec<Index>> {
        use rayon::prelude::*;
        (0..level.edge_count())
            .into_par_iter()
            .filter_map(|edge| match self.is_critical(level, edge.into()) {
                Ok(true) => Some(Ok(Index::from(edge))),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    fn mark_split_edges(&mut self, level: &TopologyLevel) -> Result<()> {
        self.split_edges.iter_mut().for_each(|s| *s = false);
        for (f, face) in level.faces.iter().enumerate() {
            let state = self.states[f];
            for (slot, edge) in face.edges.iter().enumerate() {
                if state.splits(slot) {
                    self.split_edges[edge.get()] = true;
                }
            }
        }
        Ok(())
    }
}

#[inline]
fn slot(level: &TopologyLevel, face: Index, edge: Index) -> Result<usize> {
    level.faces[face.get()]
        .slot(edge)
        .ok_or(Error::OpenFaceLoop { face: face.get() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::far::TopologyDescriptor;

    // 6 7 8
    // 3 4 5
    // 0 1 2
    fn grid_2x2() -> TopologyLevel {
        let mut positions = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                positions.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }
        TopologyDescriptor::new(
            9,
            &positions,
            &[0, 1, 4, 3, 1, 2, 5, 4, 3, 4, 7, 6, 4, 5, 8, 7],
        )
        .unwrap()
        .into_level()
        .unwrap()
    }

    fn assert_no_critical_edges(level: &TopologyLevel, classification: &Classification) {
        for e in 0..level.edge_count() {
            assert!(!classification.is_critical(level, e.into()).unwrap());
        }
    }

    #[test]
    fn test_case_table_is_symmetric() {
        use FaceState::*;
        let states = [Final, Subdivide, Yv2, Yv4];
        let pairs = [SidePair::Lower, SidePair::Upper];
        for a in states {
            for b in states {
                for pa in pairs {
                    for pb in pairs {
                        let forward = resolve(a, pa, b, pb);
                        let backward = resolve(b, pb, a, pa);
                        let mirrored = match backward {
                            Resolution::Consistent => Resolution::Consistent,
                            Resolution::PromoteFirst(s) => Resolution::PromoteSecond(s),
                            Resolution::PromoteSecond(s) => Resolution::PromoteFirst(s),
                        };
                        assert_eq!(forward, mirrored, "{a} {pa:?} / {b} {pb:?}");

                        // A promotion always makes the pair consistent.
                        let slot = |p: SidePair| if p == SidePair::Lower { 0 } else { 2 };
                        let (a2, b2) = match forward {
                            Resolution::Consistent => (a, b),
                            Resolution::PromoteFirst(s) => (s, b),
                            Resolution::PromoteSecond(s) => (a, s),
                        };
                        assert_eq!(a2.splits(slot(pa)), b2.splits(slot(pb)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_selection_cascades_along_the_diagonal() {
        let size = 8u32;
        let mut positions = Vec::new();
        for y in 0..=size {
            for x in 0..=size {
                positions.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }
        let mut faces = Vec::new();
        for y in 0..size {
            for x in 0..size {
                let v = y * (size + 1) + x;
                faces.extend_from_slice(&[v, v + 1, v + size + 2, v + size + 1]);
            }
        }
        let level = TopologyDescriptor::new(81, &positions, &faces)
            .unwrap()
            .into_level()
            .unwrap();

        let diagonal: Vec<usize> = (0..8).map(|i| i * 9).collect();
        for selected in [0, 27] {
            let mut refine = [false; 64];
            refine[selected] = true;
            let mut classification = Classification::new(&level, &refine).unwrap();
            classification.propagate(&level).unwrap();
            assert_no_critical_edges(&level, &classification);

            let subdivided: Vec<usize> = classification
                .states()
                .iter()
                .enumerate()
                .filter(|(_, &state)| state == FaceState::Subdivide)
                .map(|(f, _)| f)
                .collect();
            assert_eq!(subdivided, diagonal, "selected {selected}");
        }
    }

    #[test]
    fn test_final_pair_is_never_critical() {
        let level = grid_2x2();
        let mut classification = Classification::new(&level, &[false; 4]).unwrap();
        classification.propagate(&level).unwrap();
        assert!(classification.is_all_final());
        assert_eq!(classification.promotions(), 0);
    }

    #[test]
    fn test_single_neighbor_becomes_y() {
        // 4 5 6 7
        // 0 1 2 3
        let positions: Vec<f32> = (0..8)
            .flat_map(|i| [(i % 4) as f32, (i / 4) as f32, 0.0])
            .collect();
        let level = TopologyDescriptor::new(8, &positions, &[0, 1, 5, 4, 1, 2, 6, 5, 2, 3, 7, 6])
            .unwrap()
            .into_level()
            .unwrap();

        let mut classification = Classification::new(&level, &[true, false, false]).unwrap();
        classification.propagate(&level).unwrap();

        // Face 1 sees the shared edge as its e4. The second side it has to
        // split is its boundary e3, so face 2 is left alone.
        assert_eq!(classification.state(Index(0)), FaceState::Subdivide);
        assert_eq!(classification.state(Index(1)), FaceState::Yv2);
        assert_eq!(classification.state(Index(2)), FaceState::Final);
        assert_eq!(classification.promotions(), 1);
        assert_no_critical_edges(&level, &classification);

        for edge in level.face(Index(2)).unwrap().edges {
            assert!(!classification.is_edge_split(edge));
        }
    }

    #[test]
    fn test_y_faces_propagate_around_a_corner() {
        let level = grid_2x2();
        let mut classification =
            Classification::new(&level, &[true, false, false, false]).unwrap();
        classification.propagate(&level).unwrap();

        // Face 1 sees the shared edge as its e4, face 2 sees it as its e1.
        assert_eq!(classification.state(Index(0)), FaceState::Subdivide);
        assert_eq!(classification.state(Index(1)), FaceState::Yv2);
        assert_eq!(classification.state(Index(2)), FaceState::Yv4);
        // Face 3 is then asked to split its e1 by face 1 and its e4 by face 2.
        // No Y state splits that pair.
        assert_eq!(classification.state(Index(3)), FaceState::Subdivide);
        assert_no_critical_edges(&level, &classification);
    }

    #[test]
    fn test_conflicting_pairs_promote_to_subdivide() {
        let level = grid_2x2();
        let mut classification =
            Classification::new(&level, &[true, false, true, false]).unwrap();
        classification.propagate(&level).unwrap();

        assert_eq!(classification.state(Index(1)), FaceState::Yv2);
        assert_eq!(classification.state(Index(3)), FaceState::Subdivide);
        assert_no_critical_edges(&level, &classification);
    }

    #[test]
    fn test_split_marks_follow_states() {
        let level = grid_2x2();
        let mut classification =
            Classification::new(&level, &[true, false, false, false]).unwrap();
        classification.propagate(&level).unwrap();

        for (f, face) in level.faces().iter().enumerate() {
            let state = classification.state(f.into());
            for (slot, &edge) in face.edges.iter().enumerate() {
                assert_eq!(
                    state.splits(slot),
                    classification.is_edge_split(edge),
                    "face {f} slot {slot}"
                );
            }
        }
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let level = grid_2x2();
        assert!(matches!(
            Classification::new(&level, &[true]),
            Err(Error::InvalidBufferSize { expected: 4, actual: 1 })
        ));
    }
}
