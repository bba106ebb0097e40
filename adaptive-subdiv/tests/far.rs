//! Tests for the far module.

use adaptive_subdiv::far::*;
use adaptive_subdiv::{Error, Index};
use anyhow::Result;
use approx::assert_relative_eq;

const UNIT_QUAD: [f32; 12] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];

/// A `size` x `size` grid of unit quads in the xy plane.
fn grid(size: u32) -> (Vec<f32>, Vec<u32>) {
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
    (positions, faces)
}

fn one_pass() -> AdaptiveRefinementOptions {
    AdaptiveRefinementOptions {
        tolerance: 0.0,
        max_depth: 1,
        ..Default::default()
    }
}

fn position(level: &TopologyLevel, vertex: usize) -> Point {
    level.vertices()[vertex].position
}

#[test]
fn test_topology_descriptor_creation() -> Result<()> {
    let (positions, faces) = grid(2);
    let descriptor = TopologyDescriptor::new(9, &positions, &faces)?;
    assert_eq!(descriptor.face_count(), 4);

    let level = descriptor.into_level()?;
    assert_eq!(level.vertex_count(), 9);
    assert_eq!(level.edge_count(), 12);
    assert_eq!(level.face_count(), 4);
    level.validate()?;
    Ok(())
}

#[test]
fn test_topology_descriptor_with_creases() -> Result<()> {
    let (positions, faces) = grid(2);
    let level = TopologyDescriptor::new(9, &positions, &faces)?
        .creases(&[3, 4, 4, 5], &[0.0, 0.5])
        .corners(&[4])
        .into_level()?;

    let sharp = level.find_edge(Index(3), Index(4)).unwrap();
    let soft = level.find_edge(Index(5), Index(4)).unwrap();
    assert_eq!(level.edges()[sharp.get()].sharpness(), f32::INFINITY);
    assert_relative_eq!(level.edges()[soft.get()].sharpness(), 5.0);
    assert_eq!(level.vertices()[4].kind, VertexType::Corner);
    Ok(())
}

#[test]
fn test_topology_descriptor_rejects_bad_input() {
    assert!(matches!(
        TopologyDescriptor::new(4, &UNIT_QUAD, &[0, 1, 2]),
        Err(Error::InvalidTopology(_))
    ));
    assert!(matches!(
        TopologyDescriptor::new(4, &UNIT_QUAD, &[0, 1, 2, 4]),
        Err(Error::InvalidTopology(_))
    ));
    assert!(matches!(
        TopologyDescriptor::new(5, &UNIT_QUAD, &[0, 1, 2, 3]),
        Err(Error::InvalidBufferSize {
            expected: 15,
            actual: 12
        })
    ));
}

#[test]
fn test_topology_refiner_options_default() {
    let options = AdaptiveRefinementOptions::default();
    assert_eq!(options.tolerance, 0.01);
    assert_eq!(options.max_depth, 4);
    assert!(!options.track_edge_lineage);
}

#[test]
fn test_topology_refiner_rejects_bad_options() -> Result<()> {
    let level = TopologyDescriptor::new(4, &UNIT_QUAD, &[0, 1, 2, 3])?.into_level()?;
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
            TopologyRefiner::new(level.clone(), options),
            Err(Error::InvalidArgument(_))
        ));
    }
    Ok(())
}

#[test]
fn test_scenario_single_smooth_quad() -> Result<()> {
    let control = TopologyDescriptor::new(4, &UNIT_QUAD, &[0, 1, 2, 3])?.into_level()?;
    let mut refiner = TopologyRefiner::new(control, one_pass())?;
    refiner.refine_adaptive(&[])?;

    assert_eq!(refiner.passes().len(), 1);
    let level = refiner.level();
    assert_eq!(level.vertex_count(), 9);
    assert_eq!(level.edge_count(), 12);
    assert_eq!(level.face_count(), 4);
    assert!(level.vertices().iter().all(|v| v.position.z == 0.0));

    let record = &refiner.passes()[0];
    let center = record
        .vertex_origins()
        .iter()
        .position(|origin| *origin == VertexOrigin::FaceCenter(Index(0)))
        .unwrap();
    assert_relative_eq!(position(level, center).x, 0.5, epsilon = 1e-6);
    assert_relative_eq!(position(level, center).y, 0.5, epsilon = 1e-6);
    assert_eq!(position(level, center).z, 0.0);
    Ok(())
}

#[test]
fn test_scenario_quad_with_sharp_edge() -> Result<()> {
    let control = TopologyDescriptor::new(4, &UNIT_QUAD, &[0, 1, 2, 3])?
        .creases(&[0, 1], &[0.0])
        .into_level()?;
    let opposite = control.find_edge(Index(2), Index(3)).unwrap();

    let mut refiner = TopologyRefiner::new(control, one_pass())?;
    refiner.refine_adaptive(&[])?;
    let level = refiner.level();

    // The end points of the sharp edge stay exactly where they were.
    assert_eq!(position(level, 0), Point::new(0.0, 0.0, 0.0));
    assert_eq!(position(level, 1), Point::new(1.0, 0.0, 0.0));

    let midpoint = refiner.passes()[0]
        .vertex_origins()
        .iter()
        .position(|origin| *origin == VertexOrigin::EdgeMidpoint(opposite))
        .unwrap();
    assert_relative_eq!(position(level, midpoint).x, 0.5, epsilon = 1e-6);
    assert_relative_eq!(position(level, midpoint).y, 1.0, epsilon = 1e-6);
    assert_relative_eq!(position(level, midpoint).z, 0.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_scenario_neighbor_of_refined_face_becomes_y() -> Result<()> {
    let positions = [
        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 2.0, 1.0, 0.0,
    ];
    let level = TopologyDescriptor::new(6, &positions, &[0, 1, 4, 3, 1, 2, 5, 4])?.into_level()?;
    let shared = level.find_edge(Index(1), Index(4)).unwrap();

    let mut classification = Classification::new(&level, &[true, false])?;
    assert!(classification.is_critical(&level, shared)?);

    classification.propagate(&level)?;
    assert!(matches!(
        classification.state(Index(1)),
        FaceState::Yv2 | FaceState::Yv4
    ));
    assert!(!classification.is_critical(&level, shared)?);

    // Both sides of the shared edge use its midpoint.
    let pass = RefinementPass::build(&level, &classification)?;
    pass.level().validate()?;
    let midpoint = pass.midpoint(shared).unwrap();
    for parent in [Index(0), Index(1)] {
        assert!(pass
            .children(parent)
            .any(|child| pass.level().faces()[child].vertices.contains(&midpoint)));
    }
    assert!(!pass.level().is_vertex_boundary(midpoint)?);
    Ok(())
}

#[test]
fn test_selected_face_refines_locally() -> Result<()> {
    let (positions, faces) = grid(3);
    let control = TopologyDescriptor::new(16, &positions, &faces)?.into_level()?;
    let mut refiner = TopologyRefiner::new(control, one_pass())?;
    refiner.refine_adaptive(&[Index(4)])?;

    let record = &refiner.passes()[0];
    assert_eq!(record.states()[4], FaceState::Subdivide);
    assert!(record.count(FaceState::Final) < 9);
    assert_eq!(record.input_face_count(), 9);
    assert_eq!(
        record.output_face_count(),
        record
            .states()
            .iter()
            .map(|state| state.child_count())
            .sum::<usize>()
    );
    refiner.level().validate()?;
    Ok(())
}

#[test]
fn test_refinement_is_restartable() -> Result<()> {
    let (positions, faces) = grid(2);
    let control = TopologyDescriptor::new(9, &positions, &faces)?.into_level()?;
    let mut refiner = TopologyRefiner::new(control, one_pass())?;

    refiner.refine_adaptive(&[Index(0)])?;
    let first = refiner.level().face_count();
    refiner.refine_adaptive(&[Index(0)])?;
    assert_eq!(refiner.level().face_count(), first);

    refiner.unrefine();
    assert_eq!(refiner.refinement_levels(), 1);
    assert_eq!(refiner.level().face_count(), 4);
    Ok(())
}

#[test]
fn test_primvars_follow_geometry() -> Result<()> {
    let (mut positions, faces) = grid(2);
    // Lift the center vertex so the second pass has something to do.
    positions[3 * 4 + 2] = 1.0;
    let control = TopologyDescriptor::new(9, &positions, &faces)?.into_level()?;
    let mut refiner = TopologyRefiner::new(
        control,
        AdaptiveRefinementOptions {
            tolerance: 0.0,
            max_depth: 2,
            ..Default::default()
        },
    )?;
    refiner.refine_adaptive(&[])?;
    assert_eq!(refiner.passes().len(), 2);

    let primvars = PrimvarRefiner::new(&refiner);
    let refined = primvars.interpolate_all(3, &positions)?;
    for (value, vertex) in refined.chunks_exact(3).zip(refiner.level().vertices()) {
        assert_relative_eq!(value[0], vertex.position.x, epsilon = 1e-5);
        assert_relative_eq!(value[1], vertex.position.y, epsilon = 1e-5);
        assert_relative_eq!(value[2], vertex.position.z, epsilon = 1e-5);
    }

    let ids: Vec<f32> = (0..4).map(|f| f as f32).collect();
    let refined_ids = primvars.interpolate_face_uniform_all(1, &ids)?;
    let base_faces = primvars.base_faces();
    assert_eq!(refined_ids.len(), refiner.level().face_count());
    for (id, base) in refined_ids.iter().zip(base_faces) {
        assert_eq!(*id as usize, base.get());
    }
    Ok(())
}
