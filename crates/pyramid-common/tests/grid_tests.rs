//! Comprehensive tests for GridSpec pyramid-level arithmetic.

use pyramid_common::grid::{GridError, GridSpec};

// ============================================================================
// Construction from coordinates
// ============================================================================

#[test]
fn test_from_coords_quarter_degree() {
    let xs: Vec<f64> = (0..1440).map(|i| 0.125 + i as f64 * 0.25).collect();
    let ys: Vec<f64> = (0..720).map(|j| 89.875 - j as f64 * 0.25).collect();

    let grid = GridSpec::from_coords(&xs, &ys).unwrap();
    assert_eq!(grid.nx, 1440);
    assert_eq!(grid.ny, 720);
    assert!((grid.dx - 0.25).abs() < 1e-9);
    assert!((grid.dy + 0.25).abs() < 1e-9);
}

#[test]
fn test_from_coords_ascending_latitude() {
    // Some models store latitude south to north; spacing comes out positive.
    let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let ys: Vec<f64> = (0..10).map(|j| -4.5 + j as f64).collect();

    let grid = GridSpec::from_coords(&xs, &ys).unwrap();
    assert!(grid.dy > 0.0);
    assert!((grid.first_y + 4.5).abs() < 1e-9);
}

#[test]
fn test_from_coords_single_point_rejected() {
    let result = GridSpec::from_coords(&[0.0], &[0.0, 1.0]);
    assert!(matches!(result, Err(GridError::TooFewPoints { .. })));
}

#[test]
fn test_from_coords_irregular_rejected() {
    let xs = vec![0.0, 1.0, 2.0, 4.0];
    let ys = vec![0.0, 1.0];
    assert!(matches!(
        GridSpec::from_coords(&xs, &ys),
        Err(GridError::Irregular(_))
    ));
}

// ============================================================================
// Coarsening
// ============================================================================

#[test]
fn test_coarsen_spacing_scales_exactly() {
    let grid = GridSpec::new(1440, 720, 0.25, -0.25, 0.125, 89.875);

    for level in 1..=3usize {
        let factor = 1usize << level;
        let coarse = grid.coarsen(factor).unwrap();
        let (rx, ry) = coarse.resolution();
        assert!((rx - 0.25 * factor as f64).abs() < 1e-12);
        assert!((ry - 0.25 * factor as f64).abs() < 1e-12);
        assert_eq!(coarse.nx, 1440 / factor);
        assert_eq!(coarse.ny, 720 / factor);
    }
}

#[test]
fn test_coarsen_preserves_extent_center() {
    let grid = GridSpec::new(100, 100, 1.0, -1.0, 0.5, 99.5);
    let coarse = grid.coarsen(2).unwrap();

    let fine_center = grid.bbox().center();
    let coarse_center = coarse.bbox().center();

    assert!((fine_center.0 - coarse_center.0).abs() < 1e-9);
    assert!((fine_center.1 - coarse_center.1).abs() < 1e-9);
}

#[test]
fn test_coarsen_zero_factor() {
    let grid = GridSpec::new(8, 8, 1.0, 1.0, 0.0, 0.0);
    assert!(matches!(grid.coarsen(0), Err(GridError::InvalidFactor(0))));
}

#[test]
fn test_coarsen_degenerate_rejected() {
    let grid = GridSpec::new(3, 3, 1.0, 1.0, 0.0, 0.0);
    assert!(matches!(grid.coarsen(2), Err(GridError::Degenerate { .. })));
}

// ============================================================================
// Coordinate arrays
// ============================================================================

#[test]
fn test_coordinate_arrays_match_spec() {
    let grid = GridSpec::new(4, 3, 0.5, -0.5, 10.0, 20.0);

    let xs = grid.xs();
    let ys = grid.ys();

    assert_eq!(xs, vec![10.0, 10.5, 11.0, 11.5]);
    assert_eq!(ys, vec![20.0, 19.5, 19.0]);
}

#[test]
fn test_coords_roundtrip_through_from_coords() {
    let grid = GridSpec::new(64, 32, 0.25, -0.25, 0.125, 89.875);
    let rebuilt = GridSpec::from_coords(&grid.xs(), &grid.ys()).unwrap();

    assert_eq!(rebuilt.nx, grid.nx);
    assert_eq!(rebuilt.ny, grid.ny);
    assert!((rebuilt.dx - grid.dx).abs() < 1e-12);
    assert!((rebuilt.first_y - grid.first_y).abs() < 1e-12);
}
