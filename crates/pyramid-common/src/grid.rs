//! Regular-grid specifications and pyramid-level arithmetic.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// Relative tolerance when checking that coordinate spacing is regular.
const SPACING_TOLERANCE: f64 = 1e-6;

/// Specification of a regular 2-D grid.
///
/// `dx`/`dy` are signed: `dy` is negative for grids stored north to south
/// (the common convention for global model output). Coordinates refer to
/// cell centers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of points in X (longitude/easting) direction
    pub nx: usize,
    /// Number of points in Y (latitude/northing) direction
    pub ny: usize,
    /// Grid spacing in X direction (signed)
    pub dx: f64,
    /// Grid spacing in Y direction (signed)
    pub dy: f64,
    /// First grid point X coordinate
    pub first_x: f64,
    /// First grid point Y coordinate
    pub first_y: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64, first_x: f64, first_y: f64) -> Self {
        Self {
            nx,
            ny,
            dx,
            dy,
            first_x,
            first_y,
        }
    }

    /// Infer a grid from 1-D cell-center coordinate arrays.
    ///
    /// The spacing must be regular within a small relative tolerance.
    pub fn from_coords(xs: &[f64], ys: &[f64]) -> Result<Self, GridError> {
        let (dx, first_x) = infer_spacing(xs, "x")?;
        let (dy, first_y) = infer_spacing(ys, "y")?;

        Ok(Self {
            nx: xs.len(),
            ny: ys.len(),
            dx,
            dy,
            first_x,
            first_y,
        })
    }

    /// Absolute grid resolution `(|dx|, |dy|)`.
    pub fn resolution(&self) -> (f64, f64) {
        (self.dx.abs(), self.dy.abs())
    }

    /// X coordinate of column `i`.
    pub fn x_at(&self, i: usize) -> f64 {
        self.first_x + i as f64 * self.dx
    }

    /// Y coordinate of row `j`.
    pub fn y_at(&self, j: usize) -> f64 {
        self.first_y + j as f64 * self.dy
    }

    /// Fractional column index of an X coordinate.
    pub fn x_index(&self, x: f64) -> f64 {
        (x - self.first_x) / self.dx
    }

    /// Fractional row index of a Y coordinate.
    pub fn y_index(&self, y: f64) -> f64 {
        (y - self.first_y) / self.dy
    }

    /// Full X coordinate array (cell centers).
    pub fn xs(&self) -> Vec<f64> {
        (0..self.nx).map(|i| self.x_at(i)).collect()
    }

    /// Full Y coordinate array (cell centers).
    pub fn ys(&self) -> Vec<f64> {
        (0..self.ny).map(|j| self.y_at(j)).collect()
    }

    /// Bounding box of the grid's cell centers.
    pub fn bbox(&self) -> BoundingBox {
        let last_x = self.x_at(self.nx.saturating_sub(1));
        let last_y = self.y_at(self.ny.saturating_sub(1));

        BoundingBox {
            min_x: self.first_x.min(last_x),
            min_y: self.first_y.min(last_y),
            max_x: self.first_x.max(last_x),
            max_y: self.first_y.max(last_y),
        }
    }

    /// Derive a coarser grid covering the same extent.
    ///
    /// Each coarse cell aggregates a `factor` x `factor` block of fine
    /// cells; the coarse cell center sits at the block center, so spacing
    /// scales by exactly `factor`. Fails when the result would be
    /// degenerate (fewer than 2 points along either axis).
    pub fn coarsen(&self, factor: usize) -> Result<GridSpec, GridError> {
        if factor == 0 {
            return Err(GridError::InvalidFactor(factor));
        }

        let nx = self.nx / factor;
        let ny = self.ny / factor;

        if nx < 2 || ny < 2 {
            return Err(GridError::Degenerate {
                nx,
                ny,
                factor,
            });
        }

        Ok(GridSpec {
            nx,
            ny,
            dx: self.dx * factor as f64,
            dy: self.dy * factor as f64,
            first_x: self.first_x + self.dx * (factor as f64 - 1.0) / 2.0,
            first_y: self.first_y + self.dy * (factor as f64 - 1.0) / 2.0,
        })
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    /// Check if the grid is empty.
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }
}

/// Infer (spacing, origin) from a 1-D coordinate array, checking regularity.
fn infer_spacing(coords: &[f64], axis: &str) -> Result<(f64, f64), GridError> {
    if coords.len() < 2 {
        return Err(GridError::TooFewPoints {
            axis: axis.to_string(),
            len: coords.len(),
        });
    }

    let spacing = coords[1] - coords[0];
    if spacing == 0.0 {
        return Err(GridError::Irregular(axis.to_string()));
    }

    for window in coords.windows(2) {
        let step = window[1] - window[0];
        if ((step - spacing) / spacing).abs() > SPACING_TOLERANCE {
            return Err(GridError::Irregular(axis.to_string()));
        }
    }

    Ok((spacing, coords[0]))
}

/// Errors arising from grid arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("coordinate axis '{axis}' has too few points ({len}) to form a grid")]
    TooFewPoints { axis: String, len: usize },

    #[error("coordinate axis '{0}' is not regularly spaced")]
    Irregular(String),

    #[error("coarsening by {factor} produces a degenerate {nx}x{ny} grid")]
    Degenerate {
        nx: usize,
        ny: usize,
        factor: usize,
    },

    #[error("invalid coarsening factor: {0}")]
    InvalidFactor(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_coords() {
        let xs: Vec<f64> = (0..360).map(|i| 0.5 + i as f64).collect();
        let ys: Vec<f64> = (0..180).map(|j| 89.5 - j as f64).collect();

        let grid = GridSpec::from_coords(&xs, &ys).unwrap();
        assert_eq!(grid.nx, 360);
        assert_eq!(grid.ny, 180);
        assert!((grid.dx - 1.0).abs() < 1e-9);
        assert!((grid.dy + 1.0).abs() < 1e-9);
        assert!((grid.first_y - 89.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_coords_irregular() {
        let xs = vec![0.0, 1.0, 2.5];
        let ys = vec![0.0, 1.0];
        assert!(matches!(
            GridSpec::from_coords(&xs, &ys),
            Err(GridError::Irregular(_))
        ));
    }

    #[test]
    fn test_coarsen_doubles_spacing() {
        let grid = GridSpec::new(360, 180, 1.0, -1.0, 0.5, 89.5);
        let coarse = grid.coarsen(2).unwrap();

        assert_eq!(coarse.nx, 180);
        assert_eq!(coarse.ny, 90);
        assert!((coarse.dx - 2.0).abs() < 1e-9);
        assert!((coarse.dy + 2.0).abs() < 1e-9);
        // Coarse cell center is the mean of the two fine centers
        assert!((coarse.first_x - 1.0).abs() < 1e-9);
        assert!((coarse.first_y - 89.0).abs() < 1e-9);
    }

    #[test]
    fn test_coarsen_power_of_two_spacing() {
        let grid = GridSpec::new(256, 128, 0.25, -0.25, 0.0, 90.0);
        for level in 0..4usize {
            let factor = 1 << level;
            let coarse = if factor == 1 {
                grid
            } else {
                grid.coarsen(factor).unwrap()
            };
            let (rx, _) = coarse.resolution();
            assert!((rx - 0.25 * factor as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_coarsen_degenerate() {
        let grid = GridSpec::new(4, 4, 1.0, 1.0, 0.0, 0.0);
        assert!(matches!(
            grid.coarsen(4),
            Err(GridError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_bbox() {
        let grid = GridSpec::new(10, 5, 1.0, -1.0, 0.0, 4.0);
        let bbox = grid.bbox();
        assert!((bbox.min_x - 0.0).abs() < 1e-9);
        assert!((bbox.max_x - 9.0).abs() < 1e-9);
        assert!((bbox.min_y - 0.0).abs() < 1e-9);
        assert!((bbox.max_y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_index_coord_roundtrip() {
        let grid = GridSpec::new(100, 50, 0.5, -0.5, 10.0, 60.0);
        let x = grid.x_at(17);
        assert!((grid.x_index(x) - 17.0).abs() < 1e-9);
        let y = grid.y_at(33);
        assert!((grid.y_index(y) - 33.0).abs() < 1e-9);
    }
}
