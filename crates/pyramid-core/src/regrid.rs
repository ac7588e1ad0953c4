//! Interpolation kernels and grid-to-grid regridding.
//!
//! Regridding is a pure function of (source grid, target grid, method):
//! identical inputs produce identical outputs regardless of how the caller
//! schedules the work.

use pyramid_common::GridSpec;
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, Result};

/// Interpolation method for regridding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values).
    Nearest,
    /// Bilinear interpolation (smooth, slight value changes).
    #[default]
    Bilinear,
    /// Bicubic interpolation (smoothest, more compute).
    Cubic,
}

impl InterpolationMethod {
    /// Parse from string (case-insensitive; unknown values fall back to
    /// bilinear).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" => Self::Nearest,
            "cubic" | "bicubic" => Self::Cubic,
            _ => Self::Bilinear,
        }
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Nearest neighbor interpolation at fractional index (x, y).
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let col = x.round() as isize;
    let row = y.round() as isize;

    if col < 0 || row < 0 || col >= width as isize || row >= height as isize {
        return f32::NAN;
    }

    data[row as usize * width + col as usize]
}

/// Bilinear interpolation at fractional index (x, y).
///
/// Returns NaN when any of the four surrounding points is NaN.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 {
        return f32::NAN;
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;

    if x0 >= width || y0 >= height {
        return f32::NAN;
    }

    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic interpolation using a 4x4 neighborhood.
///
/// Falls back to bilinear when any neighborhood point is NaN.
pub fn cubic_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return f32::NAN;
    }

    let xi = x.floor() as i32;
    let yi = y.floor() as i32;

    let xf = (x - xi as f64) as f32;
    let yf = (y - yi as f64) as f32;

    let mut values = [[0.0f32; 4]; 4];

    for j in 0..4i32 {
        for i in 0..4i32 {
            let px = (xi + i - 1).clamp(0, width as i32 - 1) as usize;
            let py = (yi + j - 1).clamp(0, height as i32 - 1) as usize;
            values[j as usize][i as usize] = data[py * width + px];

            if values[j as usize][i as usize].is_nan() {
                return bilinear_interpolate(data, width, height, x, y);
            }
        }
    }

    let mut row_values = [0.0f32; 4];
    for j in 0..4 {
        row_values[j] = cubic_1d(values[j][0], values[j][1], values[j][2], values[j][3], xf);
    }

    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D cubic interpolation using a Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

/// Regrid one 2-D field from `src` onto `dst`.
///
/// Each target cell center is mapped into fractional source index space
/// through the grid coordinate transforms, then sampled with `method`.
/// Source data is row-major `[src.ny, src.nx]`; the result is row-major
/// `[dst.ny, dst.nx]`.
pub fn regrid_field(
    data: &[f32],
    src: &GridSpec,
    dst: &GridSpec,
    method: InterpolationMethod,
) -> Result<Vec<f32>> {
    if data.len() != src.len() {
        return Err(PyramidError::invalid_metadata(format!(
            "field has {} values but source grid is {}x{}",
            data.len(),
            src.nx,
            src.ny
        )));
    }

    if dst.nx < 2 || dst.ny < 2 {
        return Err(PyramidError::regrid_failure(
            0,
            format!("degenerate target grid {}x{}", dst.nx, dst.ny),
        ));
    }

    let mut output = vec![f32::NAN; dst.len()];

    for j in 0..dst.ny {
        let sy = src.y_index(dst.y_at(j));
        for i in 0..dst.nx {
            let sx = src.x_index(dst.x_at(i));

            let value = match method {
                InterpolationMethod::Nearest => {
                    nearest_interpolate(data, src.nx, src.ny, sx, sy)
                }
                InterpolationMethod::Bilinear => {
                    bilinear_interpolate(data, src.nx, src.ny, sx, sy)
                }
                InterpolationMethod::Cubic => cubic_interpolate(data, src.nx, src.ny, sx, sy),
            };

            output[j * dst.nx + i] = value;
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0, //
            4.0, 5.0, 6.0, //
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.0, 0.0), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 1.0, 1.0), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6), 5.0);
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0, //
            3.0, 4.0,
        ];

        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 0.0), 1.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 0.0), 2.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 1.0), 3.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0), 4.0);

        let center = bilinear_interpolate(&data, 2, 2, 0.5, 0.5);
        assert!((center - 2.5).abs() < 0.001);
    }

    #[test]
    fn test_bilinear_with_nan() {
        let data: Vec<f32> = vec![
            1.0,
            f32::NAN, //
            3.0,
            4.0,
        ];

        let result = bilinear_interpolate(&data, 2, 2, 0.5, 0.5);
        assert!(result.is_nan());
    }

    #[test]
    fn test_regrid_half_resolution_of_linear_field() {
        // A field linear in x is reproduced exactly by bilinear sampling.
        let src = GridSpec::new(8, 8, 1.0, -1.0, 0.5, 7.5);
        let data: Vec<f32> = (0..64).map(|idx| (idx % 8) as f32).collect();

        let dst = src.coarsen(2).unwrap();
        let out = regrid_field(&data, &src, &dst, InterpolationMethod::Bilinear).unwrap();

        assert_eq!(out.len(), 16);
        for j in 0..dst.ny {
            for i in 0..dst.nx {
                // Coarse cell center sits between fine columns 2i and 2i+1
                let expected = 2.0 * i as f32 + 0.5;
                let actual = out[j * dst.nx + i];
                assert!(
                    (actual - expected).abs() < 1e-4,
                    "({}, {}): expected {}, got {}",
                    i,
                    j,
                    expected,
                    actual
                );
            }
        }
    }

    #[test]
    fn test_regrid_deterministic() {
        let src = GridSpec::new(16, 16, 0.5, -0.5, 0.25, 7.75);
        let data: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
        let dst = src.coarsen(2).unwrap();

        let a = regrid_field(&data, &src, &dst, InterpolationMethod::Bilinear).unwrap();
        let b = regrid_field(&data, &src, &dst, InterpolationMethod::Bilinear).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_regrid_rejects_degenerate_target() {
        let src = GridSpec::new(8, 8, 1.0, 1.0, 0.0, 0.0);
        let dst = GridSpec::new(1, 8, 8.0, 1.0, 3.5, 0.0);
        let data = vec![0.0f32; 64];

        assert!(matches!(
            regrid_field(&data, &src, &dst, InterpolationMethod::Bilinear),
            Err(PyramidError::RegridFailure { .. })
        ));
    }

    #[test]
    fn test_regrid_rejects_mismatched_field() {
        let src = GridSpec::new(8, 8, 1.0, 1.0, 0.0, 0.0);
        let dst = src.coarsen(2).unwrap();
        let data = vec![0.0f32; 10];

        assert!(matches!(
            regrid_field(&data, &src, &dst, InterpolationMethod::Bilinear),
            Err(PyramidError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            InterpolationMethod::from_str("nearest"),
            InterpolationMethod::Nearest
        );
        assert_eq!(
            InterpolationMethod::from_str("BILINEAR"),
            InterpolationMethod::Bilinear
        );
        assert_eq!(
            InterpolationMethod::from_str("bicubic"),
            InterpolationMethod::Cubic
        );
        assert_eq!(
            InterpolationMethod::from_str("invalid"),
            InterpolationMethod::Bilinear
        );
    }
}
