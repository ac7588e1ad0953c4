//! Multi-resolution pyramid planning and materialization.
//!
//! `PyramidPlan` describes the build (level grids, variables, shapes)
//! without touching any data; `materialize` executes it. Levels are
//! independent computations, so the `parallel` knob only changes
//! scheduling, never output values.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use pyramid_common::{CrsCode, GridSpec};

use crate::error::{PyramidError, Result};
use crate::regrid::{regrid_field, InterpolationMethod};
use crate::source::SourceDataset;

/// Options for a pyramid build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Number of levels to produce (level 0 finest).
    pub levels: usize,
    /// Interpolation method used for every level.
    pub method: InterpolationMethod,
    /// Fan levels out over a thread pool. Purely a performance knob.
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            levels: 2,
            method: InterpolationMethod::Bilinear,
            parallel: false,
        }
    }
}

/// One planned level: the target grid and its scale factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelPlan {
    /// Level index, 0 = finest.
    pub index: usize,
    /// Coarsening factor relative to level 0 (1, 2, 4, ...).
    pub scale: usize,
    /// Target grid for this level.
    pub grid: GridSpec,
}

/// Dimension names shared by all pyramid levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidDims {
    pub x: String,
    pub y: String,
    pub time: Option<String>,
}

/// An inspectable description of a pyramid build. No data is read until
/// [`materialize`](Self::materialize).
#[derive(Debug, Clone)]
pub struct PyramidPlan {
    pub levels: Vec<LevelPlan>,
    pub variables: Vec<String>,
    pub dims: PyramidDims,
    /// Steps along the (selected) time dimension; `None` for time-free
    /// datasets.
    pub time_steps: Option<u64>,
    pub method: InterpolationMethod,
    pub parallel: bool,
    pub crs: CrsCode,
}

impl PyramidPlan {
    /// Plan a pyramid build against a dataset.
    ///
    /// Validates up front everything that can fail without reading data:
    /// the CRS must be attached, the spatial grid must be regular, every
    /// level's target grid must be non-degenerate, and variable dimensions
    /// must end with the (y, x) pair.
    pub fn new(ds: &SourceDataset, opts: &BuildOptions) -> Result<Self> {
        if opts.levels == 0 {
            return Err(PyramidError::regrid_failure(
                0,
                "pyramid must have at least one level",
            ));
        }

        let crs = ds.crs().ok_or(PyramidError::MissingCrs)?;

        let (x_dim, y_dim) = ds.spatial_dims().ok_or_else(|| {
            PyramidError::missing_spatial_dims("dataset has no x/y dimension pair")
        })?;
        let x_dim = x_dim.to_string();
        let y_dim = y_dim.to_string();
        let time_dim = ds.time_dim().map(|d| d.to_string());

        let base_grid = ds.grid()?;

        let mut levels = Vec::with_capacity(opts.levels);
        for index in 0..opts.levels {
            let scale = 1usize << index;
            let grid = if scale == 1 {
                base_grid
            } else {
                base_grid.coarsen(scale).map_err(|e| {
                    PyramidError::regrid_failure(index, e.to_string())
                })?
            };
            levels.push(LevelPlan { index, scale, grid });
        }

        let mut variables = Vec::new();
        for (name, variable) in ds.variables() {
            let dims = &variable.dims;
            let spatial_ok = dims.len() >= 2
                && dims[dims.len() - 2] == y_dim
                && dims[dims.len() - 1] == x_dim;
            let leading_ok = dims[..dims.len().saturating_sub(2)]
                .iter()
                .all(|d| Some(d) == time_dim.as_ref());

            if !spatial_ok || !leading_ok {
                // Auxiliary variables (bounds arrays and the like) have no
                // spatial footprint to regrid; they are left out of the
                // pyramid.
                tracing::warn!(variable = %name, dims = ?dims, "Skipping non-spatial variable");
                continue;
            }
            variables.push(name.clone());
        }

        if variables.is_empty() {
            return Err(PyramidError::invalid_metadata(
                "dataset has no variables on the spatial grid",
            ));
        }

        let time_steps = time_dim.as_ref().map(|d| ds.selected_len(d));

        tracing::debug!(
            levels = levels.len(),
            variables = ?variables,
            time_steps = ?time_steps,
            "Planned pyramid"
        );

        Ok(Self {
            levels,
            variables,
            dims: PyramidDims {
                x: x_dim,
                y: y_dim,
                time: time_dim,
            },
            time_steps,
            method: opts.method,
            parallel: opts.parallel,
            crs,
        })
    }

    /// Output shape of a variable at a level: `[time?, ny, nx]`.
    pub fn level_shape(&self, index: usize) -> Option<Vec<u64>> {
        let level = self.levels.get(index)?;
        let mut shape = Vec::with_capacity(3);
        if let Some(t) = self.time_steps {
            shape.push(t);
        }
        shape.push(level.grid.ny as u64);
        shape.push(level.grid.nx as u64);
        Some(shape)
    }

    /// Execute the plan, reading source data and regridding every level.
    ///
    /// Fails atomically: any level failure fails the whole build and no
    /// partial pyramid is returned.
    pub fn materialize(&self, ds: &SourceDataset) -> Result<Pyramid> {
        let base_grid = self.levels[0].grid;

        let levels: Vec<PyramidLevel> = if self.parallel {
            self.levels
                .par_iter()
                .map(|level| self.build_level(ds, &base_grid, level))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.levels
                .iter()
                .map(|level| self.build_level(ds, &base_grid, level))
                .collect::<Result<Vec<_>>>()?
        };

        let time = match &self.dims.time {
            Some(dim) => {
                let values = ds.coord_values(dim).ok_or_else(|| {
                    PyramidError::invalid_metadata(format!(
                        "time dimension '{}' has no coordinate values",
                        dim
                    ))
                })?;
                let attrs = ds
                    .coords()
                    .get(dim)
                    .map(|c| c.attrs.clone())
                    .unwrap_or_default();
                Some(TimeAxis { values, attrs })
            }
            None => None,
        };

        let coord_attrs = |dim: &str| {
            ds.coords()
                .get(dim)
                .map(|c| c.attrs.clone())
                .unwrap_or_default()
        };

        let variable_attrs = self
            .variables
            .iter()
            .map(|name| {
                let attrs = ds
                    .variables()
                    .get(name)
                    .map(|v| v.attrs.clone())
                    .unwrap_or_default();
                (name.clone(), attrs)
            })
            .collect();

        tracing::info!(
            levels = levels.len(),
            variables = self.variables.len(),
            "Materialized pyramid"
        );

        Ok(Pyramid {
            levels,
            dims: self.dims.clone(),
            time,
            x_attrs: coord_attrs(&self.dims.x),
            y_attrs: coord_attrs(&self.dims.y),
            variable_attrs,
            crs: self.crs,
            method: self.method,
        })
    }

    /// Build one level: read each variable field and regrid it onto the
    /// level's target grid.
    fn build_level(
        &self,
        ds: &SourceDataset,
        base_grid: &GridSpec,
        level: &LevelPlan,
    ) -> Result<PyramidLevel> {
        let mut variables = BTreeMap::new();

        for name in &self.variables {
            let source_variable = ds.variables().get(name).ok_or_else(|| {
                PyramidError::invalid_metadata(format!("unknown variable: {}", name))
            })?;
            let has_time = self
                .dims
                .time
                .as_ref()
                .map(|t| source_variable.dims.contains(t))
                .unwrap_or(false);

            let steps = if has_time {
                self.time_steps.unwrap_or(1)
            } else {
                1
            };

            let mut data = Vec::with_capacity(steps as usize * level.grid.len());
            for step in 0..steps {
                let field = ds.read_field(name, step)?;

                if level.scale == 1 {
                    // Level 0 target grid equals the source grid; copy the
                    // field rather than resampling it onto itself.
                    data.extend_from_slice(&field);
                } else {
                    let regridded = regrid_field(&field, base_grid, &level.grid, self.method)
                        .map_err(|e| match e {
                            PyramidError::RegridFailure { reason, .. } => {
                                PyramidError::regrid_failure(level.index, reason)
                            }
                            other => other,
                        })?;
                    data.extend(regridded);
                }
            }

            variables.insert(
                name.clone(),
                LevelVariable {
                    dims: source_variable.dims.clone(),
                    time_steps: has_time.then_some(steps),
                    data,
                },
            );
        }

        tracing::debug!(
            level = level.index,
            nx = level.grid.nx,
            ny = level.grid.ny,
            "Built pyramid level"
        );

        Ok(PyramidLevel {
            index: level.index,
            scale: level.scale,
            grid: level.grid,
            variables,
        })
    }
}

/// The time coordinate carried across all levels.
#[derive(Debug, Clone)]
pub struct TimeAxis {
    pub values: Vec<f64>,
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

/// A materialized variable at one level, row-major `[time?, y, x]`.
#[derive(Debug, Clone)]
pub struct LevelVariable {
    pub dims: Vec<String>,
    pub time_steps: Option<u64>,
    pub data: Vec<f32>,
}

impl LevelVariable {
    /// Shape of this variable given its level grid.
    pub fn shape(&self, grid: &GridSpec) -> Vec<u64> {
        let mut shape = Vec::with_capacity(3);
        if let Some(t) = self.time_steps {
            shape.push(t);
        }
        shape.push(grid.ny as u64);
        shape.push(grid.nx as u64);
        shape
    }
}

/// One materialized pyramid level.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub index: usize,
    pub scale: usize,
    pub grid: GridSpec,
    pub variables: BTreeMap<String, LevelVariable>,
}

/// A materialized multi-resolution pyramid, level 0 finest.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<PyramidLevel>,
    pub dims: PyramidDims,
    pub time: Option<TimeAxis>,
    pub x_attrs: serde_json::Map<String, serde_json::Value>,
    pub y_attrs: serde_json::Map<String, serde_json::Value>,
    pub variable_attrs: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
    pub crs: CrsCode,
    pub method: InterpolationMethod,
}

impl Pyramid {
    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Check if the pyramid has no levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Plan and materialize in one call.
pub fn build_pyramid(ds: &SourceDataset, opts: &BuildOptions) -> Result<Pyramid> {
    PyramidPlan::new(ds, opts)?.materialize(ds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = BuildOptions::default();
        assert_eq!(opts.levels, 2);
        assert_eq!(opts.method, InterpolationMethod::Bilinear);
        assert!(!opts.parallel);
    }

    #[test]
    fn test_level_shape_composition() {
        let grid = GridSpec::new(16, 8, 1.0, -1.0, 0.5, 7.5);
        let plan = PyramidPlan {
            levels: vec![
                LevelPlan {
                    index: 0,
                    scale: 1,
                    grid,
                },
                LevelPlan {
                    index: 1,
                    scale: 2,
                    grid: grid.coarsen(2).unwrap(),
                },
            ],
            variables: vec!["pr".to_string()],
            dims: PyramidDims {
                x: "lon".to_string(),
                y: "lat".to_string(),
                time: Some("time".to_string()),
            },
            time_steps: Some(10),
            method: InterpolationMethod::Bilinear,
            parallel: false,
            crs: CrsCode::Epsg4326,
        };

        assert_eq!(plan.level_shape(0), Some(vec![10, 8, 16]));
        assert_eq!(plan.level_shape(1), Some(vec![10, 4, 8]));
        assert_eq!(plan.level_shape(2), None);
    }
}
