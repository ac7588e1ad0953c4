//! Synthetic source-store generation for tests.
//!
//! Writes a small, self-consistent Zarr V3 dataset (time/lat/lon
//! coordinates plus one float32 variable) whose values follow a known
//! formula, so tests can predict regridded output exactly.

use std::path::Path;
use std::sync::Arc;

use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use pyramid_common::GridSpec;

use crate::error::{PyramidError, Result};

/// Shape and naming of a synthetic source dataset.
#[derive(Debug, Clone)]
pub struct SyntheticSourceSpec {
    /// Spatial grid (cell centers).
    pub grid: GridSpec,
    /// Number of time steps.
    pub time_steps: usize,
    /// Data variable name.
    pub variable: String,
    /// Spatial chunk edge for the variable array.
    pub chunk_size: usize,
}

impl Default for SyntheticSourceSpec {
    fn default() -> Self {
        Self {
            grid: GridSpec::new(16, 8, 1.0, -1.0, 0.5, 7.5),
            time_steps: 3,
            variable: "pr".to_string(),
            chunk_size: 8,
        }
    }
}

/// The field value at (time value, y coordinate, x coordinate).
///
/// Linear in both spatial coordinates, so bilinear regridding reproduces
/// it exactly at any cell center.
pub fn synthetic_value(time_value: f64, y: f64, x: f64) -> f32 {
    (1000.0 * time_value + 2.0 * x + y) as f32
}

/// Write a synthetic source store at `path`.
pub fn write_synthetic_source(path: &Path, spec: &SyntheticSourceSpec) -> Result<()> {
    std::fs::create_dir_all(path)?;
    let store = Arc::new(
        FilesystemStore::new(path).map_err(|e| PyramidError::persist(e.to_string()))?,
    );

    GroupBuilder::new()
        .build(store.clone(), "/")
        .map_err(|e| PyramidError::persist(e.to_string()))?
        .store_metadata()
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    let time_values: Vec<f64> = (0..spec.time_steps).map(|t| t as f64).collect();

    write_coord(&store, "/time", "time", &time_values, "days since 2000-01-01")?;
    write_coord(&store, "/lat", "lat", &spec.grid.ys(), "degrees_north")?;
    write_coord(&store, "/lon", "lon", &spec.grid.xs(), "degrees_east")?;

    let shape = vec![
        spec.time_steps as u64,
        spec.grid.ny as u64,
        spec.grid.nx as u64,
    ];
    let chunk_grid: zarrs::array::ChunkGrid = vec![
        1,
        spec.chunk_size as u64,
        spec.chunk_size as u64,
    ]
    .try_into()
    .map_err(|e| PyramidError::persist(format!("{:?}", e)))?;

    let mut attrs = serde_json::Map::new();
    attrs.insert("units".to_string(), serde_json::json!("kg m-2 s-1"));
    attrs.insert("long_name".to_string(), serde_json::json!("precipitation"));

    let mut binding = ArrayBuilder::new(
        shape.clone(),
        DataType::Float32,
        chunk_grid,
        FillValue::from(f32::NAN),
    );
    let builder = binding
        .attributes(attrs)
        .dimension_names(Some(vec!["time", "lat", "lon"]));

    let array = builder
        .build(store.clone(), &format!("/{}", spec.variable))
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    let mut data = Vec::with_capacity(spec.time_steps * spec.grid.len());
    for &t in &time_values {
        for j in 0..spec.grid.ny {
            for i in 0..spec.grid.nx {
                data.push(synthetic_value(t, spec.grid.y_at(j), spec.grid.x_at(i)));
            }
        }
    }

    let subset = ArraySubset::new_with_shape(shape);
    array
        .store_array_subset_elements(&subset, &data)
        .map_err(|e| PyramidError::persist(e.to_string()))
}

/// Write a 1-D float64 coordinate array.
fn write_coord(
    store: &Arc<FilesystemStore>,
    array_path: &str,
    dim: &str,
    values: &[f64],
    units: &str,
) -> Result<()> {
    let shape = vec![values.len() as u64];
    let chunk_grid: zarrs::array::ChunkGrid = shape
        .clone()
        .try_into()
        .map_err(|e| PyramidError::persist(format!("{:?}", e)))?;

    let mut attrs = serde_json::Map::new();
    attrs.insert("units".to_string(), serde_json::json!(units));

    let mut binding = ArrayBuilder::new(
        shape.clone(),
        DataType::Float64,
        chunk_grid,
        FillValue::from(f64::NAN),
    );
    let builder = binding
        .attributes(attrs)
        .dimension_names(Some(vec![dim.to_string()]));

    let array = builder
        .build(store.clone(), array_path)
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    let subset = ArraySubset::new_with_shape(shape);
    array
        .store_array_subset_elements(&subset, values)
        .map_err(|e| PyramidError::persist(e.to_string()))
}
