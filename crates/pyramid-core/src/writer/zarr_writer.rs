//! Zarr V3 writer for persisting a materialized pyramid.
//!
//! Writes one group per level, one array per variable plus coordinate
//! arrays, and (optionally) a consolidated metadata document at the store
//! root.

use std::path::Path;
use std::sync::Arc;

use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::config::{BuilderConfig, ZarrCompression};
use crate::error::{PyramidError, Result};
use crate::pyramid::{Pyramid, PyramidLevel};

use super::consolidated::write_consolidated;

/// Options controlling how a pyramid is persisted.
#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    /// Replace an existing store at the output path. Off by default: an
    /// existing store without this flag is an error.
    pub overwrite: bool,
    /// Write the aggregated `.zmetadata` document after the groups.
    pub consolidated: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            consolidated: true,
        }
    }
}

/// Write a pyramid to `path`, one Zarr group per level.
///
/// With `overwrite` the previous contents of `path` are fully superseded;
/// there is no merge and no mid-write atomicity. A failure leaves the
/// store in an indeterminate state and the caller must rebuild.
pub fn write_pyramid(
    pyramid: &Pyramid,
    path: impl AsRef<Path>,
    config: &BuilderConfig,
    options: &PersistOptions,
) -> Result<()> {
    let path = path.as_ref();

    config
        .validate()
        .map_err(PyramidError::Persist)?;

    if path.exists() {
        if !options.overwrite {
            return Err(PyramidError::persist(format!(
                "output store already exists: {} (pass overwrite to replace it)",
                path.display()
            )));
        }
        // Readers holding the old store open may observe a torn store from
        // here until the write completes.
        tracing::warn!(path = %path.display(), "Replacing existing store");
        std::fs::remove_dir_all(path)?;
    }

    std::fs::create_dir_all(path)?;
    let store = Arc::new(
        FilesystemStore::new(path).map_err(|e| PyramidError::persist(e.to_string()))?,
    );

    write_root_group(&store, pyramid)?;

    for level in &pyramid.levels {
        write_level(&store, pyramid, level, config)?;
    }

    if options.consolidated {
        write_consolidated(path)?;
    }

    tracing::info!(
        path = %path.display(),
        levels = pyramid.levels.len(),
        consolidated = options.consolidated,
        "Persisted pyramid store"
    );

    Ok(())
}

/// Write the root group carrying CRS and multiscales discovery attributes.
fn write_root_group(store: &Arc<FilesystemStore>, pyramid: &Pyramid) -> Result<()> {
    let mut group = GroupBuilder::new()
        .build(store.clone(), "/")
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    let datasets: Vec<serde_json::Value> = pyramid
        .levels
        .iter()
        .map(|level| serde_json::json!({ "path": level.index.to_string() }))
        .collect();

    let attrs = group.attributes_mut();
    attrs.insert("crs".to_string(), serde_json::json!(pyramid.crs.to_string()));
    attrs.insert(
        "multiscales".to_string(),
        serde_json::json!([{
            "datasets": datasets,
            "type": pyramid.method.to_string(),
        }]),
    );

    group
        .store_metadata()
        .map_err(|e| PyramidError::persist(e.to_string()))
}

/// Write one level group with its coordinate and variable arrays.
fn write_level(
    store: &Arc<FilesystemStore>,
    pyramid: &Pyramid,
    level: &PyramidLevel,
    config: &BuilderConfig,
) -> Result<()> {
    let group_path = format!("/{}", level.index);
    let (res_x, res_y) = level.grid.resolution();

    let mut group = GroupBuilder::new()
        .build(store.clone(), &group_path)
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    let attrs = group.attributes_mut();
    attrs.insert("level".to_string(), serde_json::json!(level.index));
    attrs.insert("scale".to_string(), serde_json::json!(level.scale));
    attrs.insert(
        "resolution".to_string(),
        serde_json::json!([res_x, res_y]),
    );
    attrs.insert("bbox".to_string(), level.grid.bbox().to_json_array());
    group
        .store_metadata()
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    // Coordinate arrays: small, whole-array chunks, no compression.
    write_coord_array(
        store,
        &format!("{}/{}", group_path, pyramid.dims.x),
        &pyramid.dims.x,
        &level.grid.xs(),
        &pyramid.x_attrs,
    )?;
    write_coord_array(
        store,
        &format!("{}/{}", group_path, pyramid.dims.y),
        &pyramid.dims.y,
        &level.grid.ys(),
        &pyramid.y_attrs,
    )?;

    if let (Some(time_dim), Some(time)) = (&pyramid.dims.time, &pyramid.time) {
        write_coord_array(
            store,
            &format!("{}/{}", group_path, time_dim),
            time_dim,
            &time.values,
            &time.attrs,
        )?;
    }

    for (name, variable) in &level.variables {
        let shape = variable.shape(&level.grid);
        let mut chunk_shape: Vec<u64> = Vec::with_capacity(shape.len());
        if variable.time_steps.is_some() {
            chunk_shape.push(1);
        }
        chunk_shape.push(config.zarr_chunk_size as u64);
        chunk_shape.push(config.zarr_chunk_size as u64);

        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| PyramidError::persist(format!("{:?}", e)))?;

        let attrs = pyramid
            .variable_attrs
            .get(name)
            .cloned()
            .unwrap_or_default();

        let mut binding = ArrayBuilder::new(
            shape.clone(),
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let mut builder = binding.attributes(attrs);
        builder = builder.dimension_names(Some(variable.dims.clone()));

        if config.zarr_compression != ZarrCompression::None {
            let codec = create_compression_codec(config, 4)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(store.clone(), &format!("{}/{}", group_path, name))
            .map_err(|e| PyramidError::persist(e.to_string()))?;

        array
            .store_metadata()
            .map_err(|e| PyramidError::persist(e.to_string()))?;

        let subset = ArraySubset::new_with_shape(shape);
        array
            .store_array_subset_elements(&subset, &variable.data)
            .map_err(|e| PyramidError::persist(e.to_string()))?;
    }

    Ok(())
}

/// Write a 1-D float64 coordinate array as a single chunk.
fn write_coord_array(
    store: &Arc<FilesystemStore>,
    array_path: &str,
    dim: &str,
    values: &[f64],
    attrs: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    let shape = vec![values.len() as u64];
    let chunk_grid: zarrs::array::ChunkGrid = shape
        .clone()
        .try_into()
        .map_err(|e| PyramidError::persist(format!("{:?}", e)))?;

    let mut binding = ArrayBuilder::new(
        shape.clone(),
        DataType::Float64,
        chunk_grid,
        FillValue::from(f64::NAN),
    );
    let builder = binding
        .attributes(attrs.clone())
        .dimension_names(Some(vec![dim.to_string()]));

    let array: Array<FilesystemStore> = builder
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

/// Create the Blosc compression codec from the builder configuration.
fn create_compression_codec(
    config: &BuilderConfig,
    typesize: usize,
) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
    let level = BloscCompressionLevel::try_from(config.zarr_compression_level)
        .map_err(|_| PyramidError::persist("invalid compression level"))?;

    let shuffle = if config.zarr_shuffle {
        BloscShuffleMode::Shuffle
    } else {
        BloscShuffleMode::NoShuffle
    };

    let typesize = if config.zarr_shuffle {
        Some(typesize)
    } else {
        None
    };

    let compressor = match config.zarr_compression {
        ZarrCompression::None => {
            return Err(PyramidError::persist("no compression configured"))
        }
        ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
        ZarrCompression::BloscZstd => BloscCompressor::Zstd,
    };

    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| PyramidError::persist(e.to_string()))?;

    Ok(Arc::new(codec))
}
