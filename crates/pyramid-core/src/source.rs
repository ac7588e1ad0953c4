//! Source dataset access.
//!
//! Opens a remote or local Zarr store lazily: array metadata and 1-D
//! coordinate arrays are read at open time, variable data only when a
//! pyramid build asks for it.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::http::HttpBuilder;
use object_store::prefix::PrefixStore;
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::ReadableListableStorage;
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

use pyramid_common::{CrsCode, GridSpec};

use crate::error::{PyramidError, Result};

/// Dimension names recognized as the X (longitude/easting) axis.
const X_DIM_NAMES: &[&str] = &["lon", "longitude", "x"];
/// Dimension names recognized as the Y (latitude/northing) axis.
const Y_DIM_NAMES: &[&str] = &["lat", "latitude", "y"];
/// Dimension name recognized as the time axis.
const TIME_DIM_NAME: &str = "time";

/// Blocking executor driving async storage I/O from synchronous pipeline
/// code.
///
/// Holds a runtime handle captured at construction so storage calls work
/// from any non-runtime thread, including rayon workers.
#[derive(Clone)]
pub struct RuntimeBlockOn {
    handle: tokio::runtime::Handle,
}

impl RuntimeBlockOn {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl AsyncToSyncBlockOn for RuntimeBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

/// Parsed source URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Local directory (bare path or `file://`).
    Filesystem(PathBuf),
    /// HTTP(S) endpoint addressing the store root.
    Http(String),
    /// S3-compatible bucket and key prefix (credentials from environment).
    S3 { bucket: String, prefix: String },
}

impl SourceLocation {
    /// Parse a source URI.
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Self::Filesystem(PathBuf::from(path)));
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(Self::Http(uri.trim_end_matches('/').to_string()));
        }

        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(PyramidError::source_unavailable(format!(
                    "missing bucket in S3 URI: {}",
                    uri
                )));
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }

        if uri.contains("://") {
            return Err(PyramidError::source_unavailable(format!(
                "unsupported URI scheme: {}",
                uri
            )));
        }

        Ok(Self::Filesystem(PathBuf::from(uri)))
    }
}

/// S3 connection settings taken from the environment.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub allow_http: bool,
}

impl S3Config {
    /// Read S3 settings from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: std::env::var("S3_ACCESS_KEY").ok(),
            secret_access_key: std::env::var("S3_SECRET_KEY").ok(),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Open a readable, listable Zarr storage backend for a source location.
///
/// Remote backends are object_store clients wrapped in an async-to-sync
/// adapter driven by `block_on`.
pub fn open_storage(
    location: &SourceLocation,
    block_on: RuntimeBlockOn,
) -> Result<ReadableListableStorage> {
    match location {
        SourceLocation::Filesystem(path) => {
            if !path.is_dir() {
                return Err(PyramidError::source_unavailable(format!(
                    "no such directory: {}",
                    path.display()
                )));
            }
            let store = FilesystemStore::new(path)
                .map_err(|e| PyramidError::source_unavailable(e.to_string()))?;
            Ok(Arc::new(store))
        }
        SourceLocation::Http(url) => {
            let store = HttpBuilder::new()
                .with_url(url.clone())
                .build()
                .map_err(|e| PyramidError::source_unavailable(e.to_string()))?;
            let async_store = Arc::new(AsyncObjectStore::new(store));
            Ok(Arc::new(AsyncToSyncStorageAdapter::new(
                async_store,
                block_on,
            )))
        }
        SourceLocation::S3 { bucket, prefix } => {
            let config = S3Config::from_env();

            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(bucket.clone())
                .with_region(config.region.clone())
                .with_allow_http(config.allow_http);

            if let Some(endpoint) = &config.endpoint {
                builder = builder.with_endpoint(endpoint.clone());
            }
            if let (Some(key), Some(secret)) =
                (&config.access_key_id, &config.secret_access_key)
            {
                builder = builder
                    .with_access_key_id(key.clone())
                    .with_secret_access_key(secret.clone());
            }

            let s3 = builder
                .build()
                .map_err(|e| PyramidError::source_unavailable(e.to_string()))?;

            let prefixed = PrefixStore::new(s3, object_store::path::Path::from(prefix.as_str()));
            let async_store = Arc::new(AsyncObjectStore::new(prefixed));
            Ok(Arc::new(AsyncToSyncStorageAdapter::new(
                async_store,
                block_on,
            )))
        }
    }
}

/// How to treat value encoding (CF `scale_factor` / `add_offset` /
/// `_FillValue`) at open time.
///
/// This is an explicit caller choice, never an ambient default: use
/// [`OpenOptions::decoded`] to apply the encoding on read, or
/// [`OpenOptions::raw`] to read stored values untouched and carry the
/// encoding attributes through to the output store.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub decode_values: bool,
}

impl OpenOptions {
    /// Apply scale/offset/fill decoding when reading variable data.
    pub fn decoded() -> Self {
        Self {
            decode_values: true,
        }
    }

    /// Read stored values as-is; encoding attributes are preserved.
    pub fn raw() -> Self {
        Self {
            decode_values: false,
        }
    }
}

/// Value-encoding attributes of a variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueEncoding {
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
    pub fill_value: Option<f64>,
}

impl ValueEncoding {
    fn from_attrs(attrs: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            scale_factor: attrs.get("scale_factor").and_then(|v| v.as_f64()),
            add_offset: attrs.get("add_offset").and_then(|v| v.as_f64()),
            fill_value: attrs.get("_FillValue").and_then(|v| v.as_f64()),
        }
    }

    fn is_identity(&self) -> bool {
        self.scale_factor.is_none() && self.add_offset.is_none() && self.fill_value.is_none()
    }
}

/// A 1-D coordinate array, loaded eagerly at open.
#[derive(Debug, Clone)]
pub struct CoordArray {
    pub name: String,
    pub values: Vec<f64>,
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

/// A data variable: a lazy handle onto the source array.
pub struct SourceVariable {
    array: Array<dyn zarrs::storage::ReadableListableStorageTraits>,
    pub dims: Vec<String>,
    pub attrs: serde_json::Map<String, serde_json::Value>,
    pub encoding: ValueEncoding,
}

impl SourceVariable {
    /// Dimension sizes in dimension order.
    pub fn shape(&self) -> &[u64] {
        self.array.shape()
    }
}

impl std::fmt::Debug for SourceVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceVariable")
            .field("dims", &self.dims)
            .field("shape", &self.array.shape())
            .finish()
    }
}

/// A labeled multi-dimensional dataset opened from a Zarr store.
///
/// Variable data stays in the store until [`read_field`](Self::read_field)
/// is called; only dimension metadata and coordinate arrays live in memory.
pub struct SourceDataset {
    decode_values: bool,
    dims: BTreeMap<String, u64>,
    coords: BTreeMap<String, CoordArray>,
    variables: BTreeMap<String, SourceVariable>,
    crs: Option<CrsCode>,
    selection: BTreeMap<String, Range<u64>>,
}

impl SourceDataset {
    /// Open a dataset from storage, discovering arrays by listing the store
    /// root.
    ///
    /// 1-D arrays named after their own dimension are treated as
    /// coordinates and loaded; everything else becomes a lazy data
    /// variable.
    pub fn open(storage: ReadableListableStorage, options: OpenOptions) -> Result<Self> {
        let root = zarrs_storage::StorePrefix::root();
        let listing = storage
            .list_dir(&root)
            .map_err(|e| PyramidError::source_unavailable(e.to_string()))?;

        if listing.prefixes().is_empty() {
            return Err(PyramidError::source_unavailable(
                "store has no child arrays".to_string(),
            ));
        }

        let mut dims: BTreeMap<String, u64> = BTreeMap::new();
        let mut coords = BTreeMap::new();
        let mut variables = BTreeMap::new();

        for prefix in listing.prefixes() {
            let name = prefix.as_str().trim_end_matches('/').to_string();
            if name.is_empty() {
                continue;
            }

            let array = match Array::open(storage.clone(), &format!("/{}", name)) {
                Ok(array) => array,
                Err(e) => {
                    // Non-array node (subgroup, stray file); skip it.
                    tracing::debug!(node = %name, error = %e, "Skipping non-array node");
                    continue;
                }
            };

            let attrs = array.attributes().clone();
            let array_dims = dimension_names(&array, &attrs, &name)?;

            for (dim, size) in array_dims.iter().zip(array.shape()) {
                if let Some(existing) = dims.get(dim) {
                    if existing != size {
                        return Err(PyramidError::invalid_metadata(format!(
                            "dimension '{}' has conflicting sizes {} and {}",
                            dim, existing, size
                        )));
                    }
                } else {
                    dims.insert(dim.clone(), *size);
                }
            }

            let is_coordinate = array_dims.len() == 1 && array_dims[0] == name;
            if is_coordinate {
                let values = read_coord_values(&array, &name)?;
                coords.insert(
                    name.clone(),
                    CoordArray {
                        name,
                        values,
                        attrs,
                    },
                );
            } else {
                let encoding = ValueEncoding::from_attrs(&attrs);
                variables.insert(
                    name,
                    SourceVariable {
                        array,
                        dims: array_dims,
                        attrs,
                        encoding,
                    },
                );
            }
        }

        if variables.is_empty() {
            return Err(PyramidError::source_unavailable(
                "store contains no data variables".to_string(),
            ));
        }

        tracing::info!(
            variables = ?variables.keys().collect::<Vec<_>>(),
            dims = ?dims,
            "Opened source dataset"
        );

        Ok(Self {
            decode_values: options.decode_values,
            dims,
            coords,
            variables,
            crs: None,
            selection: BTreeMap::new(),
        })
    }

    /// Dimension names and sizes.
    pub fn dims(&self) -> &BTreeMap<String, u64> {
        &self.dims
    }

    /// Coordinate arrays.
    pub fn coords(&self) -> &BTreeMap<String, CoordArray> {
        &self.coords
    }

    /// Data variables.
    pub fn variables(&self) -> &BTreeMap<String, SourceVariable> {
        &self.variables
    }

    /// Data variable names.
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.keys().map(|s| s.as_str()).collect()
    }

    /// The attached CRS, if any.
    pub fn crs(&self) -> Option<CrsCode> {
        self.crs
    }

    /// Whether value encoding is applied on read.
    pub fn decodes_values(&self) -> bool {
        self.decode_values
    }

    /// Stamp a CRS onto the dataset without reprojecting any data.
    ///
    /// Fails when the dataset has no recognizable spatial dimension pair;
    /// the dataset is left untouched in that case.
    pub fn attach_crs(&mut self, crs: CrsCode) -> Result<()> {
        if self.spatial_dims().is_none() {
            return Err(PyramidError::missing_spatial_dims(format!(
                "no x/y dimension pair among {:?}",
                self.dims.keys().collect::<Vec<_>>()
            )));
        }

        self.crs = Some(crs);
        Ok(())
    }

    /// The (x, y) spatial dimension names, when both are present with
    /// coordinates.
    pub fn spatial_dims(&self) -> Option<(&str, &str)> {
        let x = self.find_dim(X_DIM_NAMES)?;
        let y = self.find_dim(Y_DIM_NAMES)?;
        Some((x, y))
    }

    /// The time dimension name, if the dataset has one.
    pub fn time_dim(&self) -> Option<&str> {
        self.dims
            .keys()
            .find(|d| d.eq_ignore_ascii_case(TIME_DIM_NAME))
            .map(|s| s.as_str())
    }

    fn find_dim(&self, candidates: &[&str]) -> Option<&str> {
        self.dims
            .keys()
            .find(|d| {
                candidates.iter().any(|c| d.eq_ignore_ascii_case(c))
                    && self.coords.contains_key(*d)
            })
            .map(|s| s.as_str())
    }

    /// Restrict the dataset along a dimension by index range.
    ///
    /// Pure slicing; replaces any previous selection on the same dimension.
    pub fn select(&mut self, dim: &str, range: Range<u64>) -> Result<()> {
        let size = *self.dims.get(dim).ok_or_else(|| {
            PyramidError::selection(format!("unknown dimension: {}", dim))
        })?;

        if range.start >= range.end {
            return Err(PyramidError::selection(format!(
                "empty range {}..{} for dimension '{}'",
                range.start, range.end, dim
            )));
        }
        if range.end > size {
            return Err(PyramidError::selection(format!(
                "range {}..{} exceeds dimension '{}' of size {}",
                range.start, range.end, dim, size
            )));
        }

        self.selection.insert(dim.to_string(), range);
        Ok(())
    }

    /// The effective index range along a dimension (selection or full).
    pub fn selected_range(&self, dim: &str) -> Range<u64> {
        self.selection
            .get(dim)
            .cloned()
            .unwrap_or_else(|| 0..self.dims.get(dim).copied().unwrap_or(0))
    }

    /// Number of selected indices along a dimension.
    pub fn selected_len(&self, dim: &str) -> u64 {
        let range = self.selected_range(dim);
        range.end - range.start
    }

    /// Coordinate values along a dimension, restricted to the selection.
    pub fn coord_values(&self, dim: &str) -> Option<Vec<f64>> {
        let coord = self.coords.get(dim)?;
        let range = self.selected_range(dim);
        Some(coord.values[range.start as usize..range.end as usize].to_vec())
    }

    /// Derive the (selected) spatial grid of the dataset.
    pub fn grid(&self) -> Result<GridSpec> {
        let (x_dim, y_dim) = self.spatial_dims().ok_or_else(|| {
            PyramidError::missing_spatial_dims(format!(
                "no x/y dimension pair among {:?}",
                self.dims.keys().collect::<Vec<_>>()
            ))
        })?;

        let xs = self
            .coord_values(x_dim)
            .ok_or_else(|| PyramidError::invalid_metadata("missing x coordinate values"))?;
        let ys = self
            .coord_values(y_dim)
            .ok_or_else(|| PyramidError::invalid_metadata("missing y coordinate values"))?;

        GridSpec::from_coords(&xs, &ys)
            .map_err(|e| PyramidError::invalid_metadata(e.to_string()))
    }

    /// Read one 2-D field of a variable: the selected spatial window at the
    /// given step along the time dimension (ignored for time-free
    /// variables).
    ///
    /// Returns row-major `[y, x]` data with value encoding applied when the
    /// dataset was opened with [`OpenOptions::decoded`].
    pub fn read_field(&self, name: &str, time_step: u64) -> Result<Vec<f32>> {
        let variable = self.variables.get(name).ok_or_else(|| {
            PyramidError::invalid_metadata(format!("unknown variable: {}", name))
        })?;

        if variable.array.data_type() != &DataType::Float32 {
            return Err(PyramidError::invalid_metadata(format!(
                "variable '{}' is not float32",
                name
            )));
        }

        let time_dim = self.time_dim();
        let mut start = Vec::with_capacity(variable.dims.len());
        let mut shape = Vec::with_capacity(variable.dims.len());

        for dim in &variable.dims {
            if Some(dim.as_str()) == time_dim {
                let range = self.selected_range(dim);
                let index = range.start + time_step;
                if index >= range.end {
                    return Err(PyramidError::selection(format!(
                        "time step {} outside selected range {}..{}",
                        time_step, range.start, range.end
                    )));
                }
                start.push(index);
                shape.push(1);
            } else {
                let range = self.selected_range(dim);
                start.push(range.start);
                shape.push(range.end - range.start);
            }
        }

        let subset = ArraySubset::new_with_start_shape(start, shape)
            .map_err(|e| PyramidError::invalid_metadata(e.to_string()))?;

        let mut data: Vec<f32> = variable
            .array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| PyramidError::source_unavailable(e.to_string()))?;

        if self.decode_values && !variable.encoding.is_identity() {
            decode_in_place(&mut data, &variable.encoding);
        }

        Ok(data)
    }
}

impl std::fmt::Debug for SourceDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDataset")
            .field("dims", &self.dims)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("crs", &self.crs)
            .field("selection", &self.selection)
            .finish()
    }
}

/// Apply CF value decoding in place: fill values become NaN, then
/// `value * scale_factor + add_offset`.
fn decode_in_place(data: &mut [f32], encoding: &ValueEncoding) {
    let scale = encoding.scale_factor.unwrap_or(1.0) as f32;
    let offset = encoding.add_offset.unwrap_or(0.0) as f32;
    let fill = encoding.fill_value.map(|f| f as f32);

    for value in data.iter_mut() {
        if let Some(fill) = fill {
            if *value == fill {
                *value = f32::NAN;
                continue;
            }
        }
        *value = *value * scale + offset;
    }
}

/// Resolve the dimension names of an array.
///
/// Prefers Zarr V3 `dimension_names`, falling back to the xarray
/// `_ARRAY_DIMENSIONS` attribute used by V2 stores.
fn dimension_names<T: ?Sized>(
    array: &Array<T>,
    attrs: &serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Result<Vec<String>> {
    if let Some(names) = array.dimension_names() {
        let names: Vec<Option<String>> = serde_json::from_value(serde_json::to_value(names)?)?;
        if names.iter().all(|n| n.is_some()) {
            return Ok(names.into_iter().flatten().collect());
        }
    }

    if let Some(value) = attrs.get("_ARRAY_DIMENSIONS") {
        let names: Vec<String> = serde_json::from_value(value.clone())?;
        if names.len() == array.shape().len() {
            return Ok(names);
        }
        return Err(PyramidError::invalid_metadata(format!(
            "_ARRAY_DIMENSIONS of '{}' does not match its rank",
            name
        )));
    }

    Err(PyramidError::invalid_metadata(format!(
        "array '{}' has no dimension names",
        name
    )))
}

/// Read a 1-D coordinate array as f64 regardless of stored precision.
fn read_coord_values<T: zarrs::storage::ReadableStorageTraits + ?Sized + 'static>(
    array: &Array<T>,
    name: &str,
) -> Result<Vec<f64>> {
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());

    let values = match array.data_type() {
        DataType::Float64 => array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(|e| PyramidError::source_unavailable(e.to_string()))?,
        DataType::Float32 => array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(|e| PyramidError::source_unavailable(e.to_string()))?
            .into_iter()
            .map(f64::from)
            .collect(),
        DataType::Int64 => array
            .retrieve_array_subset_elements::<i64>(&subset)
            .map_err(|e| PyramidError::source_unavailable(e.to_string()))?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        DataType::Int32 => array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map_err(|e| PyramidError::source_unavailable(e.to_string()))?
            .into_iter()
            .map(f64::from)
            .collect(),
        other => {
            return Err(PyramidError::invalid_metadata(format!(
                "unsupported coordinate data type {:?} for '{}'",
                other, name
            )))
        }
    };

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filesystem() {
        assert_eq!(
            SourceLocation::parse("/data/source.zarr").unwrap(),
            SourceLocation::Filesystem(PathBuf::from("/data/source.zarr"))
        );
        assert_eq!(
            SourceLocation::parse("file:///data/source.zarr").unwrap(),
            SourceLocation::Filesystem(PathBuf::from("/data/source.zarr"))
        );
    }

    #[test]
    fn test_parse_http() {
        assert_eq!(
            SourceLocation::parse("https://example.com/store.zarr/").unwrap(),
            SourceLocation::Http("https://example.com/store.zarr".to_string())
        );
    }

    #[test]
    fn test_parse_s3() {
        assert_eq!(
            SourceLocation::parse("s3://climate/cmip6/pr.zarr").unwrap(),
            SourceLocation::S3 {
                bucket: "climate".to_string(),
                prefix: "cmip6/pr.zarr".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_unsupported_scheme() {
        assert!(matches!(
            SourceLocation::parse("gs://bucket/store.zarr"),
            Err(PyramidError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_decode_in_place() {
        let mut data = vec![0.0, 10.0, -999.0, 20.0];
        let encoding = ValueEncoding {
            scale_factor: Some(0.5),
            add_offset: Some(1.0),
            fill_value: Some(-999.0),
        };

        decode_in_place(&mut data, &encoding);

        assert!((data[0] - 1.0).abs() < 1e-6);
        assert!((data[1] - 6.0).abs() < 1e-6);
        assert!(data[2].is_nan());
        assert!((data[3] - 11.0).abs() < 1e-6);
    }
}
