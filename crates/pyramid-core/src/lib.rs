//! Multi-Resolution Pyramid Construction over Chunked Zarr Stores
//!
//! This crate turns a single-resolution labeled dataset into a zoomable,
//! multi-level Zarr store:
//!
//! ```text
//! source URI
//!      │
//!      ▼
//! SourceDataset::open          (lazy: metadata + coordinates only)
//!      │
//!      ├─► attach_crs          (stamp CRS, no reprojection)
//!      │
//!      ├─► select              (pure index slicing)
//!      │
//!      ▼
//! PyramidPlan::new             (level grids, shapes, no compute)
//!      │
//!      ▼
//! plan.materialize             (read fields, regrid every level)
//!      │
//!      ▼
//! write_pyramid                (one group per level + .zmetadata)
//! ```
//!
//! Levels are independent: level L is the source regridded onto a grid
//! coarsened by `2^L`, so the build can fan levels out over a thread pool
//! without changing output values.
//!
//! # Example
//!
//! ```ignore
//! use pyramid_core::{
//!     build_pyramid, open_storage, write_pyramid, BuildOptions, BuilderConfig,
//!     OpenOptions, PersistOptions, SourceDataset, SourceLocation,
//! };
//!
//! let location = SourceLocation::parse("data/source.zarr")?;
//! let storage = open_storage(&location, block_on)?;
//! let mut ds = SourceDataset::open(storage, OpenOptions::raw())?;
//! ds.attach_crs(pyramid_common::CrsCode::Epsg4326)?;
//! ds.select("time", 0..10)?;
//!
//! let pyramid = build_pyramid(&ds, &BuildOptions::default())?;
//! write_pyramid(&pyramid, "public/data/regridded.zarr",
//!     &BuilderConfig::default(), &PersistOptions::default())?;
//! ```

pub mod config;
pub mod error;
pub mod pyramid;
pub mod regrid;
pub mod source;
pub mod testdata;
pub mod writer;

// Re-export commonly used types at crate root
pub use config::{BuilderConfig, ZarrCompression};
pub use error::{PyramidError, Result};
pub use pyramid::{
    build_pyramid, BuildOptions, LevelPlan, Pyramid, PyramidLevel, PyramidPlan,
};
pub use regrid::{bilinear_interpolate, regrid_field, InterpolationMethod};
pub use source::{
    open_storage, OpenOptions, RuntimeBlockOn, SourceDataset, SourceLocation,
};
pub use writer::{write_pyramid, PersistOptions, StoreSummary};
