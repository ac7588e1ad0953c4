//! Pyramid persistence: Zarr store writing and consolidated metadata.

pub mod consolidated;
pub mod zarr_writer;

pub use consolidated::{ArraySummary, GroupSummary, StoreSummary, CONSOLIDATED_KEY};
pub use zarr_writer::{write_pyramid, PersistOptions};
