//! Common types shared across the climate-pyramid workspace.

pub mod bbox;
pub mod crs;
pub mod grid;

pub use bbox::BoundingBox;
pub use crs::{Crs, CrsCode, CrsParseError};
pub use grid::{GridError, GridSpec};
