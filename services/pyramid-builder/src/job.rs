//! The build pipeline.
//!
//! A job runs the stages `Loading -> CrsAttached -> Subset -> Building ->
//! Persisting -> Done` once. Any failure is fatal to the run: the error
//! propagates to the caller carrying the stage it failed in, and a partial
//! output store is the operator's to clean up.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use pyramid_common::CrsCode;
use pyramid_core::{
    open_storage, write_pyramid, BuildOptions, BuilderConfig, InterpolationMethod, OpenOptions,
    PersistOptions, PyramidPlan, RuntimeBlockOn, SourceDataset, SourceLocation,
};

/// The stage a build run is in, carried in logs and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Idle,
    Loading,
    CrsAttached,
    Subset,
    Building,
    Persisting,
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Idle => "idle",
            BuildStage::Loading => "loading",
            BuildStage::CrsAttached => "crs-attached",
            BuildStage::Subset => "subset",
            BuildStage::Building => "building",
            BuildStage::Persisting => "persisting",
            BuildStage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Parse an index range of the form `"a..b"`.
pub fn parse_time_range(s: &str) -> Result<Range<u64>> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| anyhow!("time range must be of the form start..end, got '{}'", s))?;

    let start: u64 = start
        .trim()
        .parse()
        .with_context(|| format!("invalid range start '{}'", start))?;
    let end: u64 = end
        .trim()
        .parse()
        .with_context(|| format!("invalid range end '{}'", end))?;

    if start >= end {
        return Err(anyhow!("time range {}..{} is empty", start, end));
    }

    Ok(start..end)
}

/// One pyramid build run.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub source: String,
    pub levels: usize,
    pub method: InterpolationMethod,
    pub crs: CrsCode,
    pub time_range: Option<Range<u64>>,
    pub output: PathBuf,
    pub overwrite: bool,
    pub consolidated: bool,
    pub decode_values: bool,
    pub parallel: bool,
}

impl BuildJob {
    /// Run the job to completion or first failure. No retries; a failed
    /// run restarts from scratch.
    pub fn run(&self) -> Result<()> {
        // The runtime only drives object_store I/O for remote sources; all
        // pipeline work stays on non-runtime threads so storage calls can
        // block from rayon workers as well.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let block_on = RuntimeBlockOn::new(runtime.handle().clone());

        let mut stage = BuildStage::Idle;
        info!(stage = %stage, source = %self.source, "Run starting");

        stage = BuildStage::Loading;
        info!(stage = %stage, "Opening source dataset");

        let location = SourceLocation::parse(&self.source)
            .with_context(|| format!("failed during {}", stage))?;
        let storage = open_storage(&location, block_on)
            .with_context(|| format!("failed during {}", stage))?;

        let open_options = if self.decode_values {
            OpenOptions::decoded()
        } else {
            OpenOptions::raw()
        };
        let mut ds = SourceDataset::open(storage, open_options)
            .with_context(|| format!("failed during {}", stage))?;

        stage = BuildStage::CrsAttached;
        info!(stage = %stage, crs = %self.crs, "Attaching CRS");
        ds.attach_crs(self.crs)
            .with_context(|| format!("failed during {}", stage))?;

        stage = BuildStage::Subset;
        if let Some(range) = &self.time_range {
            let time_dim = ds
                .time_dim()
                .map(|d| d.to_string())
                .ok_or_else(|| anyhow!("--time-range given but dataset has no time dimension"))?;
            info!(stage = %stage, dim = %time_dim, start = range.start, end = range.end, "Selecting subset");
            ds.select(&time_dim, range.clone())
                .with_context(|| format!("failed during {}", stage))?;
        }

        stage = BuildStage::Building;
        let options = BuildOptions {
            levels: self.levels,
            method: self.method,
            parallel: self.parallel,
        };
        let plan = PyramidPlan::new(&ds, &options)
            .with_context(|| format!("failed during {}", stage))?;
        info!(
            stage = %stage,
            levels = plan.levels.len(),
            variables = ?plan.variables,
            time_steps = ?plan.time_steps,
            parallel = self.parallel,
            "Building pyramid"
        );
        let pyramid = plan
            .materialize(&ds)
            .with_context(|| format!("failed during {}", stage))?;

        stage = BuildStage::Persisting;
        info!(stage = %stage, output = %self.output.display(), "Persisting store");
        let config = BuilderConfig::from_env();
        let persist_options = PersistOptions {
            overwrite: self.overwrite,
            consolidated: self.consolidated,
        };
        write_pyramid(&pyramid, &self.output, &config, &persist_options)
            .with_context(|| format!("failed during {}", stage))?;

        stage = BuildStage::Done;
        info!(stage = %stage, output = %self.output.display(), "Build complete");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_range() {
        assert_eq!(parse_time_range("0..10").unwrap(), 0..10);
        assert_eq!(parse_time_range(" 5 .. 8 ").unwrap(), 5..8);
    }

    #[test]
    fn test_parse_time_range_rejects_bad_input() {
        assert!(parse_time_range("10").is_err());
        assert!(parse_time_range("a..b").is_err());
        assert!(parse_time_range("5..5").is_err());
        assert!(parse_time_range("8..3").is_err());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(BuildStage::Loading.to_string(), "loading");
        assert_eq!(BuildStage::Done.to_string(), "done");
    }
}
