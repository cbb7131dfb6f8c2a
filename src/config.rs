//! Run configuration
use crate::io::ProfileFormat;
use crate::parameters::Parameter;
use crate::types::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when cell models fail during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the process once the special points have been written.
    #[default]
    Abort,
    /// Return an error and refuse any further step.
    ReturnError,
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write gridded output
    pub grids_write: bool,
    /// Offset (days) of the gridded output
    pub grids_start: f64,
    /// Interval (days) between gridded outputs
    pub grids_days_between: f64,
    /// Names of the grids to write
    pub grids_parameters: Vec<String>,
    /// Write time series at the special points
    pub ts_write: bool,
    /// Offset (days) of the time series output
    pub ts_start: f64,
    /// Interval (days) between time series outputs
    pub ts_days_between: f64,
    /// Write profiles at the special points
    pub prof_write: bool,
    /// Offset (days) of the profile output
    pub prof_start: f64,
    /// Interval (days) between profile outputs
    pub prof_days_between: f64,
    /// Snow cover files are written by the caller; when off, the special
    /// points write their own once
    pub snow_write: bool,
    /// Directory of the special point files
    pub meteo_path: PathBuf,
    /// Directory of the grids
    pub grid_path: PathBuf,
    /// Directory of the snow cover files
    pub snow_path: PathBuf,
    /// Time zone of the output
    pub time_zone: f64,
    /// Mask glaciated cells in the gridded output
    pub mask_glaciers: bool,
    /// Update the glacier mask at every step
    pub mask_dynamic: bool,
    /// Depth (m) of the soil temperature written at the special points
    pub soil_temperature_depth: Option<f64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            grids_write: true,
            grids_start: 0.0,
            grids_days_between: 1.0,
            grids_parameters: vec!["HS".to_string(), "SWE".to_string()],
            ts_write: false,
            ts_start: 0.0,
            ts_days_between: 1.0 / 24.0,
            prof_write: false,
            prof_start: 0.0,
            prof_days_between: 1.0,
            snow_write: false,
            meteo_path: PathBuf::from("output"),
            grid_path: PathBuf::from("output"),
            snow_path: PathBuf::from("output"),
            time_zone: 0.0,
            mask_glaciers: false,
            mask_dynamic: false,
            soil_temperature_depth: None,
        }
    }
}

/// Configuration of the snow cover coupler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowpackConfig {
    /// Name of the experiment, part of every file name
    pub experiment: String,
    /// Length of a step (minutes)
    pub step_length_minutes: f64,
    /// Number of worker threads per process
    pub workers: usize,
    /// Restart from per-cell snow files instead of land use profiles
    pub restart: bool,
    /// Format of the snow cover files
    pub snow_format: ProfileFormat,
    /// Directory of the initial snow cover files
    pub input_snow_path: PathBuf,
    /// Enable the canopy module
    pub use_canopy: bool,
    /// Cool the air over glaciers by the katabatic flow
    pub glacier_katabatic_flow: bool,
    /// Simulate soil layers
    pub use_soil: bool,
    /// Every process reads and writes its own files
    pub local_io: bool,
    /// Reaction to failing cells
    pub failure_policy: FailurePolicy,
    /// Output settings
    pub output: OutputConfig,
}

impl Default for SnowpackConfig {
    fn default() -> Self {
        Self {
            experiment: "snowgrid".to_string(),
            step_length_minutes: 60.0,
            workers: 1,
            restart: false,
            snow_format: ProfileFormat::default(),
            input_snow_path: PathBuf::from("input"),
            use_canopy: false,
            glacier_katabatic_flow: false,
            use_soil: false,
            local_io: true,
            failure_policy: FailurePolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl SnowpackConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.experiment.trim().is_empty() {
            return Err(Error::Config("experiment name must not be empty".to_string()));
        }
        if !(self.step_length_minutes > 0.0) {
            return Err(Error::Config(format!(
                "step length must be positive, got {} minutes",
                self.step_length_minutes
            )));
        }
        if self.workers == 0 {
            return Err(Error::Config("at least one worker is needed".to_string()));
        }
        let out = &self.output;
        for (enabled, days, name) in [
            (out.grids_write, out.grids_days_between, "grids_days_between"),
            (out.ts_write, out.ts_days_between, "ts_days_between"),
            (out.prof_write, out.prof_days_between, "prof_days_between"),
        ] {
            if enabled && !(days > 0.0) {
                return Err(Error::Config(format!("{name} must be positive, got {days}")));
            }
        }
        if out.mask_dynamic && !self.uses_glacier_mask() {
            log::warn!("mask_dynamic has no effect without mask_glaciers or glacier_katabatic_flow");
        }
        self.output_parameters()?;
        Ok(())
    }

    /// Is the glacier map needed?
    pub fn uses_glacier_mask(&self) -> bool {
        self.output.mask_glaciers || self.glacier_katabatic_flow
    }

    /// The grids to write, each once, sorted by name.
    pub fn output_parameters(&self) -> Result<Vec<Parameter>> {
        if !self.output.grids_write {
            return Ok(vec![]);
        }
        unique_parameters(&self.output.grids_parameters)
    }

    /// Length of a step.
    pub fn step(&self) -> Duration {
        Duration::milliseconds((self.step_length_minutes * 60_000.0).round() as i64)
    }

    /// Length of a step in seconds.
    pub fn step_seconds(&self) -> f64 {
        self.step_length_minutes * 60.0
    }
}

/// Parse parameter names, dropping duplicates.
pub fn unique_parameters(names: &[String]) -> Result<Vec<Parameter>> {
    let mut names = names.iter().map(|n| n.trim().to_uppercase()).collect::<Vec<_>>();
    names.sort();
    names.dedup();
    names.iter().map(|n| n.parse()).collect()
}
