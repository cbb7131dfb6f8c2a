//! The per-cell snow model contract
//!
//! The coordinator never looks inside a cell model: it creates one per
//! simulated cell from an initial profile, steps it with the cell's forcing,
//! and reads back gridded values, point outputs and profiles.
pub mod degree_day;

use crate::parameters::Parameter;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Error raised by a cell model.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// The forcing could not be used.
    #[error("Invalid forcing for cell {cell}: {reason}")]
    InvalidForcing {
        /// Station id of the cell
        cell: String,
        /// What was wrong
        reason: String,
    },
    /// The model state became inconsistent.
    #[error("Cell {cell} diverged: {reason}")]
    Diverged {
        /// Station id of the cell
        cell: String,
        /// What was wrong
        reason: String,
    },
    /// The model could not be built from its profile.
    #[error("Can not initialise cell {cell}: {reason}")]
    Initialisation {
        /// Station id of the cell
        cell: String,
        /// What was wrong
        reason: String,
    },
}

/// Forcing of a single cell for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellForcing {
    /// Air temperature (K)
    pub ta: f64,
    /// Relative humidity (1)
    pub rh: f64,
    /// Wind speed (m/s)
    pub vw: f64,
    /// Precipitation sum (kg/m2)
    pub psum: f64,
    /// Precipitation phase (0 solid, 1 liquid)
    pub psum_ph: f64,
    /// Incoming shortwave radiation (W/m2)
    pub iswr: f64,
    /// Diffuse part of the shortwave radiation (W/m2)
    pub diffuse: f64,
    /// Incoming longwave radiation (W/m2)
    pub ilwr: f64,
    /// Snow mass change from drift (kg/m2), zero without a drift module
    pub mns: f64,
    /// Solar elevation (degrees)
    pub solar_elevation: f64,
}

/// Identity and position of a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMetadata {
    /// Short identifier, `{ix}_{iy}`
    pub station_id: String,
    /// Full name, `{ix}_{iy}_{experiment}`
    pub station_name: String,
    /// Global column
    pub ix: usize,
    /// Row
    pub iy: usize,
    /// Easting
    pub easting: f64,
    /// Northing
    pub northing: f64,
    /// Elevation
    pub altitude: f64,
    /// EPSG code of the coordinates
    pub epsg: Option<u32>,
    /// Slope angle (degrees)
    pub slope: f64,
    /// Slope azimuth (degrees)
    pub azimuth: f64,
    /// Land use code
    pub landuse: u32,
}

/// One layer of a snow/soil profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Date the layer was deposited
    pub deposition_date: Timestamp,
    /// Thickness (m)
    pub thickness: f64,
    /// Temperature (K)
    pub temperature: f64,
    /// Volumetric ice content (1)
    pub vol_ice: f64,
    /// Volumetric water content (1)
    pub vol_water: f64,
    /// Grain radius (mm)
    pub grain_radius: f64,
}

/// Density of ice (kg/m3)
pub const RHO_ICE: f64 = 917.0;
/// Density of water (kg/m3)
pub const RHO_WATER: f64 = 1000.0;

impl Layer {
    /// Mass per unit area (kg/m2).
    pub fn mass(&self) -> f64 {
        self.thickness * (self.vol_ice * RHO_ICE + self.vol_water * RHO_WATER)
    }
}

/// Snow and soil profile of a cell, ordered from the bottom up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowProfile {
    /// Date of the profile
    pub profile_date: Timestamp,
    /// Number of soil layers at the bottom of `layers`
    pub soil_layers: usize,
    /// Surface albedo
    pub albedo: f64,
    /// Layers, bottom first
    pub layers: Vec<Layer>,
}

impl SnowProfile {
    /// The snow layers (soil layers removed).
    pub fn snow_layers(&self) -> &[Layer] {
        &self.layers[self.soil_layers.min(self.layers.len())..]
    }

    /// Snow height (m)
    pub fn snow_height(&self) -> f64 {
        self.snow_layers().iter().map(|l| l.thickness).sum()
    }

    /// Snow water equivalent (kg/m2)
    pub fn swe(&self) -> f64 {
        self.snow_layers().iter().map(Layer::mass).sum()
    }

    /// Deposition date of the oldest layer, if any.
    pub fn oldest_deposition(&self) -> Option<Timestamp> {
        self.layers.first().map(|l| l.deposition_date)
    }
}

/// A profile together with the cell it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellProfile {
    /// The cell
    pub meta: CellMetadata,
    /// Its profile
    pub profile: SnowProfile,
}

/// Meteorological and surface state of a cell after a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointOutput {
    /// Air temperature (K)
    pub ta: f64,
    /// Snow surface temperature (K)
    pub tss: f64,
    /// Ground surface temperature (K)
    pub tsg: f64,
    /// Wind speed (m/s)
    pub vw: f64,
    /// Wind direction (degrees)
    pub dw: f64,
    /// Maximum wind speed (m/s)
    pub vw_max: f64,
    /// Incoming shortwave radiation (W/m2)
    pub iswr: f64,
    /// Reflected shortwave radiation (W/m2)
    pub rswr: f64,
    /// Incoming longwave radiation (W/m2)
    pub ilwr: f64,
    /// Precipitation sum (kg/m2)
    pub psum: f64,
    /// Precipitation phase
    pub psum_ph: f64,
    /// Vertical snow height (m)
    pub hs: f64,
    /// Relative humidity (1)
    pub rh: f64,
    /// Snow water equivalent (kg/m2)
    pub swe: f64,
    /// Surface albedo
    pub albedo: f64,
    /// Runoff out of the snowpack (kg/m2)
    pub runoff: f64,
    /// Soil temperature at the configured depth (K)
    pub tsoil: Option<f64>,
    /// Shortwave radiation below the canopy (W/m2)
    pub iswr_canopy: Option<f64>,
    /// Reflected shortwave radiation below the canopy (W/m2)
    pub rswr_canopy: Option<f64>,
}

/// Output of a special point for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSnapshot {
    /// Timestamp of the step
    pub timestamp: Timestamp,
    /// The cell
    pub meta: CellMetadata,
    /// Meteorological and surface state
    pub output: PointOutput,
    /// Full profile
    pub profile: SnowProfile,
}

/// A snow model running on a single cell.
pub trait CellModel: Send + Sync {
    /// Advance the model by one step.
    fn step(&mut self, timestamp: &Timestamp, forcing: &CellForcing) -> Result<(), ModelError>;

    /// Current value of a gridded parameter, `None` if the model does not compute it.
    fn value(&self, parameter: Parameter) -> Option<f64>;

    /// State of the cell for time series output.
    fn point_output(&self) -> PointOutput;

    /// Current profile of the cell.
    fn profile(&self) -> SnowProfile;

    /// Identity of the cell.
    fn metadata(&self) -> &CellMetadata;

    /// Snapshot used for special point output.
    fn snapshot(&self, timestamp: &Timestamp) -> PointSnapshot {
        PointSnapshot {
            timestamp: *timestamp,
            meta: self.metadata().clone(),
            output: self.point_output(),
            profile: self.profile(),
        }
    }
}

/// Builds cell models from their initial profiles.
pub trait CellModelFactory: Sync {
    /// The model type
    type Model: CellModel;

    /// Create the model of a cell.
    fn create(&self, profile: SnowProfile, metadata: CellMetadata) -> Result<Self::Model, ModelError>;
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn layer(thickness: f64, vol_ice: f64) -> Layer {
        Layer {
            deposition_date: NaiveDate::from_ymd_opt(2019, 12, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            thickness,
            temperature: 270.0,
            vol_ice,
            vol_water: 0.0,
            grain_radius: 0.5,
        }
    }

    #[test]
    fn test_profile_ignores_soil_layers() {
        let profile = SnowProfile {
            profile_date: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            soil_layers: 1,
            albedo: 0.8,
            layers: vec![layer(0.5, 0.3), layer(0.2, 0.2), layer(0.3, 0.1)],
        };
        assert_relative_eq!(profile.snow_height(), 0.5);
        assert_relative_eq!(profile.swe(), 0.2 * 0.2 * RHO_ICE + 0.3 * 0.1 * RHO_ICE);
    }
}
