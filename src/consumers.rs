//! Modules receiving grids from the coordinator after every step
//!
//! A consumer is attached once and only ever receives grids; it holds no
//! reference back into the coordinator.
use crate::grid::Grid2d;
use crate::types::{Result, Timestamp};

/// Snow surface state pushed to a snow drift module.
#[derive(Debug, Clone, PartialEq)]
pub struct SnowSurfaceData {
    /// Snow height
    pub hs: Grid2d,
    /// Sphericity
    pub sp: Grid2d,
    /// Grain radius
    pub rg: Grid2d,
    /// Number of bonds
    pub n3: Grid2d,
    /// Bond radius
    pub rb: Grid2d,
}

/// A snow drift module.
pub trait SnowDriftConsumer: Send {
    /// Receive the snow surface state.
    fn set_snow_surface_data(&mut self, data: SnowSurfaceData) -> Result<()>;
}

/// An energy balance module.
pub trait EnergyBalanceConsumer: Send {
    /// Receive the surface albedo.
    fn set_albedo(&mut self, albedo: Grid2d) -> Result<()>;
}

/// A runoff module.
pub trait RunoffConsumer: Send {
    /// Receive the runoff of a step.
    ///
    /// `snowpack` and `soil` hold the runoff out of the snowpack and out of
    /// the soil, `psum` and `ta` the precipitation and air temperature used
    /// for the step.
    fn output(&mut self, timestamp: &Timestamp, snowpack: &Grid2d, soil: &Grid2d, psum: &Grid2d, ta: &Grid2d)
        -> Result<()>;
}
