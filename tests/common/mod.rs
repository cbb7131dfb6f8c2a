#![allow(dead_code)]
use chrono::NaiveDate;
use snowgrid::config::SnowpackConfig;
use snowgrid::consumers::{EnergyBalanceConsumer, RunoffConsumer, SnowDriftConsumer, SnowSurfaceData};
use snowgrid::coordinator::{Domain, MeteoForcing, RadiationForcing};
use snowgrid::grid::{Dem, Geolocation, Grid2d};
use snowgrid::io::{ProfileFormat, ProfileStore};
use snowgrid::model::{CellMetadata, CellProfile, Layer, SnowProfile};
use snowgrid::special_points::SpecialPoint;
use snowgrid::{Result, Timestamp};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const EXPERIMENT: &str = "test";

pub fn start() -> Timestamp {
    NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn geolocation() -> Geolocation {
    Geolocation::new(600000.0, 150000.0, 50.0, Some(21781))
}

/// A flat domain with land use 11 everywhere.
pub fn domain(nx: usize, ny: usize, special_points: Vec<SpecialPoint>) -> Domain {
    Domain {
        dem: Dem::new(Grid2d::new(geolocation(), nx, ny, 1800.0)),
        landuse: Grid2d::new(geolocation(), nx, ny, 11.0),
        special_points,
    }
}

/// Write the cold start profile of land use 11 with `swe` of snow.
pub fn write_landuse_profile(dir: &Path, swe: f64) {
    let thickness = swe / (0.3 * 917.0);
    let layers = if swe > 0.0 {
        vec![Layer {
            deposition_date: start() - chrono::Duration::days(10),
            thickness,
            temperature: 268.0,
            vol_ice: 0.3,
            vol_water: 0.0,
            grain_radius: 0.4,
        }]
    } else {
        vec![]
    };
    ProfileStore::new(dir, ProfileFormat::Smet)
        .write(&CellProfile {
            meta: CellMetadata {
                station_id: "11".to_string(),
                station_name: format!("{EXPERIMENT}_11"),
                ix: 0,
                iy: 0,
                easting: 0.0,
                northing: 0.0,
                altitude: 0.0,
                epsg: None,
                slope: 0.0,
                azimuth: 0.0,
                landuse: 11,
            },
            profile: SnowProfile {
                profile_date: start(),
                soil_layers: 0,
                albedo: 0.8,
                layers,
            },
        })
        .unwrap();
}

pub fn config(input: &Path, output: &Path, workers: usize) -> SnowpackConfig {
    let mut config = SnowpackConfig {
        experiment: EXPERIMENT.to_string(),
        workers,
        input_snow_path: input.to_path_buf(),
        ..Default::default()
    };
    config.output.grids_write = false;
    config.output.meteo_path = output.join("meteo");
    config.output.grid_path = output.join("grids");
    config.output.snow_path = output.join("snow");
    config
}

pub fn meteo(nx: usize, ny: usize, ta: f64, psum: f64) -> MeteoForcing {
    let grid = |v| Grid2d::new(geolocation(), nx, ny, v);
    MeteoForcing {
        psum: grid(psum),
        psum_ph: grid(0.0),
        vw: grid(2.0),
        rh: grid(0.7),
        ta: grid(ta),
    }
}

pub fn radiation(nx: usize, ny: usize) -> RadiationForcing {
    let grid = |v| Grid2d::new(geolocation(), nx, ny, v);
    RadiationForcing {
        shortwave: grid(150.0),
        longwave: grid(270.0),
        diffuse: grid(40.0),
        solar_elevation: 15.0,
    }
}

/// Records everything pushed to it. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    surfaces: Arc<Mutex<Vec<SnowSurfaceData>>>,
    albedos: Arc<Mutex<Vec<Grid2d>>>,
    runoff: Arc<Mutex<Vec<(Timestamp, Grid2d)>>>,
}

impl Recorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface states received so far
    pub fn surfaces(&self) -> Vec<SnowSurfaceData> {
        self.surfaces.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Albedo grids received so far
    pub fn albedos(&self) -> Vec<Grid2d> {
        self.albedos.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Snowpack runoff grids received so far
    pub fn runoff(&self) -> Vec<(Timestamp, Grid2d)> {
        self.runoff.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl SnowDriftConsumer for Recorder {
    fn set_snow_surface_data(&mut self, data: SnowSurfaceData) -> Result<()> {
        if let Ok(mut surfaces) = self.surfaces.lock() {
            surfaces.push(data);
        }
        Ok(())
    }
}

impl EnergyBalanceConsumer for Recorder {
    fn set_albedo(&mut self, albedo: Grid2d) -> Result<()> {
        if let Ok(mut albedos) = self.albedos.lock() {
            albedos.push(albedo);
        }
        Ok(())
    }
}

impl RunoffConsumer for Recorder {
    fn output(&mut self, timestamp: &Timestamp, snowpack: &Grid2d, _: &Grid2d, _: &Grid2d, _: &Grid2d) -> Result<()> {
        if let Ok(mut runoff) = self.runoff.lock() {
            runoff.push((*timestamp, snowpack.clone()));
        }
        Ok(())
    }
}
