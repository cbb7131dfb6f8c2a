//! A bulk temperature-index snow model
//!
//! Keeps a single snow layer per cell and melts it with a degree-day factor
//! plus a net shortwave term. Good enough to drive the coordinator in tests,
//! benchmarks and dry runs.
use super::{
    CellForcing, CellMetadata, CellModel, CellModelFactory, Layer, ModelError, PointOutput,
    SnowProfile, RHO_ICE,
};
use crate::grid::{is_nodata, NODATA};
use crate::parameters::Parameter;
use crate::types::Timestamp;

const T_MELT: f64 = 273.15;
const LATENT_HEAT_FUSION: f64 = 0.334e6;
const FRESH_SNOW_DENSITY: f64 = 100.0;
const MAX_DENSITY: f64 = 450.0;
const FRESH_ALBEDO: f64 = 0.85;
const MIN_ALBEDO: f64 = 0.5;
const SOIL_ALBEDO: f64 = 0.2;
/// Perennial snow above this water equivalent (kg/m2) is treated as glacier ice.
const GLACIER_SWE: f64 = 5000.0;

/// Parameters of the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeDayFactory {
    /// Melt per degree above freezing (kg/m2/K/day)
    pub degree_day_factor: f64,
    /// Fraction of the absorbed shortwave radiation used for melt
    pub radiation_factor: f64,
    /// Albedo decay per day
    pub albedo_decay: f64,
    /// Densification timescale (days)
    pub compaction_days: f64,
    /// Step length (s)
    pub step_seconds: f64,
    /// Compute canopy parameters
    pub use_canopy: bool,
}

impl DegreeDayFactory {
    /// Default parameters for a given step length.
    pub fn new(step_seconds: f64) -> Self {
        Self {
            degree_day_factor: 3.0,
            radiation_factor: 0.5,
            albedo_decay: 0.01,
            compaction_days: 10.0,
            step_seconds,
            use_canopy: false,
        }
    }
}

impl CellModelFactory for DegreeDayFactory {
    type Model = DegreeDayModel;

    fn create(&self, profile: SnowProfile, metadata: CellMetadata) -> Result<DegreeDayModel, ModelError> {
        let swe = profile.swe();
        let hs = profile.snow_height();
        if !swe.is_finite() || swe < 0.0 || hs < 0.0 {
            return Err(ModelError::Initialisation {
                cell: metadata.station_id,
                reason: format!("invalid snow water equivalent {swe}"),
            });
        }
        let density = if hs > 0.0 { swe / hs } else { FRESH_SNOW_DENSITY };
        let top = profile.snow_layers().last();
        Ok(DegreeDayModel {
            params: *self,
            tss: top.map(|l| l.temperature).unwrap_or(T_MELT),
            grain_radius: top.map(|l| l.grain_radius).unwrap_or(0.2),
            deposition_date: profile.oldest_deposition().unwrap_or(profile.profile_date),
            soil: profile.layers[..profile.soil_layers.min(profile.layers.len())].to_vec(),
            albedo: if swe > 0.0 { profile.albedo } else { SOIL_ALBEDO },
            profile_date: profile.profile_date,
            metadata,
            swe,
            density,
            runoff: 0.0,
            soil_runoff: 0.0,
            interception: 0.0,
            last: PointOutput::default(),
        })
    }
}

/// State of one cell.
#[derive(Debug, Clone)]
pub struct DegreeDayModel {
    params: DegreeDayFactory,
    metadata: CellMetadata,
    profile_date: Timestamp,
    deposition_date: Timestamp,
    soil: Vec<Layer>,
    swe: f64,
    density: f64,
    albedo: f64,
    tss: f64,
    grain_radius: f64,
    runoff: f64,
    soil_runoff: f64,
    interception: f64,
    last: PointOutput,
}

impl DegreeDayModel {
    fn invalid(&self, reason: String) -> ModelError {
        ModelError::InvalidForcing {
            cell: self.metadata.station_id.clone(),
            reason,
        }
    }

    fn snow_height(&self) -> f64 {
        if self.swe > 0.0 {
            self.swe / self.density
        } else {
            0.0
        }
    }
}

impl CellModel for DegreeDayModel {
    fn step(&mut self, timestamp: &Timestamp, forcing: &CellForcing) -> Result<(), ModelError> {
        for (name, value) in [
            ("TA", forcing.ta),
            ("PSUM", forcing.psum),
            ("PSUM_PH", forcing.psum_ph),
            ("ISWR", forcing.iswr),
        ] {
            if is_nodata(value) || !value.is_finite() {
                return Err(self.invalid(format!("{name} is missing")));
            }
        }
        let days = self.params.step_seconds / 86400.0;

        let snowfall = forcing.psum * (1.0 - forcing.psum_ph);
        let rain = forcing.psum * forcing.psum_ph;
        let had_snow = self.swe > 0.0;
        let new_swe = (self.swe + snowfall + forcing.mns).max(0.0);
        if new_swe > 0.0 {
            // mix fresh snow into the bulk density
            let old_height = self.snow_height();
            let fresh_height = (snowfall + forcing.mns.max(0.0)) / FRESH_SNOW_DENSITY;
            self.density = (new_swe / (old_height + fresh_height).max(1e-6)).min(MAX_DENSITY);
        }
        if !had_snow && new_swe > 0.0 {
            self.deposition_date = *timestamp;
        }
        self.swe = new_swe;

        if snowfall > 1.0 {
            self.albedo = FRESH_ALBEDO;
        } else if self.swe > 0.0 {
            self.albedo = (self.albedo - self.params.albedo_decay * days).max(MIN_ALBEDO);
        } else {
            self.albedo = SOIL_ALBEDO;
        }

        let temperature_melt = self.params.degree_day_factor * (forcing.ta - T_MELT).max(0.0) * days;
        let radiation_melt = self.params.radiation_factor * (1.0 - self.albedo) * forcing.iswr
            * self.params.step_seconds
            / LATENT_HEAT_FUSION;
        let melt = if forcing.ta > T_MELT - 2.0 {
            (temperature_melt + radiation_melt).min(self.swe)
        } else {
            temperature_melt.min(self.swe)
        };
        self.swe -= melt;

        if self.swe > 0.0 {
            self.runoff = melt + rain;
            self.soil_runoff = 0.0;
            self.density += (MAX_DENSITY - self.density) * (days / self.params.compaction_days).min(1.0);
            self.grain_radius = (self.grain_radius + 0.01 * days).min(2.0);
        } else {
            self.runoff = melt;
            self.soil_runoff = rain;
            self.density = FRESH_SNOW_DENSITY;
            self.grain_radius = 0.2;
        }
        if !self.runoff.is_finite() || !self.swe.is_finite() {
            return Err(ModelError::Diverged {
                cell: self.metadata.station_id.clone(),
                reason: format!("swe={} runoff={}", self.swe, self.runoff),
            });
        }

        self.tss = if self.swe > 0.0 {
            forcing.ta.min(T_MELT)
        } else {
            forcing.ta
        };
        if self.params.use_canopy {
            self.interception = (self.interception + 0.1 * forcing.psum).min(2.0) * (1.0 - 0.1 * days).max(0.0);
        }
        self.profile_date = *timestamp;

        let cos_slope = self.metadata.slope.to_radians().cos();
        self.last = PointOutput {
            ta: forcing.ta,
            tss: self.tss,
            tsg: if self.swe > 0.0 { T_MELT } else { forcing.ta },
            vw: forcing.vw,
            dw: NODATA,
            vw_max: forcing.vw,
            iswr: forcing.iswr,
            rswr: self.albedo * forcing.iswr,
            ilwr: forcing.ilwr,
            psum: forcing.psum,
            psum_ph: forcing.psum_ph,
            hs: self.snow_height() * cos_slope,
            rh: forcing.rh,
            swe: self.swe,
            albedo: self.albedo,
            runoff: self.runoff,
            tsoil: self.soil.last().map(|l| l.temperature),
            iswr_canopy: self.params.use_canopy.then_some(forcing.iswr * 0.6),
            rswr_canopy: self
                .params
                .use_canopy
                .then_some(forcing.iswr * 0.6 * self.albedo),
        };
        Ok(())
    }

    fn value(&self, parameter: Parameter) -> Option<f64> {
        let snow = self.swe > 0.0;
        match parameter {
            Parameter::Hs => Some(self.snow_height()),
            Parameter::Swe => Some(self.swe),
            Parameter::Tss => Some(self.tss),
            Parameter::Tsg => Some(if snow { T_MELT } else { self.tss }),
            Parameter::TopAlb => Some(self.albedo),
            Parameter::Sp => Some(if snow { 0.5 } else { NODATA }),
            Parameter::Rg => Some(if snow { self.grain_radius } else { NODATA }),
            Parameter::N3 => Some(if snow { 1.0 / (self.grain_radius * 1e-3).powi(2) } else { NODATA }),
            Parameter::Rb => Some(if snow { 0.4 * self.grain_radius } else { NODATA }),
            Parameter::Glacier => Some(if self.swe > GLACIER_SWE { NODATA } else { 1.0 }),
            Parameter::MsSnowpackRunoff => Some(self.runoff),
            Parameter::MsSoilRunoff => Some(self.soil_runoff),
            Parameter::CanopyInterception => self.params.use_canopy.then_some(self.interception),
            Parameter::CanopyTemperature => self.params.use_canopy.then_some(self.last.ta),
            _ => None,
        }
    }

    fn point_output(&self) -> PointOutput {
        self.last.clone()
    }

    fn profile(&self) -> SnowProfile {
        let mut layers = self.soil.clone();
        if self.swe > 0.0 {
            let hs = self.snow_height();
            layers.push(Layer {
                deposition_date: self.deposition_date,
                thickness: hs,
                temperature: self.tss,
                vol_ice: self.swe / (hs * RHO_ICE),
                vol_water: 0.0,
                grain_radius: self.grain_radius,
            });
        }
        SnowProfile {
            profile_date: self.profile_date,
            soil_layers: self.soil.len(),
            albedo: self.albedo,
            layers,
        }
    }

    fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }
}
