//! Identities of the gridded parameters
use crate::types::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Parameters that can be requested as full-domain grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    /// Air temperature (K)
    Ta,
    /// Relative humidity (1)
    Rh,
    /// Wind speed (m/s)
    Vw,
    /// Precipitation sum over the step (kg/m2)
    Psum,
    /// Precipitation phase, 0 for solid and 1 for liquid
    PsumPh,
    /// Incoming shortwave radiation (W/m2)
    Iswr,
    /// Incoming longwave radiation (W/m2)
    Ilwr,
    /// Snow height (m)
    Hs,
    /// Snow water equivalent (kg/m2)
    Swe,
    /// Snow surface temperature (K)
    Tss,
    /// Ground surface temperature (K)
    Tsg,
    /// Albedo of the top layer (1)
    TopAlb,
    /// Sphericity of the surface grains (1)
    Sp,
    /// Grain radius of the surface grains (mm)
    Rg,
    /// Number of grains per unit area (1/m2)
    N3,
    /// Bond radius of the surface grains (mm)
    Rb,
    /// Glacier mask
    Glacier,
    /// Runoff out of the snowpack (kg/m2)
    MsSnowpackRunoff,
    /// Runoff out of the soil (kg/m2)
    MsSoilRunoff,
    /// Water intercepted by the canopy (kg/m2)
    CanopyInterception,
    /// Temperature of the canopy (K)
    CanopyTemperature,
}

impl Parameter {
    /// Every parameter.
    pub const ALL: [Parameter; 21] = [
        Parameter::Ta,
        Parameter::Rh,
        Parameter::Vw,
        Parameter::Psum,
        Parameter::PsumPh,
        Parameter::Iswr,
        Parameter::Ilwr,
        Parameter::Hs,
        Parameter::Swe,
        Parameter::Tss,
        Parameter::Tsg,
        Parameter::TopAlb,
        Parameter::Sp,
        Parameter::Rg,
        Parameter::N3,
        Parameter::Rb,
        Parameter::Glacier,
        Parameter::MsSnowpackRunoff,
        Parameter::MsSoilRunoff,
        Parameter::CanopyInterception,
        Parameter::CanopyTemperature,
    ];

    /// Parameters describing the snow surface, as needed by snow drift.
    pub const SNOW_SURFACE: [Parameter; 5] = [
        Parameter::Hs,
        Parameter::Sp,
        Parameter::Rg,
        Parameter::N3,
        Parameter::Rb,
    ];

    /// Name of the parameter
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Ta => "TA",
            Parameter::Rh => "RH",
            Parameter::Vw => "VW",
            Parameter::Psum => "PSUM",
            Parameter::PsumPh => "PSUM_PH",
            Parameter::Iswr => "ISWR",
            Parameter::Ilwr => "ILWR",
            Parameter::Hs => "HS",
            Parameter::Swe => "SWE",
            Parameter::Tss => "TSS",
            Parameter::Tsg => "TSG",
            Parameter::TopAlb => "TOP_ALB",
            Parameter::Sp => "SP",
            Parameter::Rg => "RG",
            Parameter::N3 => "N3",
            Parameter::Rb => "RB",
            Parameter::Glacier => "GLACIER",
            Parameter::MsSnowpackRunoff => "MS_SNOWPACK_RUNOFF",
            Parameter::MsSoilRunoff => "MS_SOIL_RUNOFF",
            Parameter::CanopyInterception => "CAN_INT",
            Parameter::CanopyTemperature => "CAN_TEMP",
        }
    }

    /// Is this a forcing grid held by the coordinator rather than the workers?
    pub fn is_forcing(&self) -> bool {
        matches!(
            self,
            Parameter::Ta
                | Parameter::Rh
                | Parameter::Vw
                | Parameter::Psum
                | Parameter::PsumPh
                | Parameter::Iswr
                | Parameter::Ilwr
        )
    }

    /// Is this a standard meteorological grid that grid writers know how to name?
    pub fn is_meteo_grid(&self) -> bool {
        self.is_forcing()
            || matches!(
                self,
                Parameter::Hs | Parameter::Swe | Parameter::Tss | Parameter::Tsg
            )
    }

    /// Is this parameter only computed when the canopy module is enabled?
    pub fn is_canopy(&self) -> bool {
        matches!(
            self,
            Parameter::CanopyInterception | Parameter::CanopyTemperature
        )
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Parameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Parameter::ALL
            .iter()
            .find(|p| p.name() == upper)
            .copied()
            .ok_or_else(|| Error::UnknownParameter(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for p in Parameter::ALL {
            assert_eq!(p.name().parse::<Parameter>().unwrap(), p);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("top_alb".parse::<Parameter>().unwrap(), Parameter::TopAlb);
        assert_eq!(" hs ".parse::<Parameter>().unwrap(), Parameter::Hs);
    }

    #[test]
    fn test_unknown() {
        assert!(matches!(
            "SNOWFLAKES".parse::<Parameter>(),
            Err(Error::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_forcing() {
        assert_eq!(Parameter::ALL.iter().filter(|p| p.is_forcing()).count(), 7);
        assert!(!Parameter::Hs.is_forcing());
        assert!(Parameter::Hs.is_meteo_grid());
        assert!(!Parameter::TopAlb.is_meteo_grid());
    }
}
