//! Air temperature over glaciers
//!
//! Air flowing down a glacier is cooled by the ice. Where the forcing air
//! temperature of a glaciated, snow covered cell is above the surface
//! temperature, it is pulled towards the surface temperature by
//! [KATABATIC_COOLING] of the difference.
use crate::grid::{is_nodata, Grid2d};
use crate::types::Result;
use itertools::izip;

/// Share of the air to surface temperature difference removed over glaciers.
pub const KATABATIC_COOLING: f64 = 0.4;

/// Correct `ta` over the glaciated cells of `glacier_mask` (missing where
/// glaciated). Returns the number of corrected cells.
pub fn correct_temperatures(ta: &mut Grid2d, glacier_mask: &Grid2d, hs: &Grid2d, tss: &Grid2d) -> Result<usize> {
    ta.check_same_geolocation(glacier_mask)?;
    ta.check_same_geolocation(hs)?;
    ta.check_same_geolocation(tss)?;
    let mut corrected = 0;
    for (t, m, h, s) in izip!(ta.data_mut().iter_mut(), glacier_mask.data(), hs.data(), tss.data()) {
        if !is_nodata(*m) || is_nodata(*t) || is_nodata(*h) || is_nodata(*s) {
            continue;
        }
        if *h > 0.0 && *t > *s {
            *t -= KATABATIC_COOLING * (*t - *s);
            corrected += 1;
        }
    }
    Ok(corrected)
}
