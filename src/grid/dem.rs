//! Digital elevation model
use super::{is_nodata, Grid2d, NODATA};
use crate::partition::Slice;

/// Elevation grid with derived slope and azimuth.
#[derive(Debug, Clone, PartialEq)]
pub struct Dem {
    elevation: Grid2d,
    slope: Grid2d,
    azimuth: Grid2d,
}

impl Dem {
    /// Create a DEM and compute slope and azimuth (both in degrees, azimuth
    /// clockwise from north, pointing downslope).
    pub fn new(elevation: Grid2d) -> Self {
        let mut slope = elevation.like(NODATA);
        let mut azimuth = elevation.like(NODATA);
        let cellsize = elevation.geolocation().cellsize;

        for iy in 0..elevation.ny() {
            for ix in 0..elevation.nx() {
                if is_nodata(elevation.at(ix, iy)) {
                    continue;
                }
                let dzdx = gradient(&elevation, ix, iy, cellsize, true);
                let dzdy = gradient(&elevation, ix, iy, cellsize, false);
                let (s, a) = slope_azimuth(dzdx, dzdy);
                slope.set(ix, iy, s);
                azimuth.set(ix, iy, a);
            }
        }
        Self {
            elevation,
            slope,
            azimuth,
        }
    }

    /// Elevation grid
    pub fn elevation(&self) -> &Grid2d {
        &self.elevation
    }

    /// Slope angle grid
    pub fn slope(&self) -> &Grid2d {
        &self.slope
    }

    /// Azimuth grid
    pub fn azimuth(&self) -> &Grid2d {
        &self.azimuth
    }

    /// Number of columns
    pub fn nx(&self) -> usize {
        self.elevation.nx()
    }

    /// Number of rows
    pub fn ny(&self) -> usize {
        self.elevation.ny()
    }

    /// Restrict the DEM to a range of columns, keeping the slopes computed on
    /// the full domain.
    pub fn sub_dem(&self, columns: Slice) -> Self {
        Self {
            elevation: self.elevation.sub_grid(columns),
            slope: self.slope.sub_grid(columns),
            azimuth: self.azimuth.sub_grid(columns),
        }
    }
}

/// Centred difference when both neighbours exist, one-sided otherwise.
fn gradient(grid: &Grid2d, ix: usize, iy: usize, cellsize: f64, along_x: bool) -> f64 {
    let neighbour = |offset: isize| -> Option<f64> {
        let (x, y) = if along_x {
            (ix as isize + offset, iy as isize)
        } else {
            (ix as isize, iy as isize + offset)
        };
        if x < 0 || y < 0 {
            return None;
        }
        grid.get(x as usize, y as usize).filter(|v| !is_nodata(*v))
    };
    let centre = grid.at(ix, iy);
    match (neighbour(-1), neighbour(1)) {
        (Some(lo), Some(hi)) => (hi - lo) / (2.0 * cellsize),
        (None, Some(hi)) => (hi - centre) / cellsize,
        (Some(lo), None) => (centre - lo) / cellsize,
        (None, None) => 0.0,
    }
}

fn slope_azimuth(dzdx: f64, dzdy: f64) -> (f64, f64) {
    let slope = (dzdx * dzdx + dzdy * dzdy).sqrt().atan().to_degrees();
    if dzdx == 0.0 && dzdy == 0.0 {
        return (0.0, 0.0);
    }
    // rows increase towards the north, downslope is the negative gradient
    let azimuth = (-dzdx).atan2(-dzdy).to_degrees();
    (slope, (azimuth + 360.0) % 360.0)
}
