//! Georeferenced 2D grids
mod dem;

pub use dem::Dem;

use crate::partition::Slice;
use crate::types::{Error, Result};
use itertools::izip;

/// Value marking missing data.
pub const NODATA: f64 = -999.0;

/// Is `value` the missing-data marker?
pub fn is_nodata(value: f64) -> bool {
    (value - NODATA).abs() < 1e-3
}

/// Position and resolution of a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geolocation {
    /// Easting of the lower left corner
    pub xll: f64,
    /// Northing of the lower left corner
    pub yll: f64,
    /// Cell size
    pub cellsize: f64,
    /// EPSG code of the projection
    pub epsg: Option<u32>,
}

impl Geolocation {
    /// Create a new geolocation.
    pub fn new(xll: f64, yll: f64, cellsize: f64, epsg: Option<u32>) -> Self {
        Self {
            xll,
            yll,
            cellsize,
            epsg,
        }
    }

    /// Easting and northing of cell `(ix, iy)`.
    pub fn position(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            self.xll + ix as f64 * self.cellsize,
            self.yll + iy as f64 * self.cellsize,
        )
    }
}

impl Default for Geolocation {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, None)
    }
}

/// A 2D grid of scalar values stored row by row (`ix` varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2d {
    geolocation: Geolocation,
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

impl Grid2d {
    /// Create a grid filled with `value`.
    pub fn new(geolocation: Geolocation, nx: usize, ny: usize, value: f64) -> Self {
        Self {
            geolocation,
            nx,
            ny,
            data: vec![value; nx * ny],
        }
    }

    /// Create a grid from row-major data.
    pub fn from_data(geolocation: Geolocation, nx: usize, ny: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != nx * ny {
            return Err(Error::GeolocationMismatch(format!(
                "{} values given for a ({nx},{ny}) grid",
                data.len()
            )));
        }
        Ok(Self {
            geolocation,
            nx,
            ny,
            data,
        })
    }

    /// An empty grid, returned when a parameter is not available.
    pub fn empty() -> Self {
        Self {
            geolocation: Geolocation::default(),
            nx: 0,
            ny: 0,
            data: vec![],
        }
    }

    /// A grid with the same geolocation and dimensions filled with `value`.
    pub fn like(&self, value: f64) -> Self {
        Self::new(self.geolocation, self.nx, self.ny, value)
    }

    /// Is the grid empty?
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop all values.
    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    /// Number of columns
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of rows
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// The geolocation
    pub fn geolocation(&self) -> &Geolocation {
        &self.geolocation
    }

    /// The values, row by row
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The values, row by row
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Get the value at `(ix, iy)`.
    pub fn get(&self, ix: usize, iy: usize) -> Option<f64> {
        if ix < self.nx && iy < self.ny {
            Some(self.data[iy * self.nx + ix])
        } else {
            None
        }
    }

    /// Get the value at `(ix, iy)`.
    ///
    /// Panics if the cell is outside the grid.
    pub fn at(&self, ix: usize, iy: usize) -> f64 {
        assert!(ix < self.nx && iy < self.ny, "({ix},{iy}) outside grid");
        self.data[iy * self.nx + ix]
    }

    /// Set the value at `(ix, iy)`.
    pub fn set(&mut self, ix: usize, iy: usize, value: f64) {
        assert!(ix < self.nx && iy < self.ny, "({ix},{iy}) outside grid");
        self.data[iy * self.nx + ix] = value;
    }

    /// Do both grids cover the same cells?
    pub fn is_same_geolocation(&self, other: &Grid2d) -> bool {
        self.nx == other.nx && self.ny == other.ny && self.geolocation == other.geolocation
    }

    pub(crate) fn check_same_geolocation(&self, other: &Grid2d) -> Result<()> {
        if self.is_same_geolocation(other) {
            Ok(())
        } else {
            Err(Error::GeolocationMismatch(format!(
                "({},{}) grid at {:?} combined with ({},{}) grid at {:?}",
                other.nx, other.ny, other.geolocation, self.nx, self.ny, self.geolocation
            )))
        }
    }

    /// Extract the columns in `columns` over all rows.
    pub fn sub_grid(&self, columns: Slice) -> Self {
        assert!(
            columns.end() <= self.nx,
            "Columns [{}, {}) outside a grid of width {}",
            columns.offset,
            columns.end(),
            self.nx
        );
        let (xll, yll) = self.geolocation.position(columns.offset, 0);
        let geolocation = Geolocation::new(xll, yll, self.geolocation.cellsize, self.geolocation.epsg);
        let mut data = Vec::with_capacity(columns.len * self.ny);
        for row in self.data.chunks(self.nx.max(1)).take(self.ny) {
            data.extend_from_slice(&row[columns.offset..columns.end()]);
        }
        Self {
            geolocation,
            nx: columns.len,
            ny: self.ny,
            data,
        }
    }

    /// Copy `sub` into this grid starting at column `offset`.
    pub fn fill_columns(&mut self, sub: &Grid2d, offset: usize) -> Result<()> {
        if sub.ny != self.ny || offset + sub.nx > self.nx {
            return Err(Error::GeolocationMismatch(format!(
                "Can not place a ({},{}) grid at column {} of a ({},{}) grid",
                sub.nx, sub.ny, offset, self.nx, self.ny
            )));
        }
        if sub.nx == 0 {
            return Ok(());
        }
        for (row, sub_row) in izip!(self.data.chunks_mut(self.nx), sub.data.chunks(sub.nx)) {
            row[offset..offset + sub.nx].copy_from_slice(sub_row);
        }
        Ok(())
    }

    /// Multiply by `mask`; cells that are missing in either grid become missing.
    pub fn mask(&mut self, mask: &Grid2d) -> Result<()> {
        self.check_same_geolocation(mask)?;
        for (v, m) in izip!(self.data.iter_mut(), mask.data.iter()) {
            if is_nodata(*v) || is_nodata(*m) {
                *v = NODATA;
            } else {
                *v *= *m;
            }
        }
        Ok(())
    }

    /// Add `other`; cells that are missing in either grid become missing.
    pub fn add(&mut self, other: &Grid2d) -> Result<()> {
        self.check_same_geolocation(other)?;
        for (v, o) in izip!(self.data.iter_mut(), other.data.iter()) {
            if is_nodata(*v) || is_nodata(*o) {
                *v = NODATA;
            } else {
                *v += *o;
            }
        }
        Ok(())
    }

    /// Iterate over the rows from south to north.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.nx.max(1)).take(self.ny)
    }
}
