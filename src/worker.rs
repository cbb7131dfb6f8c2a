//! Worker owning the cells of a contiguous column range
use crate::grid::{is_nodata, Geolocation, Grid2d, NODATA};
use crate::model::{CellForcing, CellModel, CellProfile, PointSnapshot};
use crate::parameters::Parameter;
use crate::partition::Slice;
use crate::special_points::SpecialPoint;
use crate::types::Timestamp;
use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Land use code of water bodies.
pub const WATER_LANDUSE: u32 = 1;

/// Convert a land use grid value into a land use code.
///
/// Values above 10000 are PREVAH-style codes (`10000 + 100 * code`).
pub fn round_landuse(value: f64) -> u32 {
    let code = if value >= 10000.0 {
        (value - 10000.0) / 100.0
    } else {
        value
    };
    code.round().max(0.0) as u32
}

/// Cells without data and water bodies are not simulated.
pub fn skip_cell(landuse: f64, elevation: f64) -> bool {
    is_nodata(landuse) || is_nodata(elevation) || round_landuse(landuse) == WATER_LANDUSE
}

/// The forcing of a worker for one step, restricted to the worker's columns.
#[derive(Debug, Clone)]
pub struct SliceForcing {
    /// Air temperature
    pub ta: Grid2d,
    /// Relative humidity
    pub rh: Grid2d,
    /// Wind speed
    pub vw: Grid2d,
    /// Precipitation sum
    pub psum: Grid2d,
    /// Precipitation phase
    pub psum_ph: Grid2d,
    /// Incoming shortwave radiation
    pub iswr: Grid2d,
    /// Diffuse shortwave radiation
    pub diffuse: Grid2d,
    /// Incoming longwave radiation
    pub ilwr: Grid2d,
    /// Snow mass change, when a drift module is attached
    pub mns: Option<Grid2d>,
    /// Solar elevation (degrees)
    pub solar_elevation: f64,
}

impl SliceForcing {
    fn cell(&self, ix: usize, iy: usize) -> CellForcing {
        CellForcing {
            ta: self.ta.at(ix, iy),
            rh: self.rh.at(ix, iy),
            vw: self.vw.at(ix, iy),
            psum: self.psum.at(ix, iy),
            psum_ph: self.psum_ph.at(ix, iy),
            iswr: self.iswr.at(ix, iy),
            diffuse: self.diffuse.at(ix, iy),
            ilwr: self.ilwr.at(ix, iy),
            mns: self
                .mns
                .as_ref()
                .map(|g| g.at(ix, iy))
                .filter(|v| !is_nodata(*v))
                .unwrap_or(0.0),
            solar_elevation: self.solar_elevation,
        }
    }
}

/// Runs the cell models of one column range.
pub struct SliceWorker<M: CellModel> {
    slice: Slice,
    ny: usize,
    geolocation: Geolocation,
    cells: Vec<Option<M>>,
    special_points: Vec<SpecialPoint>,
    output: Vec<PointSnapshot>,
    use_drift: bool,
}

impl<M: CellModel> SliceWorker<M> {
    /// Create a worker.
    ///
    /// `slice` is the global column range, `geolocation` the one of the
    /// worker's sub-grid and `cells` the models row by row over the slice
    /// (`None` for skipped cells). `special_points` use global coordinates.
    pub fn new(
        slice: Slice,
        ny: usize,
        geolocation: Geolocation,
        cells: Vec<Option<M>>,
        special_points: &[SpecialPoint],
    ) -> Self {
        assert_eq!(
            cells.len(),
            slice.len * ny,
            "A ({},{}) slice needs {} cells",
            slice.len,
            ny,
            slice.len * ny
        );
        let special_points = special_points
            .iter()
            .filter(|p| slice.contains(p.ix) && p.iy < ny)
            .map(|p| SpecialPoint::new(p.ix - slice.offset, p.iy))
            .collect();
        Self {
            slice,
            ny,
            geolocation,
            cells,
            special_points,
            output: vec![],
            use_drift: false,
        }
    }

    /// The global column range
    pub fn slice(&self) -> Slice {
        self.slice
    }

    /// Special points of this worker, in slice-local coordinates
    pub fn special_points(&self) -> &[SpecialPoint] {
        &self.special_points
    }

    /// Number of cells holding a model
    pub fn modelled_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Forward snow mass changes to the cells.
    pub fn set_use_drift(&mut self, use_drift: bool) {
        self.use_drift = use_drift;
    }

    fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.slice.len + ix
    }

    /// Step every cell of the slice.
    ///
    /// A failing or panicking cell does not stop the others. Returns the
    /// number of failed cells as error.
    pub fn run_step(&mut self, timestamp: &Timestamp, forcing: &SliceForcing) -> Result<(), usize> {
        let nx = self.slice.len;
        let mut failed = vec![];
        for (index, cell) in self.cells.iter_mut().enumerate() {
            let Some(model) = cell else { continue };
            let mut cell_forcing = forcing.cell(index % nx, index / nx);
            if !self.use_drift {
                cell_forcing.mns = 0.0;
            }
            match catch_unwind(AssertUnwindSafe(|| model.step(timestamp, &cell_forcing))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("{e}");
                    failed.push(index);
                }
                Err(_) => {
                    error!(
                        "Cell {} panicked at {timestamp}",
                        model.metadata().station_id
                    );
                    failed.push(index);
                }
            }
        }

        for point in &self.special_points {
            let index = self.index(point.ix, point.iy);
            if failed.binary_search(&index).is_ok() {
                continue;
            }
            if let Some(model) = &self.cells[index] {
                self.output.push(model.snapshot(timestamp));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(failed.len())
        }
    }

    /// The worker's part of a gridded parameter.
    ///
    /// Skipped cells are [NODATA]. Returns `None` if a simulated cell does
    /// not provide `parameter`.
    pub fn get_grid(&self, parameter: Parameter) -> Option<Grid2d> {
        let mut grid = Grid2d::new(self.geolocation, self.slice.len, self.ny, NODATA);
        for (value, cell) in grid.data_mut().iter_mut().zip(&self.cells) {
            if let Some(model) = cell {
                *value = model.value(parameter)?;
            }
        }
        Some(grid)
    }

    /// Take the buffered special point output.
    pub fn take_special_point_output(&mut self) -> Vec<PointSnapshot> {
        std::mem::take(&mut self.output)
    }

    /// Drop the buffered special point output.
    pub fn clear_special_points(&mut self) {
        self.output.clear();
    }

    /// Profiles of every simulated cell.
    pub fn profiles(&self) -> Vec<CellProfile> {
        self.cells
            .iter()
            .flatten()
            .map(|m| CellProfile {
                meta: m.metadata().clone(),
                profile: m.profile(),
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CellMetadata, ModelError, PointOutput, SnowProfile};
    use chrono::NaiveDate;

    /// Stores a constant and fails or panics on demand.
    struct Constant {
        meta: CellMetadata,
        value: f64,
        fail: bool,
        panic: bool,
        steps: usize,
    }

    impl CellModel for Constant {
        fn step(&mut self, _: &Timestamp, forcing: &CellForcing) -> Result<(), ModelError> {
            if self.panic {
                panic!("boom");
            }
            if self.fail {
                return Err(ModelError::Diverged {
                    cell: self.meta.station_id.clone(),
                    reason: "test".to_string(),
                });
            }
            self.steps += 1;
            self.value += forcing.mns;
            Ok(())
        }

        fn value(&self, parameter: Parameter) -> Option<f64> {
            match parameter {
                Parameter::Hs => Some(self.value),
                Parameter::Swe => Some(self.steps as f64),
                _ => None,
            }
        }

        fn point_output(&self) -> PointOutput {
            PointOutput {
                hs: self.value,
                ..Default::default()
            }
        }

        fn profile(&self) -> SnowProfile {
            SnowProfile {
                profile_date: timestamp(),
                soil_layers: 0,
                albedo: 0.5,
                layers: vec![],
            }
        }

        fn metadata(&self) -> &CellMetadata {
            &self.meta
        }
    }

    fn timestamp() -> Timestamp {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn constant(ix: usize, iy: usize, value: f64) -> Constant {
        Constant {
            meta: CellMetadata {
                station_id: format!("{ix}_{iy}"),
                station_name: format!("{ix}_{iy}_test"),
                ix,
                iy,
                easting: 0.0,
                northing: 0.0,
                altitude: 0.0,
                epsg: None,
                slope: 0.0,
                azimuth: 0.0,
                landuse: 11,
            },
            value,
            fail: false,
            panic: false,
            steps: 0,
        }
    }

    /// A worker over global columns [2, 5) of a 3 row domain.
    fn worker() -> SliceWorker<Constant> {
        let slice = Slice::new(2, 3);
        let mut cells = vec![];
        for iy in 0..3 {
            for ix in slice.offset..slice.end() {
                cells.push(if ix == 3 && iy == 1 {
                    None
                } else {
                    Some(constant(ix, iy, 1.0))
                });
            }
        }
        SliceWorker::new(
            slice,
            3,
            Geolocation::default(),
            cells,
            &[SpecialPoint::new(0, 0), SpecialPoint::new(2, 0), SpecialPoint::new(4, 2)],
        )
    }

    fn forcing(mns: f64) -> SliceForcing {
        let g = Grid2d::new(Geolocation::default(), 3, 3, 0.0);
        SliceForcing {
            ta: g.clone(),
            rh: g.clone(),
            vw: g.clone(),
            psum: g.clone(),
            psum_ph: g.clone(),
            iswr: g.clone(),
            diffuse: g.clone(),
            ilwr: g.clone(),
            mns: Some(g.like(mns)),
            solar_elevation: 0.0,
        }
    }

    #[test]
    fn test_skip_cell() {
        assert!(skip_cell(NODATA, 1000.0));
        assert!(skip_cell(11.0, NODATA));
        assert!(skip_cell(1.0, 1000.0));
        assert!(skip_cell(10100.0, 1000.0));
        assert!(!skip_cell(11.0, 1000.0));
        assert!(!skip_cell(11100.0, 1000.0));
        assert_eq!(round_landuse(11100.0), 11);
        assert_eq!(round_landuse(10.6), 11);
    }

    #[test]
    fn test_special_points_are_local() {
        let w = worker();
        assert_eq!(w.special_points(), &[SpecialPoint::new(0, 0), SpecialPoint::new(2, 2)]);
        assert_eq!(w.modelled_cells(), 8);
    }

    #[test]
    fn test_grid_has_nodata_at_skipped_cells() {
        let w = worker();
        let grid = w.get_grid(Parameter::Hs).unwrap();
        assert_eq!(grid.nx(), 3);
        assert_eq!(grid.at(1, 1), NODATA);
        assert_eq!(grid.at(0, 0), 1.0);
        assert!(w.get_grid(Parameter::TopAlb).is_none());
    }

    #[test]
    fn test_drift_only_when_enabled() {
        let mut w = worker();
        w.run_step(&timestamp(), &forcing(2.0)).unwrap();
        assert_eq!(w.get_grid(Parameter::Hs).unwrap().at(0, 0), 1.0);
        w.set_use_drift(true);
        w.run_step(&timestamp(), &forcing(2.0)).unwrap();
        assert_eq!(w.get_grid(Parameter::Hs).unwrap().at(0, 0), 3.0);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut w = worker();
        w.cells[0].as_mut().unwrap().fail = true;
        w.cells[5].as_mut().unwrap().panic = true;
        assert_eq!(w.run_step(&timestamp(), &forcing(0.0)), Err(2));
        let steps = w.get_grid(Parameter::Swe).unwrap();
        assert_eq!(steps.at(0, 0), 0.0);
        assert_eq!(steps.at(1, 0), 1.0);
        assert_eq!(steps.at(2, 2), 1.0);
        // the failed special point has no output, the other one has
        let output = w.take_special_point_output();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].meta.station_id, "4_2");
    }

    #[test]
    fn test_special_point_buffer() {
        let mut w = worker();
        w.run_step(&timestamp(), &forcing(0.0)).unwrap();
        w.run_step(&timestamp(), &forcing(0.0)).unwrap();
        assert_eq!(w.take_special_point_output().len(), 4);
        assert!(w.take_special_point_output().is_empty());
        w.run_step(&timestamp(), &forcing(0.0)).unwrap();
        w.clear_special_points();
        assert!(w.take_special_point_output().is_empty());
        assert_eq!(w.profiles().len(), 8);
    }
}
