//! Initial snow cover of the cells
//!
//! On a cold start every cell starts from the profile of its land use class,
//! `{experiment}_{landuse}`. Special points may have a profile of their own,
//! `{ix}_{iy}_{experiment}`, which is tried first. On a restart every cell
//! reads its own profile.
use crate::communicator::{self, Communicator};
use crate::grid::{Dem, Grid2d};
use crate::io::ProfileStore;
use crate::model::{CellMetadata, CellProfile, SnowProfile};
use crate::partition::Slice;
use crate::special_points::SpecialPoint;
use crate::types::{Error, Result, Timestamp};
use crate::worker::{round_landuse, skip_cell};
use log::{debug, info};

/// Cells of a process as sent by the master, or why reading failed.
type SliceMessage = std::result::Result<Vec<Option<CellProfile>>, String>;

/// Reads the initial profiles of the cells.
#[derive(Debug, Clone)]
pub struct InitialState {
    store: ProfileStore,
    experiment: String,
    restart: bool,
    start: Timestamp,
}

impl InitialState {
    /// Create a reader.
    pub fn new(store: ProfileStore, experiment: &str, restart: bool, start: Timestamp) -> Self {
        Self {
            store,
            experiment: experiment.to_string(),
            restart,
            start,
        }
    }

    /// Name of the profile of a land use class.
    pub fn landuse_key(&self, landuse: u32) -> String {
        format!("{}_{landuse}", self.experiment)
    }

    /// Name of the profile of a single cell.
    pub fn cell_key(&self, ix: usize, iy: usize) -> String {
        format!("{ix}_{iy}_{}", self.experiment)
    }

    /// Read the profile of cell `(ix, iy)`.
    pub fn read_cell(&self, ix: usize, iy: usize, landuse: u32, special: bool) -> Result<SnowProfile> {
        let cell_key = self.cell_key(ix, iy);
        let key = if self.restart || (special && self.store.exists(&cell_key)) {
            cell_key
        } else {
            self.landuse_key(landuse)
        };
        let profile = self.store.read(&key)?;
        if let Some(layer) = profile.layers.iter().find(|l| l.deposition_date > self.start) {
            return Err(Error::InitialState(format!(
                "{}: layer deposited at {} is younger than the start of the simulation at {}",
                self.store.path(&key).display(),
                layer.deposition_date,
                self.start
            )));
        }
        Ok(profile)
    }

    /// Identity and position of cell `(ix, iy)`.
    pub fn metadata(&self, dem: &Dem, landuse: &Grid2d, ix: usize, iy: usize) -> CellMetadata {
        let geo = dem.elevation().geolocation();
        let (easting, northing) = geo.position(ix, iy);
        CellMetadata {
            station_id: format!("{ix}_{iy}"),
            station_name: self.cell_key(ix, iy),
            ix,
            iy,
            easting,
            northing,
            altitude: dem.elevation().at(ix, iy),
            epsg: geo.epsg,
            slope: dem.slope().at(ix, iy),
            azimuth: dem.azimuth().at(ix, iy),
            landuse: round_landuse(landuse.at(ix, iy)),
        }
    }

    /// Read the profiles of the columns in `columns`, row by row.
    ///
    /// Skipped cells are `None`. `points` must be sorted.
    pub fn read_slice(
        &self,
        dem: &Dem,
        landuse: &Grid2d,
        columns: Slice,
        points: &[SpecialPoint],
    ) -> Result<Vec<Option<CellProfile>>> {
        let mut cells = Vec::with_capacity(columns.len * dem.ny());
        for iy in 0..dem.ny() {
            for ix in columns.offset..columns.end() {
                if skip_cell(landuse.at(ix, iy), dem.elevation().at(ix, iy)) {
                    cells.push(None);
                    continue;
                }
                let meta = self.metadata(dem, landuse, ix, iy);
                let special = points.binary_search(&SpecialPoint::new(ix, iy)).is_ok();
                let profile = self.read_cell(ix, iy, meta.landuse, special)?;
                cells.push(Some(CellProfile { meta, profile }));
            }
        }
        debug!(
            "Read {} profiles for columns [{}, {})",
            cells.iter().flatten().count(),
            columns.offset,
            columns.end()
        );
        Ok(cells)
    }

    /// Read the profiles of this process's columns.
    ///
    /// With `local_io` every process reads its own files; otherwise the
    /// master reads for everybody and sends each process its columns.
    pub fn load<C: Communicator + ?Sized>(
        &self,
        comm: &C,
        local_io: bool,
        dem: &Dem,
        landuse: &Grid2d,
        points: &[SpecialPoint],
    ) -> Result<Vec<Option<CellProfile>>> {
        if local_io || comm.size() == 1 {
            return self.read_slice(dem, landuse, comm.local_slice(dem.nx()), points);
        }

        if !comm.is_master() {
            let cells: SliceMessage = communicator::receive(comm, comm.master_rank())?;
            return cells.map_err(Error::InitialState);
        }

        info!(
            "Reading the initial snow cover of {} processes",
            comm.size()
        );
        // read everything first so that a failure reaches every process
        let mut slices = Vec::with_capacity(comm.size());
        let mut failure = None;
        for rank in 0..comm.size() {
            match self.read_slice(dem, landuse, comm.slice_of(dem.nx(), rank), points) {
                Ok(cells) => slices.push(cells),
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(reason) = failure {
            for rank in (0..comm.size()).filter(|r| *r != comm.rank()) {
                let cells: SliceMessage = Err(reason.clone());
                communicator::send(comm, rank, cells)?;
            }
            return Err(Error::InitialState(reason));
        }

        let mut local = None;
        for (rank, cells) in slices.into_iter().enumerate() {
            if rank == comm.rank() {
                local = Some(cells);
            } else {
                let cells: SliceMessage = Ok(cells);
                communicator::send(comm, rank, cells)?;
            }
        }
        local.ok_or_else(|| Error::InitialState("no columns for the master".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::communicator::ChannelComm;
    use crate::grid::{Geolocation, NODATA};
    use crate::io::ProfileFormat;
    use crate::model::Layer;
    use chrono::{Duration, NaiveDate};
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    fn start() -> Timestamp {
        NaiveDate::from_ymd_opt(2020, 10, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn meta(name: &str) -> CellMetadata {
        CellMetadata {
            station_id: name.to_string(),
            station_name: name.to_string(),
            ix: 0,
            iy: 0,
            easting: 0.0,
            northing: 0.0,
            altitude: 0.0,
            epsg: None,
            slope: 0.0,
            azimuth: 0.0,
            landuse: 0,
        }
    }

    fn write_profile(dir: &Path, name: &str, thickness: f64, deposition: Timestamp) {
        ProfileStore::new(dir, ProfileFormat::Smet)
            .write(&CellProfile {
                meta: meta(name),
                profile: SnowProfile {
                    profile_date: start(),
                    soil_layers: 0,
                    albedo: 0.8,
                    layers: vec![Layer {
                        deposition_date: deposition,
                        thickness,
                        temperature: 270.0,
                        vol_ice: 0.3,
                        vol_water: 0.0,
                        grain_radius: 0.5,
                    }],
                },
            })
            .unwrap();
    }

    /// A 4 x 2 domain: land use 11 everywhere, water at (1, 0), no elevation at (3, 1).
    fn domain() -> (Dem, Grid2d) {
        let geo = Geolocation::new(1000.0, 2000.0, 100.0, Some(21781));
        let mut elevation = Grid2d::new(geo, 4, 2, 1500.0);
        elevation.set(3, 1, NODATA);
        let mut landuse = Grid2d::new(geo, 4, 2, 11.0);
        landuse.set(1, 0, 1.0);
        (Dem::new(elevation), landuse)
    }

    #[test]
    fn test_cold_start_uses_landuse_and_special_points() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "test_11", 0.2, start());
        write_profile(dir.path(), "2_1_test", 0.7, start());
        let reader = InitialState::new(ProfileStore::new(dir.path(), ProfileFormat::Smet), "test", false, start());
        let (dem, landuse) = domain();
        let points = [SpecialPoint::new(0, 0), SpecialPoint::new(2, 1)];
        let cells = reader.read_slice(&dem, &landuse, Slice::new(0, 4), &points).unwrap();
        assert_eq!(cells.len(), 8);
        assert!(cells[1].is_none());
        assert!(cells[7].is_none());
        assert_eq!(cells[0].as_ref().unwrap().profile.layers[0].thickness, 0.2);
        assert_eq!(cells[6].as_ref().unwrap().profile.layers[0].thickness, 0.7);
        // (2, 1) is only special on request
        let cells = reader.read_slice(&dem, &landuse, Slice::new(2, 1), &[]).unwrap();
        assert_eq!(cells[1].as_ref().unwrap().profile.layers[0].thickness, 0.2);
        let meta = &cells[1].as_ref().unwrap().meta;
        assert_eq!(meta.station_name, "2_1_test");
        assert_eq!(meta.station_id, "2_1");
        assert_eq!((meta.easting, meta.northing), (1200.0, 2100.0));
        assert_eq!(meta.landuse, 11);
    }

    #[test]
    fn test_restart_needs_every_cell() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "test_11", 0.2, start());
        let reader = InitialState::new(ProfileStore::new(dir.path(), ProfileFormat::Smet), "test", true, start());
        let (dem, landuse) = domain();
        let result = reader.read_slice(&dem, &landuse, Slice::new(0, 1), &[]);
        assert!(matches!(result, Err(Error::InitialState(_))));
        write_profile(dir.path(), "0_0_test", 0.4, start());
        write_profile(dir.path(), "0_1_test", 0.5, start());
        let cells = reader.read_slice(&dem, &landuse, Slice::new(0, 1), &[]).unwrap();
        assert_eq!(cells[1].as_ref().unwrap().profile.layers[0].thickness, 0.5);
    }

    #[test]
    fn test_young_layers_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "test_11", 0.2, start() + Duration::days(1));
        let reader = InitialState::new(ProfileStore::new(dir.path(), ProfileFormat::Smet), "test", false, start());
        let (dem, landuse) = domain();
        let result = reader.read_slice(&dem, &landuse, Slice::new(0, 1), &[]);
        assert!(matches!(result, Err(Error::InitialState(reason)) if reason.contains("younger")));
    }

    #[test]
    fn test_master_distributes_columns() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "test_11", 0.2, start());
        let reader = InitialState::new(ProfileStore::new(dir.path(), ProfileFormat::Smet), "test", false, start());
        let handles = ChannelComm::create(2)
            .into_iter()
            .map(|comm| {
                let reader = reader.clone();
                thread::spawn(move || {
                    let (dem, landuse) = domain();
                    let cells = reader.load(&comm, false, &dem, &landuse, &[]).unwrap();
                    (comm.rank(), cells.iter().flatten().map(|c| c.meta.ix).collect::<Vec<_>>())
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            let (rank, columns) = handle.join().unwrap();
            match rank {
                0 => assert_eq!(columns, [0, 0, 1]),
                _ => assert_eq!(columns, [2, 3, 2]),
            }
        }
    }

    #[test]
    fn test_failure_on_the_last_rank_reaches_everybody() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "test_11", 0.2, start());
        let reader = InitialState::new(ProfileStore::new(dir.path(), ProfileFormat::Smet), "test", false, start());
        let handles = ChannelComm::create(3)
            .into_iter()
            .map(|comm| {
                let reader = reader.clone();
                thread::spawn(move || {
                    let (dem, mut landuse) = domain();
                    // column 3 belongs to the last rank and has no profile
                    landuse.set(3, 0, 12.0);
                    (comm.rank(), reader.load(&comm, false, &dem, &landuse, &[]).is_err())
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            let (rank, failed) = handle.join().unwrap();
            assert!(failed, "rank {rank}");
        }
    }

    #[test]
    fn test_master_failure_reaches_everybody() {
        let dir = TempDir::new().unwrap();
        let reader = InitialState::new(ProfileStore::new(dir.path(), ProfileFormat::Smet), "test", false, start());
        let handles = ChannelComm::create(3)
            .into_iter()
            .map(|comm| {
                let reader = reader.clone();
                thread::spawn(move || {
                    let (dem, landuse) = domain();
                    reader.load(&comm, false, &dem, &landuse, &[]).is_err()
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
