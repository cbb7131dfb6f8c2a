//! Special points: cells with time series and profile output
use crate::communicator::{self, Communicator};
use crate::config::OutputConfig;
use crate::io::{PointWriter, ProfileStore};
use crate::model::{CellModel, CellProfile, PointSnapshot};
use crate::schedule::is_due;
use crate::types::{Result, Timestamp};
use crate::worker::SliceWorker;
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A cell identified by its column and row.
///
/// Points are ordered by row, then by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecialPoint {
    /// Column
    pub ix: usize,
    /// Row
    pub iy: usize,
}

impl SpecialPoint {
    /// Create a point.
    pub fn new(ix: usize, iy: usize) -> Self {
        Self { ix, iy }
    }
}

impl Ord for SpecialPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.iy, self.ix).cmp(&(other.iy, other.ix))
    }
}

impl PartialOrd for SpecialPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bring special points into their canonical order.
///
/// Points outside of the `nx` x `ny` domain and duplicates are dropped with
/// a warning.
pub fn prepare_points(points: &[SpecialPoint], nx: usize, ny: usize) -> Vec<SpecialPoint> {
    let mut seen = HashSet::new();
    let mut prepared = vec![];
    for p in points {
        if p.ix >= nx || p.iy >= ny {
            warn!("Special point ({},{}) is outside of the domain, ignoring it", p.ix, p.iy);
        } else if !seen.insert(*p) {
            warn!("Duplicate special point ({},{}), ignoring it", p.ix, p.iy);
        } else {
            prepared.push(*p);
        }
    }
    prepared.sort();
    prepared
}

/// Collect the special point output of a step.
///
/// Workers are visited one after the other in the order they are given and
/// every worker's buffer is emptied. Unless `local_io` is set, the output of
/// all processes ends up on the master, which gets it in rank order; the
/// other processes then return nothing.
pub fn gather<M: CellModel, C: Communicator + ?Sized>(
    workers: &mut [SliceWorker<M>],
    comm: &C,
    local_io: bool,
) -> Result<Vec<PointSnapshot>> {
    let mut snapshots = vec![];
    for worker in workers.iter_mut() {
        snapshots.extend(worker.take_special_point_output());
    }
    if local_io || comm.size() == 1 {
        return Ok(snapshots);
    }

    if comm.is_master() {
        for rank in 0..comm.size() {
            if rank == comm.rank() {
                continue;
            }
            let remote: Vec<PointSnapshot> = communicator::receive(comm, rank)?;
            snapshots.extend(remote);
        }
        Ok(snapshots)
    } else {
        communicator::send(comm, comm.master_rank(), snapshots)?;
        Ok(vec![])
    }
}

/// Writes the gathered special point output.
#[derive(Debug)]
pub struct SpecialPointOutput {
    writer: PointWriter,
    snow_store: Option<ProfileStore>,
    snow_written: HashSet<String>,
    output: OutputConfig,
    step_minutes: f64,
}

impl SpecialPointOutput {
    /// Create the output.
    ///
    /// `snow_store` receives a snow cover file of every special point the
    /// first time it is written; pass `None` when the snow cover of the
    /// whole domain is written anyway.
    pub fn new(output: &OutputConfig, use_canopy: bool, snow_store: Option<ProfileStore>, step_minutes: f64) -> Self {
        Self {
            writer: PointWriter::new(
                output.meteo_path.clone(),
                output.time_zone,
                use_canopy,
                output.soil_temperature_depth.is_some(),
            ),
            snow_store,
            snow_written: HashSet::new(),
            output: output.clone(),
            step_minutes,
        }
    }

    /// Write the snapshots of one step.
    pub fn write(&mut self, timestamp: &Timestamp, snapshots: &[PointSnapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let out = &self.output;
        let time_series = out.ts_write && is_due(timestamp, out.ts_days_between, out.ts_start, self.step_minutes);
        let profiles = out.prof_write && is_due(timestamp, out.prof_days_between, out.prof_start, self.step_minutes);
        debug!(
            "Writing {} special points at {timestamp} (time series: {time_series}, profiles: {profiles})",
            snapshots.len()
        );

        for snapshot in snapshots {
            self.writer.write_smet(snapshot)?;
            if time_series {
                self.writer.write_time_series(snapshot)?;
            }
            if profiles {
                self.writer.write_profile(snapshot)?;
            }
            if let Some(store) = &self.snow_store {
                if self.snow_written.insert(snapshot.meta.station_name.clone()) {
                    store.write(&CellProfile {
                        meta: snapshot.meta.clone(),
                        profile: snapshot.profile.clone(),
                    })?;
                }
            }
        }
        Ok(())
    }
}
