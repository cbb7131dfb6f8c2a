//! The step coordinator
//!
//! The coordinator owns the full-domain forcing grids, waits until every
//! attached producer has delivered the data of the next step and then steps
//! all workers of the process in parallel. Results are reduced over all
//! processes before they are handed to the consumers and to the output.
//!
//! Every process must call the same methods in the same order: most of them
//! end in a collective operation of the communicator.
use crate::communicator::{self, all_reduce_count, Communicator};
use crate::config::{FailurePolicy, SnowpackConfig};
use crate::consumers::{EnergyBalanceConsumer, RunoffConsumer, SnowDriftConsumer, SnowSurfaceData};
use crate::glaciers::correct_temperatures;
use crate::grid::{Dem, Geolocation, Grid2d, NODATA};
use crate::initial_state::InitialState;
use crate::io::{AsciiGridWriter, GridWriter, ProfileStore};
use crate::model::{CellModel, CellModelFactory, CellProfile};
use crate::parameters::Parameter;
use crate::partition::{partition, Slice};
use crate::schedule::is_due;
use crate::special_points::{gather, prepare_points, SpecialPoint, SpecialPointOutput};
use crate::types::{DataKind, Error, Result, Timestamp};
use crate::worker::{SliceForcing, SliceWorker};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::{Duration, Instant};

/// Static description of the simulated domain.
#[derive(Debug, Clone)]
pub struct Domain {
    /// Elevation, slope and azimuth
    pub dem: Dem,
    /// Land use grid
    pub landuse: Grid2d,
    /// Cells with time series output
    pub special_points: Vec<SpecialPoint>,
}

/// Meteorological forcing of one step.
#[derive(Debug, Clone)]
pub struct MeteoForcing {
    /// Precipitation sum
    pub psum: Grid2d,
    /// Precipitation phase
    pub psum_ph: Grid2d,
    /// Wind speed
    pub vw: Grid2d,
    /// Relative humidity
    pub rh: Grid2d,
    /// Air temperature
    pub ta: Grid2d,
}

/// Radiation forcing of one step.
#[derive(Debug, Clone)]
pub struct RadiationForcing {
    /// Incoming shortwave radiation
    pub shortwave: Grid2d,
    /// Incoming longwave radiation
    pub longwave: Grid2d,
    /// Diffuse shortwave radiation
    pub diffuse: Grid2d,
    /// Solar elevation (degrees)
    pub solar_elevation: f64,
}

/// Which producers have delivered the data of the next step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Meteorological forcing
    pub meteo: bool,
    /// Radiation
    pub radiation: bool,
    /// Snow mass change from drift
    pub snow_drift: bool,
    /// Data assimilation
    pub assimilation: bool,
}

/// Outcome of pushing data into the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Still waiting for other producers
    Pending,
    /// The step at the given timestamp has been computed
    Completed(Timestamp),
}

/// Drives the snow cover simulation of one process.
pub struct SnowpackCoordinator<M: CellModel, C: Communicator> {
    config: SnowpackConfig,
    comm: C,
    pool: ThreadPool,
    dem: Dem,
    workers: Vec<SliceWorker<M>>,
    has_special_points: bool,
    point_output: SpecialPointOutput,
    grid_writer: Box<dyn GridWriter>,
    output_parameters: Vec<Parameter>,

    ta: Grid2d,
    rh: Grid2d,
    vw: Grid2d,
    psum: Grid2d,
    psum_ph: Grid2d,
    shortwave: Grid2d,
    longwave: Grid2d,
    diffuse: Grid2d,
    solar_elevation: f64,
    mns: Grid2d,
    glacier_mask: Option<Grid2d>,

    drift: Option<Box<dyn SnowDriftConsumer>>,
    energy_balance: Option<Box<dyn EnergyBalanceConsumer>>,
    runoff: Option<Box<dyn RunoffConsumer>>,
    assimilation: bool,

    readiness: Readiness,
    next: Timestamp,
    last_step: Duration,
    poisoned: bool,
}

impl<M: CellModel, C: Communicator> SnowpackCoordinator<M, C> {
    /// Set up the workers of this process and read their initial snow cover.
    ///
    /// `start` is the timestamp of the first step.
    pub fn new<F: CellModelFactory<Model = M>>(
        config: SnowpackConfig,
        domain: Domain,
        factory: &F,
        comm: C,
        start: Timestamp,
    ) -> Result<Self> {
        config.validate()?;
        let Domain {
            dem,
            landuse,
            special_points,
        } = domain;
        if !landuse.is_same_geolocation(dem.elevation()) {
            return Err(Error::GeolocationMismatch(format!(
                "land use is a ({},{}) grid but the dem is ({},{})",
                landuse.nx(),
                landuse.ny(),
                dem.nx(),
                dem.ny()
            )));
        }
        let (nx, ny) = (dem.nx(), dem.ny());
        let points = prepare_points(&special_points, nx, ny);
        let pool = ThreadPoolBuilder::new().num_threads(config.workers).build()?;

        let reader = InitialState::new(
            ProfileStore::new(config.input_snow_path.clone(), config.snow_format),
            &config.experiment,
            config.restart,
            start,
        );
        let mut cells = reader.load(&comm, config.local_io, &dem, &landuse, &points)?;

        let process = comm.local_slice(nx);
        let mut groups = vec![];
        for slice in partition(process.len, config.workers) {
            let slice = slice.translate(process.offset);
            if slice.is_empty() {
                continue;
            }
            let mut group = Vec::with_capacity(slice.len * ny);
            for iy in 0..ny {
                for ix in slice.offset..slice.end() {
                    group.push(cells[iy * process.len + ix - process.offset].take());
                }
            }
            groups.push((slice, group));
        }

        let geolocation = *dem.elevation().geolocation();
        let workers = pool.install(|| {
            groups
                .into_par_iter()
                .map(|(slice, group)| {
                    let models = group
                        .into_iter()
                        .map(|cell| {
                            cell.map(|c| factory.create(c.profile, c.meta))
                                .transpose()
                                .map_err(|e| Error::InitialState(e.to_string()))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(SliceWorker::new(
                        slice,
                        ny,
                        worker_geolocation(&geolocation, slice),
                        models,
                        &points,
                    ))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        if comm.is_master() {
            info!(
                "{} worker(s) on {} process(es), domain of ({nx},{ny}) cells, {} special point(s)",
                workers.len(),
                comm.size(),
                points.len()
            );
        }
        for w in &workers {
            debug!(
                "Process {} worker on columns [{}, {}) with {} cells",
                comm.rank(),
                w.slice().offset,
                w.slice().end(),
                w.modelled_cells()
            );
        }

        let snow_store = ProfileStore::new(config.output.snow_path.clone(), config.snow_format);
        let point_output = SpecialPointOutput::new(
            &config.output,
            config.use_canopy,
            (!config.output.snow_write).then_some(snow_store),
            config.step_length_minutes,
        );
        let empty = dem.elevation().like(NODATA);
        let mut coordinator = Self {
            grid_writer: Box::new(AsciiGridWriter::new(config.output.grid_path.clone())),
            output_parameters: config.output_parameters()?,
            has_special_points: !points.is_empty(),
            point_output,
            comm,
            pool,
            workers,
            ta: empty.clone(),
            rh: empty.clone(),
            vw: empty.clone(),
            psum: empty.clone(),
            psum_ph: empty.clone(),
            shortwave: empty.clone(),
            longwave: empty.clone(),
            diffuse: empty.clone(),
            solar_elevation: 0.0,
            mns: empty.like(0.0),
            glacier_mask: None,
            drift: None,
            energy_balance: None,
            runoff: None,
            assimilation: false,
            readiness: Readiness::default(),
            next: start,
            last_step: Duration::ZERO,
            poisoned: false,
            dem,
            config,
        };
        if coordinator.config.uses_glacier_mask() {
            coordinator.glacier_mask = Some(coordinator.get_grid(Parameter::Glacier)?);
        }
        Ok(coordinator)
    }

    /// Replace the writer of the gridded output.
    pub fn set_grid_writer(&mut self, writer: Box<dyn GridWriter>) {
        self.grid_writer = writer;
    }

    /// The communicator
    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// The workers of this process
    pub fn workers(&self) -> &[SliceWorker<M>] {
        &self.workers
    }

    /// Timestamp of the next step.
    pub fn next_timestamp(&self) -> Timestamp {
        self.next
    }

    /// Data received for the next step.
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Wall time spent in the last step.
    pub fn last_step_duration(&self) -> Duration {
        self.last_step
    }

    /// Did a failed step make the coordinator unusable?
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Attach a snow drift module. It receives the current snow surface
    /// immediately and after every step. Must be done on every process.
    pub fn attach_snow_drift(&mut self, mut drift: Box<dyn SnowDriftConsumer>) -> Result<()> {
        for w in self.workers.iter_mut() {
            w.set_use_drift(true);
        }
        drift.set_snow_surface_data(self.snow_surface()?)?;
        self.drift = Some(drift);
        Ok(())
    }

    /// Attach an energy balance module. It delivers the radiation and
    /// receives the albedo immediately and after every step. Must be done on
    /// every process.
    pub fn attach_energy_balance(&mut self, mut energy_balance: Box<dyn EnergyBalanceConsumer>) -> Result<()> {
        energy_balance.set_albedo(self.get_grid(Parameter::TopAlb)?)?;
        self.energy_balance = Some(energy_balance);
        Ok(())
    }

    /// Wait for data assimilation before every step.
    pub fn attach_data_assimilation(&mut self) {
        self.assimilation = true;
    }

    /// Attach a runoff module, fed by the master after every step. Must be
    /// done on every process.
    pub fn attach_runoff(&mut self, runoff: Box<dyn RunoffConsumer>) {
        self.runoff = Some(runoff);
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::Poisoned)
        } else {
            Ok(())
        }
    }

    fn check_timestamp(&self, kind: DataKind, timestamp: &Timestamp) -> Result<()> {
        if *timestamp == self.next {
            return Ok(());
        }
        if self.comm.is_master() {
            warn!("Providing {kind} data at {timestamp} for the step at {}", self.next);
        }
        Err(Error::TimingMismatch {
            kind,
            provided: *timestamp,
            expected: self.next,
        })
    }

    fn check_geolocation(&self, name: &str, grid: &Grid2d) -> Result<()> {
        let dem = self.dem.elevation();
        if grid.is_same_geolocation(dem) {
            Ok(())
        } else {
            Err(Error::GeolocationMismatch(format!(
                "{name} is a ({},{}) grid but the dem is ({},{})",
                grid.nx(),
                grid.ny(),
                dem.nx(),
                dem.ny()
            )))
        }
    }

    /// Push the meteorological forcing of the next step.
    pub fn set_meteo(&mut self, meteo: MeteoForcing, timestamp: &Timestamp) -> Result<StepStatus> {
        self.check_usable()?;
        self.check_timestamp(DataKind::Meteo, timestamp)?;
        for (name, grid) in [
            ("PSUM", &meteo.psum),
            ("PSUM_PH", &meteo.psum_ph),
            ("VW", &meteo.vw),
            ("RH", &meteo.rh),
            ("TA", &meteo.ta),
        ] {
            self.check_geolocation(name, grid)?;
        }
        let MeteoForcing {
            psum,
            psum_ph,
            vw,
            rh,
            mut ta,
        } = meteo;
        if self.config.uses_glacier_mask() && self.config.output.mask_dynamic {
            self.glacier_mask = Some(self.get_grid(Parameter::Glacier)?);
        }
        if self.config.glacier_katabatic_flow {
            self.correct_glacier_temperatures(&mut ta)?;
        }
        self.psum = psum;
        self.psum_ph = psum_ph;
        self.vw = vw;
        self.rh = rh;
        self.ta = ta;
        self.readiness.meteo = true;
        self.try_step()
    }

    fn correct_glacier_temperatures(&self, ta: &mut Grid2d) -> Result<()> {
        let hs = self.get_grid(Parameter::Hs)?;
        let tss = self.get_grid(Parameter::Tss)?;
        match &self.glacier_mask {
            Some(mask) if !mask.is_empty() && !hs.is_empty() && !tss.is_empty() => {
                let corrected = correct_temperatures(ta, mask, &hs, &tss)?;
                debug!("Katabatic flow correction on {corrected} cell(s)");
            }
            _ => {
                if self.comm.is_master() {
                    warn!("No glacier map, snow height or surface temperature: air temperature left as is");
                }
            }
        }
        Ok(())
    }

    /// Push the radiation of the next step.
    pub fn set_radiation(&mut self, radiation: RadiationForcing, timestamp: &Timestamp) -> Result<StepStatus> {
        self.check_usable()?;
        self.check_timestamp(DataKind::Radiation, timestamp)?;
        self.check_geolocation("ISWR", &radiation.shortwave)?;
        self.check_geolocation("ILWR", &radiation.longwave)?;
        self.check_geolocation("diffuse radiation", &radiation.diffuse)?;
        self.shortwave = radiation.shortwave;
        self.longwave = radiation.longwave;
        self.diffuse = radiation.diffuse;
        self.solar_elevation = radiation.solar_elevation;
        self.readiness.radiation = true;
        self.try_step()
    }

    /// Push the snow mass changes from drift for the next step.
    pub fn set_snow_mass_change(&mut self, mns: Grid2d, timestamp: &Timestamp) -> Result<StepStatus> {
        self.check_usable()?;
        self.check_timestamp(DataKind::SnowDrift, timestamp)?;
        self.check_geolocation("snow mass change", &mns)?;
        self.mns = mns;
        self.readiness.snow_drift = true;
        self.try_step()
    }

    /// Push the data assimilation of the next step.
    pub fn assimilate(&mut self, data: &Grid2d, timestamp: &Timestamp) -> Result<StepStatus> {
        self.check_usable()?;
        self.check_timestamp(DataKind::Assimilation, timestamp)?;
        self.check_geolocation("data assimilation", data)?;
        if self.comm.is_master() {
            debug!("Data assimilation received for {timestamp}");
        }
        self.readiness.assimilation = true;
        self.try_step()
    }

    fn try_step(&mut self) -> Result<StepStatus> {
        let ready = self.readiness;
        if !ready.meteo
            || (self.drift.is_some() && !ready.snow_drift)
            || (self.assimilation && !ready.assimilation)
            || (self.energy_balance.is_some() && !ready.radiation)
        {
            return Ok(StepStatus::Pending);
        }
        if !ready.radiation {
            return Err(Error::MissingData(DataKind::Radiation));
        }
        // data arriving from now on belongs to the next step
        self.readiness = Readiness::default();
        self.step()
    }

    fn slice_forcing(&self, slice: Slice) -> SliceForcing {
        SliceForcing {
            ta: self.ta.sub_grid(slice),
            rh: self.rh.sub_grid(slice),
            vw: self.vw.sub_grid(slice),
            psum: self.psum.sub_grid(slice),
            psum_ph: self.psum_ph.sub_grid(slice),
            iswr: self.shortwave.sub_grid(slice),
            diffuse: self.diffuse.sub_grid(slice),
            ilwr: self.longwave.sub_grid(slice),
            mns: self.drift.as_ref().map(|_| self.mns.sub_grid(slice)),
            solar_elevation: self.solar_elevation,
        }
    }

    fn step(&mut self) -> Result<StepStatus> {
        let started = Instant::now();
        let timestamp = self.next;

        let forcings = self
            .workers
            .iter()
            .map(|w| self.slice_forcing(w.slice()))
            .collect::<Vec<_>>();
        let workers = &mut self.workers;
        let local_failures: usize = self.pool.install(|| {
            workers
                .par_iter_mut()
                .zip(forcings.par_iter())
                .map(|(w, forcing)| w.run_step(&timestamp, forcing).err().unwrap_or(0))
                .sum()
        });
        let failures = all_reduce_count(&self.comm, local_failures).map_err(|e| {
            self.poisoned = true;
            e
        })?;

        let written = if self.has_special_points {
            self.write_special_points(&timestamp)
        } else {
            Ok(())
        };

        if failures > 0 {
            self.poisoned = true;
            if let Err(e) = &written {
                error!("Writing the special points failed: {e}");
            }
            // every process has closed its special point files past this point
            self.comm.barrier()?;
            error!("{failures} cell(s) failed at {timestamp}");
            match self.config.failure_policy {
                FailurePolicy::Abort => std::process::abort(),
                FailurePolicy::ReturnError => {
                    return Err(Error::CellFailures {
                        failed: failures,
                        timestamp,
                    });
                }
            }
        }
        // the cells have stepped: from here on every process runs every
        // collective and the first error is kept for the end
        let mut outcome = written;
        if let Some(mut drift) = self.drift.take() {
            let pushed = self.snow_surface().and_then(|s| drift.set_snow_surface_data(s));
            self.drift = Some(drift);
            outcome = outcome.and(pushed);
        }
        if let Some(mut energy_balance) = self.energy_balance.take() {
            let pushed = self
                .get_grid(Parameter::TopAlb)
                .and_then(|albedo| energy_balance.set_albedo(albedo));
            self.energy_balance = Some(energy_balance);
            outcome = outcome.and(pushed);
        }
        outcome = outcome.and(self.write_output(&timestamp));

        let failed_outputs = all_reduce_count(&self.comm, usize::from(outcome.is_err()));
        let error = match (outcome, failed_outputs) {
            (Ok(()), Ok(0)) => None,
            (Err(e), _) | (_, Err(e)) => Some(e),
            (Ok(()), Ok(processes)) => Some(Error::OutputFailed { processes, timestamp }),
        };
        if let Some(error) = error {
            self.poisoned = true;
            error!("Output of the step at {timestamp} failed: {error}");
            return Err(error);
        }

        self.last_step = started.elapsed();
        if self.comm.is_master() {
            info!(
                "Snow cover computed for {timestamp} in {:.3} s",
                self.last_step.as_secs_f64()
            );
        }
        self.next = timestamp + self.config.step();
        Ok(StepStatus::Completed(timestamp))
    }

    fn write_special_points(&mut self, timestamp: &Timestamp) -> Result<()> {
        let snapshots = gather(&mut self.workers, &self.comm, self.config.local_io)?;
        self.point_output.write(timestamp, &snapshots)
    }

    fn snow_surface(&self) -> Result<SnowSurfaceData> {
        let [hs, sp, rg, n3, rb] = Parameter::SNOW_SURFACE;
        Ok(SnowSurfaceData {
            hs: self.get_grid(hs)?,
            sp: self.get_grid(sp)?,
            rg: self.get_grid(rg)?,
            n3: self.get_grid(n3)?,
            rb: self.get_grid(rb)?,
        })
    }

    fn forcing_grid(&self, parameter: Parameter) -> Option<&Grid2d> {
        match parameter {
            Parameter::Ta => Some(&self.ta),
            Parameter::Rh => Some(&self.rh),
            Parameter::Vw => Some(&self.vw),
            Parameter::Psum => Some(&self.psum),
            Parameter::PsumPh => Some(&self.psum_ph),
            Parameter::Iswr => Some(&self.shortwave),
            Parameter::Ilwr => Some(&self.longwave),
            _ => None,
        }
    }

    /// Get the full-domain grid of `parameter`.
    ///
    /// Forcing grids are returned as they were pushed. Other parameters are
    /// collected from all workers of all processes; an empty grid is returned
    /// when a worker anywhere does not provide the parameter.
    pub fn get_grid(&self, parameter: Parameter) -> Result<Grid2d> {
        if let Some(grid) = self.forcing_grid(parameter) {
            return Ok(grid.clone());
        }

        let workers = &self.workers;
        let parts: Vec<Option<Grid2d>> =
            self.pool.install(|| workers.par_iter().map(|w| w.get_grid(parameter)).collect());

        let mut grid = self.dem.elevation().like(0.0);
        let mut unavailable = 0;
        for (w, part) in workers.iter().zip(parts) {
            match part {
                Some(part) => grid.fill_columns(&part, w.slice().offset)?,
                None => unavailable += 1,
            }
        }

        // the unavailable count travels with the grid so that every process agrees
        let mut buffer = Vec::with_capacity(grid.data().len() + 1);
        buffer.extend_from_slice(grid.data());
        buffer.push(unavailable as f64);
        self.comm.all_reduce_sum(&mut buffer)?;
        let unavailable = buffer.pop().unwrap_or(0.0);
        if unavailable > 0.5 {
            if self.comm.is_master() {
                warn!("Requested {parameter} but it is not available in the workers");
            }
            return Ok(Grid2d::empty());
        }
        grid.data_mut().copy_from_slice(&buffer);
        Ok(grid)
    }

    /// Write the scheduled grids and feed the runoff module.
    ///
    /// A failed write does not stop the loop: the other processes still take
    /// part in the reductions of the remaining grids.
    fn write_output(&mut self, timestamp: &Timestamp) -> Result<()> {
        let out = &self.config.output;
        let is_master = self.comm.is_master();
        let mut outcome = Ok(());
        if out.grids_write && is_due(timestamp, out.grids_days_between, out.grids_start, self.config.step_length_minutes)
        {
            // not in parallel: every grid is a collective operation
            for parameter in self.output_parameters.clone() {
                let grid = self.get_grid(parameter)?;
                if is_master && !grid.is_empty() && outcome.is_ok() {
                    outcome = self.write_grid(grid, parameter, timestamp);
                }
            }
        }

        if self.runoff.is_some() {
            let snowpack = self.get_grid(Parameter::MsSnowpackRunoff)?;
            let soil = self.get_grid(Parameter::MsSoilRunoff)?;
            if let (true, Some(runoff)) = (is_master, self.runoff.as_mut()) {
                outcome = outcome.and(runoff.output(timestamp, &snowpack, &soil, &self.psum, &self.ta));
            }
        }
        outcome
    }

    fn write_grid(&mut self, mut grid: Grid2d, parameter: Parameter, timestamp: &Timestamp) -> Result<()> {
        if let (true, Some(mask)) = (self.config.output.mask_glaciers, &self.glacier_mask) {
            if !mask.is_empty() {
                grid.mask(mask)?;
            }
        }
        if parameter.is_meteo_grid() {
            self.grid_writer.write_parameter(&grid, parameter, timestamp)
        } else {
            let name = format!("{}_{}.asc", timestamp.format("%Y%m%d%H%M"), parameter.name());
            self.grid_writer.write_named(&grid, &name)
        }
    }

    /// Write the snow cover of every cell, named so that a restart can read it.
    ///
    /// Unless `local_io` is set, the master writes the cells of all processes.
    pub fn write_snow_cover(&self, timestamp: &Timestamp) -> Result<()> {
        let store = ProfileStore::new(self.config.output.snow_path.clone(), self.config.snow_format);
        let write = |profiles: Vec<CellProfile>| -> Result<()> {
            for mut cell in profiles {
                cell.profile.profile_date = *timestamp;
                store.write(&cell)?;
            }
            Ok(())
        };

        let profiles = self
            .workers
            .iter()
            .flat_map(|w| w.profiles())
            .collect::<Vec<_>>();
        let comm = &self.comm;
        if self.config.local_io || comm.size() == 1 {
            info!("Writing the snow cover of process {}", comm.rank());
            return write(profiles);
        }
        if comm.is_master() {
            info!("Writing the snow cover of process {}", comm.rank());
            write(profiles)?;
            for rank in (0..comm.size()).filter(|r| *r != comm.rank()) {
                info!("Writing the snow cover of process {rank}");
                write(communicator::receive(comm, rank)?)?;
            }
            Ok(())
        } else {
            communicator::send(comm, comm.master_rank(), profiles)
        }
    }
}

/// Geolocation of the sub-grid covering `slice`.
fn worker_geolocation(domain: &Geolocation, slice: Slice) -> Geolocation {
    let (xll, yll) = domain.position(slice.offset, 0);
    Geolocation::new(xll, yll, domain.cellsize, domain.epsg)
}
