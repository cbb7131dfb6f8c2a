//? mpirun -n {{NPROCESSES}} --features "mpi"

#[cfg(feature = "mpi")]
use chrono::{Duration, NaiveDate};
#[cfg(feature = "mpi")]
use snowgrid::{
    communicator::{Communicator, MpiComm},
    config::SnowpackConfig,
    coordinator::{Domain, MeteoForcing, RadiationForcing},
    grid::{Dem, Geolocation, Grid2d},
    io::ProfileStore,
    model::{degree_day::DegreeDayFactory, CellMetadata, CellProfile, Layer, SnowProfile},
    parameters::Parameter,
    special_points::SpecialPoint,
    SnowpackCoordinator,
};

#[cfg(feature = "mpi")]
fn main() {
    let comm = MpiComm::initialize().unwrap();
    let rank = comm.rank();
    let size = comm.size();

    let dir = std::env::temp_dir().join("snowgrid_parallel_run");
    let mut config = SnowpackConfig {
        experiment: "demo".to_string(),
        workers: 2,
        local_io: false,
        input_snow_path: dir.join("input"),
        ..Default::default()
    };
    config.output.ts_write = true;
    config.output.meteo_path = dir.join("points");
    config.output.grid_path = dir.join("grids");
    config.output.snow_path = dir.join("snow");

    let start = NaiveDate::from_ymd_opt(2021, 2, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    if rank == 0 {
        ProfileStore::new(config.input_snow_path.clone(), config.snow_format)
            .write(&CellProfile {
                meta: CellMetadata {
                    station_id: "11".to_string(),
                    station_name: "demo_11".to_string(),
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
                    profile_date: start,
                    soil_layers: 0,
                    albedo: 0.8,
                    layers: vec![Layer {
                        deposition_date: start - Duration::days(40),
                        thickness: 1.2,
                        temperature: 268.0,
                        vol_ice: 0.3,
                        vol_water: 0.0,
                        grain_radius: 0.4,
                    }],
                },
            })
            .unwrap();
    }
    comm.barrier().unwrap();

    let (nx, ny) = (40, 30);
    let geo = Geolocation::new(780000.0, 185000.0, 100.0, Some(21781));
    let mut elevation = Grid2d::new(geo, nx, ny, 0.0);
    for iy in 0..ny {
        for ix in 0..nx {
            elevation.set(ix, iy, 1500.0 + 25.0 * ix as f64 + 10.0 * iy as f64);
        }
    }
    let domain = Domain {
        dem: Dem::new(elevation.clone()),
        landuse: Grid2d::new(geo, nx, ny, 11.0),
        special_points: vec![SpecialPoint::new(5, 5), SpecialPoint::new(35, 20)],
    };
    let factory = DegreeDayFactory::new(config.step_seconds());
    let mut coordinator = SnowpackCoordinator::new(config, domain, &factory, comm, start).unwrap();

    for hour in 0..24 {
        let timestamp = start + Duration::hours(hour);
        // 6.5 K per km lapse rate, warmest in the afternoon
        let diurnal = 4.0 * ((hour as f64 - 9.0) * std::f64::consts::PI / 12.0).sin();
        let mut ta = elevation.clone();
        for v in ta.data_mut() {
            *v = 278.15 + diurnal - 0.0065 * (*v - 1500.0);
        }
        let sun = ((hour as f64 - 6.0) * std::f64::consts::PI / 12.0).sin().max(0.0);
        coordinator
            .set_radiation(
                RadiationForcing {
                    shortwave: Grid2d::new(geo, nx, ny, 600.0 * sun),
                    longwave: Grid2d::new(geo, nx, ny, 280.0),
                    diffuse: Grid2d::new(geo, nx, ny, 100.0 * sun),
                    solar_elevation: 35.0 * sun,
                },
                &timestamp,
            )
            .unwrap();
        coordinator
            .set_meteo(
                MeteoForcing {
                    psum: Grid2d::new(geo, nx, ny, 0.0),
                    psum_ph: Grid2d::new(geo, nx, ny, 0.0),
                    vw: Grid2d::new(geo, nx, ny, 2.0),
                    rh: Grid2d::new(geo, nx, ny, 0.6),
                    ta,
                },
                &timestamp,
            )
            .unwrap();
    }

    let swe = coordinator.get_grid(Parameter::Swe).unwrap();
    coordinator
        .write_snow_cover(&coordinator.next_timestamp())
        .unwrap();
    if rank == 0 {
        let total = swe.data().iter().sum::<f64>();
        println!(
            "Mean SWE after one day on {size} process(es): {:.2} mm",
            total / (nx * ny) as f64
        );
    }
}
#[cfg(not(feature = "mpi"))]
fn main() {}
