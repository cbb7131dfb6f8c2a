//! General type definitions
use chrono::NaiveDateTime;
use std::fmt;

/// Simulation timestamp.
pub type Timestamp = NaiveDateTime;

/// Julian date of the Unix epoch.
const UNIX_EPOCH_JULIAN: f64 = 2440587.5;

/// Convert a timestamp to a (fractional) Julian date.
pub fn julian_date(timestamp: &Timestamp) -> f64 {
    let utc = timestamp.and_utc();
    let seconds = utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_millis()) * 1e-3;
    seconds / 86400.0 + UNIX_EPOCH_JULIAN
}

/// The producers that push data into the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Meteorological forcing
    Meteo,
    /// Radiation components
    Radiation,
    /// Snow mass changes from snow drift
    SnowDrift,
    /// Data assimilation
    Assimilation,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Meteo => "meteo",
            DataKind::Radiation => "radiation",
            DataKind::SnowDrift => "snow drift",
            DataKind::Assimilation => "data assimilation",
        };
        write!(f, "{name}")
    }
}

/// Generic error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A producer pushed data for another step than the one expected.
    #[error("{kind} data provided for {provided} but the next step is {expected}")]
    TimingMismatch {
        /// The producer
        kind: DataKind,
        /// Timestamp supplied by the producer
        provided: Timestamp,
        /// Timestamp of the next step
        expected: Timestamp,
    },
    /// Two grids do not share the same geolocation or dimensions.
    #[error("Geolocation mismatch: {0}")]
    GeolocationMismatch(String),
    /// Mandatory data is missing when a step should run.
    #[error("{0} data not available")]
    MissingData(DataKind),
    /// At least one cell model failed during a step.
    #[error("{failed} cell(s) failed during the step at {timestamp}")]
    CellFailures {
        /// Number of failed cells on all processes
        failed: usize,
        /// Timestamp of the failed step
        timestamp: Timestamp,
    },
    /// The cells stepped but handing out the results failed.
    #[error("Output of the step at {timestamp} failed on {processes} process(es)")]
    OutputFailed {
        /// Number of processes with a failed output
        processes: usize,
        /// Timestamp of the step
        timestamp: Timestamp,
    },
    /// A previous step failed and the state can not be trusted anymore.
    #[error("The coordinator is unusable after a failed step")]
    Poisoned,
    /// The initial snow cover could not be read.
    #[error("Can not read initial snow cover: {0}")]
    InitialState(String),
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Unknown grid parameter name.
    #[error("Unknown grid parameter '{0}'")]
    UnknownParameter(String),
    /// Communication between processes failed.
    #[error("Communication error: {0}")]
    Communication(String),
    /// The worker thread pool could not be built.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// Input/output error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// (De)serialisation error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result Type
pub type Result<T> = std::result::Result<T, Error>;
