//! Snowgrid
//!
//! Couples a per-cell snow cover model to gridded meteorological forcing.
//! The domain is split into column slices that are stepped in parallel on a
//! thread pool and, optionally, across several processes.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

pub mod communicator;
pub mod config;
pub mod consumers;
pub mod coordinator;
pub mod glaciers;
pub mod grid;
pub mod initial_state;
pub mod io;
pub mod model;
pub mod parameters;
pub mod partition;
pub mod schedule;
pub mod special_points;
pub mod types;
pub mod worker;

pub use coordinator::{SnowpackCoordinator, StepStatus};
pub use types::{Error, Result, Timestamp};
