//! Reading and writing of profiles, grids and point time series
mod grid_writer;
mod point_writer;
mod profile;

pub use grid_writer::{AsciiGridWriter, GridWriter, MemoryGridWriter, WrittenGrid};
pub use point_writer::PointWriter;
pub use profile::{ProfileFormat, ProfileStore};

use crate::types::Timestamp;

/// Format of timestamps in text files.
pub(crate) const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(crate) fn iso(timestamp: &Timestamp) -> String {
    timestamp.format(ISO_FORMAT).to_string()
}
