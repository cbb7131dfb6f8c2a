//! Output of full-domain grids
use crate::grid::{Grid2d, NODATA};
use crate::parameters::Parameter;
use crate::types::{Result, Timestamp};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination of gridded output.
pub trait GridWriter: Send {
    /// Write a grid of a known parameter.
    fn write_parameter(&mut self, grid: &Grid2d, parameter: Parameter, timestamp: &Timestamp) -> Result<()>;

    /// Write a grid under a literal file name.
    fn write_named(&mut self, grid: &Grid2d, filename: &str) -> Result<()>;
}

/// Writes ESRI ASCII grids into a directory.
#[derive(Debug, Clone)]
pub struct AsciiGridWriter {
    directory: PathBuf,
}

impl AsciiGridWriter {
    /// Create a writer.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// File name used for a parameter grid.
    pub fn parameter_filename(parameter: Parameter, timestamp: &Timestamp) -> String {
        format!("{}_{}.asc", timestamp.format("%Y-%m-%dT%H.%M"), parameter.name())
    }

    fn render(grid: &Grid2d) -> String {
        let geo = grid.geolocation();
        let mut out = String::new();
        // writing into a String can not fail
        let _ = writeln!(out, "ncols {}", grid.nx());
        let _ = writeln!(out, "nrows {}", grid.ny());
        let _ = writeln!(out, "xllcorner {}", geo.xll);
        let _ = writeln!(out, "yllcorner {}", geo.yll);
        let _ = writeln!(out, "cellsize {}", geo.cellsize);
        let _ = writeln!(out, "NODATA_value {NODATA}");
        let rows = grid.rows().collect::<Vec<_>>();
        for row in rows.iter().rev() {
            let line = row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

impl GridWriter for AsciiGridWriter {
    fn write_parameter(&mut self, grid: &Grid2d, parameter: Parameter, timestamp: &Timestamp) -> Result<()> {
        self.write_named(grid, &Self::parameter_filename(parameter, timestamp))
    }

    fn write_named(&mut self, grid: &Grid2d, filename: &str) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        fs::write(self.directory.join(filename), Self::render(grid))?;
        Ok(())
    }
}

/// A grid kept by a [MemoryGridWriter].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenGrid {
    /// Parameter, when written by parameter
    pub parameter: Option<Parameter>,
    /// Timestamp, when written by parameter
    pub timestamp: Option<Timestamp>,
    /// File name, when written by name
    pub filename: Option<String>,
    /// The grid
    pub grid: Grid2d,
}

/// Keeps written grids in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryGridWriter {
    grids: Arc<Mutex<Vec<WrittenGrid>>>,
}

impl MemoryGridWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WrittenGrid>> {
        // a panic while pushing can not leave the vector inconsistent
        self.grids.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Everything written so far.
    pub fn grids(&self) -> Vec<WrittenGrid> {
        self.lock().clone()
    }
}

impl GridWriter for MemoryGridWriter {
    fn write_parameter(&mut self, grid: &Grid2d, parameter: Parameter, timestamp: &Timestamp) -> Result<()> {
        self.lock().push(WrittenGrid {
            parameter: Some(parameter),
            timestamp: Some(*timestamp),
            filename: None,
            grid: grid.clone(),
        });
        Ok(())
    }

    fn write_named(&mut self, grid: &Grid2d, filename: &str) -> Result<()> {
        self.lock().push(WrittenGrid {
            parameter: None,
            timestamp: None,
            filename: Some(filename.to_string()),
            grid: grid.clone(),
        });
        Ok(())
    }
}
