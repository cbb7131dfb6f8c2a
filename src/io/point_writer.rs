//! Time series and profiles at the special points
use super::iso;
use crate::grid::NODATA;
use crate::model::PointSnapshot;
use crate::types::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes the files of the special points.
///
/// Every point gets a SMET file with one line per step. Its header is
/// written the first time the point shows up, truncating older content.
#[derive(Debug)]
pub struct PointWriter {
    directory: PathBuf,
    time_zone: f64,
    use_canopy: bool,
    soil_temperature: bool,
    headers: HashSet<String>,
    series: HashSet<String>,
}

impl PointWriter {
    /// Create a writer.
    pub fn new(directory: impl Into<PathBuf>, time_zone: f64, use_canopy: bool, soil_temperature: bool) -> Self {
        Self {
            directory: directory.into(),
            time_zone,
            use_canopy,
            soil_temperature,
            headers: HashSet::new(),
            series: HashSet::new(),
        }
    }

    /// The output directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of a point's SMET file.
    pub fn smet_path(&self, station_name: &str) -> PathBuf {
        self.directory.join(format!("{station_name}.smet"))
    }

    /// Path of a point's time series file.
    pub fn met_path(&self, station_name: &str) -> PathBuf {
        self.directory.join(format!("{station_name}.met"))
    }

    /// Path of a point's profile file.
    pub fn profile_path(&self, station_name: &str) -> PathBuf {
        self.directory.join(format!("{station_name}.pro"))
    }

    fn append_to(path: &Path) -> Result<BufWriter<File>> {
        Ok(BufWriter::new(OpenOptions::new().create(true).append(true).open(path)?))
    }

    fn create(path: &Path) -> Result<BufWriter<File>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(BufWriter::new(File::create(path)?))
    }

    fn write_header(&self, snapshot: &PointSnapshot) -> Result<()> {
        let meta = &snapshot.meta;
        let mut out = Self::create(&self.smet_path(&meta.station_name))?;
        writeln!(out, "SMET 1.1 ASCII")?;
        writeln!(out, "[HEADER]")?;
        writeln!(out, "station_name = {}", meta.station_name)?;
        writeln!(out, "station_id   = {}", meta.station_id)?;
        writeln!(out, "altitude     = {:>11.1}", meta.altitude)?;
        writeln!(out, "easting      = {:>11.1}", meta.easting)?;
        writeln!(out, "northing     = {:>11.1}", meta.northing)?;
        writeln!(out, "epsg         = {:>11}", meta.epsg.map_or(NODATA as i64, i64::from))?;
        writeln!(out, "slope        = {:>11.1}", meta.slope)?;
        writeln!(out, "azimuth      = {:>11.1}", meta.azimuth)?;
        writeln!(out, "landuse      = {:>11}", meta.landuse)?;
        writeln!(out, "nodata       = {:>11.0}", NODATA)?;
        writeln!(out, "tz           = {:>11.0}", self.time_zone)?;
        writeln!(out, "source       = snowgrid version {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "creation     = {}", iso(&Utc::now().naive_utc()))?;
        if self.use_canopy {
            writeln!(
                out,
                "comment      = ISWR/RSWR are above the canopy, ISWR_can/RSWR_can and PSUM/PSUM_PH are below the canopy"
            )?;
        }
        write!(out, "fields       = timestamp TA TSS TSG VW DW VW_MAX ISWR OSWR ILWR PSUM PSUM_PH HS RH")?;
        if self.soil_temperature {
            write!(out, " TSOIL")?;
        }
        if self.use_canopy {
            write!(out, " ISWR_can RSWR_can")?;
        }
        writeln!(out)?;
        writeln!(out, "[DATA]")?;
        out.flush()?;
        Ok(())
    }

    /// Append the line of one step to the point's SMET file.
    pub fn write_smet(&mut self, snapshot: &PointSnapshot) -> Result<()> {
        let name = &snapshot.meta.station_name;
        if !self.headers.contains(name) {
            self.write_header(snapshot)?;
            self.headers.insert(name.clone());
        }
        let m = &snapshot.output;
        let cos_slope = snapshot.meta.slope.to_radians().cos();
        let mut out = Self::append_to(&self.smet_path(name))?;
        write!(
            out,
            "{} {:>8.2} {:>8.2} {:>8.2} {:>6.1} {:>5.0} {:>6.1} {:>6.0} {:>6.0} {:>6.3} {:>6.3} {:>6.3} {:>8.3} {:>7.3}",
            iso(&snapshot.timestamp),
            m.ta,
            m.tss,
            m.tsg,
            m.vw,
            m.dw,
            m.vw_max,
            m.iswr,
            m.rswr,
            m.ilwr,
            m.psum,
            m.psum_ph,
            m.hs / cos_slope,
            m.rh
        )?;
        if self.soil_temperature {
            write!(out, " {:>8.2}", m.tsoil.unwrap_or(NODATA))?;
        }
        if self.use_canopy {
            write!(
                out,
                " {:>6.0} {:>6.0}",
                m.iswr_canopy.unwrap_or(NODATA),
                m.rswr_canopy.unwrap_or(NODATA)
            )?;
        }
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    /// Append the snow state to the point's time series file.
    pub fn write_time_series(&mut self, snapshot: &PointSnapshot) -> Result<()> {
        let name = &snapshot.meta.station_name;
        let path = self.met_path(name);
        let mut out = if self.series.insert(name.clone()) {
            let mut out = Self::create(&path)?;
            writeln!(out, "# {name}: timestamp HS SWE TSS ALBEDO RUNOFF")?;
            out
        } else {
            Self::append_to(&path)?
        };
        let m = &snapshot.output;
        writeln!(
            out,
            "{} {:>8.3} {:>9.2} {:>8.2} {:>6.3} {:>8.3}",
            iso(&snapshot.timestamp),
            m.hs,
            m.swe,
            m.tss,
            m.albedo,
            m.runoff
        )?;
        out.flush()?;
        Ok(())
    }

    /// Append the full profile to the point's profile file.
    pub fn write_profile(&mut self, snapshot: &PointSnapshot) -> Result<()> {
        let profile = &snapshot.profile;
        let path = self.profile_path(&snapshot.meta.station_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = Self::append_to(&path)?;
        writeln!(
            out,
            "[PROFILE] {} layers={} soil_layers={} albedo={:.3}",
            iso(&snapshot.timestamp),
            profile.layers.len(),
            profile.soil_layers,
            profile.albedo
        )?;
        let mut top = 0.0;
        for l in &profile.layers {
            top += l.thickness;
            writeln!(
                out,
                "{:>8.4} {:>8.4} {:>8.2} {:>7.4} {:>7.4} {:>6.3} {}",
                top,
                l.thickness,
                l.temperature,
                l.vol_ice,
                l.vol_water,
                l.grain_radius,
                iso(&l.deposition_date)
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CellMetadata, PointOutput, SnowProfile};
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    fn snapshot(hour: i64) -> PointSnapshot {
        let timestamp = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour);
        PointSnapshot {
            timestamp,
            meta: CellMetadata {
                station_id: "1_2".to_string(),
                station_name: "1_2_test".to_string(),
                ix: 1,
                iy: 2,
                easting: 1000.0,
                northing: 2000.0,
                altitude: 1800.0,
                epsg: Some(21781),
                slope: 0.0,
                azimuth: 0.0,
                landuse: 11,
            },
            output: PointOutput {
                ta: 270.0,
                hs: 0.5,
                ..Default::default()
            },
            profile: SnowProfile {
                profile_date: timestamp,
                soil_layers: 0,
                albedo: 0.8,
                layers: vec![],
            },
        }
    }

    #[test]
    fn test_header_once_then_lines() {
        let dir = TempDir::new().unwrap();
        let mut writer = PointWriter::new(dir.path(), 1.0, false, true);
        for hour in 0..3 {
            writer.write_smet(&snapshot(hour)).unwrap();
        }
        let text = std::fs::read_to_string(writer.smet_path("1_2_test")).unwrap();
        assert_eq!(text.matches("SMET 1.1 ASCII").count(), 1);
        assert!(text.contains("fields       = timestamp TA TSS TSG VW DW VW_MAX ISWR OSWR ILWR PSUM PSUM_PH HS RH TSOIL\n"));
        let data = text.split("[DATA]\n").nth(1).unwrap();
        let lines = data.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("2020-01-01T00:00:00   270.00"));
        assert!(lines[2].starts_with("2020-01-01T02:00:00"));
        assert!(lines[0].ends_with(" -999.00"));
    }

    #[test]
    fn test_time_series_and_profile() {
        let dir = TempDir::new().unwrap();
        let mut writer = PointWriter::new(dir.path(), 0.0, false, false);
        writer.write_time_series(&snapshot(0)).unwrap();
        writer.write_time_series(&snapshot(1)).unwrap();
        writer.write_profile(&snapshot(1)).unwrap();
        let met = std::fs::read_to_string(writer.met_path("1_2_test")).unwrap();
        assert_eq!(met.lines().count(), 3);
        let pro = std::fs::read_to_string(writer.profile_path("1_2_test")).unwrap();
        assert!(pro.starts_with("[PROFILE] 2020-01-01T01:00:00 layers=0"));
    }
}
