//! Snow cover files
use super::{iso, ISO_FORMAT};
use crate::grid::NODATA;
use crate::model::{CellProfile, Layer, SnowProfile};
use crate::types::{Error, Result, Timestamp};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Supported snow cover file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileFormat {
    /// SMET-style text file
    #[default]
    Smet,
    /// JSON document
    Json,
}

const SMET_FIELDS: &str = "deposition_date thickness temperature vol_ice vol_water grain_radius";

impl ProfileFormat {
    /// File extension of the format
    pub fn extension(&self) -> &'static str {
        match self {
            ProfileFormat::Smet => "sno",
            ProfileFormat::Json => "json",
        }
    }

    /// Parse a profile.
    pub fn parse(&self, text: &str) -> Result<SnowProfile> {
        match self {
            ProfileFormat::Smet => parse_smet(text),
            ProfileFormat::Json => Ok(serde_json::from_str(text)?),
        }
    }

    /// Serialise a profile.
    pub fn render(&self, cell: &CellProfile) -> Result<String> {
        match self {
            ProfileFormat::Smet => Ok(render_smet(cell)),
            ProfileFormat::Json => Ok(serde_json::to_string_pretty(&cell.profile)?),
        }
    }
}

fn parse_date(value: &str) -> Result<Timestamp> {
    NaiveDateTime::parse_from_str(value.trim(), ISO_FORMAT)
        .map_err(|e| Error::InitialState(format!("invalid date '{value}': {e}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InitialState(format!("invalid value '{value}' for '{key}'")))
}

fn parse_smet(text: &str) -> Result<SnowProfile> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#'));
    match lines.next() {
        Some(signature) if signature.starts_with("SMET") => {}
        _ => return Err(Error::InitialState("missing SMET signature".to_string())),
    }

    let mut header = HashMap::new();
    let mut in_data = false;
    let mut layers = vec![];
    for line in lines {
        match line {
            "[HEADER]" => continue,
            "[DATA]" => {
                in_data = true;
                continue;
            }
            _ => {}
        }
        if !in_data {
            if let Some((key, value)) = line.split_once('=') {
                header.insert(key.trim().to_string(), value.trim().to_string());
            }
            continue;
        }
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 6 {
            return Err(Error::InitialState(format!(
                "expected 6 fields per layer, got {}: '{line}'",
                fields.len()
            )));
        }
        layers.push(Layer {
            deposition_date: parse_date(fields[0])?,
            thickness: parse_number("thickness", fields[1])?,
            temperature: parse_number("temperature", fields[2])?,
            vol_ice: parse_number("vol_ice", fields[3])?,
            vol_water: parse_number("vol_water", fields[4])?,
            grain_radius: parse_number("grain_radius", fields[5])?,
        });
    }

    let get = |key: &str| {
        header
            .get(key)
            .ok_or_else(|| Error::InitialState(format!("missing header key '{key}'")))
    };
    let profile = SnowProfile {
        profile_date: parse_date(get("profile_date")?)?,
        soil_layers: parse_number("soil_layers", get("soil_layers")?)?,
        albedo: parse_number("albedo", get("albedo")?)?,
        layers,
    };
    if profile.soil_layers > profile.layers.len() {
        return Err(Error::InitialState(format!(
            "{} soil layers announced but only {} layers given",
            profile.soil_layers,
            profile.layers.len()
        )));
    }
    Ok(profile)
}

fn render_smet(cell: &CellProfile) -> String {
    let mut out = String::from("SMET 1.1 ASCII\n[HEADER]\n");
    out += &format!("station_id   = {}\n", cell.meta.station_id);
    out += &format!("station_name = {}\n", cell.meta.station_name);
    out += &format!("easting      = {:.1}\n", cell.meta.easting);
    out += &format!("northing     = {:.1}\n", cell.meta.northing);
    out += &format!("altitude     = {:.1}\n", cell.meta.altitude);
    out += &format!("profile_date = {}\n", iso(&cell.profile.profile_date));
    out += &format!("soil_layers  = {}\n", cell.profile.soil_layers);
    out += &format!("albedo       = {:.3}\n", cell.profile.albedo);
    out += &format!("nodata       = {NODATA}\n");
    out += &format!("fields       = {SMET_FIELDS}\n[DATA]\n");
    for l in &cell.profile.layers {
        out += &format!(
            "{} {:.6} {:.3} {:.6} {:.6} {:.4}\n",
            iso(&l.deposition_date),
            l.thickness,
            l.temperature,
            l.vol_ice,
            l.vol_water,
            l.grain_radius
        );
    }
    out
}

/// A directory of snow cover files of one format.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    directory: PathBuf,
    format: ProfileFormat,
}

impl ProfileStore {
    /// Create a store.
    pub fn new(directory: impl Into<PathBuf>, format: ProfileFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
        }
    }

    /// The directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The file format
    pub fn format(&self) -> ProfileFormat {
        self.format
    }

    /// Path of the file holding profile `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.directory
            .join(format!("{name}.{}", self.format.extension()))
    }

    /// Is there a profile called `name`?
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Read profile `name`.
    pub fn read(&self, name: &str) -> Result<SnowProfile> {
        let path = self.path(name);
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::InitialState(format!("{}: {e}", path.display())))?;
        self.format.parse(&text).map_err(|e| match e {
            Error::InitialState(reason) => Error::InitialState(format!("{}: {reason}", path.display())),
            other => Error::InitialState(format!("{}: {other}", path.display())),
        })
    }

    /// Write the profile of a cell, named after the cell.
    pub fn write(&self, cell: &CellProfile) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        fs::write(self.path(&cell.meta.station_name), self.format.render(cell)?)?;
        Ok(())
    }
}
