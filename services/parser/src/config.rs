//! Runtime settings read from the environment (`.env` is loaded by the
//! binaries through dotenvy before this runs).

use std::path::PathBuf;

use crate::error::{IngestError, Result};
use crate::pipeline::{ExportLayout, PipelineConfig, DEFAULT_HEADER_ROW};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding the yearly workbooks.
    pub data_dir: PathBuf,
    /// Directory holding the boundary GeoJSON files.
    pub shape_dir: PathBuf,
    pub header_row: usize,
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            shape_dir: data_dir.join("shapes"),
            data_dir,
            header_row: DEFAULT_HEADER_ROW,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Settings {
    /// Reads `DATA_DIR`, `SHAPE_DIR`, `HEADER_ROW` and `API_BIND`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let data_dir = lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir);
        let shape_dir = lookup("SHAPE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("shapes"));
        let header_row = match lookup("HEADER_ROW") {
            Some(value) => value.trim().parse::<usize>().map_err(|e: std::num::ParseIntError| IngestError::Config {
                key: "HEADER_ROW".to_string(),
                value: value.clone(),
                message: e.to_string(),
            })?,
            None => defaults.header_row,
        };
        let bind = lookup("API_BIND").unwrap_or(defaults.bind);

        Ok(Self {
            data_dir,
            shape_dir,
            header_row,
            bind,
        })
    }

    /// Pipeline configuration with the default tables and this header row.
    pub fn pipeline(&self, layout: ExportLayout, convert_months: bool) -> PipelineConfig {
        PipelineConfig {
            header_row: self.header_row,
            layout,
            convert_months,
            ..PipelineConfig::default()
        }
    }
}
