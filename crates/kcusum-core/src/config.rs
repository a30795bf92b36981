//! Pipeline Configuration
//!
//! JSON configuration for a full fit → generate → detect run. Every field is
//! optional in the file; missing fields take the defaults below.
//!
//! ```json
//! {
//!   "fitter":   { "bins": 100, "catalog": ["norm", "gamma", "lognorm"] },
//!   "detector": { "h": 0.015, "delta": 0.1 },
//!   "seed": 42,
//!   "axis": "x"
//! }
//! ```

use crate::detector::DetectorConfig;
use crate::fitting::FitterConfig;
use crate::trajectory::Axis;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fitter: FitterConfig,
    pub detector: DetectorConfig,
    /// Seed for the reference stream; drawn from the OS when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Coordinate reduced per frame when reading trajectories
    pub axis: Axis,
}

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigFileError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
