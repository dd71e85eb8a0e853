//! `tracevis.toml` loading.
//!
//! ```toml
//! [sphere]
//! radius = 5000.0
//! h_multiplier = 1.0
//! v_multiplier = 1.0
//! diam_modifier = 0.0
//!
//! [storage]
//! graph_dir = "saves"
//! disassembly_dir = "saves/disassembly"
//! ```

use crate::domain::coords::Multipliers;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisConfig {
    pub sphere: SphereConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SphereConfig {
    pub radius: f32,
    pub h_multiplier: f32,
    pub v_multiplier: f32,
    pub diam_modifier: f32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        let dims = Multipliers::default();
        Self {
            radius: dims.radius,
            h_multiplier: dims.h_multiplier,
            v_multiplier: dims.v_multiplier,
            diam_modifier: 0.0,
        }
    }
}

impl SphereConfig {
    pub fn dims(&self) -> Multipliers {
        Multipliers {
            radius: self.radius,
            h_multiplier: self.h_multiplier,
            v_multiplier: self.v_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub graph_dir: PathBuf,
    pub disassembly_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            graph_dir: PathBuf::from("saves"),
            disassembly_dir: PathBuf::from("saves/disassembly"),
        }
    }
}

impl VisConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid tracevis config")
    }

    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        Self::from_toml(&text)
    }
}
