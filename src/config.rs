// src/config.rs

use crate::error::Result;
use crate::graph::{GaussianDistance, NnStrategy, DEFAULT_CUTOFF};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

// --- Gaussian bond expansion ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianConfig {
  pub centers: usize,
  pub min: f64,
  pub max: f64,
  pub width: f64,
}

impl Default for GaussianConfig {
  fn default() -> Self {
    Self {
      centers: 100,
      min: 0.0,
      max: 5.0,
      width: 0.5,
    }
  }
}

impl GaussianConfig {
  pub fn build(&self) -> Result<GaussianDistance> {
    GaussianDistance::linspace(self.min, self.max, self.centers, self.width)
  }
}

// --- Main Config Struct ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
  #[serde(default = "default_cutoff")]
  pub cutoff: f64,

  #[serde(default)]
  pub strategy: NnStrategy,

  /// Use occupancy embeddings instead of atomic numbers
  #[serde(default)]
  pub disordered: bool,

  /// JSON file of element embeddings, required when `disordered` is set
  #[serde(default)]
  pub embeddings: Option<PathBuf>,

  /// Bond features stay raw distances when absent
  #[serde(default)]
  pub gaussian: Option<GaussianConfig>,

  #[serde(default = "default_log_level")]
  pub log_level: String,
}

fn default_cutoff() -> f64 {
  DEFAULT_CUTOFF
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cutoff: default_cutoff(),
      strategy: NnStrategy::default(),
      disordered: false,
      embeddings: None,
      gaussian: None,
      log_level: default_log_level(),
    }
  }
}

impl Config {
  /// Loads config from standard OS location (e.g., ~/.config/crystal-graph/settings.json)
  pub fn load() -> (Self, String) {
    let path = Self::get_path();
    if path.exists() {
      match Self::load_from(&path) {
        Ok(cfg) => (cfg, format!("Config loaded from {:?}", path)),
        Err(e) => (Self::default(), format!("Error reading config: {}", e)),
      }
    } else {
      (
        Self::default(),
        "No config found. Using defaults.".to_string(),
      )
    }
  }

  pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
  }

  /// Saves config to standard OS location
  pub fn save(&self) -> String {
    let path = Self::get_path();
    match self.save_to(&path) {
      Ok(()) => format!("Config saved to {:?}", path),
      Err(e) => format!("Failed to save config: {}", e),
    }
  }

  pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, self)?;
    Ok(())
  }

  pub fn get_path() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("org", "crystalgraph", "crystal-graph") {
      proj.config_dir().join("settings.json")
    } else {
      PathBuf::from("settings.json")
    }
  }
}
