//! Configuration: the luna-config.toml runtime settings, the observer
//! location store, and the setup payload the provisioning page persists.
//!
//! The TOML file tunes the panel geometry and driver invocation and always
//! falls back to defaults when missing or malformed. The observer location
//! is different: without it the rendered image would be meaningless, so a
//! missing location is a hard error for the pass.

use crate::canvas::{BitDepth, CanvasSpec, Mirror, Rotate};
use crate::ObserverLocation;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Application configuration loaded from luna-config.toml.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Panel geometry and driver invocation.
    pub display: DisplayConfig,
    /// Filesystem locations the pipeline reads and writes.
    pub paths: PathsConfig,
}

/// E-paper panel and driver configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// Panel memory width in pixels.
    pub width: u32,
    /// Panel memory height in pixels.
    pub height: u32,
    /// Grayscale depth, 1/2/4/8 bits per pixel.
    pub bpp: BitDepth,
    /// Logical rotation applied to all drawing.
    pub rotate: Rotate,
    pub mirror: Mirror,
    /// Screen-mode selector forwarded to the driver.
    pub mode: u8,
    /// Driver command line; the mode and bitmap path are appended. When
    /// absent the pass stops after publishing the bitmap.
    pub command: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory of per-year ephemeris CSV files.
    pub ephemeris_dir: String,
    /// Directory holding the latitude/longitude scalar files.
    pub config_dir: String,
    /// Scratch directory the bitmap is published into.
    pub scratch_dir: String,
    /// Published bitmap file name within the scratch directory.
    pub output_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            display: DisplayConfig {
                width: 1872, // Waveshare 10.3" panel
                height: 1404,
                bpp: BitDepth::Four,
                rotate: Rotate::R0,
                mirror: Mirror::None,
                mode: 1,
                command: None,
            },
            paths: PathsConfig {
                ephemeris_dir: "/var/lib/luna/ephemeris".to_string(),
                config_dir: "/var/lib/luna/config".to_string(),
                scratch_dir: "/var/tmp/luna".to_string(),
                output_name: "moon-display.bmp".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from luna-config.toml in the working directory.
    /// Falls back to defaults when the file is missing or invalid.
    pub fn load() -> Self {
        Self::load_from_path("luna-config.toml")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        "loaded configuration: {}x{} @ {:?}",
                        config.display.width, config.display.height, config.display.bpp
                    );
                    config
                }
                Err(e) => {
                    warn!("invalid config file, using defaults: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                info!("no config file found, using defaults");
                Self::default()
            }
        }
    }
}

impl DisplayConfig {
    /// The canvas specification for one rendering pass.
    pub fn spec(&self) -> CanvasSpec {
        CanvasSpec {
            width: self.width,
            height: self.height,
            depth: self.bpp,
            rotate: self.rotate,
            mirror: self.mirror,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("observer location not configured ({0} missing)")]
    Missing(String),
    #[error("observer {0} out of range: {1}")]
    Invalid(&'static str, f64),
    #[error("observer {0} unreadable: {1}")]
    Parse(&'static str, String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn read_scalar(dir: &Path, name: &'static str) -> Result<f64, ConfigError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ConfigError::Missing(path.display().to_string()));
    }
    let text = fs::read_to_string(&path)?;
    text.trim()
        .parse()
        .map_err(|e: std::num::ParseFloatError| ConfigError::Parse(name, e.to_string()))
}

impl ObserverLocation {
    /// Read the observer location from the `latitude` and `longitude` scalar
    /// files in `dir`. Missing files mean the device was never provisioned.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let latitude = read_scalar(dir, "latitude")?;
        let longitude = read_scalar(dir, "longitude")?;
        let location = ObserverLocation::new(latitude, longitude);
        if !location.in_range() {
            let (name, value) = if !(-90.0..=90.0).contains(&latitude) {
                ("latitude", latitude)
            } else {
                ("longitude", longitude)
            };
            return Err(ConfigError::Invalid(name, value));
        }
        Ok(location)
    }
}

/// The JSON body the provisioning page submits; persisted so the renderer
/// can read the location back on the next pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupPayload {
    pub datetime: String,
    pub latitude: f64,
    pub longitude: f64,
    pub tzcode: String,
}

impl SetupPayload {
    /// Write the location scalars this payload carries into `dir`.
    pub fn persist(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("latitude"), format!("{}\n", self.latitude))?;
        fs::write(dir.join("longitude"), format!("{}\n", self.longitude))?;
        Ok(())
    }
}
