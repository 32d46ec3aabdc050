//! # Luna Tracker Core Library
//!
//! This library computes the Moon's appearance for a moment and a place on
//! Earth and renders it as a raster bitmap for an e-paper display. It runs as
//! a short-lived pass on a Raspberry Pi: an external timer invokes the binary
//! once a minute, and each pass either publishes a fresh bitmap or fails and
//! leaves the previous one untouched.
//!
//! ## Pipeline
//!
//! 1. **Ephemeris** ([`ephemeris`]): hourly Moon RA/Dec/illumination rows are
//!    loaded read-only from per-year CSV files and interpolated to the
//!    requested instant.
//! 2. **Calculator** ([`lunar`]): equatorial coordinates are converted to
//!    altitude/azimuth for the configured observer, and rise/set times are
//!    found by scanning the altitude function across ±24 h.
//! 3. **Composer** ([`renderer`] over [`canvas`]): the phase disc, sky
//!    indicator, and labels are drawn into an owned pixel buffer at the
//!    panel's exact resolution and bit depth.
//! 4. **Output** ([`output`]): the buffer is serialized to a BMP file and
//!    atomically renamed into place, so the display driver never reads a
//!    partial image.
//! 5. **Display** ([`display`]): the external driver binary is invoked with
//!    the bitmap path and a screen-mode selector; its exit status is surfaced.
//!
//! No state survives between passes other than the published bitmap and the
//! on-disk configuration, both re-read at the start of each pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod canvas;
pub mod config;
pub mod display;
pub mod ephemeris;
pub mod font;
pub mod lunar;
pub mod output;
pub mod renderer;

/// An observer's position on Earth.
///
/// Latitude is degrees north-positive in [-90, 90], longitude degrees
/// east-positive in [-180, 180]. Loaded from the configuration store at the
/// start of each rendering pass and read-only afterwards; range checking
/// happens at load time via [`ObserverLocation::in_range`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,
}

impl ObserverLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both coordinates are physically meaningful.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// The Moon's position in the observer's sky at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyPoint {
    /// Degrees above the horizon (negative below).
    pub altitude_deg: f64,
    /// Compass bearing in degrees, 0 = north, increasing clockwise.
    pub azimuth_deg: f64,
}

/// Everything the composer needs to draw one pass, derived fresh from the
/// ephemeris by [`lunar::compute`]. Never persisted, never mutated after
/// construction.
#[derive(Clone, Debug, PartialEq)]
pub struct MoonState {
    /// Illuminated fraction of the disc, always in [0, 1].
    pub phase_fraction: f64,
    /// True while the illuminated fraction is increasing.
    pub waxing: bool,
    /// Degrees above the horizon at the instant (negative below).
    pub altitude_deg: f64,
    /// Compass bearing in degrees, 0 = north, clockwise.
    pub azimuth_deg: f64,
    /// Nearest ascending horizon crossing, absent when circumpolar.
    pub rise_time: Option<DateTime<Utc>>,
    /// Nearest descending horizon crossing, absent when circumpolar.
    pub set_time: Option<DateTime<Utc>>,
    /// Sky track from rise to set at half-hour steps; empty when either
    /// endpoint is absent.
    pub path: Vec<SkyPoint>,
}

impl MoonState {
    /// True when the Moon's center is above the horizon.
    pub fn is_up(&self) -> bool {
        self.altitude_deg > 0.0
    }
}
