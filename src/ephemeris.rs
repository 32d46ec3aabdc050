//! # Moon Ephemeris Table
//!
//! Precomputed Moon coordinates are shipped as one CSV file per year, named
//! `<year>.csv`, with one row per UTC hour:
//!
//! ```text
//! # timestamp,ra_hours,dec_deg,diameter_arcsec,illum_frac,magnitude
//! 2024-01-01T00:00,9.2748,20.9167,1878.1,0.7542,-11.82
//! ```
//!
//! Fields are the timestamp (minute must be 00), right ascension in decimal
//! hours, declination in degrees, apparent angular diameter in arcseconds,
//! illuminated fraction in [0, 1], and apparent magnitude. Blank lines and
//! `#` comments are ignored. The files are consumed read-only and are
//! validated on load to be monotonically increasing and gapless at hourly
//! granularity, which is what makes the bracketing lookup in [`Ephemeris::sample`]
//! a simple binary search.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors from loading or querying the ephemeris table.
#[derive(Error, Debug)]
pub enum EphemerisError {
    /// The requested instant is not covered by the loaded year files.
    #[error("instant {0} is outside ephemeris coverage")]
    OutOfRange(DateTime<Utc>),

    /// A year file could not be read.
    #[error("ephemeris IO: {0}")]
    Io(#[from] io::Error),

    /// A year file is malformed (bad field, out-of-order rows, hourly gap).
    #[error("ephemeris parse error: {0}")]
    Parse(String),
}

/// One hourly row of the ephemeris table. Immutable once loaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EphemerisRow {
    /// Hour-resolution UTC timestamp.
    pub timestamp: DateTime<Utc>,
    /// Right ascension in decimal hours [0, 24).
    pub ra_hours: f64,
    /// Declination in degrees.
    pub dec_deg: f64,
    /// Apparent angular diameter in arcseconds.
    pub diameter_arcsec: f64,
    /// Illuminated fraction in [0, 1].
    pub illum_frac: f64,
    /// Apparent visual magnitude.
    pub magnitude: f64,
}

/// Values interpolated between two bracketing hourly rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoonSample {
    pub ra_hours: f64,
    pub dec_deg: f64,
    pub diameter_arcsec: f64,
    pub illum_frac: f64,
    pub magnitude: f64,
}

/// An in-memory, validated slice of the ephemeris table.
#[derive(Clone, Debug)]
pub struct Ephemeris {
    rows: Vec<EphemerisRow>,
}

impl Ephemeris {
    /// Build from pre-parsed rows, validating ordering and hourly spacing.
    pub fn from_rows(rows: Vec<EphemerisRow>) -> Result<Self, EphemerisError> {
        if rows.len() < 2 {
            return Err(EphemerisError::Parse(
                "ephemeris needs at least two hourly rows".into(),
            ));
        }
        for pair in rows.windows(2) {
            let gap = pair[1].timestamp - pair[0].timestamp;
            if gap != Duration::hours(1) {
                return Err(EphemerisError::Parse(format!(
                    "rows not hourly/ordered at {} -> {}",
                    pair[0].timestamp, pair[1].timestamp
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Load the year files needed to cover `instant` plus the ±24 h rise/set
    /// search window (so at most two files across a year boundary). A missing
    /// neighbor year merely shortens the window; missing coverage of
    /// `instant` itself is [`EphemerisError::OutOfRange`].
    pub fn load(dir: &Path, instant: DateTime<Utc>) -> Result<Self, EphemerisError> {
        let margin = Duration::hours(25);
        let first_year = (instant - margin).year();
        let last_year = (instant + margin).year();

        let mut rows = Vec::new();
        for year in first_year..=last_year {
            let path = dir.join(format!("{year}.csv"));
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("no ephemeris file {}", path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let count = rows.len();
            parse_year(&text, &mut rows)?;
            info!(
                "loaded {} ephemeris rows from {}",
                rows.len() - count,
                path.display()
            );
        }

        if rows.is_empty() {
            return Err(EphemerisError::OutOfRange(instant));
        }
        let eph = Self::from_rows(rows)?;
        if !eph.covers(instant) {
            return Err(EphemerisError::OutOfRange(instant));
        }
        Ok(eph)
    }

    /// First covered instant.
    pub fn start(&self) -> DateTime<Utc> {
        self.rows[0].timestamp
    }

    /// Last covered instant.
    pub fn end(&self) -> DateTime<Utc> {
        self.rows[self.rows.len() - 1].timestamp
    }

    /// True when `instant` can be bracketed by two loaded rows.
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant <= self.end()
    }

    /// Linearly interpolate the table at `instant` using the two bracketing
    /// hourly rows. Right ascension interpolates across the 24 h wrap.
    pub fn sample(&self, instant: DateTime<Utc>) -> Result<MoonSample, EphemerisError> {
        if !self.covers(instant) {
            return Err(EphemerisError::OutOfRange(instant));
        }
        let idx = self
            .rows
            .partition_point(|row| row.timestamp <= instant)
            .saturating_sub(1)
            .min(self.rows.len() - 2);
        let (a, b) = (&self.rows[idx], &self.rows[idx + 1]);
        let t = (instant - a.timestamp).num_seconds() as f64 / 3600.0;

        let mut ra_delta = b.ra_hours - a.ra_hours;
        if ra_delta > 12.0 {
            ra_delta -= 24.0;
        } else if ra_delta < -12.0 {
            ra_delta += 24.0;
        }

        Ok(MoonSample {
            ra_hours: (a.ra_hours + t * ra_delta).rem_euclid(24.0),
            dec_deg: a.dec_deg + t * (b.dec_deg - a.dec_deg),
            diameter_arcsec: a.diameter_arcsec + t * (b.diameter_arcsec - a.diameter_arcsec),
            illum_frac: (a.illum_frac + t * (b.illum_frac - a.illum_frac)).clamp(0.0, 1.0),
            magnitude: a.magnitude + t * (b.magnitude - a.magnitude),
        })
    }
}

/// Parse one year file's rows onto the end of `rows`.
fn parse_year(text: &str, rows: &mut Vec<EphemerisRow>) -> Result<(), EphemerisError> {
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        rows.push(parse_row(line).map_err(|msg| {
            EphemerisError::Parse(format!("line {}: {msg}", lineno + 1))
        })?);
    }
    Ok(())
}

fn parse_row(line: &str) -> Result<EphemerisRow, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, got {}", fields.len()));
    }
    let naive = NaiveDateTime::parse_from_str(fields[0], "%Y-%m-%dT%H:%M")
        .map_err(|e| format!("bad timestamp {:?}: {e}", fields[0]))?;
    let timestamp = naive.and_utc();
    if timestamp.timestamp() % 3600 != 0 {
        return Err(format!("timestamp {:?} is not on the hour", fields[0]));
    }

    let num = |i: usize, name: &str| -> Result<f64, String> {
        fields[i]
            .parse::<f64>()
            .map_err(|e| format!("bad {name} {:?}: {e}", fields[i]))
    };
    let illum_frac = num(4, "illum_frac")?;
    if !(0.0..=1.0).contains(&illum_frac) {
        return Err(format!("illum_frac {illum_frac} outside [0, 1]"));
    }

    Ok(EphemerisRow {
        timestamp,
        ra_hours: num(1, "ra_hours")?,
        dec_deg: num(2, "dec_deg")?,
        diameter_arcsec: num(3, "diameter_arcsec")?,
        illum_frac,
        magnitude: num(5, "magnitude")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    /// Synthetic gapless table with RA advancing 0.55 h per hour (roughly the
    /// real lunar rate) and illumination ramping linearly.
    fn synthetic(rows: i64) -> Ephemeris {
        let rows = (0..rows)
            .map(|h| EphemerisRow {
                timestamp: hour(h),
                ra_hours: (h as f64 * 0.55).rem_euclid(24.0),
                dec_deg: 10.0 + 0.1 * h as f64,
                diameter_arcsec: 1800.0,
                illum_frac: (0.3 + 0.005 * h as f64).min(1.0),
                magnitude: -11.0,
            })
            .collect();
        Ephemeris::from_rows(rows).unwrap()
    }

    #[test]
    fn parses_a_well_formed_row() {
        let row = parse_row("2024-01-01T05:00, 9.2748, 20.9167, 1878.1, 0.7542, -11.82").unwrap();
        assert_eq!(row.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap());
        assert!((row.ra_hours - 9.2748).abs() < 1e-9);
        assert!((row.illum_frac - 0.7542).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(parse_row("2024-01-01T05:00,9.27,20.9,1878.1,0.75").is_err());
        assert!(parse_row("2024-01-01T05:30,9.27,20.9,1878.1,0.75,-11.8").is_err());
        assert!(parse_row("2024-01-01T05:00,NaNish,20.9,1878.1,0.75,-11.8").is_err());
        assert!(parse_row("2024-01-01T05:00,9.27,20.9,1878.1,1.75,-11.8").is_err());
    }

    #[test]
    fn rejects_hourly_gaps() {
        let mut rows: Vec<EphemerisRow> = (0..4)
            .map(|h| EphemerisRow {
                timestamp: hour(h),
                ra_hours: 0.0,
                dec_deg: 0.0,
                diameter_arcsec: 1800.0,
                illum_frac: 0.5,
                magnitude: -11.0,
            })
            .collect();
        rows.remove(2);
        assert!(matches!(
            Ephemeris::from_rows(rows),
            Err(EphemerisError::Parse(_))
        ));
    }

    #[test]
    fn sample_interpolates_between_hours() {
        let eph = synthetic(10);
        let mid = eph.sample(hour(2) + Duration::minutes(30)).unwrap();
        assert!((mid.dec_deg - 10.25).abs() < 1e-9);
        assert!((mid.illum_frac - 0.3125).abs() < 1e-9);

        // Exactly on a row reproduces the row.
        let on = eph.sample(hour(3)).unwrap();
        assert!((on.dec_deg - 10.3).abs() < 1e-9);
    }

    #[test]
    fn sample_wraps_right_ascension() {
        let rows = vec![
            EphemerisRow {
                timestamp: hour(0),
                ra_hours: 23.8,
                dec_deg: 0.0,
                diameter_arcsec: 1800.0,
                illum_frac: 0.5,
                magnitude: -11.0,
            },
            EphemerisRow {
                timestamp: hour(1),
                ra_hours: 0.3,
                dec_deg: 0.0,
                diameter_arcsec: 1800.0,
                illum_frac: 0.5,
                magnitude: -11.0,
            },
        ];
        let eph = Ephemeris::from_rows(rows).unwrap();
        let mid = eph.sample(hour(0) + Duration::minutes(30)).unwrap();
        // Halfway through a 0.5 h advance across the wrap: 23.8 + 0.25 = 0.05.
        assert!((mid.ra_hours - 0.05).abs() < 1e-9);
    }

    #[test]
    fn sample_outside_coverage_is_out_of_range() {
        let eph = synthetic(10);
        assert!(matches!(
            eph.sample(hour(-1)),
            Err(EphemerisError::OutOfRange(_))
        ));
        assert!(matches!(
            eph.sample(hour(10)),
            Err(EphemerisError::OutOfRange(_))
        ));
    }

    #[test]
    fn load_reads_year_files_and_flags_missing_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("# synthetic table\n");
        for h in 0..48 {
            body.push_str(&format!(
                "2024-06-{:02}T{:02}:00,{:.3},10.0,1800.0,0.500,-11.0\n",
                1 + h / 24,
                h % 24,
                (h as f64 * 0.55) % 24.0
            ));
        }
        fs::write(dir.path().join("2024.csv"), body).unwrap();

        let inside = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let eph = Ephemeris::load(dir.path(), inside).unwrap();
        assert!(eph.covers(inside));

        let outside = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(matches!(
            Ephemeris::load(dir.path(), outside),
            Err(EphemerisError::OutOfRange(_))
        ));
    }
}
