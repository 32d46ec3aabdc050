//! Lunar geometry: equatorial to horizontal conversion and rise/set search.
//!
//! The coordinate conversion follows the classic stargazing.net formulation
//! (low-precision sidereal time plus the standard alt/az relations) and is
//! spot-checked in the tests against independently published values. It is a
//! pure function of {RA, Dec, latitude, longitude, instant}: calling it twice
//! with the same inputs returns bit-identical results.
//!
//! Rise and set are not read from a table; they are found by scanning the
//! altitude function over the ephemeris rows spanning ±24 h around the
//! requested instant and picking the ascending and descending horizon
//! crossings nearest to it. At extreme latitudes the Moon can stay on one
//! side of the horizon for the whole window, in which case both are absent.

use crate::ephemeris::{Ephemeris, EphemerisError};
use crate::{MoonState, ObserverLocation, SkyPoint};
use chrono::{DateTime, Duration, Timelike, Utc};
use log::debug;

/// Unix timestamp of the J2000.0 epoch, 2000-01-01 12:00 UTC.
const J2000_UNIX: i64 = 946_728_000;

/// Fractional days since the J2000 epoch.
pub fn days_since_j2000(instant: DateTime<Utc>) -> f64 {
    (instant.timestamp() - J2000_UNIX) as f64 / 86_400.0
}

fn dsin(deg: f64) -> f64 {
    deg.to_radians().sin()
}

fn dcos(deg: f64) -> f64 {
    deg.to_radians().cos()
}

/// Local sidereal time in degrees [0, 360).
pub fn local_sidereal_time(instant: DateTime<Utc>, longitude: f64) -> f64 {
    let ut_hours = instant.hour() as f64
        + instant.minute() as f64 / 60.0
        + instant.second() as f64 / 3600.0;
    (100.46 + 0.985647 * days_since_j2000(instant) + longitude + 15.0 * ut_hours).rem_euclid(360.0)
}

/// Convert equatorial coordinates (RA in decimal hours, Dec in degrees) to
/// the observer's horizontal coordinates at `instant`.
pub fn horizontal(
    instant: DateTime<Utc>,
    location: ObserverLocation,
    ra_hours: f64,
    dec_deg: f64,
) -> SkyPoint {
    let lst = local_sidereal_time(instant, location.longitude);
    let hour_angle = (lst - ra_hours * 15.0).rem_euclid(360.0);

    let lat = location.latitude;
    let sin_alt = dsin(dec_deg) * dsin(lat) + dcos(dec_deg) * dcos(lat) * dcos(hour_angle);
    let altitude_deg = sin_alt.clamp(-1.0, 1.0).asin().to_degrees();

    let cos_az = (dsin(dec_deg) - dsin(altitude_deg) * dsin(lat))
        / (dcos(altitude_deg) * dcos(lat));
    let az = cos_az.clamp(-1.0, 1.0).acos().to_degrees();
    let azimuth_deg = if dsin(hour_angle) > 0.0 { 360.0 - az } else { az };

    SkyPoint {
        altitude_deg,
        azimuth_deg,
    }
}

/// Find the ascending and descending horizon crossings nearest to `instant`
/// in a sampled altitude series (time-ordered). Each crossing is refined by
/// linear interpolation between its bracketing samples. A series that never
/// changes sign yields `(None, None)`.
fn horizon_crossings(
    series: &[(DateTime<Utc>, f64)],
    instant: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut rise: Option<DateTime<Utc>> = None;
    let mut set: Option<DateTime<Utc>> = None;
    let mut keep_nearest = |slot: &mut Option<DateTime<Utc>>, t: DateTime<Utc>| {
        let closer = slot
            .map(|prev| (t - instant).abs() < (prev - instant).abs())
            .unwrap_or(true);
        if closer {
            *slot = Some(t);
        }
    };

    for pair in series.windows(2) {
        let (t0, a0) = pair[0];
        let (t1, a1) = pair[1];
        let ascending = a0 <= 0.0 && a1 > 0.0;
        let descending = a0 > 0.0 && a1 <= 0.0;
        if !(ascending || descending) {
            continue;
        }
        let frac = a0 / (a0 - a1);
        let t = t0 + Duration::seconds(((t1 - t0).num_seconds() as f64 * frac).round() as i64);
        if ascending {
            keep_nearest(&mut rise, t);
        } else {
            keep_nearest(&mut set, t);
        }
    }
    (rise, set)
}

/// Compute the Moon's state for `instant` and `location`.
///
/// Fails with [`EphemerisError::OutOfRange`] when `instant` is outside the
/// loaded ephemeris coverage; the rise/set search window is clamped to
/// coverage at the table edges instead of erroring.
pub fn compute(
    eph: &Ephemeris,
    instant: DateTime<Utc>,
    location: ObserverLocation,
) -> Result<MoonState, EphemerisError> {
    let now = eph.sample(instant)?;
    let here = horizontal(instant, location, now.ra_hours, now.dec_deg);

    // Waxing is judged against the fraction one hour earlier; at the very
    // start of coverage, one hour later with the comparison inverted.
    let earlier = instant - Duration::hours(1);
    let later = instant + Duration::hours(1);
    let waxing = if eph.covers(earlier) {
        now.illum_frac > eph.sample(earlier)?.illum_frac
    } else if eph.covers(later) {
        eph.sample(later)?.illum_frac > now.illum_frac
    } else {
        true
    };

    // Altitude sampled hourly across +-24 h, clamped to coverage.
    let start = (instant - Duration::hours(24)).max(eph.start());
    let end = (instant + Duration::hours(24)).min(eph.end());
    let mut series = Vec::new();
    let mut t = start;
    while t < end {
        series.push((t, altitude_at(eph, t, location)?));
        t += Duration::hours(1);
    }
    series.push((end, altitude_at(eph, end, location)?));
    let (rise_time, set_time) = horizon_crossings(&series, instant);
    debug!(
        "rise {:?} set {:?} (window {} .. {})",
        rise_time, set_time, start, end
    );

    // Sky track for the current above-horizon arc, drawn only while the Moon
    // is up (rise behind us, set ahead).
    let mut path = Vec::new();
    if let (Some(rise), Some(set)) = (rise_time, set_time) {
        if rise < set {
            let mut t = rise;
            while t < set {
                path.push(sky_point_at(eph, t, location)?);
                t += Duration::minutes(30);
            }
            path.push(sky_point_at(eph, set, location)?);
        }
    }

    Ok(MoonState {
        phase_fraction: now.illum_frac.clamp(0.0, 1.0),
        waxing,
        altitude_deg: here.altitude_deg,
        azimuth_deg: here.azimuth_deg,
        rise_time,
        set_time,
        path,
    })
}

fn sky_point_at(
    eph: &Ephemeris,
    t: DateTime<Utc>,
    location: ObserverLocation,
) -> Result<SkyPoint, EphemerisError> {
    let s = eph.sample(t)?;
    Ok(horizontal(t, location, s.ra_hours, s.dec_deg))
}

fn altitude_at(
    eph: &Ephemeris,
    t: DateTime<Utc>,
    location: ObserverLocation,
) -> Result<f64, EphemerisError> {
    Ok(sky_point_at(eph, t, location)?.altitude_deg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeris::EphemerisRow;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn days_since_j2000_matches_reference() {
        let d = days_since_j2000(utc(2008, 4, 4, 15, 30));
        assert!((d - 3016.1458).abs() < 1e-3, "got {d}");
    }

    /// Reference values from the stargazing.net alt/az worked examples, the
    /// same figures the original moon-clock geometry was validated against.
    #[test]
    fn horizontal_matches_birmingham_1998_reference() {
        let instant = utc(1998, 8, 10, 23, 10);
        let loc = ObserverLocation::new(52.5, -1.916_666_7);
        let lst = local_sidereal_time(instant, loc.longitude);
        assert!((lst - 304.8076).abs() < 1e-3, "lst {lst}");

        let p = horizontal(instant, loc, 16.695, 36.466_667);
        assert!((p.altitude_deg - 49.1691).abs() < 1e-3, "alt {}", p.altitude_deg);
        assert!((p.azimuth_deg - 269.1463).abs() < 1e-3, "az {}", p.azimuth_deg);
    }

    #[test]
    fn horizontal_matches_hale_bopp_1997_reference() {
        let instant = utc(1997, 3, 14, 19, 0);
        let loc = ObserverLocation::new(52.5, -1.916_666_7);
        let lst = local_sidereal_time(instant, loc.longitude);
        assert!((lst - 95.5139).abs() < 1e-3, "lst {lst}");

        let p = horizontal(instant, loc, 22.0 + 59.8 / 60.0, 42.0 + 43.0 / 60.0);
        assert!((p.altitude_deg - 22.4010).abs() < 1e-3, "alt {}", p.altitude_deg);
        assert!((p.azimuth_deg - 311.9226).abs() < 1e-3, "az {}", p.azimuth_deg);
    }

    #[test]
    fn horizontal_matches_nyc_2023_reference() {
        let instant = utc(2023, 5, 25, 21, 16);
        let loc = ObserverLocation::new(40.8, -73.95);
        let p = horizontal(instant, loc, 9.2748, 20.9167);
        assert!((p.altitude_deg - 68.0763).abs() < 1e-3, "alt {}", p.altitude_deg);
        assert!((p.azimuth_deg - 151.8275).abs() < 1e-3, "az {}", p.azimuth_deg);
    }

    #[test]
    fn crossings_found_at_synthetic_rise_and_set_hours() {
        // Triangle altitude: zero ascending at +3 h, descending at +15 h,
        // negative everywhere else in the window.
        let t0 = utc(2024, 6, 1, 0, 0);
        let series: Vec<_> = (-24..=24)
            .map(|h| (t0 + Duration::hours(h), 6.0 - (h as f64 - 9.0).abs()))
            .collect();

        let (rise, set) = horizon_crossings(&series, t0);
        assert_eq!(rise, Some(t0 + Duration::hours(3)));
        assert_eq!(set, Some(t0 + Duration::hours(15)));
    }

    #[test]
    fn crossing_times_are_interpolated_between_hours() {
        // Crosses zero halfway between +1 h and +2 h, back at +10.5 h.
        let t0 = utc(2024, 6, 1, 0, 0);
        let series: Vec<_> = (-24..=24)
            .map(|h| (t0 + Duration::hours(h), (h as f64 - 1.5) * (10.5 - h as f64)))
            .collect();

        let (rise, set) = horizon_crossings(&series, t0);
        // The product parabola is negative before 1.5 and after 10.5.
        assert!(rise.is_some() && set.is_some());
        let rise = rise.unwrap();
        let set = set.unwrap();
        assert!((rise - (t0 + Duration::minutes(90))).num_minutes().abs() <= 30);
        assert!((set - (t0 + Duration::minutes(630))).num_minutes().abs() <= 30);
    }

    #[test]
    fn circumpolar_window_has_no_crossings() {
        let t0 = utc(2024, 6, 1, 0, 0);
        let series: Vec<_> = (-24..=24)
            .map(|h| (t0 + Duration::hours(h), 10.0 + (h as f64 / 5.0).sin()))
            .collect();
        assert_eq!(horizon_crossings(&series, t0), (None, None));
    }

    /// Synthetic ephemeris: the Moon parked at RA 0 h / Dec 0 with a slow
    /// linear illumination ramp. Altitude then follows the sidereal day, so
    /// mid-latitude rise/set crossings exist.
    fn parked_moon(start: DateTime<Utc>, hours: i64, ramp: f64) -> Ephemeris {
        let rows = (0..hours)
            .map(|h| EphemerisRow {
                timestamp: start + Duration::hours(h),
                ra_hours: 0.0,
                dec_deg: 0.0,
                diameter_arcsec: 1800.0,
                illum_frac: (0.2 + ramp * h as f64).clamp(0.0, 1.0),
                magnitude: -11.0,
            })
            .collect();
        Ephemeris::from_rows(rows).unwrap()
    }

    #[test]
    fn compute_is_idempotent_and_in_bounds() {
        let start = utc(2024, 6, 1, 0, 0);
        let eph = parked_moon(start, 72, 0.004);
        let loc = ObserverLocation::new(40.71, -74.0);
        let instant = start + Duration::hours(36);

        let a = compute(&eph, instant, loc).unwrap();
        let b = compute(&eph, instant, loc).unwrap();
        assert_eq!(a, b, "same inputs must give bit-identical results");

        assert!((0.0..=1.0).contains(&a.phase_fraction));
        assert!((-90.0..=90.0).contains(&a.altitude_deg));
        assert!((0.0..360.0).contains(&a.azimuth_deg));
        assert!(a.waxing, "ramping illumination should read as waxing");
        assert!(a.rise_time.is_some() && a.set_time.is_some());
    }

    #[test]
    fn compute_is_continuous_across_hour_boundaries() {
        let start = utc(2024, 6, 1, 0, 0);
        let eph = parked_moon(start, 72, 0.004);
        let loc = ObserverLocation::new(40.71, -74.0);

        // One minute straddling an hourly row boundary.
        let before = start + Duration::hours(36) - Duration::seconds(30);
        let after = before + Duration::minutes(1);
        let a = compute(&eph, before, loc).unwrap();
        let b = compute(&eph, after, loc).unwrap();

        assert!((a.phase_fraction - b.phase_fraction).abs() < 1e-3);
        assert!((a.altitude_deg - b.altitude_deg).abs() < 1.0);
    }

    #[test]
    fn compute_reports_waning_for_falling_illumination() {
        let start = utc(2024, 6, 1, 0, 0);
        let rows = (0..72)
            .map(|h| EphemerisRow {
                timestamp: start + Duration::hours(h),
                ra_hours: 0.0,
                dec_deg: 0.0,
                diameter_arcsec: 1800.0,
                illum_frac: 0.9 - 0.004 * h as f64,
                magnitude: -11.0,
            })
            .collect();
        let eph = Ephemeris::from_rows(rows).unwrap();
        let state = compute(&eph, start + Duration::hours(36), ObserverLocation::new(40.71, -74.0))
            .unwrap();
        assert!(!state.waxing);
    }

    #[test]
    fn compute_at_polar_latitude_yields_absent_rise_and_set() {
        let start = utc(2024, 6, 1, 0, 0);
        // Dec pinned well north keeps the Moon above the horizon at 85N for
        // the whole window.
        let rows = (0..72)
            .map(|h| EphemerisRow {
                timestamp: start + Duration::hours(h),
                ra_hours: 0.0,
                dec_deg: 28.0,
                diameter_arcsec: 1800.0,
                illum_frac: 0.5,
                magnitude: -11.0,
            })
            .collect();
        let eph = Ephemeris::from_rows(rows).unwrap();
        let state =
            compute(&eph, start + Duration::hours(36), ObserverLocation::new(85.0, 0.0)).unwrap();
        assert_eq!(state.rise_time, None);
        assert_eq!(state.set_time, None);
        assert!(state.path.is_empty());
    }

    #[test]
    fn compute_outside_coverage_fails() {
        let start = utc(2024, 6, 1, 0, 0);
        let eph = parked_moon(start, 48, 0.004);
        let res = compute(
            &eph,
            start - Duration::hours(1),
            ObserverLocation::new(40.71, -74.0),
        );
        assert!(matches!(res, Err(EphemerisError::OutOfRange(_))));
    }
}
