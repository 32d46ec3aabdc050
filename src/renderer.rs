//! Image composition: one Moon status frame per call.
//!
//! The frame is laid out south-up, the way the panel hangs on the wall: the
//! Moon disc sits at the center, dotted altitude rings at 0/30/60 degrees
//! surround it (the disc edge itself marks the zenith), and an annulus at the
//! outer edge carries the azimuth pointer and the cardinal letters. With
//! south-up orientation, north is at the bottom of the image and east on the
//! left, so point 0 degrees az maps straight down from center.
//!
//! `compose` is pure: same `MoonState`, instant and spec, same pixels.

use crate::canvas::{Canvas, CanvasSpec, LineStyle};
use crate::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::MoonState;
use chrono::{DateTime, Local, Utc};
use log::debug;

const BG: u8 = 0x10;
const RING: u8 = 0x60;
const POINTER: u8 = 0xD0;
const DISC_DARK: u8 = 0x30;
const DISC_LIT: u8 = 0xF0;

/// Degrees of clearance around the azimuth pointer before a cardinal letter
/// is suppressed.
const CARDINAL_CLEARANCE_DEG: f64 = 12.0;

/// Label ink brightness stepped by illuminated fraction, so a thin crescent
/// frame does not shout at full white.
fn ink_for_illum(fraction: f64) -> u8 {
    if fraction <= 0.25 {
        0xB0
    } else if fraction <= 0.5 {
        0xC0
    } else if fraction <= 0.75 {
        0xD0
    } else {
        0xF0
    }
}

/// Whether the pixel at disc offset (dx, dy) falls on the lit side of the
/// terminator. The terminator is the semi-ellipse `x = k * sqrt(r^2 - y^2)`
/// with `k = 2 * fraction - 1`; the lit side is to the right when waxing.
fn lit_at(fraction: f64, waxing: bool, dx: i32, dy: i32, r: i32) -> bool {
    let k = 2.0 * fraction - 1.0;
    let chord = ((r * r - dy * dy).max(0) as f64).sqrt();
    if waxing {
        dx as f64 >= -k * chord
    } else {
        dx as f64 <= k * chord
    }
}

/// True when `letter_az` stands far enough from the pointer azimuth to stay
/// legible, accounting for the 0/360 wrap.
fn azimuth_clear(pointer_az: f64, letter_az: f64, clearance_deg: f64) -> bool {
    let d = (pointer_az - letter_az).rem_euclid(360.0);
    d.min(360.0 - d) > clearance_deg
}

/// South-up polar mapping: azimuth 0 points down from center, east left.
fn ring_point(cx: i32, cy: i32, az_deg: f64, radius: f64) -> (i32, i32) {
    let az = az_deg.to_radians();
    (
        (cx as f64 - az.sin() * radius).round() as i32,
        (cy as f64 + az.cos() * radius).round() as i32,
    )
}

fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * (GLYPH_WIDTH as i32 + 1) * scale
}

fn draw_text(canvas: &mut Canvas, x: i32, y: i32, text: &str, level: u8, scale: i32) {
    let mut pen_x = x;
    for c in text.chars() {
        let rows = font::glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i32 {
                if bits & (1 << (GLYPH_WIDTH as i32 - 1 - col)) != 0 {
                    let px = pen_x + col * scale;
                    let py = y + row as i32 * scale;
                    canvas.draw_rect(px, py, px + scale - 1, py + scale - 1, level, true);
                }
            }
        }
        pen_x += (GLYPH_WIDTH as i32 + 1) * scale;
    }
}

fn format_clock(t: Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => t.with_timezone(&Local).format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

/// Compose one frame for `state` at `instant` onto a fresh canvas.
pub fn compose(state: &MoonState, instant: DateTime<Utc>, spec: CanvasSpec) -> Canvas {
    let mut canvas = Canvas::new(spec);
    canvas.clear(BG);

    let w = canvas.width() as i32;
    let h = canvas.height() as i32;
    let (cx, cy) = (w / 2, h / 2);
    let margin = (w.min(h) / 40).max(4);
    let r2 = w.min(h) / 2 - margin;
    let ring_w = (r2 / 10).max(4);
    let r1 = r2 - ring_w;
    let disc_r = r1 / 2;
    let ink = ink_for_illum(state.phase_fraction);
    debug!(
        "compose {}x{} r1={} r2={} disc_r={}",
        w, h, r1, r2, disc_r
    );

    // Altitude radius: horizon at the inner ring, zenith at the disc edge.
    let alt_radius = |alt_deg: f64| -> f64 {
        let t = (alt_deg.clamp(0.0, 90.0)) / 90.0;
        r1 as f64 - t * (r1 - disc_r) as f64
    };

    // Reference rings for 0/30/60 degrees altitude; the disc edge marks 90.
    for alt in [0.0, 30.0, 60.0] {
        let mut prev: Option<(i32, i32)> = None;
        let radius = alt_radius(alt);
        for step in 0..=180 {
            let p = ring_point(cx, cy, step as f64 * 2.0, radius);
            if let Some(q) = prev {
                canvas.draw_line(q.0, q.1, p.0, p.1, RING, LineStyle::Dotted);
            }
            prev = Some(p);
        }
    }
    canvas.draw_circle(cx, cy, r1, RING, false);
    canvas.draw_circle(cx, cy, r2, RING, false);

    // Sky track for the current pass, drawn beneath the position marker.
    let mut prev: Option<(i32, i32)> = None;
    for p in &state.path {
        if p.altitude_deg < 0.0 {
            prev = None;
            continue;
        }
        let q = ring_point(cx, cy, p.azimuth_deg, alt_radius(p.altitude_deg));
        if let Some(o) = prev {
            canvas.draw_line(o.0, o.1, q.0, q.1, RING, LineStyle::Dotted);
        }
        prev = Some(q);
    }

    // Azimuth pointer across the annulus, plus the altitude dot when the
    // Moon is above the horizon.
    let (ax0, ay0) = ring_point(cx, cy, state.azimuth_deg, r1 as f64);
    let (ax1, ay1) = ring_point(cx, cy, state.azimuth_deg, r2 as f64);
    canvas.draw_line(ax0, ay0, ax1, ay1, POINTER, LineStyle::Solid);
    canvas.draw_point(ax1, ay1, POINTER, 3);
    if state.is_up() {
        let (mx, my) = ring_point(cx, cy, state.azimuth_deg, alt_radius(state.altitude_deg));
        canvas.draw_point(mx, my, POINTER, (ring_w / 2).max(3));
    }

    // Cardinal letters in the middle of the annulus, skipped where the
    // pointer would collide with them.
    let scale = (w.min(h) / 300).max(1);
    let letter_r = (r1 + r2) as f64 / 2.0;
    for (letter, az) in [("N", 0.0), ("E", 90.0), ("S", 180.0), ("W", 270.0)] {
        if !azimuth_clear(state.azimuth_deg, az, CARDINAL_CLEARANCE_DEG) {
            continue;
        }
        let (lx, ly) = ring_point(cx, cy, az, letter_r);
        draw_text(
            &mut canvas,
            lx - text_width(letter, scale) / 2,
            ly - GLYPH_HEIGHT as i32 * scale / 2,
            letter,
            ink,
            scale,
        );
    }

    // Phase disc, scanline by scanline so the terminator stays exact per row.
    for dy in -disc_r..=disc_r {
        let half = ((disc_r * disc_r - dy * dy) as f64).sqrt() as i32;
        for dx in -half..=half {
            let level = if lit_at(state.phase_fraction, state.waxing, dx, dy, disc_r) {
                DISC_LIT
            } else {
                DISC_DARK
            };
            canvas.set_pixel(cx + dx, cy + dy, level);
        }
    }

    // Labels: instant and phase top-left, rise/set and position bottom-left.
    let line_h = (GLYPH_HEIGHT as i32 + 3) * scale;
    let local = instant.with_timezone(&Local);
    let phase_tag = if state.waxing { "WAXING" } else { "WANING" };
    draw_text(
        &mut canvas,
        margin,
        margin,
        &local.format("%Y-%m-%d %H:%M").to_string(),
        ink,
        scale,
    );
    draw_text(
        &mut canvas,
        margin,
        margin + line_h,
        &format!("{} {:.0}", phase_tag, state.phase_fraction * 100.0),
        ink,
        scale,
    );

    let rows = [
        format!("RISE {}", format_clock(state.rise_time)),
        format!("SET {}", format_clock(state.set_time)),
        format!("ALT {:+.1}", state.altitude_deg),
        format!("AZ {:.1}", state.azimuth_deg),
    ];
    let mut y = h - margin - rows.len() as i32 * line_h;
    for row in &rows {
        draw_text(&mut canvas, margin, y, row, ink, scale);
        y += line_h;
    }

    canvas
}

/// Terminal rendition of the same state, for development without a panel.
pub fn draw_ascii(state: &MoonState, instant: DateTime<Utc>) -> String {
    const ROWS: i32 = 21;
    let r = ROWS / 2;
    let mut out = String::new();
    for dy in -r..=r {
        for dx in -(r * 2)..=(r * 2) {
            // Terminal cells are roughly twice as tall as wide.
            let x = dx / 2;
            let inside = x * x + dy * dy <= r * r;
            out.push(if !inside {
                ' '
            } else if lit_at(state.phase_fraction, state.waxing, x, dy, r) {
                '@'
            } else {
                '.'
            });
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{}  {} {:.0}\n",
        instant.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        if state.waxing { "WAXING" } else { "WANING" },
        state.phase_fraction * 100.0
    ));
    out.push_str(&format!(
        "ALT {:+.1}  AZ {:.1}\n",
        state.altitude_deg, state.azimuth_deg
    ));
    out.push_str(&format!(
        "RISE {}  SET {}\n",
        format_clock(state.rise_time),
        format_clock(state.set_time)
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BitDepth;
    use crate::SkyPoint;
    use chrono::TimeZone;

    fn state(fraction: f64, waxing: bool) -> MoonState {
        MoonState {
            phase_fraction: fraction,
            waxing,
            altitude_deg: 45.0,
            azimuth_deg: 120.0,
            rise_time: None,
            set_time: None,
            path: Vec::new(),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn full_moon_is_lit_everywhere_inside_the_disc() {
        for dy in -10..=10 {
            for dx in -10..=10 {
                if dx * dx + dy * dy <= 100 {
                    assert!(lit_at(1.0, true, dx, dy, 10));
                    assert!(lit_at(1.0, false, dx, dy, 10));
                }
            }
        }
    }

    #[test]
    fn new_moon_is_dark_off_the_terminator() {
        assert!(!lit_at(0.0, true, 0, 0, 10));
        assert!(!lit_at(0.0, true, -5, 3, 10));
        assert!(!lit_at(0.0, false, 5, -3, 10));
    }

    #[test]
    fn quarter_moon_splits_the_disc_by_waxing_side() {
        // First quarter lights the right half, last quarter the left.
        assert!(lit_at(0.5, true, 4, 0, 10));
        assert!(!lit_at(0.5, true, -4, 0, 10));
        assert!(lit_at(0.5, false, -4, 0, 10));
        assert!(!lit_at(0.5, false, 4, 0, 10));
    }

    #[test]
    fn azimuth_clearance_wraps_at_north() {
        assert!(!azimuth_clear(358.0, 0.0, 12.0));
        assert!(!azimuth_clear(3.0, 0.0, 12.0));
        assert!(!azimuth_clear(0.5, 359.5, 12.0));
        assert!(azimuth_clear(90.0, 0.0, 12.0));
        assert!(azimuth_clear(180.0, 0.0, 12.0));
    }

    #[test]
    fn ink_steps_with_illumination() {
        assert!(ink_for_illum(0.1) < ink_for_illum(0.4));
        assert!(ink_for_illum(0.4) < ink_for_illum(0.9));
    }

    #[test]
    fn south_up_mapping_puts_north_below_center() {
        let (x, y) = ring_point(100, 100, 0.0, 50.0);
        assert_eq!((x, y), (100, 150));
        let (x, y) = ring_point(100, 100, 90.0, 50.0);
        assert_eq!((x, y), (50, 100));
        let (x, y) = ring_point(100, 100, 180.0, 50.0);
        assert_eq!((x, y), (100, 50));
        let (x, y) = ring_point(100, 100, 270.0, 50.0);
        assert_eq!((x, y), (150, 100));
    }

    #[test]
    fn compose_paints_background_and_a_lit_disc_center() {
        let spec = CanvasSpec::new(400, 300, BitDepth::Four);
        let canvas = compose(&state(1.0, true), noon(), spec);
        // Corner pixel carries the background index (0x10 >> 4).
        assert_eq!(canvas.get_pixel(1, 1), Some(BG >> 4));
        // Full moon: disc center carries the lit index.
        assert_eq!(canvas.get_pixel(200, 150), Some(DISC_LIT >> 4));
    }

    #[test]
    fn compose_new_moon_center_is_dark_but_not_background() {
        let spec = CanvasSpec::new(400, 300, BitDepth::Four);
        let canvas = compose(&state(0.0, false), noon(), spec);
        assert_eq!(canvas.get_pixel(200, 150), Some(DISC_DARK >> 4));
    }

    #[test]
    fn compose_handles_absent_rise_set_and_below_horizon() {
        let mut s = state(0.3, false);
        s.altitude_deg = -12.0;
        let spec = CanvasSpec::new(256, 256, BitDepth::Two);
        let canvas = compose(&s, noon(), spec);
        assert_eq!(canvas.width(), 256);
    }

    #[test]
    fn compose_draws_the_sky_track() {
        let mut s = state(0.8, true);
        s.path = (0..10)
            .map(|i| SkyPoint {
                altitude_deg: 5.0 + i as f64 * 4.0,
                azimuth_deg: 90.0 + i as f64 * 10.0,
            })
            .collect();
        let spec = CanvasSpec::new(400, 400, BitDepth::Eight);
        let blank = compose(&state(0.8, true), noon(), spec);
        let tracked = compose(&s, noon(), spec);
        assert_ne!(blank.data(), tracked.data());
    }

    #[test]
    fn ascii_render_reports_placeholders() {
        let text = draw_ascii(&state(0.62, true), noon());
        assert!(text.contains("WAXING 62"));
        assert!(text.contains("RISE --:--"));
        assert!(text.contains("SET --:--"));
        assert!(text.contains('@'));
    }
}
