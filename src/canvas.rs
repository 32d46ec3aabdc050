//! Owned raster canvas for the e-paper panel.
//!
//! The vendor paint library kept a single global canvas struct and mutated it
//! from every draw call; here the canvas is an explicit value threaded through
//! the composer. The rotate/mirror and sub-byte packing semantics are kept
//! exactly, so a buffer produced here is byte-compatible with what the panel
//! driver expects.
//!
//! ## Coordinate remapping
//!
//! `CanvasSpec::width`/`height` are the panel's memory dimensions `W`×`H`.
//! Drawing happens in *logical* coordinates, which the canvas remaps to a
//! physical buffer position before any pixel write:
//!
//! ```text
//! rotate   0: (X, Y) = (x, y)
//! rotate  90: (X, Y) = (W-1-y, x)
//! rotate 180: (X, Y) = (W-1-x, H-1-y)
//! rotate 270: (X, Y) = (y, H-1-x)
//! then mirror horizontal: X = W-1-X
//!      mirror vertical:   Y = H-1-Y
//!      mirror both:       both of the above
//! ```
//!
//! For rotate 90/270 the logical width/height are swapped relative to memory.
//! Out-of-bounds logical coordinates are silently clipped; no draw call ever
//! fails.
//!
//! ## Pixel packing
//!
//! At 1/2/4 bits per pixel several logical pixels share one storage byte,
//! packed most-significant-bits first (pixel 0 of a byte occupies the top
//! bits). Partial writes mask and shift so neighboring pixels keep their
//! bits. Levels are 8-bit grays; depths below 8 keep the top bits.

use serde::{Deserialize, Serialize};

/// Grayscale bits per pixel supported by the panel driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    One,
    Two,
    Four,
    Eight,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::One => 1,
            BitDepth::Two => 2,
            BitDepth::Four => 4,
            BitDepth::Eight => 8,
        }
    }

    /// Number of distinct gray levels at this depth.
    pub fn levels(self) -> u32 {
        1 << self.bits()
    }
}

impl From<BitDepth> for u8 {
    fn from(d: BitDepth) -> u8 {
        d.bits() as u8
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(BitDepth::One),
            2 => Ok(BitDepth::Two),
            4 => Ok(BitDepth::Four),
            8 => Ok(BitDepth::Eight),
            other => Err(format!("unsupported bit depth {other}, expected 1/2/4/8")),
        }
    }
}

/// Quarter-turn rotation applied between logical and physical coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotate {
    R0,
    R90,
    R180,
    R270,
}

impl From<Rotate> for u16 {
    fn from(r: Rotate) -> u16 {
        match r {
            Rotate::R0 => 0,
            Rotate::R90 => 90,
            Rotate::R180 => 180,
            Rotate::R270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotate {
    type Error = String;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Rotate::R0),
            90 => Ok(Rotate::R90),
            180 => Ok(Rotate::R180),
            270 => Ok(Rotate::R270),
            other => Err(format!("unsupported rotation {other}, expected 0/90/180/270")),
        }
    }
}

/// Mirroring applied after rotation, in physical coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mirror {
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Line rendering style for [`Canvas::draw_line`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    /// Every third step drawn, matching the vendor library's dotted lines.
    Dotted,
}

/// Immutable description of a canvas: panel memory dimensions, bit depth and
/// the rotate/mirror transform in effect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    /// Panel memory width in pixels.
    pub width: u32,
    /// Panel memory height in pixels.
    pub height: u32,
    pub depth: BitDepth,
    pub rotate: Rotate,
    pub mirror: Mirror,
}

impl CanvasSpec {
    pub fn new(width: u32, height: u32, depth: BitDepth) -> Self {
        Self {
            width,
            height,
            depth,
            rotate: Rotate::R0,
            mirror: Mirror::None,
        }
    }

    /// Storage bytes per physical row.
    pub fn bytes_per_row(&self) -> u32 {
        (self.width * self.depth.bits()).div_ceil(8)
    }
}

/// Mutable pixel buffer owned by the composer for one rendering pass.
pub struct Canvas {
    spec: CanvasSpec,
    buf: Vec<u8>,
}

impl Canvas {
    /// Allocate a canvas cleared to black.
    pub fn new(spec: CanvasSpec) -> Self {
        let size = (spec.bytes_per_row() * spec.height) as usize;
        Self {
            spec,
            buf: vec![0; size],
        }
    }

    pub fn spec(&self) -> &CanvasSpec {
        &self.spec
    }

    /// Logical drawing width; swapped with height for 90/270 rotations.
    pub fn width(&self) -> u32 {
        match self.spec.rotate {
            Rotate::R0 | Rotate::R180 => self.spec.width,
            Rotate::R90 | Rotate::R270 => self.spec.height,
        }
    }

    /// Logical drawing height; swapped with width for 90/270 rotations.
    pub fn height(&self) -> u32 {
        match self.spec.rotate {
            Rotate::R0 | Rotate::R180 => self.spec.height,
            Rotate::R90 | Rotate::R270 => self.spec.width,
        }
    }

    /// Raw packed buffer in physical layout, rows of
    /// [`CanvasSpec::bytes_per_row`] bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Remap a logical coordinate to a physical buffer position, applying the
    /// rotate then mirror transform documented at the module level. `None`
    /// when the logical coordinate falls outside the canvas.
    pub fn map_logical(&self, x: i32, y: i32) -> Option<(u32, u32)> {
        if x < 0 || y < 0 || x as u32 >= self.width() || y as u32 >= self.height() {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        let w = self.spec.width;
        let h = self.spec.height;
        let (mut px, mut py) = match self.spec.rotate {
            Rotate::R0 => (x, y),
            Rotate::R90 => (w - 1 - y, x),
            Rotate::R180 => (w - 1 - x, h - 1 - y),
            Rotate::R270 => (y, h - 1 - x),
        };
        match self.spec.mirror {
            Mirror::None => {}
            Mirror::Horizontal => px = w - 1 - px,
            Mirror::Vertical => py = h - 1 - py,
            Mirror::Both => {
                px = w - 1 - px;
                py = h - 1 - py;
            }
        }
        Some((px, py))
    }

    /// Byte offset, shift and mask for a physical pixel. One addressing
    /// function for all depths so the neighbor-preservation invariant lives
    /// in a single place.
    fn address(&self, px: u32, py: u32) -> (usize, u32, u8) {
        let bits = self.spec.depth.bits();
        let offset = (py * self.spec.bytes_per_row() + px * bits / 8) as usize;
        let slot = px % (8 / bits);
        let shift = 8 - bits * (slot + 1);
        let mask = (((1u16 << bits) - 1) as u8) << shift;
        (offset, shift, mask)
    }

    /// Write one logical pixel. `level` is an 8-bit gray; at lower depths the
    /// top bits are kept. Out-of-bounds coordinates are a silent no-op.
    pub fn set_pixel(&mut self, x: i32, y: i32, level: u8) {
        let Some((px, py)) = self.map_logical(x, y) else {
            return;
        };
        let bits = self.spec.depth.bits();
        let (offset, shift, mask) = self.address(px, py);
        let index = level >> (8 - bits);
        self.buf[offset] = (self.buf[offset] & !mask) | (index << shift);
    }

    /// Read back the stored index (not the 8-bit level) at a logical pixel.
    pub fn get_pixel(&self, x: i32, y: i32) -> Option<u8> {
        let (px, py) = self.map_logical(x, y)?;
        let (offset, shift, mask) = self.address(px, py);
        Some((self.buf[offset] & mask) >> shift)
    }

    /// Fill the whole canvas with one gray level.
    pub fn clear(&mut self, level: u8) {
        let bits = self.spec.depth.bits();
        let index = level >> (8 - bits);
        let mut byte = 0u8;
        for slot in 0..(8 / bits) {
            byte |= index << (8 - bits * (slot + 1));
        }
        self.buf.fill(byte);
    }

    /// Square dot of `size` pixels centered on (x, y).
    pub fn draw_point(&mut self, x: i32, y: i32, level: u8, size: i32) {
        let half = size / 2;
        for dy in 0..size {
            for dx in 0..size {
                self.set_pixel(x - half + dx, y - half + dy, level);
            }
        }
    }

    /// Bresenham line between two logical points.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, level: u8, style: LineStyle) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y) = (x0, y0);
        let mut err = dx + dy;
        let mut step = 0u32;
        loop {
            let draw = match style {
                LineStyle::Solid => true,
                LineStyle::Dotted => step % 3 == 0,
            };
            if draw {
                self.set_pixel(x, y, level);
            }
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
            step += 1;
        }
    }

    /// Axis-aligned rectangle, filled or one-pixel outline.
    pub fn draw_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, level: u8, filled: bool) {
        let (xa, xb) = (x0.min(x1), x0.max(x1));
        let (ya, yb) = (y0.min(y1), y0.max(y1));
        if filled {
            for y in ya..=yb {
                for x in xa..=xb {
                    self.set_pixel(x, y, level);
                }
            }
        } else {
            self.draw_line(xa, ya, xb, ya, level, LineStyle::Solid);
            self.draw_line(xa, yb, xb, yb, level, LineStyle::Solid);
            self.draw_line(xa, ya, xa, yb, level, LineStyle::Solid);
            self.draw_line(xb, ya, xb, yb, level, LineStyle::Solid);
        }
    }

    /// Circle of radius `r`, filled by horizontal spans or outlined by the
    /// midpoint algorithm.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, r: i32, level: u8, filled: bool) {
        if r < 0 {
            return;
        }
        if filled {
            for dy in -r..=r {
                let half = ((r * r - dy * dy) as f64).sqrt() as i32;
                for dx in -half..=half {
                    self.set_pixel(cx + dx, cy + dy, level);
                }
            }
        } else {
            let mut x = r;
            let mut y = 0;
            let mut err = 1 - r;
            while x >= y {
                for (dx, dy) in [
                    (x, y),
                    (y, x),
                    (-y, x),
                    (-x, y),
                    (-x, -y),
                    (-y, -x),
                    (y, -x),
                    (x, -y),
                ] {
                    self.set_pixel(cx + dx, cy + dy, level);
                }
                y += 1;
                if err < 0 {
                    err += 2 * y + 1;
                } else {
                    x -= 1;
                    err += 2 * (y - x) + 1;
                }
            }
        }
    }
}
