//! BMP serialization and atomic hand-off to the scratch directory.
//!
//! The canvas buffer already uses MSB-first packing, which is exactly the
//! BMP convention for 1/4/8 bpp indexed images, so those depths serialize
//! row-for-row with only bottom-up reordering and 4-byte row padding. BMP
//! has no 2 bpp mode; that depth is widened to 4 bpp on the way out, with
//! the palette scaled so the four gray levels keep their spacing.
//!
//! The writer never touches the published path directly: it writes to a
//! temporary name in the same directory and renames into place, so a reader
//! mid-copy sees either the old file or the new one, never a torn one.

use crate::canvas::{BitDepth, Canvas};
use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;
/// 72 dpi in pixels per metre, the conventional value.
const PPM: u32 = 2835;

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Index of the physical pixel (x, y) straight out of the packed buffer.
fn stored_index(canvas: &Canvas, x: u32, y: u32) -> u8 {
    let spec = canvas.spec();
    let bits = spec.depth.bits();
    let row = &canvas.data()[(y * spec.bytes_per_row()) as usize..];
    let byte = row[(x * bits / 8) as usize];
    let slot = x % (8 / bits);
    let shift = 8 - bits * (slot + 1);
    (byte >> shift) & ((1u16 << bits) - 1) as u8
}

/// Serialize the canvas to an indexed grayscale BMP.
pub fn to_bmp(canvas: &Canvas) -> Vec<u8> {
    let spec = canvas.spec();
    let (width, height) = (spec.width, spec.height);
    let out_bits = match spec.depth {
        BitDepth::Two => 4,
        d => d.bits(),
    };
    let palette_len = 1u32 << out_bits;
    let out_bpr = (width * out_bits).div_ceil(32) * 4;
    let data_offset = FILE_HEADER_LEN + INFO_HEADER_LEN + palette_len * 4;
    let file_len = data_offset + out_bpr * height;

    let mut out = Vec::with_capacity(file_len as usize);
    out.extend_from_slice(b"BM");
    put_u32(&mut out, file_len);
    put_u32(&mut out, 0);
    put_u32(&mut out, data_offset);

    put_u32(&mut out, INFO_HEADER_LEN);
    put_u32(&mut out, width);
    put_u32(&mut out, height);
    put_u16(&mut out, 1);
    put_u16(&mut out, out_bits as u16);
    put_u32(&mut out, 0); // BI_RGB
    put_u32(&mut out, out_bpr * height);
    put_u32(&mut out, PPM);
    put_u32(&mut out, PPM);
    put_u32(&mut out, palette_len);
    put_u32(&mut out, 0);

    for i in 0..palette_len {
        let gray = (i * 255 / (palette_len - 1)) as u8;
        out.extend_from_slice(&[gray, gray, gray, 0]);
    }

    // Pixel rows, bottom-up.
    let native_bpr = spec.bytes_per_row() as usize;
    for y in (0..height).rev() {
        let row_start = out.len();
        match spec.depth {
            BitDepth::Two => {
                // Widen each 2-bit index to a nibble; index spacing 0..3
                // becomes 0..15 in steps of five.
                let mut pending: Option<u8> = None;
                for x in 0..width {
                    let nibble = stored_index(canvas, x, y) * 5;
                    match pending.take() {
                        None => pending = Some(nibble << 4),
                        Some(hi) => out.push(hi | nibble),
                    }
                }
                if let Some(hi) = pending {
                    out.push(hi);
                }
            }
            _ => {
                let src = (y as usize) * native_bpr;
                out.extend_from_slice(&canvas.data()[src..src + native_bpr]);
            }
        }
        while out.len() - row_start < out_bpr as usize {
            out.push(0);
        }
    }
    out
}

/// Write the canvas as `<scratch_dir>/<name>` via a temporary file and an
/// atomic rename. Returns the published path.
pub fn publish(canvas: &Canvas, scratch_dir: &Path, name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(scratch_dir)?;
    let target = scratch_dir.join(name);
    let tmp = scratch_dir.join(format!(".{}.tmp-{}", name, std::process::id()));
    fs::write(&tmp, to_bmp(canvas))?;
    fs::rename(&tmp, &target)?;
    info!("published {}", target.display());
    Ok(target)
}
