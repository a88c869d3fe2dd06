//! CPU kernels behind [`crate::fx::Effect`]. Geometry-changing kernels write
//! into a fresh buffer row-parallel with rayon; point operations run in place
//! on a copy.

use rayon::prelude::*;

use crate::{
    error::{CineforgeError, CineforgeResult},
    frame::{BYTES_PER_PIXEL, Frame, byte_len},
};

/// Largest input side accepted by the rotation kernel.
pub const MAX_ROTATE_INPUT_SIDE: u32 = 8192;
/// Largest output side the rotation kernel will produce.
pub const MAX_ROTATE_OUTPUT_SIDE: u32 = 4096;
/// Rotation output pixel budget (16 Mi pixels).
pub const MAX_ROTATE_PIXELS: u64 = 16 * 1024 * 1024;

#[inline]
fn clamp_u8(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

/// Relative luma, BT.601 weights.
#[inline]
fn luma(r: f64, g: f64, b: f64) -> f64 {
    0.299 * r + 0.587 * g + 0.114 * b
}

pub fn resize_nearest(src: &Frame, out_w: u32, out_h: u32) -> CineforgeResult<Frame> {
    if out_w == 0 || out_h == 0 {
        return Err(CineforgeError::validation("resize target must be non-zero"));
    }
    let (sw, sh) = src.size();
    let src_bytes = src.as_bytes();
    let row_len = out_w as usize * BYTES_PER_PIXEL;

    let mut out = vec![0u8; byte_len(out_w, out_h)];
    out.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let sy = ((y as u64 * sh as u64) / out_h as u64).min(sh as u64 - 1) as usize;
        let src_row = &src_bytes[sy * sw as usize * BYTES_PER_PIXEL..];
        for x in 0..out_w as usize {
            let sx = ((x as u64 * sw as u64) / out_w as u64).min(sw as u64 - 1) as usize;
            row[x * 3..x * 3 + 3].copy_from_slice(&src_row[sx * 3..sx * 3 + 3]);
        }
    });
    Frame::from_rgb(out_w, out_h, out)
}

/// Output geometry of a rotation: the axis-aligned bounding box of the
/// rotated input, rounded up to even and clamped to
/// [`MAX_ROTATE_OUTPUT_SIDE`] per side (even-preserving).
pub fn rotate_output_size(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let rad = degrees.to_radians();
    let (sin, cos) = (rad.sin().abs(), rad.cos().abs());
    let w = (width as f64 * cos + height as f64 * sin) as u32;
    let h = (width as f64 * sin + height as f64 * cos) as u32;
    (clamp_rotate_side(round_up_even(w)), clamp_rotate_side(round_up_even(h)))
}

#[inline]
pub fn round_up_even(v: u32) -> u32 {
    if v.is_multiple_of(2) { v } else { v + 1 }
}

#[inline]
fn clamp_rotate_side(v: u32) -> u32 {
    if v > MAX_ROTATE_OUTPUT_SIDE { MAX_ROTATE_OUTPUT_SIDE } else { v }
}

/// Rotates counter-clockwise by `degrees` into the bounding-box geometry.
/// Pixels whose inverse mapping falls outside the source stay black.
pub fn rotate(src: &Frame, degrees: f64) -> CineforgeResult<Frame> {
    let (sw, sh) = src.size();
    if sw > MAX_ROTATE_INPUT_SIDE || sh > MAX_ROTATE_INPUT_SIDE {
        return Err(CineforgeError::validation(format!(
            "rotation input {sw}x{sh} exceeds {MAX_ROTATE_INPUT_SIDE} per side"
        )));
    }
    let (out_w, out_h) = rotate_output_size(sw, sh, degrees);
    if out_w as u64 * out_h as u64 > MAX_ROTATE_PIXELS {
        return Err(CineforgeError::validation(format!(
            "rotation output {out_w}x{out_h} exceeds the pixel budget"
        )));
    }

    let rad = degrees.to_radians();
    let (sin, cos) = (rad.sin(), rad.cos());
    let (scx, scy) = (sw as f64 / 2.0, sh as f64 / 2.0);
    let (dcx, dcy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);
    let src_bytes = src.as_bytes();
    let row_len = out_w as usize * BYTES_PER_PIXEL;

    let mut out = vec![0u8; byte_len(out_w, out_h)];
    out.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let dy = y as f64 - dcy;
        for x in 0..out_w as usize {
            let dx = x as f64 - dcx;
            let sx = (scx + dx * cos + dy * sin) as i64;
            let sy = (scy - dx * sin + dy * cos) as i64;
            if sx < 0 || sx >= sw as i64 || sy < 0 || sy >= sh as i64 {
                continue;
            }
            let off = (sy as usize * sw as usize + sx as usize) * BYTES_PER_PIXEL;
            row[x * 3..x * 3 + 3].copy_from_slice(&src_bytes[off..off + 3]);
        }
    });
    Frame::from_rgb(out_w, out_h, out)
}

/// Clamps a crop rectangle into the source geometry. An out-of-frame origin
/// degenerates to an empty rectangle.
pub fn clamp_crop(
    src_w: u32,
    src_h: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> (u32, u32, u32, u32) {
    let x = x.min(src_w);
    let y = y.min(src_h);
    (x, y, width.min(src_w - x), height.min(src_h - y))
}

pub fn crop(src: &Frame, x: u32, y: u32, width: u32, height: u32) -> CineforgeResult<Frame> {
    let (sw, sh) = src.size();
    let (x, y, cw, ch) = clamp_crop(sw, sh, x, y, width, height);
    if cw == 0 || ch == 0 {
        return Err(CineforgeError::validation(
            "crop rectangle is empty after clamping to the source",
        ));
    }
    let src_bytes = src.as_bytes();
    let src_stride = sw as usize * BYTES_PER_PIXEL;
    let row_len = cw as usize * BYTES_PER_PIXEL;

    let mut out = vec![0u8; byte_len(cw, ch)];
    for (oy, row) in out.chunks_exact_mut(row_len).enumerate() {
        let start = (y as usize + oy) * src_stride + x as usize * BYTES_PER_PIXEL;
        row.copy_from_slice(&src_bytes[start..start + row_len]);
    }
    Frame::from_rgb(cw, ch, out)
}

pub fn brightness(src: &Frame, factor: f64) -> Frame {
    point_op(src, |[r, g, b]| {
        [clamp_u8(r * factor), clamp_u8(g * factor), clamp_u8(b * factor)]
    })
}

pub fn contrast(src: &Frame, factor: f64) -> Frame {
    let adjust = |c: f64| ((c / 255.0 - 0.5) * factor + 0.5).clamp(0.0, 1.0) * 255.0;
    point_op(src, |[r, g, b]| {
        [adjust(r) as u8, adjust(g) as u8, adjust(b) as u8]
    })
}

pub fn saturation(src: &Frame, factor: f64) -> Frame {
    point_op(src, |[r, g, b]| {
        let l = luma(r, g, b);
        [
            clamp_u8(l + (r - l) * factor),
            clamp_u8(l + (g - l) * factor),
            clamp_u8(l + (b - l) * factor),
        ]
    })
}

pub fn sepia(src: &Frame, strength: f64) -> Frame {
    let s = strength.clamp(0.0, 1.0);
    point_op(src, |[r, g, b]| {
        let gray = luma(r, g, b);
        // Classic sepia matrix collapsed over a gray input.
        let sr = gray * (0.393 + 0.769 + 0.189);
        let sg = gray * (0.349 + 0.686 + 0.168);
        let sb = gray * (0.272 + 0.534 + 0.131);
        [
            clamp_u8(r * (1.0 - s) + sr * s),
            clamp_u8(g * (1.0 - s) + sg * s),
            clamp_u8(b * (1.0 - s) + sb * s),
        ]
    })
}

/// Box blur over a Chebyshev neighborhood of `radius`, averaging only the
/// in-bounds samples near edges.
pub fn blur(src: &Frame, radius: u32) -> CineforgeResult<Frame> {
    let r = radius as i64;
    let (w, h) = src.size();
    let src_bytes = src.as_bytes();
    let stride = w as usize * BYTES_PER_PIXEL;

    let mut out = vec![0u8; src_bytes.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..w as i64 {
            let (mut sr, mut sg, mut sb, mut n) = (0u64, 0u64, 0u64, 0u64);
            for sy in (y - r).max(0)..=(y + r).min(h as i64 - 1) {
                for sx in (x - r).max(0)..=(x + r).min(w as i64 - 1) {
                    let off = (sy as usize * w as usize + sx as usize) * BYTES_PER_PIXEL;
                    sr += src_bytes[off] as u64;
                    sg += src_bytes[off + 1] as u64;
                    sb += src_bytes[off + 2] as u64;
                    n += 1;
                }
            }
            let o = x as usize * BYTES_PER_PIXEL;
            row[o] = (sr / n) as u8;
            row[o + 1] = (sg / n) as u8;
            row[o + 2] = (sb / n) as u8;
        }
    });
    Frame::from_rgb(w, h, out)
}

/// 3x3 sharpen kernel (center 5, cross -1) scaled by `strength`, sampling
/// edge-clamped neighbors.
pub fn sharpen(src: &Frame, strength: f64) -> CineforgeResult<Frame> {
    const KERNEL: [[f64; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]];
    let (w, h) = src.size();
    let src_bytes = src.as_bytes();
    let stride = w as usize * BYTES_PER_PIXEL;

    let mut out = vec![0u8; src_bytes.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..w as i64 {
            let mut acc = [0.0f64; 3];
            for (ky, krow) in KERNEL.iter().enumerate() {
                let sy = (y + ky as i64 - 1).clamp(0, h as i64 - 1) as usize;
                for (kx, k) in krow.iter().enumerate() {
                    let sx = (x + kx as i64 - 1).clamp(0, w as i64 - 1) as usize;
                    let off = (sy * w as usize + sx) * BYTES_PER_PIXEL;
                    for c in 0..3 {
                        acc[c] += src_bytes[off + c] as f64 * k * strength;
                    }
                }
            }
            let o = x as usize * BYTES_PER_PIXEL;
            for c in 0..3 {
                row[o + c] = clamp_u8(acc[c]);
            }
        }
    });
    Frame::from_rgb(w, h, out)
}

/// Radial darkening toward the corners. `radius` scales the falloff start
/// relative to the corner distance; the attenuation never goes negative.
pub fn vignette(src: &Frame, strength: f64, radius: f64) -> Frame {
    let (w, h) = src.size();
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt() * radius;

    let mut out = src.clone();
    if max_dist <= 0.0 {
        return out;
    }
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            let fade = (1.0 - (dist / max_dist) * strength).max(0.0);
            let [r, g, b] = out.pixel(x, y);
            out.put_pixel(
                x,
                y,
                [
                    (r as f64 * fade) as u8,
                    (g as f64 * fade) as u8,
                    (b as f64 * fade) as u8,
                ],
            );
        }
    }
    out
}

/// Film-grain style noise: one signed offset per pixel, applied to all three
/// channels. Deterministic for a given seed.
pub fn noise(src: &Frame, intensity: f64, seed: u64) -> Frame {
    use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};

    let (w, h) = src.size();
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut out = src.clone();
    for y in 0..h {
        for x in 0..w {
            let offset = (rng.random::<f64>() - 0.5) * 2.0 * intensity * 255.0;
            let [r, g, b] = out.pixel(x, y);
            out.put_pixel(
                x,
                y,
                [
                    clamp_u8(r as f64 + offset),
                    clamp_u8(g as f64 + offset),
                    clamp_u8(b as f64 + offset),
                ],
            );
        }
    }
    out
}

fn point_op(src: &Frame, op: impl Fn([f64; 3]) -> [u8; 3] + Sync) -> Frame {
    let (w, h) = src.size();
    let mut bytes = src.as_bytes().to_vec();
    bytes.par_chunks_mut(BYTES_PER_PIXEL).for_each(|px| {
        let [r, g, b] = op([px[0] as f64, px[1] as f64, px[2] as f64]);
        px[0] = r;
        px[1] = g;
        px[2] = b;
    });
    // Geometry is unchanged, the byte count cannot mismatch.
    Frame::from_rgb(w, h, bytes).unwrap_or_else(|_| src.clone())
}
