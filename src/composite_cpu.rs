//! Per-channel blend arithmetic for layer compositing. Everything works on
//! opaque rgb24 channels; intermediates widen to u32 before dividing back
//! into the u8 range.

use crate::composite::BlendMode;

#[inline]
fn mul_div255(a: u32, b: u32) -> u32 {
    a * b / 255
}

#[inline]
fn overlay_channel(base: u32, top: u32) -> u32 {
    if base < 128 {
        mul_div255(2 * base, top)
    } else {
        255 - mul_div255(2 * (255 - base), 255 - top)
    }
}

#[inline]
fn screen_channel(base: u32, top: u32) -> u32 {
    255 - mul_div255(255 - base, 255 - top)
}

/// Blends one channel of `top` onto `base` with full opacity.
#[inline]
pub fn blend_channel(mode: BlendMode, base: u8, top: u8) -> u8 {
    let (b, t) = (base as u32, top as u32);
    let v = match mode {
        BlendMode::Overlay => overlay_channel(b, t),
        BlendMode::Add => (b + t).min(255),
        BlendMode::Multiply => mul_div255(b, t),
        BlendMode::Screen => screen_channel(b, t),
        BlendMode::Darken => b.min(t),
        BlendMode::Lighten => b.max(t),
    };
    v as u8
}

/// Linear interpolation from `base` toward `blended` by `opacity`.
#[inline]
fn lerp_u8(base: u8, blended: u8, opacity: f32) -> u8 {
    (base as f32 + (blended as f32 - base as f32) * opacity)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Blends an rgb pixel of `top` onto `base` at `opacity` in [0, 1].
#[inline]
pub fn blend_pixel(mode: BlendMode, base: [u8; 3], top: [u8; 3], opacity: f32) -> [u8; 3] {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return base;
    }
    let mut out = [0u8; 3];
    for c in 0..3 {
        let blended = blend_channel(mode, base[c], top[c]);
        out[c] = if opacity >= 1.0 {
            blended
        } else {
            lerp_u8(base[c], blended, opacity)
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiply_and_screen_identities() {
        // Multiplying by white is identity, by black is black.
        assert_eq!(blend_channel(BlendMode::Multiply, 200, 255), 200);
        assert_eq!(blend_channel(BlendMode::Multiply, 200, 0), 0);
        // Screening with black is identity, with white is white.
        assert_eq!(blend_channel(BlendMode::Screen, 200, 0), 200);
        assert_eq!(blend_channel(BlendMode::Screen, 200, 255), 255);
    }

    #[test]
    fn add_saturates() {
        assert_eq!(blend_channel(BlendMode::Add, 200, 100), 255);
        assert_eq!(blend_channel(BlendMode::Add, 20, 30), 50);
    }

    #[test]
    fn darken_lighten_pick_extremes() {
        assert_eq!(blend_channel(BlendMode::Darken, 90, 40), 40);
        assert_eq!(blend_channel(BlendMode::Lighten, 90, 40), 90);
    }

    #[test]
    fn overlay_branches_at_midpoint() {
        // Dark base multiplies, bright base screens.
        assert_eq!(blend_channel(BlendMode::Overlay, 64, 128), 64);
        assert_eq!(blend_channel(BlendMode::Overlay, 192, 128), 193);
        assert_eq!(blend_channel(BlendMode::Overlay, 0, 255), 0);
        assert_eq!(blend_channel(BlendMode::Overlay, 255, 0), 255);
    }

    #[test]
    fn opacity_interpolates_toward_blended() {
        let base = [100, 100, 100];
        let top = [200, 200, 200];
        assert_eq!(blend_pixel(BlendMode::Lighten, base, top, 0.0), base);
        assert_eq!(blend_pixel(BlendMode::Lighten, base, top, 1.0), top);
        assert_eq!(blend_pixel(BlendMode::Lighten, base, top, 0.5), [150, 150, 150]);
    }
}
