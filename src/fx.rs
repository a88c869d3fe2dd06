use crate::{
    error::CineforgeResult,
    frame::Frame,
    fx_cpu::{self, round_up_even},
};

/// A single frame transformation with closed-form output geometry.
///
/// Constructors clamp parameters into their documented ranges, so a chain
/// built through them never fails validation at apply time. `output_size`
/// depends only on the input geometry, which lets a whole chain declare its
/// final geometry before any frame is decoded.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Resize { width: u32, height: u32 },
    Rotate { degrees: f64 },
    Crop { x: u32, y: u32, width: u32, height: u32 },
    Brightness { factor: f64 },
    Contrast { factor: f64 },
    Saturation { factor: f64 },
    Blur { radius: u32 },
    Sharpen { strength: f64 },
    Sepia { strength: f64 },
    Vignette { strength: f64, radius: f64 },
    Noise { intensity: f64, seed: u64 },
}

impl Effect {
    /// Target dimensions are rounded up to even, matching encoder geometry
    /// requirements.
    pub fn resize(width: u32, height: u32) -> Self {
        Effect::Resize {
            width: round_up_even(width),
            height: round_up_even(height),
        }
    }

    pub fn rotate(degrees: f64) -> Self {
        Effect::Rotate { degrees }
    }

    pub fn crop(x: u32, y: u32, width: u32, height: u32) -> Self {
        Effect::Crop { x, y, width, height }
    }

    pub fn brightness(factor: f64) -> Self {
        Effect::Brightness { factor: factor.max(0.0) }
    }

    pub fn contrast(factor: f64) -> Self {
        Effect::Contrast { factor: factor.max(0.0) }
    }

    pub fn saturation(factor: f64) -> Self {
        Effect::Saturation { factor: factor.max(0.0) }
    }

    pub fn blur(radius: u32) -> Self {
        Effect::Blur { radius: radius.clamp(1, 20) }
    }

    pub fn sharpen(strength: f64) -> Self {
        Effect::Sharpen { strength: strength.clamp(0.0, 2.0) }
    }

    pub fn sepia(strength: f64) -> Self {
        Effect::Sepia { strength: strength.clamp(0.0, 1.0) }
    }

    pub fn vignette(strength: f64, radius: f64) -> Self {
        Effect::Vignette {
            strength: strength.clamp(0.0, 1.0),
            radius: radius.clamp(0.0, 1.0),
        }
    }

    pub fn noise(intensity: f64, seed: u64) -> Self {
        Effect::Noise { intensity: intensity.clamp(0.0, 1.0), seed }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Resize { .. } => "resize",
            Effect::Rotate { .. } => "rotate",
            Effect::Crop { .. } => "crop",
            Effect::Brightness { .. } => "brightness",
            Effect::Contrast { .. } => "contrast",
            Effect::Saturation { .. } => "saturation",
            Effect::Blur { .. } => "blur",
            Effect::Sharpen { .. } => "sharpen",
            Effect::Sepia { .. } => "sepia",
            Effect::Vignette { .. } => "vignette",
            Effect::Noise { .. } => "noise",
        }
    }

    /// Output geometry for an input of `width` x `height`, without touching
    /// any pixels.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            Effect::Resize { width: w, height: h } => (round_up_even(w), round_up_even(h)),
            Effect::Rotate { degrees } => fx_cpu::rotate_output_size(width, height, degrees),
            Effect::Crop { x, y, width: w, height: h } => {
                let (_, _, cw, ch) = fx_cpu::clamp_crop(width, height, x, y, w, h);
                (cw, ch)
            }
            _ => (width, height),
        }
    }

    pub fn apply(&self, frame: &Frame) -> CineforgeResult<Frame> {
        match *self {
            Effect::Resize { width, height } => {
                fx_cpu::resize_nearest(frame, round_up_even(width), round_up_even(height))
            }
            Effect::Rotate { degrees } => fx_cpu::rotate(frame, degrees),
            Effect::Crop { x, y, width, height } => fx_cpu::crop(frame, x, y, width, height),
            Effect::Brightness { factor } => Ok(fx_cpu::brightness(frame, factor)),
            Effect::Contrast { factor } => Ok(fx_cpu::contrast(frame, factor)),
            Effect::Saturation { factor } => Ok(fx_cpu::saturation(frame, factor)),
            Effect::Blur { radius } => fx_cpu::blur(frame, radius),
            Effect::Sharpen { strength } => fx_cpu::sharpen(frame, strength),
            Effect::Sepia { strength } => Ok(fx_cpu::sepia(frame, strength)),
            Effect::Vignette { strength, radius } => Ok(fx_cpu::vignette(frame, strength, radius)),
            Effect::Noise { intensity, seed } => Ok(fx_cpu::noise(frame, intensity, seed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_clamp_parameters() {
        assert_eq!(Effect::resize(641, 480), Effect::Resize { width: 642, height: 480 });
        assert_eq!(Effect::blur(0), Effect::Blur { radius: 1 });
        assert_eq!(Effect::blur(99), Effect::Blur { radius: 20 });
        assert_eq!(Effect::sharpen(5.0), Effect::Sharpen { strength: 2.0 });
        assert_eq!(Effect::sepia(-1.0), Effect::Sepia { strength: 0.0 });
        assert_eq!(
            Effect::vignette(2.0, -0.5),
            Effect::Vignette { strength: 1.0, radius: 0.0 }
        );
        assert_eq!(Effect::noise(7.0, 3), Effect::Noise { intensity: 1.0, seed: 3 });
        assert_eq!(Effect::brightness(-2.0), Effect::Brightness { factor: 0.0 });
    }

    #[test]
    fn output_size_matches_apply() {
        let frame = Frame::solid(64, 48, [10, 20, 30]);
        let effects = [
            Effect::resize(30, 20),
            Effect::rotate(37.0),
            Effect::crop(10, 10, 100, 100),
            Effect::blur(3),
            Effect::sepia(0.5),
        ];
        for e in effects {
            let declared = e.output_size(64, 48);
            let produced = e.apply(&frame).unwrap();
            assert_eq!(produced.size(), declared, "effect {}", e.kind());
        }
    }

    #[test]
    fn point_effects_preserve_geometry() {
        for e in [
            Effect::brightness(1.3),
            Effect::contrast(0.7),
            Effect::saturation(1.5),
            Effect::vignette(0.5, 0.8),
            Effect::noise(0.2, 1),
        ] {
            assert_eq!(e.output_size(33, 17), (33, 17));
        }
    }
}
