use crate::{error::CineforgeResult, frame::Frame, fx::Effect};

/// Ordered effect pipeline. Frames flow through the effects front to back;
/// geometry composes the same way, so the chain's output size is known
/// without decoding anything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectChain {
    effects: Vec<Effect>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// Folds every effect's geometry over the input size.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        self.effects
            .iter()
            .fold((width, height), |(w, h), e| e.output_size(w, h))
    }

    /// Applies the whole chain to a frame. An empty chain yields a copy.
    pub fn apply(&self, frame: &Frame) -> CineforgeResult<Frame> {
        let mut current: Option<Frame> = None;
        for effect in &self.effects {
            let next = match &current {
                Some(f) => effect.apply(f)?,
                None => effect.apply(frame)?,
            };
            current = Some(next);
        }
        Ok(current.unwrap_or_else(|| frame.clone()))
    }

    pub fn builder() -> EffectChainBuilder {
        EffectChainBuilder::default()
    }
}

impl FromIterator<Effect> for EffectChain {
    fn from_iter<T: IntoIterator<Item = Effect>>(iter: T) -> Self {
        Self { effects: iter.into_iter().collect() }
    }
}

/// Fluent construction for [`EffectChain`].
#[derive(Clone, Debug, Default)]
pub struct EffectChainBuilder {
    chain: EffectChain,
}

impl EffectChainBuilder {
    pub fn resize(mut self, width: u32, height: u32) -> Self {
        self.chain.push(Effect::resize(width, height));
        self
    }

    pub fn rotate(mut self, degrees: f64) -> Self {
        self.chain.push(Effect::rotate(degrees));
        self
    }

    pub fn crop(mut self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.chain.push(Effect::crop(x, y, width, height));
        self
    }

    pub fn brightness(mut self, factor: f64) -> Self {
        self.chain.push(Effect::brightness(factor));
        self
    }

    pub fn contrast(mut self, factor: f64) -> Self {
        self.chain.push(Effect::contrast(factor));
        self
    }

    pub fn saturation(mut self, factor: f64) -> Self {
        self.chain.push(Effect::saturation(factor));
        self
    }

    pub fn blur(mut self, radius: u32) -> Self {
        self.chain.push(Effect::blur(radius));
        self
    }

    pub fn sharpen(mut self, strength: f64) -> Self {
        self.chain.push(Effect::sharpen(strength));
        self
    }

    pub fn sepia(mut self, strength: f64) -> Self {
        self.chain.push(Effect::sepia(strength));
        self
    }

    pub fn vignette(mut self, strength: f64, radius: f64) -> Self {
        self.chain.push(Effect::vignette(strength, radius));
        self
    }

    pub fn noise(mut self, intensity: f64, seed: u64) -> Self {
        self.chain.push(Effect::noise(intensity, seed));
        self
    }

    pub fn build(self) -> EffectChain {
        self.chain
    }
}

/// Named looks built from the primitive effects.
pub mod presets {
    use super::EffectChain;

    pub fn vintage() -> EffectChain {
        EffectChain::builder()
            .sepia(0.8)
            .vignette(0.3, 0.8)
            .noise(0.1, 0)
            .build()
    }

    pub fn cinematic() -> EffectChain {
        EffectChain::builder()
            .contrast(1.2)
            .saturation(0.8)
            .vignette(0.4, 0.7)
            .build()
    }

    pub fn warm() -> EffectChain {
        EffectChain::builder().brightness(1.1).saturation(1.2).build()
    }

    pub fn cool() -> EffectChain {
        EffectChain::builder().brightness(0.9).saturation(0.8).build()
    }

    pub fn dramatic() -> EffectChain {
        EffectChain::builder()
            .contrast(1.5)
            .brightness(0.8)
            .vignette(0.6, 0.6)
            .build()
    }

    /// Resolves a preset by name.
    pub fn by_name(name: &str) -> Option<EffectChain> {
        match name {
            "vintage" => Some(vintage()),
            "cinematic" => Some(cinematic()),
            "warm" => Some(warm()),
            "cool" => Some(cool()),
            "dramatic" => Some(dramatic()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_is_identity() {
        let chain = EffectChain::new();
        let frame = Frame::solid(4, 4, [1, 2, 3]);
        let out = chain.apply(&frame).unwrap();
        assert_eq!(out.as_bytes(), frame.as_bytes());
        assert_eq!(chain.output_size(4, 4), (4, 4));
    }

    #[test]
    fn output_size_composes_in_order() {
        let chain: EffectChain = [
            Effect::resize(100, 100),
            Effect::crop(10, 10, 40, 40),
            Effect::rotate(90.0),
        ]
        .into_iter()
        .collect();
        // resize -> 100x100, crop -> 40x40, quarter turn keeps 40x40
        assert_eq!(chain.output_size(640, 480), (40, 40));
    }

    #[test]
    fn apply_threads_frames_through_all_effects() {
        let chain = EffectChain::builder()
            .resize(8, 8)
            .brightness(2.0)
            .build();
        let frame = Frame::solid(16, 16, [50, 50, 50]);
        let out = chain.apply(&frame).unwrap();
        assert_eq!(out.size(), (8, 8));
        assert_eq!(out.pixel(0, 0), [100, 100, 100]);
    }

    #[test]
    fn presets_resolve_by_name() {
        for name in ["vintage", "cinematic", "warm", "cool", "dramatic"] {
            let chain = presets::by_name(name).unwrap();
            assert!(!chain.is_empty(), "preset {name}");
            // Every preset is geometry-preserving.
            assert_eq!(chain.output_size(64, 48), (64, 48));
        }
        assert!(presets::by_name("nope").is_none());
    }
}
