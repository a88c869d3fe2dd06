use crate::{
    clip::Clip,
    composite_cpu::blend_pixel,
    error::{CineforgeError, CineforgeResult},
    frame::Frame,
    fx_cpu,
};

/// How non-base layers mix into the canvas, channel by channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Overlay,
    Add,
    Multiply,
    Screen,
    Darken,
    Lighten,
}

/// Placement of a layer on the base canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Position {
    /// Offset of the layer's top-left corner; may be negative or past the
    /// canvas edge, out-of-canvas pixels are simply not drawn.
    Pixels { x: i64, y: i64 },
    /// Centered on the canvas.
    Centered,
}

impl Default for Position {
    fn default() -> Self {
        Position::Pixels { x: 0, y: 0 }
    }
}

/// One stacked clip with its placement and mixing parameters.
#[derive(Clone, Debug)]
pub struct Layer {
    pub clip: Clip,
    pub position: Position,
    pub scale: f64,
    pub opacity: f32,
    pub blend: BlendMode,
}

impl Layer {
    pub fn new(clip: Clip) -> Self {
        Self {
            clip,
            position: Position::default(),
            scale: 1.0,
            opacity: 1.0,
            blend: BlendMode::default(),
        }
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.position = Position::Pixels { x, y };
        self
    }

    pub fn centered(mut self) -> Self {
        self.position = Position::Centered;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    fn validate(&self, index: usize) -> CineforgeResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(CineforgeError::validation(format!(
                "layer {index}: scale {} must be positive",
                self.scale
            )));
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(CineforgeError::validation(format!(
                "layer {index}: opacity {} must be within [0, 1]",
                self.opacity
            )));
        }
        Ok(())
    }
}

/// A stack of layers rendered over a base. The base layer dictates canvas
/// geometry and frame rate; the composite runs as long as its longest layer.
#[derive(Clone, Debug)]
pub struct CompositeClip {
    layers: Vec<Layer>,
    width: u32,
    height: u32,
    fps: f64,
    duration_sec: f64,
}

impl CompositeClip {
    pub fn new(layers: Vec<Layer>) -> CineforgeResult<Self> {
        let Some(base) = layers.first() else {
            return Err(CineforgeError::validation(
                "composite needs at least a base layer",
            ));
        };
        for (i, layer) in layers.iter().enumerate() {
            layer.validate(i)?;
        }

        let (width, height) = base.clip.size();
        let fps = base.clip.fps();
        let duration_sec = layers
            .iter()
            .map(|l| l.clip.duration_sec())
            .fold(0.0, f64::max);

        Ok(Self {
            layers,
            width,
            height,
            fps,
            duration_sec,
        })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The base layer's clip.
    pub fn base(&self) -> &Clip {
        &self.layers[0].clip
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    /// Renders the stack at `t_sec`. The base layer must decode; any other
    /// layer that fails (typically because it has already ended) is skipped.
    pub fn frame_at(&self, t_sec: f64) -> CineforgeResult<Frame> {
        let mut canvas = self.layers[0].clip.frame_at(t_sec)?;

        for (i, layer) in self.layers.iter().enumerate().skip(1) {
            let frame = match layer.clip.frame_at(t_sec) {
                Ok(f) => f,
                Err(e) => {
                    tracing::debug!(layer = i, t_sec, error = %e, "skipping layer");
                    continue;
                }
            };

            let frame = if (layer.scale - 1.0).abs() > f64::EPSILON {
                let w = ((frame.width() as f64 * layer.scale) as u32).max(1);
                let h = ((frame.height() as f64 * layer.scale) as u32).max(1);
                fx_cpu::resize_nearest(&frame, w, h)?
            } else {
                frame
            };

            let (ox, oy) = layer_offset(
                (self.width, self.height),
                frame.size(),
                layer.position,
            );
            blit(&mut canvas, &frame, ox, oy, layer.blend, layer.opacity);
        }

        Ok(canvas)
    }
}

fn layer_offset(canvas: (u32, u32), layer: (u32, u32), position: Position) -> (i64, i64) {
    match position {
        Position::Pixels { x, y } => (x, y),
        Position::Centered => (
            (canvas.0 as i64 - layer.0 as i64) / 2,
            (canvas.1 as i64 - layer.1 as i64) / 2,
        ),
    }
}

/// Blends `top` onto `canvas` at offset (ox, oy), clipping to the canvas.
fn blit(canvas: &mut Frame, top: &Frame, ox: i64, oy: i64, blend: BlendMode, opacity: f32) {
    let (cw, ch) = canvas.size();
    let (tw, th) = top.size();
    for ly in 0..th {
        let cy = oy + ly as i64;
        if cy < 0 || cy >= ch as i64 {
            continue;
        }
        for lx in 0..tw {
            let cx = ox + lx as i64;
            if cx < 0 || cx >= cw as i64 {
                continue;
            }
            let base = canvas.pixel(cx as u32, cy as u32);
            let mixed = blend_pixel(blend, base, top.pixel(lx, ly), opacity);
            canvas.put_pixel(cx as u32, cy as u32, mixed);
        }
    }
}
