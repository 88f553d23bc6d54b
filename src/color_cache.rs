use crate::color::{sample_table, temperature_to_rgb, ColorScheme, SKY_PALETTE};
use crate::model::Model;
use crate::params::LightParameters;

/// The parameters that determine the background color buffer, compared by
/// bit pattern so that `NaN` keys still match themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorKey {
    scheme: ColorScheme,
    bits: [u64; 3],
}

impl ColorKey {
    pub fn from_params(scheme: ColorScheme, params: &LightParameters) -> Self {
        let values = match scheme {
            ColorScheme::Temperature => [params.temperature, params.brightness, 0.0],
            ColorScheme::Gradient => [
                params.gradient_bottom,
                params.gradient_top,
                params.brightness,
            ],
        };
        Self {
            scheme,
            bits: values.map(f64::to_bits),
        }
    }

    fn value(&self, index: usize) -> f64 {
        f64::from_bits(self.bits[index])
    }
}

/// One-entry memo of the per-point background colors (RGB `f32` per point).
#[derive(Debug, Default)]
pub struct ColorBufferCache {
    last_key: Option<ColorKey>,
    buffer: Vec<f32>,
    recomputations: u64,
}

impl ColorBufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_refresh(&self, key: &ColorKey) -> bool {
        self.last_key.as_ref() != Some(key)
    }

    /// Return the color buffer for `key`, recomputing it only when the key
    /// differs from the previous call.
    pub fn refresh(&mut self, key: ColorKey, model: &Model) -> &[f32] {
        if self.needs_refresh(&key) {
            self.buffer = compute_colors(&key, model);
            self.last_key = Some(key);
            self.recomputations += 1;
            tracing::debug!(
                action = "recompute_colors",
                scheme = ?key.scheme,
                recomputations = self.recomputations
            );
        }
        &self.buffer
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

fn compute_colors(key: &ColorKey, model: &Model) -> Vec<f32> {
    match key.scheme {
        ColorScheme::Temperature => {
            let white = temperature_to_rgb(key.value(0));
            let brightness = key.value(1) as f32;
            let base = white.map(|channel| channel * brightness);
            base.repeat(model.len())
        }
        ColorScheme::Gradient => gradient_colors(
            model,
            key.value(0) as f32,
            key.value(1) as f32,
            key.value(2) as f32,
        ),
    }
}

const GRADIENT_AXIS: usize = 2;

fn gradient_colors(model: &Model, bottom: f32, top: f32, brightness: f32) -> Vec<f32> {
    let bounds = model.bounds();
    let min = bounds.min[GRADIENT_AXIS];
    let extent = bounds.extent(GRADIENT_AXIS);
    let table_span = (SKY_PALETTE.len() - 1) as f32;

    let mut colors = Vec::with_capacity(model.len() * 3);
    for point in model.points() {
        let normalized = if extent > 0.0 {
            (point[GRADIENT_AXIS] - min) / extent
        } else {
            0.0
        };
        let position = (bottom + normalized * (top - bottom)) * table_span;
        let rgb = sample_table(SKY_PALETTE, position);
        colors.extend(rgb.map(|channel| channel * brightness));
    }
    colors
}
