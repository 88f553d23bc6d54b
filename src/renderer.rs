use anyhow::{bail, Result};

use crate::lightning::LightningDescriptor;
use crate::noise::fbm4;

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    /// Little-endian `f32` (x, y, z) per point.
    pub points: &'a [u8],
    pub matrix: &'a [f32; 16],
    /// Base color `c` per point (RGB); each pixel is `c + n * c * contrast`.
    pub colors: &'a [f32],
    pub contrast: f32,
    pub lightning: &'a [LightningDescriptor],
}

impl RenderInput<'_> {
    pub fn point_count(&self) -> Result<usize> {
        if self.points.len() % 12 != 0 {
            bail!(
                "point buffer is {} bytes, not a multiple of 12",
                self.points.len()
            );
        }
        Ok(self.points.len() / 12)
    }
}

/// Produces one RGB triple per input point, in input order, scaled to
/// 0..=255 but not clamped.
pub trait PixelRenderer {
    fn render(&self, input: &RenderInput<'_>) -> Result<Vec<f32>>;
}

/// CPU cloud renderer: fractal noise through the frame transform, colored by
/// the background, plus an inverse-square-ish glow per lightning bolt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseRenderer;

impl NoiseRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl PixelRenderer for NoiseRenderer {
    fn render(&self, input: &RenderInput<'_>) -> Result<Vec<f32>> {
        let count = input.point_count()?;
        if input.colors.len() != count * 3 {
            bail!(
                "background has {} color values for {} points",
                input.colors.len(),
                count
            );
        }

        let m = input.matrix;
        let mut pixels = Vec::with_capacity(count * 3);
        for (index, chunk) in input.points.chunks_exact(12).enumerate() {
            let x0 = read_f32(&chunk[0..4]);
            let y0 = read_f32(&chunk[4..8]);
            let z0 = read_f32(&chunk[8..12]);

            let x = m[0] * x0 + m[4] * y0 + m[8] * z0 + m[12];
            let y = m[1] * x0 + m[5] * y0 + m[9] * z0 + m[13];
            let z = m[2] * x0 + m[6] * y0 + m[10] * z0 + m[14];
            let w = m[3] * x0 + m[7] * y0 + m[11] * z0 + m[15];
            let n = fbm4(x, y, z, w);

            let base = &input.colors[index * 3..index * 3 + 3];
            let mut rgb = [0, 1, 2].map(|c| base[c] + n * base[c] * input.contrast);

            for bolt in input.lightning {
                let xd = bolt.position[0] - x0;
                let yd = bolt.position[1] - y0;
                let zd = bolt.position[2] - z0;
                let dist2 = xd * xd + yd * yd + zd * zd;
                let intensity = 1.0 / (1.0 + bolt.falloff * dist2);
                for c in 0..3 {
                    rgb[c] += intensity * bolt.color[c];
                }
            }

            pixels.extend(rgb.map(|channel| channel * 255.0 + 0.5));
        }
        Ok(pixels)
    }
}

fn read_f32(bytes: &[u8]) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    f32::from_le_bytes(raw)
}
