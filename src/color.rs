use serde::{Deserialize, Serialize};

pub type Rgb = [f32; 3];

/// How per-point background colors are derived from the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ColorScheme {
    /// Uniform white point from `temperature`, scaled by `brightness`.
    #[default]
    Temperature,
    /// Sky palette interpolated along the model's Z axis.
    Gradient,
}

/// Approximate RGB for a color temperature in Kelvin, each channel in [0, 1].
///
/// Non-table-driven fit from Tanner Helland's temperature-to-RGB notes.
pub fn temperature_to_rgb(kelvin: f64) -> Rgb {
    let t = kelvin / 100.0;

    let (r, g, b) = if t <= 66.0 {
        let g = 0.390_081_578_769_019_6 * t.ln() - 0.631_841_443_788_627_5;
        let b = if t <= 19.0 {
            0.0
        } else {
            0.543_206_789_110_196 * (t - 10.0).ln() - 1.196_254_089_14
        };
        (1.0, g, b)
    } else {
        let r = 1.292_936_186_062_745 * (t - 60.0).powf(-0.133_204_759_2);
        let g = 1.129_890_860_895_294 * (t - 60.0).powf(-0.075_514_849_2);
        (r, g, 1.0)
    };

    [clamp_unit(r), clamp_unit(g), clamp_unit(b)]
}

// NaN (e.g. ln of a non-positive temperature) maps to 0.
fn clamp_unit(value: f64) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0) as f32
    }
}

/// Bottom-to-top sky palette used by the gradient scheme.
pub const SKY_PALETTE: &[Rgb] = &[
    [0.10, 0.08, 0.18],
    [0.22, 0.16, 0.38],
    [0.45, 0.30, 0.55],
    [0.80, 0.45, 0.40],
    [1.00, 0.70, 0.45],
    [0.95, 0.90, 0.80],
    [0.60, 0.78, 0.95],
    [0.35, 0.55, 0.90],
];

/// Linearly interpolate `table` at fractional index `position`.
/// Positions outside the table clamp to the end entries.
pub fn sample_table(table: &[Rgb], position: f32) -> Rgb {
    let Some(last) = table.len().checked_sub(1) else {
        return [0.0; 3];
    };
    if !position.is_finite() || position <= 0.0 {
        return table[0];
    }
    if position >= last as f32 {
        return table[last];
    }

    let lower = position.floor() as usize;
    let frac = position - lower as f32;
    let a = table[lower];
    let b = table[lower + 1];
    [
        a[0] + (b[0] - a[0]) * frac,
        a[1] + (b[1] - a[1]) * frac,
        a[2] + (b[2] - a[2]) * frac,
    ]
}
