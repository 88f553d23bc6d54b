//! 4-D lattice value noise, periodic on every axis, and its fractal sum.

/// Lattice period of the base octave. Higher octaves scale the period with
/// their frequency, so the summed field repeats every `BASE_PERIOD` units.
pub const BASE_PERIOD: i64 = 1024;

pub const NUM_OCTAVES: u32 = 4;
pub const PERSISTENCE: f32 = 0.5;
pub const LACUNARITY: f32 = 2.0;

/// Fractional Brownian motion, normalized to roughly [-1, 1].
pub fn fbm4(x: f32, y: f32, z: f32, w: f32) -> f32 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut norm = 0.0;
    for octave in 0..NUM_OCTAVES {
        let period = BASE_PERIOD << octave;
        total += amplitude
            * value_noise4(
                x * frequency,
                y * frequency,
                z * frequency,
                w * frequency,
                period,
            );
        norm += amplitude;
        amplitude *= PERSISTENCE;
        frequency *= LACUNARITY;
    }
    total / norm
}

/// Smoothly interpolated lattice noise in [-1, 1], repeating every `period`.
///
/// Non-finite coordinates read as 0. Cells are reduced into the period
/// before the integer conversion, so any finite input is safe.
pub fn value_noise4(x: f32, y: f32, z: f32, w: f32, period: i64) -> f32 {
    let coords = [x, y, z, w].map(|c| if c.is_finite() { c } else { 0.0 });
    let base = coords.map(|c| c.floor());
    let cell = base.map(|b| f64::from(b).rem_euclid(period as f64) as i64);
    let t = [0, 1, 2, 3].map(|axis| smoothstep(coords[axis] - base[axis]));

    let mut corners = [0.0f32; 16];
    for (index, corner) in corners.iter_mut().enumerate() {
        let lattice = [0, 1, 2, 3].map(|axis| {
            let offset = ((index >> axis) & 1) as i64;
            (cell[axis] + offset).rem_euclid(period)
        });
        *corner = lattice_value(lattice);
    }

    // Collapse one axis at a time: 16 -> 8 -> 4 -> 2 -> 1.
    let mut width = 16;
    for weight in t {
        width /= 2;
        for i in 0..width {
            corners[i] = lerp(corners[2 * i], corners[2 * i + 1], weight);
        }
    }
    corners[0]
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lattice_value(lattice: [i64; 4]) -> f32 {
    let mut hash: u64 = 0x9E37_79B9_7F4A_7C15;
    for coordinate in lattice {
        hash ^= coordinate as u64;
        hash = hash.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        hash ^= hash >> 31;
    }
    hash = hash.wrapping_mul(0x94D0_49BB_1331_11EB);
    hash ^= hash >> 29;
    // Top 24 bits -> [0, 1) -> [-1, 1).
    let unit = (hash >> 40) as f32 / (1u64 << 24) as f32;
    unit * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::{fbm4, value_noise4, BASE_PERIOD};

    #[test]
    fn lattice_points_are_deterministic_and_bounded() {
        for i in 0..200 {
            let v = i as f32 * 0.37;
            let n = fbm4(v, v * 0.5, -v, v * 1.3);
            assert_eq!(n, fbm4(v, v * 0.5, -v, v * 1.3));
            assert!((-1.0..=1.0).contains(&n), "{n}");
        }
    }

    #[test]
    fn field_repeats_with_the_base_period() {
        let period = BASE_PERIOD as f32;
        for (x, y) in [(0.25, 3.5), (17.75, 2.125), (511.5, 0.0)] {
            let a = fbm4(x, y, 1.5, 0.75);
            let b = fbm4(x + period, y, 1.5, 0.75 + period);
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn extreme_coordinates_stay_in_range() {
        for c in [
            1.6e20,
            -1.6e20,
            f32::MAX,
            f32::MIN,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
        ] {
            let n = value_noise4(c, 1.0, c, 0.5, BASE_PERIOD);
            assert!((-1.0..=1.0).contains(&n), "{c}: {n}");
            let f = fbm4(c, 2.0, 1.0, c);
            assert!((-1.0..=1.0).contains(&f), "{c}: {f}");
        }
        assert_eq!(
            value_noise4(f32::NAN, 0.25, 0.5, 0.75, BASE_PERIOD),
            value_noise4(0.0, 0.25, 0.5, 0.75, BASE_PERIOD)
        );
    }

    #[test]
    fn noise_is_continuous_across_cells() {
        let below = value_noise4(2.0 - 1e-4, 0.5, 0.5, 0.5, BASE_PERIOD);
        let above = value_noise4(2.0 + 1e-4, 0.5, 0.5, 0.5, BASE_PERIOD);
        assert!((below - above).abs() < 1e-2);
    }
}
