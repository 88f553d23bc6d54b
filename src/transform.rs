use crate::params::LightParameters;

/// Period of the renderer's noise field along every axis.
pub const NOISE_PERIOD: f64 = 1024.0;

/// Noise-space translation accumulated from wind and turbulence.
///
/// Components are x, y, z and the turbulence phase `w`. They grow without
/// bound and are reduced modulo [`NOISE_PERIOD`] only when the matrix is
/// built, so that casting to `f32` in the renderer never loses precision.
#[derive(Debug, Clone, Default)]
pub struct SpatialTransform {
    translation: [f64; 4],
}

impl SpatialTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translation(&self) -> [f64; 4] {
        self.translation
    }

    /// Accumulate wind and turbulence for a frame of length `dt`.
    ///
    /// Translations live in noise space, so they are scaled by `detail`.
    /// A heading change only affects motion from this frame on. The heading
    /// is measured in the world frame, independent of `rotation`.
    pub fn update(&mut self, dt: f64, params: &LightParameters) {
        let dtz = dt * params.detail;
        let heading = params.wind_heading.to_radians();
        let step = [
            heading.cos() * params.wind_speed * dtz,
            heading.sin() * params.wind_speed * dtz,
            0.0,
            params.turbulence * dtz,
        ];

        for (component, delta) in self.translation.iter_mut().zip(step) {
            // A torn or garbage parameter must not poison the accumulator.
            if delta.is_finite() {
                *component += delta;
            }
        }
    }

    /// Build the renderer's 16-element transform.
    ///
    /// Layout (the renderer reads it column-major, `x = m0*x0 + m4*y0 +
    /// m8*z0 + m12`):
    ///
    /// ```text
    ///  c    -s    0    0
    ///  s     c    0    0
    ///  0     0    z    0
    ///  tx   ty   tz   tw
    /// ```
    ///
    /// where `z = detail`, `c = z*cos(rotation)`, `s = z*sin(rotation)` and
    /// `t` is the translation wrapped into `[0, 1024)`.
    pub fn matrix(&self, params: &LightParameters) -> [f32; 16] {
        // |cos|, |sin| <= 1, so clamping the scale keeps every entry finite as f32.
        let z = finite_or_zero(params.detail).clamp(-F32_LIMIT, F32_LIMIT);
        let a = finite_or_zero(params.rotation).to_radians();
        let s = z * a.sin();
        let c = z * a.cos();
        let t = self.wrapped_translation();

        #[rustfmt::skip]
        let matrix = [
            c as f32, -s as f32, 0.0, 0.0,
            s as f32, c as f32, 0.0, 0.0,
            0.0, 0.0, z as f32, 0.0,
            t[0] as f32, t[1] as f32, t[2] as f32, t[3] as f32,
        ];
        matrix
    }

    pub fn wrapped_translation(&self) -> [f64; 4] {
        self.translation.map(wrap_noise_coordinate)
    }
}

/// Reduce a noise-space coordinate into `[0, NOISE_PERIOD)`.
pub fn wrap_noise_coordinate(value: f64) -> f64 {
    let wrapped = value.rem_euclid(NOISE_PERIOD);
    // rem_euclid can round up to exactly the period for tiny negative inputs.
    if wrapped >= NOISE_PERIOD {
        0.0
    } else {
        wrapped
    }
}

const F32_LIMIT: f64 = f32::MAX as f64;

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
