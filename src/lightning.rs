use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::model::Bounds;

/// Standard deviation of a chained bolt's offset from its parent, in meters.
const CHAIN_SPREAD: f32 = 0.5;
/// Standard deviation of a flickering bolt's per-frame brightness.
const FLICKER_SPREAD: f32 = 0.05;

/// Render-ready description of one bolt: position, color and falloff, in the
/// `(x, y, z, r, g, b, falloff)` order the renderer consumes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightningDescriptor {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub falloff: f32,
}

impl LightningDescriptor {
    pub fn as_floats(&self) -> &[f32; 7] {
        bytemuck::cast_ref(self)
    }
}

/// A single in-cloud lightning bolt.
///
/// A bolt flickers around its `strength` for `flicker_duration` seconds, then
/// fades linearly to black over `fade_duration` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LightningBolt {
    pub position: [f32; 3],
    pub strength: f32,
    pub falloff: f32,
    pub fade_duration: f32,
    pub flicker_duration: f32,
    /// Seconds remaining; counts down from `fade_duration + flicker_duration`.
    pub lifetime: f32,
    pub chainable: bool,
}

impl LightningBolt {
    pub fn new(
        position: [f32; 3],
        strength: f32,
        falloff: f32,
        fade_duration: f32,
        flicker_duration: f32,
        chainable: bool,
    ) -> Self {
        Self {
            position,
            strength,
            falloff,
            fade_duration,
            flicker_duration,
            lifetime: fade_duration + flicker_duration,
            chainable,
        }
    }

    /// A bolt with randomly drawn shape and timeline.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, position: [f32; 3]) -> Self {
        let strength = gauss(rng, 0.5, 0.2).abs();
        let falloff = rng.gen_range(2.0..5.0);
        let fade_duration = gauss(rng, 0.1, 0.2).abs();
        let flicker_duration = gauss(rng, 0.1, 0.5).abs();
        Self::new(
            position,
            strength,
            falloff,
            fade_duration,
            flicker_duration,
            true,
        )
    }

    /// A performer-triggered flash: bright, short and never chained from.
    pub fn triggered(position: [f32; 3]) -> Self {
        Self::new(position, 1.0, 3.0, 0.2, 0.1, false)
    }

    pub fn is_fading(&self) -> bool {
        self.lifetime <= self.fade_duration
    }

    /// Brightness for the current frame. Flickering bolts draw a fresh
    /// sample every call.
    pub fn luma<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.is_fading() {
            fade_luma(self.lifetime, self.strength, self.fade_duration)
        } else {
            gauss(rng, self.strength, FLICKER_SPREAD)
        }
    }

    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> LightningDescriptor {
        let luma = self.luma(rng);
        LightningDescriptor {
            position: self.position,
            color: [luma; 3],
            falloff: self.falloff,
        }
    }
}

/// Linear fade from `strength` at `lifetime == fade_duration` to 0 at
/// `lifetime == 0`. A zero-length fade renders black.
pub fn fade_luma(lifetime: f32, strength: f32, fade_duration: f32) -> f32 {
    if fade_duration <= f32::EPSILON {
        return 0.0;
    }
    lifetime.max(0.0) * strength / fade_duration
}

fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f32, std_dev: f32) -> f32 {
    let sample: f32 = rng.sample(StandardNormal);
    mean + std_dev * sample
}

/// Probabilities for this frame's birth decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightningOdds {
    pub new: f64,
    pub chain: f64,
}

/// Outcome of the per-frame birth decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Birth {
    None,
    New,
    Chain,
}

impl Birth {
    /// Decide from a single uniform draw `r`. The new-bolt test runs first,
    /// so the two outcomes are mutually exclusive.
    pub fn decide(r: f64, odds: LightningOdds, has_live_bolts: bool) -> Self {
        if r < odds.new {
            Self::New
        } else if r < odds.chain && has_live_bolts {
            Self::Chain
        } else {
            Self::None
        }
    }
}

/// Live set of lightning bolts, bounded by `max_lightning` for simulated
/// births.
#[derive(Debug)]
pub struct LightningSimulator<R = StdRng> {
    bolts: Vec<LightningBolt>,
    max_lightning: usize,
    rng: R,
}

impl LightningSimulator<StdRng> {
    pub fn new(max_lightning: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(max_lightning, rng)
    }
}

impl<R: Rng> LightningSimulator<R> {
    pub fn with_rng(max_lightning: usize, rng: R) -> Self {
        Self {
            bolts: Vec::with_capacity(max_lightning),
            max_lightning,
            rng,
        }
    }

    pub fn bolts(&self) -> &[LightningBolt] {
        &self.bolts
    }

    pub fn len(&self) -> usize {
        self.bolts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bolts.is_empty()
    }

    pub fn max_lightning(&self) -> usize {
        self.max_lightning
    }

    /// Insert a bolt directly, bypassing the probability step and the cap.
    pub fn insert(&mut self, bolt: LightningBolt) {
        tracing::debug!(
            action = "insert_lightning",
            x = bolt.position[0],
            y = bolt.position[1],
            z = bolt.position[2],
            chainable = bolt.chainable
        );
        self.bolts.push(bolt);
    }

    pub fn make_lightning_bolt(&mut self, x: f32, y: f32, z: f32) {
        self.insert(LightningBolt::triggered([x, y, z]));
    }

    /// Run one frame: maybe spawn a bolt, age every bolt by `dt`, drop the
    /// expired ones and return descriptors for the survivors.
    pub fn update(
        &mut self,
        dt: f32,
        odds: LightningOdds,
        bounds: &Bounds,
    ) -> Vec<LightningDescriptor> {
        if self.bolts.len() < self.max_lightning {
            self.spawn(odds, bounds);
        }

        let mut rendered = Vec::with_capacity(self.bolts.len());
        let rng = &mut self.rng;
        self.bolts.retain_mut(|bolt| {
            bolt.lifetime -= dt;
            if bolt.lifetime < 0.0 {
                return false;
            }
            rendered.push(bolt.render(rng));
            true
        });
        rendered
    }

    fn spawn(&mut self, odds: LightningOdds, bounds: &Bounds) {
        let r: f64 = self.rng.gen();
        match Birth::decide(r, odds, !self.bolts.is_empty()) {
            Birth::New => {
                let position = std::array::from_fn(|axis| {
                    uniform(&mut self.rng, bounds.min[axis], bounds.max[axis])
                });
                let bolt = LightningBolt::random(&mut self.rng, position);
                tracing::trace!(action = "new_lightning", strength = bolt.strength);
                self.bolts.push(bolt);
            }
            Birth::Chain => {
                let Some(parent) = self.bolts.choose(&mut self.rng) else {
                    return;
                };
                if !parent.chainable {
                    return;
                }
                let origin = parent.position;
                let position = std::array::from_fn(|axis| {
                    gauss(&mut self.rng, origin[axis], CHAIN_SPREAD)
                });
                let bolt = LightningBolt::random(&mut self.rng, position);
                tracing::trace!(action = "chain_lightning", strength = bolt.strength);
                self.bolts.push(bolt);
            }
            Birth::None => {}
        }
    }
}

// gen_range panics on an empty range; a flat axis yields its only value.
fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f32, high: f32) -> f32 {
    if high > low {
        rng.gen_range(low..=high)
    } else {
        low
    }
}
