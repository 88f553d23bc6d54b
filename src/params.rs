use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Performer-tunable effect parameters.
///
/// Angles are in degrees. Probabilities are nominally in [0, 1] but are not
/// validated; every consumer tolerates out-of-range values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightParameters {
    /// How much detail is visible (noise-space scale factor).
    pub detail: f64,
    /// How fast the cloud shape changes over time. 0 is perfectly still.
    pub turbulence: f64,
    pub wind_heading: f64,
    /// Meters per second.
    pub wind_speed: f64,
    /// Z-axis rotation of the whole cloud.
    pub rotation: f64,
    /// Color temperature in Kelvin.
    pub temperature: f64,
    pub gradient_bottom: f64,
    pub gradient_top: f64,
    pub brightness: f64,
    /// Proportion of `brightness` modulated by the noise field.
    pub contrast: f64,
    /// Per-frame probability of a brand new bolt.
    pub lightning_new: f64,
    /// Per-frame probability of chaining from a live bolt. Has no effect when
    /// lower than `lightning_new`.
    pub lightning_chain: f64,
}

impl Default for LightParameters {
    fn default() -> Self {
        Self {
            detail: 0.8,
            turbulence: 0.4,
            wind_heading: 0.0,
            wind_speed: 0.2,
            rotation: 0.0,
            temperature: 6800.0,
            gradient_bottom: 0.0,
            gradient_top: 1.0,
            brightness: 0.3,
            contrast: 0.9,
            lightning_new: 0.01,
            lightning_chain: 0.1,
        }
    }
}

pub const PARAMETER_NAMES: &[&str] = &[
    "detail",
    "turbulence",
    "wind_heading",
    "wind_speed",
    "rotation",
    "temperature",
    "gradient_bottom",
    "gradient_top",
    "brightness",
    "contrast",
    "lightning_new",
    "lightning_chain",
];

impl LightParameters {
    fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        let field = match name {
            "detail" => &mut self.detail,
            "turbulence" => &mut self.turbulence,
            "wind_heading" => &mut self.wind_heading,
            "wind_speed" => &mut self.wind_speed,
            "rotation" => &mut self.rotation,
            "temperature" => &mut self.temperature,
            "gradient_bottom" => &mut self.gradient_bottom,
            "gradient_top" => &mut self.gradient_top,
            "brightness" => &mut self.brightness,
            "contrast" => &mut self.contrast,
            "lightning_new" => &mut self.lightning_new,
            "lightning_chain" => &mut self.lightning_chain,
            _ => return None,
        };
        Some(field)
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let field = self.field_mut(name).ok_or_else(|| {
            anyhow!(
                "unknown parameter '{}'. Known parameters: {}",
                name,
                PARAMETER_NAMES.join(", ")
            )
        })?;
        *field = value;
        Ok(())
    }
}

/// Owner of the live parameter set.
///
/// Mutation happens only through `set`/`apply`, between frames; the render
/// loop reads a `snapshot` once per frame so a frame never sees a mix of
/// old and new values.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    current: LightParameters,
    revision: u64,
}

impl ParameterStore {
    pub fn new(initial: LightParameters) -> Self {
        Self {
            current: initial,
            revision: 0,
        }
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        self.current.set(name, value)?;
        self.revision += 1;
        tracing::debug!(action = "set_parameter", name, value);
        Ok(())
    }

    pub fn apply(&mut self, params: &LightParameters) {
        self.current = *params;
        self.revision += 1;
        tracing::debug!(action = "apply_parameters", revision = self.revision);
    }

    pub fn snapshot(&self) -> LightParameters {
        self.current
    }

    /// Incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// A `name=value` parameter override from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamOverride {
    pub name: String,
    pub value: f64,
}

impl ParamOverride {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((name, value)) = raw.split_once('=') else {
            bail!("invalid --set '{raw}': expected name=value");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("invalid --set '{raw}': parameter name is empty");
        }
        if !PARAMETER_NAMES.contains(&name) {
            bail!(
                "invalid --set '{raw}': unknown parameter '{name}'. Known parameters: {}",
                PARAMETER_NAMES.join(", ")
            );
        }
        let value = value
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid --set '{raw}': value is not a number"))?;
        Ok(Self {
            name: name.to_owned(),
            value,
        })
    }

    pub fn apply_to(&self, params: &mut LightParameters) -> Result<()> {
        params.set(&self.name, self.value)
    }
}
