use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

/// One record of the layout file. Extra keys (e.g. `group`) are ignored.
#[derive(Debug, Clone, Deserialize)]
struct LayoutRecord {
    point: [f32; 3],
}

/// Axis-aligned bounding box of the model, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    fn of(points: &[[f32; 3]]) -> Self {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for point in points {
            for axis in 0..3 {
                min[axis] = min[axis].min(point[axis]);
                max[axis] = max[axis].max(point[axis]);
            }
        }
        Self { min, max }
    }

    pub fn extent(&self, axis: usize) -> f32 {
        self.max[axis] - self.min[axis]
    }

    pub fn contains(&self, point: [f32; 3]) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }
}

/// Physical sculpture: one point per LED, in OPC channel order.
///
/// Immutable after construction. `packed` holds the same points as
/// little-endian `f32` triples for the renderer.
#[derive(Debug, Clone)]
pub struct Model {
    points: Vec<[f32; 3]>,
    bounds: Bounds,
    packed: Vec<u8>,
}

impl Model {
    pub fn from_points(points: Vec<[f32; 3]>) -> Result<Self> {
        if points.is_empty() {
            bail!("layout must contain at least one point");
        }
        if let Some(index) = points
            .iter()
            .position(|point| point.iter().any(|value| !value.is_finite()))
        {
            bail!("layout point {index} has a non-finite coordinate");
        }

        let bounds = Bounds::of(&points);
        let packed = points
            .iter()
            .flat_map(|point| point.iter().flat_map(|value| value.to_le_bytes()))
            .collect();

        Ok(Self {
            points,
            bounds,
            packed,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read layout {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid layout {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let records: Vec<LayoutRecord> = serde_json::from_str(contents).map_err(|error| {
            anyhow!(
                "failed to parse layout json at line {}, column {}: {}",
                error.line(),
                error.column(),
                error
            )
        })?;
        Self::from_points(records.into_iter().map(|record| record.point).collect())
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn packed(&self) -> &[u8] {
        &self.packed
    }
}
