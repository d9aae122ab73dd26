// THEORY:
// All tunables of a run live in one immutable `RunConfig` that is built once (from
// defaults, an optional JSON file, and CLI overrides), validated, and then passed
// by reference into the pipeline. Nothing in the engine reads process-wide state.
//
// The border points come from a separate JSON file in the layout the coordinate
// conversion tooling produces: `{"points": [{"x": .., "y": .., "name": ..}, ...]}`.
// A point's index is its position in that list and stays stable across runs.

use crate::core_modules::geo::GeoConfig;
use crate::core_modules::point_evaluator::{BorderPoint, PixelPoint};
use crate::error::{CumulusError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for one cloud-detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// A point is cloudy when its sampled probability is strictly above this.
    pub threshold: f32,
    /// Spacing of the sampling lattice in pixels; also the side of each footprint.
    pub grid_size: u32,
    /// Side of the crop window fed (after resizing) to the feature extractor.
    pub patch_size: u32,
    /// Maximum number of crossings selected for follow-up capture.
    pub max_crossings: usize,
    /// Minimum pixel distance between selected crossings before relaxation.
    pub min_distance: f32,
    /// Half-side of the colour/texture window at each lattice point.
    pub center_radius: u32,
    /// Half-side of the window averaged around each border point.
    pub point_radius: u32,
    /// Side of the Gaussian smoothing kernel (odd).
    pub blur_kernel: u32,
    /// Input resolution of the feature extractor.
    pub patch_input_size: u32,
    pub geo: GeoConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threshold: 0.25,
            grid_size: 20,
            patch_size: 64,
            max_crossings: 9,
            min_distance: 50.0,
            center_radius: 10,
            point_radius: 3,
            blur_kernel: 31,
            patch_input_size: 224,
            geo: GeoConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CumulusError::InvalidConfig(msg));
        if !(0.0..=1.0).contains(&self.threshold) {
            return invalid(format!("threshold must be within [0, 1], got {}", self.threshold));
        }
        if self.grid_size == 0 {
            return invalid("grid_size must be at least 1".into());
        }
        if self.patch_size == 0 {
            return invalid("patch_size must be at least 1".into());
        }
        if self.min_distance.is_nan() || self.min_distance < 0.0 {
            return invalid(format!("min_distance must be a non-negative number, got {}", self.min_distance));
        }
        if self.center_radius == 0 {
            return invalid("center_radius must be at least 1".into());
        }
        if self.point_radius == 0 {
            return invalid("point_radius must be at least 1".into());
        }
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return invalid(format!("blur_kernel must be odd and positive, got {}", self.blur_kernel));
        }
        if self.patch_input_size == 0 {
            return invalid("patch_input_size must be at least 1".into());
        }
        self.geo.validate()
    }
}

#[derive(Debug, Deserialize)]
struct PointEntry {
    x: u32,
    y: u32,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointsFile {
    points: Vec<PointEntry>,
}

/// Parses a border points document.
pub fn parse_border_points(json: &str) -> Result<Vec<BorderPoint>> {
    let file: PointsFile = serde_json::from_str(json)?;
    Ok(file
        .points
        .into_iter()
        .enumerate()
        .map(|(index, entry)| BorderPoint {
            index,
            point: PixelPoint {
                x: entry.x,
                y: entry.y,
            },
            name: entry.name,
        })
        .collect())
}

pub fn load_border_points(path: impl AsRef<Path>) -> Result<Vec<BorderPoint>> {
    parse_border_points(&fs::read_to_string(path)?)
}
