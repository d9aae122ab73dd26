// THEORY:
// The point evaluator turns the dense probability map into one verdict per border
// crossing. Each crossing is a fixed pixel on the strip, loaded from configuration
// with a stable index. The map is averaged over a small window around the point
// (the half-open `[p - 3, p + 3)` range on each axis by default) and compared with
// the run threshold.
//
// A crossing whose window lands only on unset pixels, or entirely outside the
// strip, is not an error: it reads as probability 0 and "clear".

use crate::core_modules::probability_map::ProbabilityMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A pixel coordinate on the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub fn distance(&self, other: &PixelPoint) -> f32 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt() as f32
    }
}

/// A border crossing at a fixed pixel, identified by its position in the points file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderPoint {
    pub index: usize,
    pub point: PixelPoint,
    pub name: Option<String>,
}

/// Cloud verdict for one border crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub index: usize,
    pub point: PixelPoint,
    pub probability: f32,
    pub is_cloud: bool,
}

/// Samples the map around every point and classifies it against `threshold`.
pub fn evaluate(map: &ProbabilityMap, points: &[BorderPoint], threshold: f32, radius: u32) -> Vec<Verdict> {
    points
        .iter()
        .map(|bp| {
            let PixelPoint { x, y } = bp.point;
            if x >= map.width() || y >= map.height() {
                warn!(
                    "Border point {} at ({}, {}) lies outside the {}x{} strip",
                    bp.index,
                    x,
                    y,
                    map.width(),
                    map.height()
                );
            }
            let probability = map.window_mean(x, y, radius).unwrap_or(0.0);
            Verdict {
                index: bp.index,
                point: bp.point,
                probability,
                is_cloud: probability > threshold,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::probability_map::ProbabilityAccumulator;

    fn bp(index: usize, x: u32, y: u32) -> BorderPoint {
        BorderPoint {
            index,
            point: PixelPoint { x, y },
            name: None,
        }
    }

    fn half_cloudy_map() -> ProbabilityMap {
        let mut acc = ProbabilityAccumulator::new(40, 20);
        acc.splat(0, 0, 20, 0.1);
        acc.splat(20, 0, 20, 0.6);
        acc.into_raw_map()
    }

    #[test]
    fn verdicts_follow_threshold_and_keep_indices() {
        let map = half_cloudy_map();
        let verdicts = evaluate(&map, &[bp(0, 5, 5), bp(1, 30, 10)], 0.25, 3);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].index, 0);
        assert!(!verdicts[0].is_cloud);
        assert!((verdicts[0].probability - 0.1).abs() < 1e-6);
        assert!(verdicts[1].is_cloud);
        assert_eq!(verdicts[1].point, PixelPoint { x: 30, y: 10 });
    }

    #[test]
    fn window_straddling_a_boundary_is_averaged() {
        let map = half_cloudy_map();
        // columns 17..23: three at 0.1, three at 0.6
        let v = &evaluate(&map, &[bp(0, 20, 10)], 0.25, 3)[0];
        assert!((v.probability - 0.35).abs() < 1e-6);
        assert!(v.is_cloud);
    }

    #[test]
    fn uncovered_points_degrade_to_clear() {
        let mut acc = ProbabilityAccumulator::new(40, 20);
        acc.splat(0, 0, 10, 0.9);
        let map = acc.into_raw_map();
        let verdicts = evaluate(&map, &[bp(0, 30, 15), bp(1, 500, 500)], 0.25, 3);
        for v in verdicts {
            assert_eq!(v.probability, 0.0);
            assert!(!v.is_cloud);
        }
    }

    #[test]
    fn distance_is_euclidean() {
        let a = PixelPoint { x: 0, y: 0 };
        let b = PixelPoint { x: 30, y: 40 };
        assert_eq!(a.distance(&b), 50.0);
    }

    #[test]
    fn verdict_serializes_with_nested_point() {
        let v = Verdict {
            index: 3,
            point: PixelPoint { x: 1, y: 2 },
            probability: 0.5,
            is_cloud: true,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["point"]["x"], 1);
        assert_eq!(json["is_cloud"], true);
    }
}
