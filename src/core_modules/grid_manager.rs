// THEORY:
// The `GridManager` is the orchestrator of the probability-map layer. It owns the
// lattice parameters and a handle to the feature scorer, and it drives every
// `GridCell` through the same sequence: cut the patch, score it, summarize the
// centre window, classify it, compute the cell probability. The per-cell results
// are then splatted into the accumulator and smoothed into the final map.
//
// Key architectural principles:
// 1.  **Orchestration**: It is not an analyzer itself. The maths lives in
//     `heuristic` and `probability_map`; the manager only calls them in order.
// 2.  **Cells are independent**: `score_cell` reads the image and nothing else, so
//     the parallel pipeline can call it from any worker in any order. Only the
//     splat into the accumulator is sequential, and it always happens in lattice
//     order so the map is bit-identical however the scores were produced.
// 3.  **All or nothing**: A single scorer failure aborts the map.

use crate::config::RunConfig;
use crate::core_modules::center_region::CenterRegion;
use crate::core_modules::feature_scorer::FeatureScorer;
use crate::core_modules::heuristic::{self, HeuristicFlags};
use crate::core_modules::patch_sampler::{GridCell, PatchSampler};
use crate::core_modules::probability_map::{self, GaussianKernel, ProbabilityAccumulator, ProbabilityMap};
use crate::error::{CumulusError, Result};
use image::RgbImage;
use tracing::{debug, info};

/// Everything computed for one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellScore {
    pub cell: GridCell,
    pub brightness: f64,
    pub activation: f32,
    pub flags: HeuristicFlags,
    pub probability: f64,
}

/// Synthesizes the probability map for one strip.
pub struct GridManager<'a> {
    sampler: PatchSampler,
    center_radius: u32,
    kernel: GaussianKernel,
    scorer: &'a dyn FeatureScorer,
}

impl<'a> GridManager<'a> {
    pub fn new(config: &RunConfig, scorer: &'a dyn FeatureScorer) -> Self {
        Self {
            sampler: PatchSampler::new(config.grid_size, config.patch_size, scorer.input_size()),
            center_radius: config.center_radius,
            kernel: GaussianKernel::from_size(config.blur_kernel),
            scorer,
        }
    }

    pub fn sampler(&self) -> &PatchSampler {
        &self.sampler
    }

    /// Scores a single cell. `Ok(None)` means the cell is degenerate and is skipped.
    pub fn score_cell(&self, image: &RgbImage, cell: GridCell) -> Result<Option<CellScore>> {
        let Some(patch) = self.sampler.extract(image, cell) else {
            return Ok(None);
        };
        let Some(region) = CenterRegion::around(image, cell.cx, cell.cy, self.center_radius) else {
            return Ok(None);
        };

        let activation = self.scorer.score(&patch).map_err(|source| CumulusError::Scorer {
            cx: cell.cx,
            cy: cell.cy,
            source,
        })?;

        let brightness = region.brightness();
        let flags = heuristic::classify(&region);
        let probability = probability_map::cloud_probability(brightness, activation as f64, flags);

        Ok(Some(CellScore {
            cell,
            brightness,
            activation,
            flags,
            probability,
        }))
    }

    /// Scores a batch of cells in order, stopping at the first failure.
    pub fn score_cells(&self, image: &RgbImage, cells: &[GridCell]) -> Result<Vec<CellScore>> {
        let mut scores = Vec::with_capacity(cells.len());
        for &cell in cells {
            if let Some(score) = self.score_cell(image, cell)? {
                scores.push(score);
            }
        }
        Ok(scores)
    }

    /// Splats scored cells (in lattice order) and smooths the result.
    pub fn assemble(&self, width: u32, height: u32, scores: &[CellScore]) -> ProbabilityMap {
        let mut accumulator = ProbabilityAccumulator::new(width, height);
        for score in scores {
            accumulator.splat(score.cell.cx, score.cell.cy, self.sampler.grid_size, score.probability);
        }
        let raw = accumulator.into_raw_map();
        debug!("Raw map covers {} of {} pixels", raw.defined_count(), width as usize * height as usize);
        raw.smooth(&self.kernel)
    }

    /// Builds the full probability map for `image`.
    pub fn synthesize(&self, image: &RgbImage) -> Result<ProbabilityMap> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(CumulusError::EmptyImage);
        }
        let cells = self.sampler.lattice(w, h);
        let scores = self.score_cells(image, &cells)?;
        info!("Scored {} of {} grid cells on a {}x{} strip", scores.len(), cells.len(), w, h);
        Ok(self.assemble(w, h, &scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::feature_scorer::ConstantScorer;
    use crate::core_modules::patch_sampler::Patch;
    use crate::error::ScoreError;
    use image::Rgb;

    fn config() -> RunConfig {
        RunConfig {
            patch_input_size: 32,
            ..RunConfig::default()
        }
    }

    struct FailingScorer;

    impl FeatureScorer for FailingScorer {
        fn score(&self, patch: &Patch) -> std::result::Result<f32, ScoreError> {
            if patch.cell.cx >= 40 {
                Err(ScoreError::Backend("model went away".into()))
            } else {
                Ok(1.0)
            }
        }

        fn input_size(&self) -> u32 {
            32
        }
    }

    #[test]
    fn uniform_blue_gray_strip_gets_the_diffuse_boost() {
        let cfg = config();
        let scorer = ConstantScorer::new(2.0, 32);
        let manager = GridManager::new(&cfg, &scorer);
        let img = RgbImage::from_pixel(100, 60, Rgb([200, 200, 220]));

        let map = manager.synthesize(&img).unwrap();
        let b = 620.0 / 3.0 / 255.0;
        let baseline = probability_map::base_probability(b, 2.0) as f32;
        for y in 0..60 {
            for x in 0..100 {
                let p = map.get(x, y).unwrap();
                assert!((p - baseline * 1.2).abs() < 1e-4);
                assert!(p > baseline);
            }
        }
    }

    #[test]
    fn resynthesis_is_bit_identical() {
        let cfg = config();
        let scorer = ConstantScorer::new(0.5, 32);
        let manager = GridManager::new(&cfg, &scorer);
        let img = RgbImage::from_fn(80, 50, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, ((x + y) * 2) as u8]));
        let a = manager.synthesize(&img).unwrap();
        let b = manager.synthesize(&img).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn one_bad_patch_aborts_the_map() {
        let cfg = config();
        let manager = GridManager::new(&cfg, &FailingScorer);
        let img = RgbImage::from_pixel(100, 40, Rgb([50, 50, 50]));
        let err = manager.synthesize(&img).unwrap_err();
        assert!(matches!(err, CumulusError::Scorer { cx: 40, cy: 0, .. }));
    }

    #[test]
    fn empty_image_is_fatal() {
        let cfg = config();
        let scorer = ConstantScorer::new(0.0, 32);
        let manager = GridManager::new(&cfg, &scorer);
        assert!(matches!(manager.synthesize(&RgbImage::new(0, 10)), Err(CumulusError::EmptyImage)));
    }

    #[test]
    fn degenerate_patches_leave_the_map_unset() {
        let cfg = RunConfig {
            patch_size: 1,
            ..config()
        };
        let scorer = ConstantScorer::new(0.0, 32);
        let manager = GridManager::new(&cfg, &scorer);
        let img = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
        let map = manager.synthesize(&img).unwrap();
        assert_eq!(map.defined_count(), 0);
    }

    #[test]
    fn city_lights_score_below_clouds() {
        let cfg = config();
        let scorer = ConstantScorer::new(1.0, 32);
        let manager = GridManager::new(&cfg, &scorer);
        let img = RgbImage::from_fn(60, 60, |x, y| {
            if x < 30 {
                Rgb([200, 200, 220])
            } else if (x + y) % 2 == 0 {
                Rgb([255, 165, 0])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let cloud = manager.score_cell(&img, GridCell { cx: 0, cy: 20 }).unwrap().unwrap();
        let city = manager.score_cell(&img, GridCell { cx: 40, cy: 20 }).unwrap().unwrap();
        assert!(city.flags.is_orange_hue && city.flags.is_high_texture);
        assert!(cloud.probability > city.probability);
        let expected = probability_map::base_probability(city.brightness, 1.0) * 0.15;
        assert!((city.probability - expected).abs() < 1e-12);
    }
}
