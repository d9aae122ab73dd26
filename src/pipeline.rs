// THEORY:
// The `pipeline` module is the top-level API of the cloud engine. It wires the
// layers together in their fixed order:
//
//   strip -> GridManager (patches, heuristics, scores) -> ProbabilityMap
//         -> point evaluator (one verdict per crossing)
//         -> crossing selector (primary + spread-out follow-ups)
//
// A `CloudPipeline` is built once from a validated `RunConfig` and a shared
// feature scorer and can then be run on any number of strips. It holds no state
// between runs, so the same strip always produces the same outcome.

use crate::config::RunConfig;
use crate::core_modules::crossing_selector::{CrossingSelector, Selection};
use crate::core_modules::feature_scorer::FeatureScorer;
use crate::core_modules::grid_manager::GridManager;
use crate::core_modules::point_evaluator::{self, BorderPoint, Verdict};
use crate::core_modules::probability_map::ProbabilityMap;
use crate::error::Result;
use image::RgbImage;
use std::sync::Arc;
use tracing::info;

// Re-export key data structures for the public API.
pub use crate::core_modules::crossing_selector::{SelectedCrossing, SpreadLevel};
pub use crate::core_modules::point_evaluator::PixelPoint;
pub use crate::core_modules::utils::image_helper::image_helper::load_rgb as load_image;

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub map: ProbabilityMap,
    pub verdicts: Vec<Verdict>,
    pub selection: Selection,
}

impl RunOutcome {
    pub fn clouds_detected(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_cloud).count()
    }
}

/// The synchronous cloud-detection engine.
#[derive(Clone)]
pub struct CloudPipeline {
    config: RunConfig,
    scorer: Arc<dyn FeatureScorer>,
}

impl CloudPipeline {
    /// Validates `config` and binds it to `scorer`.
    pub fn new(config: RunConfig, scorer: Arc<dyn FeatureScorer>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, scorer })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn scorer(&self) -> &Arc<dyn FeatureScorer> {
        &self.scorer
    }

    pub fn grid_manager(&self) -> GridManager<'_> {
        GridManager::new(&self.config, self.scorer.as_ref())
    }

    pub fn probability_map(&self, image: &RgbImage) -> Result<ProbabilityMap> {
        self.grid_manager().synthesize(image)
    }

    pub fn evaluate(&self, map: &ProbabilityMap, points: &[BorderPoint]) -> Vec<Verdict> {
        point_evaluator::evaluate(map, points, self.config.threshold, self.config.point_radius)
    }

    pub fn select(&self, verdicts: &[Verdict]) -> Selection {
        CrossingSelector::new(self.config.max_crossings, self.config.min_distance).select(verdicts)
    }

    /// Builds the map for `image` and samples it at every border point.
    pub fn detect_at_points(&self, image: &RgbImage, points: &[BorderPoint]) -> Result<(Vec<Verdict>, ProbabilityMap)> {
        let map = self.probability_map(image)?;
        let verdicts = self.evaluate(&map, points);
        Ok((verdicts, map))
    }

    /// Verdicts and selection for an already synthesized map.
    pub fn finish(&self, map: ProbabilityMap, points: &[BorderPoint]) -> RunOutcome {
        let verdicts = self.evaluate(&map, points);
        let selection = self.select(&verdicts);
        let outcome = RunOutcome {
            map,
            verdicts,
            selection,
        };
        info!(
            "{} of {} crossings cloudy, {} selected",
            outcome.clouds_detected(),
            outcome.verdicts.len(),
            outcome.selection.len()
        );
        outcome
    }

    pub fn run(&self, image: &RgbImage, points: &[BorderPoint]) -> Result<RunOutcome> {
        let map = self.probability_map(image)?;
        Ok(self.finish(map, points))
    }
}
