pub mod center_region;
pub mod crossing_selector;
pub mod feature_scorer;
pub mod geo;
pub mod grid_manager;
pub mod heuristic;
pub mod patch_sampler;
pub mod pixel;
pub mod point_evaluator;
pub mod probability_map;
pub mod signature;

pub mod utils {
    pub mod image_helper;
}
