// THEORY:
// A run either completes end-to-end or aborts as a whole. There is no partial
// probability map: a corrupt strip, a broken config, or a single patch the feature
// extractor cannot score all surface here as one `CumulusError` and stop the run.
// Evaluation-time gaps (a border point sitting on unset map pixels) are NOT errors;
// they degrade to a zero-probability verdict inside the point evaluator.

use thiserror::Error;

/// Failure raised by a `FeatureScorer` backend for a single patch.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// The patch does not match the extractor's fixed input resolution.
    #[error("malformed patch: expected {expected}x{expected}, got {width}x{height}")]
    MalformedInput {
        expected: u32,
        width: u32,
        height: u32,
    },
    /// The extractor itself failed (model missing, runtime error, bad output).
    #[error("feature extractor unavailable: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum CumulusError {
    #[error("image codec error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("image has zero area")]
    EmptyImage,

    /// Scoring the patch at grid cell `(cx, cy)` failed; the whole map is discarded.
    #[error("feature scoring failed at grid cell ({cx}, {cy}): {source}")]
    Scorer {
        cx: u32,
        cy: u32,
        #[source]
        source: ScoreError,
    },

    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

pub type Result<T> = std::result::Result<T, CumulusError>;
