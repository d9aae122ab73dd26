// THEORY:
// The feature scorer runs a frozen, pretrained image-feature extractor over each
// patch and boils the whole output down to one number: the mean absolute
// activation. The network is never trained or updated here; it is inference only.
//
// The extractor sits behind the `FeatureScorer` capability trait so that the
// probability-map algorithm does not depend on any particular model or runtime.
// Tests use `ConstantScorer`; the binary defaults to the deterministic
// `LuminanceScorer` and switches to `OnnxScorer` (feature `onnx`) when given a model.
//
// Any scoring failure is fatal for the run. Without the activation signal the
// probability is underdetermined, and a partial map would silently bias the verdicts.

use crate::core_modules::patch_sampler::Patch;
use crate::error::ScoreError;
use ndarray::Array4;

/// ImageNet channel statistics used by the pretrained backbones.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Capability interface: one scalar activation per patch.
pub trait FeatureScorer: Send + Sync {
    fn score(&self, patch: &Patch) -> Result<f32, ScoreError>;

    /// Side of the square input the scorer expects.
    fn input_size(&self) -> u32;
}

/// Reduces an activation tensor to the mean of its absolute values.
pub fn mean_abs<'a>(values: impl IntoIterator<Item = &'a f32>) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for v in values {
        sum += v.abs() as f64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64) as f32
}

/// Converts a patch to a `[1, 3, S, S]` tensor normalized with ImageNet mean/std.
pub fn normalized_tensor(patch: &Patch) -> Array4<f32> {
    let (w, h) = patch.pixels.dimensions();
    let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, p) in patch.pixels.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = (p[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    input
}

fn check_input(patch: &Patch, expected: u32) -> Result<(), ScoreError> {
    if patch.width() != expected || patch.height() != expected {
        return Err(ScoreError::MalformedInput {
            expected,
            width: patch.width(),
            height: patch.height(),
        });
    }
    Ok(())
}

/// Returns the same activation for every patch.
#[derive(Debug, Clone, Copy)]
pub struct ConstantScorer {
    pub activation: f32,
    pub input_size: u32,
}

impl ConstantScorer {
    pub fn new(activation: f32, input_size: u32) -> Self {
        Self {
            activation,
            input_size,
        }
    }
}

impl FeatureScorer for ConstantScorer {
    fn score(&self, patch: &Patch) -> Result<f32, ScoreError> {
        check_input(patch, self.input_size)?;
        Ok(self.activation)
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }
}

/// Inference-free stand-in: mean absolute gradient of the normalized tensor.
///
/// Flat regions score near zero and busy, high-contrast regions score high, which
/// is the same direction a CNN's early layers respond in. Deterministic.
#[derive(Debug, Clone, Copy)]
pub struct LuminanceScorer {
    pub input_size: u32,
}

impl LuminanceScorer {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }
}

impl FeatureScorer for LuminanceScorer {
    fn score(&self, patch: &Patch) -> Result<f32, ScoreError> {
        check_input(patch, self.input_size)?;
        let tensor = normalized_tensor(patch);
        let (_, channels, h, w) = tensor.dim();
        let mut gradients = Vec::with_capacity(channels * h * w * 2);
        for c in 0..channels {
            for y in 0..h {
                for x in 0..w {
                    let v = tensor[[0, c, y, x]];
                    if x + 1 < w {
                        gradients.push(tensor[[0, c, y, x + 1]] - v);
                    }
                    if y + 1 < h {
                        gradients.push(tensor[[0, c, y + 1, x]] - v);
                    }
                }
            }
        }
        Ok(mean_abs(&gradients))
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxScorer;

#[cfg(feature = "onnx")]
mod onnx {
    use super::*;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, TryLockError};
    use tracing::info;

    fn backend(e: impl std::fmt::Display) -> ScoreError {
        ScoreError::Backend(e.to_string())
    }

    /// Frozen ONNX backbone (e.g. MobileNetV3-small). Weights are never touched.
    ///
    /// Holds several sessions of the same model so concurrent callers do not all
    /// queue on one lock.
    pub struct OnnxScorer {
        sessions: Vec<Mutex<Session>>,
        next: AtomicUsize,
        input_name: String,
        input_size: u32,
    }

    impl OnnxScorer {
        pub fn from_file(model_path: impl AsRef<Path>, input_size: u32, sessions: usize) -> Result<Self, ScoreError> {
            let model_path = model_path.as_ref();
            let count = sessions.max(1);
            info!("Loading feature extractor: {} ({} sessions)", model_path.display(), count);
            let sessions = (0..count)
                .map(|_| {
                    Session::builder()
                        .and_then(|builder| builder.commit_from_file(model_path))
                        .map(Mutex::new)
                        .map_err(backend)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let input_name = sessions[0]
                .lock()
                .map_err(|_| backend("session lock poisoned"))?
                .inputs
                .first()
                .map(|i| i.name.clone())
                .unwrap_or_else(|| "input".into());
            Ok(Self {
                sessions,
                next: AtomicUsize::new(0),
                input_name,
                input_size,
            })
        }

        fn run(&self, session: &mut Session, input: Tensor<f32>) -> Result<f32, ScoreError> {
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input])
                .map_err(backend)?;
            let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(backend)?;
            if data.is_empty() {
                return Err(backend("extractor produced an empty output"));
            }
            Ok(mean_abs(data))
        }
    }

    impl FeatureScorer for OnnxScorer {
        fn score(&self, patch: &Patch) -> Result<f32, ScoreError> {
            check_input(patch, self.input_size)?;
            let input = Tensor::from_array(normalized_tensor(patch)).map_err(backend)?;

            // take the first idle session, starting from a rotating offset
            let n = self.sessions.len();
            let start = self.next.fetch_add(1, Ordering::Relaxed) % n;
            for i in 0..n {
                match self.sessions[(start + i) % n].try_lock() {
                    Ok(mut session) => return self.run(&mut session, input),
                    Err(TryLockError::WouldBlock) => continue,
                    Err(TryLockError::Poisoned(_)) => return Err(backend("session lock poisoned")),
                }
            }
            let mut session = self.sessions[start]
                .lock()
                .map_err(|_| backend("session lock poisoned"))?;
            self.run(&mut session, input)
        }

        fn input_size(&self) -> u32 {
            self.input_size
        }
    }
}
