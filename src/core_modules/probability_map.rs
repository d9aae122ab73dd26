// THEORY:
// The probability map is the heat map of the cloud engine: one float per strip
// pixel, read by the point evaluator and written to disk for diagnostics. This
// module owns the three steps that turn per-cell scalars into that raster.
//
// 1.  **Cell probability**: brightness is the primary signal (clouds are bright in
//     this band at night), damped by the extractor's activation and then corrected
//     by four multiplicative city-light penalties/boosts. All four conditions read
//     the same unadjusted brightness. The product is clamped to [0, 1].
// 2.  **Accumulation**: each cell's scalar is splatted uniformly over its footprint
//     `[cx, cx + g) x [cy, cy + g)` into a sum grid, with a parallel count grid. A
//     pixel with count 0 is *unset*: it is not a zero and it does not pull its
//     neighbours down during smoothing.
// 3.  **Smoothing**: a large separable Gaussian (31x31 by default, sigma derived
//     from the kernel size) removes hard cell edges. Unset pixels carry zero weight
//     (normalized convolution), and the image border is reflected without repeating
//     the edge pixel. On a fully covered map this is an ordinary Gaussian blur.

use crate::core_modules::heuristic::HeuristicFlags;
use image::{GrayImage, Luma};
use ndarray::Array2;

const ACTIVATION_SCALE: f64 = 10.0;
const ORANGE_PENALTY: f64 = 0.3;
const TEXTURE_PENALTY: f64 = 0.5;
const TEXTURE_MIN_BRIGHTNESS: f64 = 0.2;
const COLOR_PENALTY: f64 = 0.6;
const COLOR_MIN_BRIGHTNESS: f64 = 0.3;
const DIFFUSE_CLOUD_BOOST: f64 = 1.2;

/// Brightness damped by activation, before any colour/texture correction.
pub fn base_probability(brightness: f64, activation: f64) -> f64 {
    brightness * (1.0 - (activation / ACTIVATION_SCALE).min(1.0))
}

/// The combined penalty/boost factor for a set of flags at a given brightness.
pub fn adjustment_factor(brightness: f64, flags: HeuristicFlags) -> f64 {
    let mut factor = 1.0;
    if flags.is_orange_hue {
        factor *= ORANGE_PENALTY;
    }
    if flags.is_high_texture && brightness > TEXTURE_MIN_BRIGHTNESS {
        factor *= TEXTURE_PENALTY;
    }
    if !flags.is_cloud_colored && brightness > COLOR_MIN_BRIGHTNESS {
        factor *= COLOR_PENALTY;
    }
    if flags.is_cloud_colored && !flags.is_high_texture {
        factor *= DIFFUSE_CLOUD_BOOST;
    }
    factor
}

/// Cloud probability of one grid cell, clamped to [0, 1].
pub fn cloud_probability(brightness: f64, activation: f64, flags: HeuristicFlags) -> f64 {
    let raw = base_probability(brightness, activation) * adjustment_factor(brightness, flags);
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 1.0)
}

/// Sum and count grids that cell probabilities are splatted into.
#[derive(Debug, Clone)]
pub struct ProbabilityAccumulator {
    sum: Array2<f64>,
    count: Array2<u32>,
}

impl ProbabilityAccumulator {
    pub fn new(width: u32, height: u32) -> Self {
        let shape = (height as usize, width as usize);
        Self {
            sum: Array2::zeros(shape),
            count: Array2::zeros(shape),
        }
    }

    /// Adds `value` to every pixel of the square footprint at `(x0, y0)`, clamped.
    pub fn splat(&mut self, x0: u32, y0: u32, size: u32, value: f64) {
        let (h, w) = self.sum.dim();
        let x_end = (x0 as usize).saturating_add(size as usize).min(w);
        let y_end = (y0 as usize).saturating_add(size as usize).min(h);
        for y in y0 as usize..y_end {
            for x in x0 as usize..x_end {
                self.sum[[y, x]] += value;
                self.count[[y, x]] += 1;
            }
        }
    }

    /// Per-pixel `sum / count`; pixels never splatted stay unset.
    pub fn into_raw_map(self) -> ProbabilityMap {
        let (h, w) = self.sum.dim();
        let mut values = Array2::<f32>::zeros((h, w));
        let mut weight = Array2::<f32>::zeros((h, w));
        for ((y, x), &count) in self.count.indexed_iter() {
            if count > 0 {
                values[[y, x]] = (self.sum[[y, x]] / count as f64) as f32;
                weight[[y, x]] = 1.0;
            }
        }
        ProbabilityMap { values, weight }
    }
}

/// Normalized 1-D Gaussian taps.
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    taps: Vec<f64>,
}

impl GaussianKernel {
    /// Kernel of odd size `ksize` with the sigma OpenCV derives when sigma is 0:
    /// `0.3 * ((ksize - 1) / 2 - 1) + 0.8`.
    pub fn from_size(ksize: u32) -> Self {
        let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
        Self::with_sigma(ksize, sigma)
    }

    pub fn with_sigma(ksize: u32, sigma: f64) -> Self {
        let radius = (ksize / 2) as i64;
        let denom = 2.0 * sigma * sigma;
        let mut taps: Vec<f64> = (-radius..=radius)
            .map(|i| (-((i * i) as f64) / denom).exp())
            .collect();
        let total: f64 = taps.iter().sum();
        for t in &mut taps {
            *t /= total;
        }
        Self { taps }
    }

    pub fn radius(&self) -> usize {
        self.taps.len() / 2
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }
}

/// Mirror index without repeating the edge (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m >= n as isize { (period - m) as usize } else { m as usize }
}

/// Per-pixel cloud probability over the whole strip, indexed `[y, x]`.
///
/// `weight` is the coverage of each pixel: 0 means unset. Values of unset pixels
/// are stored as 0 but must not be read as probabilities; use `get`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    values: Array2<f32>,
    weight: Array2<f32>,
}

impl ProbabilityMap {
    pub fn width(&self) -> u32 {
        self.values.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.values.nrows() as u32
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn is_defined(&self, x: u32, y: u32) -> bool {
        self.weight
            .get([y as usize, x as usize])
            .is_some_and(|&w| w > 0.0)
    }

    /// The probability at `(x, y)`, or `None` if out of bounds or unset.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if self.is_defined(x, y) {
            Some(self.values[[y as usize, x as usize]])
        } else {
            None
        }
    }

    pub fn defined_count(&self) -> usize {
        self.weight.iter().filter(|&&w| w > 0.0).count()
    }

    /// Mean over defined pixels of the half-open window `[x - r, x + r) x [y - r, y + r)`,
    /// clamped to the map. `None` if the window holds no defined pixel.
    pub fn window_mean(&self, x: u32, y: u32, radius: u32) -> Option<f32> {
        let x1 = x.saturating_sub(radius);
        let y1 = y.saturating_sub(radius);
        let x2 = x.saturating_add(radius).min(self.width());
        let y2 = y.saturating_add(radius).min(self.height());
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for yy in y1..y2 {
            for xx in x1..x2 {
                if let Some(p) = self.get(xx, yy) {
                    sum += p as f64;
                    count += 1;
                }
            }
        }
        if count == 0 {
            None
        } else {
            Some((sum / count as f64) as f32)
        }
    }

    /// Separable Gaussian blur that ignores unset pixels.
    pub fn smooth(&self, kernel: &GaussianKernel) -> ProbabilityMap {
        let (h, w) = self.values.dim();
        if h == 0 || w == 0 {
            return self.clone();
        }
        let r = kernel.radius() as isize;
        let taps = kernel.taps();

        let masked = Array2::from_shape_fn((h, w), |(y, x)| self.values[[y, x]] as f64 * self.weight[[y, x]] as f64);
        let mask = self.weight.mapv(|v| v as f64);

        // horizontal pass
        let mut num_h = Array2::<f64>::zeros((h, w));
        let mut den_h = Array2::<f64>::zeros((h, w));
        for y in 0..h {
            for x in 0..w {
                let mut num = 0.0;
                let mut den = 0.0;
                for (k, t) in taps.iter().enumerate() {
                    let xx = reflect_101(x as isize + k as isize - r, w);
                    num += t * masked[[y, xx]];
                    den += t * mask[[y, xx]];
                }
                num_h[[y, x]] = num;
                den_h[[y, x]] = den;
            }
        }

        // vertical pass
        let mut values = Array2::<f32>::zeros((h, w));
        let mut weight = Array2::<f32>::zeros((h, w));
        for y in 0..h {
            for x in 0..w {
                let mut num = 0.0;
                let mut den = 0.0;
                for (k, t) in taps.iter().enumerate() {
                    let yy = reflect_101(y as isize + k as isize - r, h);
                    num += t * num_h[[yy, x]];
                    den += t * den_h[[yy, x]];
                }
                if den > 1e-12 {
                    values[[y, x]] = (num / den).clamp(0.0, 1.0) as f32;
                    weight[[y, x]] = den as f32;
                }
            }
        }

        ProbabilityMap { values, weight }
    }

    /// Grayscale rendering (`p * 255`); unset pixels are black.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let p = self.get(x, y).unwrap_or(0.0);
            Luma([(p * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Binary mask: 255 where the probability exceeds `threshold`.
    pub fn to_mask(&self, threshold: f32) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| match self.get(x, y) {
            Some(p) if p > threshold => Luma([255u8]),
            _ => Luma([0u8]),
        })
    }
}
