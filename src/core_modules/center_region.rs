// THEORY:
// The `CenterRegion` is a small window of pixels (about 20x20) sitting at a grid
// cell's lattice point. It is the unit of colour and texture analysis: the heuristic
// classifier never looks at single pixels or at whole patches, only at the summary
// statistics of this window.
//
// Key architectural principles:
// 1.  **Spatial Pooling**: The window's channel means cancel single-pixel sensor
//     noise, so the colour tests react to the region's dominant light, not to one
//     hot pixel.
// 2.  **Texture by Spread**: The standard deviation of per-pixel gray levels is the
//     texture signal. Point-source city lights produce sharp local contrast; cloud
//     decks are diffuse.
// 3.  **Data Container**: Like `Pixel`, the region is "dumb". It holds its pixels and
//     knows how to summarize them. It does not know what a cloud is.
//
// The window is the half-open range `[c - r, c + r)` on each axis, clamped to the
// image. Near the top/left edges it shrinks rather than being padded.

use crate::core_modules::pixel::pixel::Pixel;
use image::RgbImage;

/// Per-channel means on the 0..255 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

/// A rectangular block of pixels centred on a grid cell's lattice point.
#[derive(Debug, Clone)]
pub struct CenterRegion {
    /// The width of the region in pixels (after clamping).
    pub width: u32,
    /// The height of the region in pixels (after clamping).
    pub height: u32,
    /// Row-major pixels of the region.
    pub pixels: Vec<Pixel>,
}

impl CenterRegion {
    pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Cuts the window `[cx - radius, cx + radius) x [cy - radius, cy + radius)` out of
    /// `image`. Returns `None` if the clamped window is empty.
    pub fn around(image: &RgbImage, cx: u32, cy: u32, radius: u32) -> Option<Self> {
        let (w, h) = image.dimensions();
        let x1 = cx.saturating_sub(radius);
        let y1 = cy.saturating_sub(radius);
        let x2 = cx.saturating_add(radius).min(w);
        let y2 = cy.saturating_add(radius).min(h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let width = x2 - x1;
        let height = y2 - y1;
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in y1..y2 {
            for x in x1..x2 {
                pixels.push(Pixel::from(image.get_pixel(x, y)));
            }
        }
        Some(Self::new(width, height, pixels))
    }

    /// Calculates the mean of each colour channel over the region.
    pub fn channel_means(&self) -> ChannelMeans {
        let num_pixels = self.pixels.len();
        if num_pixels == 0 {
            return ChannelMeans {
                red: 0.0,
                green: 0.0,
                blue: 0.0,
            };
        }

        let mut sum_r = 0u64;
        let mut sum_g = 0u64;
        let mut sum_b = 0u64;
        for pixel in &self.pixels {
            sum_r += pixel.red as u64;
            sum_g += pixel.green as u64;
            sum_b += pixel.blue as u64;
        }

        let n = num_pixels as f64;
        ChannelMeans {
            red: sum_r as f64 / n,
            green: sum_g as f64 / n,
            blue: sum_b as f64 / n,
        }
    }

    /// Mean of all channels of all pixels, normalized to [0, 1].
    pub fn brightness(&self) -> f64 {
        let means = self.channel_means();
        (means.red + means.green + means.blue) / 3.0 / 255.0
    }

    /// Population standard deviation of the per-pixel gray level (0..255 scale).
    pub fn gray_std_dev(&self) -> f64 {
        let count = self.pixels.len() as f64;
        if count < 1.0 {
            return 0.0;
        }
        let mean = self.pixels.iter().map(Pixel::gray).sum::<f64>() / count;
        let variance = self
            .pixels
            .iter()
            .map(|p| (p.gray() - mean).powi(2))
            .sum::<f64>()
            / count;
        variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn window_is_half_open_and_clamped() {
        let img = RgbImage::from_pixel(50, 50, Rgb([10, 20, 30]));

        let inner = CenterRegion::around(&img, 25, 25, 10).unwrap();
        assert_eq!((inner.width, inner.height), (20, 20));

        let corner = CenterRegion::around(&img, 0, 0, 10).unwrap();
        assert_eq!((corner.width, corner.height), (10, 10));

        let edge = CenterRegion::around(&img, 45, 45, 10).unwrap();
        assert_eq!((edge.width, edge.height), (15, 15));
    }

    #[test]
    fn zero_radius_is_empty() {
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        assert!(CenterRegion::around(&img, 4, 4, 0).is_none());
    }

    #[test]
    fn uniform_region_has_no_texture() {
        let img = RgbImage::from_pixel(30, 30, Rgb([200, 200, 220]));
        let region = CenterRegion::around(&img, 15, 15, 10).unwrap();
        let means = region.channel_means();
        assert_eq!((means.red, means.green, means.blue), (200.0, 200.0, 220.0));
        assert_eq!(region.gray_std_dev(), 0.0);
        assert!((region.brightness() - 620.0 / 3.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn checkerboard_has_large_spread() {
        let img = RgbImage::from_fn(20, 20, |x, y| {
            if (x + y) % 2 == 0 { Rgb([255, 165, 0]) } else { Rgb([0, 0, 0]) }
        });
        let region = CenterRegion::around(&img, 10, 10, 10).unwrap();
        // gray levels are 140 and 0 in equal measure
        assert!((region.gray_std_dev() - 70.0).abs() < 1e-9);
    }
}
