// Raster I/O and diagnostic rendering: loading the strip, writing the probability
// map and mask as PNG, and drawing the overlay operators look at.

pub mod image_helper {
    use crate::core_modules::crossing_selector::Selection;
    use crate::core_modules::point_evaluator::{PixelPoint, Verdict};
    use crate::core_modules::probability_map::ProbabilityMap;
    use crate::error::{CumulusError, Result};
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, GrayImage, ImageEncoder, Rgb, RgbImage};
    use std::path::Path;

    const MASK_TINT: Rgb<u8> = Rgb([255, 0, 255]);
    const MASK_ALPHA: f32 = 0.35;
    const CLOUD_MARK: Rgb<u8> = Rgb([0, 0, 255]);
    const CLEAR_MARK: Rgb<u8> = Rgb([0, 255, 0]);
    const SELECTED_MARK: Rgb<u8> = Rgb([255, 0, 0]);
    const RING: Rgb<u8> = Rgb([255, 255, 255]);

    /// Opens and decodes the strip as RGB. Zero-area images are rejected.
    pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage> {
        let image = image::open(path)?.into_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(CumulusError::EmptyImage);
        }
        Ok(image)
    }

    pub fn save_gray(path: impl AsRef<Path>, image: &GrayImage) -> Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = PngEncoder::new(output);
        encoder.write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::L8)?;
        Ok(())
    }

    pub fn save_rgb(path: impl AsRef<Path>, image: &RgbImage) -> Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = PngEncoder::new(output);
        encoder.write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)?;
        Ok(())
    }

    pub fn save_probability_map(path: impl AsRef<Path>, map: &ProbabilityMap) -> Result<()> {
        save_gray(path, &map.to_gray_image())
    }

    pub fn save_mask(path: impl AsRef<Path>, map: &ProbabilityMap, threshold: f32) -> Result<()> {
        save_gray(path, &map.to_mask(threshold))
    }

    fn blend(base: Rgb<u8>, tint: Rgb<u8>, alpha: f32) -> Rgb<u8> {
        let mix = |a: u8, b: u8| (a as f32 * (1.0 - alpha) + b as f32 * alpha).round().clamp(0.0, 255.0) as u8;
        Rgb([mix(base[0], tint[0]), mix(base[1], tint[1]), mix(base[2], tint[2])])
    }

    /// Paints a disk (filled) or a one-pixel ring of `radius` around `center`.
    fn draw_circle(image: &mut RgbImage, center: PixelPoint, radius: i64, color: Rgb<u8>, filled: bool) {
        let (w, h) = (image.width() as i64, image.height() as i64);
        let (cx, cy) = (center.x as i64, center.y as i64);
        let outer = radius * radius;
        let inner = (radius - 1) * (radius - 1);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let d2 = dx * dx + dy * dy;
                let inside = if filled { d2 <= outer } else { d2 <= outer && d2 > inner };
                let (x, y) = (cx + dx, cy + dy);
                if inside && x >= 0 && y >= 0 && x < w && y < h {
                    image.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }

    /// Strip with the cloud mask tinted in, every crossing marked, and picks ringed.
    pub fn render_overlay(
        strip: &RgbImage,
        map: &ProbabilityMap,
        verdicts: &[Verdict],
        selection: &Selection,
        threshold: f32,
    ) -> RgbImage {
        let mut overlay = strip.clone();
        for (x, y, pixel) in overlay.enumerate_pixels_mut() {
            if map.get(x, y).is_some_and(|p| p > threshold) {
                *pixel = blend(*pixel, MASK_TINT, MASK_ALPHA);
            }
        }

        for verdict in verdicts {
            let color = if verdict.is_cloud { CLOUD_MARK } else { CLEAR_MARK };
            draw_circle(&mut overlay, verdict.point, 5, color, true);
            draw_circle(&mut overlay, verdict.point, 6, RING, false);
        }
        for crossing in &selection.crossings {
            draw_circle(&mut overlay, crossing.verdict.point, 8, SELECTED_MARK, false);
        }
        overlay
    }
}

#[cfg(test)]
mod tests {
    use super::image_helper::*;
    use crate::core_modules::crossing_selector::CrossingSelector;
    use crate::core_modules::point_evaluator::{PixelPoint, Verdict};
    use crate::core_modules::probability_map::ProbabilityAccumulator;
    use image::{Rgb, RgbImage};

    fn map() -> crate::core_modules::probability_map::ProbabilityMap {
        let mut acc = ProbabilityAccumulator::new(40, 40);
        acc.splat(0, 0, 20, 0.9);
        acc.splat(20, 0, 20, 0.1);
        acc.into_raw_map()
    }

    #[test]
    fn overlay_tints_mask_and_marks_points() {
        let strip = RgbImage::from_pixel(40, 40, Rgb([100, 100, 100]));
        let verdicts = vec![
            Verdict {
                index: 0,
                point: PixelPoint { x: 10, y: 10 },
                probability: 0.9,
                is_cloud: true,
            },
            Verdict {
                index: 1,
                point: PixelPoint { x: 30, y: 30 },
                probability: 0.1,
                is_cloud: false,
            },
        ];
        let selection = CrossingSelector::new(9, 50.0).select(&verdicts);
        let overlay = render_overlay(&strip, &map(), &verdicts, &selection, 0.25);

        assert_eq!(overlay.get_pixel(10, 10), &Rgb([0, 0, 255]));
        assert_eq!(overlay.get_pixel(30, 30), &Rgb([0, 255, 0]));
        // unset, left untouched
        assert_eq!(overlay.get_pixel(1, 38), &Rgb([100, 100, 100]));
        assert_eq!(overlay.get_pixel(1, 1), &Rgb([154, 65, 154]));
        // outer ring of the selected crossing
        assert_eq!(overlay.get_pixel(18, 10), &Rgb([255, 0, 0]));
    }

    #[test]
    fn writes_and_reloads_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let mask_path = dir.path().join("mask.png");
        let prob_path = dir.path().join("probability.png");
        save_mask(&mask_path, &map(), 0.25).unwrap();
        save_probability_map(&prob_path, &map()).unwrap();

        let mask = image::open(&mask_path).unwrap().into_luma8();
        assert_eq!(mask.dimensions(), (40, 40));
        assert_eq!(mask.get_pixel(5, 5)[0], 255);
        assert_eq!(mask.get_pixel(25, 5)[0], 0);

        let reloaded = load_rgb(&prob_path).unwrap();
        assert_eq!(reloaded.dimensions(), (40, 40));
    }

    #[test]
    fn missing_strip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rgb(dir.path().join("nope.png")).is_err());
    }
}
