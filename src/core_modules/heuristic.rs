// THEORY:
// The heuristic classifier tells city lights apart from cloud texture using nothing
// but the colour and spread of a `CenterRegion`. It emits three independent flags,
// not a class label: the synthesizer folds them into the probability as
// multiplicative penalties and boosts, so no single threshold here decides anything
// on its own.
//
// - Orange hue: sodium and incandescent lighting is warm and saturated, red well
//   above green and far above blue.
// - High texture: point lights create sharp local contrast inside the window.
// - Cloud colour: clouds reflect across the spectrum, keeping blue high relative
//   to red.
//
// Thresholds are empirically tuned and kept exactly as deployed.

use crate::core_modules::center_region::{CenterRegion, ChannelMeans};

const ORANGE_RED_OVER_GREEN: f64 = 1.1;
const ORANGE_RED_OVER_BLUE: f64 = 1.3;
const HIGH_TEXTURE_STD_DEV: f64 = 40.0;
const CLOUD_BLUE_RATIO: f64 = 0.8;

/// The three colour/texture flags for one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeuristicFlags {
    pub is_orange_hue: bool,
    pub is_high_texture: bool,
    pub is_cloud_colored: bool,
}

/// Classifies a region from its raw statistics.
pub fn classify_stats(means: ChannelMeans, local_variance: f64) -> HeuristicFlags {
    let is_orange_hue = means.red > means.green * ORANGE_RED_OVER_GREEN
        && means.red > means.blue * ORANGE_RED_OVER_BLUE;
    let is_high_texture = local_variance > HIGH_TEXTURE_STD_DEV;
    let blue_ratio = means.blue / (means.red + 1.0);
    let is_cloud_colored = blue_ratio > CLOUD_BLUE_RATIO;

    HeuristicFlags {
        is_orange_hue,
        is_high_texture,
        is_cloud_colored,
    }
}

pub fn classify(region: &CenterRegion) -> HeuristicFlags {
    classify_stats(region.channel_means(), region.gray_std_dev())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn region_of(img: &RgbImage) -> CenterRegion {
        let (w, h) = img.dimensions();
        CenterRegion::around(img, w / 2, h / 2, 10).unwrap()
    }

    #[test]
    fn blue_gray_deck_is_cloud_colored() {
        let img = RgbImage::from_pixel(20, 20, Rgb([200, 200, 220]));
        let flags = classify(&region_of(&img));
        assert_eq!(
            flags,
            HeuristicFlags {
                is_orange_hue: false,
                is_high_texture: false,
                is_cloud_colored: true,
            }
        );
    }

    #[test]
    fn sparse_orange_lights_are_orange_and_textured() {
        let img = RgbImage::from_fn(20, 20, |x, y| {
            if (x + y) % 2 == 0 { Rgb([255, 165, 0]) } else { Rgb([0, 0, 0]) }
        });
        let flags = classify(&region_of(&img));
        assert!(flags.is_orange_hue);
        assert!(flags.is_high_texture);
        assert!(!flags.is_cloud_colored);
    }

    #[test]
    fn thresholds_are_strict() {
        // exactly on the texture threshold is not "high"
        let flags = classify_stats(
            ChannelMeans {
                red: 99.0,
                green: 99.0,
                blue: 80.0,
            },
            40.0,
        );
        assert!(!flags.is_high_texture);
        // 80 / 100 == 0.8 exactly, which is not above the ratio
        assert!(!flags.is_cloud_colored);
    }

    #[test]
    fn black_region_is_not_orange() {
        let flags = classify_stats(
            ChannelMeans {
                red: 0.0,
                green: 0.0,
                blue: 0.0,
            },
            0.0,
        );
        assert!(!flags.is_orange_hue);
        assert!(!flags.is_cloud_colored);
    }
}
