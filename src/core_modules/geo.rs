// THEORY:
// The strip is an export of a Web-Mercator (EPSG:3857 / ESRI 102100) bounding box
// at a fixed pixel size, so strip pixels and map metres are related by a plain
// affine mapping. This module holds that mapping in both directions plus the
// lat/lon entry point used when border crossings are converted to pixels, and
// derives the bounding box of the high-resolution capture for a selected crossing.
//
// The capture step maps pixel rows back to northing with a 0.95 compression factor.
// The border strip is exported with a slight vertical squash, and the capture
// geometry has always compensated for it; the factor is configurable.

use crate::core_modules::point_evaluator::PixelPoint;
use crate::error::{CumulusError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Half the Web-Mercator world width in metres.
const MERCATOR_HALF_WORLD: f64 = 20037508.34;

/// Geometry of the strip export and of the follow-up captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// `[west, north, east, south]` in Web-Mercator metres.
    pub bbox: [f64; 4],
    pub image_width: u32,
    pub image_height: u32,
    /// Capture width is the strip width divided by this.
    pub zoom: f64,
    pub capture_width: u32,
    pub capture_height: u32,
    pub latitude_compression: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            bbox: [-13041000.0, 3871000.0, -10845000.0, 2961000.0],
            image_width: 1000,
            image_height: 500,
            zoom: 8.0,
            capture_width: 240,
            capture_height: 400,
            latitude_compression: 0.95,
        }
    }
}

/// `[min_x, min_y, max_x, max_y]` in Web-Mercator metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MercatorBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl MercatorBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

pub fn lat_lon_to_web_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let x = lon * MERCATOR_HALF_WORLD / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
    (x, y * MERCATOR_HALF_WORLD / 180.0)
}

impl GeoConfig {
    /// Rejects geometry that would divide by zero or yield non-finite
    /// coordinates in the pixel and capture mappings.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CumulusError::InvalidConfig(msg));
        if self.bbox.iter().any(|v| !v.is_finite()) {
            return invalid(format!("geo.bbox must hold finite coordinates, got {:?}", self.bbox));
        }
        if self.west() == self.east() || self.north() == self.south() {
            return invalid(format!("geo.bbox must span a non-zero area, got {:?}", self.bbox));
        }
        if self.image_width == 0 || self.image_height == 0 {
            return invalid(format!("geo image size must be non-zero, got {}x{}", self.image_width, self.image_height));
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return invalid(format!(
                "geo capture size must be non-zero, got {}x{}",
                self.capture_width, self.capture_height
            ));
        }
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            return invalid(format!("geo.zoom must be a positive number, got {}", self.zoom));
        }
        if !(self.latitude_compression.is_finite() && self.latitude_compression > 0.0) {
            return invalid(format!(
                "geo.latitude_compression must be a positive number, got {}",
                self.latitude_compression
            ));
        }
        Ok(())
    }

    fn west(&self) -> f64 {
        self.bbox[0]
    }

    fn north(&self) -> f64 {
        self.bbox[1]
    }

    fn east(&self) -> f64 {
        self.bbox[2]
    }

    fn south(&self) -> f64 {
        self.bbox[3]
    }

    /// Maps Web-Mercator metres to a strip pixel, truncating and clamping to the strip.
    pub fn web_mercator_to_pixel(&self, x: f64, y: f64) -> PixelPoint {
        let px = ((x - self.west()) / (self.east() - self.west()) * self.image_width as f64) as i64;
        let py = ((self.north() - y) / (self.north() - self.south()) * self.image_height as f64) as i64;
        PixelPoint {
            x: px.clamp(0, self.image_width.saturating_sub(1) as i64) as u32,
            y: py.clamp(0, self.image_height.saturating_sub(1) as i64) as u32,
        }
    }

    pub fn lat_lon_to_pixel(&self, lat: f64, lon: f64) -> PixelPoint {
        let (x, y) = lat_lon_to_web_mercator(lat, lon);
        self.web_mercator_to_pixel(x, y)
    }

    /// Maps a strip pixel back to Web-Mercator metres (with latitude compression).
    pub fn pixel_to_web_mercator(&self, point: PixelPoint) -> (f64, f64) {
        let x = self.west() - (self.west() - self.east()) / self.image_width as f64 * point.x as f64;
        let y = self.north()
            - (self.north() - self.south()) / self.image_height as f64 * point.y as f64 * self.latitude_compression;
        (x, y)
    }

    /// Bounding box of the follow-up capture centred on `point`.
    pub fn capture_bbox(&self, point: PixelPoint) -> MercatorBox {
        let (cx, cy) = self.pixel_to_web_mercator(point);
        let map_w = (self.east() - self.west()).abs() / self.zoom;
        let map_h = map_w * (self.capture_height as f64 / self.capture_width as f64);
        MercatorBox {
            min_x: cx - map_w / 2.0,
            min_y: cy - map_h / 2.0,
            max_x: cx + map_w / 2.0,
            max_y: cy + map_h / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equator_and_prime_meridian_map_to_origin() {
        let (x, y) = lat_lon_to_web_mercator(0.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
        let (x, _) = lat_lon_to_web_mercator(0.0, 180.0);
        assert!((x - MERCATOR_HALF_WORLD).abs() < 1e-6);
    }

    #[test]
    fn corners_of_the_strip() {
        let geo = GeoConfig::default();
        assert_eq!(geo.web_mercator_to_pixel(-13041000.0, 3871000.0), PixelPoint { x: 0, y: 0 });
        assert_eq!(geo.web_mercator_to_pixel(-10845000.0, 2961000.0), PixelPoint { x: 999, y: 499 });
        assert_eq!(geo.web_mercator_to_pixel(-20000000.0, 0.0), PixelPoint { x: 0, y: 499 });
    }

    #[test]
    fn tijuana_lands_near_the_west_edge() {
        let geo = GeoConfig::default();
        let p = geo.lat_lon_to_pixel(32.54, -117.04);
        assert!(p.x < 60, "{p:?}");
        assert!(p.y < 150, "{p:?}");
    }

    #[test]
    fn pixel_round_trip_without_compression() {
        let geo = GeoConfig {
            latitude_compression: 1.0,
            ..GeoConfig::default()
        };
        let p = PixelPoint { x: 250, y: 100 };
        let (x, y) = geo.pixel_to_web_mercator(p);
        assert!((x - (-13041000.0 + 2196.0 * 250.0)).abs() < 1e-6);
        assert_eq!(geo.web_mercator_to_pixel(x + 1.0, y - 1.0), p);
    }

    #[test]
    fn capture_box_has_capture_aspect() {
        let geo = GeoConfig::default();
        let bbox = geo.capture_bbox(PixelPoint { x: 500, y: 250 });
        assert!((bbox.width() - 2196000.0 / 8.0).abs() < 1e-6);
        assert!((bbox.height() / bbox.width() - 400.0 / 240.0).abs() < 1e-9);
        let (cx, cy) = geo.pixel_to_web_mercator(PixelPoint { x: 500, y: 250 });
        assert!(((bbox.min_x + bbox.max_x) / 2.0 - cx).abs() < 1e-6);
        assert!(((bbox.min_y + bbox.max_y) / 2.0 - cy).abs() < 1e-6);
    }

    #[test]
    fn default_geometry_is_valid() {
        assert!(GeoConfig::default().validate().is_ok());
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let cases = [
            GeoConfig { zoom: 0.0, ..GeoConfig::default() },
            GeoConfig { zoom: -2.0, ..GeoConfig::default() },
            GeoConfig { zoom: f64::NAN, ..GeoConfig::default() },
            GeoConfig { zoom: f64::INFINITY, ..GeoConfig::default() },
            GeoConfig { latitude_compression: 0.0, ..GeoConfig::default() },
            GeoConfig { latitude_compression: f64::NAN, ..GeoConfig::default() },
            GeoConfig { image_width: 0, ..GeoConfig::default() },
            GeoConfig { image_height: 0, ..GeoConfig::default() },
            GeoConfig { capture_width: 0, ..GeoConfig::default() },
            GeoConfig { capture_height: 0, ..GeoConfig::default() },
            GeoConfig { bbox: [5.0, 10.0, 5.0, 0.0], ..GeoConfig::default() },
            GeoConfig { bbox: [0.0, 10.0, 5.0, 10.0], ..GeoConfig::default() },
            GeoConfig { bbox: [0.0, f64::NAN, 5.0, 0.0], ..GeoConfig::default() },
        ];
        for geo in cases {
            assert!(matches!(geo.validate(), Err(CumulusError::InvalidConfig(_))), "{geo:?}");
        }
    }
}
