// THEORY:
// The patch sampler walks the strip on a regular lattice and, for every lattice
// point, cuts out the neighbourhood the feature extractor will look at. It is the
// bridge between the raw strip and the per-cell analysis: everything downstream
// (heuristics, scoring, splatting) is keyed by the `GridCell` produced here.
//
// Key architectural principles:
// 1.  **Lattice, not tiles**: Cells sit at `(0, g, 2g, ...)` on both axes. The
//     lattice point is the centre of the patch and of the colour window, and the
//     top-left corner of the cell's footprint in the probability map.
// 2.  **Clamp, never pad**: A patch near the border is the square window clamped to
//     the image, so edge crops are smaller. They are then resized like any other.
// 3.  **Degenerate cells are skipped**: A crop with zero area produces no patch and
//     contributes nothing to the map (its footprint stays unset, not zero).
// 4.  **Pure**: Output depends only on the image and lattice parameters.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// One lattice point of the sampling grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub cx: u32,
    pub cy: u32,
}

/// A resized crop around a `GridCell`, ready for the feature extractor.
#[derive(Debug, Clone)]
pub struct Patch {
    pub cell: GridCell,
    pub pixels: RgbImage,
}

impl Patch {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Lattice parameters for patch extraction.
#[derive(Debug, Clone, Copy)]
pub struct PatchSampler {
    /// Spacing between lattice points in pixels.
    pub grid_size: u32,
    /// Side of the square crop window before resizing.
    pub patch_size: u32,
    /// Side of the square the crop is resized to (the extractor's input size).
    pub input_size: u32,
}

impl PatchSampler {
    pub fn new(grid_size: u32, patch_size: u32, input_size: u32) -> Self {
        Self {
            grid_size,
            patch_size,
            input_size,
        }
    }

    /// All lattice points for an image of the given size, row-major.
    pub fn lattice(&self, width: u32, height: u32) -> Vec<GridCell> {
        let step = self.grid_size.max(1) as usize;
        let mut cells = Vec::new();
        for cy in (0..height).step_by(step) {
            for cx in (0..width).step_by(step) {
                cells.push(GridCell { cx, cy });
            }
        }
        cells
    }

    /// Lattice points grouped by row. Rows are the unit of work for the worker pool.
    pub fn lattice_rows(&self, width: u32, height: u32) -> Vec<Vec<GridCell>> {
        let step = self.grid_size.max(1) as usize;
        (0..height)
            .step_by(step)
            .map(|cy| (0..width).step_by(step).map(|cx| GridCell { cx, cy }).collect())
            .collect()
    }

    /// The clamped crop window `(x, y, width, height)` for a cell, or `None` if empty.
    pub fn crop_window(&self, width: u32, height: u32, cell: GridCell) -> Option<(u32, u32, u32, u32)> {
        let half = self.patch_size / 2;
        let x1 = cell.cx.saturating_sub(half);
        let y1 = cell.cy.saturating_sub(half);
        let x2 = cell.cx.saturating_add(half).min(width);
        let y2 = cell.cy.saturating_add(half).min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }

    /// Extracts and resizes the patch for one cell.
    pub fn extract(&self, image: &RgbImage, cell: GridCell) -> Option<Patch> {
        let (w, h) = image.dimensions();
        let (x, y, cw, ch) = self.crop_window(w, h, cell)?;
        let crop = imageops::crop_imm(image, x, y, cw, ch).to_image();
        let pixels = imageops::resize(&crop, self.input_size, self.input_size, FilterType::Lanczos3);
        Some(Patch { cell, pixels })
    }

    /// Every non-degenerate patch of the image, in lattice order.
    pub fn sample(&self, image: &RgbImage) -> Vec<Patch> {
        let (w, h) = image.dimensions();
        self.lattice(w, h)
            .into_iter()
            .filter_map(|cell| self.extract(image, cell))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn lattice_covers_image_from_origin() {
        let sampler = PatchSampler::new(20, 64, 32);
        let cells = sampler.lattice(50, 30);
        let xs: Vec<u32> = cells.iter().filter(|c| c.cy == 0).map(|c| c.cx).collect();
        assert_eq!(xs, vec![0, 20, 40]);
        assert_eq!(cells.len(), 3 * 2);
        assert_eq!(cells[0], GridCell { cx: 0, cy: 0 });
        assert_eq!(*cells.last().unwrap(), GridCell { cx: 40, cy: 20 });
    }

    #[test]
    fn rows_match_flat_lattice() {
        let sampler = PatchSampler::new(7, 10, 8);
        let flat = sampler.lattice(30, 22);
        let rows: Vec<GridCell> = sampler.lattice_rows(30, 22).into_iter().flatten().collect();
        assert_eq!(flat, rows);
    }

    #[test]
    fn edge_crops_are_clamped_not_padded() {
        let sampler = PatchSampler::new(20, 64, 32);
        assert_eq!(sampler.crop_window(100, 100, GridCell { cx: 0, cy: 0 }), Some((0, 0, 32, 32)));
        assert_eq!(sampler.crop_window(100, 100, GridCell { cx: 50, cy: 50 }), Some((18, 18, 64, 64)));
        assert_eq!(sampler.crop_window(100, 100, GridCell { cx: 80, cy: 90 }), Some((48, 58, 52, 42)));
    }

    #[test]
    fn unit_patch_size_degenerates() {
        let sampler = PatchSampler::new(5, 1, 16);
        let img = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        assert!(sampler.extract(&img, GridCell { cx: 5, cy: 5 }).is_none());
        assert!(sampler.sample(&img).is_empty());
    }

    #[test]
    fn patches_are_resized_to_input_size() {
        let sampler = PatchSampler::new(10, 16, 24);
        let img = RgbImage::from_pixel(30, 30, Rgb([90, 90, 90]));
        let patches = sampler.sample(&img);
        assert_eq!(patches.len(), 9);
        for patch in &patches {
            assert_eq!((patch.width(), patch.height()), (24, 24));
        }
        // a flat crop stays flat through the filter
        assert_eq!(patches[4].pixels.get_pixel(12, 12), &Rgb([90, 90, 90]));
    }
}
