use image::RgbaImage;

use crate::models::{ElementHint, HintKind};

#[derive(Debug, Clone, Copy)]
pub struct RegionConfig {
    /// Edge of a grid cell in pixels.
    pub cell_size: u32,
    /// Pixel stride used when averaging a cell.
    pub sample_stride: u32,
    /// A colour needs at least this many cells before it becomes a hint.
    pub min_cells: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            cell_size: 16,
            sample_stride: 4,
            min_cells: 6,
        }
    }
}

const KINDS: [HintKind; 3] = [
    HintKind::ErrorRegion,
    HintKind::WarningRegion,
    HintKind::SuccessRegion,
];

fn classify(r: u32, g: u32, b: u32) -> Option<HintKind> {
    if r > 180 && g < 90 && b < 90 {
        Some(HintKind::ErrorRegion)
    } else if r > 200 && (140..210).contains(&g) && b < 80 {
        Some(HintKind::WarningRegion)
    } else if g > 150 && r < 110 && b < 120 {
        Some(HintKind::SuccessRegion)
    } else {
        None
    }
}

#[derive(Default)]
struct Accumulator {
    cells: usize,
    min_col: u32,
    min_row: u32,
    max_col: u32,
    max_row: u32,
}

impl Accumulator {
    fn add(&mut self, col: u32, row: u32) {
        if self.cells == 0 {
            (self.min_col, self.min_row, self.max_col, self.max_row) = (col, row, col, row);
        } else {
            self.min_col = self.min_col.min(col);
            self.min_row = self.min_row.min(row);
            self.max_col = self.max_col.max(col);
            self.max_row = self.max_row.max(row);
        }
        self.cells += 1;
    }
}

/// Averages the frame on a coarse grid and reports the bounding box of each
/// red, amber or green cluster. Useful as a hint only: it cannot tell an error
/// banner from a red logo.
pub fn detect_color_regions(image: &RgbaImage, config: &RegionConfig) -> Vec<ElementHint> {
    let (width, height) = image.dimensions();
    let cell = config.cell_size.max(1);
    let stride = config.sample_stride.max(1);
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let cols = width.div_ceil(cell);
    let rows = height.div_ceil(cell);
    let mut found: [Accumulator; 3] = Default::default();

    for row in 0..rows {
        for col in 0..cols {
            let (x0, y0) = (col * cell, row * cell);
            let x1 = x0.saturating_add(cell).min(width);
            let y1 = y0.saturating_add(cell).min(height);
            // u64 sums: a whole-screen cell sampled at stride 1 overflows u32.
            let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
            for y in (y0..y1).step_by(stride as usize) {
                for x in (x0..x1).step_by(stride as usize) {
                    let px = image.get_pixel(x, y).0;
                    r += u64::from(px[0]);
                    g += u64::from(px[1]);
                    b += u64::from(px[2]);
                    n += 1;
                }
            }
            if n == 0 {
                continue;
            }
            let mean = |sum: u64| (sum / n) as u32;
            if let Some(kind) = classify(mean(r), mean(g), mean(b)) {
                if let Some(index) = KINDS.iter().position(|k| *k == kind) {
                    found[index].add(col, row);
                }
            }
        }
    }

    let total = (cols * rows) as f32;
    KINDS
        .iter()
        .zip(found.iter())
        .filter(|(_, acc)| acc.cells >= config.min_cells.max(1))
        .map(|(kind, acc)| {
            let x = acc.min_col * cell;
            let y = acc.min_row * cell;
            ElementHint {
                kind: *kind,
                x,
                y,
                width: (acc.max_col + 1).saturating_mul(cell).min(width) - x,
                height: (acc.max_row + 1).saturating_mul(cell).min(height) - y,
                coverage: acc.cells as f32 / total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn finds_a_red_banner() {
        let image = RgbaImage::from_fn(160, 96, |_, y| {
            if (32..64).contains(&y) {
                Rgba([200, 40, 40, 255])
            } else {
                Rgba([30, 30, 30, 255])
            }
        });
        let hints = detect_color_regions(&image, &RegionConfig::default());
        assert_eq!(hints.len(), 1);
        let hint = &hints[0];
        assert_eq!(hint.kind, HintKind::ErrorRegion);
        assert_eq!((hint.x, hint.y, hint.width, hint.height), (0, 32, 160, 32));
        assert!((hint.coverage - 20.0 / 60.0).abs() < 1e-4);
    }

    #[test]
    fn tiny_specks_are_ignored() {
        let image = RgbaImage::from_fn(160, 96, |x, y| {
            if x < 16 && y < 16 {
                Rgba([40, 200, 60, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        assert!(detect_color_regions(&image, &RegionConfig::default()).is_empty());
    }

    #[test]
    fn reports_each_colour_separately() {
        let image = RgbaImage::from_fn(128, 128, |_, y| match y {
            0..=31 => Rgba([230, 180, 20, 255]),
            32..=63 => Rgba([40, 190, 70, 255]),
            _ => Rgba([255, 255, 255, 255]),
        });
        let kinds: Vec<HintKind> = detect_color_regions(&image, &RegionConfig::default())
            .into_iter()
            .map(|h| h.kind)
            .collect();
        assert_eq!(kinds, vec![HintKind::WarningRegion, HintKind::SuccessRegion]);
    }

    #[test]
    fn one_cell_covering_a_large_frame_is_averaged() {
        // 4200x4200 saturated red sums past u32::MAX in the red channel.
        let image = RgbaImage::from_pixel(4200, 4200, Rgba([255, 20, 20, 255]));
        let config = RegionConfig {
            cell_size: 4200,
            sample_stride: 1,
            min_cells: 1,
        };
        let hints = detect_color_regions(&image, &config);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].kind, HintKind::ErrorRegion);
        assert_eq!((hints[0].width, hints[0].height), (4200, 4200));
    }

    #[test]
    fn empty_frame_has_no_hints() {
        assert!(detect_color_regions(&RgbaImage::new(0, 0), &RegionConfig::default()).is_empty());
    }
}
