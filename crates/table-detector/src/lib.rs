//! Ruled-table detection for scanned land-record pages
//!
//! Registry forms print their values inside ruled grids. The detector
//! isolates the ruling lines and turns the enclosed regions into cells:
//! 1. Invert and binarize the page so ink becomes foreground
//! 2. Keep long horizontal strokes (opening with a `width/40` line kernel)
//! 3. Keep long vertical strokes (opening with a `height/40` line kernel)
//! 4. Merge both line maps and re-binarize
//! 5. Trace outer and hole contours of the merged grid
//! 6. Filter candidate boxes and order them in reading order
//! 7. Crop each cell and draw an annotated preview

use image::{imageops, DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use landrec_common::levels::{binarize, binarize_otsu, histogram, otsu_threshold};
use landrec_common::{BoundingBox, CellData, CellId, TableStructure};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for table detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDetectorConfig {
    /// Line kernel length is the page dimension divided by this
    pub kernel_divisor: u32,
    /// Candidates with a smaller area are treated as noise
    pub min_cell_area: u64,
    /// Candidates narrower or shorter than this are treated as noise
    pub min_cell_side: u32,
    /// Candidates covering more than this fraction of the page are rejected
    pub max_page_fraction: f64,
    /// Cells whose top edges differ by at most this many pixels share a row
    pub row_tolerance: u32,
    /// Drop candidates that enclose other candidates (table outlines)
    pub drop_containers: bool,
    /// Render the annotated preview image
    pub draw_preview: bool,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            kernel_divisor: 40,
            min_cell_area: 150,
            min_cell_side: 6,
            max_page_fraction: 0.9,
            row_tolerance: 20,
            drop_containers: true,
            draw_preview: true,
        }
    }
}

/// Morphological table detector
#[derive(Debug, Clone, Default)]
pub struct TableDetector {
    config: TableDetectorConfig,
}

impl TableDetector {
    #[must_use]
    pub fn new(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TableDetectorConfig {
        &self.config
    }

    /// Detect a ruled table on a grayscale or binarized page.
    ///
    /// Returns `None` when no cell survives filtering.
    #[must_use]
    pub fn detect(&self, page: &GrayImage) -> Option<TableStructure> {
        let (width, height) = page.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let grid = self.line_map(page);
        let boxes = self.candidate_boxes(&grid);
        if boxes.is_empty() {
            debug!("No table cells found on {}x{} page", width, height);
            return None;
        }

        let rows = order_boxes(boxes, self.config.row_tolerance);
        let regular = rows.iter().all(|r| r.len() == rows[0].len());

        let mut table = TableStructure::new();
        let mut next_id: CellId = 1;
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, bbox) in row.iter().enumerate() {
                let crop =
                    imageops::crop_imm(page, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
                let mut cell = CellData::new(next_id, *bbox, crop);
                if regular {
                    cell.row = Some(row_idx as u32);
                    cell.col = Some(col_idx as u32);
                }
                table.push(cell);
                next_id += 1;
            }
        }

        if regular {
            table.rows = Some(rows.len() as u32);
            table.cols = Some(rows[0].len() as u32);
        }
        if self.config.draw_preview {
            table.preview = Some(draw_preview(page, table.cells().map(|c| c.bbox)));
        }

        debug!(
            "Detected {} cells in {} rows (regular grid: {})",
            table.len(),
            rows.len(),
            regular
        );
        Some(table)
    }

    /// Merged horizontal and vertical ruling lines as a binary image
    #[must_use]
    pub fn line_map(&self, page: &GrayImage) -> GrayImage {
        let (width, height) = page.dimensions();
        let mut inverted = page.clone();
        imageops::invert(&mut inverted);
        let (ink, _) = binarize_otsu(&inverted);

        let divisor = self.config.kernel_divisor.max(1);
        let horizontal = keep_horizontal_runs(&ink, (width / divisor).max(1));
        let vertical = keep_vertical_runs(&ink, (height / divisor).max(1));

        let mut merged = horizontal;
        for (m, v) in merged.iter_mut().zip(vertical.iter()) {
            *m = (*m).max(*v);
        }
        let level = otsu_threshold(&histogram(&merged));
        binarize(&merged, level)
    }

    fn candidate_boxes(&self, grid: &GrayImage) -> Vec<BoundingBox> {
        let (width, height) = grid.dimensions();
        let page_area = f64::from(width) * f64::from(height);
        let max_area = page_area * self.config.max_page_fraction;

        let contours: Vec<Contour<i32>> = find_contours(grid);
        let mut boxes: Vec<BoundingBox> = contours
            .iter()
            .filter_map(|c| contour_bounds(c, width, height))
            .filter(|b| {
                b.area() > self.config.min_cell_area
                    && b.width >= self.config.min_cell_side
                    && b.height >= self.config.min_cell_side
                    && (b.area() as f64) < max_area
            })
            .collect();

        boxes.sort_by_key(|b| (b.y, b.x, b.width, b.height));
        boxes.dedup();

        if self.config.drop_containers {
            let all = boxes.clone();
            boxes.retain(|outer| !all.iter().any(|inner| inner != outer && outer.contains(inner)));
        }
        boxes
    }
}

/// Bounding box of a contour, clamped to the image
fn contour_bounds(contour: &Contour<i32>, width: u32, height: u32) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let x = min_x.max(0) as u32;
    let y = min_y.max(0) as u32;
    let right = (max_x.max(0) as u32 + 1).min(width);
    let bottom = (max_y.max(0) as u32 + 1).min(height);
    if right <= x || bottom <= y {
        return None;
    }
    Some(BoundingBox::new(x, y, right - x, bottom - y))
}

/// Keep only horizontal foreground runs at least `min_len` long.
///
/// On a binary image this equals a morphological opening with a
/// `min_len` x 1 line kernel.
#[must_use]
pub fn keep_horizontal_runs(image: &GrayImage, min_len: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let mut run_start = None;
        for x in 0..=width {
            let on = x < width && image.get_pixel(x, y)[0] > 0;
            match (on, run_start) {
                (true, None) => run_start = Some(x),
                (false, Some(start)) => {
                    if x - start >= min_len {
                        for rx in start..x {
                            out.put_pixel(rx, y, image::Luma([255]));
                        }
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
    }
    out
}

/// Vertical counterpart of [`keep_horizontal_runs`]
#[must_use]
pub fn keep_vertical_runs(image: &GrayImage, min_len: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = GrayImage::new(width, height);
    for x in 0..width {
        let mut run_start = None;
        for y in 0..=height {
            let on = y < height && image.get_pixel(x, y)[0] > 0;
            match (on, run_start) {
                (true, None) => run_start = Some(y),
                (false, Some(start)) => {
                    if y - start >= min_len {
                        for ry in start..y {
                            out.put_pixel(x, ry, image::Luma([255]));
                        }
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
    }
    out
}

/// Group boxes into row bands and sort each band left to right.
///
/// A box joins the current band while its top edge is within `tolerance`
/// pixels of the band's first box.
#[must_use]
pub fn order_boxes(mut boxes: Vec<BoundingBox>, tolerance: u32) -> Vec<Vec<BoundingBox>> {
    boxes.sort_by_key(|b| (b.y, b.x));

    let mut rows: Vec<Vec<BoundingBox>> = Vec::new();
    let mut anchor_y = 0;
    for bbox in boxes {
        match rows.last_mut() {
            Some(row) if bbox.y - anchor_y <= tolerance => row.push(bbox),
            _ => {
                anchor_y = bbox.y;
                rows.push(vec![bbox]);
            }
        }
    }
    for row in &mut rows {
        row.sort_by_key(|b| b.x);
    }
    rows
}

fn draw_preview(page: &GrayImage, boxes: impl Iterator<Item = BoundingBox>) -> RgbImage {
    let mut preview = DynamicImage::ImageLuma8(page.clone()).to_rgb8();
    for b in boxes {
        let rect = Rect::at(b.x as i32, b.y as i32).of_size(b.width, b.height);
        draw_hollow_rect_mut(&mut preview, rect, Rgb([220, 30, 30]));
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use proptest::prelude::*;

    /// White page with a ruled grid of `rows` x `cols` cells
    fn ruled_page(rows: u32, cols: u32, cell_w: u32, cell_h: u32, margin: u32) -> GrayImage {
        let width = margin * 2 + cols * cell_w + 2;
        let height = margin * 2 + rows * cell_h + 2;
        let mut page = GrayImage::from_pixel(width, height, Luma([255]));
        let grid_right = margin + cols * cell_w + 2;
        let grid_bottom = margin + rows * cell_h + 2;

        for r in 0..=rows {
            let y = margin + r * cell_h;
            for x in margin..grid_right {
                page.put_pixel(x, y, Luma([0]));
                page.put_pixel(x, y + 1, Luma([0]));
            }
        }
        for c in 0..=cols {
            let x = margin + c * cell_w;
            for y in margin..grid_bottom {
                page.put_pixel(x, y, Luma([0]));
                page.put_pixel(x + 1, y, Luma([0]));
            }
        }
        page
    }

    #[test]
    fn test_detects_three_by_three_grid() {
        let page = ruled_page(3, 3, 90, 60, 10);
        let table = TableDetector::default().detect(&page).expect("table");

        assert_eq!(table.len(), 9);
        assert_eq!(table.rows, Some(3));
        assert_eq!(table.cols, Some(3));

        let cells: Vec<_> = table.cells().collect();
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.id, i as u32 + 1);
            assert_eq!(cell.row, Some(i as u32 / 3));
            assert_eq!(cell.col, Some(i as u32 % 3));
            assert_eq!(cell.image.dimensions(), (cell.bbox.width, cell.bbox.height));
            assert!(cell.needs_review);
        }
        assert!(cells[0].bbox.x < cells[1].bbox.x);
        assert!(cells[2].bbox.y < cells[3].bbox.y);

        let preview = table.preview.as_ref().expect("preview");
        assert_eq!(preview.dimensions(), page.dimensions());
    }

    #[test]
    fn test_blank_page_has_no_table() {
        let page = GrayImage::from_pixel(200, 150, Luma([255]));
        assert!(TableDetector::default().detect(&page).is_none());
    }

    #[test]
    fn test_text_strokes_are_not_lines() {
        let mut page = GrayImage::from_pixel(400, 300, Luma([255]));
        // short glyph-like strokes, well under width/40
        for i in 0..20 {
            let x0 = 20 + i * 18;
            for x in x0..x0 + 6 {
                page.put_pixel(x, 100, Luma([0]));
            }
        }
        let grid = TableDetector::default().line_map(&page);
        assert!(grid.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_run_filter_matches_line_opening() {
        let img = GrayImage::from_raw(8, 1, vec![255, 255, 255, 0, 255, 255, 0, 255]).unwrap();
        let out = keep_horizontal_runs(&img, 3);
        assert_eq!(out.as_raw(), &vec![255, 255, 255, 0, 0, 0, 0, 0]);

        let col = GrayImage::from_raw(1, 5, vec![0, 255, 255, 255, 255]).unwrap();
        let out = keep_vertical_runs(&col, 4);
        assert_eq!(out.as_raw(), &vec![0, 255, 255, 255, 255]);
    }

    #[test]
    fn test_row_tolerance_ordering() {
        let boxes = vec![
            BoundingBox::new(200, 100, 50, 20),
            BoundingBox::new(50, 108, 50, 20),
            BoundingBox::new(10, 160, 50, 20),
        ];
        let rows = order_boxes(boxes, 20);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].x, 50);
        assert_eq!(rows[0][1].x, 200);
        assert_eq!(rows[1][0].y, 160);
    }

    #[test]
    fn test_irregular_rows_leave_grid_unset() {
        let top_grid = ruled_page(1, 3, 80, 50, 10);
        let top = 100;
        let mut page = GrayImage::from_pixel(top_grid.width(), top + 70, Luma([255]));
        imageops::replace(&mut page, &top_grid, 0, 0);

        // one wide cell below the three-cell row
        for x in 10..252 {
            for y in [top, top + 1, top + 50, top + 51] {
                page.put_pixel(x, y, Luma([0]));
            }
        }
        for y in top..top + 52 {
            for x in [10, 11, 250, 251] {
                page.put_pixel(x, y, Luma([0]));
            }
        }

        let table = TableDetector::default().detect(&page).expect("table");
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows, None);
        assert!(table.cells().all(|c| c.row.is_none()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_cells_within_bounds_and_ordered(
            rows in 1u32..4,
            cols in 1u32..4,
            cell_w in 30u32..80,
            cell_h in 25u32..60,
        ) {
            let page = ruled_page(rows, cols, cell_w, cell_h, 15);
            let (w, h) = page.dimensions();
            let table = TableDetector::default().detect(&page);
            prop_assert!(table.is_some());
            let table = table.unwrap();

            let cells: Vec<_> = table.cells().collect();
            for cell in &cells {
                prop_assert!(cell.bbox.fits_within(w, h));
                prop_assert!(cell.bbox.area() > 0);
            }
            for pair in cells.windows(2) {
                let (a, b) = (pair[0].bbox, pair[1].bbox);
                let same_row = b.y.abs_diff(a.y) <= 20;
                let ordered = if same_row { a.x < b.x } else { b.y > a.y };
                prop_assert!(ordered);
            }
        }
    }
}
