//! Detected table cells and the per-page structure that owns them.

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest confidence a cell can carry; set by manual correction
pub const MAX_CONFIDENCE: f32 = 100.0;

/// Cells below this confidence are flagged for operator review
pub const DEFAULT_REVIEW_THRESHOLD: f32 = 60.0;

/// Identifier of a cell, unique within one [`TableStructure`]
pub type CellId = u32;

/// Axis-aligned box in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True if the box has positive area and lies inside a `width` x `height` image
    #[must_use]
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= width && self.bottom() <= height
    }

    /// True if `other` lies entirely inside this box
    #[must_use]
    pub const fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// One detected table cell
#[derive(Debug, Clone, Serialize)]
pub struct CellData {
    pub id: CellId,
    /// Row index, set only when a regular grid was inferred
    pub row: Option<u32>,
    /// Column index, set only when a regular grid was inferred
    pub col: Option<u32>,
    pub bbox: BoundingBox,
    /// Cropped pixels of the cell
    #[serde(skip)]
    pub image: GrayImage,
    pub text: Option<String>,
    /// Recognition confidence in [0, 100]; `None` until recognized
    pub confidence: Option<f32>,
    pub needs_review: bool,
}

impl CellData {
    /// A freshly detected cell has no recognition result and needs review
    #[must_use]
    pub fn new(id: CellId, bbox: BoundingBox, image: GrayImage) -> Self {
        Self {
            id,
            row: None,
            col: None,
            bbox,
            image,
            text: None,
            confidence: None,
            needs_review: true,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Store a recognition result and recompute the review flag
    pub fn record_recognition(&mut self, text: impl Into<String>, confidence: f32, threshold: f32) {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, MAX_CONFIDENCE)
        } else {
            0.0
        };
        self.text = Some(text.into());
        self.confidence = Some(confidence);
        self.needs_review = confidence < threshold;
    }

    /// A failed recognition attempt always leaves the cell flagged
    pub fn record_failure(&mut self) {
        self.confidence = None;
        self.needs_review = true;
    }

    /// Overwrite the text with an operator correction.
    ///
    /// Returns `true` if the stored text changed.
    pub fn apply_correction(&mut self, text: &str) -> bool {
        let changed = self.text.as_deref() != Some(text);
        if changed {
            self.text = Some(text.to_string());
        }
        self.confidence = Some(MAX_CONFIDENCE);
        self.needs_review = false;
        changed
    }

    /// Trimmed text, or `None` when the cell is empty
    #[must_use]
    pub fn text_trimmed(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Cells detected on one page, kept in reading order and addressable by id
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStructure {
    cells: Vec<CellData>,
    #[serde(skip)]
    index: HashMap<CellId, usize>,
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    /// Page with the detected cell boxes drawn on it
    #[serde(skip)]
    pub preview: Option<RgbImage>,
}

impl TableStructure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from cells already in reading order, dropping duplicate ids
    #[must_use]
    pub fn from_cells(cells: impl IntoIterator<Item = CellData>) -> Self {
        let mut table = Self::new();
        for cell in cells {
            table.push(cell);
        }
        table
    }

    /// Append a cell. Returns `false` (and drops the cell) if its id is taken.
    pub fn push(&mut self, cell: CellData) -> bool {
        if self.index.contains_key(&cell.id) {
            return false;
        }
        self.index.insert(cell.id, self.cells.len());
        self.cells.push(cell);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in reading order
    pub fn cells(&self) -> impl Iterator<Item = &CellData> {
        self.cells.iter()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut CellData> {
        self.cells.iter_mut()
    }

    #[must_use]
    pub fn cell(&self, id: CellId) -> Option<&CellData> {
        self.index.get(&id).map(|&slot| &self.cells[slot])
    }

    #[must_use]
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut CellData> {
        match self.index.get(&id) {
            Some(&slot) => self.cells.get_mut(slot),
            None => None,
        }
    }

    /// Ids of cells still flagged for review, in reading order
    #[must_use]
    pub fn pending_review(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|c| c.needs_review)
            .map(|c| c.id)
            .collect()
    }
}
