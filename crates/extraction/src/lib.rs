//! Structured field extraction for land-record OCR output.
//!
//! Two strategies fill a [`FieldMap`]: bilingual label patterns over the
//! recognized text, then label/value pairing over table cells for whatever
//! the patterns missed. Extraction never fails; unparseable text degrades to
//! "full text captured, fields empty".
//!
//! # Example
//!
//! ```
//! use landrec_common::FieldKind;
//! use landrec_extraction::FieldExtractor;
//!
//! let data = FieldExtractor::default().extract("Survey No: 123/4B", 88.0, None);
//! assert_eq!(data.fields.get(FieldKind::SurveyNumber), Some("123/4B"));
//! ```

pub mod category;
mod patterns;
mod spatial;
pub mod text;

pub use category::{category_confidence, classify, Classification};
pub use spatial::ROW_TOLERANCE_PX;
pub use text::{clean_value, normalize_text, script_shares};

use landrec_common::{
    CellData, ExtractedData, FieldKind, FieldMap, LanguageConfidence, TableStructure,
};
use patterns::{is_excluded, DATE_TOKEN, FIELD_PATTERNS, FIELD_RULES};
use tracing::debug;

/// Combines pattern and spatial extraction with category classification
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    row_tolerance: u32,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self {
            row_tolerance: ROW_TOLERANCE_PX,
        }
    }
}

impl FieldExtractor {
    /// Extractor with a custom same-row tolerance for spatial matching
    #[must_use]
    pub fn new(row_tolerance: u32) -> Self {
        Self { row_tolerance }
    }

    #[must_use]
    pub fn row_tolerance(&self) -> u32 {
        self.row_tolerance
    }

    /// Build [`ExtractedData`] from page text, its confidence and the
    /// optional table detected on the page.
    #[must_use]
    pub fn extract(
        &self,
        text: &str,
        confidence: f32,
        table: Option<&TableStructure>,
    ) -> ExtractedData {
        let full_text = normalize_text(text);
        let mut data = ExtractedData {
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 100.0)
            } else {
                0.0
            },
            ..ExtractedData::default()
        };

        apply_patterns(&full_text, &mut data.fields);

        if let Some(table) = table {
            for rule in FIELD_RULES {
                if data.fields.is_set(rule.kind) {
                    continue;
                }
                if let Some((cell_id, value)) = spatial::find_value(table, rule, self.row_tolerance)
                {
                    debug!("{} filled from cell {}", rule.kind, cell_id);
                    data.fields.set(rule.kind, value);
                    data.field_sources.insert(rule.kind, cell_id);
                }
            }
        }
        data.fields.refresh_location();

        let classification = classify(&full_text);
        data.category = classification.category;
        data.category_confidence = classification.confidence;

        let (tamil, latin) = script_shares(&full_text);
        data.language_confidence = LanguageConfidence {
            tamil: data.confidence * tamil,
            english: data.confidence * latin,
        };

        data.full_text = full_text;
        data.refresh_summary();
        debug!(
            "extracted {} fields, category {} ({}%)",
            data.fields.filled_count(),
            data.category,
            data.category_confidence
        );
        data
    }
}

fn apply_patterns(text: &str, fields: &mut FieldMap) {
    for compiled in FIELD_PATTERNS.iter() {
        let rule = compiled.rule;
        let value = compiled
            .regex
            .captures_iter(text)
            .filter(|caps| {
                caps.get(0)
                    .is_some_and(|m| !is_excluded(text, m.start(), rule.excluded_prefixes))
            })
            .find_map(|caps| caps.get(1).and_then(|m| clean_value(m.as_str())));
        if let Some(value) = value {
            fields.set(rule.kind, value);
        }
    }

    if !fields.is_set(FieldKind::Date) {
        if let Some(m) = DATE_TOKEN.captures(text).and_then(|caps| caps.get(1)) {
            fields.set(FieldKind::Date, m.as_str());
        }
    }
}

/// Propagate a corrected cell into the fields it supplied.
///
/// Returns the fields that changed. Fields found by the pattern strategy
/// are never touched.
pub fn apply_cell_correction(data: &mut ExtractedData, cell: &CellData) -> Vec<FieldKind> {
    let kinds: Vec<FieldKind> = data
        .field_sources
        .iter()
        .filter(|(_, id)| **id == cell.id)
        .map(|(kind, _)| *kind)
        .collect();
    if kinds.is_empty() {
        return kinds;
    }

    let value = cell.text_trimmed().and_then(clean_value);
    let mut changed = Vec::new();
    for kind in kinds {
        if data.fields.get(kind) != value.as_deref() {
            data.fields.set(kind, value.clone().unwrap_or_default());
            changed.push(kind);
        }
    }
    if !changed.is_empty() {
        data.fields.refresh_location();
        data.refresh_summary();
    }
    changed
}
