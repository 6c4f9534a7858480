//! Extraction output: structured fields, category and confidence.

use crate::table::CellId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A field the extractor knows how to locate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    DocumentNumber,
    OwnerName,
    PreviousOwner,
    SurveyNumber,
    Date,
    District,
    Taluk,
    Village,
    PattaNumber,
    BatchNumber,
    Location,
}

impl FieldKind {
    pub const ALL: [FieldKind; 11] = [
        FieldKind::DocumentNumber,
        FieldKind::OwnerName,
        FieldKind::PreviousOwner,
        FieldKind::SurveyNumber,
        FieldKind::Date,
        FieldKind::District,
        FieldKind::Taluk,
        FieldKind::Village,
        FieldKind::PattaNumber,
        FieldKind::BatchNumber,
        FieldKind::Location,
    ];

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            FieldKind::DocumentNumber => "Document No",
            FieldKind::OwnerName => "Owner",
            FieldKind::PreviousOwner => "Previous Owner",
            FieldKind::SurveyNumber => "Survey No",
            FieldKind::Date => "Date",
            FieldKind::District => "District",
            FieldKind::Taluk => "Taluk",
            FieldKind::Village => "Village",
            FieldKind::PattaNumber => "Patta No",
            FieldKind::BatchNumber => "Batch No",
            FieldKind::Location => "Location",
        }
    }

    /// True for the components folded into the composite location
    #[must_use]
    pub const fn is_location_part(&self) -> bool {
        matches!(
            self,
            FieldKind::Village | FieldKind::Taluk | FieldKind::District
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured fields parsed from one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    pub document_number: Option<String>,
    pub owner_name: Option<String>,
    pub previous_owner: Option<String>,
    pub survey_number: Option<String>,
    pub date: Option<String>,
    pub district: Option<String>,
    pub taluk: Option<String>,
    pub village: Option<String>,
    pub patta_number: Option<String>,
    pub batch_number: Option<String>,
    /// Village, taluk and district joined, or a generic location label match
    pub location: Option<String>,
}

impl FieldMap {
    fn slot(&self, kind: FieldKind) -> &Option<String> {
        match kind {
            FieldKind::DocumentNumber => &self.document_number,
            FieldKind::OwnerName => &self.owner_name,
            FieldKind::PreviousOwner => &self.previous_owner,
            FieldKind::SurveyNumber => &self.survey_number,
            FieldKind::Date => &self.date,
            FieldKind::District => &self.district,
            FieldKind::Taluk => &self.taluk,
            FieldKind::Village => &self.village,
            FieldKind::PattaNumber => &self.patta_number,
            FieldKind::BatchNumber => &self.batch_number,
            FieldKind::Location => &self.location,
        }
    }

    fn slot_mut(&mut self, kind: FieldKind) -> &mut Option<String> {
        match kind {
            FieldKind::DocumentNumber => &mut self.document_number,
            FieldKind::OwnerName => &mut self.owner_name,
            FieldKind::PreviousOwner => &mut self.previous_owner,
            FieldKind::SurveyNumber => &mut self.survey_number,
            FieldKind::Date => &mut self.date,
            FieldKind::District => &mut self.district,
            FieldKind::Taluk => &mut self.taluk,
            FieldKind::Village => &mut self.village,
            FieldKind::PattaNumber => &mut self.patta_number,
            FieldKind::BatchNumber => &mut self.batch_number,
            FieldKind::Location => &mut self.location,
        }
    }

    #[must_use]
    pub fn get(&self, kind: FieldKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    /// Set a field; blank values clear it
    pub fn set(&mut self, kind: FieldKind, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        *self.slot_mut(kind) = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    #[must_use]
    pub fn is_set(&self, kind: FieldKind) -> bool {
        self.slot(kind).is_some()
    }

    #[must_use]
    pub fn filled_count(&self) -> usize {
        FieldKind::ALL.iter().filter(|k| self.is_set(**k)).count()
    }

    /// Rebuild the composite location from village, taluk and district.
    ///
    /// Leaves `location` untouched when none of the three is known.
    pub fn refresh_location(&mut self) {
        let parts: Vec<&str> = [&self.village, &self.taluk, &self.district]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if !parts.is_empty() {
            self.location = Some(parts.join(", "));
        }
    }
}

/// Kind of land-record document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    SaleDeed,
    Patta,
    Chitta,
    Adangal,
    GovernmentOrder,
    #[default]
    Unknown,
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentCategory::SaleDeed => "Sale Deed",
            DocumentCategory::Patta => "Patta",
            DocumentCategory::Chitta => "Chitta",
            DocumentCategory::Adangal => "Adangal",
            DocumentCategory::GovernmentOrder => "Government Order",
            DocumentCategory::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Confidence split by script, in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfidence {
    pub tamil: f32,
    pub english: f32,
}

/// OCR and parsing output for one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub full_text: String,
    /// Page-level recognition confidence in [0, 100]
    pub confidence: f32,
    pub fields: FieldMap,
    /// Cells that supplied a field value through spatial matching
    pub field_sources: BTreeMap<FieldKind, CellId>,
    pub category: DocumentCategory,
    pub category_confidence: u8,
    pub language_confidence: LanguageConfidence,
    pub summary: String,
}

impl ExtractedData {
    /// Zero-confidence stand-in for a file whose recognition failed, so the
    /// file still reaches review
    #[must_use]
    pub fn placeholder() -> Self {
        let mut data = Self::default();
        data.refresh_summary();
        data
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.full_text.is_empty() && self.confidence == 0.0 && self.fields.filled_count() == 0
    }

    /// Regenerate the one-line summary from the current fields
    pub fn refresh_summary(&mut self) {
        let or_na = |v: Option<&str>| v.unwrap_or("N/A").to_string();
        self.summary = format!(
            "Document Type: {} | Patta No: {} | Survey No: {} | Owner: {}",
            self.category,
            or_na(self.fields.get(FieldKind::PattaNumber)),
            or_na(self.fields.get(FieldKind::SurveyNumber)),
            or_na(self.fields.get(FieldKind::OwnerName)),
        );
    }
}
