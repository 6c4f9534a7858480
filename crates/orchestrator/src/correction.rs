//! Operator corrections to recognized cell text.

use chrono::{DateTime, Utc};
use landrec_common::{CellId, ExtractedData, FieldKind, TableStructure};
use landrec_extraction::apply_cell_correction;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrectionError {
    #[error("no cell with id {0} in this table")]
    UnknownCell(CellId),
}

/// One correction that changed stored text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCorrection {
    pub cell: CellId,
    pub original: Option<String>,
    pub corrected: String,
    /// Fields re-derived from the corrected cell
    pub fields: Vec<FieldKind>,
    pub at: DateTime<Utc>,
}

/// Exclusive editing session over one page's cells.
///
/// Holding the table mutably makes the session the only writer while it
/// lives. A correction sets the cell's confidence to the maximum and clears
/// its review flag without touching any other cell.
#[derive(Debug)]
pub struct CorrectionSession<'a> {
    table: &'a mut TableStructure,
    extracted: Option<&'a mut ExtractedData>,
    history: Vec<AppliedCorrection>,
}

impl<'a> CorrectionSession<'a> {
    #[must_use]
    pub fn new(table: &'a mut TableStructure) -> Self {
        Self {
            table,
            extracted: None,
            history: Vec::new(),
        }
    }

    /// Session that also keeps cell-sourced fields in step with corrections
    #[must_use]
    pub fn with_extracted(table: &'a mut TableStructure, extracted: &'a mut ExtractedData) -> Self {
        Self {
            table,
            extracted: Some(extracted),
            history: Vec::new(),
        }
    }

    /// Overwrite one cell's text.
    ///
    /// Returns `true` when the stored text changed. Reapplying the same
    /// text is a no-op apart from rewriting identical values.
    pub fn apply(&mut self, cell_id: CellId, text: &str) -> Result<bool, CorrectionError> {
        let cell = self
            .table
            .cell_mut(cell_id)
            .ok_or(CorrectionError::UnknownCell(cell_id))?;
        let original = cell.text.clone();
        let changed = cell.apply_correction(text);

        let fields = match self.extracted.as_deref_mut() {
            Some(data) => apply_cell_correction(data, cell),
            None => Vec::new(),
        };

        if changed {
            info!("Cell {} corrected ({} fields updated)", cell_id, fields.len());
            self.history.push(AppliedCorrection {
                cell: cell_id,
                original,
                corrected: text.to_string(),
                fields,
                at: Utc::now(),
            });
        }
        Ok(changed)
    }

    /// Cells still waiting for an operator, in reading order
    #[must_use]
    pub fn pending(&self) -> Vec<CellId> {
        self.table.pending_review()
    }

    #[must_use]
    pub fn history(&self) -> &[AppliedCorrection] {
        &self.history
    }

    #[must_use]
    pub fn into_history(self) -> Vec<AppliedCorrection> {
        self.history
    }
}
