//! Per-file job record and its stage state machine.

use crate::admission::InputFormat;
use image::DynamicImage;
use landrec_common::{ExtractedData, PipelineStage, ProcessingError, TableStructure};
use landrec_preprocess::QualityMetrics;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identity of one job, stable for the life of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Where a job is in the pipeline.
///
/// Jobs move `Queued -> Preprocessing -> AwaitingOcr -> Extracting -> Done`
/// with no skipped or backward steps. `Failed` is reachable from any
/// non-terminal state, `Skipped` only through an operator stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Preprocessing,
    AwaitingOcr,
    Extracting,
    Done {
        data: ExtractedData,
    },
    Failed {
        stage: PipelineStage,
        cause: String,
        /// Zero-confidence result kept so the file still reaches review
        placeholder: Option<ExtractedData>,
    },
    Skipped,
}

impl JobState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Preprocessing => "preprocessing",
            JobState::AwaitingOcr => "awaiting_ocr",
            JobState::Extracting => "extracting",
            JobState::Done { .. } => "done",
            JobState::Failed { .. } => "failed",
            JobState::Skipped => "skipped",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Done { .. } | JobState::Failed { .. } | JobState::Skipped
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An illegal state change was requested
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{file}: cannot move from {from} to {to}")]
pub struct TransitionError {
    pub file: String,
    pub from: &'static str,
    pub to: &'static str,
}

/// One file's trip through the pipeline
#[derive(Debug, Serialize)]
pub struct ProcessingJob {
    pub id: JobId,
    pub file: String,
    pub format: InputFormat,
    #[serde(flatten)]
    state: JobState,
    #[serde(skip)]
    image: Option<Arc<DynamicImage>>,
    table: Option<TableStructure>,
    metrics: Option<QualityMetrics>,
}

impl ProcessingJob {
    #[must_use]
    pub fn new(file: impl Into<String>, format: InputFormat) -> Self {
        Self {
            id: JobId::new(),
            file: file.into(),
            format,
            state: JobState::Queued,
            image: None,
            table: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Enhanced page, once preprocessing finished
    #[must_use]
    pub fn image(&self) -> Option<&Arc<DynamicImage>> {
        self.image.as_ref()
    }

    #[must_use]
    pub fn table(&self) -> Option<&TableStructure> {
        self.table.as_ref()
    }

    pub fn table_mut(&mut self) -> Option<&mut TableStructure> {
        self.table.as_mut()
    }

    #[must_use]
    pub fn metrics(&self) -> Option<&QualityMetrics> {
        self.metrics.as_ref()
    }

    /// Extraction result, or the placeholder of a recognition failure
    #[must_use]
    pub fn extracted(&self) -> Option<&ExtractedData> {
        match &self.state {
            JobState::Done { data } => Some(data),
            JobState::Failed { placeholder, .. } => placeholder.as_ref(),
            _ => None,
        }
    }

    /// Table and extracted data borrowed together for a correction session
    pub fn review_parts(&mut self) -> Option<(&mut TableStructure, &mut ExtractedData)> {
        let data = match &mut self.state {
            JobState::Done { data } => data,
            JobState::Failed {
                placeholder: Some(data),
                ..
            } => data,
            _ => return None,
        };
        self.table.as_mut().map(|table| (table, data))
    }

    fn transition(
        &mut self,
        expected: fn(&JobState) -> bool,
        next: JobState,
    ) -> Result<(), TransitionError> {
        if !expected(&self.state) {
            return Err(TransitionError {
                file: self.file.clone(),
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn begin_preprocessing(&mut self) -> Result<(), TransitionError> {
        self.transition(|s| matches!(s, JobState::Queued), JobState::Preprocessing)
    }

    /// Store the enhanced page and wait for recognition
    pub fn await_ocr(
        &mut self,
        image: Arc<DynamicImage>,
        table: Option<TableStructure>,
        metrics: QualityMetrics,
    ) -> Result<(), TransitionError> {
        self.transition(|s| matches!(s, JobState::Preprocessing), JobState::AwaitingOcr)?;
        self.image = Some(image);
        self.table = table;
        self.metrics = Some(metrics);
        Ok(())
    }

    pub fn begin_extraction(&mut self) -> Result<(), TransitionError> {
        self.transition(|s| matches!(s, JobState::AwaitingOcr), JobState::Extracting)
    }

    pub fn complete(&mut self, data: ExtractedData) -> Result<(), TransitionError> {
        self.transition(
            |s| matches!(s, JobState::Extracting),
            JobState::Done { data },
        )
    }

    /// Record an unrecoverable error for this file
    pub fn fail(
        &mut self,
        stage: PipelineStage,
        error: &ProcessingError,
        placeholder: Option<ExtractedData>,
    ) -> Result<(), TransitionError> {
        self.transition(
            |s| !s.is_terminal(),
            JobState::Failed {
                stage,
                cause: error.to_string(),
                placeholder,
            },
        )
    }

    /// Operator stop; only jobs that have not finished can be skipped
    pub fn skip(&mut self) -> Result<(), TransitionError> {
        self.transition(|s| !s.is_terminal(), JobState::Skipped)
    }
}
