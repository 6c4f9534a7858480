//! Batch pipeline for land-record digitization.
//!
//! Files are admitted ([`admission`]), preprocessed in fixed-size groups,
//! recognized through a shared [`landrec_ocr::OcrDispatchPool`] and parsed
//! into structured fields. Each file is tracked as a [`ProcessingJob`] whose
//! state only moves forward. Finished pages can then be corrected by an
//! operator ([`CorrectionSession`]) and handed to storage ([`RecordSink`]).

pub mod admission;
pub mod batch;
pub mod config;
pub mod correction;
pub mod job;
pub mod progress;
pub mod sink;

pub use admission::{AdmissionError, AdmissionPolicy, AdmittedFile, InputFormat, Rejection, StorageMode};
pub use batch::{BatchOptions, BatchOrchestrator, BatchReport, StopHandle};
pub use config::{load_config, BackendKind, PipelineConfig};
pub use correction::{AppliedCorrection, CorrectionError, CorrectionSession};
pub use job::{JobId, JobState, ProcessingJob, TransitionError};
pub use progress::{LogEntry, Outcome, ProgressSnapshot, ProgressTracker};
pub use sink::{commit_records, CommitOutcome, FinishedRecord, JsonDirSink, MemorySink, RecordSink, SaveError};

use landrec_common::ProcessingError;

impl From<TransitionError> for ProcessingError {
    fn from(err: TransitionError) -> Self {
        ProcessingError::Other(err.to_string())
    }
}
