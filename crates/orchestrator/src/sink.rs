//! Hand-off of finished records to persistent storage.

use crate::job::{JobId, JobState, ProcessingJob};
use async_trait::async_trait;
use landrec_common::{DocumentCategory, FieldMap};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Storage failed for one record
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write record: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage rejected record: {0}")]
    Rejected(String),
}

/// Everything storage needs about one completed document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedRecord {
    pub job_id: JobId,
    pub file: String,
    pub fields: FieldMap,
    pub confidence: f32,
    pub category: DocumentCategory,
    pub summary: String,
}

impl FinishedRecord {
    /// Record for a `Done` job, `None` otherwise
    #[must_use]
    pub fn from_job(job: &ProcessingJob) -> Option<Self> {
        match job.state() {
            JobState::Done { data } => Some(Self {
                job_id: job.id,
                file: job.file.clone(),
                fields: data.fields.clone(),
                confidence: data.confidence,
                category: data.category,
                summary: data.summary.clone(),
            }),
            _ => None,
        }
    }
}

/// Persistence boundary.
///
/// Returns the storage location of the saved record.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn save(&self, record: &FinishedRecord) -> Result<String, SaveError>;
}

/// Outcome of saving one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub file: String,
    /// Storage location on success
    pub location: Option<String>,
    pub error: Option<String>,
}

/// Save every `Done` job. Save failures are recorded per file and never
/// stop the remaining saves.
pub async fn commit_records(sink: &dyn RecordSink, jobs: &[ProcessingJob]) -> Vec<CommitOutcome> {
    let mut outcomes = Vec::new();
    for record in jobs.iter().filter_map(FinishedRecord::from_job) {
        let outcome = match sink.save(&record).await {
            Ok(location) => {
                info!("Saved {} to {}", record.file, location);
                CommitOutcome {
                    file: record.file,
                    location: Some(location),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Failed to save {}: {}", record.file, e);
                CommitOutcome {
                    file: record.file,
                    location: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<FinishedRecord>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<FinishedRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn save(&self, record: &FinishedRecord) -> Result<String, SaveError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| SaveError::Rejected("record store is poisoned".to_string()))?;
        records.push(record.clone());
        Ok(format!("memory://{}", record.job_id))
    }
}

/// Writes one pretty-printed JSON file per record
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RecordSink for JsonDirSink {
    async fn save(&self, record: &FinishedRecord) -> Result<String, SaveError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", record.job_id));
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::InputFormat;
    use image::DynamicImage;
    use landrec_common::{ExtractedData, FieldKind};
    use landrec_preprocess::QualityMetrics;
    use std::sync::Arc;

    fn done_job(file: &str, survey: &str) -> ProcessingJob {
        let mut job = ProcessingJob::new(file, InputFormat::Png);
        job.begin_preprocessing().unwrap();
        job.await_ocr(
            Arc::new(DynamicImage::new_luma8(2, 2)),
            None,
            QualityMetrics::default(),
        )
        .unwrap();
        job.begin_extraction().unwrap();
        let mut data = ExtractedData::default();
        data.fields.set(FieldKind::SurveyNumber, survey);
        data.refresh_summary();
        job.complete(data).unwrap();
        job
    }

    struct RejectingSink;

    #[async_trait]
    impl RecordSink for RejectingSink {
        async fn save(&self, record: &FinishedRecord) -> Result<String, SaveError> {
            if record.file == "bad.png" {
                Err(SaveError::Rejected("quota exceeded".to_string()))
            } else {
                Ok(format!("mock://{}", record.file))
            }
        }
    }

    #[tokio::test]
    async fn test_only_done_jobs_are_committed() {
        let mut skipped = ProcessingJob::new("later.png", InputFormat::Png);
        skipped.skip().unwrap();
        let jobs = vec![done_job("a.png", "1/2"), skipped];

        let sink = MemorySink::new();
        let outcomes = commit_records(&sink, &jobs).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].location.as_deref().unwrap().starts_with("memory://job-"));
        assert_eq!(sink.records()[0].fields.get(FieldKind::SurveyNumber), Some("1/2"));
    }

    #[tokio::test]
    async fn test_save_failures_are_not_fatal() {
        let jobs = vec![done_job("bad.png", "1"), done_job("good.png", "2")];
        let outcomes = commit_records(&RejectingSink, &jobs).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].error.as_deref(), Some("storage rejected record: quota exceeded"));
        assert_eq!(outcomes[1].location.as_deref(), Some("mock://good.png"));
    }

    #[tokio::test]
    async fn test_json_dir_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirSink::new(dir.path().join("records"));
        let jobs = vec![done_job("a.png", "9/9")];
        let outcomes = commit_records(&sink, &jobs).await;

        let path = outcomes[0].location.clone().unwrap();
        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(saved["file"], "a.png");
        assert_eq!(saved["fields"]["survey_number"], "9/9");
    }
}
