//! Batch orchestration: admission, grouped preprocessing, recognition and
//! extraction for a set of files.

use crate::admission::{AdmissionPolicy, AdmittedFile, Rejection};
use crate::config::PipelineConfig;
use crate::job::{JobId, JobState, ProcessingJob};
use crate::progress::{Outcome, ProgressSnapshot, ProgressTracker};
use futures::future::{join_all, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use image::DynamicImage;
use landrec_common::{
    CellId, ExtractedData, PipelineStage, ProcessingError, DEFAULT_REVIEW_THRESHOLD,
};
use landrec_extraction::FieldExtractor;
use landrec_ocr::{OcrDispatchPool, OcrError, OcrRequest, Recognition, RecognitionMode, Ticket};
use landrec_preprocess::{decode_page, PagePreprocessor, PreprocessOptions};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Per-run options
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Files preprocessed together before their recognition is scheduled
    pub batch_size: usize,
    /// Use the uniform-block engine mode for whole pages
    pub handwritten: bool,
    pub review_threshold: f32,
    pub preprocess: PreprocessOptions,
    pub admission: AdmissionPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            handwritten: false,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            preprocess: PreprocessOptions::default(),
            admission: AdmissionPolicy::default(),
        }
    }
}

impl BatchOptions {
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size(),
            handwritten: config.handwritten(),
            review_threshold: config.review_threshold(),
            preprocess: config.preprocess_options(),
            admission: config.admission_policy(),
        }
    }
}

/// Operator-triggered early stop.
///
/// Cloning yields another handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Re-arm the handle for the next run
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of one run
#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// Admitted files, in input order
    pub jobs: Vec<ProcessingJob>,
    pub rejected: Vec<Rejection>,
    pub elapsed_secs: f64,
    pub files_per_sec: f64,
    /// An operator stop ended the run early
    pub stopped: bool,
}

impl BatchReport {
    fn count(&self, name: &str) -> usize {
        self.jobs.iter().filter(|j| j.state().name() == name).count()
    }

    #[must_use]
    pub fn done(&self) -> usize {
        self.count("done")
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    #[must_use]
    pub fn job(&self, id: JobId) -> Option<&ProcessingJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Jobs an operator should look at: failures with a placeholder and
    /// completed pages with cells flagged for review
    #[must_use]
    pub fn needs_review(&self) -> Vec<&ProcessingJob> {
        self.jobs
            .iter()
            .filter(|j| match j.state() {
                JobState::Failed { placeholder, .. } => placeholder.is_some(),
                JobState::Done { .. } => j.table().is_some_and(|t| !t.pending_review().is_empty()),
                _ => false,
            })
            .collect()
    }
}

/// Recognition results for one job, correlated by id
struct OcrOutcome {
    id: JobId,
    page: Result<Recognition, OcrError>,
    cells: Vec<(CellId, Result<Recognition, OcrError>)>,
}

/// Drives files through preprocessing, recognition and extraction.
///
/// Preprocessing runs one group of `batch_size` files at a time on the
/// blocking thread pool. Each group's recognition is submitted to the pool
/// as soon as the group is preprocessed, so recognition of one group
/// overlaps preprocessing of the next.
pub struct BatchOrchestrator {
    preprocessor: Arc<dyn PagePreprocessor>,
    pool: OcrDispatchPool,
    extractor: FieldExtractor,
    options: BatchOptions,
    stop: StopHandle,
    progress: ProgressTracker,
}

impl BatchOrchestrator {
    #[must_use]
    pub fn new(
        preprocessor: Arc<dyn PagePreprocessor>,
        pool: OcrDispatchPool,
        extractor: FieldExtractor,
        options: BatchOptions,
    ) -> Self {
        Self {
            preprocessor,
            pool,
            extractor,
            options,
            stop: StopHandle::default(),
            progress: ProgressTracker::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    #[must_use]
    pub fn pool(&self) -> &OcrDispatchPool {
        &self.pool
    }

    /// Handle for requesting an early stop from another task
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Admit files from disk, then run the admitted ones
    pub async fn process_paths(
        &mut self,
        paths: &[impl AsRef<Path>],
    ) -> Result<BatchReport, ProcessingError> {
        let admission = self.options.admission.admit_paths(paths).await;
        self.run_admitted(admission.admitted, admission.rejected).await
    }

    /// Admit in-memory `(name, bytes)` inputs, then run the admitted ones
    pub async fn process_bytes(
        &mut self,
        inputs: Vec<(String, Vec<u8>)>,
    ) -> Result<BatchReport, ProcessingError> {
        let admission = self.options.admission.admit(inputs);
        self.run_admitted(admission.admitted, admission.rejected).await
    }

    async fn run_admitted(
        &mut self,
        admitted: Vec<AdmittedFile>,
        rejected: Vec<Rejection>,
    ) -> Result<BatchReport, ProcessingError> {
        for rejection in &rejected {
            warn!("Rejected {}: {}", rejection.file, rejection.reason);
        }
        let mut report = self.run(admitted).await?;
        report.rejected = rejected;
        Ok(report)
    }

    /// Run already-admitted files.
    ///
    /// Per-file failures are recorded on the jobs. Only a pool that can no
    /// longer accept work fails the whole run. A stop requested before or
    /// during the run applies to this run only; the handle is re-armed when
    /// it returns.
    pub async fn run(&mut self, files: Vec<AdmittedFile>) -> Result<BatchReport, ProcessingError> {
        let result = self.run_groups(files).await;
        self.stop.reset();
        result
    }

    async fn run_groups(
        &mut self,
        files: Vec<AdmittedFile>,
    ) -> Result<BatchReport, ProcessingError> {
        let total = files.len();
        let batch_size = self.options.batch_size.max(1);
        let groups = total.div_ceil(batch_size);
        self.progress.reset(total);
        info!(
            "Starting batch of {} files in {} groups (batch size {}, pool size {})",
            total,
            groups,
            batch_size,
            self.pool.size()
        );

        let mut jobs: Vec<ProcessingJob> = files
            .iter()
            .map(|f| ProcessingJob::new(f.name.clone(), f.format))
            .collect();
        let index: HashMap<JobId, usize> =
            jobs.iter().enumerate().map(|(i, j)| (j.id, i)).collect();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, OcrOutcome>> =
            FuturesUnordered::new();
        let mut tickets: Vec<Ticket> = Vec::new();

        let mut remaining = files.into_iter().enumerate().peekable();
        let mut group_no = 0;
        while remaining.peek().is_some() {
            if self.stop.is_stopped() {
                info!("Stop requested, not starting remaining groups");
                break;
            }
            group_no += 1;
            let group: Vec<(usize, AdmittedFile)> = remaining.by_ref().take(batch_size).collect();
            self.progress
                .set_stage(format!("Preprocessing group {group_no}/{groups}"));
            debug!("Group {}: {} files", group_no, group.len());

            for (idx, _) in &group {
                jobs[*idx].begin_preprocessing()?;
            }

            let tasks = group.into_iter().map(|(idx, file)| {
                let preprocessor = Arc::clone(&self.preprocessor);
                let options = self.options.preprocess.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    let page = decode_page(&file.bytes)?;
                    preprocessor.preprocess(&page, &options)
                });
                async move { (idx, handle.await) }
            });
            let results = join_all(tasks).await;

            self.progress
                .set_stage(format!("Recognizing group {group_no}/{groups}"));
            for (idx, result) in results {
                let job = &mut jobs[idx];
                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        self.fail_job(job, PipelineStage::Preprocessing, e.into(), None)?;
                        continue;
                    }
                    Err(e) => {
                        let err = ProcessingError::Transform(format!("preprocessing task failed: {e}"));
                        self.fail_job(job, PipelineStage::Preprocessing, err, None)?;
                        continue;
                    }
                };

                if self.stop.is_stopped() {
                    job.skip()?;
                    self.progress
                        .record(&job.file, Outcome::Skipped, "stopped before recognition");
                    continue;
                }

                let image = Arc::new(output.image);
                job.await_ocr(Arc::clone(&image), output.table, output.metrics)?;
                match self.submit_recognition(job, image, &mut tickets) {
                    Ok(pending) => in_flight.push(pending),
                    Err(OcrError::PoolClosed) => {
                        return Err(ProcessingError::PoolUnavailable(
                            "recognition pool shut down during the batch".to_string(),
                        ));
                    }
                    Err(e) => {
                        self.fail_job(
                            job,
                            PipelineStage::Recognition,
                            e.into(),
                            Some(ExtractedData::placeholder()),
                        )?;
                    }
                }
            }

            // fold in whatever already finished
            while let Some(Some(outcome)) = in_flight.next().now_or_never() {
                self.finish_job(&mut jobs, &index, outcome)?;
            }
            let rate = self.progress.update_throughput();
            info!(
                "Group {}/{} preprocessed, {:.2} files/sec so far",
                group_no, groups, rate
            );
        }

        self.progress.set_stage("Waiting for recognition");
        let mut cancelled = false;
        if self.stop.is_stopped() {
            cancelled = true;
            self.cancel_queued(&tickets);
        }
        while !in_flight.is_empty() {
            tokio::select! {
                () = self.stop.stopped(), if !cancelled => {
                    cancelled = true;
                    self.cancel_queued(&tickets);
                }
                Some(outcome) = in_flight.next() => {
                    self.finish_job(&mut jobs, &index, outcome)?;
                }
                else => break,
            }
        }

        let stopped = self.stop.is_stopped();
        for job in jobs.iter_mut().filter(|j| !j.state().is_terminal()) {
            job.skip()?;
            self.progress
                .record(&job.file, Outcome::Skipped, "stopped by operator");
        }

        let files_per_sec = self.progress.update_throughput();
        self.progress.set_stage("Review");
        let report = BatchReport {
            jobs,
            rejected: Vec::new(),
            elapsed_secs: self.progress.snapshot().elapsed_secs,
            files_per_sec,
            stopped,
        };
        info!(
            "Batch finished: {} done, {} failed, {} skipped ({:.2} files/sec)",
            report.done(),
            report.failed(),
            report.skipped(),
            files_per_sec
        );
        Ok(report)
    }

    fn cancel_queued(&self, tickets: &[Ticket]) {
        let n = self.pool.cancel(tickets);
        info!("Stop requested: cancelled {} queued recognition jobs", n);
    }

    /// Submit the page and, when a table was found, every cell
    fn submit_recognition(
        &self,
        job: &ProcessingJob,
        image: Arc<DynamicImage>,
        tickets: &mut Vec<Ticket>,
    ) -> Result<BoxFuture<'static, OcrOutcome>, OcrError> {
        let mode = RecognitionMode::for_handwritten(self.options.handwritten);
        let page = self
            .pool
            .submit(OcrRequest::new(job.file.clone(), image, mode))?;
        tickets.push(page.ticket());

        let mut cells = Vec::new();
        if let Some(table) = job.table() {
            for cell in table.cells() {
                let image = Arc::new(DynamicImage::ImageLuma8(cell.image.clone()));
                let handle = self.pool.submit(OcrRequest::new(
                    format!("{}#{}", job.file, cell.id),
                    image,
                    RecognitionMode::UniformBlock,
                ))?;
                tickets.push(handle.ticket());
                cells.push((cell.id, handle));
            }
        }

        let id = job.id;
        Ok(async move {
            let page = page.await;
            let cells = join_all(
                cells
                    .into_iter()
                    .map(|(cell_id, handle)| async move { (cell_id, handle.await) }),
            )
            .await;
            OcrOutcome { id, page, cells }
        }
        .boxed())
    }

    fn finish_job(
        &self,
        jobs: &mut [ProcessingJob],
        index: &HashMap<JobId, usize>,
        outcome: OcrOutcome,
    ) -> Result<(), ProcessingError> {
        let Some(&idx) = index.get(&outcome.id) else {
            warn!("Recognition result for unknown {}", outcome.id);
            return Ok(());
        };
        let job = &mut jobs[idx];

        let recognition = match outcome.page {
            Ok(recognition) => recognition,
            Err(OcrError::Cancelled) => {
                job.skip()?;
                self.progress
                    .record(&job.file, Outcome::Skipped, "stopped before recognition");
                return Ok(());
            }
            Err(e) => {
                return self.fail_job(
                    job,
                    PipelineStage::Recognition,
                    e.into(),
                    Some(ExtractedData::placeholder()),
                );
            }
        };

        job.begin_extraction()?;
        if let Some(table) = job.table_mut() {
            for (cell_id, result) in outcome.cells {
                let Some(cell) = table.cell_mut(cell_id) else {
                    continue;
                };
                match result {
                    Ok(r) => cell.record_recognition(r.text, r.confidence, self.options.review_threshold),
                    Err(e) => {
                        debug!("{}: cell {} not recognized: {}", outcome.id, cell_id, e);
                        cell.record_failure();
                    }
                }
            }
        }

        let data = self
            .extractor
            .extract(&recognition.text, recognition.confidence, job.table());
        let detail = format!(
            "{} fields, {} ({:.0}% confidence)",
            data.fields.filled_count(),
            data.category,
            data.confidence
        );
        job.complete(data)?;
        self.progress.record(&job.file, Outcome::Done, detail);
        Ok(())
    }

    fn fail_job(
        &self,
        job: &mut ProcessingJob,
        stage: PipelineStage,
        error: ProcessingError,
        placeholder: Option<ExtractedData>,
    ) -> Result<(), ProcessingError> {
        let error = error.in_file(job.file.clone(), stage);
        warn!("{}", error);
        job.fail(stage, &error, placeholder)?;
        self.progress
            .record(&job.file, Outcome::Failed, error.to_string());
        Ok(())
    }
}
