//! End-to-end batch runs with scripted preprocessing and recognition.

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat};
use landrec_common::{BoundingBox, CellData, FieldKind, PipelineStage, TableStructure};
use landrec_extraction::FieldExtractor;
use landrec_ocr::{
    OcrDispatchPool, OcrError, Recognition, RecognitionEngine, RecognitionMode,
};
use landrec_orchestrator::{
    commit_records, AdmittedFile, BatchOptions, BatchOrchestrator, CorrectionSession, InputFormat,
    JobState, MemorySink,
};
use landrec_preprocess::{PagePreprocessor, PreprocessError, PreprocessOptions, PreprocessOutput, QualityMetrics};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

type Respond = fn(u32, RecognitionMode) -> Result<Recognition, OcrError>;

/// Engine that waits for a permit per job, then answers from the image width
struct GatedEngine {
    gate: Arc<Semaphore>,
    respond: Respond,
    modes: Arc<Mutex<Vec<RecognitionMode>>>,
}

#[async_trait]
impl RecognitionEngine for GatedEngine {
    async fn initialize(&mut self) -> Result<(), OcrError> {
        Ok(())
    }

    async fn recognize(
        &mut self,
        image: Arc<DynamicImage>,
        mode: RecognitionMode,
    ) -> Result<Recognition, OcrError> {
        self.gate
            .acquire()
            .await
            .map_err(|e| OcrError::RecognitionError(e.to_string()))?
            .forget();
        self.modes.lock().unwrap().push(mode);
        (self.respond)(image.width(), mode)
    }
}

fn survey_from_width(width: u32, _mode: RecognitionMode) -> Result<Recognition, OcrError> {
    if width == 12 {
        return Err(OcrError::RecognitionError("unreadable page".to_string()));
    }
    Ok(Recognition::new(format!("Survey No: {width}/1"), 85.0))
}

fn table_cells(width: u32, _mode: RecognitionMode) -> Result<Recognition, OcrError> {
    match width {
        80 => Ok(Recognition::new("Survey No", 95.0)),
        60 => Ok(Recognition::new("45/Z", 40.0)),
        _ => Ok(Recognition::new("பட்டா\nno labels on this page", 70.0)),
    }
}

async fn start_pool(
    gate: &Arc<Semaphore>,
    respond: Respond,
    size: usize,
) -> (OcrDispatchPool, Arc<Mutex<Vec<RecognitionMode>>>) {
    let modes = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::clone(gate);
    let recorded = Arc::clone(&modes);
    let factory = move |_id: usize| -> Box<dyn RecognitionEngine> {
        Box::new(GatedEngine {
            gate: Arc::clone(&gate),
            respond,
            modes: Arc::clone(&recorded),
        })
    };
    let pool = OcrDispatchPool::start(&factory, size).await.unwrap();
    (pool, modes)
}

/// Passes pages through unchanged while recording concurrency
#[derive(Default)]
struct RecordingPreprocessor {
    active: AtomicUsize,
    peak: AtomicUsize,
    entered: Mutex<Vec<u32>>,
    delay: Duration,
    fail_width: Option<u32>,
    with_table: bool,
}

impl RecordingPreprocessor {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn entered(&self) -> Vec<u32> {
        self.entered.lock().unwrap().clone()
    }
}

impl PagePreprocessor for RecordingPreprocessor {
    fn preprocess(
        &self,
        page: &DynamicImage,
        _options: &PreprocessOptions,
    ) -> Result<PreprocessOutput, PreprocessError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entered.lock().unwrap().push(page.width());
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if Some(page.width()) == self.fail_width {
            return Err(PreprocessError::Transform("corrupt scan".to_string()));
        }
        let table = self.with_table.then(|| {
            TableStructure::from_cells([
                CellData::new(1, BoundingBox::new(0, 0, 80, 30), GrayImage::new(80, 30)),
                CellData::new(2, BoundingBox::new(100, 2, 60, 30), GrayImage::new(60, 30)),
            ])
        });
        Ok(PreprocessOutput {
            image: page.clone(),
            steps: Vec::new(),
            metrics: QualityMetrics::default(),
            table,
        })
    }
}

fn png(width: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::new_luma8(width, 8)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// `fileN.png` is a page `10 + N` pixels wide
fn files(n: u32) -> Vec<AdmittedFile> {
    (0..n)
        .map(|i| AdmittedFile {
            name: format!("file{i}.png"),
            format: InputFormat::Png,
            bytes: png(10 + i),
        })
        .collect()
}

fn options(batch_size: usize) -> BatchOptions {
    BatchOptions {
        batch_size,
        ..BatchOptions::default()
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_six_files_pool_of_four_batch_of_four() {
    let gate = Arc::new(Semaphore::new(0));
    let (pool, _) = start_pool(&gate, survey_from_width, 4).await;
    let preprocessor = Arc::new(RecordingPreprocessor {
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let mut orchestrator = BatchOrchestrator::new(
        preprocessor.clone(),
        pool.clone(),
        FieldExtractor::default(),
        options(4),
    );
    let progress = orchestrator.progress();
    let run = tokio::spawn(async move { orchestrator.run(files(6)).await });

    // first group preprocessed together, then 4 workers busy and 2 queued
    wait_for(|| {
        let stats = pool.stats();
        stats.busy == 4 && stats.queued == 2
    })
    .await;
    let entered = preprocessor.entered();
    let first_group: HashSet<u32> = entered[..4].iter().copied().collect();
    assert_eq!(first_group, (10..14).collect());
    assert_eq!(preprocessor.peak(), 4);

    gate.add_permits(6);
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.jobs.len(), 6);
    assert_eq!(report.done(), 6);
    for (i, job) in report.jobs.iter().enumerate() {
        assert_eq!(job.file, format!("file{i}.png"));
        let expected = format!("{}/1", 10 + i);
        let data = job.extracted().unwrap();
        assert_eq!(data.fields.get(FieldKind::SurveyNumber), Some(expected.as_str()));
    }
    assert_eq!(pool.stats().completed, 6);
    assert_eq!(progress.borrow().finished, 6);
    assert_eq!(progress.borrow().percent, 100.0);
    assert!(!report.stopped);

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_skips_queued_jobs_and_keeps_in_flight_results() {
    let gate = Arc::new(Semaphore::new(0));
    let (pool, _) = start_pool(&gate, survey_from_width, 2).await;
    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(RecordingPreprocessor::default()),
        pool.clone(),
        FieldExtractor::default(),
        options(4),
    );
    let stop = orchestrator.stop_handle();
    let run = tokio::spawn(async move { orchestrator.run(files(6)).await });

    wait_for(|| {
        let stats = pool.stats();
        stats.busy == 2 && stats.queued == 4
    })
    .await;
    stop.stop();
    wait_for(|| pool.stats().cancelled == 4).await;
    gate.add_permits(2);

    let report = run.await.unwrap().unwrap();
    assert!(report.stopped);
    assert_eq!(report.done(), 2);
    assert_eq!(report.skipped(), 4);
    assert!(matches!(report.jobs[0].state(), JobState::Done { .. }));
    assert!(matches!(report.jobs[1].state(), JobState::Done { .. }));
    for job in &report.jobs[2..] {
        assert_eq!(job.state(), &JobState::Skipped);
    }

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_during_preprocessing_skips_later_groups() {
    let gate = Arc::new(Semaphore::new(0));
    let (pool, _) = start_pool(&gate, survey_from_width, 2).await;
    let preprocessor = Arc::new(RecordingPreprocessor {
        delay: Duration::from_millis(300),
        ..Default::default()
    });
    let mut orchestrator = BatchOrchestrator::new(
        preprocessor.clone(),
        pool.clone(),
        FieldExtractor::default(),
        options(2),
    );
    let progress = orchestrator.progress();
    let stop = orchestrator.stop_handle();
    let run = tokio::spawn(async move { orchestrator.run(files(6)).await });

    // group 1 is recognizing while group 2 is still being preprocessed
    wait_for(|| pool.stats().busy == 2 && preprocessor.entered().len() == 4).await;
    stop.stop();
    gate.add_permits(2);

    let report = run.await.unwrap().unwrap();
    assert!(report.stopped);
    assert_eq!(report.done(), 2);
    assert_eq!(report.skipped(), 4);
    for (i, job) in report.jobs[..2].iter().enumerate() {
        let expected = format!("{}/1", 10 + i);
        let data = job.extracted().unwrap();
        assert_eq!(data.fields.get(FieldKind::SurveyNumber), Some(expected.as_str()));
    }
    for job in &report.jobs[2..] {
        assert_eq!(job.state(), &JobState::Skipped);
    }

    // group 3 never reached the preprocessor, group 2 never reached the pool
    assert_eq!(preprocessor.entered().len(), 4);
    assert_eq!(pool.stats().completed, 2);
    let log = progress.borrow().log.clone();
    let detail = |d: &str| log.iter().filter(|e| e.detail == d).count();
    assert_eq!(detail("stopped before recognition"), 2);
    assert_eq!(detail("stopped by operator"), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_stop_only_applies_to_current_run() {
    let gate = Arc::new(Semaphore::new(100));
    let (pool, _) = start_pool(&gate, survey_from_width, 1).await;
    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(RecordingPreprocessor::default()),
        pool.clone(),
        FieldExtractor::default(),
        options(4),
    );

    orchestrator.stop_handle().stop();
    let stopped = orchestrator.run(files(1)).await.unwrap();
    assert!(stopped.stopped);
    assert_eq!(stopped.skipped(), 1);
    assert!(!orchestrator.stop_handle().is_stopped());

    let report = orchestrator.run(files(1)).await.unwrap();
    assert!(!report.stopped);
    assert_eq!(report.done(), 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_failures_are_isolated_per_file() {
    let gate = Arc::new(Semaphore::new(100));
    let (pool, _) = start_pool(&gate, survey_from_width, 2).await;
    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(RecordingPreprocessor {
            fail_width: Some(11),
            ..Default::default()
        }),
        pool.clone(),
        FieldExtractor::default(),
        options(2),
    );

    let report = orchestrator.run(files(4)).await.unwrap();
    assert_eq!(report.done(), 2);
    assert_eq!(report.failed(), 2);

    match report.jobs[1].state() {
        JobState::Failed {
            stage,
            cause,
            placeholder,
        } => {
            assert_eq!(*stage, PipelineStage::Preprocessing);
            assert!(cause.contains("file1.png"));
            assert!(cause.contains("corrupt scan"));
            assert!(placeholder.is_none());
        }
        other => panic!("unexpected state {other}"),
    }

    // recognition failures keep a zero-confidence placeholder for review
    match report.jobs[2].state() {
        JobState::Failed {
            stage, placeholder, ..
        } => {
            assert_eq!(*stage, PipelineStage::Recognition);
            let placeholder = placeholder.as_ref().unwrap();
            assert!(placeholder.is_placeholder());
            assert_eq!(placeholder.confidence, 0.0);
        }
        other => panic!("unexpected state {other}"),
    }
    let review: Vec<&str> = report.needs_review().iter().map(|j| j.file.as_str()).collect();
    assert_eq!(review, vec!["file2.png"]);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_cells_recognized_corrected_and_committed() {
    let gate = Arc::new(Semaphore::new(100));
    let (pool, modes) = start_pool(&gate, table_cells, 2).await;
    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(RecordingPreprocessor {
            with_table: true,
            ..Default::default()
        }),
        pool.clone(),
        FieldExtractor::default(),
        options(4),
    );

    let mut report = orchestrator.run(files(1)).await.unwrap();
    assert_eq!(report.done(), 1);

    let recorded = modes.lock().unwrap().clone();
    assert_eq!(recorded.len(), 3);
    assert_eq!(
        recorded
            .iter()
            .filter(|m| **m == RecognitionMode::UniformBlock)
            .count(),
        2
    );

    let job = &report.jobs[0];
    let table = job.table().unwrap();
    assert!(!table.cell(1).unwrap().needs_review);
    assert!(table.cell(2).unwrap().needs_review);
    let data = job.extracted().unwrap();
    assert_eq!(data.fields.get(FieldKind::SurveyNumber), Some("45/Z"));
    assert_eq!(report.needs_review().len(), 1);

    {
        let (table, data) = report.jobs[0].review_parts().unwrap();
        let mut session = CorrectionSession::with_extracted(table, data);
        assert!(session.apply(2, "45/2").unwrap());
        assert!(session.pending().is_empty());
    }
    assert!(report.needs_review().is_empty());

    let sink = MemorySink::new();
    let outcomes = commit_records(&sink, &report.jobs).await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].error.is_none());
    assert_eq!(
        sink.records()[0].fields.get(FieldKind::SurveyNumber),
        Some("45/2")
    );

    pool.shutdown().await;
}

#[tokio::test]
async fn test_admission_rejects_before_jobs_exist() {
    let gate = Arc::new(Semaphore::new(100));
    let (pool, _) = start_pool(&gate, survey_from_width, 1).await;
    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(RecordingPreprocessor::default()),
        pool.clone(),
        FieldExtractor::default(),
        options(4),
    );

    let report = orchestrator
        .process_bytes(vec![
            ("tiny.png".to_string(), png(10)),
            ("notes.txt".to_string(), vec![b'a'; 20_000]),
        ])
        .await
        .unwrap();
    assert!(report.jobs.is_empty());
    assert_eq!(report.rejected.len(), 2);
    assert!(report.rejected[0].reason.contains("too small"));
    assert!(report.rejected[1].reason.contains("unsupported file type"));

    pool.shutdown().await;
}
