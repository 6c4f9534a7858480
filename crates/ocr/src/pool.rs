//! Fixed-size worker pool with a FIFO job queue.

use crate::engine::{EngineFactory, Recognition, RecognitionEngine, RecognitionMode};
use crate::OcrError;
use futures::future::join_all;
use futures::FutureExt;
use image::DynamicImage;
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

/// Number of workers when none is configured
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Identifier of a submitted job, unique within one pool
pub type Ticket = u64;

/// Image to recognize plus the engine mode to use
#[derive(Debug, Clone)]
pub struct OcrRequest {
    /// Shown in logs, usually the file name and cell id
    pub label: String,
    pub image: Arc<DynamicImage>,
    pub mode: RecognitionMode,
}

impl OcrRequest {
    #[must_use]
    pub fn new(label: impl Into<String>, image: Arc<DynamicImage>, mode: RecognitionMode) -> Self {
        Self {
            label: label.into(),
            image,
            mode,
        }
    }
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Live workers
    pub size: usize,
    pub busy: usize,
    pub idle: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

type Reply = oneshot::Sender<Result<Recognition, OcrError>>;

struct QueuedJob {
    ticket: Ticket,
    request: OcrRequest,
    reply: Reply,
}

struct Worker {
    id: usize,
    engine: Box<dyn RecognitionEngine>,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Worker>,
    queue: VecDeque<QueuedJob>,
    busy: usize,
    closed: bool,
    next_ticket: Ticket,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

struct Shared {
    size: usize,
    state: Mutex<PoolState>,
    released: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves to the recognition result of one submitted job
#[derive(Debug)]
pub struct OcrHandle {
    ticket: Ticket,
    rx: oneshot::Receiver<Result<Recognition, OcrError>>,
}

impl OcrHandle {
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }
}

impl Future for OcrHandle {
    type Output = Result<Recognition, OcrError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // a dropped sender means the job was discarded at shutdown
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(OcrError::PoolClosed)))
    }
}

/// Bounded pool of recognition engines.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct OcrDispatchPool {
    shared: Arc<Shared>,
}

impl OcrDispatchPool {
    /// Create and initialize `size` engines.
    ///
    /// Workers whose engine fails to initialize are dropped; if none
    /// survive, the pool cannot run and [`OcrError::PoolUnavailable`] is
    /// returned.
    pub async fn start(factory: &dyn EngineFactory, size: usize) -> Result<Self, OcrError> {
        let size = size.max(1);
        let inits = (0..size).map(|id| async move {
            let mut engine = factory.create(id);
            match engine.initialize().await {
                Ok(()) => Some(Worker { id, engine }),
                Err(e) => {
                    warn!("OCR worker {} failed to initialize: {}", id, e);
                    None
                }
            }
        });
        let workers: Vec<Worker> = join_all(inits).await.into_iter().flatten().collect();

        if workers.is_empty() {
            return Err(OcrError::PoolUnavailable(format!(
                "all {} workers failed to initialize",
                size
            )));
        }
        info!("OCR pool started with {}/{} workers", workers.len(), size);

        let state = PoolState {
            idle: workers,
            ..PoolState::default()
        };
        let live = state.idle.len();
        Ok(Self {
            shared: Arc::new(Shared {
                size: live,
                state: Mutex::new(state),
                released: Notify::new(),
            }),
        })
    }

    /// Number of live workers
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Queue a job. An idle worker picks it up immediately; otherwise it
    /// waits behind earlier submissions.
    pub fn submit(&self, request: OcrRequest) -> Result<OcrHandle, OcrError> {
        let (reply, rx) = oneshot::channel();
        let mut state = self.shared.lock();
        if state.closed {
            return Err(OcrError::PoolClosed);
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let job = QueuedJob {
            ticket,
            request,
            reply,
        };

        let idle = state.idle.pop();
        match idle {
            Some(worker) => {
                state.busy += 1;
                drop(state);
                tokio::spawn(run_worker(Arc::clone(&self.shared), worker, job));
            }
            None => {
                debug!("OCR job {} queued ({} waiting)", ticket, state.queue.len() + 1);
                state.queue.push_back(job);
            }
        }
        Ok(OcrHandle { ticket, rx })
    }

    /// Remove the given jobs if they are still queued; in-flight jobs are
    /// unaffected. Returns how many were removed.
    pub fn cancel(&self, tickets: &[Ticket]) -> usize {
        let mut state = self.shared.lock();
        let (removed, kept): (Vec<_>, Vec<_>) = state
            .queue
            .drain(..)
            .partition(|job| tickets.contains(&job.ticket));
        state.queue = kept.into();
        state.cancelled += removed.len() as u64;
        drop(state);
        reject_all(removed, || OcrError::Cancelled)
    }

    /// Remove every queued job
    pub fn cancel_pending(&self) -> usize {
        let mut state = self.shared.lock();
        let removed: Vec<_> = state.queue.drain(..).collect();
        state.cancelled += removed.len() as u64;
        drop(state);
        reject_all(removed, || OcrError::Cancelled)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            size: self.shared.size,
            busy: state.busy,
            idle: state.idle.len(),
            queued: state.queue.len(),
            completed: state.completed,
            failed: state.failed,
            cancelled: state.cancelled,
        }
    }

    /// Stop accepting jobs, reject queued ones, wait for in-flight jobs and
    /// terminate every engine
    pub async fn shutdown(&self) {
        let discarded: Vec<_> = {
            let mut state = self.shared.lock();
            state.closed = true;
            let queued: Vec<_> = state.queue.drain(..).collect();
            state.cancelled += queued.len() as u64;
            queued
        };
        reject_all(discarded, || OcrError::PoolClosed);

        loop {
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if self.shared.lock().busy == 0 {
                break;
            }
            released.await;
        }

        let workers = std::mem::take(&mut self.shared.lock().idle);
        for mut worker in workers {
            if let Err(e) = worker.engine.terminate().await {
                warn!("OCR worker {} failed to terminate: {}", worker.id, e);
            }
        }
        info!("OCR pool shut down");
    }
}

fn reject_all(jobs: Vec<QueuedJob>, err: impl Fn() -> OcrError) -> usize {
    let count = jobs.len();
    for job in jobs {
        debug!("OCR job {} ({}) removed from queue", job.ticket, job.request.label);
        let _ = job.reply.send(Err(err()));
    }
    count
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run `job`, then keep pulling from the queue head until it is empty
async fn run_worker(shared: Arc<Shared>, mut worker: Worker, mut job: QueuedJob) {
    loop {
        let QueuedJob {
            ticket,
            request,
            reply,
        } = job;
        debug!(
            "OCR job {} ({}) running on worker {} in {} mode",
            ticket, request.label, worker.id, request.mode
        );

        let outcome = AssertUnwindSafe(worker.engine.recognize(request.image, request.mode))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(OcrError::EnginePanicked(panic_message(&*payload))),
        };
        let succeeded = result.is_ok();
        if let Err(e) = &result {
            warn!(
                "OCR job {} ({}) failed on worker {}: {}",
                ticket, request.label, worker.id, e
            );
        }

        job = {
            let mut state = shared.lock();
            if succeeded {
                state.completed += 1;
            } else {
                state.failed += 1;
            }
            let next = state.queue.pop_front();
            match next {
                Some(next) => next,
                None => {
                    state.busy -= 1;
                    state.idle.push(worker);
                    drop(state);
                    let _ = reply.send(result);
                    shared.released.notify_waiters();
                    return;
                }
            }
        };
        // the caller may have stopped waiting
        let _ = reply.send(result);
    }
}
