//! Observable batch progress: stage label, percent, throughput and a
//! rolling per-file outcome log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::watch;

/// Entries kept in the rolling outcome log
pub const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub file: String,
    pub outcome: Outcome,
    pub detail: String,
}

/// Point-in-time view handed to presentation layers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: String,
    pub total: usize,
    pub finished: usize,
    /// In [0, 100]
    pub percent: f32,
    pub files_per_sec: f64,
    pub elapsed_secs: f64,
    pub log: VecDeque<LogEntry>,
}

/// Publishes [`ProgressSnapshot`]s over a watch channel
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<ProgressSnapshot>,
    started: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        Self {
            tx,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    /// Start a new run over `total` files
    pub fn reset(&mut self, total: usize) {
        self.started = Instant::now();
        self.tx.send_modify(|s| {
            *s = ProgressSnapshot {
                stage: "Starting".to_string(),
                total,
                ..ProgressSnapshot::default()
            };
        });
    }

    pub fn set_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        self.tx.send_modify(|s| s.stage = stage);
    }

    /// Record a file reaching a terminal outcome
    pub fn record(&self, file: &str, outcome: Outcome, detail: impl Into<String>) {
        let entry = LogEntry {
            at: Utc::now(),
            file: file.to_string(),
            outcome,
            detail: detail.into(),
        };
        let elapsed = self.started.elapsed().as_secs_f64();
        self.tx.send_modify(|s| {
            if s.log.len() == LOG_CAPACITY {
                s.log.pop_front();
            }
            s.log.push_back(entry);
            s.finished += 1;
            s.percent = if s.total == 0 {
                100.0
            } else {
                (s.finished as f32 / s.total as f32 * 100.0).min(100.0)
            };
            s.elapsed_secs = elapsed;
        });
    }

    /// Recompute throughput from completed work so far
    pub fn update_throughput(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut rate = 0.0;
        self.tx.send_modify(|s| {
            s.elapsed_secs = elapsed;
            s.files_per_sec = if elapsed > 0.0 {
                s.finished as f64 / elapsed
            } else {
                0.0
            };
            rate = s.files_per_sec;
        });
        rate
    }
}
