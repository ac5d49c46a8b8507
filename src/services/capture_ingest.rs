//! Capture ingestion.
//!
//! Producers hand over live outputs without waiting on the store. The write
//! happens on a spawned task; a failed write goes to a bounded retry queue
//! that a background drainer empties on a fixed interval.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Capture, CaptureConfig, QualityFlags, ScoringConfig};
use crate::domain::ports::CaptureRepository;
use crate::services::scoring::detect_quality_flags;

/// One live output as reported by a producer.
#[derive(Debug, Clone, Default)]
pub struct CaptureSubmission {
    pub input: String,
    pub output: String,
    /// Detected from the pair when the producer did not compute them.
    pub flags: Option<QualityFlags>,
    pub contract_id: Option<Uuid>,
    pub is_scheduled: bool,
}

const FLUSH_POLL: Duration = Duration::from_millis(20);

struct QueuedCapture {
    capture: Capture,
    attempts: u32,
}

/// Outcome of one retry queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub attempted: usize,
    pub stored: usize,
    pub requeued: usize,
    pub dropped: usize,
}

#[derive(Clone)]
pub struct CaptureIngest {
    repo: Arc<dyn CaptureRepository>,
    scoring: Arc<ScoringConfig>,
    config: CaptureConfig,
    queue: Arc<Mutex<VecDeque<QueuedCapture>>>,
    dropped: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
}

impl CaptureIngest {
    pub fn new(
        repo: Arc<dyn CaptureRepository>,
        scoring: ScoringConfig,
        config: CaptureConfig,
    ) -> Self {
        Self {
            repo,
            scoring: Arc::new(scoring),
            config,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            dropped: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn build(&self, submission: CaptureSubmission) -> Capture {
        let flags = submission.flags.unwrap_or_else(|| {
            detect_quality_flags(&submission.input, &submission.output, &self.scoring)
        });
        let mut capture = Capture::new(submission.input, submission.output, flags);
        capture.is_scheduled = submission.is_scheduled;
        capture.contract_id = submission.contract_id;
        capture
    }

    /// Hand a capture to the store without waiting for the write.
    ///
    /// Returns the id the capture will be stored under. Outside a tokio
    /// runtime the capture goes straight to the retry queue.
    pub fn submit(&self, submission: CaptureSubmission) -> Uuid {
        let capture = self.build(submission);
        let id = capture.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = self.clone();
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                handle.spawn(async move {
                    if let Err(e) = this.repo.insert(&capture).await {
                        tracing::warn!(
                            capture_id = %capture.id,
                            error = %e,
                            "Capture write failed, queued for retry"
                        );
                        this.enqueue(capture, 1).await;
                    }
                    this.in_flight.fetch_sub(1, Ordering::AcqRel);
                });
            }
            Err(_) => {
                if let Ok(mut queue) = self.queue.try_lock() {
                    let item = QueuedCapture {
                        capture,
                        attempts: 0,
                    };
                    push_bounded(&mut queue, item, self.config.retry_capacity, &self.dropped);
                } else {
                    tracing::error!(
                        capture_id = %id,
                        "Capture dropped: no runtime and retry queue busy"
                    );
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        id
    }

    /// Store a capture and wait for the write. Used by the CLI.
    pub async fn submit_and_wait(&self, submission: CaptureSubmission) -> DomainResult<Capture> {
        let capture = self.build(submission);
        self.repo.insert(&capture).await?;
        tracing::debug!(
            capture_id = %capture.id,
            flagged = capture.quality_flags.any(),
            "Capture stored"
        );
        Ok(capture)
    }

    async fn enqueue(&self, capture: Capture, attempts: u32) {
        let mut queue = self.queue.lock().await;
        push_bounded(
            &mut queue,
            QueuedCapture { capture, attempts },
            self.config.retry_capacity,
            &self.dropped,
        );
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Captures lost to a full queue or exhausted retries since start.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Retry every queued capture once.
    pub async fn drain(&self) -> DrainSummary {
        let batch: Vec<QueuedCapture> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        let mut summary = DrainSummary {
            attempted: batch.len(),
            ..Default::default()
        };

        for mut item in batch {
            match self.repo.insert(&item.capture).await {
                Ok(()) => summary.stored += 1,
                Err(e) => {
                    item.attempts += 1;
                    if item.attempts >= self.config.max_retries {
                        tracing::error!(
                            capture_id = %item.capture.id,
                            attempts = item.attempts,
                            error = %e,
                            "Capture dropped after exhausting retries"
                        );
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        summary.dropped += 1;
                    } else {
                        self.enqueue(item.capture, item.attempts).await;
                        summary.requeued += 1;
                    }
                }
            }
        }

        if summary.attempted > 0 {
            tracing::info!(
                attempted = summary.attempted,
                stored = summary.stored,
                requeued = summary.requeued,
                dropped = summary.dropped,
                "Capture retry queue drained"
            );
        }
        summary
    }

    /// Wait for spawned writes to settle, then drain until the queue is empty.
    ///
    /// Every submitted capture is either stored or dropped when this returns.
    pub async fn flush(&self) -> DrainSummary {
        while self.in_flight.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(FLUSH_POLL).await;
        }
        let mut total = DrainSummary::default();
        while self.queue_len().await > 0 {
            let pass = self.drain().await;
            total.attempted += pass.attempted;
            total.stored += pass.stored;
            total.dropped += pass.dropped;
            total.requeued = pass.requeued;
            if pass.requeued > 0 {
                tokio::time::sleep(FLUSH_POLL).await;
            }
        }
        total
    }

    /// Delete unpromoted captures past their retention window.
    pub async fn prune(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let clean_before = now - chrono::Duration::days(self.config.clean_retention_days);
        let flagged_before = now - chrono::Duration::days(self.config.flagged_retention_days);
        let deleted = self.repo.prune(clean_before, flagged_before).await?;
        tracing::info!(deleted, %clean_before, %flagged_before, "Pruned captures");
        Ok(deleted)
    }

    /// Drain the retry queue on the configured interval until stopped.
    pub fn spawn_drainer(&self) -> DrainerHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let period = Duration::from_secs(self.config.retry_interval_secs.max(1));
        let this = self.clone();
        let flag = stop_flag.clone();
        let join = tokio::spawn(async move {
            let mut timer = interval(period);
            // First tick completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                this.drain().await;
            }
            tracing::debug!("Capture retry drainer stopped");
        });
        DrainerHandle { stop_flag, join }
    }
}

fn push_bounded(
    queue: &mut VecDeque<QueuedCapture>,
    item: QueuedCapture,
    capacity: usize,
    dropped: &AtomicU64,
) {
    while capacity > 0 && queue.len() >= capacity {
        if let Some(oldest) = queue.pop_front() {
            tracing::warn!(
                capture_id = %oldest.capture.id,
                "Retry queue full, dropping oldest capture"
            );
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
    if capacity > 0 {
        queue.push_back(item);
    }
}

/// Handle to stop the background drainer.
pub struct DrainerHandle {
    stop_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl DrainerHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Stop the drainer and wait for its task to end.
    pub async fn shutdown(self) {
        self.stop();
        self.join.abort();
        let _ = self.join.await;
    }
}
