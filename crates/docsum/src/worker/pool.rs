use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::WorkerConfig;
use crate::error::{SummarizeError, WorkerError};
use crate::summarize::Summarizer;
use crate::worker::job::{JobOutcome, SummaryJob};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Fixed set of OS threads summarising queued documents.
///
/// Jobs go through a bounded queue; a full queue is reported to the caller
/// instead of blocking. Each finished job produces one [`JobOutcome`].
pub struct SummaryPool {
    job_sender: Sender<SummaryJob>,
    job_receiver: Receiver<SummaryJob>,
    outcome_sender: UnboundedSender<JobOutcome>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl SummaryPool {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        config: &WorkerConfig,
        outcome_sender: UnboundedSender<JobOutcome>,
    ) -> Result<Self, WorkerError> {
        if config.worker_count == 0 || config.queue_capacity == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count and queue_capacity must be > 0".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<SummaryJob>(config.queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let max_attempts = config.max_attempts.max(1);

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let job_rx = job_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_summarizer = Arc::clone(&summarizer);

            let handle = thread::Builder::new()
                .name(format!("summary-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        outcome_tx,
                        shutdown_flag,
                        worker_summarizer,
                        max_attempts,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!(
            "Started {} summary workers (queue capacity {})",
            config.worker_count, config.queue_capacity
        );

        Ok(Self {
            job_sender,
            job_receiver,
            outcome_sender,
            workers: Mutex::new(workers),
            shutdown,
        })
    }

    /// Queues `job` without blocking.
    pub fn try_submit(&self, job: SummaryJob) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        match self.job_sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!("Summary queue full, rejecting document {}", job.document_id);
                Err(WorkerError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.job_sender.len()
    }

    pub fn shutdown(&self) {
        info!("Shutting down summary workers...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Joins the workers after [`SummaryPool::shutdown`]. Jobs still queued are
    /// reported as failed so their documents do not stay in `processing`.
    pub fn wait(&self) {
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        let mut abandoned = 0;
        while let Ok(job) = self.job_receiver.try_recv() {
            abandoned += 1;
            let _ = self.outcome_sender.send(JobOutcome::failure(
                job.document_id,
                0,
                "service shut down before the summary was generated",
            ));
        }
        if abandoned > 0 {
            warn!("Abandoned {} queued summary jobs", abandoned);
        }

        info!("All summary workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<SummaryJob>,
    outcome_sender: UnboundedSender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    summarizer: Arc<dyn Summarizer>,
    max_attempts: u32,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                let span = tracing::info_span!(
                    "summary_job",
                    worker = worker_id,
                    document_id = %job.document_id
                );
                let _entered = span.enter();

                let outcome = process_job(summarizer.as_ref(), job, max_attempts);
                if outcome.is_success() {
                    info!(
                        "Summarized document {} after {} attempt(s)",
                        outcome.document_id, outcome.attempts
                    );
                }
                if outcome_sender.send(outcome).is_err() {
                    error!("Worker {} outcome channel closed", worker_id);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs `job` up to `max_attempts` times. Invalid options are not retried.
pub fn process_job(summarizer: &dyn Summarizer, job: SummaryJob, max_attempts: u32) -> JobOutcome {
    let mut attempts = 0;

    loop {
        attempts += 1;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            summarizer.summarize(&job.text, &job.options)
        }))
        .unwrap_or_else(|_| Err(SummarizeError::Task("summarizer panicked".to_string())));

        match result {
            Ok(summary) => return JobOutcome::success(job.document_id, attempts, summary),
            Err(e @ SummarizeError::InvalidOptions(_)) => {
                return JobOutcome::failure(job.document_id, attempts, e.to_string());
            }
            Err(e) if attempts < max_attempts => {
                warn!(
                    "Summary attempt {}/{} for {} failed: {}",
                    attempts, max_attempts, job.document_id, e
                );
                thread::sleep(RETRY_DELAY * attempts);
            }
            Err(e) => {
                error!(
                    "Giving up on document {} after {} attempt(s): {}",
                    job.document_id, attempts, e
                );
                return JobOutcome::failure(job.document_id, attempts, e.to_string());
            }
        }
    }
}
