//! Bounded worker pool that sends batches to the geocoding service
//!
//! One producer task feeds batches, in order, into a capacity-one channel and
//! closes it when done. A fixed number of worker tasks share the receiving
//! end and each loops: take the next batch, geocode it, persist the raw
//! response. Workers finish in whatever order the service answers, so artifact
//! creation order does not follow batch order.
//!
//! Under [`FailurePolicy::Abort`] the first error stops the producer and
//! signals every other worker to stop. In-flight requests are dropped, but a
//! response already being written to disk is finished first, and `dispatch`
//! only returns once every worker has exited. Under
//! [`FailurePolicy::Isolate`] the failing batch is recorded and the pool
//! carries on.
//!
//! A request the service rejects with a non-2xx status leaves its body behind
//! as a `.rejected` file in the output directory.

use crate::artifact::{Artifact, ArtifactStore};
use crate::batch::Batch;
use crate::config::FailurePolicy;
use crate::error::{GeobatchError, Result};
use crate::oracle::OracleClient;
use indicatif::{ProgressBar, ProgressStyle};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A batch that did not produce an artifact
#[derive(Debug)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub records: usize,
    pub error: GeobatchError,
}

/// Outcome of one dispatch run
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of batches handed to the pool
    pub batches: usize,
    /// Persisted artifacts, in completion order
    pub artifacts: Vec<Artifact>,
    /// Only populated under [`FailurePolicy::Isolate`]
    pub failures: Vec<BatchFailure>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.artifacts.len() == self.batches
    }
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    artifacts: Vec<Artifact>,
    failures: Vec<BatchFailure>,
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// Fans batches out to a fixed number of concurrent workers
#[derive(Debug, Clone)]
pub struct Dispatcher {
    oracle: OracleClient,
    store: ArtifactStore,
    workers: NonZeroUsize,
    policy: FailurePolicy,
    show_progress: bool,
}

impl Dispatcher {
    pub fn new(
        oracle: OracleClient,
        store: ArtifactStore,
        workers: NonZeroUsize,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            oracle,
            store,
            workers,
            policy,
            show_progress: true,
        }
    }

    /// Enable or disable the terminal progress bar.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Geocode every batch and persist each response.
    ///
    /// Returns once every worker has exited.
    pub async fn dispatch(&self, batches: Vec<Batch>) -> Result<DispatchReport> {
        let total = batches.len();
        let started = Instant::now();
        let mut report = DispatchReport {
            batches: total,
            ..DispatchReport::default()
        };

        // Created even with nothing to send so aggregation finds the directory
        self.store.ensure_dir().await?;

        if total == 0 {
            info!("No batches to dispatch");
            return Ok(report);
        }

        let progress = self.progress_bar(total as u64);
        let (sender, receiver) = mpsc::channel::<Batch>(1);
        let queue: SharedQueue = Arc::new(Mutex::new(receiver));
        let (stop, stopped) = watch::channel(false);

        info!(
            batches = total,
            workers = self.workers.get(),
            policy = %self.policy,
            url = %self.oracle.url(),
            "Dispatching batches"
        );

        let producer = tokio::spawn(async move {
            for batch in batches {
                // A closed channel means every worker is gone; stop feeding
                if sender.send(batch).await.is_err() {
                    break;
                }
            }
        });

        let mut pool = JoinSet::new();
        for worker in 0..self.workers.get() {
            let queue = Arc::clone(&queue);
            let dispatcher = self.clone();
            let progress = progress.clone();
            let stopped = stopped.clone();
            pool.spawn(async move {
                (worker, dispatcher.run_worker(worker, queue, stopped, progress).await)
            });
        }
        drop(queue);
        drop(stopped);

        let mut first_error = None;
        while let Some(joined) = pool.join_next().await {
            let failure = match joined {
                Ok((worker, Ok(outcome))) => {
                    debug!(
                        worker,
                        artifacts = outcome.artifacts.len(),
                        failures = outcome.failures.len(),
                        "Worker finished"
                    );
                    report.artifacts.extend(outcome.artifacts);
                    report.failures.extend(outcome.failures);
                    None
                },
                Ok((worker, Err(e))) => {
                    error!(worker, error = %e, "Worker failed, stopping dispatch");
                    Some(e)
                },
                Err(e) => Some(GeobatchError::TaskPanicked(e.to_string())),
            };

            if let Some(e) = failure {
                if first_error.is_none() {
                    stop.send_replace(true);
                    producer.abort();
                    progress.abandon_with_message("aborted");
                    first_error = Some(e);
                } else {
                    debug!(error = %e, "Further worker error while stopping");
                }
            }
        }

        // Every worker has exited, so the producer has returned or been cancelled
        if let Err(e) = producer.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Batch producer ended abnormally");
            }
        }

        if let Some(e) = first_error {
            warn!(
                artifacts = report.artifacts.len(),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Dispatch stopped after an error"
            );
            return Err(e);
        }

        progress.finish_with_message("done");
        info!(
            batches = total,
            artifacts = report.artifacts.len(),
            failures = report.failures.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Dispatch complete"
        );

        Ok(report)
    }

    async fn run_worker(
        &self,
        worker: usize,
        queue: SharedQueue,
        mut stopped: watch::Receiver<bool>,
        progress: ProgressBar,
    ) -> Result<WorkerOutcome> {
        let mut outcome = WorkerOutcome::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = stopped.wait_for(|stop| *stop) => break,
                // Holding the lock across recv hands each batch to exactly one worker
                next = async { queue.lock().await.recv().await } => next,
            };
            let Some(batch) = next else {
                break;
            };

            let index = batch.index;
            let records = batch.len();
            debug!(worker, batch = index, records, "Worker picked up batch");

            let response = tokio::select! {
                biased;
                _ = stopped.wait_for(|stop| *stop) => {
                    debug!(worker, batch = index, "Dropping in-flight batch");
                    break;
                },
                response = self.oracle.geocode(&batch) => response,
            };

            // Persisting is never interrupted, so no write lands after dispatch returns
            match self.persist(index, response).await {
                Ok(artifact) => outcome.artifacts.push(artifact),
                Err(e) => match self.policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Isolate => {
                        warn!(worker, batch = index, records, error = %e, "Batch failed, continuing");
                        outcome.failures.push(BatchFailure {
                            batch_index: index,
                            records,
                            error: e,
                        });
                    },
                },
            }
            progress.inc(1);
        }

        Ok(outcome)
    }

    async fn persist(&self, batch_index: usize, response: Result<Vec<u8>>) -> Result<Artifact> {
        match response {
            Ok(body) => self.store.persist(batch_index, &body).await,
            Err(e) => {
                if let GeobatchError::OracleStatus { status, body, .. } = &e {
                    match self.store.persist_rejected(batch_index, body).await {
                        Ok(path) => {
                            warn!(batch = batch_index, status = %status, path = %path.display(), "Kept rejected response")
                        },
                        Err(keep) => {
                            warn!(batch = batch_index, error = %keep, "Could not keep rejected response")
                        },
                    }
                }
                Err(e)
            },
        }
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} batches {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
