//! Batch dispatch of download tasks.
//!
//! The [`DownloadOrchestrator`] runs a batch sequentially, across a worker
//! pool, or through a caller-supplied [`TaskExecutor`]. Every mode yields
//! exactly one [`FetchReport`] per submitted task, tagged with the task's
//! index; completion order is unspecified outside sequential mode.
//!
//! Each job carries its own clone of the [`Session`]. A session refreshed
//! after dispatch is not seen by jobs already queued.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::Fetcher;
use super::constants::MAX_CONCURRENCY;
use super::task::{DownloadTask, FetchOutcome, FetchReport};
use crate::auth::Session;
use crate::config::ConfigError;
use crate::remediation::CorruptionReport;

/// Minimum allowed worker count.
pub const MIN_CONCURRENCY: usize = 1;

/// Error type for orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A task or the concurrency mode is misconfigured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A shared pool was used after [`WorkerPool::shutdown`].
    #[error("worker pool has been shut down")]
    PoolClosed,
}

/// Side channel for progress display. Must not influence scheduling.
pub trait ProgressSink: Send + Sync + fmt::Debug {
    /// A batch of `total` tasks is starting.
    fn start(&self, total: usize);
    /// One task finished.
    fn advance(&self, report: &FetchReport);
    /// The batch is over.
    fn finish(&self);
}

/// One task bound to the session and fetcher that will run it.
#[derive(Debug)]
pub struct FetchJob {
    index: usize,
    task: DownloadTask,
    session: Session,
    fetcher: Arc<Fetcher>,
}

impl FetchJob {
    /// Position of the task in its batch.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The task.
    #[must_use]
    pub fn task(&self) -> &DownloadTask {
        &self.task
    }

    /// Runs the fetch. Errors become [`FetchOutcome::Failed`].
    pub async fn run(self) -> FetchReport {
        let outcome = match self.fetcher.fetch(&self.task, &self.session).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(index = self.index, error = %e, "task failed");
                FetchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        FetchReport {
            index: self.index,
            url: self.task.remote_url().clone(),
            local_path: self.task.local_path().to_path_buf(),
            outcome,
        }
    }
}

/// Caller-supplied scheduler for a batch of jobs.
///
/// The orchestrator only builds the jobs and collects what the executor
/// returns; how and where jobs run is up to the implementation.
#[async_trait]
pub trait TaskExecutor: Send + Sync + fmt::Debug {
    /// Runs every job and returns their reports in any order.
    async fn execute(&self, jobs: Vec<FetchJob>) -> Vec<FetchReport>;
}

/// Executor that runs every job as its own tokio task, with no bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoinSetExecutor;

#[async_trait]
impl TaskExecutor for JoinSetExecutor {
    async fn execute(&self, jobs: Vec<FetchJob>) -> Vec<FetchReport> {
        let mut set = JoinSet::new();
        for job in jobs {
            set.spawn(job.run());
        }
        let mut reports = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "executor task did not complete"),
            }
        }
        reports
    }
}

/// How a batch is executed.
#[derive(Debug, Clone)]
pub enum Concurrency {
    /// One task at a time, in input order.
    Sequential,
    /// A pool of `n` workers created and torn down for this batch.
    Workers(usize),
    /// A caller-owned pool reused across batches; never shut down here.
    Pool(Arc<WorkerPool>),
    /// A caller-supplied executor.
    External(Arc<dyn TaskExecutor>),
}

impl Concurrency {
    /// `Sequential` for one worker, `Workers(n)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] when `n` is out of range.
    pub fn workers(n: usize) -> Result<Self, ConfigError> {
        validate_worker_count(n)?;
        Ok(if n == 1 {
            Self::Sequential
        } else {
            Self::Workers(n)
        })
    }

    /// Checks the worker count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] when out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Workers(n) => validate_worker_count(*n),
            Self::Sequential | Self::Pool(_) | Self::External(_) => Ok(()),
        }
    }

    /// Whether the batch goes to a caller-supplied executor.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

fn validate_worker_count(n: usize) -> Result<(), ConfigError> {
    if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&n) {
        Ok(())
    } else {
        Err(ConfigError::InvalidConcurrency {
            value: n,
            max: MAX_CONCURRENCY,
        })
    }
}

struct PoolJob {
    job: FetchJob,
    reply: mpsc::UnboundedSender<FetchReport>,
}

/// Fixed set of workers draining a shared job queue.
///
/// Must be created inside a tokio runtime.
pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<mpsc::UnboundedSender<PoolJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("open", &self.is_open())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `size` workers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] when `size` is out of range.
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        validate_worker_count(size)?;
        let (sender, receiver) = mpsc::unbounded_channel::<PoolJob>();
        let queue = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..size)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&queue))))
            .collect();
        debug!(size, "worker pool started");
        Ok(Self {
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the pool still accepts jobs.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs a batch of jobs, calling `on_report` as each one completes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PoolClosed`] after [`WorkerPool::shutdown`].
    pub async fn run<F>(
        &self,
        jobs: Vec<FetchJob>,
        mut on_report: F,
    ) -> Result<Vec<FetchReport>, EngineError>
    where
        F: FnMut(&FetchReport),
    {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::PoolClosed)?;

        let expected = jobs.len();
        let (reply, mut replies) = mpsc::unbounded_channel();
        for job in jobs {
            sender
                .send(PoolJob {
                    job,
                    reply: reply.clone(),
                })
                .map_err(|_| EngineError::PoolClosed)?;
        }
        drop(reply);

        let mut reports = Vec::with_capacity(expected);
        while let Some(report) = replies.recv().await {
            on_report(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// Stops accepting jobs and waits for the workers to drain and exit.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker exited abnormally");
            }
        }
        debug!(size = self.size, "worker pool stopped");
    }
}

async fn worker_loop(id: usize, queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<PoolJob>>>) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(PoolJob { job, reply }) = next else {
            break;
        };
        let index = job.index;
        let url = job.task.remote_url().clone();
        let local_path = job.task.local_path().to_path_buf();
        debug!(worker = id, index, "worker picked up task");

        // Run on its own task so a panicking fetch costs one report, not the worker.
        let report = match tokio::spawn(job.run()).await {
            Ok(report) => report,
            Err(e) => failed_report(index, url, local_path, format!("task aborted: {e}")),
        };
        let _ = reply.send(report);
    }
    debug!(worker = id, "worker stopped");
}

fn failed_report(index: usize, url: Url, local_path: PathBuf, reason: String) -> FetchReport {
    FetchReport {
        index,
        url,
        local_path,
        outcome: FetchOutcome::Failed { reason },
    }
}

/// Reports of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// One report per submitted task, in completion order.
    pub reports: Vec<FetchReport>,
}

impl BatchReport {
    /// Number of reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Reports sorted by task index.
    #[must_use]
    pub fn in_input_order(&self) -> Vec<&FetchReport> {
        let mut sorted: Vec<_> = self.reports.iter().collect();
        sorted.sort_by_key(|r| r.index);
        sorted
    }

    /// Tasks that wrote their destination.
    #[must_use]
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Written { .. }))
    }

    /// Tasks skipped because the destination existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Skipped))
    }

    /// Tasks that ended with an HTTP error or transfer failure.
    #[must_use]
    pub fn failures(&self) -> Vec<&FetchReport> {
        self.reports
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    FetchOutcome::HttpError { .. } | FetchOutcome::Failed { .. }
                )
            })
            .collect()
    }

    /// Corruption reports of downloads that failed verification.
    #[must_use]
    pub fn corrupted(&self) -> Vec<&CorruptionReport> {
        self.reports
            .iter()
            .filter_map(|r| match &r.outcome {
                FetchOutcome::Corrupted { report } => Some(report),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&FetchOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Dispatches batches of tasks.
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    fetcher: Arc<Fetcher>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator around `fetcher`.
    #[must_use]
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            progress: None,
        }
    }

    /// Attaches a progress side channel.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The fetcher every job uses.
    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Runs every task and returns one report per task.
    ///
    /// Misconfigured tasks are rejected before anything is dispatched;
    /// transfer failures and corrupt downloads are reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an invalid worker count or a
    /// cutout without region, and [`EngineError::PoolClosed`] for a shared
    /// pool that was shut down.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn run(
        &self,
        tasks: Vec<DownloadTask>,
        session: &Session,
        concurrency: &Concurrency,
    ) -> Result<BatchReport, EngineError> {
        concurrency.validate()?;
        for task in &tasks {
            task.request_url()?;
        }
        if tasks.is_empty() {
            return Ok(BatchReport::default());
        }

        let identities: Vec<(Url, PathBuf)> = tasks
            .iter()
            .map(|t| (t.remote_url().clone(), t.local_path().to_path_buf()))
            .collect();
        let jobs: Vec<FetchJob> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| FetchJob {
                index,
                task,
                session: session.clone(),
                fetcher: Arc::clone(&self.fetcher),
            })
            .collect();

        if let Some(progress) = &self.progress {
            progress.start(jobs.len());
        }
        let advance = |report: &FetchReport| {
            if let Some(progress) = &self.progress {
                progress.advance(report);
            }
        };

        let reports = match concurrency {
            Concurrency::Workers(n) if *n > 1 && jobs.len() > 1 => {
                let pool = WorkerPool::new((*n).min(jobs.len()))?;
                let result = pool.run(jobs, advance).await;
                pool.shutdown().await;
                result?
            }
            Concurrency::Sequential | Concurrency::Workers(_) => {
                let mut reports = Vec::with_capacity(jobs.len());
                for job in jobs {
                    let report = job.run().await;
                    advance(&report);
                    reports.push(report);
                }
                reports
            }
            Concurrency::Pool(pool) => pool.run(jobs, advance).await?,
            Concurrency::External(executor) => {
                let reports = executor.execute(jobs).await;
                reports.iter().for_each(advance);
                reports
            }
        };

        if let Some(progress) = &self.progress {
            progress.finish();
        }

        let batch = BatchReport {
            reports: reconcile(&identities, reports),
        };
        info!(
            total = batch.len(),
            written = batch.written(),
            skipped = batch.skipped(),
            failed = batch.failures().len(),
            corrupted = batch.corrupted().len(),
            "batch complete"
        );
        Ok(batch)
    }
}

/// Keeps exactly one report per submitted task: duplicates and unknown
/// indices are dropped, missing tasks are reported as failed.
fn reconcile(identities: &[(Url, PathBuf)], reports: Vec<FetchReport>) -> Vec<FetchReport> {
    let mut seen = HashSet::with_capacity(identities.len());
    let mut kept = Vec::with_capacity(identities.len());
    for report in reports {
        if report.index >= identities.len() || !seen.insert(report.index) {
            warn!(index = report.index, "dropping unexpected task report");
            continue;
        }
        kept.push(report);
    }
    for (index, (url, path)) in identities.iter().enumerate() {
        if !seen.contains(&index) {
            warn!(index, "task produced no report");
            kept.push(failed_report(
                index,
                url.clone(),
                path.clone(),
                "task produced no report".to_string(),
            ));
        }
    }
    kept
}
