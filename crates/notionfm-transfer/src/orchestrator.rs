//! Upload orchestrator - a fixed pool of workers over a shared queue
//!
//! ## Flow
//!
//! ```text
//! paths ──→ ChunkPlanner ──→ VecDeque<QueuedTask> ──→ worker 1..N ──→ UploadSession
//!              │                                         │
//!        Failed result                         TaskSnapshot (watch) + TransferTotals
//! ```
//!
//! Each worker pops one task, runs its session to a terminal status and loops
//! until the queue is empty or [`UploadOrchestrator::stop`] was called. The
//! stop flag is only read between files; uploads in flight finish normally
//! and tasks still queued end as `Failed("cancelled")`.
//!
//! Per-task state is published through a `watch` channel written only by the
//! worker that owns the task. Aggregate counters live under one lock.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use notionfm_core::config::UploadConfig;
use notionfm_core::domain::{FileUploadSpec, PageId, PartPlan, TaskStatus, UploadProgress};
use notionfm_core::ports::IRemoteStore;

use crate::planner::ChunkPlanner;
use crate::session::{ProgressCallback, SessionOptions, UploadOutcome, UploadSession};
use crate::TransferError;

/// Identifier of one submitted file, increasing in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Read-only view of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub path: PathBuf,
    pub status: TaskStatus,
    /// Last progress event, once the task has started
    pub progress: Option<UploadProgress>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    fn pending(task_id: TaskId, path: &Path) -> Self {
        Self {
            task_id,
            path: path.to_path_buf(),
            status: TaskStatus::Pending,
            progress: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Aggregate counters across every submitted file
#[derive(Debug, Clone, Default)]
pub struct TransferTotals {
    pub total_files: u64,
    pub completed: u64,
    pub failed: u64,
    /// Bytes confirmed by the remote across all files
    pub bytes_transferred: u64,
    pub in_flight: u32,
    pub peak_in_flight: u32,
    started: Option<Instant>,
    finished: Option<Instant>,
}

impl TransferTotals {
    /// Time since the first submission, frozen once all work is done
    pub fn elapsed(&self) -> Duration {
        match (self.started, self.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Bytes per second over [`elapsed`](Self::elapsed)
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }

    /// Files that reached a terminal status
    pub fn finished_files(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Terminal result of one submitted file
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub task_id: TaskId,
    pub path: PathBuf,
    pub status: TaskStatus,
    pub outcome: Option<UploadOutcome>,
    /// Last error message for failed files
    pub error: Option<String>,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    fn failed(task_id: TaskId, path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            task_id,
            path,
            status: TaskStatus::Failed,
            outcome: None,
            error: Some(error.into()),
        }
    }
}

/// A planned file waiting for a worker
struct QueuedTask {
    id: TaskId,
    spec: FileUploadSpec,
    plan: PartPlan,
    snapshot: Arc<watch::Sender<TaskSnapshot>>,
}

/// State shared by every worker of one submission
#[derive(Clone)]
struct WorkerContext {
    remote: Arc<dyn IRemoteStore>,
    options: SessionOptions,
    destination: PageId,
    queue: Arc<Mutex<VecDeque<QueuedTask>>>,
    stop: Arc<AtomicBool>,
    totals: Arc<Mutex<TransferTotals>>,
    on_progress: Option<ProgressCallback>,
}

/// Uploads many files with a bounded number of concurrent sessions
pub struct UploadOrchestrator {
    remote: Arc<dyn IRemoteStore>,
    planner: ChunkPlanner,
    options: SessionOptions,
    stop: Arc<AtomicBool>,
    totals: Arc<Mutex<TransferTotals>>,
    tasks: Mutex<HashMap<TaskId, watch::Receiver<TaskSnapshot>>>,
    next_id: AtomicU64,
    on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("planner", &self.planner)
            .field("options", &self.options)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl UploadOrchestrator {
    pub fn new(remote: Arc<dyn IRemoteStore>, planner: ChunkPlanner, options: SessionOptions) -> Self {
        Self {
            remote,
            planner,
            options,
            stop: Arc::new(AtomicBool::new(false)),
            totals: Arc::new(Mutex::new(TransferTotals::default())),
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            on_progress: None,
        }
    }

    pub fn from_config(remote: Arc<dyn IRemoteStore>, config: &UploadConfig) -> Self {
        Self::new(
            remote,
            ChunkPlanner::new(config.part_limits()),
            SessionOptions::from_config(config),
        )
    }

    /// Forwards every progress event of every file to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Uploads `paths` to `destination` with `concurrency` workers
    ///
    /// Files that fail planning are reported as failed without any request.
    /// One file failing never stops the others. Results come back in
    /// submission order.
    pub async fn submit(
        &self,
        paths: Vec<PathBuf>,
        destination: &PageId,
        concurrency: usize,
    ) -> Vec<UploadResult> {
        self.mark_started(paths.len() as u64);

        let mut results = Vec::with_capacity(paths.len());
        let mut queue = VecDeque::new();
        for path in paths {
            let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let (tx, rx) = watch::channel(TaskSnapshot::pending(id, &path));
            self.tasks.lock().unwrap().insert(id, rx);

            match self.planner.plan(&path).await {
                Ok((spec, plan)) => queue.push_back(QueuedTask {
                    id,
                    spec,
                    plan,
                    snapshot: Arc::new(tx),
                }),
                Err(err) => {
                    warn!(task = %id, path = %path.display(), error = %err, "Rejected before upload");
                    let message = err.to_string();
                    tx.send_modify(|s| {
                        s.status = TaskStatus::Failed;
                        s.error = Some(message.clone());
                        s.finished_at = Some(Utc::now());
                    });
                    self.totals.lock().unwrap().failed += 1;
                    results.push(UploadResult::failed(id, path, message));
                }
            }
        }

        let workers = concurrency.max(1).min(queue.len());
        info!(
            queued = queue.len(),
            rejected = results.len(),
            workers,
            destination = %destination,
            "Starting uploads"
        );

        let planned: Vec<(TaskId, PathBuf)> = queue
            .iter()
            .map(|t| (t.id, t.spec.path().to_path_buf()))
            .collect();
        let ctx = WorkerContext {
            remote: self.remote.clone(),
            options: self.options.clone(),
            destination: destination.clone(),
            queue: Arc::new(Mutex::new(queue)),
            stop: self.stop.clone(),
            totals: self.totals.clone(),
            on_progress: self.on_progress.clone(),
        };

        let handles: Vec<_> = (0..workers)
            .map(|n| tokio::spawn(worker_loop(n, ctx.clone())))
            .collect();

        let mut finished: HashMap<TaskId, UploadResult> = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok(done) => finished.extend(done.into_iter().map(|r| (r.task_id, r))),
                Err(err) => error!(error = %err, "Upload worker terminated abnormally"),
            }
        }

        // Tasks never dequeued (stop requested)
        let leftover: Vec<QueuedTask> = ctx.queue.lock().unwrap().drain(..).collect();
        for task in leftover {
            task.snapshot.send_modify(|s| {
                s.status = TaskStatus::Failed;
                s.error = Some(TransferError::Cancelled.to_string());
                s.finished_at = Some(Utc::now());
            });
            self.totals.lock().unwrap().failed += 1;
            let path = task.spec.path().to_path_buf();
            finished.insert(
                task.id,
                UploadResult::failed(task.id, path, TransferError::Cancelled.to_string()),
            );
        }

        // Tasks lost with a panicked worker
        for (id, path) in planned {
            finished.entry(id).or_insert_with(|| {
                self.totals.lock().unwrap().failed += 1;
                UploadResult::failed(id, path, "upload worker terminated abnormally")
            });
        }

        results.extend(finished.into_values());
        results.sort_by_key(|r| r.task_id);
        self.mark_finished();

        let totals = self.totals();
        info!(
            completed = totals.completed,
            failed = totals.failed,
            bytes = totals.bytes_transferred,
            elapsed_ms = totals.elapsed().as_millis() as u64,
            "Uploads finished"
        );
        results
    }

    fn mark_started(&self, files: u64) {
        let mut totals = self.totals.lock().unwrap();
        totals.total_files += files;
        totals.started.get_or_insert_with(Instant::now);
        totals.finished = None;
    }

    fn mark_finished(&self) {
        self.totals.lock().unwrap().finished = Some(Instant::now());
    }

    /// Stops handing out queued files; in-flight uploads finish normally
    ///
    /// The flag stays set until [`clear_stop`](Self::clear_stop).
    pub fn stop(&self) {
        info!("Stop requested, no new uploads will start");
        self.stop.store(true, Ordering::Release);
    }

    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Copy of the aggregate counters
    pub fn totals(&self) -> TransferTotals {
        self.totals.lock().unwrap().clone()
    }

    /// Receiver for one task's snapshots
    pub fn subscribe(&self, task_id: TaskId) -> Option<watch::Receiver<TaskSnapshot>> {
        self.tasks.lock().unwrap().get(&task_id).cloned()
    }

    /// Latest snapshot of every task, in submission order
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let tasks = self.tasks.lock().unwrap();
        let mut snapshots: Vec<_> = tasks.values().map(|rx| rx.borrow().clone()).collect();
        snapshots.sort_by_key(|s| s.task_id);
        snapshots
    }
}

async fn worker_loop(worker: usize, ctx: WorkerContext) -> Vec<UploadResult> {
    debug!(worker, "Upload worker started");
    let mut results = Vec::new();
    loop {
        if ctx.stop.load(Ordering::Acquire) {
            debug!(worker, "Stop flag set, worker exiting");
            break;
        }
        let next = ctx.queue.lock().unwrap().pop_front();
        let Some(task) = next else {
            break;
        };
        results.push(run_task(worker, &ctx, task).await);
    }
    debug!(worker, done = results.len(), "Upload worker finished");
    results
}

async fn run_task(worker: usize, ctx: &WorkerContext, task: QueuedTask) -> UploadResult {
    let QueuedTask {
        id,
        spec,
        plan,
        snapshot,
    } = task;
    let path = spec.path().to_path_buf();
    debug!(worker, task = %id, file = %spec.original_name(), "Task dequeued");

    {
        let mut totals = ctx.totals.lock().unwrap();
        totals.in_flight += 1;
        totals.peak_in_flight = totals.peak_in_flight.max(totals.in_flight);
    }
    snapshot.send_modify(|s| s.started_at = Some(Utc::now()));

    let callback = progress_forwarder(snapshot.clone(), ctx.totals.clone(), ctx.on_progress.clone());
    let mut session = UploadSession::new(
        ctx.remote.clone(),
        spec,
        plan,
        ctx.destination.clone(),
        ctx.options.clone(),
    )
    .with_progress(callback);

    let result = session.run().await;

    let mut totals = ctx.totals.lock().unwrap();
    totals.in_flight = totals.in_flight.saturating_sub(1);
    match result {
        Ok(outcome) => {
            totals.completed += 1;
            drop(totals);
            snapshot.send_modify(|s| s.finished_at = Some(Utc::now()));
            UploadResult {
                task_id: id,
                path,
                status: TaskStatus::Completed,
                outcome: Some(outcome),
                error: None,
            }
        }
        Err(err) => {
            totals.failed += 1;
            drop(totals);
            let message = err.to_string();
            snapshot.send_modify(|s| {
                s.status = TaskStatus::Failed;
                s.error = Some(message.clone());
                s.finished_at = Some(Utc::now());
            });
            UploadResult::failed(id, path, message)
        }
    }
}

/// Publishes session progress to the task snapshot, the totals, and the caller
fn progress_forwarder(
    snapshot: Arc<watch::Sender<TaskSnapshot>>,
    totals: Arc<Mutex<TransferTotals>>,
    forward: Option<ProgressCallback>,
) -> ProgressCallback {
    let last_confirmed = AtomicU64::new(0);
    Arc::new(move |progress: &UploadProgress| {
        // Confirmed bytes drop back to zero when an upload restarts
        let previous = last_confirmed.swap(progress.bytes_confirmed, Ordering::AcqRel);
        let delta = progress.bytes_confirmed.saturating_sub(previous);
        if delta > 0 {
            totals.lock().unwrap().bytes_transferred += delta;
        }

        snapshot.send_modify(|s| {
            s.status = progress.status;
            s.progress = Some(progress.clone());
        });

        if let Some(forward) = &forward {
            forward(progress);
        }
    })
}
