//! Worker pool
//!
//! Bounded set of OS worker threads fed over crossbeam channels. Each
//! worker owns a command channel; a coordinator thread receives
//! completions, marks the worker idle, runs the job's callback, and hands
//! the worker the next queued job.
//!
//! A pool of size zero, or one whose threads cannot be spawned, runs every
//! job inline on the submitting thread. Callers see the same API either
//! way.

pub mod job;
pub mod queue;

pub use job::{AnalyzerJobHandler, Job, JobCallback, JobHandler, JobKind, JobOutput, JobPriority, JobResult};
pub use queue::JobQueue;

use crate::analysis::ManuscriptIntelligence;
use crate::config::FolioConfig;
use crate::error::{AnalysisError, PoolError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// `max(2, available_parallelism - 1)`
pub fn default_pool_size() -> usize {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cores.saturating_sub(1).max(2)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub queue_length: usize,
    pub total_jobs_processed: u64,
    pub avg_processing_time: Duration,
}

enum WorkerCommand {
    Run(Job),
    Shutdown,
}

enum CoordinatorMessage {
    Completed {
        worker: usize,
        epoch: u64,
        result: JobResult,
    },
    Shutdown,
}

struct WorkerSlot {
    commands: Sender<WorkerCommand>,
    busy: bool,
}

#[derive(Default)]
struct PoolState {
    initialized: bool,
    unsupported: bool,
    /// bumped on terminate so late completions from old workers are ignored
    epoch: u64,
    workers: Vec<WorkerSlot>,
    queue: JobQueue,
    callbacks: HashMap<String, JobCallback>,
    coordinator: Option<Sender<CoordinatorMessage>>,
    jobs_processed: u64,
    total_processing: Duration,
}

struct PoolInner {
    size: usize,
    handler: Arc<dyn JobHandler>,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn dispatch(state: &mut PoolState, worker: usize, job: Job) {
        debug!(
            "Dispatching job {} ({:?}, chapter {}) to worker {}",
            job.id, job.kind, job.chapter_id, worker
        );
        let Some(slot) = state.workers.get_mut(worker) else {
            state.queue.push(job);
            return;
        };
        slot.busy = true;
        if let Err(err) = slot.commands.send(WorkerCommand::Run(job)) {
            slot.busy = false;
            let WorkerCommand::Run(job) = err.into_inner() else {
                return;
            };
            warn!("Worker {} is gone; dropping job {}", worker, job.id);
            state.callbacks.remove(&job.id);
        }
    }

    fn dispatch_queued(&self) {
        let mut state = self.state.lock();
        while !state.queue.is_empty() {
            let Some(idle) = state.workers.iter().position(|w| !w.busy) else {
                break;
            };
            let Some(job) = state.queue.pop() else {
                break;
            };
            Self::dispatch(&mut state, idle, job);
        }
    }

    fn complete(&self, worker: usize, epoch: u64, result: JobResult) {
        let callback = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                debug!("Ignoring completion of job {} from a terminated pool", result.job_id);
                return;
            }
            if let Some(slot) = state.workers.get_mut(worker) {
                slot.busy = false;
            }
            state.jobs_processed += 1;
            state.total_processing += result.elapsed;
            state.callbacks.remove(&result.job_id)
        };

        if let Some(callback) = callback {
            let job_id = result.job_id.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
                warn!("Callback for job {} panicked", job_id);
            }
        }

        self.dispatch_queued();
    }
}

fn run_job(handler: &dyn JobHandler, job: &Job) -> JobResult {
    let started = Instant::now();
    let output = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job)))
        .unwrap_or_else(|payload| Err(AnalysisError::from_panic(payload)));
    if let Err(e) = &output {
        warn!("Job {} for chapter {} failed: {}", job.id, job.chapter_id, e);
    }
    JobResult {
        job_id: job.id.clone(),
        chapter_id: job.chapter_id.clone(),
        generation: job.generation,
        output,
        elapsed: started.elapsed(),
    }
}

fn worker_loop(
    worker: usize,
    epoch: u64,
    handler: Arc<dyn JobHandler>,
    commands: Receiver<WorkerCommand>,
    completions: Sender<CoordinatorMessage>,
) {
    while let Ok(WorkerCommand::Run(job)) = commands.recv() {
        let result = run_job(handler.as_ref(), &job);
        if completions
            .send(CoordinatorMessage::Completed {
                worker,
                epoch,
                result,
            })
            .is_err()
        {
            break;
        }
    }
    debug!("Worker {} exiting", worker);
}

fn coordinator_loop(inner: Weak<PoolInner>, completions: Receiver<CoordinatorMessage>) {
    while let Ok(message) = completions.recv() {
        match message {
            CoordinatorMessage::Completed {
                worker,
                epoch,
                result,
            } => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.complete(worker, epoch, result);
            }
            CoordinatorMessage::Shutdown => break,
        }
    }
}

/// Bounded parallel job executor with a priority queue and inline fallback
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Pool running the analyzer suite. `None` picks [`default_pool_size`].
    pub fn new(pool_size: Option<usize>) -> Self {
        Self::with_handler(pool_size, Arc::new(AnalyzerJobHandler::default()))
    }

    pub fn from_config(config: &FolioConfig) -> Self {
        Self::with_handler(config.pool.size, Arc::new(AnalyzerJobHandler::new(config)))
    }

    pub fn with_handler(pool_size: Option<usize>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                size: pool_size.unwrap_or_else(default_pool_size),
                handler,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Spawn the workers if not done yet. Spawn failure switches the pool
    /// to inline execution.
    pub fn initialize(&self) {
        let mut state = self.inner.state.lock();
        if state.initialized {
            return;
        }
        state.initialized = true;

        if self.inner.size == 0 {
            state.unsupported = true;
            info!("Worker pool size is 0; jobs run inline");
            return;
        }

        let (done_tx, done_rx) = unbounded();
        let epoch = state.epoch;
        let mut workers: Vec<WorkerSlot> = Vec::with_capacity(self.inner.size);

        for id in 0..self.inner.size {
            let (cmd_tx, cmd_rx) = unbounded();
            let handler = Arc::clone(&self.inner.handler);
            let completions = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("folio-worker-{}", id))
                .spawn(move || worker_loop(id, epoch, handler, cmd_rx, completions));

            match spawned {
                Ok(_) => workers.push(WorkerSlot {
                    commands: cmd_tx,
                    busy: false,
                }),
                Err(e) => {
                    warn!("Failed to spawn worker {}: {}; falling back to inline jobs", id, e);
                    for worker in &workers {
                        let _ = worker.commands.send(WorkerCommand::Shutdown);
                    }
                    state.unsupported = true;
                    return;
                }
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let coordinator = thread::Builder::new()
            .name("folio-pool-coordinator".to_string())
            .spawn(move || coordinator_loop(weak, done_rx));
        if let Err(e) = coordinator {
            warn!("Failed to spawn pool coordinator: {}; falling back to inline jobs", e);
            for worker in &workers {
                let _ = worker.commands.send(WorkerCommand::Shutdown);
            }
            state.unsupported = true;
            return;
        }

        state.coordinator = Some(done_tx);
        state.workers = workers;
        info!("Worker pool initialized with {} workers", self.inner.size);
    }

    /// Whether jobs run on worker threads
    pub fn is_parallel(&self) -> bool {
        self.initialize();
        !self.inner.state.lock().unsupported
    }

    /// Submit a job. It goes straight to an idle worker, or waits in the
    /// priority queue. In inline mode it runs before this returns.
    pub fn submit_job<F>(&self, job: Job, callback: F) -> String
    where
        F: FnOnce(JobResult) + Send + 'static,
    {
        self.initialize();
        let id = job.id.clone();

        let mut state = self.inner.state.lock();
        if state.unsupported {
            drop(state);
            let result = run_job(self.inner.handler.as_ref(), &job);
            {
                let mut state = self.inner.state.lock();
                state.jobs_processed += 1;
                state.total_processing += result.elapsed;
            }
            callback(result);
            return id;
        }

        state.callbacks.insert(id.clone(), Box::new(callback));
        match state.workers.iter().position(|w| !w.busy) {
            Some(idle) => PoolInner::dispatch(&mut state, idle, job),
            None => {
                debug!("All workers busy; queueing job {} ({:?})", job.id, job.priority);
                state.queue.push(job);
            }
        }
        id
    }

    /// Remove a queued job. In-flight jobs are not affected.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state.queue.remove_where(|j| j.id == job_id);
        for job in &removed {
            state.callbacks.remove(&job.id);
        }
        !removed.is_empty()
    }

    /// Remove every queued job for a chapter, returning how many were removed
    pub fn cancel_chapter_jobs(&self, chapter_id: &str) -> usize {
        let mut state = self.inner.state.lock();
        let removed = state.queue.remove_where(|j| j.chapter_id == chapter_id);
        for job in &removed {
            state.callbacks.remove(&job.id);
        }
        if !removed.is_empty() {
            debug!("Cancelled {} queued jobs for chapter {}", removed.len(), chapter_id);
        }
        removed.len()
    }

    /// Full analysis of several chapters, one job each. Resolves once all
    /// have completed.
    pub async fn process_chapters(
        &self,
        chapters: Vec<(String, String)>,
    ) -> HashMap<String, Result<ManuscriptIntelligence, PoolError>> {
        let epoch = self.inner.state.lock().epoch;
        let mut pending = Vec::with_capacity(chapters.len());

        for (chapter_id, text) in chapters {
            let (tx, rx) = oneshot::channel();
            let job = Job::new(JobKind::FullAnalysis, chapter_id.clone(), text);
            let job_id = self.submit_job(job, move |result| {
                let _ = tx.send(result);
            });
            pending.push((chapter_id, job_id, rx));
        }

        let mut results = HashMap::with_capacity(pending.len());
        for (chapter_id, job_id, rx) in pending {
            let outcome = match rx.await {
                Ok(result) => match result.output {
                    Ok(output) => output.into_intelligence().ok_or_else(|| PoolError::JobFailed {
                        job_id: job_id.clone(),
                        reason: "handler did not produce full intelligence".to_string(),
                    }),
                    Err(e) => Err(PoolError::JobFailed {
                        job_id: job_id.clone(),
                        reason: e.to_string(),
                    }),
                },
                Err(_) if self.inner.state.lock().epoch != epoch => Err(PoolError::Terminated),
                Err(_) => Err(PoolError::ResultDropped(job_id.clone())),
            };
            results.insert(chapter_id, outcome);
        }
        results
    }

    pub fn get_stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let busy = state.workers.iter().filter(|w| w.busy).count();
        PoolStats {
            total_workers: state.workers.len(),
            busy_workers: busy,
            idle_workers: state.workers.len() - busy,
            queue_length: state.queue.len(),
            total_jobs_processed: state.jobs_processed,
            avg_processing_time: if state.jobs_processed == 0 {
                Duration::ZERO
            } else {
                state.total_processing.div_f64(state.jobs_processed as f64)
            },
        }
    }

    /// Stop every worker, drop queued jobs and pending callbacks, and reset
    /// to the uninitialized state. In-flight jobs finish but their results
    /// are discarded.
    pub fn terminate(&self) {
        let mut state = self.inner.state.lock();
        let workers = state.workers.len();
        for worker in state.workers.drain(..) {
            let _ = worker.commands.send(WorkerCommand::Shutdown);
        }
        if let Some(coordinator) = state.coordinator.take() {
            let _ = coordinator.send(CoordinatorMessage::Shutdown);
        }
        let dropped = state.queue.clear().len();
        state.callbacks.clear();
        state.initialized = false;
        state.unsupported = false;
        state.epoch += 1;
        state.jobs_processed = 0;
        state.total_processing = Duration::ZERO;
        if workers > 0 || dropped > 0 {
            info!("Worker pool terminated ({} workers, {} queued jobs dropped)", workers, dropped);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}
