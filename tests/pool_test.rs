//! Worker pool dispatch, priority, cancellation, and fallback

mod common;

use common::SAMPLE_CHAPTER;
use folio_core::error::AnalysisError;
use folio_core::pool::{Job, JobHandler, JobKind, JobOutput, JobPriority, JobResult, WorkerPool};
use folio_core::PoolError;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Records the order jobs run in. A job for chapter "block" waits until
/// the gate is opened.
struct GatedHandler {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    order: Mutex<Vec<String>>,
}

impl GatedHandler {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let handler = Arc::new(Self {
            gate: Mutex::new(Some(rx)),
            order: Mutex::new(Vec::new()),
        });
        (handler, tx)
    }
}

impl JobHandler for GatedHandler {
    fn handle(&self, job: &Job) -> Result<JobOutput, AnalysisError> {
        if job.chapter_id == "block" {
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.recv_timeout(Duration::from_secs(10));
            }
        }
        if job.chapter_id == "bad" {
            panic!("handler exploded");
        }
        self.order.lock().push(job.chapter_id.clone());
        Ok(JobOutput::Structure(Default::default()))
    }
}

fn collect(rx: &mpsc::Receiver<JobResult>, n: usize) -> Vec<JobResult> {
    (0..n)
        .map(|_| rx.recv_timeout(Duration::from_secs(10)).expect("job result"))
        .collect()
}

#[test]
fn test_saturated_pool_dispatches_by_priority() {
    let (handler, open_gate) = GatedHandler::new();
    let pool = WorkerPool::with_handler(Some(1), handler.clone());
    assert!(pool.is_parallel());

    let (tx, rx) = mpsc::channel();
    let submit = |chapter: &str, priority: JobPriority| {
        let tx = tx.clone();
        pool.submit_job(
            Job::new(JobKind::Structure, chapter, "").with_priority(priority),
            move |result| {
                let _ = tx.send(result);
            },
        )
    };

    submit("block", JobPriority::Normal);
    submit("n1", JobPriority::Normal);
    submit("l1", JobPriority::Low);
    submit("h1", JobPriority::High);
    submit("n2", JobPriority::Normal);

    let stats = pool.get_stats();
    assert_eq!(stats.busy_workers, 1);
    assert_eq!(stats.idle_workers, 0);
    assert_eq!(stats.queue_length, 4);

    open_gate.send(()).unwrap();
    collect(&rx, 5);

    assert_eq!(*handler.order.lock(), vec!["block", "h1", "n1", "n2", "l1"]);
    let stats = pool.get_stats();
    assert_eq!(stats.total_jobs_processed, 5);
    assert_eq!(stats.queue_length, 0);
}

#[test]
fn test_cancel_only_touches_queued_jobs() {
    let (handler, open_gate) = GatedHandler::new();
    let pool = WorkerPool::with_handler(Some(1), handler.clone());

    let (tx, rx) = mpsc::channel();
    let submit = |chapter: &str| {
        let tx = tx.clone();
        pool.submit_job(Job::new(JobKind::Style, chapter, ""), move |result| {
            let _ = tx.send(result);
        })
    };

    let in_flight = submit("block");
    let queued = submit("ch-a");
    submit("ch-b");
    submit("ch-b");

    assert!(!pool.cancel_job(&in_flight));
    assert!(pool.cancel_job(&queued));
    assert!(!pool.cancel_job(&queued));
    assert_eq!(pool.cancel_chapter_jobs("ch-b"), 2);

    open_gate.send(()).unwrap();
    let results = collect(&rx, 1);
    assert_eq!(results[0].job_id, in_flight);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(*handler.order.lock(), vec!["block"]);
}

#[test]
fn test_panicking_job_reports_error_and_worker_survives() {
    let (handler, _gate) = GatedHandler::new();
    let pool = WorkerPool::with_handler(Some(1), handler);

    let (tx, rx) = mpsc::channel();
    for chapter in ["bad", "good"] {
        let tx = tx.clone();
        pool.submit_job(Job::new(JobKind::Entities, chapter, ""), move |result| {
            let _ = tx.send(result);
        });
    }

    let results = collect(&rx, 2);
    assert!(matches!(results[0].output, Err(AnalysisError::Panicked(_))));
    assert!(results[1].output.is_ok());
}

#[test]
fn test_inline_pool_runs_synchronously() {
    let pool = WorkerPool::new(Some(0));
    assert!(!pool.is_parallel());

    let (tx, rx) = mpsc::channel();
    pool.submit_job(Job::new(JobKind::Structure, "ch1", SAMPLE_CHAPTER), move |result| {
        let _ = tx.send(result);
    });
    let result = rx.try_recv().expect("inline job completes before submit returns");
    match result.output {
        Ok(JobOutput::Structure(structure)) => assert_eq!(structure.stats.scene_count, 3),
        other => panic!("unexpected output {other:?}"),
    }
    assert_eq!(pool.get_stats().total_workers, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_chapters_in_parallel_and_inline_agree() {
    let chapters = vec![
        ("one".to_string(), SAMPLE_CHAPTER.to_string()),
        ("two".to_string(), "A short chapter. It ends quickly.".to_string()),
        ("three".to_string(), String::new()),
    ];

    let threaded = WorkerPool::new(Some(2));
    let inline = WorkerPool::new(Some(0));
    let parallel = threaded.process_chapters(chapters.clone()).await;
    let sequential = inline.process_chapters(chapters).await;

    assert_eq!(parallel.len(), 3);
    for (chapter, result) in &parallel {
        let a = result.as_ref().unwrap();
        let b = sequential[chapter].as_ref().unwrap();
        assert_eq!(a.chapter_id, *chapter);
        assert_eq!(a.structural, b.structural);
        assert_eq!(a.heatmap, b.heatmap);
    }
    assert_eq!(parallel["one"].as_ref().unwrap().structural.stats.scene_count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_fails_pending_chapters() {
    let (handler, _gate) = GatedHandler::new();
    let pool = Arc::new(WorkerPool::with_handler(Some(1), handler));

    let task = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.process_chapters(vec![
                ("block".to_string(), String::new()),
                ("queued".to_string(), String::new()),
            ])
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.terminate();

    let results = task.await.unwrap();
    assert_eq!(results["queued"], Err(PoolError::Terminated));
    assert_eq!(pool.get_stats().total_workers, 0);
}
