//! Worker pool that drains the queue.
//!
//! Each worker polls for due jobs, hands them to the engine, and records the
//! outcome back through the queue. Shutdown is cooperative: workers finish
//! the job in hand before exiting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use extraction::Extractor;

use crate::config::OrchestratorConfig;
use crate::engine::Engine;

use super::queue::JobQueue;

pub struct WorkerPool<E: Extractor + 'static> {
    queue: Arc<JobQueue>,
    engine: Arc<Engine<E>>,
    workers: usize,
    poll_interval: Duration,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl<E: Extractor + 'static> WorkerPool<E> {
    pub fn new(queue: Arc<JobQueue>, engine: Arc<Engine<E>>, config: &OrchestratorConfig) -> Self {
        Self {
            queue,
            engine,
            workers: config.max_concurrent_jobs,
            poll_interval: config.poll_interval,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn the worker tasks. Idempotent only in the sense that calling it
    /// twice spawns a second set of workers, so call it once.
    pub fn start(&mut self) {
        for _ in 0..self.workers {
            let worker_id = format!("worker-{}", Uuid::new_v4());
            let queue = self.queue.clone();
            let engine = self.engine.clone();
            let poll_interval = self.poll_interval;
            let shutdown = self.shutdown.clone();
            self.handles.push(tokio::spawn(run_worker(
                worker_id,
                queue,
                engine,
                poll_interval,
                shutdown,
            )));
        }
        info!(workers = self.workers, "worker pool started");
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut self.handles);
        for result in join_all(handles).await {
            result?;
        }
        info!("worker pool stopped");
        Ok(())
    }
}

async fn run_worker<E: Extractor + 'static>(
    worker_id: String,
    queue: Arc<JobQueue>,
    engine: Arc<Engine<E>>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    info!(worker_id = %worker_id, "worker started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match queue.claim(&worker_id) {
            Some((job, token)) => {
                info!(worker_id = %worker_id, job_id = %job.id, "job claimed");
                let outcome = engine.orchestrate(&job, token.clone()).await;
                if token.is_cancelled() {
                    queue.mark_cancelled(job.id);
                } else if outcome.success {
                    queue.mark_completed(job.id, outcome.merged, outcome.quality_score);
                } else {
                    let error = outcome
                        .error
                        .unwrap_or_else(|| "orchestration failed".to_string());
                    queue.mark_failed(job.id, &error);
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
    info!(worker_id = %worker_id, "worker stopped");
}
