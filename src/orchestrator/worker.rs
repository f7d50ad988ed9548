// src/orchestrator/worker.rs

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::orchestrator::pipeline::Pipeline;
use crate::state::{RepoState, RepositoryJob};

/// Run `jobs` through `workers` concurrent pipelines.
///
/// Every worker pulls from one shared queue until it is empty and sends each
/// finished [`RepoState`] on `results`. Returns once all workers are done;
/// `results` is closed at that point, which ends the collector's loop.
pub(crate) async fn run_pool(
    pipeline: Arc<Pipeline>,
    jobs: Vec<RepositoryJob>,
    workers: usize,
    results: mpsc::Sender<RepoState>,
) {
    let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
    let mut set = JoinSet::new();

    for worker_id in 0..workers {
        let queue = Arc::clone(&queue);
        let pipeline = Arc::clone(&pipeline);
        let results = results.clone();
        set.spawn(async move { worker_loop(worker_id, queue, pipeline, results).await });
    }
    drop(results);

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "worker task terminated abnormally");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<RepositoryJob>>>,
    pipeline: Arc<Pipeline>,
    results: mpsc::Sender<RepoState>,
) {
    loop {
        let next = queue.lock().await.pop_front();
        let Some(job) = next else {
            debug!(worker = worker_id, "work queue drained; worker exiting");
            break;
        };

        debug!(worker = worker_id, repo = %job.name, "worker picked up job");
        let state = pipeline.process_repository(&job).await;

        if results.send(state).await.is_err() {
            error!(worker = worker_id, "result collector closed; worker exiting");
            break;
        }
    }
}
