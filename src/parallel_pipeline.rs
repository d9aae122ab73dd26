// THEORY:
// Scoring grid cells dominates the cost of a run and every cell is independent,
// so the parallel pipeline fans the lattice out to a pool of tokio workers.
//
// The unit of work is one lattice row. A single dispatcher receives row tasks
// and hands them round-robin to the workers; each worker scores its row with its
// own `GridManager` on the blocking thread pool and answers through the task's
// oneshot channel. The caller
// waits for every row, then merges the rows back in lattice order before the
// (sequential) splat and smoothing, so the resulting map is bit-identical to the
// one `CloudPipeline` builds. A failing row fails the whole map, and among
// several failures the one earliest in lattice order is reported.

use crate::config::RunConfig;
use crate::core_modules::feature_scorer::FeatureScorer;
use crate::core_modules::grid_manager::{CellScore, GridManager};
use crate::core_modules::patch_sampler::GridCell;
use crate::core_modules::point_evaluator::BorderPoint;
use crate::core_modules::probability_map::ProbabilityMap;
use crate::error::{CumulusError, Result};
use crate::pipeline::{CloudPipeline, RunOutcome};
use futures::future::try_join_all;
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

pub struct RowTask {
    pub row: usize,
    pub image: Arc<RgbImage>,
    pub cells: Vec<GridCell>,
    pub result_sender: oneshot::Sender<Result<Vec<CellScore>>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<RowTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers. Must be called from
    /// within a tokio runtime.
    pub fn new(config: RunConfig, scorer: Arc<dyn FeatureScorer>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<RowTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..worker_count).map(|_| mpsc::unbounded_channel::<RowTask>()).unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                // A closed worker drops the task, and with it the reply channel.
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let config = Arc::new(config);
        for mut worker_receiver in worker_receivers {
            let worker_config = Arc::clone(&config);
            let worker_scorer = Arc::clone(&scorer);

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let RowTask {
                        row,
                        image,
                        cells,
                        result_sender,
                    } = task;
                    let cell_count = cells.len();
                    let config = Arc::clone(&worker_config);
                    let scorer = Arc::clone(&worker_scorer);
                    // Scoring is CPU-bound and must not stall the runtime threads.
                    let scores = tokio::task::spawn_blocking(move || {
                        GridManager::new(&config, scorer.as_ref()).score_cells(&image, &cells)
                    })
                    .await
                    .unwrap_or_else(|e| Err(CumulusError::WorkerPool(format!("row {row} scoring task failed: {e}"))));
                    debug!("Row {} scored ({} cells)", row, cell_count);
                    let _ = result_sender.send(scores);
                }
            });

            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues one row and returns the receiver its scores will arrive on.
    pub fn submit(
        &self,
        row: usize,
        image: Arc<RgbImage>,
        cells: Vec<GridCell>,
    ) -> Result<oneshot::Receiver<Result<Vec<CellScore>>>> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = RowTask {
            row,
            image,
            cells,
            result_sender,
        };
        self.task_sender
            .send(task)
            .map_err(|_| CumulusError::WorkerPool(format!("failed to send row {row} to the worker pool")))?;
        Ok(result_receiver)
    }
}

/// Cloud pipeline whose per-cell scoring runs on a worker pool.
pub struct ParallelPipeline {
    pipeline: CloudPipeline,
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// `workers = None` sizes the pool to the number of logical CPUs.
    pub fn new(config: RunConfig, scorer: Arc<dyn FeatureScorer>, workers: Option<usize>) -> Result<Self> {
        let pipeline = CloudPipeline::new(config, scorer)?;
        let worker_count = workers.unwrap_or_else(num_cpus::get);
        let worker_pool = WorkerPool::new(pipeline.config().clone(), Arc::clone(pipeline.scorer()), worker_count);
        info!("Worker pool started with {} workers", worker_pool.worker_count());
        Ok(Self { pipeline, worker_pool })
    }

    pub fn pipeline(&self) -> &CloudPipeline {
        &self.pipeline
    }

    pub async fn probability_map(&self, image: Arc<RgbImage>) -> Result<ProbabilityMap> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(CumulusError::EmptyImage);
        }
        let grid_manager = self.pipeline.grid_manager();
        let rows = grid_manager.sampler().lattice_rows(w, h);
        let row_count = rows.len();

        let mut receivers = Vec::with_capacity(row_count);
        for (row, cells) in rows.into_iter().enumerate() {
            receivers.push(self.worker_pool.submit(row, Arc::clone(&image), cells)?);
        }

        let replies = try_join_all(receivers.into_iter().enumerate().map(|(row, receiver)| async move {
            receiver
                .await
                .map_err(|_| CumulusError::WorkerPool(format!("worker dropped row {row}")))
        }))
        .await?;

        let mut scores = Vec::new();
        for reply in replies {
            scores.extend(reply?);
        }
        info!("Scored {} cells over {} rows on a {}x{} strip", scores.len(), row_count, w, h);
        Ok(grid_manager.assemble(w, h, &scores))
    }

    pub async fn run(&self, image: Arc<RgbImage>, points: &[BorderPoint]) -> Result<RunOutcome> {
        let map = self.probability_map(image).await?;
        Ok(self.pipeline.finish(map, points))
    }
}
