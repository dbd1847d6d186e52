//! Worker pool for per-item explanation work.

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{PipelineError, Result};

/// Fixed-size thread pool owned by a pipeline.
///
/// Jobs are split round-robin into at most `workers` chunks. Every chunk
/// receives its own clone of the shared handle, so the handle only needs to
/// be `Clone + Send`.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Create a pool with `workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPool`] if `workers` is zero or the
    /// threads cannot be spawned.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(PipelineError::WorkerPool("at least one worker is required".to_string()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("plasmo-explain-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    /// Number of threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` on every job and return the results in job order.
    pub fn fan_out<S, J, R, F>(&self, shared: &S, jobs: Vec<J>, task: F) -> Vec<R>
    where
        S: Clone + Send,
        J: Send,
        R: Send,
        F: Fn(&S, J) -> R + Sync,
    {
        let n_jobs = jobs.len();
        if n_jobs == 0 {
            return Vec::new();
        }

        let n_chunks = self.workers.min(n_jobs);
        let mut chunks: Vec<Vec<(usize, J)>> = (0..n_chunks).map(|_| Vec::new()).collect();
        for (index, job) in jobs.into_iter().enumerate() {
            chunks[index % n_chunks].push((index, job));
        }
        let assignments: Vec<(S, Vec<(usize, J)>)> = chunks
            .into_iter()
            .map(|chunk| (shared.clone(), chunk))
            .collect();

        let results = Mutex::new(Vec::with_capacity(n_jobs));
        let task = &task;
        let sink = &results;
        self.pool.scope(move |scope| {
            for (handle, chunk) in assignments {
                scope.spawn(move |_| {
                    for (index, job) in chunk {
                        let output = task(&handle, job);
                        sink.lock().push((index, output));
                    }
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, output)| output).collect()
    }
}
