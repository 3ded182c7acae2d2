//! Parallel executors behind one capability interface.
//!
//! Two strategies run the same contract (a static task slice in, results
//! in task order out):
//! - [`PoolExecutor`]: a dedicated rayon pool, isolated from the global pool
//! - [`ThreadExecutor`]: scoped OS threads claiming tasks from an atomic
//!   cursor, for environments where a pool cannot be built
//!
//! [`Executor::probe`] picks one at startup. Callers only see
//! [`ParallelExecutor`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DedupError, Result};

/// Hard ceiling on the default worker count
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Worker ceiling when falling back to plain threads
pub const THREAD_FALLBACK_MAX_WORKERS: usize = 4;

/// Fan-out/fan-in over a fixed task list
pub trait ParallelExecutor: Send + Sync
{
    /// Short strategy label for logs and summaries
    fn name(&self) -> &'static str;

    /// Number of workers tasks are spread across
    fn workers(&self) -> usize;

    /// Run `f` over every task; the result vector is in task order
    fn execute<T, R, F>(
        &self,
        tasks: &[T],
        f: F,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send;
}

/// How the coordinator picks its executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorPreference
{
    /// Probe the environment and prefer the pool
    #[default]
    Auto,
    /// Always use the rayon pool
    Pool,
    /// Always use scoped threads
    Threads,
}

/// Dedicated rayon pool
pub struct PoolExecutor
{
    pool: rayon::ThreadPool,
    workers: usize,
}

impl PoolExecutor
{
    pub fn new(workers: usize) -> Result<Self>
    {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("jsdedup-worker-{i}"))
            .build()
            .map_err(|e| DedupError::Executor(e.to_string()))?;
        Ok(Self { pool, workers })
    }
}

impl ParallelExecutor for PoolExecutor
{
    fn name(&self) -> &'static str
    {
        "pool"
    }

    fn workers(&self) -> usize
    {
        self.workers
    }

    fn execute<T, R, F>(
        &self,
        tasks: &[T],
        f: F,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool
            .install(|| {
                tasks
                    .par_iter()
                    .map(&f)
                    .collect()
            })
    }
}

/// Scoped threads pulling task indices from a shared cursor
pub struct ThreadExecutor
{
    workers: usize,
}

impl ThreadExecutor
{
    pub fn new(workers: usize) -> Self
    {
        Self { workers: workers.clamp(1, THREAD_FALLBACK_MAX_WORKERS) }
    }
}

impl ParallelExecutor for ThreadExecutor
{
    fn name(&self) -> &'static str
    {
        "threads"
    }

    fn workers(&self) -> usize
    {
        self.workers
    }

    fn execute<T, R, F>(
        &self,
        tasks: &[T],
        f: F,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        if tasks.is_empty()
        {
            return Vec::new();
        }

        let cursor = AtomicUsize::new(0);
        let workers = self
            .workers
            .min(tasks.len());

        let mut indexed: Vec<(usize, R)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut local = Vec::new();
                        loop
                        {
                            let i = cursor.fetch_add(1, Ordering::Relaxed);
                            if i >= tasks.len()
                            {
                                break;
                            }
                            local.push((i, f(&tasks[i])));
                        }
                        local
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| match h.join()
                {
                    Ok(local) => local,
                    // Re-raise worker panics on the coordinating thread
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        });

        indexed.sort_unstable_by_key(|(i, _)| *i);
        indexed
            .into_iter()
            .map(|(_, r)| r)
            .collect()
    }
}

/// The executor chosen for a run
pub enum Executor
{
    Pool(PoolExecutor),
    Threads(ThreadExecutor),
}

impl Executor
{
    /// Select a strategy once. `Auto` requires queryable parallelism and a
    /// pool that actually builds; anything less falls back to threads.
    pub fn probe(
        preference: ExecutorPreference,
        max_workers: Option<usize>,
    ) -> Result<Self>
    {
        let available = thread::available_parallelism().map(|n| n.get());
        let workers = max_workers.unwrap_or_else(|| {
            available
                .as_ref()
                .map(|&n| n.min(DEFAULT_MAX_WORKERS))
                .unwrap_or(1)
        });

        match preference
        {
            ExecutorPreference::Pool => Ok(Self::Pool(PoolExecutor::new(workers)?)),
            ExecutorPreference::Threads => Ok(Self::Threads(ThreadExecutor::new(workers))),
            ExecutorPreference::Auto =>
            {
                if let Err(e) = &available
                {
                    warn!("available parallelism unknown ({e}); using thread executor");
                    return Ok(Self::Threads(ThreadExecutor::new(workers)));
                }
                match PoolExecutor::new(workers)
                {
                    Ok(pool) =>
                    {
                        debug!(workers, "pool executor ready");
                        Ok(Self::Pool(pool))
                    }
                    Err(e) =>
                    {
                        warn!("{e}; using thread executor");
                        Ok(Self::Threads(ThreadExecutor::new(workers)))
                    }
                }
            }
        }
    }
}

impl ParallelExecutor for Executor
{
    fn name(&self) -> &'static str
    {
        match self
        {
            Executor::Pool(p) => p.name(),
            Executor::Threads(t) => t.name(),
        }
    }

    fn workers(&self) -> usize
    {
        match self
        {
            Executor::Pool(p) => p.workers(),
            Executor::Threads(t) => t.workers(),
        }
    }

    fn execute<T, R, F>(
        &self,
        tasks: &[T],
        f: F,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self
        {
            Executor::Pool(p) => p.execute(tasks, f),
            Executor::Threads(t) => t.execute(tasks, f),
        }
    }
}
