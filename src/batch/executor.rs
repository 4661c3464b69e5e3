//! Batch executor.

use futures::StreamExt;
use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Blocking worker threads per available core for an unbounded batch.
pub const WORKERS_PER_CORE: usize = 8;

/// Upper bound on worker threads for an unbounded blocking batch.
pub fn max_blocking_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get) * WORKERS_PER_CORE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    Parallel,
    Sequential,
    Concurrent { max_concurrency: usize },
}

impl Default for BatchStrategy {
    fn default() -> Self {
        BatchStrategy::Parallel
    }
}

impl BatchStrategy {
    /// Strategy for a call's `max_concurrency`; `None` means unbounded.
    pub fn from_max_concurrency(limit: Option<usize>) -> Self {
        match limit {
            None => BatchStrategy::Parallel,
            Some(0) | Some(1) => BatchStrategy::Sequential,
            Some(n) => BatchStrategy::Concurrent { max_concurrency: n },
        }
    }

    /// Number of items allowed in flight for a batch of `n`.
    pub fn limit(&self, n: usize) -> usize {
        match self {
            BatchStrategy::Parallel => n.max(1),
            BatchStrategy::Sequential => 1,
            BatchStrategy::Concurrent { max_concurrency } => (*max_concurrency).min(n).max(1),
        }
    }
}

/// Runs one closure per item and returns results in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor {
    strategy: BatchStrategy,
}

impl BatchExecutor {
    pub fn new(strategy: BatchStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> BatchStrategy {
        self.strategy
    }

    /// Worker threads for a blocking batch of `n`.
    ///
    /// `Parallel` is capped at [`max_blocking_workers`]; an explicit bound is kept as is.
    pub fn blocking_workers(&self, n: usize) -> usize {
        match self.strategy {
            BatchStrategy::Parallel => n.clamp(1, max_blocking_workers()),
            other => other.limit(n),
        }
    }

    /// Blocking fan-out on scoped worker threads.
    ///
    /// With a limit of one (or a single item) everything runs on the calling thread.
    /// Workers pull from a shared queue, so a capped batch still runs every item.
    pub fn execute_blocking<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T) -> R + Sync,
    {
        let n = items.len();
        let limit = self.blocking_workers(n);
        if n <= 1 || limit == 1 {
            return items
                .into_iter()
                .enumerate()
                .map(|(i, item)| f(i, item))
                .collect();
        }

        let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(items.into_iter().enumerate().collect());
        let done: Mutex<Vec<(usize, R)>> = Mutex::new(Vec::with_capacity(n));
        std::thread::scope(|s| {
            for _ in 0..limit {
                s.spawn(|| loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((i, item)) = next else { break };
                    let r = f(i, item);
                    done.lock().unwrap_or_else(PoisonError::into_inner).push((i, r));
                });
            }
        });

        let mut results = done.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }

    /// Async fan-out with at most `limit` futures in flight.
    pub async fn execute<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = R>,
    {
        let n = items.len();
        if n == 0 {
            return Vec::new();
        }
        let limit = self.strategy.limit(n);
        let f = &f;

        let mut results: Vec<(usize, R)> = futures::stream::iter(items.into_iter().enumerate())
            .map(|(i, item)| async move { (i, f(i, item).await) })
            .buffer_unordered(limit)
            .collect()
            .await;

        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }
}
