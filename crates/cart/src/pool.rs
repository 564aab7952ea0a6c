//! Bounded fan-out with a barrier join.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::{CartError, Result};

/// Runs one task per batch line with at most `max_concurrency` in flight.
///
/// Failed tasks never cancel their siblings. [`WorkerPool::join`] waits for
/// every task and then reports the first error it observed.
pub struct WorkerPool<T> {
    tasks: JoinSet<Result<T>>,
    permits: Arc<Semaphore>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Spawns `work` once a slot is free.
    pub async fn spawn<F>(&mut self, work: F) -> Result<()>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CartError::Worker(e.to_string()))?;

        self.tasks.spawn(async move {
            let _permit = permit;
            work.await
        });
        Ok(())
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task. Returns all outputs, or the first error seen.
    pub async fn join(mut self) -> Result<Vec<T>> {
        let mut outputs = Vec::with_capacity(self.tasks.len());
        let mut first_error = None;
        let mut failures = 0u64;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(CartError::Worker(e.to_string())));
            match outcome {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    failures += 1;
                    tracing::error!(error = %err, "cart worker failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        if failures > 0 {
            metrics::counter!("cart_worker_failures_total").increment(failures);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(outputs),
        }
    }
}
