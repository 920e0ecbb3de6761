//! Bounded worker pool
//!
//! Tasks are spawned onto the runtime immediately and wait on a semaphore
//! permit before doing any work, so at most `concurrency` run at once.
//! [`WorkerPool::join`] waits for every submitted task and reports the first
//! failure; siblings are never cancelled.

use crate::{AgileSyncError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Default number of simultaneous tasks
pub const DEFAULT_CONCURRENCY: usize = 4;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Result<()>>,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Queue a task; it starts once a permit is free
    pub fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| AgileSyncError::Task("Semaphore closed unexpectedly".to_string()))?;
            task.await
        });
    }

    /// Tasks submitted and not yet joined
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every submitted task; the first error observed wins
    pub async fn join(&mut self) -> Result<()> {
        let mut first: Option<AgileSyncError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(AgileSyncError::Task(e.to_string())));
            if let Err(e) = outcome {
                if first.is_none() {
                    first = Some(e);
                } else {
                    warn!(error = %e, "Additional task failure");
                }
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
