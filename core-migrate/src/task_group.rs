//! Bounded task group.
//!
//! Tasks are spawned immediately but only run while holding a permit, so at
//! most `pool_size` execute at once. [`TaskGroup::wait`] blocks until every
//! spawned task has finished, which is what keeps the scheduler from fetching
//! the next page early.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Group of tasks sharing one concurrency limit
pub struct TaskGroup {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl TaskGroup {
    /// Create a group running at most `pool_size` tasks at once
    pub fn new(pool_size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Queue `task`; it starts once a permit is free
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Number of tasks not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every spawned task; returns how many of them panicked
    pub async fn wait(&mut self) -> usize {
        let mut panicked = 0;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                panicked += 1;
                error!(error = %e, "Task in group did not complete");
            }
        }
        panicked
    }
}
