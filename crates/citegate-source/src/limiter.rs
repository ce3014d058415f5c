//! Bounded-concurrency task admission.
//!
//! At most `limit` futures run at once; waiting futures are admitted in
//! submission order (tokio's semaphore is fair). A future that panics or
//! returns an error releases its permit on drop and never blocks the
//! queue from draining.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct TaskLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl TaskLimiter {
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "concurrency limit must be at least 1");
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `fut` once a slot is free.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("limiter semaphore closed");
        fut.await
    }
}
