// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded worker pool for CPU-bound page work.
//
// Jobs run on tokio's blocking thread pool. A semaphore sized to the worker
// count gates how many run at once; `submit` waits for a permit before the
// job is spawned, so callers that submit in a loop get backpressure for free.

use std::sync::Arc;

use ocrmd_core::error::{OcrmdError, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a job submitted to a [`WorkerPool`].
pub struct Job<T>(JoinHandle<T>);

impl<T> Job<T> {
    /// Wait for the job to finish. A panicking job becomes
    /// [`OcrmdError::Worker`].
    pub async fn join(self) -> Result<T> {
        self.0
            .await
            .map_err(|err| OcrmdError::Worker(format!("worker task failed: {}", err)))
    }
}

/// Fixed-size pool of blocking workers.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on a blocking thread once a worker slot is free.
    ///
    /// The slot is held until `job` returns. Results come back through the
    /// returned [`Job`]; awaiting jobs in submission order reassembles output
    /// in that order regardless of which finished first.
    pub async fn submit<T, F>(&self, job: F) -> Result<Job<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| OcrmdError::Worker(format!("worker pool closed: {}", err)))?;
        debug!(available = self.semaphore.available_permits(), "Worker slot acquired");

        Ok(Job(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn results_come_back_in_submission_order() {
        let pool = WorkerPool::new(4);
        let mut jobs = Vec::new();
        for i in 0..8u64 {
            // Earlier jobs sleep longer so they finish last.
            jobs.push(
                pool.submit(move || {
                    std::thread::sleep(Duration::from_millis(40 - i * 5));
                    i
                })
                .await
                .unwrap(),
            );
        }
        let mut out = Vec::new();
        for job in jobs {
            out.push(job.join().await.unwrap());
        }
        assert_eq!(out, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_pool_size() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut jobs = Vec::new();
        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            jobs.push(
                pool.submit(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap(),
            );
        }
        for job in jobs {
            job.join().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panicking_job_is_a_worker_error() {
        let pool = WorkerPool::new(1);
        let job = pool.submit(|| -> u32 { panic!("boom") }).await.unwrap();
        assert!(matches!(job.join().await, Err(OcrmdError::Worker(_))));
        // The slot was released.
        let ok = pool.submit(|| 7).await.unwrap();
        assert_eq!(ok.join().await.unwrap(), 7);
    }

    #[test]
    fn zero_size_is_clamped() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
