//! Bounded worker pool.
//!
//! Independent units (clones, fetches, hook runs, user commands) are fanned
//! out over a dedicated rayon pool sized to the workspace's `jobs` setting,
//! so no more than `jobs` units ever run at once regardless of the global
//! rayon configuration.

use rayon::prelude::*;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    jobs: usize,
}

impl WorkerPool {
    pub fn new(jobs: usize) -> Self {
        Self { jobs: jobs.max(1) }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Applies `f` to every item with at most `jobs` running concurrently.
    /// Results come back in input order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        if self.jobs == 1 || items.len() == 1 {
            return Ok(items.into_iter().map(f).collect());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("grove-worker-{}", i))
            .build()?;
        Ok(pool.install(|| items.into_par_iter().map(f).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_map_preserves_order() {
        let out = WorkerPool::new(4).map((0..50).collect(), |i| i * 2).unwrap();
        assert_eq!(out, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_never_exceeds_jobs() {
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        WorkerPool::new(3)
            .map((0..24).collect::<Vec<_>>(), |_| {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                live.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded 3", peak);
        assert!(peak >= 1);
    }

    #[test]
    fn test_single_job_runs_inline() {
        let out = WorkerPool::new(1).map(vec!["a", "b"], str::len).unwrap();
        assert_eq!(out, vec![1, 1]);
    }
}
