//! Small fixed worker pool for off-thread jobs
//!
//! Four cooperative workers drain a shared queue; the core uses them for
//! save serialization and thumbnail rendering, the UI layer for whatever
//! else it needs. Jobs observe a `CancelToken` at their own progress
//! points; there is no preemption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::debug;

const POOL_SIZE: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cooperative cancellation flag shared with a running job.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        ThreadPool::new()
    }
}

impl ThreadPool {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let threads = (0..POOL_SIZE)
            .filter_map(|n| {
                let receiver: Receiver<Job> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("ember-worker-{n}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .ok()
            })
            .collect();
        debug!("worker pool started");
        ThreadPool { sender: Some(sender), threads }
    }

    pub fn push_work_item(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Run `job` on a worker and hand back a one-shot receiver for its
    /// result. The receiver is polled non-blockingly from the UI's
    /// per-frame tick.
    pub fn submit<T: Send + 'static>(
        &self,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> Receiver<T> {
        let (tx, rx) = bounded(1);
        self.push_work_item(move || {
            let _ = tx.send(job());
        });
        rx
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn submit_returns_the_job_result() {
        let pool = ThreadPool::new();
        let rx = pool.submit(|| 6 * 7);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
    }

    #[test]
    fn jobs_run_concurrently_with_the_caller() {
        let pool = ThreadPool::new();
        let rxs: Vec<_> = (0..8).map(|n| pool.submit(move || n * 2)).collect();
        let results: Vec<i32> = rxs
            .into_iter()
            .map(|rx| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn cancel_token_is_observed_at_progress_points() {
        let pool = ThreadPool::new();
        let token = CancelToken::new();
        token.cancel();
        let observed = token.clone();
        let rx = pool.submit(move || {
            if observed.is_cancelled() {
                Err("cancelled")
            } else {
                Ok(())
            }
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(Err("cancelled")));
    }

    #[test]
    fn drop_joins_all_workers() {
        let pool = ThreadPool::new();
        let rx = pool.submit(|| 1);
        drop(pool);
        assert_eq!(rx.try_recv(), Ok(1));
    }
}
