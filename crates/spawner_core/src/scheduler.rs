//! Fixed-rate scheduler on a shared worker pool
//!
//! Jobs are executed by a fixed set of worker threads pulling from one
//! channel. Periodic tasks each own a lightweight timer thread that feeds
//! the pool on every tick. A periodic task never overlaps itself: if the
//! previous run is still executing when the next tick fires, that tick is
//! skipped.

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared cancellation state of a periodic task
#[derive(Debug)]
struct TaskControl {
    name: String,
    cancelled: AtomicBool,
    cancel_tx: Sender<()>,
    runs: AtomicU64,
}

/// Handle to a periodic task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    control: Arc<TaskControl>,
}

impl TaskHandle {
    /// Stop the task. Idempotent; an in-flight run completes normally.
    pub fn cancel(&self) {
        if !self.control.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.control.cancel_tx.send(());
            log::debug!("Cancelled periodic task '{}'", self.control.name);
        }
    }

    /// Whether the task was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::Acquire)
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// Number of completed runs
    pub fn runs(&self) -> u64 {
        self.control.runs.load(Ordering::Acquire)
    }
}

/// Clears the in-flight flag even if the task panics
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Worker pool with fixed-rate task support
pub struct Scheduler {
    jobs: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timers: Mutex<Vec<(TaskHandle, JoinHandle<()>)>>,
    worker_count: usize,
}

impl Scheduler {
    /// Start a pool with `worker_threads` workers (at least one)
    pub fn new(worker_threads: usize) -> Self {
        let worker_count = worker_threads.max(1);
        let (tx, rx) = unbounded::<Job>();

        let workers = (0..worker_count)
            .filter_map(|i| {
                let rx: Receiver<Job> = rx.clone();
                thread::Builder::new()
                    .name(format!("spawner-worker-{}", i))
                    .spawn(move || Self::worker_loop(rx))
                    .map_err(|e| log::error!("Failed to spawn worker {}: {}", i, e))
                    .ok()
            })
            .collect();

        log::info!("Scheduler started with {} workers", worker_count);

        Self {
            jobs: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            timers: Mutex::new(Vec::new()),
            worker_count,
        }
    }

    fn worker_loop(rx: Receiver<Job>) {
        while let Ok(job) = rx.recv() {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!("Scheduled job panicked");
            }
        }
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Queue a one-off job. Returns false once the scheduler is shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.jobs.lock().as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Run `task` on the pool every `interval`
    pub fn schedule_at_fixed_rate<F>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        task: F,
    ) -> TaskHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let (cancel_tx, cancel_rx) = unbounded::<()>();
        let handle = TaskHandle {
            control: Arc::new(TaskControl {
                name: name.clone(),
                cancelled: AtomicBool::new(false),
                cancel_tx,
                runs: AtomicU64::new(0),
            }),
        };

        let jobs = match self.jobs.lock().as_ref() {
            Some(tx) => tx.clone(),
            None => {
                log::warn!("Scheduler is shut down; task '{}' not started", name);
                handle.cancel();
                return handle;
            }
        };

        let task = Arc::new(task);
        let control = Arc::clone(&handle.control);
        let spawned = thread::Builder::new()
            .name(format!("spawner-timer-{}", name))
            .spawn(move || Self::timer_loop(interval, task, control, cancel_rx, jobs));

        let timer = match spawned {
            Ok(timer) => timer,
            Err(e) => {
                log::error!("Failed to spawn timer for task '{}': {}", name, e);
                handle.cancel();
                return handle;
            }
        };

        log::debug!("Scheduled '{}' every {:?}", name, interval);
        let mut timers = self.timers.lock();
        Self::reap_cancelled(&mut timers);
        timers.push((handle.clone(), timer));
        handle
    }

    /// Join timer threads of cancelled tasks
    fn reap_cancelled(timers: &mut Vec<(TaskHandle, JoinHandle<()>)>) {
        let mut i = 0;
        while i < timers.len() {
            if timers[i].0.is_cancelled() {
                let (_, timer) = timers.swap_remove(i);
                let _ = timer.join();
            } else {
                i += 1;
            }
        }
    }

    fn timer_loop<F>(
        interval: Duration,
        task: Arc<F>,
        control: Arc<TaskControl>,
        cancel_rx: Receiver<()>,
        jobs: Sender<Job>,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        let ticker = crossbeam_channel::tick(interval);
        let in_flight = Arc::new(AtomicBool::new(false));

        loop {
            select! {
                recv(cancel_rx) -> _ => break,
                recv(ticker) -> _ => {
                    if control.cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    if in_flight.swap(true, Ordering::AcqRel) {
                        log::debug!("Task '{}' still running, skipping tick", control.name);
                        continue;
                    }

                    let task = Arc::clone(&task);
                    let control = Arc::clone(&control);
                    let guard = InFlightGuard(Arc::clone(&in_flight));
                    let job: Job = Box::new(move || {
                        let _guard = guard;
                        if !control.cancelled.load(Ordering::Acquire) {
                            task();
                            control.runs.fetch_add(1, Ordering::AcqRel);
                        }
                    });
                    if jobs.send(job).is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Cancel every periodic task and join all threads
    pub fn shutdown(&self) {
        let timers: Vec<_> = self.timers.lock().drain(..).collect();
        for (handle, _) in &timers {
            handle.cancel();
        }
        for (_, timer) in timers {
            let _ = timer.join();
        }

        // Dropping the sender lets workers drain the queue and exit
        self.jobs.lock().take();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let count = workers.len();
        let current = thread::current().id();
        for worker in workers {
            // A job may drop the last reference to the scheduler
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
        if count > 0 {
            log::info!("Scheduler stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_submit_runs_job() {
        let scheduler = Scheduler::new(2);
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            assert!(scheduler.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(wait_until(Duration::from_secs(2), || counter.load(Ordering::SeqCst) == 10));
    }

    #[test]
    fn test_fixed_rate_task_and_cancel() {
        let scheduler = Scheduler::new(2);
        let counter = Arc::new(AtomicU32::new(0));

        let c = Arc::clone(&counter);
        let handle = scheduler.schedule_at_fixed_rate("count", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(wait_until(Duration::from_secs(2), || counter.load(Ordering::SeqCst) >= 3));

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        // Let any in-flight run settle, then make sure nothing else fires
        thread::sleep(Duration::from_millis(30));
        let after_cancel = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(counter.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let scheduler = Scheduler::new(1);
        scheduler.shutdown();
        assert!(!scheduler.submit(|| {}));

        let handle = scheduler.schedule_at_fixed_rate("late", Duration::from_millis(5), || {});
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let scheduler = Scheduler::new(1);
        let done = Arc::new(AtomicBool::new(false));

        scheduler.submit(|| panic!("boom"));
        let d = Arc::clone(&done);
        scheduler.submit(move || d.store(true, Ordering::SeqCst));

        assert!(wait_until(Duration::from_secs(2), || done.load(Ordering::SeqCst)));
    }
}
