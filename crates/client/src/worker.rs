//! The coordinator's worker thread and its readiness signalling.

use parking_lot::{Condvar, Mutex};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};
use tracing::error;

/// Smallest number of blocks drained from the import queue per batch.
pub(crate) const MIN_SYNC_BLOCKS: usize = 1;

/// Largest number of blocks drained from the import queue per batch.
pub(crate) const MAX_SYNC_BLOCKS: usize = 100;

/// The wall time a drain batch is steered towards, in seconds.
pub(crate) const TARGET_BATCH_SECONDS: f64 = 1.0;

/// Adjusts the drain batch size towards the one-second target.
///
/// Slow batches shrink by a tenth, fast batches grow by a tenth plus one; a
/// ten percent hysteresis band around the target leaves the size alone. The
/// result always stays within `[MIN_SYNC_BLOCKS, MAX_SYNC_BLOCKS]`.
pub(crate) fn next_batch_size(current: usize, elapsed_seconds: f64) -> usize {
    if elapsed_seconds > TARGET_BATCH_SECONDS * 1.1 && current > MIN_SYNC_BLOCKS {
        (current * 9 / 10).max(MIN_SYNC_BLOCKS)
    } else if elapsed_seconds < TARGET_BATCH_SECONDS * 0.9 && current < MAX_SYNC_BLOCKS {
        (current * 11 / 10 + 1).min(MAX_SYNC_BLOCKS)
    } else {
        current
    }
}

/// A latching condition variable the queues raise when work becomes ready.
///
/// A notification arriving while nobody waits is not lost: the next wait
/// returns immediately and clears the latch.
#[derive(Debug, Default)]
pub(crate) struct WorkSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl WorkSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Raises the signal, waking a waiting worker.
    pub(crate) fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.condvar.notify_all();
    }

    /// Waits until the signal is raised or `timeout` passes, then clears it.
    pub(crate) fn wait(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        if !*pending {
            self.condvar.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }
}

/// A dedicated thread running a work closure in a loop until stopped.
///
/// A panic inside one iteration is caught and logged; the loop carries on
/// with the next iteration.
#[derive(Debug)]
pub(crate) struct Worker {
    shutdown: Arc<AtomicBool>,
    signal: Arc<WorkSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns the worker thread.
    pub(crate) fn spawn(
        name: &str,
        signal: Arc<WorkSignal>,
        work: impl Fn() + Send + 'static,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stopping = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while !stopping.load(Ordering::Acquire) {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(&work)) {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_owned())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_owned());
                        error!(target: "client", %message, "worker iteration panicked");
                    }
                }
            })
            .expect("failed to spawn worker thread");

        Worker { shutdown, signal, handle: Some(handle) }
    }

    /// Stops the loop and joins the thread.
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.signal.notify();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn batch_size_converges_upwards_for_fast_imports() {
        let mut size = MIN_SYNC_BLOCKS;
        for _ in 0..100 {
            size = next_batch_size(size, 0.002 * size as f64);
        }
        assert!(size >= 80, "expected convergence towards the cap, got {size}");
        assert!(size <= MAX_SYNC_BLOCKS);
    }

    #[test]
    fn batch_size_backs_off_when_slow() {
        let mut size = MAX_SYNC_BLOCKS;
        for _ in 0..100 {
            size = next_batch_size(size, 2.0);
        }
        assert_eq!(size, MIN_SYNC_BLOCKS);
    }

    #[test]
    fn hysteresis_leaves_on_target_batches_alone() {
        assert_eq!(next_batch_size(50, 1.0), 50);
        assert_eq!(next_batch_size(50, 0.95), 50);
        assert_eq!(next_batch_size(50, 1.05), 50);
    }

    #[test]
    fn worker_runs_until_stopped_and_survives_panics() {
        let signal = Arc::new(WorkSignal::new());
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = iterations.clone();
        let waiter = signal.clone();

        let mut worker = Worker::spawn("test-worker", signal, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                panic!("induced failure");
            }
            waiter.wait(Duration::from_millis(5));
        });

        while iterations.load(Ordering::SeqCst) < 5 {
            std::thread::yield_now();
        }
        worker.stop();
        let after_stop = iterations.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        // a stopped worker no longer iterates (one in-flight iteration may finish)
        assert!(iterations.load(Ordering::SeqCst) <= after_stop + 1);
    }

    #[test]
    fn early_notification_is_not_lost() {
        let signal = WorkSignal::new();
        signal.notify();
        let started = std::time::Instant::now();
        signal.wait(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn batch_size_stays_in_bounds(
            start in MIN_SYNC_BLOCKS..=MAX_SYNC_BLOCKS,
            elapsed in proptest::collection::vec(0.0f64..10.0, 0..200)
        ) {
            let mut size = start;
            for seconds in elapsed {
                size = next_batch_size(size, seconds);
                prop_assert!((MIN_SYNC_BLOCKS..=MAX_SYNC_BLOCKS).contains(&size));
            }
        }
    }
}
