use crate::farm::{MiningFarm, MiningProgress, SolutionCallback};
use cinder_primitives::{PowSolution, WorkPackage};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

/// A farm that records everything and searches nothing.
///
/// Tests drive the solution path explicitly through [`TestFarm::submit_found`].
#[derive(Default)]
pub struct TestFarm {
    work: Mutex<Vec<WorkPackage>>,
    mining: AtomicBool,
    gpu: AtomicBool,
    prepared: Mutex<Vec<u64>>,
    callback: RwLock<Option<SolutionCallback>>,
}

impl TestFarm {
    /// Creates an idle farm.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently set work package.
    pub fn current_work(&self) -> Option<WorkPackage> {
        self.work.lock().last().cloned()
    }

    /// How many times work was handed out.
    pub fn work_count(&self) -> usize {
        self.work.lock().len()
    }

    /// Whether the last start was a GPU start.
    pub fn gpu_started(&self) -> bool {
        self.gpu.load(Ordering::Relaxed)
    }

    /// Epochs the coordinator asked to prepare.
    pub fn prepared_epochs(&self) -> Vec<u64> {
        self.prepared.lock().clone()
    }

    /// Feeds a solution back as if a worker had found it; returns whether the
    /// coordinator accepted it.
    pub fn submit_found(&self, solution: PowSolution) -> bool {
        match self.callback.read().as_ref() {
            Some(callback) => callback(solution),
            None => false,
        }
    }
}

impl MiningFarm for TestFarm {
    fn set_work(&self, work: WorkPackage) {
        self.work.lock().push(work);
    }

    fn start_cpu(&self) {
        self.gpu.store(false, Ordering::Relaxed);
        self.mining.store(true, Ordering::Relaxed);
    }

    fn start_gpu(&self) {
        self.gpu.store(true, Ordering::Relaxed);
        self.mining.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.mining.store(false, Ordering::Relaxed);
    }

    fn is_mining(&self) -> bool {
        self.mining.load(Ordering::Relaxed)
    }

    fn progress(&self) -> MiningProgress {
        if self.is_mining() {
            MiningProgress { hashes: 1_000, ms: 1_000 }
        } else {
            MiningProgress::default()
        }
    }

    fn on_solution(&self, callback: SolutionCallback) {
        *self.callback.write() = Some(callback);
    }

    fn prepare_dataset(&self, epoch: u64) {
        self.prepared.lock().push(epoch);
    }
}

impl std::fmt::Debug for TestFarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestFarm").field("mining", &self.is_mining()).finish()
    }
}
