use cinder_primitives::{PowSolution, WorkPackage};

/// Progress of an ongoing proof-of-work search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MiningProgress {
    /// Nonces tried since the current work package was set.
    pub hashes: u64,
    /// Milliseconds spent on the current work package.
    pub ms: u64,
}

impl MiningProgress {
    /// The hash rate in hashes per second.
    pub fn rate(&self) -> u64 {
        if self.ms == 0 {
            return 0
        }
        self.hashes * 1000 / self.ms
    }
}

/// Invoked by the farm when a worker finds a solution; returns whether the
/// coordinator accepted it.
pub type SolutionCallback = Box<dyn Fn(PowSolution) -> bool + Send + Sync>;

/// A pool of proof-of-work workers.
///
/// The search kernel (CPU or GPU) lives behind this trait; the coordinator
/// only hands out work and takes back solutions.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait MiningFarm: Send + Sync {
    /// Replaces the package every worker searches on.
    fn set_work(&self, work: WorkPackage);

    /// Starts CPU workers.
    fn start_cpu(&self);

    /// Starts GPU workers.
    fn start_gpu(&self);

    /// Stops all workers.
    fn stop(&self);

    /// Returns `true` while any worker is searching.
    fn is_mining(&self) -> bool;

    /// Progress of the current search.
    fn progress(&self) -> MiningProgress;

    /// Installs the solution callback.
    fn on_solution(&self, callback: SolutionCallback);

    /// Ensures the dataset for the given epoch is generated before workers
    /// need it.
    fn prepare_dataset(&self, epoch: u64);
}
