//! Background job submission
//!
//! Voxelization jobs are fire-and-forget closures. Each job reports back to
//! the host over a channel, so the host never shares its queues or the
//! atlas with workers.

use std::sync::Arc;

/// A unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes jobs, possibly on other threads
pub trait JobSystem: Send + Sync {
    fn submit(&self, job: Job);

    /// Human-readable backend name for logs
    fn name(&self) -> &'static str;
}

/// Runs jobs on rayon's global thread pool
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonJobs;

impl JobSystem for RayonJobs {
    fn submit(&self, job: Job) {
        rayon::spawn(job);
    }

    fn name(&self) -> &'static str {
        "rayon"
    }
}

/// Runs each job immediately on the submitting thread
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineJobs;

impl JobSystem for InlineJobs {
    fn submit(&self, job: Job) {
        job();
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

pub fn default_jobs() -> Arc<dyn JobSystem> {
    Arc::new(RayonJobs)
}
