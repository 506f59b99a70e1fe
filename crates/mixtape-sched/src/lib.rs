//! Named background job scheduler for Mixtape.
//!
//! Runs two kinds of jobs on the Tokio runtime: periodic jobs (the
//! session reaper's sweep) and one-shot delayed jobs (advancing a game
//! out of its countdown). Every job has a name, and a name refers to at
//! most one live job — scheduling under a name that is already taken
//! cancels the previous job first. That is what makes the countdown
//! safe to re-arm: there is never a second timer waiting to fire for
//! the same game.
//!
//! # Integration
//!
//! ```ignore
//! let scheduler = Scheduler::new();
//!
//! // Sweep immediately, then every 15 minutes.
//! scheduler.run_periodic("session-reaper", sweep_interval, move || {
//!     let coordinator = coordinator.clone();
//!     async move { coordinator.sweep().await; }
//! });
//!
//! // Flip one game from countdown to active in 15 seconds.
//! scheduler.run_after(format!("countdown:{id}"), countdown, async move {
//!     coordinator.advance(id).await;
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Runs named background jobs, at most one live job per name.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    /// Creates a scheduler with no jobs.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `job` now and then once per `period`, until cancelled.
    ///
    /// Runs never overlap: a slow execution delays the next one rather
    /// than stacking catch-up runs behind it. Any live job under the
    /// same name is cancelled first.
    pub fn run_periodic<F, Fut>(
        &self,
        name: impl Into<String>,
        period: Duration,
        mut job: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(job = %name, ?period, "periodic job scheduled");

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                job().await;
            }
        });

        self.install(name, handle);
    }

    /// Runs `job` once after `delay`. Any live job under the same name
    /// is cancelled first.
    pub fn run_after<Fut>(&self, name: impl Into<String>, delay: Duration, job: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(job = %name, ?delay, "one-shot job scheduled");

        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            job.await;
        });

        self.install(name, handle);
    }

    /// Cancels the job registered under `name`.
    ///
    /// Returns `true` if a job was still live to cancel. A one-shot
    /// that already ran counts as gone.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self.jobs.lock().expect("scheduler jobs lock").remove(name);
        match removed {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                debug!(job = %name, "job cancelled");
                true
            }
            _ => false,
        }
    }

    /// Whether a live job is registered under `name`.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs
            .lock()
            .expect("scheduler jobs lock")
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of live jobs.
    pub fn job_count(&self) -> usize {
        let mut jobs = self.jobs.lock().expect("scheduler jobs lock");
        jobs.retain(|_, handle| !handle.is_finished());
        jobs.len()
    }

    /// Cancels every job. The scheduler can be reused afterwards.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().expect("scheduler jobs lock");
        for (name, handle) in jobs.drain() {
            handle.abort();
            debug!(job = %name, "job cancelled at shutdown");
        }
    }

    /// Stores a handle under a name, cancelling whatever held the name
    /// before. Finished one-shots are pruned on the way through so the
    /// map does not accumulate dead handles.
    fn install(&self, name: String, handle: JoinHandle<()>) {
        let mut jobs = self.jobs.lock().expect("scheduler jobs lock");
        jobs.retain(|_, existing| !existing.is_finished());
        if let Some(previous) = jobs.insert(name.clone(), handle) {
            previous.abort();
            debug!(job = %name, "previous job under this name cancelled");
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
