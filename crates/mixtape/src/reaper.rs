//! The reaper: the sweep that finishes abandoned sessions.
//!
//! Parties end without anyone pressing a button: phones die, people go
//! home, tabs close. The reaper runs on a fixed interval — once
//! immediately at startup, then periodically — scans every unfinished
//! session, and finishes those whose `updated_at` predates the liveness
//! cutoff, releasing their join codes on the way.
//!
//! Per-record failures are isolated: one record the store refuses to
//! save is logged and skipped, never allowed to halt the sweep or the
//! schedule. The connection registry is deliberately untouched — clients
//! bound to a reaped room just stop hearing game events and discover the
//! FINISHED status on their next interaction.

use mixtape_protocol::SessionId;
use mixtape_session::{SessionStore, TokenCodec};

use crate::coordinator::{Coordinator, REAPER_JOB, countdown_job};

impl<S: SessionStore, T: TokenCodec> Coordinator<S, T> {
    /// Schedules the periodic sweep. The first run fires immediately.
    ///
    /// Like the countdown timer, the job holds only a weak reference so
    /// the coordinator's own scheduler never keeps it alive.
    pub fn spawn_reaper(&self) {
        let weak = std::sync::Arc::downgrade(&self.inner);
        self.inner.sched.run_periodic(
            REAPER_JOB,
            self.inner.config.sweep_interval,
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        (Coordinator { inner }).sweep().await;
                    }
                }
            },
        );
    }

    /// One sweep over the store. Returns how many sessions were reaped.
    ///
    /// Public so tests (and operational tooling) can trigger a sweep
    /// without waiting out the interval.
    pub async fn sweep(&self) -> usize {
        let candidates = match self.inner.store.find_unfinished().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(error = %err, "reaper scan failed, skipping sweep");
                return 0;
            }
        };
        // A clock too close to the epoch cannot have stale sessions.
        let Some(cutoff) = self
            .inner
            .clock
            .now()
            .checked_sub(self.inner.config.inactive_timeout)
        else {
            return 0;
        };

        let mut reaped = 0;
        for candidate in candidates {
            if candidate.updated_at >= cutoff {
                continue;
            }
            if self.reap(candidate.id, cutoff).await {
                reaped += 1;
            }
        }
        if reaped > 0 {
            tracing::info!(reaped, "inactive sessions finished");
        }
        reaped
    }

    /// Finishes one stale session. Returns whether it was actually
    /// reaped; `false` covers both benign races (touched, finished, or
    /// deleted since the scan) and isolated save failures.
    async fn reap(&self, id: SessionId, cutoff: std::time::SystemTime) -> bool {
        let lock = self.session_lock(id);
        let guard = lock.lock().await;

        let mut session = match self.inner.store.find_by_id(id).await {
            Ok(Some(session)) if !session.status.is_finished() => session,
            Ok(_) => return false,
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "reaper read failed");
                return false;
            }
        };
        // Re-check under the lock: a mutation may have landed between
        // the scan and here.
        if session.updated_at >= cutoff {
            return false;
        }

        let released = session.finish();
        match self.inner.store.save(session).await {
            Ok(_) => {
                if let Some(code) = released {
                    self.inner.codes.release(&code);
                }
                self.inner.sched.cancel(&countdown_job(id));
                drop(guard);
                // FINISHED is terminal, so the lock has no further job.
                self.inner.locks.remove(&id);
                tracing::debug!(session = %id, "inactive session reaped");
                true
            }
            Err(err) => {
                tracing::warn!(
                    session = %id,
                    error = %err,
                    "reaper save failed, skipping record"
                );
                false
            }
        }
    }
}
