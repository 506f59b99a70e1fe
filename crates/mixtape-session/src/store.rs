//! The persistence seam: [`SessionStore`] and the [`Clock`] it stamps with.
//!
//! Session records outlive connections, so they live behind a store
//! trait rather than in the coordinator. Implementations validate
//! records on every write and stamp `updated_at`; the reaper's liveness
//! math depends on that stamp, which is why the clock is injected
//! instead of read ambiently.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use mixtape_protocol::SessionId;

use crate::{Session, StoreError};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock source for `updated_at` stamps and liveness cutoffs.
///
/// Wall time (not a monotonic instant) because the stamps are persisted
/// and must stay comparable across restarts; the inactivity windows are
/// long enough that ordinary clock skew doesn't matter.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to. For tests that need "two hours
/// later" without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts at the current wall time.
    pub fn from_now() -> Self {
        Self::new(SystemTime::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Durable CRUD for session records.
///
/// Writes are last-writer-wins: `save` replaces the stored record with
/// the caller's copy wholesale. Callers that read-modify-write must
/// serialize among themselves (the coordinator holds a per-session lock
/// for exactly this).
///
/// The methods are spelled in desugared form so the returned futures
/// carry an explicit `Send` bound: the coordinator awaits them inside
/// spawned tasks and scheduler jobs, and bare `async fn` in a trait
/// would leave `Send` unprovable behind a generic store.
/// Implementations can still use plain `async fn`.
pub trait SessionStore: Send + Sync + 'static {
    /// The session currently holding `code`, if any. Codes are unique
    /// among live lobbies, so at most one record matches.
    fn find_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    fn find_by_id(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Validates and inserts a new record, stamping `updated_at`.
    /// Returns the stored copy.
    fn create(
        &self,
        session: Session,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Validates and replaces an existing record, stamping `updated_at`.
    /// Returns the stored copy.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the record was deleted in the
    /// meantime; a delete is terminal and a save must not resurrect it.
    fn save(
        &self,
        session: Session,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Removes a record. Idempotent: deleting a missing id is fine.
    fn delete(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every session whose status is not FINISHED. The reaper scans
    /// these and applies the liveness cutoff itself.
    fn find_unfinished(
        &self,
    ) -> impl Future<Output = Result<Vec<Session>, StoreError>> + Send;

    /// Every join code currently on a record. Used once at startup to
    /// reseed the allocator before the server accepts traffic.
    fn live_codes(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
}
