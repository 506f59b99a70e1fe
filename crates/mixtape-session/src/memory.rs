//! In-memory [`SessionStore`] backed by a concurrent map.
//!
//! The default store for development, tests, and single-node installs.
//! It enforces the same schema rules a durable backend would, so the
//! coordinator sees identical validation behavior whichever store is
//! wired in.

use std::sync::Arc;

use dashmap::DashMap;
use mixtape_protocol::SessionId;

use crate::{Clock, Session, SessionLimits, SessionStore, StoreError, SystemClock};

/// A validating, clock-stamping store over a [`DashMap`].
pub struct MemoryStore {
    sessions: DashMap<SessionId, Session>,
    limits: SessionLimits,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Default limits, real clock.
    pub fn new() -> Self {
        Self::with(SessionLimits::default(), Arc::new(SystemClock))
    }

    pub fn with(limits: SessionLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            limits,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn validated(&self, session: Session) -> Result<Session, StoreError> {
        session
            .validate(&self.limits)
            .map_err(StoreError::Validation)?;
        Ok(session)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Session>, StoreError> {
        // Linear scan: the live-session count is small by design, and
        // codes are unique among records that still carry one.
        Ok(self
            .sessions
            .iter()
            .find(|entry| entry.value().code.as_deref() == Some(code))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, session: Session) -> Result<Session, StoreError> {
        let mut session = self.validated(session)?;
        session.updated_at = self.clock.now();

        if self.sessions.contains_key(&session.id) {
            return Err(StoreError::Backend(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        self.sessions.insert(session.id, session.clone());
        tracing::debug!(id = %session.id, "session record created");
        Ok(session)
    }

    async fn save(&self, session: Session) -> Result<Session, StoreError> {
        let mut session = self.validated(session)?;
        session.updated_at = self.clock.now();

        match self.sessions.get_mut(&session.id) {
            Some(mut stored) => {
                *stored = session.clone();
                Ok(session)
            }
            None => Err(StoreError::NotFound(session.id)),
        }
    }

    async fn delete(&self, id: SessionId) -> Result<(), StoreError> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn find_unfinished(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| !entry.value().status.is_finished())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn live_codes(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().code.clone())
            .collect())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use std::time::{Duration, SystemTime};

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[tokio::test]
    async fn test_create_stamps_updated_at() {
        let clock = Arc::new(ManualClock::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1000),
        ));
        let store = MemoryStore::with(SessionLimits::default(), clock.clone());

        let stored = store
            .create(Session::new("101010".into(), "ada"))
            .await
            .unwrap();

        assert_eq!(
            stored.updated_at,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1000)
        );
    }

    #[tokio::test]
    async fn test_save_restamps_updated_at() {
        let clock = Arc::new(ManualClock::new(SystemTime::UNIX_EPOCH));
        let store = MemoryStore::with(SessionLimits::default(), clock.clone());
        let stored = store
            .create(Session::new("101010".into(), "ada"))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(60));
        let saved = store.save(stored).await.unwrap();

        assert_eq!(
            saved.updated_at,
            SystemTime::UNIX_EPOCH + Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_find_by_code_returns_the_matching_lobby() {
        let store = store();
        let stored = store
            .create(Session::new("123456".into(), "ada"))
            .await
            .unwrap();
        store
            .create(Session::new("654321".into(), "grace"))
            .await
            .unwrap();

        let found = store.find_by_code("123456").await.unwrap();

        assert_eq!(found.map(|s| s.id), Some(stored.id));
        assert!(store.find_by_code("000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_code_ignores_cleared_codes() {
        let store = store();
        let mut stored = store
            .create(Session::new("123456".into(), "ada"))
            .await
            .unwrap();
        stored.finish();
        store.save(stored).await.unwrap();

        assert!(store.find_by_code("123456").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_names() {
        let store = store();

        let err = store
            .create(Session::new("123456".into(), ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = store
            .create(Session::new("123456".into(), "x".repeat(17)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_save_rejects_overfull_roster() {
        let store = store();
        let mut stored = store
            .create(Session::new("123456".into(), "ada"))
            .await
            .unwrap();
        for i in 0..10 {
            stored.join(format!("p{i}")).unwrap();
        }

        let err = store.save(stored).await.unwrap_err();

        match err {
            StoreError::Validation(msg) => assert!(msg.contains("full")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_after_delete_fails_not_found() {
        // A reaped-then-deleted session must stay gone; last-writer-wins
        // applies to content, not to existence.
        let store = store();
        let stored = store
            .create(Session::new("123456".into(), "ada"))
            .await
            .unwrap();
        store.delete(stored.id).await.unwrap();

        let err = store.save(stored).await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store();
        let stored = store
            .create(Session::new("123456".into(), "ada"))
            .await
            .unwrap();

        store.delete(stored.id).await.unwrap();
        store.delete(stored.id).await.unwrap();

        assert!(store.find_by_id(stored.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_unfinished_skips_finished_records() {
        let store = store();
        store
            .create(Session::new("111111".into(), "ada"))
            .await
            .unwrap();
        let mut done = store
            .create(Session::new("222222".into(), "grace"))
            .await
            .unwrap();
        done.finish();
        store.save(done).await.unwrap();

        let unfinished = store.find_unfinished().await.unwrap();

        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].code.as_deref(), Some("111111"));
    }

    #[tokio::test]
    async fn test_store_calls_run_inside_spawned_tasks() {
        // The reaper and the connection handlers await store calls from
        // spawned tasks behind a generic store, so the trait futures
        // must be Send even when the concrete type is unknown.
        async fn scan<S: SessionStore>(store: Arc<S>) -> usize {
            tokio::spawn(async move {
                store.find_unfinished().await.unwrap().len()
            })
            .await
            .unwrap()
        }

        let store = Arc::new(store());
        store
            .create(Session::new("123456".into(), "ada"))
            .await
            .unwrap();

        assert_eq!(scan(store).await, 1);
    }

    #[tokio::test]
    async fn test_live_codes_lists_only_held_codes() {
        let store = store();
        store
            .create(Session::new("111111".into(), "ada"))
            .await
            .unwrap();
        let mut started = store
            .create(Session::new("222222".into(), "grace"))
            .await
            .unwrap();
        let author = started.author().unwrap().id;
        started.start(author, None, false).unwrap();
        store.save(started).await.unwrap();

        let mut codes = store.live_codes().await.unwrap();
        codes.sort();

        assert_eq!(codes, vec!["111111".to_string()]);
    }
}
