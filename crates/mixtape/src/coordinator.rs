//! The session coordinator: where events meet the rules.
//!
//! The coordinator owns every moving part of the core — store, token
//! codec, code allocator, connection registry, per-session locks,
//! scheduler, clock — and wires inbound client events through one
//! pipeline: decode the credential, run the state-machine operation,
//! persist, route the results. There are no ambient globals; everything
//! is a field, constructed once and shared behind an `Arc`.
//!
//! # Error boundary
//!
//! [`Coordinator::dispatch`] is the single error-translation step. Every
//! handler returns `Result<(), SessionError>`; a failure becomes one
//! private `ERROR {kind, message}` reply to the originating connection
//! and nothing else. Failures never reach a room broadcast, and a failed
//! operation leaves no trace in shared state (the create and join paths
//! roll their side effects back if a later step fails).
//!
//! # Consistency
//!
//! Read-validate-write sequences against one session run under a
//! per-session async mutex, so two joins racing for the last roster slot
//! serialize and the loser fails validation cleanly. Code mint+reserve
//! is its own critical section inside the allocator.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use mixtape_protocol::{ClientEvent, ServerEvent, SessionId};
use mixtape_room::{ConnectionRegistry, EventReceiver};
use mixtape_sched::Scheduler;
use mixtape_session::{
    Clock, CodeAllocator, LeaveOutcome, Session, SessionError, SessionStore,
    SystemClock, TokenCodec,
};
use mixtape_transport::ConnectionId;

use crate::MixtapeConfig;

/// Name of the periodic reaper job on the scheduler.
pub(crate) const REAPER_JOB: &str = "session-reaper";

/// Name of the one-shot countdown job for one session. One name per
/// session, so re-arming or cancelling targets exactly that game.
pub(crate) fn countdown_job(id: SessionId) -> String {
    format!("countdown:{id}")
}

pub(crate) struct Inner<S, T> {
    pub(crate) store: S,
    pub(crate) tokens: T,
    pub(crate) codes: CodeAllocator,
    pub(crate) registry: ConnectionRegistry<ServerEvent>,
    /// One mutex per session, guarding its read-validate-write window.
    /// Entries are pruned the moment a session finishes (author leave
    /// or reap), so the map tracks the live-session population.
    pub(crate) locks: DashMap<SessionId, Arc<Mutex<()>>>,
    pub(crate) sched: Scheduler,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: MixtapeConfig,
}

/// A cheap handle onto the coordinator state. Clone freely; all clones
/// share the same store, registry, allocator, and scheduler.
pub struct Coordinator<S, T> {
    pub(crate) inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for Coordinator<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SessionStore, T: TokenCodec> Coordinator<S, T> {
    /// A coordinator on the real clock.
    pub fn new(store: S, tokens: T, config: MixtapeConfig) -> Self {
        Self::with_clock(store, tokens, config, Arc::new(SystemClock))
    }

    /// A coordinator with an injected clock, for liveness tests.
    ///
    /// The clock here only drives the reaper's cutoff math; the store
    /// stamps `updated_at` with its own clock, so tests should hand the
    /// same one to both.
    pub fn with_clock(
        store: S,
        tokens: T,
        config: MixtapeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codes = CodeAllocator::new(config.code_length);
        Self {
            inner: Arc::new(Inner {
                store,
                tokens,
                codes,
                registry: ConnectionRegistry::new(),
                locks: DashMap::new(),
                sched: Scheduler::new(),
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &MixtapeConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn codes(&self) -> &CodeAllocator {
        &self.inner.codes
    }

    /// Rebuilds the allocator's used-code set from the store. Must
    /// complete before the first `create` can race it, i.e. before the
    /// server accepts traffic.
    pub async fn seed_codes(&self) -> Result<usize, SessionError> {
        let codes = self.inner.store.live_codes().await?;
        let count = codes.len();
        self.inner.codes.seed(codes);
        tracing::info!(count, "join codes reseeded from the store");
        Ok(count)
    }

    // -- Connection lifetime ----------------------------------------------

    /// Registers a connection; the returned receiver feeds its writer.
    pub fn register(&self, conn: ConnectionId) -> EventReceiver<ServerEvent> {
        self.inner.registry.register(conn)
    }

    /// Forgets a connection: channel and room membership.
    pub fn deregister(&self, conn: ConnectionId) {
        self.inner.registry.deregister(conn);
    }

    /// Direct reply to one connection, bypassing dispatch. Used by the
    /// connection handler for frames that never decode into an event.
    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.inner.registry.send_to(conn, event)
    }

    // -- Dispatch ---------------------------------------------------------

    /// Routes one client event through its handler. Infallible from the
    /// caller's view: every failure is translated into a private ERROR
    /// reply right here, and nothing propagates.
    pub async fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        let name = event.name();
        tracing::debug!(connection = %conn, event = name, "dispatching event");

        let result = match event {
            ClientEvent::Create { name } => self.handle_create(conn, name).await,
            ClientEvent::Join { code, name } => {
                self.handle_join(conn, code, name).await
            }
            ClientEvent::Connect { token } => self.handle_connect(conn, token).await,
            ClientEvent::Start {
                token,
                playlist,
                shuffle,
            } => self.handle_start(conn, token, playlist, shuffle).await,
            ClientEvent::Leave { token } => self.handle_leave(conn, token).await,
            ClientEvent::Echo { message } => self.handle_echo(conn, message),
        };

        if let Err(err) = result {
            tracing::debug!(
                connection = %conn,
                event = name,
                error = %err,
                "event rejected"
            );
            self.inner
                .registry
                .send_to(conn, ServerEvent::error(err.kind(), err.to_string()));
        }
    }

    // -- Handlers ---------------------------------------------------------

    /// CREATE: mint a code, open a lobby with the caller as author,
    /// reply privately with the session, the author's player token, and
    /// a shareable invite token.
    async fn handle_create(
        &self,
        conn: ConnectionId,
        name: String,
    ) -> Result<(), SessionError> {
        let code = self.inner.codes.mint()?;

        let stored = match self.inner.store.create(Session::new(code.clone(), name)).await
        {
            Ok(stored) => stored,
            Err(err) => {
                // The record never existed; just hand the code back.
                self.inner.codes.release(&code);
                return Err(err.into());
            }
        };
        let author = stored
            .author()
            .map(|p| p.id)
            .ok_or_else(|| SessionError::Internal("created session has no author".into()))?;

        let token = match self.inner.tokens.encode_player(stored.id, &code, author).await
        {
            Ok(token) => token,
            Err(err) => {
                self.rollback_create(&stored, &code).await;
                return Err(err.into());
            }
        };
        let invite = match self.inner.tokens.encode_invite(&code).await {
            Ok(invite) => invite,
            Err(err) => {
                self.rollback_create(&stored, &code).await;
                return Err(err.into());
            }
        };

        tracing::info!(session = %stored.id, code = %code, "session created");
        self.inner.registry.send_to(
            conn,
            ServerEvent::Created {
                session: stored.snapshot(),
                token,
                invite,
            },
        );
        Ok(())
    }

    /// Undo half a create when token minting fails: a client without
    /// credentials can never use the session, and an unreleased code
    /// would leak out of the pool.
    async fn rollback_create(&self, session: &Session, code: &str) {
        if let Err(err) = self.inner.store.delete(session.id).await {
            tracing::warn!(
                session = %session.id,
                error = %err,
                "rollback delete failed; the reaper will finish it"
            );
        }
        self.inner.codes.release(code);
    }

    /// JOIN: append a player to the lobby holding `code`, reply
    /// privately with the new player token. The room hears nothing until
    /// the player actually connects.
    async fn handle_join(
        &self,
        conn: ConnectionId,
        code: String,
        name: String,
    ) -> Result<(), SessionError> {
        let found = self
            .inner
            .store
            .find_by_code(&code)
            .await?
            .ok_or_else(|| SessionError::CodeNotFound(code.clone()))?;

        let lock = self.session_lock(found.id);
        let _guard = lock.lock().await;

        // Re-read under the lock: the session may have started, finished,
        // or been reaped between the lookup and here. A session that left
        // the lobby in that window fails the status guard below with the
        // status-specific description.
        let mut session = self
            .inner
            .store
            .find_by_id(found.id)
            .await?
            .ok_or_else(|| SessionError::CodeNotFound(code.clone()))?;

        let player = session.join(name)?;
        let session_id = session.id;
        let saved = self.inner.store.save(session).await?;

        let token = match self
            .inner
            .tokens
            .encode_player(session_id, &code, player)
            .await
        {
            Ok(token) => token,
            Err(err) => {
                // Undo the append so a mint failure leaves no ghost
                // player on the roster.
                let mut session = saved;
                session.players.retain(|p| p.id != player);
                if let Err(undo) = self.inner.store.save(session).await {
                    tracing::warn!(
                        session = %session_id,
                        error = %undo,
                        "failed to undo join after token mint failure"
                    );
                }
                return Err(err.into());
            }
        };

        tracing::info!(session = %session_id, player = %player, "player joined");
        self.inner.registry.send_to(conn, ServerEvent::Joined { token });
        Ok(())
    }

    /// CONNECT: bind the connection to its session's room. Idempotent —
    /// reconnecting (or connecting from a second device) just rebinds,
    /// leaving any previous room. The caller gets the session privately;
    /// everyone already in the room gets the arrival notice.
    async fn handle_connect(
        &self,
        conn: ConnectionId,
        token: String,
    ) -> Result<(), SessionError> {
        let claims = self.inner.tokens.decode_player(&token).await?;

        let session = self
            .inner
            .store
            .find_by_id(claims.session)
            .await?
            .ok_or(SessionError::SessionNotFound(claims.session))?;
        if session.status.is_finished() {
            return Err(SessionError::GameFinished);
        }
        let player = session
            .player(claims.player)
            .ok_or(SessionError::PlayerNotFound(claims.player))?
            .snapshot();

        self.inner
            .registry
            .bind(conn, session.id)
            .map_err(|err| SessionError::Internal(err.to_string()))?;

        let snapshot = session.snapshot();
        self.inner.registry.broadcast_except(
            session.id,
            conn,
            ServerEvent::PlayerConnected {
                session: snapshot.clone(),
                player: player.clone(),
            },
        );
        self.inner.registry.send_to(
            conn,
            ServerEvent::Connected {
                session: snapshot,
                player,
            },
        );
        Ok(())
    }

    /// START: author only, lobby only. Transitions to COUNTDOWN, frees
    /// the join code for re-minting, arms the countdown timer, and
    /// broadcasts the updated session to the room.
    async fn handle_start(
        &self,
        _conn: ConnectionId,
        token: String,
        playlist: Option<String>,
        shuffle: bool,
    ) -> Result<(), SessionError> {
        let claims = self.inner.tokens.decode_player(&token).await?;

        let lock = self.session_lock(claims.session);
        let _guard = lock.lock().await;

        let mut session = self
            .inner
            .store
            .find_by_id(claims.session)
            .await?
            .ok_or(SessionError::SessionNotFound(claims.session))?;
        let released = session.start(claims.player, playlist, shuffle)?;
        let saved = self.inner.store.save(session).await?;

        // Only once the save has committed is the code truly out of
        // circulation; release it now so a new lobby can wear it.
        if let Some(code) = released {
            self.inner.codes.release(&code);
        }
        self.schedule_countdown(saved.id);

        tracing::info!(session = %saved.id, "game started");
        self.inner.registry.broadcast(
            saved.id,
            ServerEvent::SessionUpdated {
                session: saved.snapshot(),
            },
        );
        Ok(())
    }

    /// LEAVE: the author leaving finishes the session for everyone;
    /// anyone else is removed from the roster in place (subject to the
    /// in-progress policy). The caller's connection always leaves the
    /// room before the departure is broadcast.
    async fn handle_leave(
        &self,
        conn: ConnectionId,
        token: String,
    ) -> Result<(), SessionError> {
        let claims = self.inner.tokens.decode_player(&token).await?;

        let lock = self.session_lock(claims.session);
        let guard = lock.lock().await;

        let mut session = self
            .inner
            .store
            .find_by_id(claims.session)
            .await?
            .ok_or(SessionError::SessionNotFound(claims.session))?;
        let outcome = session.leave(claims.player, self.inner.config.allow_leave_in_progress)?;
        let saved = self.inner.store.save(session).await?;

        self.inner.registry.unbind(conn);

        match outcome {
            LeaveOutcome::Finished { released_code } => {
                if let Some(code) = released_code {
                    self.inner.codes.release(&code);
                }
                self.inner.sched.cancel(&countdown_job(saved.id));
                drop(guard);
                // FINISHED is terminal, so the lock has no further job.
                self.inner.locks.remove(&saved.id);
                tracing::info!(session = %saved.id, "author left, session finished");
            }
            LeaveOutcome::Departed => {
                tracing::info!(
                    session = %saved.id,
                    player = %claims.player,
                    "player left"
                );
            }
        }

        self.inner.registry.broadcast(
            saved.id,
            ServerEvent::SessionUpdated {
                session: saved.snapshot(),
            },
        );
        Ok(())
    }

    /// ECHO: diagnostic mirror. When disabled the frame is ignored the
    /// same way an unregistered handler would ignore it — a debug log,
    /// no reply, so production deployments leak nothing.
    fn handle_echo(
        &self,
        conn: ConnectionId,
        message: String,
    ) -> Result<(), SessionError> {
        if self.inner.config.echo_enabled {
            self.inner.registry.send_to(conn, ServerEvent::Echo { message });
        } else {
            tracing::debug!(connection = %conn, "echo disabled, frame ignored");
        }
        Ok(())
    }

    // -- Countdown --------------------------------------------------------

    /// Arms the COUNTDOWN → ACTIVE timer for one session.
    ///
    /// The job holds only a weak reference: a coordinator that has been
    /// dropped (tests, shutdown) must not be kept alive by its own
    /// timers.
    fn schedule_countdown(&self, id: SessionId) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.sched.run_after(
            countdown_job(id),
            self.inner.config.countdown,
            async move {
                if let Some(inner) = weak.upgrade() {
                    Coordinator { inner }.advance(id).await;
                }
            },
        );
    }

    /// Moves one session out of COUNTDOWN. Does nothing if the session
    /// is gone or no longer counting down (the timer lost a race against
    /// a finish); a save failure is logged, not retried — the session
    /// simply stays in COUNTDOWN until something else touches it.
    pub(crate) async fn advance(&self, id: SessionId) {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;

        let mut session = match self.inner.store.find_by_id(id).await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "countdown read failed");
                return;
            }
        };
        if !session.activate() {
            return;
        }

        match self.inner.store.save(session).await {
            Ok(saved) => {
                tracing::info!(session = %id, "countdown over, game active");
                self.inner.registry.broadcast(
                    id,
                    ServerEvent::SessionUpdated {
                        session: saved.snapshot(),
                    },
                );
            }
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "countdown save failed");
            }
        }
    }

    /// The mutex serializing mutations of one session.
    pub(crate) fn session_lock(&self, id: SessionId) -> Arc<Mutex<()>> {
        self.inner.locks.entry(id).or_default().clone()
    }

    /// Number of sessions currently holding a mutation lock. Entries
    /// die with their session, so this tracks the live-session count.
    pub fn lock_count(&self) -> usize {
        self.inner.locks.len()
    }
}
