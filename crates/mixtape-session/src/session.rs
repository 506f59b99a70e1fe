//! Session records: the data and lifecycle rules of one game.
//!
//! A [`Session`] is the server's record of one party-quiz game. It tracks:
//! - WHERE it is in its life (`status`, see the diagram below)
//! - HOW players get in while it lasts (`code`)
//! - WHO is playing (`players`, first one is the author)
//! - WHAT will play (`playlist`, `shuffle`)
//! - WHEN it was last touched (`updated_at`, read by the reaper)
//!
//! ```text
//!   LOBBY ──(author starts)──→ COUNTDOWN ──(timer)──→ ACTIVE
//!     │                            │                    │
//!     └──(author leaves / reaper)──┴────────────────────┴──→ FINISHED
//! ```
//!
//! The methods here are pure state transitions: they never touch the
//! store, the allocator, or the network. The coordinator owns those side
//! effects and calls in here for the rules. A method that clears the
//! join code hands it back to the caller, because only the caller knows
//! whether the surrounding save committed.

use std::time::SystemTime;

use mixtape_protocol::{
    PlayerId, PlayerSnapshot, SessionId, SessionSnapshot, SessionStatus,
};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionLimits
// ---------------------------------------------------------------------------

/// Roster and name bounds, enforced by the store on every write.
///
/// These live in config rather than constants so a small private party
/// server and a big venue install can run the same binary.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// A session never holds fewer players than this (the author counts).
    pub min_players: usize,
    /// Joins that would push the roster past this fail validation.
    pub max_players: usize,
    /// Player names are 1..=this many characters.
    pub max_name_len: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            min_players: 1,
            max_players: 10,
            max_name_len: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One participant, owned by exactly one session.
///
/// Players have no identity outside their session; the id is minted when
/// they are appended to a roster and dies with the record.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Exactly one player per session carries `true`; it is set on the
    /// first player at creation and never moves.
    pub author: bool,
    /// Mutable during active play; zero until then.
    pub score: i64,
}

impl Player {
    pub fn new(name: impl Into<String>, author: bool) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            author,
            score: 0,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            author: self.author,
            score: self.score,
        }
    }
}

// ---------------------------------------------------------------------------
// LeaveOutcome
// ---------------------------------------------------------------------------

/// What a successful [`Session::leave`] did, so the coordinator knows
/// which side effects to run.
#[derive(Debug, PartialEq)]
pub enum LeaveOutcome {
    /// The author left; the whole session is finished. Carries the join
    /// code to release if the session was still in the lobby.
    Finished { released_code: Option<String> },

    /// A non-author left; the roster shrank, status unchanged.
    Departed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One game session, from lobby to finish.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    /// The join code players type in. `Some` iff the session is still a
    /// lobby; cleared (and released by the coordinator) the moment the
    /// session leaves LOBBY.
    pub code: Option<String>,
    pub status: SessionStatus,
    /// Ordered roster. The author is whoever carries the flag, by
    /// convention the first entry.
    pub players: Vec<Player>,
    /// Opaque playlist reference, set at start. The catalog lookup
    /// behind it lives outside this crate.
    pub playlist: Option<String>,
    pub shuffle: bool,
    /// Stamped by the store on every create/save; the reaper compares
    /// it against the liveness cutoff.
    pub updated_at: SystemTime,
}

impl Session {
    /// A fresh lobby holding `code`, with the author as its only player.
    ///
    /// `updated_at` starts at the epoch; the store stamps the real time
    /// when the record is first written.
    pub fn new(code: String, author_name: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            code: Some(code),
            status: SessionStatus::Lobby,
            players: vec![Player::new(author_name, true)],
            playlist: None,
            shuffle: false,
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }

    // -- Lookups ----------------------------------------------------------

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// The player carrying the author flag.
    pub fn author(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.author)
    }

    // -- Transitions ------------------------------------------------------

    /// Appends a player to a lobby roster.
    ///
    /// Only checks the state rule; roster and name bounds are the
    /// store's job at save time so storage-level and domain-level
    /// validation stay one thing.
    ///
    /// # Errors
    /// [`SessionError::GameInProgress`] / [`SessionError::GameFinished`]
    /// when the session is past the lobby; the description tells the
    /// joiner why the code no longer works.
    pub fn join(&mut self, name: impl Into<String>) -> Result<PlayerId, SessionError> {
        self.guard_lobby()?;
        let player = Player::new(name, false);
        let id = player.id;
        self.players.push(player);
        Ok(id)
    }

    /// Starts the game: lobby → countdown.
    ///
    /// Records the playlist choice, clears the join code, and returns it
    /// so the caller can release it after the save commits. From this
    /// point the code can reappear on someone else's brand-new lobby.
    ///
    /// # Errors
    /// - [`SessionError::PlayerNotFound`] if `caller` is not on the roster
    /// - [`SessionError::NotAuthor`] if `caller` lacks the author flag
    /// - [`SessionError::GameInProgress`] / [`SessionError::GameFinished`]
    ///   outside the lobby
    pub fn start(
        &mut self,
        caller: PlayerId,
        playlist: Option<String>,
        shuffle: bool,
    ) -> Result<Option<String>, SessionError> {
        let player = self
            .player(caller)
            .ok_or(SessionError::PlayerNotFound(caller))?;
        if !player.author {
            return Err(SessionError::NotAuthor);
        }
        self.guard_lobby()?;

        self.playlist = playlist;
        self.shuffle = shuffle;
        self.status = SessionStatus::Countdown;
        Ok(self.code.take())
    }

    /// Moves a counted-down session into active play.
    ///
    /// Returns `false` without touching anything when the session is no
    /// longer in COUNTDOWN (the timer lost a race against a finish).
    pub fn activate(&mut self) -> bool {
        if self.status == SessionStatus::Countdown {
            self.status = SessionStatus::Active;
            true
        } else {
            false
        }
    }

    /// Removes `caller` from the game.
    ///
    /// The author leaving finishes the session for everyone, whatever
    /// its live status; anyone else is dropped from the roster in place.
    /// `allow_in_progress` is the policy switch for non-authors once the
    /// game has started.
    ///
    /// # Errors
    /// - [`SessionError::PlayerNotFound`] if `caller` is not on the roster
    /// - [`SessionError::GameFinished`] if the session already ended
    /// - [`SessionError::LeaveDenied`] for a non-author mid-game when
    ///   policy forbids it
    pub fn leave(
        &mut self,
        caller: PlayerId,
        allow_in_progress: bool,
    ) -> Result<LeaveOutcome, SessionError> {
        let player = self
            .player(caller)
            .ok_or(SessionError::PlayerNotFound(caller))?;
        if self.status.is_finished() {
            return Err(SessionError::GameFinished);
        }

        if player.author {
            Ok(LeaveOutcome::Finished {
                released_code: self.finish(),
            })
        } else {
            if self.status.is_in_progress() && !allow_in_progress {
                return Err(SessionError::LeaveDenied);
            }
            self.players.retain(|p| p.id != caller);
            Ok(LeaveOutcome::Departed)
        }
    }

    /// Terminal transition. Idempotent; returns the join code to release
    /// when the session was still a lobby.
    pub fn finish(&mut self) -> Option<String> {
        if self.status.is_finished() {
            return None;
        }
        self.status = SessionStatus::Finished;
        self.code.take()
    }

    // -- Views ------------------------------------------------------------

    /// The point-in-time copy sent to clients.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            code: self.code.clone(),
            status: self.status,
            players: self.players.iter().map(Player::snapshot).collect(),
            playlist: self.playlist.clone(),
            shuffle: self.shuffle,
            updated_at: self
                .updated_at
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Schema validation, run by the store on every write. Returns the
    /// first violated rule as a player-readable message.
    pub fn validate(&self, limits: &SessionLimits) -> Result<(), String> {
        if self.players.len() < limits.min_players {
            return Err(format!(
                "a game needs at least {} player(s)",
                limits.min_players
            ));
        }
        if self.players.len() > limits.max_players {
            return Err(format!(
                "game is full ({} players max)",
                limits.max_players
            ));
        }
        let authors = self.players.iter().filter(|p| p.author).count();
        if authors != 1 {
            return Err(format!("a game needs exactly one author, found {authors}"));
        }
        for player in &self.players {
            let len = player.name.chars().count();
            if len == 0 {
                return Err("player name must not be empty".into());
            }
            if len > limits.max_name_len {
                return Err(format!(
                    "player name must be at most {} characters",
                    limits.max_name_len
                ));
            }
        }
        Ok(())
    }

    fn guard_lobby(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Lobby => Ok(()),
            SessionStatus::Countdown | SessionStatus::Active => {
                Err(SessionError::GameInProgress)
            }
            SessionStatus::Finished => Err(SessionError::GameFinished),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
