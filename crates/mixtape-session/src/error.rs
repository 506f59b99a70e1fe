//! Error types for the session domain.
//!
//! Three enums, one per concern: [`SessionError`] for lifecycle rules,
//! [`StoreError`] for persistence, [`TokenError`] for credentials. The
//! coordinator folds the latter two into [`SessionError`] (via the `From`
//! impls below) so a client reply is always built from one type, and a
//! storage-layer validation failure is indistinguishable on the wire
//! from a domain-level one.

use mixtape_protocol::{ErrorKind, PlayerId, SessionId};

/// Errors produced by session lifecycle operations.
///
/// The `#[error("...")]` strings double as the human-readable
/// descriptions clients see, so they are written for players, not logs.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No lobby currently holds this join code.
    #[error("no game with code {0}")]
    CodeNotFound(String),

    /// A token's session id no longer resolves to a record.
    #[error("game not found")]
    SessionNotFound(SessionId),

    /// A token's player id is not on the roster.
    #[error("player not found")]
    PlayerNotFound(PlayerId),

    /// The credential failed to decode: bad signature, expired, or
    /// malformed. Decode failures fold into NotFound on the wire so
    /// callers can't probe the difference between "bad token" and
    /// "unknown token"; a failed mint is the server's fault instead.
    #[error("invalid or expired token")]
    Token(#[from] TokenError),

    /// The action needs a lobby but the game is already underway.
    #[error("Game is in progress")]
    GameInProgress,

    /// The action targets a finished session.
    #[error("Game is finished")]
    GameFinished,

    /// A privileged action from a player without the author flag.
    #[error("Only the author can start the game")]
    NotAuthor,

    /// Leaving mid-game is disabled by configuration.
    #[error("Cannot leave a game in progress")]
    LeaveDenied,

    /// Roster or name constraints violated. The message may originate
    /// from the persistence layer's own validation.
    #[error("{0}")]
    Validation(String),

    /// Every candidate join code collided, even after widening.
    #[error("no join codes available")]
    CodesExhausted,

    /// Storage failed for a non-validation reason.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A coordinator-side invariant broke (registry, scheduler). Not a
    /// client mistake.
    #[error("{0}")]
    Internal(String),
}

impl SessionError {
    /// The wire taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Token(TokenError::Encode(_)) => ErrorKind::ServerError,
            SessionError::CodeNotFound(_)
            | SessionError::SessionNotFound(_)
            | SessionError::PlayerNotFound(_)
            | SessionError::Token(_) => ErrorKind::NotFound,
            SessionError::GameInProgress
            | SessionError::GameFinished
            | SessionError::NotAuthor
            | SessionError::LeaveDenied => ErrorKind::AccessDenied,
            SessionError::Validation(_) => ErrorKind::ValidationError,
            SessionError::CodesExhausted
            | SessionError::Storage(_)
            | SessionError::Internal(_) => ErrorKind::ServerError,
        }
    }
}

/// The single translation step from persistence failures to the shape
/// clients see. Schema validation keeps its message; everything else is
/// summarized, not leaked.
impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => SessionError::Validation(msg),
            StoreError::NotFound(id) => SessionError::SessionNotFound(id),
            StoreError::Backend(msg) => SessionError::Storage(msg),
        }
    }
}

/// Errors from a [`SessionStore`](crate::SessionStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record failed schema validation (roster bounds, name length,
    /// author count).
    #[error("{0}")]
    Validation(String),

    /// No record with this id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The backend itself failed.
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Errors from a [`TokenCodec`](crate::TokenCodec) implementation.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Signature or structure is wrong.
    #[error("token is invalid")]
    Invalid,

    /// The token was well-formed but its expiry has passed.
    #[error("token has expired")]
    Expired,

    /// Minting a token failed.
    #[error("token encoding failed: {0}")]
    Encode(String),
}
