//! Core protocol types for Mixtape's wire format.
//!
//! This module defines every type that travels "on the wire": the events
//! that get serialized to bytes, sent over the network, and deserialized
//! on the other side.
//!
//! The shapes here are the contract with the client apps. Changing a
//! serde attribute changes the JSON, which breaks clients, so every
//! shape-affecting attribute has a test pinning it down below.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a game session.
///
/// This is a "newtype wrapper": a UUID wrapped in a named struct. The
/// wrapper buys two things:
///
/// 1. **Type safety**: you can't accidentally pass a `PlayerId` where a
///    `SessionId` is expected, even though both are UUIDs underneath.
/// 2. **Readability**: `fn find(id: SessionId)` says more than
///    `fn find(id: Uuid)`.
///
/// `#[serde(transparent)]` tells serde to serialize this as just the
/// inner UUID string, not as `{ "0": "..." }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generates a fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Display lets us use `{}` in format strings and logging.
/// `tracing::info!("session {} created", id)` prints "session S-8f14…".
impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A unique identifier for a player within a session.
///
/// Same newtype pattern as [`SessionId`]. Player ids are assigned when a
/// player is appended to a roster and are meaningless outside their
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle status
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
///
/// ```text
/// LOBBY → COUNTDOWN → ACTIVE → FINISHED
///   └────────────────────────────↗
/// ```
///
/// `LOBBY` is the only joinable state and the only state in which a
/// session holds a join code. `FINISHED` is terminal. The transition
/// rules themselves live with the session domain; this type only names
/// the states and answers simple questions about them.
///
/// `#[serde(rename_all = "SCREAMING_SNAKE_CASE")]` makes the JSON use
/// `"LOBBY"`, `"COUNTDOWN"`, etc., which is what the client apps expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Waiting for players. Joinable, holds a code.
    Lobby,
    /// The author started the game; clients are counting down.
    Countdown,
    /// Gameplay is underway.
    Active,
    /// Terminal. Nothing leaves this state.
    Finished,
}

impl SessionStatus {
    /// True for the joinable state.
    pub fn is_lobby(self) -> bool {
        matches!(self, SessionStatus::Lobby)
    }

    /// True while a game is underway (countdown counts: the game has
    /// started even if the first track hasn't played yet).
    pub fn is_in_progress(self) -> bool {
        matches!(self, SessionStatus::Countdown | SessionStatus::Active)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, SessionStatus::Finished)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Lobby => "LOBBY",
            SessionStatus::Countdown => "COUNTDOWN",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// The error categories a client can receive.
///
/// Every failure, whether it comes from authorization, state checks, or
/// the persistence layer's own validation, is folded into one of these
/// four kinds before it reaches the wire. Clients branch on the kind and
/// show the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Unknown code, token, session, or player.
    NotFound,
    /// The action is incompatible with the session state, or the caller
    /// lacks the privilege (e.g. a non-author starting the game).
    AccessDenied,
    /// Input rejected: roster bounds, name length. May originate in the
    /// persistence layer's schema constraints.
    ValidationError,
    /// Unexpected failure (storage transport, serialization of a reply).
    ServerError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Snapshots — session state as clients see it
// ---------------------------------------------------------------------------

/// One player as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    /// Exactly one player per session carries `true`.
    pub author: bool,
    pub score: i64,
}

/// A full session as shown to clients.
///
/// This is a point-in-time copy, not a live view: the server builds one
/// per broadcast, so two clients can briefly hold different snapshots.
///
/// `#[serde(rename_all = "camelCase")]` matches the JSON field style the
/// client apps use (`updatedAt`, not `updated_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    /// Present iff the session is still in the lobby.
    pub code: Option<String>,
    pub status: SessionStatus,
    pub players: Vec<PlayerSnapshot>,
    /// Opaque playlist reference, set when the game starts.
    pub playlist: Option<String>,
    pub shuffle: bool,
    /// Unix milliseconds of the last mutation.
    pub updated_at: u64,
}

// ---------------------------------------------------------------------------
// Client → server events
// ---------------------------------------------------------------------------

/// Everything a client can send.
///
/// `#[serde(tag = "event", content = "data")]` produces "adjacently
/// tagged" JSON:
///
/// ```json
/// { "event": "JOIN", "data": { "code": "834012", "name": "ada" } }
/// ```
///
/// The tag names are SCREAMING_SNAKE_CASE on the wire (`rename_all`),
/// so the `Join` variant travels as `"JOIN"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    /// Open a new session; the sender becomes its author.
    Create { name: String },

    /// Join the lobby that currently holds `code`.
    Join { code: String, name: String },

    /// Bind this connection to the session the token belongs to.
    /// Idempotent: reconnecting simply rebinds.
    Connect { token: String },

    /// Author only: start the game.
    Start {
        token: String,
        #[serde(default)]
        playlist: Option<String>,
        shuffle: bool,
    },

    /// Leave the session. The author leaving finishes it for everyone.
    Leave { token: String },

    /// Diagnostic ping, answered only when the server runs with echo
    /// enabled (non-production).
    Echo { message: String },
}

impl ClientEvent {
    /// The wire tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Create { .. } => "CREATE",
            ClientEvent::Join { .. } => "JOIN",
            ClientEvent::Connect { .. } => "CONNECT",
            ClientEvent::Start { .. } => "START",
            ClientEvent::Leave { .. } => "LEAVE",
            ClientEvent::Echo { .. } => "ECHO",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client events
// ---------------------------------------------------------------------------

/// Everything the server can send.
///
/// Same adjacently-tagged JSON as [`ClientEvent`]. Variants marked
/// "private" go to a single connection via the registry's direct path;
/// the rest are room broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Private. The new session, the author's player token, and a
    /// shareable invite token encoding the join code.
    Created {
        session: SessionSnapshot,
        token: String,
        invite: String,
    },

    /// Private. The joining player's token.
    Joined { token: String },

    /// Private. The session as of connect time plus the caller's player.
    Connected {
        session: SessionSnapshot,
        player: PlayerSnapshot,
    },

    /// Broadcast to everyone already in the room (not the caller).
    PlayerConnected {
        session: SessionSnapshot,
        player: PlayerSnapshot,
    },

    /// Broadcast. Sent after start, countdown advance, and leave.
    SessionUpdated { session: SessionSnapshot },

    /// Private. Mirror of a diagnostic echo.
    Echo { message: String },

    /// Private. Structured failure reply; never broadcast.
    Error { kind: ErrorKind, message: String },
}

impl ServerEvent {
    /// Builds an error reply.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            kind,
            message: message.into(),
        }
    }

    /// The wire tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Created { .. } => "CREATED",
            ServerEvent::Joined { .. } => "JOINED",
            ServerEvent::Connected { .. } => "CONNECTED",
            ServerEvent::PlayerConnected { .. } => "PLAYER_CONNECTED",
            ServerEvent::SessionUpdated { .. } => "SESSION_UPDATED",
            ServerEvent::Echo { .. } => "ECHO",
            ServerEvent::Error { .. } => "ERROR",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Tests pinning the JSON wire shapes.
    //!
    //! The client apps parse these exact shapes; a serde attribute change
    //! that alters them is a breaking protocol change and should fail
    //! loudly here.

    use super::*;

    fn sample_snapshot() -> SessionSnapshot {
        SessionSnapshot {
            id: SessionId::new(),
            code: Some("834012".into()),
            status: SessionStatus::Lobby,
            players: vec![PlayerSnapshot {
                id: PlayerId::new(),
                name: "ada".into(),
                author: true,
                score: 0,
            }],
            playlist: None,
            shuffle: false,
            updated_at: 1_700_000_000_000,
        }
    }

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_session_id_serializes_as_plain_uuid_string() {
        // `#[serde(transparent)]` means the wire carries the bare UUID,
        // not a wrapper object.
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn test_player_id_round_trip() {
        let id = PlayerId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_id_display_prefixes() {
        let sid = SessionId::new();
        let pid = PlayerId::new();
        assert!(sid.to_string().starts_with("S-"));
        assert!(pid.to_string().starts_with("P-"));
    }

    // =====================================================================
    // SessionStatus
    // =====================================================================

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Lobby).unwrap(),
            "\"LOBBY\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Countdown).unwrap(),
            "\"COUNTDOWN\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Finished).unwrap(),
            "\"FINISHED\""
        );
    }

    #[test]
    fn test_status_predicates() {
        assert!(SessionStatus::Lobby.is_lobby());
        assert!(!SessionStatus::Lobby.is_in_progress());
        assert!(SessionStatus::Countdown.is_in_progress());
        assert!(SessionStatus::Active.is_in_progress());
        assert!(SessionStatus::Finished.is_finished());
        assert!(!SessionStatus::Finished.is_in_progress());
    }

    // =====================================================================
    // ErrorKind
    // =====================================================================

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotFound).unwrap(),
            "\"NOT_FOUND\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::AccessDenied).unwrap(),
            "\"ACCESS_DENIED\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::ValidationError).unwrap(),
            "\"VALIDATION_ERROR\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::ServerError).unwrap(),
            "\"SERVER_ERROR\""
        );
    }

    // =====================================================================
    // Snapshots
    // =====================================================================

    #[test]
    fn test_snapshot_uses_camel_case_fields() {
        let json: serde_json::Value =
            serde_json::to_value(sample_snapshot()).unwrap();

        assert!(json.get("updatedAt").is_some());
        assert!(json.get("updated_at").is_none());
        assert_eq!(json["status"], "LOBBY");
        assert_eq!(json["code"], "834012");
        assert_eq!(json["players"][0]["author"], true);
    }

    #[test]
    fn test_snapshot_code_null_when_absent() {
        let mut snap = sample_snapshot();
        snap.code = None;
        let json: serde_json::Value = serde_json::to_value(&snap).unwrap();
        assert!(json["code"].is_null());
    }

    // =====================================================================
    // ClientEvent — wire shapes
    // =====================================================================

    #[test]
    fn test_client_event_join_json_format() {
        let event = ClientEvent::Join {
            code: "834012".into(),
            name: "grace".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "JOIN");
        assert_eq!(json["data"]["code"], "834012");
        assert_eq!(json["data"]["name"], "grace");
    }

    #[test]
    fn test_client_event_create_round_trip() {
        let event = ClientEvent::Create { name: "ada".into() };
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: ClientEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_client_event_start_playlist_defaults_to_none() {
        // Older clients omit "playlist" entirely; `#[serde(default)]`
        // keeps those frames parseable.
        let json = r#"{
            "event": "START",
            "data": { "token": "tok", "shuffle": true }
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Start {
                playlist, shuffle, ..
            } => {
                assert!(playlist.is_none());
                assert!(shuffle);
            }
            other => panic!("expected START, got {other:?}"),
        }
    }

    #[test]
    fn test_client_event_connect_round_trip() {
        let event = ClientEvent::Connect {
            token: "abc.def.ghi".into(),
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: ClientEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_client_event_names() {
        assert_eq!(ClientEvent::Create { name: "x".into() }.name(), "CREATE");
        assert_eq!(
            ClientEvent::Leave {
                token: "t".into()
            }
            .name(),
            "LEAVE"
        );
    }

    // =====================================================================
    // ServerEvent — wire shapes
    // =====================================================================

    #[test]
    fn test_server_event_error_json_format() {
        let event =
            ServerEvent::error(ErrorKind::AccessDenied, "Game is finished");
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "ERROR");
        assert_eq!(json["data"]["kind"], "ACCESS_DENIED");
        assert_eq!(json["data"]["message"], "Game is finished");
    }

    #[test]
    fn test_server_event_joined_json_format() {
        let event = ServerEvent::Joined {
            token: "signed-token".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "JOINED");
        assert_eq!(json["data"]["token"], "signed-token");
    }

    #[test]
    fn test_server_event_player_connected_tag() {
        let event = ServerEvent::PlayerConnected {
            session: sample_snapshot(),
            player: sample_snapshot().players[0].clone(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "PLAYER_CONNECTED");
    }

    #[test]
    fn test_server_event_session_updated_round_trip() {
        let event = ServerEvent::SessionUpdated {
            session: sample_snapshot(),
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: ServerEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event, back);
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_decode_garbage_returns_error() {
        let garbage = b"not json at all";
        let result: Result<ClientEvent, _> = serde_json::from_slice(garbage);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_unknown_event_tag_returns_error() {
        let unknown = r#"{"event": "TELEPORT", "data": {}}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_data_returns_error() {
        // JOIN needs its payload; a bare tag is not a valid frame.
        let missing = r#"{"event": "JOIN"}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(missing);
        assert!(result.is_err());
    }
}
