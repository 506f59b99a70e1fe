//! Wire protocol for Mixtape.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`SessionSnapshot`],
//!   etc.) — the event structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those events are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the session
//! domain (game state). It doesn't know about connections, rooms, or
//! authorization — it only knows how to serialize and deserialize events.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientEvent) → Coordinator (session ops)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEvent, ErrorKind, PlayerId, PlayerSnapshot, ServerEvent, SessionId,
    SessionSnapshot, SessionStatus,
};
