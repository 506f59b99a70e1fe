//! # Mixtape
//!
//! Real-time party-quiz session backend. A group of players joins a
//! short-lived game session with a six-digit code over a WebSocket, the
//! author starts the game, everyone receives synchronized state updates,
//! and a background reaper finishes sessions their players abandoned.
//!
//! This meta crate is the coordinator tier: it wires the sub-crates
//! (protocol, transport, session domain, room routing, scheduler) into a
//! runnable server.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mixtape::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MixtapeError> {
//!     let store = MemoryStore::new();
//!     let tokens =
//!         SignedTokenCodec::new(b"secret", SignedTokenCodec::DEFAULT_TTL);
//!
//!     let server = MixtapeServerBuilder::new()
//!         .bind("0.0.0.0:8080")
//!         .config(MixtapeConfig {
//!             countdown: Duration::from_secs(10),
//!             ..MixtapeConfig::default()
//!         })
//!         .build(store, tokens)
//!         .await?;
//!     server.run().await
//! }
//! ```

mod config;
mod coordinator;
mod error;
mod handler;
mod reaper;
mod server;

pub use config::MixtapeConfig;
pub use coordinator::Coordinator;
pub use error::MixtapeError;
pub use server::{MixtapeServer, MixtapeServerBuilder};

// Sub-crates re-exported under short names so downstream users need one
// dependency line.
pub use mixtape_protocol as protocol;
pub use mixtape_room as room;
pub use mixtape_sched as sched;
pub use mixtape_session as session;
pub use mixtape_transport as transport;

/// The common imports, one `use` away.
pub mod prelude {
    pub use crate::{
        Coordinator, MixtapeConfig, MixtapeError, MixtapeServer,
        MixtapeServerBuilder,
    };
    pub use mixtape_protocol::{
        ClientEvent, ErrorKind, PlayerId, ServerEvent, SessionId,
        SessionSnapshot, SessionStatus,
    };
    pub use mixtape_session::{
        MemoryStore, SessionLimits, SessionStore, SignedTokenCodec, TokenCodec,
    };
    pub use mixtape_transport::ConnectionId;
}
