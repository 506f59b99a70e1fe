//! Game session domain for Mixtape.
//!
//! This crate owns everything about a game session except the network:
//!
//! 1. **Lifecycle** — the [`Session`] record and its state machine
//!    (LOBBY → COUNTDOWN → ACTIVE → FINISHED) with the roster rules.
//! 2. **Persistence** — the [`SessionStore`] trait and the in-memory
//!    [`MemoryStore`] implementation that validates records on write.
//! 3. **Join codes** — the [`CodeAllocator`], which guarantees that no
//!    two joinable sessions ever show the same code.
//! 4. **Credentials** — the [`TokenCodec`] trait and the signed-JWT
//!    [`SignedTokenCodec`] for invite and player tokens.
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← orchestrates ops, talks to connections
//!     ↕
//! Session domain (this crate)  ← rules, records, codes, credentials
//!     ↕
//! Protocol layer (below)  ← SessionId, SessionStatus, snapshots
//! ```

mod codes;
mod error;
mod memory;
mod session;
mod store;
mod token;

pub use codes::CodeAllocator;
pub use error::{SessionError, StoreError, TokenError};
pub use memory::MemoryStore;
pub use session::{LeaveOutcome, Player, Session, SessionLimits};
pub use store::{Clock, ManualClock, SessionStore, SystemClock};
pub use token::{InviteClaims, PlayerClaims, SignedTokenCodec, TokenCodec};
