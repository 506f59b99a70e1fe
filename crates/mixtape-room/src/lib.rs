//! Connection registry and room-scoped routing for Mixtape.
//!
//! The registry is the only place that knows which live socket belongs
//! to which game. Everything above it speaks in terms of "send this to
//! that connection" or "broadcast this to that room"; everything below
//! it is a plain byte transport.
//!
//! # Key types
//!
//! - [`ConnectionRegistry`] — tracks live connections and room membership
//! - [`EventSender`] / [`EventReceiver`] — the per-connection outbound channel
//! - [`RegistryError`] — routing failures

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{ConnectionRegistry, EventReceiver, EventSender};
