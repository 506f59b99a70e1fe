//! Unified error type for the Mixtape meta crate.

use mixtape_protocol::ProtocolError;
use mixtape_room::RegistryError;
use mixtape_session::{SessionError, StoreError, TokenError};
use mixtape_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `mixtape` meta crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MixtapeError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-domain error (lifecycle rules, authorization, codes).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A persistence error reaching the caller untranslated (startup
    /// scans; inside event handling store errors fold into `Session`).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A credential codec error reaching the caller untranslated.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A routing error (binding an unregistered connection).
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
