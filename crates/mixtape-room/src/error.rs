//! Error types for the routing layer.

use mixtape_transport::ConnectionId;

/// Errors that can occur while routing events to connections.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The connection was never registered, or has already been
    /// deregistered. Binding it to a room would leak membership.
    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),
}
