/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listener or accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The WebSocket upgrade handshake failed.
    #[cfg(feature = "websocket")]
    #[error("handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    /// Sending a frame failed; the peer is usually gone.
    #[cfg(feature = "websocket")]
    #[error("send failed: {0}")]
    Send(#[source] tokio_tungstenite::tungstenite::Error),

    /// The stream produced an error mid-read.
    #[cfg(feature = "websocket")]
    #[error("receive failed: {0}")]
    Receive(#[source] tokio_tungstenite::tungstenite::Error),
}
