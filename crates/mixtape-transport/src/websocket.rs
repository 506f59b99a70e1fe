//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Accept)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// The address the listener actually bound to.
    ///
    /// Useful when binding to port 0 and needing the assigned port.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Accept)
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(TransportError::Handshake)?;

        let id =
            ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        // Split the stream so sending never has to wait for a reader that
        // is parked inside `recv`. Each half gets its own lock.
        let (tx, rx) = ws.split();
        Ok(WebSocketConnection {
            id,
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        })
    }
}

/// A single WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    tx: Mutex<SplitSink<WsStream, Message>>,
    rx: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.tx
            .lock()
            .await
            .send(msg)
            .await
            .map_err(TransportError::Send)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = self.rx.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // tungstenite answers pings internally; frames and pongs
                // carry nothing for us.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Receive(e)),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.tx.lock().await.close().await.map_err(TransportError::Send)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
