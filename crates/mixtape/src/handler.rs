//! Per-connection handler: one reader loop plus one writer task.
//!
//! Each accepted socket gets its own task running [`handle_connection`].
//! The reader decodes inbound frames into [`ClientEvent`]s and feeds the
//! coordinator; the writer drains the registry channel the coordinator
//! routes events into, so broadcasts reach this socket even while its
//! reader is parked in `recv`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use mixtape_protocol::{ClientEvent, Codec, ErrorKind, JsonCodec, ServerEvent};
use mixtape_session::{SessionStore, TokenCodec};
use mixtape_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::{Coordinator, MixtapeError};

/// Drop guard that cleans a connection out of the registry when the
/// handler exits, normally or not. Deregistration is synchronous, so no
/// spawned cleanup is needed.
struct ConnectionGuard<S, T> {
    id: ConnectionId,
    coordinator: Coordinator<S, T>,
    writer: JoinHandle<()>,
}

impl<S, T> Drop for ConnectionGuard<S, T> {
    fn drop(&mut self) {
        self.coordinator.inner.registry.deregister(self.id);
        self.writer.abort();
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, T>(
    conn: WebSocketConnection,
    coordinator: Coordinator<S, T>,
    codec: JsonCodec,
) -> Result<(), MixtapeError>
where
    S: SessionStore,
    T: TokenCodec,
{
    let id = conn.id();
    let mut outbound = coordinator.register(id);
    let conn = Arc::new(conn);

    // Writer: everything the coordinator routes to this connection goes
    // out here. A send failure means the peer is gone; the reply is
    // discarded and the reader loop winds the connection down.
    let writer = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            while let Some(event) = outbound.recv().await {
                let bytes = match codec.encode(&event) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(
                            connection = %conn.id(),
                            event = event.name(),
                            error = %err,
                            "outbound event failed to encode, dropped"
                        );
                        continue;
                    }
                };
                if conn.send(&bytes).await.is_err() {
                    break;
                }
            }
        })
    };

    let _guard = ConnectionGuard {
        id,
        coordinator: coordinator.clone(),
        writer,
    };

    read_loop(&conn, &coordinator, codec).await
}

async fn read_loop<S, T>(
    conn: &WebSocketConnection,
    coordinator: &Coordinator<S, T>,
    codec: JsonCodec,
) -> Result<(), MixtapeError>
where
    S: SessionStore,
    T: TokenCodec,
{
    let id = conn.id();
    loop {
        match conn.recv().await {
            Ok(Some(data)) => match codec.decode::<ClientEvent>(&data) {
                Ok(event) => coordinator.dispatch(id, event).await,
                Err(err) => {
                    // Malformed frames get the same structured error
                    // shape as domain failures, privately.
                    tracing::debug!(connection = %id, error = %err, "malformed frame");
                    coordinator.send_to(
                        id,
                        ServerEvent::error(
                            ErrorKind::ValidationError,
                            format!("malformed event: {err}"),
                        ),
                    );
                }
            },
            Ok(None) => {
                tracing::debug!(connection = %id, "connection closed");
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(connection = %id, error = %err, "recv failed");
                return Err(err.into());
            }
        }
    }
}
