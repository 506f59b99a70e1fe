//! `MixtapeServer` builder and accept loop.
//!
//! The server ties the layers together: transport → protocol →
//! coordinator. Building it performs the startup sequence the allocator
//! invariant depends on — bind the listener, reseed the used-code set
//! from the store, arm the reaper — and only then does [`run`]
//! (MixtapeServer::run) start accepting traffic.

use std::net::SocketAddr;

use mixtape_protocol::JsonCodec;
use mixtape_session::{SessionStore, TokenCodec};
use mixtape_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Coordinator, MixtapeConfig, MixtapeError};

/// Builder for configuring and starting a Mixtape server.
///
/// The builder is deliberately not parameterized: the store and codec
/// types enter only at [`build`](Self::build), so constructing it needs
/// no type annotations.
///
/// # Example
///
/// ```rust,ignore
/// use mixtape::prelude::*;
///
/// let server = MixtapeServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .config(MixtapeConfig::default())
///     .build(MemoryStore::new(), codec)
///     .await?;
/// server.run().await
/// ```
pub struct MixtapeServerBuilder {
    bind_addr: String,
    config: MixtapeConfig,
}

impl MixtapeServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: MixtapeConfig::default(),
        }
    }

    /// Sets the address to bind the listener to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the coordinator configuration.
    pub fn config(mut self, config: MixtapeConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener, seeds the code allocator from the store, and
    /// arms the reaper. Uses `JsonCodec` over WebSocket.
    pub async fn build<S: SessionStore, T: TokenCodec>(
        self,
        store: S,
        tokens: T,
    ) -> Result<MixtapeServer<S, T>, MixtapeError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let coordinator = Coordinator::new(store, tokens, self.config);
        coordinator.seed_codes().await?;
        coordinator.spawn_reaper();

        Ok(MixtapeServer {
            transport,
            coordinator,
            codec: JsonCodec,
        })
    }
}

impl Default for MixtapeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Mixtape server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct MixtapeServer<S, T> {
    transport: WebSocketTransport,
    coordinator: Coordinator<S, T>,
    codec: JsonCodec,
}

impl<S: SessionStore, T: TokenCodec> MixtapeServer<S, T> {
    /// The address the listener actually bound to. Useful when binding
    /// to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, MixtapeError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle onto the coordinator, for wiring and inspection.
    pub fn coordinator(&self) -> &Coordinator<S, T> {
        &self.coordinator
    }

    /// Runs the accept loop: one handler task per connection, until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), MixtapeError> {
        tracing::info!("mixtape server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let coordinator = self.coordinator.clone();
                    let codec = self.codec;
                    tokio::spawn(async move {
                        if let Err(err) =
                            handle_connection(conn, coordinator, codec).await
                        {
                            tracing::debug!(
                                error = %err,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "accept failed");
                }
            }
        }
    }
}
