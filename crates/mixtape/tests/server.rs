//! End-to-end tests over real WebSockets.
//!
//! Boots the full server on an ephemeral port and drives it with
//! `tokio-tungstenite` clients speaking the JSON protocol, the same way
//! the phone apps do.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use mixtape::prelude::*;

async fn spawn_server(config: MixtapeConfig) -> SocketAddr {
    let server = MixtapeServerBuilder::new()
        .bind("127.0.0.1:0")
        .config(config)
        .build(
            MemoryStore::new(),
            SignedTokenCodec::new(b"e2e-secret", SignedTokenCodec::DEFAULT_TTL),
        )
        .await
        .expect("server boot");
    let addr = server.local_addr().expect("bound address");
    tokio::spawn(server.run());
    addr
}

struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client connect");
        Self { ws }
    }

    async fn send(&mut self, event: &ClientEvent) {
        let frame = serde_json::to_string(event).expect("encode event");
        self.ws
            .send(Message::Text(frame.into()))
            .await
            .expect("send frame");
    }

    async fn send_raw(&mut self, frame: &str) {
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("send raw frame");
    }

    async fn recv(&mut self) -> ServerEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return serde_json::from_slice(&data).expect("decode event");
                }
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).expect("decode event");
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended unexpectedly: {other:?}"),
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_game_flow_over_websockets() {
    let addr = spawn_server(MixtapeConfig {
        countdown: Duration::from_millis(100),
        ..MixtapeConfig::default()
    })
    .await;

    // The author opens a lobby.
    let mut host = WsClient::connect(addr).await;
    host.send(&ClientEvent::Create { name: "ada".into() }).await;
    let (session, host_token) = match host.recv().await {
        ServerEvent::Created { session, token, .. } => (session, token),
        other => panic!("expected CREATED, got {other:?}"),
    };
    let code = session.code.expect("lobby code");

    // A guest joins with the code and connects.
    let mut guest = WsClient::connect(addr).await;
    guest
        .send(&ClientEvent::Join {
            code,
            name: "grace".into(),
        })
        .await;
    let guest_token = match guest.recv().await {
        ServerEvent::Joined { token } => token,
        other => panic!("expected JOINED, got {other:?}"),
    };

    host.send(&ClientEvent::Connect {
        token: host_token.clone(),
    })
    .await;
    assert!(matches!(host.recv().await, ServerEvent::Connected { .. }));

    guest
        .send(&ClientEvent::Connect { token: guest_token })
        .await;
    match guest.recv().await {
        ServerEvent::Connected { session, player } => {
            assert_eq!(session.players.len(), 2);
            assert!(!player.author);
        }
        other => panic!("expected CONNECTED, got {other:?}"),
    }
    // The host hears the arrival.
    match host.recv().await {
        ServerEvent::PlayerConnected { player, .. } => {
            assert_eq!(player.name, "grace");
        }
        other => panic!("expected PLAYER_CONNECTED, got {other:?}"),
    }

    // The author starts; both see the countdown, then the game go live.
    host.send(&ClientEvent::Start {
        token: host_token,
        playlist: Some("mix:road-trip".into()),
        shuffle: false,
    })
    .await;
    for client in [&mut host, &mut guest] {
        match client.recv().await {
            ServerEvent::SessionUpdated { session } => {
                assert_eq!(session.status, SessionStatus::Countdown);
                assert!(session.code.is_none());
            }
            other => panic!("expected SESSION_UPDATED, got {other:?}"),
        }
    }
    for client in [&mut host, &mut guest] {
        match client.recv().await {
            ServerEvent::SessionUpdated { session } => {
                assert_eq!(session.status, SessionStatus::Active);
            }
            other => panic!("expected SESSION_UPDATED, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_frame_gets_a_validation_error_reply() {
    let addr = spawn_server(MixtapeConfig::default()).await;
    let mut client = WsClient::connect(addr).await;

    client.send_raw("this is not json").await;

    match client.recv().await {
        ServerEvent::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::ValidationError);
        }
        other => panic!("expected ERROR, got {other:?}"),
    }

    // The connection survives the bad frame.
    client
        .send(&ClientEvent::Create { name: "ada".into() })
        .await;
    assert!(matches!(client.recv().await, ServerEvent::Created { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_code_error_is_private_to_the_sender() {
    let addr = spawn_server(MixtapeConfig::default()).await;
    let mut client = WsClient::connect(addr).await;

    client
        .send(&ClientEvent::Join {
            code: "999999".into(),
            name: "ghost".into(),
        })
        .await;

    match client.recv().await {
        ServerEvent::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::NotFound);
            assert!(message.contains("999999"));
        }
        other => panic!("expected ERROR, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnect_on_a_fresh_socket_rejoins_the_room() {
    let addr = spawn_server(MixtapeConfig::default()).await;

    let mut host = WsClient::connect(addr).await;
    host.send(&ClientEvent::Create { name: "ada".into() }).await;
    let token = match host.recv().await {
        ServerEvent::Created { token, .. } => token,
        other => panic!("expected CREATED, got {other:?}"),
    };
    host.send(&ClientEvent::Connect {
        token: token.clone(),
    })
    .await;
    assert!(matches!(host.recv().await, ServerEvent::Connected { .. }));

    // Phone dies; a new socket shows up with the same token.
    drop(host);
    let mut revived = WsClient::connect(addr).await;
    revived.send(&ClientEvent::Connect { token }).await;
    match revived.recv().await {
        ServerEvent::Connected { session, player } => {
            assert!(player.author);
            assert_eq!(session.status, SessionStatus::Lobby);
        }
        other => panic!("expected CONNECTED, got {other:?}"),
    }
}
