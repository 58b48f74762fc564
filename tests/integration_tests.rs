//! Integration tests for the relay server
//!
//! These tests run a real server on a loopback UDP socket and talk to it with
//! plain client sockets, so every message goes through the wire format.

use serde_json::{json, Value};
use server::config::ServerConfig;
use server::network::Server;
use shared::{
    decode_server_message, encode_client_message, ClientMessage, RawAction, RelayedEvent,
    ServerMessage, SnapshotEntry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

struct TestServer {
    server: Arc<Server>,
    handle: JoinHandle<Result<(), tokio::task::JoinError>>,
}

impl TestServer {
    async fn start() -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            broadcast_interval: Duration::from_millis(30),
            recv_timeout: Duration::from_millis(50),
            ..ServerConfig::default()
        };

        let server = Arc::new(Server::bind(config).await.expect("Failed to bind server"));
        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run().await })
        };

        TestServer { server, handle }
    }

    fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    async fn stop(self) {
        self.server.shutdown();
        let joined = timeout(Duration::from_secs(2), self.handle).await;
        assert!(joined.is_ok(), "Server did not stop after shutdown");
    }
}

struct TestClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl TestClient {
    async fn new(server: SocketAddr) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind client socket");
        TestClient { socket, server }
    }

    async fn send(&self, message: &ClientMessage) {
        let data = encode_client_message(message).unwrap();
        self.socket.send_to(&data, self.server).await.unwrap();
    }

    async fn send_raw(&self, data: &[u8]) {
        self.socket.send_to(data, self.server).await.unwrap();
    }

    async fn register(&self, position: Value) {
        self.send(&ClientMessage::Register { id: None, position })
            .await;
    }

    async fn actions(&self, id: u64, timestamp: u64, actions: Vec<RawAction>) {
        self.send(&ClientMessage::Actions {
            id: Some(id),
            timestamp,
            actions,
        })
        .await;
    }

    async fn recv(&self) -> Option<ServerMessage> {
        self.recv_within(Duration::from_secs(1)).await
    }

    async fn recv_within(&self, window: Duration) -> Option<ServerMessage> {
        let mut buf = [0u8; 4096];
        match timeout(window, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(decode_server_message(&buf[..len]).unwrap()),
            _ => None,
        }
    }

    /// Discards everything already sent to this client
    async fn drain(&self) {
        while self
            .recv_within(Duration::from_millis(20))
            .await
            .is_some()
        {}
    }

    /// Registers and waits for the ack, returning the assigned id
    async fn join(&self, position: Value) -> u64 {
        self.register(position).await;
        match self.recv().await {
            Some(ServerMessage::Id { id }) => id,
            other => panic!("Expected id ack, got {:?}", other),
        }
    }
}

/// REGISTRATION TESTS
mod registration_tests {
    use super::*;

    /// Walks through the two-client scenario end to end
    #[tokio::test]
    async fn two_client_scenario() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;
        let b = TestClient::new(server.addr()).await;

        a.register(json!({"x": 0, "y": 0})).await;
        assert_eq!(a.recv().await, Some(ServerMessage::Id { id: 1 }));
        assert!(a.recv_within(Duration::from_millis(100)).await.is_none());

        b.register(json!({"x": 1, "y": 1})).await;
        assert_eq!(b.recv().await, Some(ServerMessage::Id { id: 2 }));
        assert_eq!(
            b.recv().await,
            Some(ServerMessage::OldPlayer {
                id: 1,
                position: json!({"x": 0, "y": 0})
            })
        );
        assert_eq!(
            a.recv().await,
            Some(ServerMessage::NewPlayer {
                id: 2,
                position: json!({"x": 1, "y": 1})
            })
        );

        b.actions(
            2,
            100,
            vec![RawAction::moving(json!({"position": {"x": 5, "y": 0}}))],
        )
        .await;

        let expected = vec![SnapshotEntry::Move {
            id: 2,
            timestamp: 100,
            data: json!({"position": {"x": 5, "y": 0}}),
        }];

        for client in [&a, &b] {
            match client.recv().await {
                Some(ServerMessage::Update { data, timestamp }) => {
                    assert_eq!(data, expected);
                    assert!(timestamp > 0);
                }
                other => panic!("Expected update, got {:?}", other),
            }
        }

        server.stop().await;
    }

    /// Ids grow with each new address and stay put for known ones
    #[tokio::test]
    async fn ids_are_sequential_and_stable() {
        let server = TestServer::start().await;
        let clients = vec![
            TestClient::new(server.addr()).await,
            TestClient::new(server.addr()).await,
            TestClient::new(server.addr()).await,
        ];

        let mut ids = Vec::new();
        for client in &clients {
            ids.push(client.join(Value::Null).await);
            // Let the notices for this registration arrive before the next one
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(ids, vec![1, 2, 3]);

        // Retry from the first client keeps its id
        clients[0].drain().await;
        let again = clients[0].join(json!({"x": 4})).await;
        assert_eq!(again, 1);
        assert_eq!(server.server.session_count().await, 3);

        server.stop().await;
    }

    /// A newcomer hears about every peer, and every peer hears about it once
    #[tokio::test]
    async fn newcomer_and_peers_are_introduced() {
        let server = TestServer::start().await;

        let mut peers = Vec::new();
        for _ in 0..3 {
            let peer = TestClient::new(server.addr()).await;
            peer.join(Value::Null).await;
            peers.push(peer);
        }
        sleep(Duration::from_millis(50)).await;
        for peer in &peers {
            peer.drain().await;
        }

        let newcomer = TestClient::new(server.addr()).await;
        let id = newcomer.join(json!("here")).await;
        assert_eq!(id, 4);

        let mut old_players = Vec::new();
        while let Some(message) = newcomer.recv_within(Duration::from_millis(200)).await {
            if let ServerMessage::OldPlayer { id, .. } = message {
                old_players.push(id);
            }
        }
        old_players.sort();
        assert_eq!(old_players, vec![1, 2, 3]);

        for peer in &peers {
            assert_eq!(
                peer.recv().await,
                Some(ServerMessage::NewPlayer {
                    id: 4,
                    position: json!("here")
                })
            );
            assert!(peer.recv_within(Duration::from_millis(100)).await.is_none());
        }

        server.stop().await;
    }
}

/// BROADCAST AND RELAY TESTS
mod broadcast_tests {
    use super::*;

    /// Ticks with nothing queued stay silent
    #[tokio::test]
    async fn idle_ticks_send_nothing() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;
        a.join(Value::Null).await;

        // Several broadcast periods pass with an empty queue
        assert!(a.recv_within(Duration::from_millis(200)).await.is_none());

        server.stop().await;
    }

    /// Only the newest move per session survives until the tick
    #[tokio::test]
    async fn moves_within_one_interval_are_coalesced() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;
        let id = a.join(Value::Null).await;

        // One datagram carrying two moves, then a stale one
        a.actions(
            id,
            200,
            vec![
                RawAction::moving(json!({"position": 1})),
                RawAction::moving(json!({"position": 2})),
            ],
        )
        .await;
        a.actions(id, 150, vec![RawAction::moving(json!({"position": 0}))])
            .await;

        match a.recv().await {
            Some(ServerMessage::Update { data, .. }) => {
                assert_eq!(
                    data,
                    vec![SnapshotEntry::Move {
                        id,
                        timestamp: 200,
                        data: json!({"position": 2}),
                    }]
                );
            }
            other => panic!("Expected update, got {:?}", other),
        }

        server.stop().await;
    }

    /// Events reach every other session without waiting for a tick
    #[tokio::test]
    async fn events_are_relayed_to_others_only() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;
        let b = TestClient::new(server.addr()).await;
        let c = TestClient::new(server.addr()).await;

        let a_id = a.join(Value::Null).await;
        b.join(Value::Null).await;
        c.join(Value::Null).await;
        sleep(Duration::from_millis(50)).await;
        for client in [&a, &b, &c] {
            client.drain().await;
        }

        a.actions(a_id, 42, vec![RawAction::event(json!({"sparks": 3}))])
            .await;

        let expected = ServerMessage::Action {
            data: RelayedEvent::EmitParticles {
                id: a_id,
                timestamp: 42,
                data: json!({"sparks": 3}),
            },
        };
        assert_eq!(b.recv().await, Some(expected.clone()));
        assert_eq!(c.recv().await, Some(expected));
        assert!(a.recv_within(Duration::from_millis(150)).await.is_none());

        server.stop().await;
    }
}

/// ERROR HANDLING TESTS
mod error_handling_tests {
    use super::*;

    /// Garbage and unknown messages are dropped and the server keeps serving
    #[tokio::test]
    async fn malformed_input_is_ignored() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;

        a.send_raw(b"\xff\x00not json").await;
        a.send_raw(br#"{"id": 3}"#).await;
        a.send_raw(br#"{"type": "warp"}"#).await;
        a.send_raw(br#"{"type": "actions", "actions": []}"#).await;
        assert!(a.recv_within(Duration::from_millis(150)).await.is_none());

        assert_eq!(a.join(Value::Null).await, 1);

        server.stop().await;
    }

    /// Batches from an address that never registered are not broadcast
    #[tokio::test]
    async fn unregistered_sender_is_ignored() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;
        let stranger = TestClient::new(server.addr()).await;
        a.join(Value::Null).await;

        stranger
            .actions(
                1,
                10,
                vec![
                    RawAction::moving(json!({"position": 9})),
                    RawAction::event(json!({})),
                ],
            )
            .await;

        assert!(a.recv_within(Duration::from_millis(150)).await.is_none());
        assert_eq!(server.server.session_count().await, 1);

        server.stop().await;
    }

    /// Shutdown stops both loops promptly
    #[tokio::test]
    async fn shutdown_stops_server() {
        let server = TestServer::start().await;
        let a = TestClient::new(server.addr()).await;
        a.join(Value::Null).await;

        server.stop().await;
    }
}
