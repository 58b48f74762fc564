//! Routing of decoded client messages
//!
//! [`ServerState`] pairs the session registry with the update queue so both
//! sit behind one lock. Handlers only mutate memory and describe what should
//! be sent as [`Delivery`] values; the network layer performs the sends after
//! the lock is released.

use crate::session_registry::SessionRegistry;
use crate::update_queue::{PendingUpdate, UpdateQueue};
use log::{debug, warn};
use serde_json::Value;
use shared::{ActionEntry, ClientMessage, RawAction, RelayedEvent, ServerMessage, SnapshotEntry};
use std::net::SocketAddr;

/// One outbound message and the addresses it goes to
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: ServerMessage,
    pub recipients: Vec<SocketAddr>,
}

impl Delivery {
    pub fn to(addr: SocketAddr, message: ServerMessage) -> Self {
        Self {
            message,
            recipients: vec![addr],
        }
    }

    pub fn fan_out(recipients: Vec<SocketAddr>, message: ServerMessage) -> Self {
        Self {
            message,
            recipients,
        }
    }
}

/// Everything the receive loop and the broadcast loop share
#[derive(Default)]
pub struct ServerState {
    pub sessions: SessionRegistry,
    pub updates: UpdateQueue,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            sessions: SessionRegistry::new(),
            updates: UpdateQueue::new(),
        }
    }

    /// Handles one decoded message and returns what must be sent in response
    pub fn dispatch(&mut self, addr: SocketAddr, message: ClientMessage) -> Vec<Delivery> {
        match message {
            ClientMessage::Register { id, position } => self.handle_register(addr, id, position),
            ClientMessage::Actions {
                id,
                timestamp,
                actions,
            } => self.handle_actions(addr, id, timestamp, &actions),
        }
    }

    fn handle_register(
        &mut self,
        addr: SocketAddr,
        claimed_id: Option<u64>,
        position: Value,
    ) -> Vec<Delivery> {
        let (session_id, is_new) = self.sessions.register(addr, position.clone());

        if !is_new {
            debug!("Session {} re-registered from {}", session_id, addr);
        }
        if let Some(claimed) = claimed_id.filter(|claimed| *claimed != session_id) {
            debug!(
                "{} claimed id {} but is registered as {}",
                addr, claimed, session_id
            );
        }

        let mut deliveries = vec![Delivery::to(addr, ServerMessage::Id { id: session_id })];

        // Peers are told about every registration, retries included
        let others = self.sessions.all_except(addr);
        if !others.is_empty() {
            deliveries.push(Delivery::fan_out(
                others,
                ServerMessage::NewPlayer {
                    id: session_id,
                    position,
                },
            ));
        }

        for (peer_id, peer_position) in self.sessions.snapshot_except(addr) {
            deliveries.push(Delivery::to(
                addr,
                ServerMessage::OldPlayer {
                    id: peer_id,
                    position: peer_position,
                },
            ));
        }

        deliveries
    }

    fn handle_actions(
        &mut self,
        addr: SocketAddr,
        claimed_id: Option<u64>,
        timestamp: u64,
        actions: &[RawAction],
    ) -> Vec<Delivery> {
        let session_id = match self.sessions.find_id(addr) {
            Some(session_id) => session_id,
            None => {
                warn!(
                    "Dropping {} action(s) from unregistered address {}",
                    actions.len(),
                    addr
                );
                return Vec::new();
            }
        };

        if let Some(claimed) = claimed_id.filter(|claimed| *claimed != session_id) {
            debug!(
                "Batch from {} claims id {}, using registered id {}",
                addr, claimed, session_id
            );
        }

        let mut deliveries = Vec::new();

        for raw in actions {
            match raw.parse() {
                Ok(ActionEntry::Move { position, data }) => {
                    let accepted = self.updates.push(PendingUpdate {
                        session_id,
                        timestamp,
                        payload: data,
                    });

                    if accepted {
                        self.sessions.update_position(addr, position);
                    } else {
                        debug!(
                            "Discarding stale move {} from session {}",
                            timestamp, session_id
                        );
                    }
                }
                Ok(ActionEntry::Event { data }) => {
                    let others = self.sessions.all_except(addr);
                    if others.is_empty() {
                        continue;
                    }
                    deliveries.push(Delivery::fan_out(
                        others,
                        ServerMessage::Action {
                            data: RelayedEvent::EmitParticles {
                                id: session_id,
                                timestamp,
                                data,
                            },
                        },
                    ));
                }
                Err(e) => {
                    warn!("Skipping action from session {}: {}", session_id, e);
                }
            }
        }

        deliveries
    }

    /// Drains the update queue into a snapshot addressed to every session
    ///
    /// Returns None when nothing is queued. The queue is cleared even when no
    /// session is registered to receive the snapshot.
    pub fn take_snapshot(&mut self, timestamp: u64) -> Option<Delivery> {
        if self.updates.is_empty() {
            return None;
        }

        let data = self
            .updates
            .drain()
            .into_iter()
            .map(|update| SnapshotEntry::Move {
                id: update.session_id,
                timestamp: update.timestamp,
                data: update.payload,
            })
            .collect();

        Some(Delivery::fan_out(
            self.sessions.all_addrs(),
            ServerMessage::Update { data, timestamp },
        ))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
