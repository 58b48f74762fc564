//! Session bookkeeping for the relay server
//!
//! This module owns the mapping from a client's network address to its
//! session record. It is the single source of truth for:
//! - Which addresses are currently registered
//! - The session id assigned to each address
//! - The last position reported by each client
//!
//! Identity is purely address based. A session lives until an outbound send
//! to its address fails; there is no inactivity timeout and no explicit
//! disconnect message.

use log::info;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Server-side record of one connected client
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier, assigned once and never reused
    pub id: u64,
    /// Network address the session is keyed by
    pub addr: SocketAddr,
    /// Last known position, opaque to the server
    pub position: Value,
}

impl Session {
    pub fn new(id: u64, addr: SocketAddr, position: Value) -> Self {
        Self { id, addr, position }
    }
}

/// Registry of all sessions, keyed by address
///
/// Ids are handed out sequentially starting at 1. The counter only ever
/// moves forward, so an address that is removed and later registers again
/// receives a fresh, larger id.
pub struct SessionRegistry {
    sessions: HashMap<SocketAddr, Session>,
    next_session_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Registers an address, or refreshes an existing registration
    ///
    /// Returns the session id and whether the session was created by this
    /// call. On a repeated registration the stored position is replaced with
    /// the supplied one and the existing id is returned.
    pub fn register(&mut self, addr: SocketAddr, position: Value) -> (u64, bool) {
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.position = position;
            return (session.id, false);
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} registered from {}", session_id, addr);
        self.sessions
            .insert(addr, Session::new(session_id, addr, position));

        (session_id, true)
    }

    /// Overwrites the stored position of a session
    ///
    /// Returns false without doing anything if the address is not registered,
    /// for example after the session was dropped on a send failure.
    pub fn update_position(&mut self, addr: SocketAddr, position: Value) -> bool {
        match self.sessions.get_mut(&addr) {
            Some(session) => {
                session.position = position;
                true
            }
            None => false,
        }
    }

    /// Drops the session registered for an address
    ///
    /// Idempotent; returns the removed session if there was one.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Session> {
        let removed = self.sessions.remove(addr);
        if let Some(session) = &removed {
            info!(
                "Session {} at {} removed ({} remaining)",
                session.id,
                addr,
                self.sessions.len()
            );
        }
        removed
    }

    /// Finds the session id registered for an address
    pub fn find_id(&self, addr: SocketAddr) -> Option<u64> {
        self.sessions.get(&addr).map(|session| session.id)
    }

    #[cfg(test)]
    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.sessions.get(addr)
    }

    /// Ids and positions of every session except the given address
    ///
    /// Sorted by id so peers are announced in the order they joined.
    pub fn snapshot_except(&self, addr: SocketAddr) -> Vec<(u64, Value)> {
        let mut peers: Vec<(u64, Value)> = self
            .sessions
            .values()
            .filter(|session| session.addr != addr)
            .map(|session| (session.id, session.position.clone()))
            .collect();
        peers.sort_by_key(|(id, _)| *id);
        peers
    }

    /// Addresses of every session except the given one
    pub fn all_except(&self, addr: SocketAddr) -> Vec<SocketAddr> {
        self.sessions
            .keys()
            .filter(|candidate| **candidate != addr)
            .copied()
            .collect()
    }

    /// Addresses of every registered session
    pub fn all_addrs(&self) -> Vec<SocketAddr> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
