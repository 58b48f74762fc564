//! # Relay Server Library
//!
//! This library implements a connectionless state-synchronization server for
//! real-time multiplayer games. Clients send small JSON datagrams many times
//! per second; the server keeps one session per client address, coalesces
//! movement into periodic snapshots and relays transient events immediately.
//!
//! ## Core Responsibilities
//!
//! ### Session Registry
//! Every client is identified by the address its datagrams come from. The
//! first registration from an address allocates the next session id; later
//! registrations from the same address return the same id. Ids are never
//! reused, so a client that was dropped and registers again gets a new one.
//!
//! ### Movement Coalescing
//! Movement reports are not forwarded as they arrive. They are queued, at
//! most one per session, and the newest timestamp wins. On every broadcast
//! tick the whole queue is sent to every session as one `update` snapshot
//! and then cleared. A tick with nothing queued sends nothing.
//!
//! ### Event Relay
//! Events (`action` entries) skip the queue and go straight to every other
//! session within the same processing pass. They carry no ordering guarantee
//! relative to snapshots.
//!
//! ## Architecture Design
//!
//! ### Two Loops, One Lock
//! The receive loop and the broadcast loop run as separate tasks. Both work
//! on [`dispatcher::ServerState`], which pairs the registry and the update
//! queue behind a single mutex. Handlers mutate memory under the lock and
//! return the messages to send; sending happens after the lock is released,
//! on recipient lists copied under the lock.
//!
//! ### Fire-and-Forget Transport
//! There is no acknowledgement, retry or backoff. Malformed input is logged
//! and dropped without a reply. A failed outbound send is the only disconnect
//! signal: the destination session is removed, and the client has to send a
//! fresh registration to come back.
//!
//! ### Shutdown
//! A watch channel acts as the running flag. The receive loop waits on the
//! socket with a bounded timeout and the broadcast loop selects on the flag,
//! so both notice shutdown promptly and [`network::Server::run`] joins them.
//!
//! ## Module Organization
//!
//! - `session_registry`: address to session mapping and id allocation
//! - `update_queue`: pending movement updates with per-session dedup
//! - `dispatcher`: message routing and snapshot building over the shared state
//! - `broadcast`: the periodic tick
//! - `network`: socket ownership, inbound loop, outbound delivery, lifecycle
//! - `config`: runtime configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 5000,
//!         broadcast_interval: Duration::from_millis(30),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     // Runs until server.shutdown() is called from another task
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod network;
pub mod session_registry;
pub mod update_queue;
pub mod utils;
