//! Server network layer: the datagram listener, outbound delivery and the
//! lifecycle of the two server loops

use crate::broadcast::run_broadcast_loop;
use crate::config::ServerConfig;
use crate::dispatcher::{Delivery, ServerState};
use log::{debug, error, info, warn};
use shared::{decode_client_message, encode_server_message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinError;
use tokio::time::{sleep, timeout};

/// Handle shared by both loops: the socket plus the locked server state
#[derive(Clone)]
pub struct Link {
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<ServerState>>,
}

impl Link {
    pub fn new(socket: Arc<UdpSocket>, state: Arc<Mutex<ServerState>>) -> Self {
        Self { socket, state }
    }

    pub fn state(&self) -> &Arc<Mutex<ServerState>> {
        &self.state
    }

    /// Sends a message to each of its recipients, one attempt each
    ///
    /// A failed send is the only disconnect signal the server has: the
    /// recipient's session is dropped and nothing is retried. Returns the
    /// number of successful sends.
    pub async fn deliver(&self, delivery: Delivery) -> usize {
        let payload = match encode_server_message(&delivery.message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Dropping outbound message: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        let mut unreachable = Vec::new();

        for addr in delivery.recipients {
            match self.socket.send_to(&payload, addr).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!("Failed to send to {}: {}", addr, e);
                    unreachable.push(addr);
                }
            }
        }

        if !unreachable.is_empty() {
            let mut state = self.state.lock().await;
            for addr in &unreachable {
                state.sessions.remove(addr);
            }
        }

        sent
    }

    async fn deliver_all(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.deliver(delivery).await;
        }
    }
}

/// The relay server: owns the socket, the shared state and the shutdown flag
pub struct Server {
    link: Link,
    config: ServerConfig,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind_addr()).await?;
        let local_addr = socket.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Server {
            link: Link::new(Arc::new(socket), Arc::new(Mutex::new(ServerState::new()))),
            config,
            local_addr,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn session_count(&self) -> usize {
        self.link.state().lock().await.session_count()
    }

    /// Flips the running flag; both loops exit within one wait interval
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Runs the receive loop and the broadcast loop until shutdown
    pub async fn run(&self) -> Result<(), JoinError> {
        let receiver = tokio::spawn(receive_loop(
            self.link.clone(),
            self.config.recv_timeout,
            self.config.max_datagram_size,
            self.shutdown_tx.subscribe(),
        ));
        let broadcaster = tokio::spawn(run_broadcast_loop(
            self.link.clone(),
            self.config.broadcast_interval,
            self.shutdown_tx.subscribe(),
        ));

        info!(
            "Server started, broadcasting every {:?}",
            self.config.broadcast_interval
        );

        let (received, broadcast) = tokio::join!(receiver, broadcaster);
        received?;
        broadcast?;

        info!("Server shut down gracefully");
        Ok(())
    }
}

pub(crate) fn is_shutting_down(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Receives datagrams, dispatches them under the state lock and sends the
/// resulting deliveries once the lock is released
async fn receive_loop(
    link: Link,
    recv_timeout: Duration,
    max_datagram_size: usize,
    shutdown: watch::Receiver<bool>,
) {
    let mut buffer = vec![0u8; max_datagram_size];

    loop {
        if is_shutting_down(&shutdown) {
            break;
        }

        let (len, addr) = match timeout(recv_timeout, link.socket.recv_from(&mut buffer)).await {
            Err(_) => continue,
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                error!("Error receiving datagram: {}", e);
                sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let message = match decode_client_message(&buffer[..len]) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", addr, e);
                continue;
            }
        };
        debug!("Received {:?} from {}", message, addr);

        let deliveries = {
            let mut state = link.state.lock().await;
            state.dispatch(addr, message)
        };

        link.deliver_all(deliveries).await;
    }

    debug!("Receive loop stopped");
}
