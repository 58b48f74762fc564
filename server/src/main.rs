use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use shared::{DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_PORT, MAX_DATAGRAM_SIZE};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Snapshot broadcast period in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_BROADCAST_INTERVAL_MS)]
    broadcast_interval_ms: u64,

    /// Longest single wait on the socket before checking for shutdown
    #[arg(long, default_value = "1000")]
    recv_timeout_ms: u64,

    /// Inbound datagram buffer size in bytes
    #[arg(long, default_value_t = MAX_DATAGRAM_SIZE)]
    max_datagram: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            broadcast_interval: Duration::from_millis(args.broadcast_interval_ms),
            recv_timeout: Duration::from_millis(args.recv_timeout_ms),
            max_datagram_size: args.max_datagram,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Starting relay server...");

    let server = Arc::new(Server::bind(ServerConfig::from(args)).await?);

    let mut server_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = &mut server_handle => {
            // The loops only return on shutdown, so getting here means a task died
            result??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received Ctrl+C, shutting down...");
        }
    }

    server.shutdown();
    server_handle.await??;

    Ok(())
}
