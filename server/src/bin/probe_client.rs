use clap::Parser;
use rand::Rng;
use serde_json::json;
use shared::{
    decode_server_message, encode_client_message, ClientMessage, RawAction, ServerMessage,
};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Registers with a relay server, walks in a circle and prints what comes back
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    server: SocketAddr,

    /// Number of movement batches to send
    #[arg(short, long, default_value = "50")]
    moves: u32,

    /// Delay between batches in milliseconds
    #[arg(short, long, default_value = "50")]
    interval_ms: u64,
}

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(
    socket: &UdpSocket,
    server: SocketAddr,
    message: &ClientMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = encode_client_message(message)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

/// Prints everything that arrives within `window`
async fn drain(socket: &UdpSocket, window: Duration) -> Vec<ServerMessage> {
    let mut buf = [0u8; 4096];
    let mut received = Vec::new();

    while let Ok(Ok((len, _))) = timeout(window, socket.recv_from(&mut buf)).await {
        match decode_server_message(&buf[..len]) {
            Ok(message) => {
                println!("<- {:?}", message);
                received.push(message);
            }
            Err(e) => println!("Failed to decode server message: {}", e),
        }
    }

    received
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Probe bound to {}", socket.local_addr()?);

    let mut rng = rand::thread_rng();
    let start = json!({"x": rng.gen_range(0.0..100.0), "y": rng.gen_range(0.0..100.0)});

    println!("Registering with {}", args.server);
    send(
        &socket,
        args.server,
        &ClientMessage::Register {
            id: None,
            position: start,
        },
    )
    .await?;

    let session_id = drain(&socket, Duration::from_millis(500))
        .await
        .into_iter()
        .find_map(|message| match message {
            ServerMessage::Id { id } => Some(id),
            _ => None,
        });

    let session_id = match session_id {
        Some(id) => id,
        None => {
            println!("No registration ack from {}", args.server);
            return Ok(());
        }
    };
    println!("Registered as session {}", session_id);

    for step in 0..args.moves {
        let angle = step as f64 / 8.0;
        let mut actions = vec![RawAction::moving(json!({
            "position": {"x": 50.0 + 25.0 * angle.cos(), "y": 50.0 + 25.0 * angle.sin()}
        }))];

        // An occasional event so peers see relays too
        if rng.gen_bool(0.1) {
            actions.push(RawAction::event(json!({"burst": rng.gen_range(1..20)})));
        }

        send(
            &socket,
            args.server,
            &ClientMessage::Actions {
                id: Some(session_id),
                timestamp: get_timestamp(),
                actions,
            },
        )
        .await?;

        drain(&socket, Duration::from_millis(5)).await;
        sleep(Duration::from_millis(args.interval_ms)).await;
    }

    drain(&socket, Duration::from_millis(200)).await;
    println!("Probe finished");

    Ok(())
}
