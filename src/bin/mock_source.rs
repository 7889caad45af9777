//! Mock door state source
//!
//! Serves a server-sent event stream shaped like the door controller's
//! `/events` endpoint, for local testing without hardware.
//!
//! Behavior:
//! 1. Listens on a configurable port (default 8080), any request path
//! 2. On connect, replays the current state of every entity (like the device)
//! 3. Cycles the door through closed -> opening -> open -> closing
//! 4. Sends periodic `ping` events and updates for an unrelated entity
//! 5. Optionally drops each connection after a while to exercise reconnects
//!
//! Usage:
//!   cargo run --bin mock-source -- --port 8080 --entity cover-door --step-ms 2000

use clap::Parser;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Door phases as `(state, current_operation, position)`
const PHASES: [(&str, &str, f32); 4] = [
    ("CLOSED", "IDLE", 0.0),
    ("OPEN", "OPENING", 0.5),
    ("OPEN", "IDLE", 1.0),
    ("OPEN", "CLOSING", 0.5),
];

/// Reconnect delay advertised to clients (ms)
const RETRY_MS: u64 = 3000;

#[derive(Parser, Debug, Clone)]
#[command(name = "mock-source")]
#[command(about = "Mock SSE door state source for local testing")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Entity id of the door
    #[arg(short, long, default_value = "cover-door")]
    entity: String,

    /// Time between door phases (ms)
    #[arg(long, default_value = "2000")]
    step_ms: u64,

    /// Ping interval (ms)
    #[arg(long, default_value = "5000")]
    ping_ms: u64,

    /// Close each connection after this many seconds (0 = never)
    #[arg(long, default_value = "0")]
    close_after_secs: u64,
}

/// Entity payload with the id serialized first, as the device does
fn state_payload(id: &str, state: &str, operation: &str, position: f32) -> String {
    let value = if state == "OPEN" { 1 } else { 0 };
    format!(
        r#"{{"id":"{}","value":{},"state":"{}","current_operation":"{}","position":{}}}"#,
        id, value, state, operation, position
    )
}

fn state_event(id: &str, phase: usize) -> String {
    let (state, operation, position) = PHASES[phase % PHASES.len()];
    format!("event: state\ndata: {}\n\n", state_payload(id, state, operation, position))
}

fn other_device_event(phase: usize) -> String {
    let state = if phase % 2 == 0 { "ON" } else { "OFF" };
    format!(
        "event: state\ndata: {{\"id\":\"light-porch\",\"value\":{},\"state\":\"{}\"}}\n\n",
        phase % 2,
        state
    )
}

fn ping_event() -> String {
    let id = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    format!("id: {}\nevent: ping\ndata: {{}}\nretry: {}\n\n", id, RETRY_MS)
}

async fn serve_client(
    mut socket: TcpStream,
    args: Args,
    mut phases: watch::Receiver<usize>,
) -> std::io::Result<()> {
    // Consume the request head; any path is accepted
    let mut buf = vec![0u8; 4096];
    let mut head = Vec::new();
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\n\
              content-type: text/event-stream\r\n\
              cache-control: no-cache\r\n\
              connection: close\r\n\r\n",
        )
        .await?;

    // Replay current state, as the device does for each new subscriber
    let phase = *phases.borrow_and_update();
    socket.write_all(ping_event().as_bytes()).await?;
    socket.write_all(other_device_event(phase).as_bytes()).await?;
    socket.write_all(state_event(&args.entity, phase).as_bytes()).await?;

    let mut ping = tokio::time::interval(Duration::from_millis(args.ping_ms));
    ping.tick().await;

    let close_after = if args.close_after_secs > 0 {
        Duration::from_secs(args.close_after_secs)
    } else {
        Duration::MAX
    };
    let deadline = tokio::time::sleep(close_after);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = phases.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let phase = *phases.borrow_and_update();
                socket.write_all(other_device_event(phase).as_bytes()).await?;
                socket.write_all(state_event(&args.entity, phase).as_bytes()).await?;
            }
            _ = ping.tick() => {
                socket.write_all(ping_event().as_bytes()).await?;
            }
            _ = &mut deadline => {
                info!("closing_connection");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(port = %args.port, entity = %args.entity, step_ms = %args.step_ms, "mock_source_listening");

    let (phase_tx, phase_rx) = watch::channel(0usize);
    let step = Duration::from_millis(args.step_ms);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(step);
        interval.tick().await;
        loop {
            interval.tick().await;
            phase_tx.send_modify(|phase| *phase = (*phase + 1) % PHASES.len());
            let (state, operation, _) = PHASES[*phase_tx.borrow()];
            info!(state = %state, operation = %operation, "door_phase");
        }
    });

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(peer = %peer, "client_connected");
        let args = args.clone();
        let phases = phase_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_client(socket, args, phases).await {
                warn!(peer = %peer, error = %e, "client_disconnected");
            } else {
                info!(peer = %peer, "client_disconnected");
            }
        });
    }
}
