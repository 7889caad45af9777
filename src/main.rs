//! garage-watch - live garage door state from a server-sent event stream
//!
//! Module structure:
//! - `domain/` - Door state types and the vendor state mapping
//! - `io/` - SSE decoding and the long-lived state stream reader
//! - `services/` - Supervisor, door state actor, door actions
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::{Parser, Subcommand};
use garage_watch::infra::config::Config;
use garage_watch::infra::StreamMetrics;
use garage_watch::io::{HttpConnector, StateStream, StreamOptions};
use garage_watch::GIT_HASH;
use garage_watch::services::{
    create_door_state, ActionOutcome, DoorActuator, RestartPolicy, StateHandle, Supervisor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Garage door watcher
#[derive(Parser, Debug)]
#[command(name = "garage-watch", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Follow the door state until Ctrl+C (default)
    Watch,
    /// Trigger the open webhook and wait for the door to open
    Open,
    /// Trigger the close webhook and wait for the door to close
    Close,
    /// Reconnect to the source and wait for a fresh state report
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Default: INFO, use RUST_LOG=debug for per-event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %GIT_HASH, "garage-watch starting");

    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));
    info!(
        config_file = %config.config_file(),
        source_url = %config.source_url(),
        entity = %config.entity_id(),
        vocabulary = %config.vocabulary().as_str(),
        cycle_timeout_secs = %config.cycle_timeout_secs(),
        channel_capacity = %config.channel_capacity(),
        open_webhook = %config.webhook_open_url().is_some(),
        close_webhook = %config.webhook_close_url().is_some(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(StreamMetrics::new());

    // Bounded: the reader drops updates instead of waiting on the actor
    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity());

    let connector = Arc::new(HttpConnector::new(config.source_url())?);
    let stream = Arc::new(StateStream::new(
        connector,
        StreamOptions::from_config(&config),
        events_tx,
        metrics.clone(),
    ));

    let (state, actor) = create_door_state(events_rx);
    let actor_task = tokio::spawn(actor.run());

    let supervisor =
        Supervisor::new(stream.clone(), RestartPolicy::from_config(&config), metrics.clone());
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx.clone()));

    tokio::spawn(log_status_changes(state.clone(), shutdown_rx.clone()));

    // Start metrics reporter
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics.report().log();
            }
        });
    }

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown_signal_received");
        }
        action => {
            let actuator = DoorActuator::new(&config, state.clone(), stream.clone())?;
            let result = tokio::select! {
                result = run_action(&actuator, action) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown_signal_received");
                    Ok(())
                }
            };
            if let Err(e) = result {
                error!(error = %e, "door_action_failed");
            }
            println!("{}", state.snapshot());
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = supervisor_task.await {
        warn!(error = %e, "supervisor_task_failed");
    }

    // The stream owns the last event sender; the actor stops once it and
    // every state handle are gone
    drop(stream);
    drop(state);
    let _ = tokio::time::timeout(Duration::from_secs(1), actor_task).await;

    metrics.report().log();
    info!("garage-watch shutdown complete");
    Ok(())
}

async fn run_action(actuator: &DoorActuator, action: Command) -> anyhow::Result<()> {
    let outcome = match action {
        Command::Open => actuator.open().await?,
        Command::Close => actuator.close().await?,
        Command::Refresh => actuator.refresh().await?,
        Command::Watch => return Ok(()),
    };

    match outcome {
        ActionOutcome::Completed => info!(action = ?action, "action_completed"),
        ActionOutcome::TimedOut => warn!(action = ?action, "action_timed_out"),
    }
    Ok(())
}

/// Log every published snapshot change until shutdown
async fn log_status_changes(state: StateHandle, mut shutdown: watch::Receiver<bool>) {
    let mut snapshots = state.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    state = %snapshot.state.as_str(),
                    operation = %snapshot.operation.as_str(),
                    status = %snapshot.status_line(),
                    "door_status"
                );
            }
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}
