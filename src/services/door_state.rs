//! Door state actor - single owner of the current door state
//!
//! The stream reader feeds `StateChangeEvent`s over an mpsc channel and
//! actions send commands through a `StateHandle`. The actor publishes a
//! `DoorSnapshot` on a watch channel, so consumers always see the latest
//! value and are woken exactly once per distinct transition.

use crate::domain::types::{DoorOperation, DoorState, StateChangeEvent};
use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

/// Command queue depth for the actor
const COMMAND_CAPACITY: usize = 16;

/// Published view of the door
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoorSnapshot {
    pub state: DoorState,
    /// When `state` last changed; `None` until the first transition
    pub changed_at: Option<DateTime<Local>>,
    pub operation: DoorOperation,
}

impl DoorSnapshot {
    /// One-line description, e.g. `Door: Open since 3:04PM on 2006-01-02`
    pub fn status_line(&self) -> String {
        match self.changed_at {
            Some(at) if self.state != DoorState::Unknown => {
                format!("Door: {} since {}", self.state, at.format("%-I:%M%p on %Y-%m-%d"))
            }
            _ => "(door status unknown)".to_string(),
        }
    }
}

impl fmt::Display for DoorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.operation.label(), self.status_line())
    }
}

/// Commands accepted by the actor; the ack fires once the change is published
#[derive(Debug)]
enum StateCommand {
    SetOperation { operation: DoorOperation, ack: oneshot::Sender<()> },
    ResetUnknown { ack: oneshot::Sender<()> },
}

pub struct DoorStateActor {
    events_rx: mpsc::Receiver<StateChangeEvent>,
    commands_rx: mpsc::Receiver<StateCommand>,
    snapshot_tx: watch::Sender<DoorSnapshot>,
}

impl DoorStateActor {
    /// Run until the event channel and every handle are closed
    pub async fn run(mut self) {
        info!("door_state_actor_started");

        let mut events_open = true;
        let mut commands_open = true;

        while events_open || commands_open {
            tokio::select! {
                event = self.events_rx.recv(), if events_open => match event {
                    Some(event) => self.apply_event(event),
                    None => events_open = false,
                },
                command = self.commands_rx.recv(), if commands_open => match command {
                    Some(command) => self.apply_command(command),
                    None => commands_open = false,
                },
            }
        }

        info!("door_state_actor_stopped");
    }

    fn apply_event(&mut self, event: StateChangeEvent) {
        let mapped = event.mapped;
        let mut previous = DoorState::Unknown;
        let changed = self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.state == mapped {
                return false;
            }
            previous = snapshot.state;
            snapshot.state = mapped;
            snapshot.changed_at = Some(Local::now());
            true
        });

        if changed {
            info!(
                entity = %event.snapshot.id,
                from = %previous.as_str(),
                to = %mapped.as_str(),
                "door_state_changed"
            );
        } else {
            debug!(entity = %event.snapshot.id, state = %mapped.as_str(), "door_state_unchanged");
        }
    }

    fn apply_command(&mut self, command: StateCommand) {
        match command {
            StateCommand::SetOperation { operation, ack } => {
                self.snapshot_tx.send_if_modified(|snapshot| {
                    let modified = snapshot.operation != operation;
                    snapshot.operation = operation;
                    modified
                });
                debug!(operation = %operation.as_str(), "door_operation_set");
                let _ = ack.send(());
            }
            StateCommand::ResetUnknown { ack } => {
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.state = DoorState::Unknown;
                    snapshot.changed_at = Some(Local::now());
                });
                info!("door_state_reset");
                let _ = ack.send(());
            }
        }
    }
}

/// Cloneable access to the actor
#[derive(Clone)]
pub struct StateHandle {
    commands_tx: mpsc::Sender<StateCommand>,
    snapshot_rx: watch::Receiver<DoorSnapshot>,
}

impl StateHandle {
    /// Latest published snapshot
    pub fn snapshot(&self) -> DoorSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver woken on every published change
    pub fn subscribe(&self) -> watch::Receiver<DoorSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Set the current operation. Resolves once the actor has applied it.
    pub async fn set_operation(&self, operation: DoorOperation) {
        let (ack, done) = oneshot::channel();
        if self.commands_tx.send(StateCommand::SetOperation { operation, ack }).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Forget the current state so the next event is treated as a transition
    pub async fn reset_unknown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands_tx.send(StateCommand::ResetUnknown { ack }).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Wait until the published snapshot satisfies `predicate`.
    /// Returns `false` on timeout or when the actor has stopped.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&DoorSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        let reached =
            matches!(tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await, Ok(Ok(_)));
        reached
    }
}

/// Create the actor and a handle to it
pub fn create_door_state(
    events_rx: mpsc::Receiver<StateChangeEvent>,
) -> (StateHandle, DoorStateActor) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(DoorSnapshot::default());

    let handle = StateHandle { commands_tx, snapshot_rx };
    let actor = DoorStateActor { events_rx, commands_rx, snapshot_tx };
    (handle, actor)
}
