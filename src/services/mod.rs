//! Services - door state management and stream supervision
//!
//! This module contains the long-running services:
//! - `supervisor` - Restarts the state stream with quick-failure backoff
//! - `door_state` - Actor owning the current door state
//! - `actuator` - Open/close webhooks and status refresh

pub mod actuator;
pub mod door_state;
pub mod supervisor;

// Re-export commonly used types
pub use actuator::{ActionOutcome, ActuatorError, DoorActuator};
pub use door_state::{create_door_state, DoorSnapshot, DoorStateActor, StateHandle};
pub use supervisor::{RestartPolicy, Supervisor};
