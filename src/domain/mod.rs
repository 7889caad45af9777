//! Domain models - door states and the payloads they are derived from
//!
//! This module contains the canonical data types used throughout the system:
//! - `DoorState` - the closed set of states consumers see
//! - `StateVocabulary` - how vendor state strings map onto `DoorState`
//! - `EntityStateSnapshot` - decoded vendor payload for the tracked entity
//! - `StateChangeEvent` - snapshot plus mapped state, emitted by the stream reader
//! - `DoorOperation` - the action currently being performed on the door

pub mod types;

// Re-export commonly used types at module level
pub use types::{DoorOperation, DoorState, EntityStateSnapshot, StateChangeEvent, StateVocabulary};
