//! Shared types for the door state pipeline

use serde::{Deserialize, Deserializer};
use std::fmt;

/// Door state as published to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoorState {
    #[default]
    Unknown,
    Open,
    Closed,
    Opening,
    Closing,
}

impl DoorState {
    /// Lowercase name for structured log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorState::Unknown => "unknown",
            DoorState::Open => "open",
            DoorState::Closed => "closed",
            DoorState::Opening => "opening",
            DoorState::Closing => "closing",
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DoorState::Unknown => "Unknown",
            DoorState::Open => "Open",
            DoorState::Closed => "Closed",
            DoorState::Opening => "Opening",
            DoorState::Closing => "Closing",
        };
        f.write_str(name)
    }
}

/// Vendor state vocabulary used to derive a `DoorState`
///
/// Source firmware revisions disagree on where motion is reported:
/// - `Strict`: motion only appears in `current_operation` while `state` is `OPEN`
/// - `Extended`: additionally accepts `OPENING` / `CLOSING` as primary states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateVocabulary {
    #[default]
    Strict,
    Extended,
}

impl StateVocabulary {
    /// Map a `(state, current_operation)` pair. Pure: no history is consulted.
    pub fn map(&self, primary: &str, operation: &str) -> DoorState {
        match (primary, operation) {
            ("OPEN", "IDLE") => DoorState::Open,
            ("OPEN", "OPENING") => DoorState::Opening,
            ("OPEN", "CLOSING") => DoorState::Closing,
            ("CLOSED", "IDLE") => DoorState::Closed,
            ("OPENING", _) if *self == StateVocabulary::Extended => DoorState::Opening,
            ("CLOSING", _) if *self == StateVocabulary::Extended => DoorState::Closing,
            _ => DoorState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateVocabulary::Strict => "strict",
            StateVocabulary::Extended => "extended",
        }
    }
}

/// State payload for one entity, decoded from a `state` event's data.
/// Missing or `null` fields default to empty / zero, unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EntityStateSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub current_operation: String,
    #[serde(deserialize_with = "null_as_default")]
    pub position: f32,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decoded snapshot together with the state it maps to
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeEvent {
    pub snapshot: EntityStateSnapshot,
    pub mapped: DoorState,
}

impl StateChangeEvent {
    pub fn new(snapshot: EntityStateSnapshot, vocabulary: StateVocabulary) -> Self {
        let mapped = vocabulary.map(&snapshot.state, &snapshot.current_operation);
        Self { snapshot, mapped }
    }
}

/// Action currently being performed on the door
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoorOperation {
    #[default]
    Waiting,
    Open,
    Close,
    Query,
}

impl DoorOperation {
    /// Human readable label used in status text
    pub fn label(&self) -> &'static str {
        match self {
            DoorOperation::Waiting => "Ready",
            DoorOperation::Open => "Opening Door",
            DoorOperation::Close => "Closing Door",
            DoorOperation::Query => "Refreshing Door Status",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DoorOperation::Waiting => "waiting",
            DoorOperation::Open => "open",
            DoorOperation::Close => "close",
            DoorOperation::Query => "query",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mapping_table() {
        let v = StateVocabulary::Strict;
        assert_eq!(v.map("OPEN", "IDLE"), DoorState::Open);
        assert_eq!(v.map("OPEN", "OPENING"), DoorState::Opening);
        assert_eq!(v.map("OPEN", "CLOSING"), DoorState::Closing);
        assert_eq!(v.map("CLOSED", "IDLE"), DoorState::Closed);
    }

    #[test]
    fn test_strict_mapping_everything_else_is_unknown() {
        let v = StateVocabulary::Strict;
        let primaries = ["OPEN", "CLOSED", "OPENING", "CLOSING", "open", "", "STOPPED"];
        let operations = ["IDLE", "OPENING", "CLOSING", "idle", "", "MOVING"];
        let known = [
            ("OPEN", "IDLE"),
            ("OPEN", "OPENING"),
            ("OPEN", "CLOSING"),
            ("CLOSED", "IDLE"),
        ];

        for primary in primaries {
            for operation in operations {
                if known.contains(&(primary, operation)) {
                    continue;
                }
                assert_eq!(
                    v.map(primary, operation),
                    DoorState::Unknown,
                    "({primary}, {operation}) should be unknown"
                );
            }
        }
    }

    #[test]
    fn test_closed_with_motion_is_unknown() {
        let v = StateVocabulary::Strict;
        assert_eq!(v.map("CLOSED", "OPENING"), DoorState::Unknown);
        assert_eq!(v.map("CLOSED", "CLOSING"), DoorState::Unknown);
    }

    #[test]
    fn test_extended_accepts_motion_primary_states() {
        let v = StateVocabulary::Extended;
        assert_eq!(v.map("OPENING", "IDLE"), DoorState::Opening);
        assert_eq!(v.map("CLOSING", ""), DoorState::Closing);
        assert_eq!(v.map("OPEN", "IDLE"), DoorState::Open);
        assert_eq!(v.map("CLOSED", "IDLE"), DoorState::Closed);
        assert_eq!(v.map("STOPPED", "IDLE"), DoorState::Unknown);
    }

    #[test]
    fn test_snapshot_defaults_missing_fields() {
        let snapshot: EntityStateSnapshot =
            serde_json::from_str(r#"{"id":"cover-door","state":"OPEN"}"#).unwrap();
        assert_eq!(snapshot.id, "cover-door");
        assert_eq!(snapshot.state, "OPEN");
        assert_eq!(snapshot.current_operation, "");
        assert_eq!(snapshot.value, 0.0);
        assert_eq!(snapshot.position, 0.0);
    }

    #[test]
    fn test_snapshot_null_fields_default() {
        let snapshot: EntityStateSnapshot = serde_json::from_str(
            r#"{"id":"cover-door","value":null,"state":"OPEN","current_operation":null,"position":null}"#,
        )
        .unwrap();
        assert_eq!(snapshot.state, "OPEN");
        assert_eq!(snapshot.current_operation, "");
        assert_eq!(snapshot.value, 0.0);
        assert_eq!(snapshot.position, 0.0);
    }

    #[test]
    fn test_snapshot_ignores_unknown_fields() {
        let snapshot: EntityStateSnapshot = serde_json::from_str(
            r#"{"id":"cover-door","value":1,"state":"CLOSED","current_operation":"IDLE","position":0.25,"name":"Garage"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.value, 1.0);
        assert_eq!(snapshot.position, 0.25);
        assert_eq!(snapshot.current_operation, "IDLE");
    }

    #[test]
    fn test_state_change_event_maps_snapshot() {
        let snapshot = EntityStateSnapshot {
            id: "cover-door".to_string(),
            state: "OPEN".to_string(),
            current_operation: "CLOSING".to_string(),
            ..Default::default()
        };
        let event = StateChangeEvent::new(snapshot, StateVocabulary::Strict);
        assert_eq!(event.mapped, DoorState::Closing);
    }

    #[test]
    fn test_vocabulary_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            vocabulary: StateVocabulary,
        }
        let w: Wrapper = toml::from_str(r#"vocabulary = "extended""#).unwrap();
        assert_eq!(w.vocabulary, StateVocabulary::Extended);
    }

    #[test]
    fn test_labels() {
        assert_eq!(DoorState::Opening.to_string(), "Opening");
        assert_eq!(DoorState::Closed.as_str(), "closed");
        assert_eq!(DoorOperation::Waiting.label(), "Ready");
        assert_eq!(DoorOperation::Query.label(), "Refreshing Door Status");
    }
}
