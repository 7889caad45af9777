//! Long-lived state stream reader
//!
//! One `poll()` call is one connection cycle:
//! connect → decode SSE events → keep `state` events for the tracked entity →
//! map vendor state → `try_send` onto the output channel.
//!
//! A cycle has no success outcome: it always ends with the reason it stopped,
//! and the caller decides when to reconnect. At most one cycle runs at a time.

use crate::domain::types::{EntityStateSnapshot, StateChangeEvent, StateVocabulary};
use crate::infra::config::Config;
use crate::infra::metrics::StreamMetrics;
use crate::io::source::Connector;
use crate::io::sse::{DecodeError, SseDecoder, SseEvent};
use futures_util::TryStreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event type carrying entity state payloads
pub const STATE_EVENT_TYPE: &str = "state";

/// Why a stream cycle ended
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to event source: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("event source responded with HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("malformed state payload for tracked entity: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("stream cycle exceeded {0:?}")]
    Timeout(Duration),
    #[error("event source closed the stream")]
    Disconnected,
    #[error("a stream cycle is already running")]
    AlreadyRunning,
    #[error("state event consumer is gone")]
    SinkClosed,
    #[error("stream cycle cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// Coarse classification for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Connect(_)
            | StreamError::Status(_)
            | StreamError::Timeout(_)
            | StreamError::Disconnected => "transport",
            StreamError::Decode(DecodeError::Io(_)) => "transport",
            StreamError::Decode(_) | StreamError::Payload(_) => "protocol",
            StreamError::AlreadyRunning => "busy",
            StreamError::SinkClosed => "sink",
            StreamError::Cancelled => "cancelled",
        }
    }
}

/// Settings for the stream reader
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub entity_id: String,
    pub vocabulary: StateVocabulary,
    /// Upper bound for one cycle, guards against a wedged connection
    pub cycle_timeout: Duration,
}

impl StreamOptions {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            vocabulary: StateVocabulary::default(),
            cycle_timeout: Duration::from_secs(3600),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            entity_id: config.entity_id().to_string(),
            vocabulary: config.vocabulary(),
            cycle_timeout: Duration::from_secs(config.cycle_timeout_secs()),
        }
    }
}

/// Cheap pre-filter on the raw payload: the source always serializes the
/// entity id as the leading field, so other entities are skipped without
/// parsing their JSON.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    prefix: String,
}

impl EntityFilter {
    pub fn new(entity_id: &str) -> Self {
        // Quote and escape the id the same way the source serializes it
        let quoted = serde_json::Value::from(entity_id).to_string();
        Self { prefix: format!(r#"{{"id":{},"#, quoted) }
    }

    pub fn matches(&self, data: &str) -> bool {
        data.starts_with(&self.prefix)
    }
}

/// Turn a decoded SSE event into a state change for the tracked entity.
///
/// Returns `Ok(None)` for other event types and other entities. A payload
/// that passes the filter but is not valid JSON is a protocol error.
pub fn decode_state_event(
    event: &SseEvent,
    filter: &EntityFilter,
    vocabulary: StateVocabulary,
) -> Result<Option<StateChangeEvent>, StreamError> {
    if event.event_type != STATE_EVENT_TYPE || !filter.matches(&event.data) {
        return Ok(None);
    }
    let snapshot: EntityStateSnapshot = serde_json::from_str(&event.data)?;
    Ok(Some(StateChangeEvent::new(snapshot, vocabulary)))
}

pub struct StateStream {
    connector: Arc<dyn Connector>,
    options: StreamOptions,
    filter: EntityFilter,
    events_tx: mpsc::Sender<StateChangeEvent>,
    metrics: Arc<StreamMetrics>,
    /// Held for the whole cycle; overlapping polls are rejected
    poll_lock: tokio::sync::Mutex<()>,
    /// Token of the active cycle, if any
    active: parking_lot::Mutex<Option<CancellationToken>>,
}

impl StateStream {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: StreamOptions,
        events_tx: mpsc::Sender<StateChangeEvent>,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        let filter = EntityFilter::new(&options.entity_id);
        Self {
            connector,
            options,
            filter,
            events_tx,
            metrics,
            poll_lock: tokio::sync::Mutex::new(()),
            active: parking_lot::Mutex::new(None),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.options.entity_id
    }

    /// Run one connection cycle and return why it ended.
    ///
    /// Returns `StreamError::AlreadyRunning` immediately, without connecting,
    /// when another cycle is in flight.
    pub async fn poll(&self) -> StreamError {
        let Ok(_guard) = self.poll_lock.try_lock() else {
            return StreamError::AlreadyRunning;
        };

        let token = CancellationToken::new();
        *self.active.lock() = Some(token.clone());
        self.metrics.record_cycle_started();

        let timeout = self.options.cycle_timeout;
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => StreamError::Cancelled,
            result = tokio::time::timeout(timeout, self.run_cycle()) => match result {
                Ok(Ok(())) => StreamError::Disconnected,
                Ok(Err(e)) => e,
                Err(_) => StreamError::Timeout(timeout),
            },
        };

        self.active.lock().take();
        outcome
    }

    /// Tear down the active cycle's connection.
    ///
    /// Safe from any task at any time; a no-op when no cycle is running.
    /// Does not wait for `poll()` to return.
    pub fn cancel(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            debug!(entity = %self.options.entity_id, "stream_cancel_requested");
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    async fn run_cycle(&self) -> Result<(), StreamError> {
        let body = self.connector.connect().await?;
        info!(
            entity = %self.options.entity_id,
            endpoint = %self.connector.endpoint(),
            "stream_connected"
        );

        let events = SseDecoder::new(body).into_stream();
        futures_util::pin_mut!(events);

        // Rate-limit drop warnings to 1 per second
        let mut last_drop_warn: Option<Instant> = None;

        while let Some(event) = events.try_next().await? {
            self.metrics.record_event_decoded();

            let Some(change) = decode_state_event(&event, &self.filter, self.options.vocabulary)?
            else {
                continue;
            };
            self.metrics.record_state_event();

            debug!(
                entity = %change.snapshot.id,
                state = %change.snapshot.state,
                operation = %change.snapshot.current_operation,
                value = change.snapshot.value,
                position = change.snapshot.position,
                mapped = %change.mapped.as_str(),
                "state_update_received"
            );

            // Never block ingestion on a slow consumer
            match self.events_tx.try_send(change) {
                Ok(()) => self.metrics.record_event_emitted(),
                Err(TrySendError::Full(_)) => {
                    self.metrics.record_event_dropped();
                    if drop_warn_due(last_drop_warn) {
                        warn!(entity = %self.options.entity_id, "state_event_dropped: channel full");
                        last_drop_warn = Some(Instant::now());
                    }
                }
                Err(TrySendError::Closed(_)) => return Err(StreamError::SinkClosed),
            }
        }

        Ok(())
    }
}

/// True when no drop warning was logged within the last second
fn drop_warn_due(last: Option<Instant>) -> bool {
    last.map_or(true, |at| at.elapsed() > Duration::from_secs(1))
}
