//! Lock-free stream metrics and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! All atomics use Relaxed ordering: these are statistical counters only.
//! Do not use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector for the stream pipeline
pub struct StreamMetrics {
    /// Connection cycles started (monotonic)
    cycles_started: AtomicU64,
    /// Cycles that ended with an error (monotonic)
    cycles_failed: AtomicU64,
    /// Cycles that ended through cancellation (monotonic)
    cycles_cancelled: AtomicU64,
    /// Restart cooldowns applied by the supervisor (monotonic)
    cooldowns: AtomicU64,
    /// SSE events decoded, all types (monotonic)
    events_decoded: AtomicU64,
    /// Decoded events since last report (reset on report)
    events_since_report: AtomicU64,
    /// State events for the tracked entity (monotonic)
    state_events: AtomicU64,
    /// State change events delivered to the output channel (monotonic)
    events_emitted: AtomicU64,
    /// State change events dropped because the channel was full (monotonic)
    events_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_cancelled: AtomicU64::new(0),
            cooldowns: AtomicU64::new(0),
            events_decoded: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            state_events: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_cancelled(&self) {
        self.cycles_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cooldown(&self) {
        self.cooldowns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_decoded(&self) {
        self.events_decoded.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_state_event(&self) {
        self.state_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters. Only the per-interval rate is reset.
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_cancelled: self.cycles_cancelled.load(Ordering::Relaxed),
            cooldowns: self.cooldowns.load(Ordering::Relaxed),
            events_decoded: self.events_decoded.load(Ordering::Relaxed),
            events_per_sec,
            state_events: self.state_events.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cycles_started: u64,
    pub cycles_failed: u64,
    pub cycles_cancelled: u64,
    pub cooldowns: u64,
    pub events_decoded: u64,
    pub events_per_sec: f64,
    pub state_events: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles = %self.cycles_started,
            cycles_failed = %self.cycles_failed,
            cycles_cancelled = %self.cycles_cancelled,
            cooldowns = %self.cooldowns,
            events_decoded = %self.events_decoded,
            events_per_sec = format!("{:.2}", self.events_per_sec),
            state_events = %self.state_events,
            emitted = %self.events_emitted,
            dropped = %self.events_dropped,
            "metrics"
        );
    }
}
