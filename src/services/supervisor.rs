//! Stream supervisor - keeps the state stream connected
//!
//! Restarts the stream reader after every cycle. Consecutive quick failures
//! (cycles shorter than the quick-failure window) trip a breaker that inserts
//! a cooldown before the next attempt, protecting against failure storms
//! such as DNS or auth outages. Cancelled cycles are expected (status
//! refresh, shutdown) and neither log as faults nor count toward the breaker.

use crate::infra::config::Config;
use crate::infra::metrics::StreamMetrics;
use crate::io::state_stream::{StateStream, StreamError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub quick_failure_window: Duration,
    pub max_quick_failures: u32,
    pub cooldown: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            quick_failure_window: Duration::from_secs(60),
            max_quick_failures: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quick_failure_window: Duration::from_secs(config.quick_failure_window_secs()),
            max_quick_failures: config.max_quick_failures(),
            cooldown: Duration::from_secs(config.cooldown_secs()),
        }
    }
}

/// Quick-failure circuit breaker
#[derive(Debug)]
struct RestartBreaker {
    policy: RestartPolicy,
    quick_failures: u32,
}

impl RestartBreaker {
    fn new(policy: RestartPolicy) -> Self {
        Self { policy, quick_failures: 0 }
    }

    /// Record a finished cycle. Returns the cooldown to wait before the next attempt.
    fn record(&mut self, cycle_duration: Duration, cancelled: bool) -> Option<Duration> {
        if cycle_duration >= self.policy.quick_failure_window {
            self.quick_failures = 0;
            return None;
        }
        if cancelled {
            return None;
        }

        self.quick_failures += 1;
        if self.quick_failures > self.policy.max_quick_failures {
            self.quick_failures = 0;
            return Some(self.policy.cooldown);
        }
        None
    }
}

pub struct Supervisor {
    stream: Arc<StateStream>,
    policy: RestartPolicy,
    metrics: Arc<StreamMetrics>,
}

impl Supervisor {
    pub fn new(stream: Arc<StateStream>, policy: RestartPolicy, metrics: Arc<StreamMetrics>) -> Self {
        Self { stream, policy, metrics }
    }

    /// Run until shutdown is signalled or the state consumer goes away
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            entity = %self.stream.entity_id(),
            quick_failure_window_secs = %self.policy.quick_failure_window.as_secs(),
            max_quick_failures = %self.policy.max_quick_failures,
            cooldown_secs = %self.policy.cooldown.as_secs(),
            "supervisor_started"
        );

        let mut breaker = RestartBreaker::new(self.policy);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let poll = self.stream.poll();
            tokio::pin!(poll);

            let mut stopping = false;
            let outcome = tokio::select! {
                outcome = &mut poll => outcome,
                _ = shutdown_requested(&mut shutdown) => {
                    stopping = true;
                    self.stream.cancel();
                    poll.await
                }
            };
            let elapsed = started.elapsed();

            match &outcome {
                StreamError::Cancelled => {
                    self.metrics.record_cycle_cancelled();
                    info!(duration_ms = %elapsed.as_millis(), "stream_cycle_cancelled");
                }
                StreamError::SinkClosed => {
                    warn!("stream_consumer_closed");
                    break;
                }
                e => {
                    self.metrics.record_cycle_failed();
                    warn!(
                        error = %e,
                        kind = %e.kind(),
                        duration_ms = %elapsed.as_millis(),
                        "stream_cycle_failed"
                    );
                }
            }

            if stopping {
                break;
            }

            if let Some(cooldown) = breaker.record(elapsed, outcome.is_cancelled()) {
                self.metrics.record_cooldown();
                warn!(cooldown_secs = %cooldown.as_secs(), "stream_restart_cooldown");
                tokio::select! {
                    _ = tokio::time::sleep(cooldown) => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        }

        info!("supervisor_stopped");
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
