//! Per-model request-per-minute throttling with observable countdown, and
//! the retry/backoff wrapper every LLM call runs through.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use repl_types::{ProviderError, TurnError};
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;

use crate::config::RetryPolicy;

/// The rolling window length.
const WINDOW: Duration = Duration::from_secs(60);

/// RPM applied to models missing from the configured table.
const FALLBACK_RPM: u32 = 10;

/// Observable throttling activity, for the shell to render.
#[derive(Debug, Clone)]
pub enum RateEvent {
    /// A turn is waiting for a request slot; emitted once per second.
    Countdown {
        /// The throttled model.
        model: String,
        /// Time until a slot frees up.
        remaining: Duration,
    },
    /// A provider error is being retried after a delay.
    Backoff {
        /// The model being called.
        model: String,
        /// Which retry this is (1-based).
        attempt: u32,
        /// How long the turn sleeps before retrying.
        delay: Duration,
    },
}

#[derive(Debug)]
struct RateBucket {
    capacity: u32,
    window_start: Instant,
    count: u32,
}

impl RateBucket {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Reset the window if it has rolled over.
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= WINDOW {
            self.window_start = now;
            self.count = 0;
        }
    }
}

/// The sole authority over LLM request pacing.
///
/// One bucket per model enforces a fixed RPM cap; `acquire` blocks until a
/// slot is free, ticking a subscribable countdown while it waits. The
/// `execute` wrapper adds exponential backoff on retryable provider errors.
pub struct RateController {
    buckets: Mutex<HashMap<String, RateBucket>>,
    rpm_table: HashMap<String, u32>,
    retry: RetryPolicy,
    events: broadcast::Sender<RateEvent>,
}

impl RateController {
    /// A controller over the given RPM table and retry policy.
    #[must_use]
    pub fn new(rpm_table: HashMap<String, u32>, retry: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            buckets: Mutex::new(HashMap::new()),
            rpm_table,
            retry,
            events,
        }
    }

    /// Subscribe to countdown and backoff events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RateEvent> {
        self.events.subscribe()
    }

    fn capacity_for(&self, model: &str) -> u32 {
        self.rpm_table.get(model).copied().unwrap_or(FALLBACK_RPM)
    }

    /// Block until a request slot is free for `model`.
    ///
    /// Does not consume the slot — pair with [`record`](Self::record) once
    /// the request is actually issued.
    pub async fn acquire(&self, model: &str) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets
                    .entry(model.to_string())
                    .or_insert_with(|| RateBucket::new(self.capacity_for(model)));
                let now = Instant::now();
                bucket.roll(now);
                if bucket.count < bucket.capacity {
                    return;
                }
                WINDOW.saturating_sub(now.duration_since(bucket.window_start))
            };

            tracing::debug!(model, wait_secs = wait.as_secs(), "rate cap reached, waiting");
            let mut remaining = wait;
            while remaining > Duration::ZERO {
                let _ = self.events.send(RateEvent::Countdown {
                    model: model.to_string(),
                    remaining,
                });
                let step = remaining.min(Duration::from_secs(1));
                tokio::time::sleep(step).await;
                remaining = remaining.saturating_sub(step);
            }
        }
    }

    /// Count one request against `model`'s bucket.
    pub async fn record(&self, model: &str) {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(model.to_string())
            .or_insert_with(|| RateBucket::new(self.capacity_for(model)));
        bucket.roll(Instant::now());
        bucket.count += 1;
    }

    /// Run one logical LLM call: acquire a slot, issue the request, and on
    /// a retryable error back off and try again (2s × 1.5 per attempt,
    /// capped at 60s, at most 5 attempts).
    ///
    /// A terminal [`ProviderError::Throttled`] surfaces as
    /// [`TurnError::RateExceeded`]; other terminal errors map through
    /// [`TurnError::from_provider`].
    pub async fn execute<T, Fut>(
        &self,
        model: &str,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T, TurnError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            self.acquire(model).await;
            self.record(model).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "provider error, backing off"
                    );
                    let _ = self.events.send(RateEvent::Backoff {
                        model: model.to_string(),
                        attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(TurnError::from_provider(err, model)),
            }
        }
    }
}
