use std::time::Duration;

/// Backoff schedule for resumable SSE streams, per `ReconnectionOptions` in
/// the TypeScript `StreamableHTTPClientTransport` this crate's sibling
/// (`rmcp`) reimplements for its own transports. Defaults match that SDK's
/// published defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectionOptions {
    pub initial_reconnection_delay: Duration,
    pub max_reconnection_delay: Duration,
    pub reconnection_delay_grow_factor: f64,
    pub max_retries: usize,
}

impl Default for ReconnectionOptions {
    fn default() -> Self {
        Self {
            initial_reconnection_delay: Duration::from_millis(1000),
            max_reconnection_delay: Duration::from_millis(30_000),
            reconnection_delay_grow_factor: 1.5,
            max_retries: 2,
        }
    }
}

impl ReconnectionOptions {
    /// `delay(k) = min(max, initial * grow^k)`, `attempt` is 0-indexed.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let initial = self.initial_reconnection_delay.as_secs_f64();
        let grown = initial * self.reconnection_delay_grow_factor.powi(attempt as i32);
        let capped = grown.min(self.max_reconnection_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// The delay before attempt `attempt` (0-indexed), or `None` once
    /// `attempt >= max_retries`, at which point the caller must give up.
    ///
    /// Spec §4.4/§8 Invariant 2 pin this to exactly `min(max, initial *
    /// grow^attempt)` — the server's SSE `retry:` hint is tracked by the
    /// stream reader but does not feed into this formula.
    pub fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(self.delay_for_attempt(attempt))
    }
}
