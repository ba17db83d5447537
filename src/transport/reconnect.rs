//! Reconnect policy for the live-update stream.
//!
//! Implements exponential backoff with configurable parameters.

/// Backoff schedule applied between live-stream reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial backoff duration in seconds.
    pub initial_backoff_secs: u64,
    /// Maximum backoff duration in seconds (cap for exponential growth).
    pub max_backoff_secs: u64,
    /// Multiplier applied to backoff after each failed attempt.
    pub backoff_multiplier: f64,
}

impl ReconnectPolicy {
    /// Calculate backoff duration in seconds for a given attempt count.
    ///
    /// Uses exponential backoff: `initial_backoff * multiplier^attempt`,
    /// capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, attempt: u32) -> u64 {
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(attempt as i32);
        backoff.min(self.max_backoff_secs as f64) as u64
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 2,
            max_backoff_secs: 300, // 5 minutes
            backoff_multiplier: 2.0,
        }
    }
}
