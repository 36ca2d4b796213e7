use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Default)]
/// Produces human-like delays so consecutive page loads do not look scripted.
pub struct BehavioralEngine {}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// Sleep for a random duration between `min` and `max` milliseconds.
    pub async fn random_delay(&self, min: u64, max: u64) {
        sleep(self.jittered(min, max)).await;
    }

    /// Pick a duration in `[min, max]` milliseconds.
    pub fn jittered(&self, min: u64, max: u64) -> Duration {
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(OsRng.gen_range(min..=max))
    }

    /// Backoff before a retry: `base` plus up to half of `base` extra.
    pub fn backoff(&self, base: Duration) -> Duration {
        let base_ms = base.as_millis() as u64;
        self.jittered(base_ms, base_ms + base_ms / 2)
    }
}
