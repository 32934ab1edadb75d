//! # Per-Endpoint Rate Limiter
//!
//! One last-request timestamp per endpoint, created lazily. A call to an
//! endpoint waits until at least `min_delay` has passed since the previous
//! call to the same endpoint.
//!
//! Each endpoint has its own async mutex; the map only hands out slots, so
//! callers for different endpoints never wait on each other.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default spacing between calls to the same endpoint.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(2000);

type Slot = Arc<Mutex<Option<Instant>>>;

/// Minimum-spacing limiter keyed by endpoint.
#[derive(Debug)]
pub struct EndpointRateLimiter {
    min_delay: Duration,
    slots: DashMap<String, Slot>,
}

impl Default for EndpointRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}

impl EndpointRateLimiter {
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            slots: DashMap::new(),
        }
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Number of endpoints seen so far.
    #[must_use]
    pub fn tracked_endpoints(&self) -> usize {
        self.slots.len()
    }

    /// Wait for the endpoint's turn and record the new request time.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, endpoint: &str) -> Duration {
        // Clone the slot out so no map shard lock is held across the await.
        let slot = self
            .slots
            .entry(endpoint.to_string())
            .or_default()
            .value()
            .clone();

        let mut last = slot.lock().await;
        let mut waited = Duration::ZERO;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                waited = self.min_delay - elapsed;
                tracing::debug!(
                    endpoint,
                    wait_ms = waited.as_millis() as u64,
                    "Rate limiting endpoint"
                );
                tokio::time::sleep(waited).await;
            }
        }
        *last = Some(Instant::now());
        waited
    }
}

// =============================================================================
// TESTS
// =============================================================================
