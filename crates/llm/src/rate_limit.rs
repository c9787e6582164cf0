use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use aires_core::AiresError;

/// Token bucket parameters for one backend. `burst` is the bucket capacity;
/// `rate_per_second` is the refill rate.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
  pub rate_per_second: f64,
  pub burst: f64,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self { rate_per_second: 2.0, burst: 5.0 }
  }
}

/// Classic token bucket: `tokens` refills continuously at `rate_per_second`
/// up to `burst`, and `acquire` waits for at least one token rather than
/// rejecting outright, up to `queueWaitSeconds`.
#[derive(Debug)]
pub struct TokenBucket {
  config: RateLimitConfig,
  state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
  tokens: f64,
  last_refill: Instant,
}

impl TokenBucket {
  pub fn new(config: RateLimitConfig) -> Self {
    Self { state: Mutex::new(BucketState { tokens: config.burst, last_refill: Instant::now() }), config }
  }

  /// Blocks until a token is available, up to `max_wait`. Returns
  /// `RateLimited` if the wait would exceed `max_wait`.
  pub async fn acquire(&self, max_wait: Duration) -> Result<(), AiresError> {
    let start = Instant::now();
    loop {
      let wait = {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
          state.tokens -= 1.0;
          None
        } else {
          let deficit = 1.0 - state.tokens;
          Some(Duration::from_secs_f64(deficit / self.config.rate_per_second))
        }
      };

      match wait {
        None => return Ok(()),
        Some(wait) => {
          if start.elapsed() + wait > max_wait {
            return Err(AiresError::RateLimited(max_wait));
          }
          debug!(?wait, "token bucket: waiting for a slot");
          sleep(wait).await;
        }
      }
    }
  }

  fn refill(&self, state: &mut BucketState) {
    let elapsed = state.last_refill.elapsed();
    state.tokens = (state.tokens + elapsed.as_secs_f64() * self.config.rate_per_second).min(self.config.burst);
    state.last_refill = Instant::now();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn burst_capacity_is_immediately_available() {
    let bucket = TokenBucket::new(RateLimitConfig { rate_per_second: 1.0, burst: 3.0 });
    for _ in 0..3 {
      bucket.acquire(Duration::from_millis(10)).await.unwrap();
    }
  }

  #[tokio::test]
  async fn exhausted_bucket_waits_for_refill() {
    let bucket = TokenBucket::new(RateLimitConfig { rate_per_second: 20.0, burst: 1.0 });
    bucket.acquire(Duration::from_secs(1)).await.unwrap();
    let start = Instant::now();
    bucket.acquire(Duration::from_secs(1)).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(30));
  }

  #[tokio::test]
  async fn exceeding_max_wait_returns_rate_limited() {
    let bucket = TokenBucket::new(RateLimitConfig { rate_per_second: 0.1, burst: 1.0 });
    bucket.acquire(Duration::from_millis(10)).await.unwrap();
    let result = bucket.acquire(Duration::from_millis(10)).await;
    assert!(matches!(result, Err(AiresError::RateLimited(_))));
  }
}
