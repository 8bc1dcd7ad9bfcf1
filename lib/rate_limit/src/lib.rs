use std::{
  net::IpAddr,
  sync::Arc,
  time::{Duration, Instant},
};

use cache::CloneCache;
use tokio::sync::RwLock;

type AttemptLog = Arc<RwLock<Vec<Instant>>>;

/// Failure-scoped rate limiter keyed by client IP.
///
/// Only failing attempts count against the window, so operators
/// with valid credentials are never throttled.
pub struct RateLimiter {
  attempts: CloneCache<IpAddr, AttemptLog>,
  disabled: bool,
  max_attempts: usize,
  window: Duration,
}

impl RateLimiter {
  /// Create a new rate limiter. Also spawns a tokio task to clean
  /// up stale keys (ones which haven't failed in 15+ minutes).
  pub fn new(
    disabled: bool,
    max_attempts: usize,
    window_seconds: u64,
  ) -> Arc<Self> {
    let limiter = Arc::new(Self {
      attempts: CloneCache::default(),
      disabled,
      max_attempts,
      window: Duration::from_secs(window_seconds),
    });
    if !disabled {
      spawn_cleanup_task(limiter.clone());
    }
    limiter
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  /// Whether the IP has exhausted its failure budget for the
  /// current window. Prunes expired attempts on violation.
  pub async fn violated(&self, ip: &IpAddr) -> bool {
    if self.disabled {
      return false;
    }
    let attempts = self.attempts.get_or_insert_default(ip).await;
    let read = attempts.read().await;
    let window_start = Instant::now() - self.window;
    let count =
      read.iter().filter(|&&time| time > window_start).count();
    drop(read);
    if count >= self.max_attempts {
      // Use this opportunity to clear the attempts log
      attempts.write().await.retain(|&time| time > window_start);
      return true;
    }
    false
  }

  /// Record a failed attempt for the IP.
  pub async fn record_failure(&self, ip: &IpAddr) {
    if self.disabled {
      return;
    }
    let attempts = self.attempts.get_or_insert_default(ip).await;
    let mut write = attempts.write().await;
    let window_start = Instant::now() - self.window;
    write.retain(|&time| time > window_start);
    write.push(Instant::now());
  }
}

/// Runs every minute, clears off the best guess of stale entries.
/// Repeatedly succeeding IPs end up with an empty attempts log and
/// are cleared off when this runs.
fn spawn_cleanup_task(limiter: Arc<RateLimiter>) {
  tokio::spawn(async move {
    let mut interval =
      tokio::time::interval(Duration::from_secs(60));
    loop {
      interval.tick().await;
      let remove_before =
        Instant::now() - Duration::from_secs(15 * 60);
      limiter
        .attempts
        .retain(|_, attempts| {
          let Ok(attempts) = attempts.try_read() else {
            // Locked logs are being actively used, not stale.
            return true;
          };
          let Some(&last) = attempts.last() else {
            return false;
          };
          last > remove_before
        })
        .await;
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ip() -> IpAddr {
    "127.0.0.1".parse().unwrap()
  }

  #[tokio::test]
  async fn violates_after_max_failures() {
    let limiter = RateLimiter::new(false, 3, 60);
    for _ in 0..2 {
      limiter.record_failure(&ip()).await;
    }
    assert!(!limiter.violated(&ip()).await);
    limiter.record_failure(&ip()).await;
    assert!(limiter.violated(&ip()).await);
  }

  #[tokio::test]
  async fn disabled_never_violates() {
    let limiter = RateLimiter::new(true, 1, 60);
    limiter.record_failure(&ip()).await;
    limiter.record_failure(&ip()).await;
    assert!(!limiter.violated(&ip()).await);
  }

  #[tokio::test]
  async fn other_ips_unaffected() {
    let limiter = RateLimiter::new(false, 1, 60);
    limiter.record_failure(&ip()).await;
    assert!(limiter.violated(&ip()).await);
    let other: IpAddr = "10.0.0.7".parse().unwrap();
    assert!(!limiter.violated(&other).await);
  }
}
