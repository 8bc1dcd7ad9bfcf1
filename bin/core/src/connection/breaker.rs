use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

/// Three-state failure guard for one host. The lock only covers
/// state bookkeeping, never daemon I/O.
#[derive(Debug)]
pub struct Breaker {
  failure_threshold: u32,
  cooldown: Duration,
  inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
  state: BreakerState,
  consecutive_failures: u32,
  opened_at: Option<Instant>,
  /// Set while the single half-open probe is in flight.
  probe_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
  Closed,
  Open,
  HalfOpen,
}

impl Breaker {
  pub fn new(failure_threshold: u32, cooldown: Duration) -> Breaker {
    Breaker {
      failure_threshold,
      cooldown,
      inner: Mutex::new(Inner {
        state: BreakerState::Closed,
        consecutive_failures: 0,
        opened_at: None,
        probe_in_flight: false,
      }),
    }
  }

  pub fn from_config() -> Breaker {
    let config = crate::config::core_config();
    Breaker::new(
      config.breaker_failure_threshold,
      Duration::from_secs(config.breaker_cooldown_seconds),
    )
  }

  /// Whether a guarded call may proceed. While Open this fails
  /// fast; after the cooldown exactly one half-open probe is
  /// admitted until its outcome is recorded.
  pub fn try_acquire(&self) -> bool {
    let mut inner = self.inner.lock().unwrap();
    match inner.state {
      BreakerState::Closed => true,
      BreakerState::Open => {
        let elapsed = inner
          .opened_at
          .map(|opened_at| opened_at.elapsed())
          .unwrap_or_default();
        if elapsed >= self.cooldown {
          inner.state = BreakerState::HalfOpen;
          inner.probe_in_flight = true;
          true
        } else {
          false
        }
      }
      BreakerState::HalfOpen => {
        if inner.probe_in_flight {
          false
        } else {
          inner.probe_in_flight = true;
          true
        }
      }
    }
  }

  pub fn record_success(&self) {
    let mut inner = self.inner.lock().unwrap();
    inner.state = BreakerState::Closed;
    inner.consecutive_failures = 0;
    inner.opened_at = None;
    inner.probe_in_flight = false;
  }

  pub fn record_failure(&self) {
    let mut inner = self.inner.lock().unwrap();
    match inner.state {
      BreakerState::Closed => {
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
          inner.state = BreakerState::Open;
          inner.opened_at = Some(Instant::now());
        }
      }
      BreakerState::HalfOpen => {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
      }
      BreakerState::Open => {}
    }
  }

  /// Give up an admitted half-open probe without recording an
  /// outcome. The next caller becomes the probe instead.
  pub fn release_probe(&self) {
    self.inner.lock().unwrap().probe_in_flight = false;
  }

  pub fn force_reset(&self) {
    self.record_success()
  }

  pub fn state(&self) -> BreakerState {
    self.inner.lock().unwrap().state
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn breaker() -> Breaker {
    Breaker::new(5, Duration::from_secs(30))
  }

  #[tokio::test(start_paused = true)]
  async fn opens_after_threshold_failures() {
    let breaker = breaker();
    for _ in 0..4 {
      assert!(breaker.try_acquire());
      breaker.record_failure();
      assert_eq!(breaker.state(), BreakerState::Closed);
    }
    assert!(breaker.try_acquire());
    breaker.record_failure();
    assert_eq!(breaker.state(), BreakerState::Open);
    // Fast fail without touching the daemon
    assert!(!breaker.try_acquire());
  }

  #[tokio::test(start_paused = true)]
  async fn success_resets_the_failure_count() {
    let breaker = breaker();
    for _ in 0..4 {
      breaker.record_failure();
    }
    breaker.record_success();
    for _ in 0..4 {
      breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Closed);
  }

  #[tokio::test(start_paused = true)]
  async fn half_open_admits_exactly_one_probe() {
    let breaker = breaker();
    for _ in 0..5 {
      breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;

    // First caller becomes the probe, second fails fast.
    assert!(breaker.try_acquire());
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    assert!(!breaker.try_acquire());

    breaker.record_success();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert!(breaker.try_acquire());
  }

  #[tokio::test(start_paused = true)]
  async fn half_open_failure_reopens() {
    let breaker = breaker();
    for _ in 0..5 {
      breaker.record_failure();
    }
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(breaker.try_acquire());
    breaker.record_failure();
    assert_eq!(breaker.state(), BreakerState::Open);
    assert!(!breaker.try_acquire());
    // And the cooldown starts over
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(breaker.try_acquire());
  }

  #[tokio::test(start_paused = true)]
  async fn force_reset_closes_immediately() {
    let breaker = breaker();
    for _ in 0..5 {
      breaker.record_failure();
    }
    assert!(!breaker.try_acquire());
    breaker.force_reset();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert!(breaker.try_acquire());
  }
}
