//! Connection liveness and reconnect timing.
//!
//! [`KeepAlive`] is a plain state machine driven by the caller's clock,
//! it does not depend on any async runtime.

use rand::Rng;
use std::time::{Duration, Instant};

/// Default connection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reconnect backoff configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
  /// The maximum number of reconnect attempts to make.
  pub max_tries: Option<u64>,

  /// Before attempting the first reconnect, the client will wait this long.
  pub initial_delay: Duration,

  /// After each failed reconnect attempt, the delay will be multiplied by this value.
  pub delay_multiplier: u32,

  /// The maximum delay to wait inbetween connection attempts.
  pub max_delay: Duration,
}

/// The default reconnect backoff.
pub const DEFAULT_BACKOFF: Backoff = Backoff {
  max_tries: Some(8),
  initial_delay: Duration::from_secs(1),
  delay_multiplier: 3,
  max_delay: Duration::from_secs(12),
};

impl Default for Backoff {
  fn default() -> Self {
    DEFAULT_BACKOFF
  }
}

impl Backoff {
  /// The delay before each reconnect attempt.
  ///
  /// The iterator ends once `max_tries` attempts have been made.
  pub fn delays(&self) -> impl Iterator<Item = Duration> {
    let Backoff {
      max_tries,
      initial_delay,
      delay_multiplier,
      max_delay,
    } = *self;
    let tries = max_tries.map_or(usize::MAX, |tries| tries as usize);
    std::iter::successors(Some(initial_delay.min(max_delay)), move |delay| {
      Some(delay.saturating_mul(delay_multiplier).min(max_delay))
    })
    .take(tries)
  }
}

/// Keep-alive timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepAliveConfig {
  /// Time between a pong and the next ping.
  pub ping_interval: Duration,

  /// The interval is randomized by up to this much in either direction,
  /// so that many connections don't ping in lockstep.
  pub ping_jitter: Duration,

  /// The connection is dead if no pong arrives within this long after a ping.
  pub pong_timeout: Duration,
}

/// Default keep-alive timing for the pub/sub feed.
pub const DEFAULT_KEEPALIVE: KeepAliveConfig = KeepAliveConfig {
  ping_interval: Duration::from_secs(120),
  ping_jitter: Duration::from_secs(30),
  pong_timeout: Duration::from_secs(15),
};

impl Default for KeepAliveConfig {
  fn default() -> Self {
    DEFAULT_KEEPALIVE
  }
}

impl KeepAliveConfig {
  fn next_interval(&self, rng: &mut impl Rng) -> Duration {
    let jitter = self.ping_jitter.min(self.ping_interval).as_millis() as u64;
    if jitter == 0 {
      return self.ping_interval;
    }
    let offset = rng.gen_range(0..=jitter * 2);
    self.ping_interval - Duration::from_millis(jitter) + Duration::from_millis(offset)
  }
}

/// What the connection should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepAliveAction {
  /// Nothing to do until [`KeepAlive::next_deadline`].
  Idle,
  /// Send a ping now.
  SendPing,
  /// The pong deadline has passed.
  Dead,
}

/// Ping/pong liveness state for one connection.
#[derive(Clone, Debug)]
pub struct KeepAlive {
  config: KeepAliveConfig,
  ping_due_at: Instant,
  pong_due_at: Option<Instant>,
  pong_received: bool,
}

impl KeepAlive {
  pub fn new(config: KeepAliveConfig, now: Instant) -> Self {
    Self {
      ping_due_at: now + config.next_interval(&mut rand::thread_rng()),
      pong_due_at: None,
      pong_received: true,
      config,
    }
  }

  /// Start over, for a fresh connection.
  pub fn reset(&mut self, now: Instant) {
    *self = Self::new(self.config, now);
  }

  /// The next instant at which [`KeepAlive::poll`] may return something other than [`KeepAliveAction::Idle`].
  pub fn next_deadline(&self) -> Instant {
    self.pong_due_at.unwrap_or(self.ping_due_at)
  }

  /// Whether the last ping was answered.
  pub fn pong_received(&self) -> bool {
    self.pong_received
  }

  pub fn poll(&mut self, now: Instant) -> KeepAliveAction {
    if let Some(pong_due_at) = self.pong_due_at {
      if now >= pong_due_at {
        return KeepAliveAction::Dead;
      }
      return KeepAliveAction::Idle;
    }

    if now >= self.ping_due_at {
      self.pong_due_at = Some(now + self.config.pong_timeout);
      self.pong_received = false;
      return KeepAliveAction::SendPing;
    }

    KeepAliveAction::Idle
  }

  /// Any pong cancels the pong deadline and restarts the ping timer.
  pub fn on_pong(&mut self, now: Instant) {
    self.on_pong_with(now, &mut rand::thread_rng())
  }

  pub fn on_pong_with(&mut self, now: Instant, rng: &mut impl Rng) {
    self.pong_due_at = None;
    self.pong_received = true;
    self.ping_due_at = now + self.config.next_interval(rng);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const FIXED: KeepAliveConfig = KeepAliveConfig {
    ping_interval: Duration::from_secs(60),
    ping_jitter: Duration::ZERO,
    pong_timeout: Duration::from_secs(10),
  };

  #[test]
  fn ping_then_pong() {
    let start = Instant::now();
    let mut keepalive = KeepAlive::new(FIXED, start);
    assert_eq!(keepalive.next_deadline(), start + Duration::from_secs(60));
    assert_eq!(keepalive.poll(start + Duration::from_secs(59)), KeepAliveAction::Idle);

    let ping_at = start + Duration::from_secs(60);
    assert_eq!(keepalive.poll(ping_at), KeepAliveAction::SendPing);
    assert!(!keepalive.pong_received());
    assert_eq!(keepalive.next_deadline(), ping_at + Duration::from_secs(10));
    // only one ping per interval
    assert_eq!(keepalive.poll(ping_at), KeepAliveAction::Idle);

    let pong_at = ping_at + Duration::from_secs(3);
    keepalive.on_pong(pong_at);
    assert!(keepalive.pong_received());
    assert_eq!(keepalive.next_deadline(), pong_at + Duration::from_secs(60));
    assert_eq!(keepalive.poll(ping_at + Duration::from_secs(11)), KeepAliveAction::Idle);
  }

  #[test]
  fn missing_pong_is_dead() {
    let start = Instant::now();
    let mut keepalive = KeepAlive::new(FIXED, start);
    let ping_at = start + Duration::from_secs(60);
    assert_eq!(keepalive.poll(ping_at), KeepAliveAction::SendPing);
    assert_eq!(
      keepalive.poll(ping_at + Duration::from_secs(10)),
      KeepAliveAction::Dead
    );
    assert_eq!(
      keepalive.poll(ping_at + Duration::from_secs(20)),
      KeepAliveAction::Dead
    );

    let reconnected_at = ping_at + Duration::from_secs(25);
    keepalive.reset(reconnected_at);
    assert!(keepalive.pong_received());
    assert_eq!(keepalive.poll(reconnected_at), KeepAliveAction::Idle);
  }

  #[test]
  fn jitter_stays_in_bounds() {
    let start = Instant::now();
    let mut keepalive = KeepAlive::new(DEFAULT_KEEPALIVE, start);
    for _ in 0..100 {
      keepalive.on_pong(start);
      let interval = keepalive.next_deadline() - start;
      assert!(interval >= Duration::from_secs(90), "{interval:?}");
      assert!(interval <= Duration::from_secs(150), "{interval:?}");
    }
  }

  #[test]
  fn backoff_delays() {
    let delays = DEFAULT_BACKOFF.delays().collect::<Vec<_>>();
    assert_eq!(
      delays,
      [1, 3, 9, 12, 12, 12, 12, 12].map(Duration::from_secs)
    );

    let unbounded = Backoff {
      max_tries: None,
      ..DEFAULT_BACKOFF
    };
    assert_eq!(unbounded.delays().nth(100), Some(Duration::from_secs(12)));
  }

  #[test]
  fn backoff_without_upper_bound() {
    let backoff = Backoff {
      max_tries: None,
      initial_delay: Duration::from_secs(1),
      delay_multiplier: u32::MAX,
      max_delay: Duration::MAX,
    };
    let delays = backoff.delays().take(4).collect::<Vec<_>>();
    assert_eq!(delays[1], Duration::from_secs(u32::MAX as u64));
    assert_eq!(delays[3], Duration::MAX);
  }
}
