use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryStrategy {
  Linear,
  Exponential,
}

/// Bounded, deterministic retry for idempotent sub-operations inside a step
/// (mount checks, transient reads). Never wrap a flash write in this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
  strategy: RetryStrategy,
  max_attempts: usize,
  base_delay: Duration,
  max_delay: Option<Duration>,
}

impl RetryPolicy {
  pub fn linear(max_attempts: usize, base_delay: Duration) -> Self {
    Self::new(RetryStrategy::Linear, max_attempts, base_delay)
  }

  pub fn exponential(max_attempts: usize, base_delay: Duration) -> Self {
    Self::new(RetryStrategy::Exponential, max_attempts, base_delay)
  }

  fn new(strategy: RetryStrategy, max_attempts: usize, base_delay: Duration) -> Self {
    Self {
      strategy,
      max_attempts: max_attempts.max(1),
      base_delay,
      max_delay: None,
    }
  }

  pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay = if max_delay.is_zero() { None } else { Some(max_delay) };
    self
  }

  pub fn max_attempts(&self) -> usize {
    self.max_attempts
  }

  /// Delay slept after failed attempt number `attempt` (1-based).
  pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
    if self.base_delay.is_zero() {
      return Duration::ZERO;
    }
    let raw = match self.strategy {
      RetryStrategy::Linear => self.base_delay.saturating_mul(attempt as u32),
      RetryStrategy::Exponential => {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay.saturating_mul(1u32 << shift)
      }
    };
    match self.max_delay {
      Some(max) => raw.min(max),
      None => raw,
    }
  }

  /// Runs `op` until it succeeds or `max_attempts` is reached, returning the last error.
  /// `op` receives the 1-based attempt number.
  pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
  where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    let mut attempt = 1;
    loop {
      match op(attempt).await {
        Ok(value) => return Ok(value),
        Err(e) if attempt >= self.max_attempts => return Err(e),
        Err(e) => {
          let delay = self.delay_for_attempt(attempt);
          log::debug!("attempt {}/{} failed: {}, retrying in {:?}", attempt, self.max_attempts, e, delay);
          if !delay.is_zero() {
            sleep(delay).await;
          }
          attempt += 1;
        }
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  #[test]
  fn linear_and_exponential_delays() {
    let linear = RetryPolicy::linear(3, Duration::from_secs(2));
    assert_eq!(linear.delay_for_attempt(1), Duration::from_secs(2));
    assert_eq!(linear.delay_for_attempt(2), Duration::from_secs(4));

    let exp = RetryPolicy::exponential(5, Duration::from_millis(100)).with_max_delay(Duration::from_millis(300));
    assert_eq!(exp.delay_for_attempt(1), Duration::from_millis(100));
    assert_eq!(exp.delay_for_attempt(2), Duration::from_millis(200));
    assert_eq!(exp.delay_for_attempt(3), Duration::from_millis(300));
  }

  #[test]
  fn at_least_one_attempt() {
    assert_eq!(RetryPolicy::linear(0, Duration::ZERO).max_attempts(), 1);
  }

  #[tokio::test]
  async fn stops_at_first_success() {
    let calls = Cell::new(0);
    let policy = RetryPolicy::linear(5, Duration::ZERO);
    let got: Result<usize, String> = policy.run(|attempt| {
      calls.set(calls.get() + 1);
      async move { if attempt < 3 { Err(format!("busy {attempt}")) } else { Ok(attempt) } }
    }).await;
    assert_eq!(got, Ok(3));
    assert_eq!(calls.get(), 3);
  }

  #[tokio::test]
  async fn gives_up_with_last_error() {
    let policy = RetryPolicy::linear(2, Duration::ZERO);
    let got: Result<(), String> = policy.run(|attempt| async move { Err(format!("fail {attempt}")) }).await;
    assert_eq!(got, Err("fail 2".to_string()));
  }

  #[tokio::test(start_paused = true)]
  async fn sleeps_between_attempts() {
    let started = tokio::time::Instant::now();
    let policy = RetryPolicy::linear(3, Duration::from_secs(1));
    let _: Result<(), String> = policy.run(|_| async { Err("nope".to_string()) }).await;
    // 1s after the first failure, 2s after the second, nothing after the last
    assert_eq!(started.elapsed(), Duration::from_secs(3));
  }
}
