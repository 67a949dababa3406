use crate::{RunId, StepId};
use std::{
  collections::hash_map::DefaultHasher,
  hash::{Hash, Hasher},
  time::Duration,
};

/// Backoff schedule for recoverable step failures: exponential in the
/// attempt number, capped, with a small hash-derived jitter so concurrent
/// runs retrying the same step spread out. The schedule is monotonically
/// non-decreasing because the jitter is folded in before the cap applies.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32) -> Self {
    RetryPolicy {
      max_attempts,
      ..Default::default()
    }
  }

  pub fn base_delay(mut self, base_delay: Duration) -> Self {
    self.base_delay = base_delay;
    self
  }

  pub fn max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay = max_delay;
    self
  }

  /// Delay before the next attempt, given that `attempt` just failed.
  pub fn delay_for(&self, run_id: &RunId, step_id: &StepId, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let exponent = attempt.min(16) - 1;
    let base = self.base_delay.as_millis() as u64;
    let exponential = base.saturating_mul(1u64 << exponent);

    // Up to 25% of the exponential term, derived from the call site so the
    // schedule is stable for a given (run, step, attempt).
    let mut hasher = DefaultHasher::new();
    run_id.hash(&mut hasher);
    step_id.hash(&mut hasher);
    attempt.hash(&mut hasher);
    let jitter = if exponential == 0 {
      0
    } else {
      hasher.finish() % (exponential / 4).max(1)
    };

    let capped = exponential
      .saturating_add(jitter)
      .min(self.max_delay.as_millis() as u64);

    Duration::from_millis(capped)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy() -> RetryPolicy {
    RetryPolicy::new(5)
      .base_delay(Duration::from_millis(100))
      .max_delay(Duration::from_secs(5))
  }

  #[test]
  fn test_delays_are_monotonically_non_decreasing() {
    let policy = policy();
    let run_id = RunId::new("run");
    let step_id = StepId::new(0, "step");

    let mut previous = Duration::ZERO;
    for attempt in 1..=12 {
      let delay = policy.delay_for(&run_id, &step_id, attempt);
      assert!(
        delay >= previous,
        "attempt {} produced {:?} < {:?}",
        attempt,
        delay,
        previous
      );
      previous = delay;
    }
  }

  #[test]
  fn test_delays_are_bounded_by_cap() {
    let policy = policy();
    let run_id = RunId::new("run");
    let step_id = StepId::new(0, "step");

    for attempt in 1..=32 {
      assert!(policy.delay_for(&run_id, &step_id, attempt) <= policy.max_delay);
    }
  }

  #[test]
  fn test_first_delay_starts_at_base() {
    let policy = policy();
    let delay = policy.delay_for(&RunId::new("run"), &StepId::new(0, "step"), 1);

    assert!(delay >= policy.base_delay);
    assert!(delay < policy.base_delay * 2);
  }

  #[test]
  fn test_jitter_is_stable_per_call_site() {
    let policy = policy();
    let run_id = RunId::new("run");
    let step_id = StepId::new(0, "step");

    assert_eq!(
      policy.delay_for(&run_id, &step_id, 2),
      policy.delay_for(&run_id, &step_id, 2)
    );
  }
}
