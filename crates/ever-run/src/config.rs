use std::time::Duration;

/// Engine-level knobs. Builder callers set these directly; deployments can
/// also drive them through `EVER_RUN_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  /// How often the reaper checks for due timers and expired progress.
  pub reaper_interval: Duration,
  /// Time-to-live of a progress token's entries.
  pub progress_ttl: Duration,
  /// Per-attempt step timeout; an expired attempt counts as a recoverable
  /// failure.
  pub step_timeout: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      reaper_interval: Duration::from_millis(50),
      progress_ttl: Duration::from_secs(15 * 60),
      step_timeout: Duration::from_secs(60 * 60),
    }
  }
}

impl EngineConfig {
  /// Reads `EVER_RUN_REAPER_INTERVAL`, `EVER_RUN_PROGRESS_TTL` and
  /// `EVER_RUN_STEP_TIMEOUT` (humantime syntax, e.g. `500ms`, `15m`).
  /// Unset or unparseable variables keep their defaults.
  pub fn from_env() -> Self {
    let mut config = Self::default();

    if let Some(value) = read_env_duration("EVER_RUN_REAPER_INTERVAL") {
      config.reaper_interval = value;
    }
    if let Some(value) = read_env_duration("EVER_RUN_PROGRESS_TTL") {
      config.progress_ttl = value;
    }
    if let Some(value) = read_env_duration("EVER_RUN_STEP_TIMEOUT") {
      config.step_timeout = value;
    }

    config
  }

  pub fn reaper_interval(mut self, reaper_interval: Duration) -> Self {
    self.reaper_interval = reaper_interval;
    self
  }

  pub fn progress_ttl(mut self, progress_ttl: Duration) -> Self {
    self.progress_ttl = progress_ttl;
    self
  }

  pub fn step_timeout(mut self, step_timeout: Duration) -> Self {
    self.step_timeout = step_timeout;
    self
  }
}

fn read_env_duration(key: &str) -> Option<Duration> {
  let raw = std::env::var(key).ok()?;

  match humantime::parse_duration(&raw) {
    Ok(value) => Some(value),
    Err(err) => {
      log::warn!("Ignoring {}={}: {}", key, raw, err);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.reaper_interval, Duration::from_millis(50));
    assert_eq!(config.progress_ttl, Duration::from_secs(900));
    assert_eq!(config.step_timeout, Duration::from_secs(3600));
  }

  #[test]
  fn test_builder_style_setters() {
    let config = EngineConfig::default()
      .reaper_interval(Duration::from_millis(10))
      .progress_ttl(Duration::from_secs(1))
      .step_timeout(Duration::from_secs(2));

    assert_eq!(config.reaper_interval, Duration::from_millis(10));
    assert_eq!(config.progress_ttl, Duration::from_secs(1));
    assert_eq!(config.step_timeout, Duration::from_secs(2));
  }

  #[test]
  fn test_from_env_ignores_garbage() {
    dotenv::dotenv().ok();

    std::env::set_var("EVER_RUN_REAPER_INTERVAL", "not-a-duration");
    let config = EngineConfig::from_env();
    std::env::remove_var("EVER_RUN_REAPER_INTERVAL");

    assert_eq!(config.reaper_interval, EngineConfig::default().reaper_interval);
  }
}
