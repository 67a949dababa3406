use crate::Time;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgressEntry {
  pub step_index: usize,
  pub total_steps: usize,
  pub message: String,
  pub timestamp: Time,
}

impl ProgressEntry {
  pub fn new(step_index: usize, total_steps: usize, message: impl Into<String>) -> Self {
    ProgressEntry {
      step_index,
      total_steps,
      message: message.into(),
      timestamp: chrono::Utc::now(),
    }
  }
}

struct TokenRecords {
  entries: Vec<ProgressEntry>,
  expires_at: Time,
}

/// Best-effort progress side-channel, decoupled from the event log.
///
/// Entries are ordered per token and the whole sequence expires after the
/// time-to-live. Losing or clearing everything here never changes a run's
/// outcome; this exists only so UIs have something to show between polls.
#[derive(Clone)]
pub struct ProgressTracker {
  records: Arc<Mutex<HashMap<String, TokenRecords>>>,
  ttl: Duration,
}

impl ProgressTracker {
  pub fn new(ttl: Duration) -> Self {
    ProgressTracker {
      records: Arc::new(Mutex::new(HashMap::new())),
      ttl,
    }
  }

  pub fn record(&self, token: impl Into<String>, entry: ProgressEntry) {
    let token = token.into();
    let expires_at = chrono::Utc::now()
      + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(365));

    let mut records = self.records.lock();
    let record = records.entry(token).or_insert_with(|| TokenRecords {
      entries: Vec::new(),
      expires_at,
    });

    record.entries.push(entry);
    record.expires_at = expires_at;
  }

  pub fn fetch(&self, token: &str) -> Vec<ProgressEntry> {
    let now = chrono::Utc::now();
    let mut records = self.records.lock();

    match records.get(token) {
      Some(record) if record.expires_at > now => record.entries.clone(),
      Some(_) => {
        records.remove(token);
        Vec::new()
      }
      None => Vec::new(),
    }
  }

  pub fn clear(&self, token: &str) {
    self.records.lock().remove(token);
  }

  /// Re-keys entries recorded under a client-issued correlation token onto
  /// the real run identifier once it exists.
  pub fn rekey(&self, token: &str, run_key: &str) {
    if token == run_key {
      return;
    }

    let mut records = self.records.lock();
    if let Some(early) = records.remove(token) {
      let record = records
        .entry(run_key.to_string())
        .or_insert_with(|| TokenRecords {
          entries: Vec::new(),
          expires_at: early.expires_at,
        });

      let mut entries = early.entries;
      entries.append(&mut record.entries);
      record.entries = entries;
      record.expires_at = record.expires_at.max(early.expires_at);
    }
  }

  /// Drops every expired sequence. Called periodically by the reaper.
  pub fn sweep(&self, now: Time) {
    self
      .records
      .lock()
      .retain(|_, record| record.expires_at > now);
  }

  pub fn size(&self) -> usize {
    self.records.lock().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_record_and_fetch_in_order() {
    let tracker = ProgressTracker::new(Duration::from_secs(60));

    tracker.record("token", ProgressEntry::new(0, 3, "starting"));
    tracker.record("token", ProgressEntry::new(1, 3, "halfway"));

    let entries = tracker.fetch("token");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "starting");
    assert_eq!(entries[1].message, "halfway");
  }

  #[test]
  fn test_fetch_unknown_token() {
    let tracker = ProgressTracker::new(Duration::from_secs(60));
    assert!(tracker.fetch("missing").is_empty());
  }

  #[test]
  fn test_clear() {
    let tracker = ProgressTracker::new(Duration::from_secs(60));

    tracker.record("token", ProgressEntry::new(0, 1, "starting"));
    tracker.clear("token");

    assert!(tracker.fetch("token").is_empty());
  }

  #[test]
  fn test_expiry() {
    let tracker = ProgressTracker::new(Duration::ZERO);

    tracker.record("token", ProgressEntry::new(0, 1, "starting"));

    assert!(tracker.fetch("token").is_empty());
    assert_eq!(tracker.size(), 0);
  }

  #[test]
  fn test_sweep_removes_expired_sequences() {
    let tracker = ProgressTracker::new(Duration::ZERO);

    tracker.record("token", ProgressEntry::new(0, 1, "starting"));
    assert_eq!(tracker.size(), 1);

    tracker.sweep(chrono::Utc::now());
    assert_eq!(tracker.size(), 0);
  }

  #[test]
  fn test_rekey_preserves_order() {
    let tracker = ProgressTracker::new(Duration::from_secs(60));

    tracker.record("early-token", ProgressEntry::new(0, 2, "queued"));
    tracker.record("run-1", ProgressEntry::new(1, 2, "working"));
    tracker.rekey("early-token", "run-1");

    let entries = tracker.fetch("run-1");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "queued");
    assert_eq!(entries[1].message, "working");
    assert!(tracker.fetch("early-token").is_empty());
  }
}
