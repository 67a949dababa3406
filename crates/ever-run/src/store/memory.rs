use super::LogStore;
use crate::{Event, Result, RunId, SequencedEvent};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

/// In-memory log store. Nothing survives the process, so it is only suitable
/// for tests and ephemeral runs.
#[derive(Clone)]
pub struct MemoryLogStore {
  runs: Arc<Mutex<HashMap<RunId, Vec<SequencedEvent>>>>,
}

impl MemoryLogStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Default for MemoryLogStore {
  fn default() -> Self {
    MemoryLogStore {
      runs: Arc::new(Mutex::new(HashMap::new())),
    }
  }
}

#[async_trait::async_trait]
impl LogStore for MemoryLogStore {
  async fn append(&self, run_id: &RunId, event: Event) -> Result<u64> {
    let mut runs = self.runs.lock();
    let events = runs.entry(run_id.clone()).or_default();
    let sequence = events.len() as u64 + 1;

    events.push(SequencedEvent {
      sequence,
      recorded_at: chrono::Utc::now(),
      event,
    });

    Ok(sequence)
  }

  async fn read_all(&self, run_id: &RunId) -> Result<Vec<SequencedEvent>> {
    Ok(self.runs.lock().get(run_id).cloned().unwrap_or_default())
  }

  async fn exists(&self, run_id: &RunId) -> Result<bool> {
    Ok(self.runs.lock().contains_key(run_id))
  }
}
