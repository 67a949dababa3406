mod file;
mod memory;

pub use file::FileLogStore;
pub use memory::MemoryLogStore;

use crate::{Error, Event, PluginManager, Result, RunId, SequencedEvent};
use std::sync::Arc;
use std::time::Duration;

/// Append-only persisted record of run events.
///
/// `append` must be atomic and durable before returning: a caller that
/// observes a sequence number can rely on the event surviving a crash.
/// Appends for different runs must not block each other; appends within one
/// run are strictly ordered.
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
  async fn append(&self, run_id: &RunId, event: Event) -> Result<u64>;

  async fn read_all(&self, run_id: &RunId) -> Result<Vec<SequencedEvent>>;

  async fn exists(&self, run_id: &RunId) -> Result<bool>;
}

const APPEND_ATTEMPTS: u32 = 3;
const APPEND_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Durable append plus observer fan-out. `StorageUnavailable` on append is
/// retryable, so writes go through a short retry loop before giving up;
/// reads propagate immediately (a run cannot make progress without its log).
#[derive(Clone)]
pub(crate) struct Recorder {
  store: Arc<dyn LogStore>,
  plugins: PluginManager,
}

impl Recorder {
  pub fn new(store: Arc<dyn LogStore>, plugins: PluginManager) -> Self {
    Recorder { store, plugins }
  }

  pub fn store(&self) -> Arc<dyn LogStore> {
    self.store.clone()
  }

  pub fn plugins(&self) -> PluginManager {
    self.plugins.clone()
  }

  pub async fn record(&self, run_id: &RunId, event: Event) -> Result<SequencedEvent> {
    let mut attempt = 1;
    let sequence = loop {
      match self.store.append(run_id, event.clone()).await {
        Ok(sequence) => break sequence,
        Err(Error::StorageUnavailable(message)) if attempt < APPEND_ATTEMPTS => {
          log::warn!(
            "Append to run {} failed ({}), retrying {}/{}",
            run_id.to_string(),
            message,
            attempt,
            APPEND_ATTEMPTS
          );
          tokio::time::sleep(APPEND_RETRY_DELAY).await;
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    };

    let sequenced = SequencedEvent {
      sequence,
      recorded_at: chrono::Utc::now(),
      event,
    };

    self.plugins.on_event(run_id.clone(), sequenced.clone());

    Ok(sequenced)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;

  struct FlakyStore {
    failures: Mutex<u32>,
    inner: MemoryLogStore,
  }

  #[async_trait::async_trait]
  impl LogStore for FlakyStore {
    async fn append(&self, run_id: &RunId, event: Event) -> Result<u64> {
      let should_fail = {
        let mut failures = self.failures.lock();
        if *failures > 0 {
          *failures -= 1;
          true
        } else {
          false
        }
      };
      if should_fail {
        return Err(Error::storage_unavailable("disk on fire"));
      }

      self.inner.append(run_id, event).await
    }

    async fn read_all(&self, run_id: &RunId) -> Result<Vec<SequencedEvent>> {
      self.inner.read_all(run_id).await
    }

    async fn exists(&self, run_id: &RunId) -> Result<bool> {
      self.inner.exists(run_id).await
    }
  }

  #[ever_run_test::test]
  async fn test_record_retries_transient_append_failures() {
    let store = Arc::new(FlakyStore {
      failures: Mutex::new(2),
      inner: MemoryLogStore::new(),
    });
    let recorder = Recorder::new(store.clone(), PluginManager::new());
    let run_id = RunId::new("run");

    let sequenced = recorder
      .record(
        &run_id,
        Event::RunFailed {
          reason: "oops".to_string(),
        },
      )
      .await
      .unwrap();

    assert_eq!(sequenced.sequence, 1);
    assert_eq!(store.read_all(&run_id).await.unwrap().len(), 1);
  }

  #[ever_run_test::test]
  async fn test_record_gives_up_after_retries() {
    let store = Arc::new(FlakyStore {
      failures: Mutex::new(10),
      inner: MemoryLogStore::new(),
    });
    let recorder = Recorder::new(store, PluginManager::new());
    let run_id = RunId::new("run");

    let err = recorder
      .record(
        &run_id,
        Event::RunFailed {
          reason: "oops".to_string(),
        },
      )
      .await
      .unwrap_err();

    assert_eq!(err, Error::storage_unavailable("disk on fire"));
  }
}
