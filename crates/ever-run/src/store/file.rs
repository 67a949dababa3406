use super::LogStore;
use crate::{Error, Event, Result, RunId, SequencedEvent};
use parking_lot::Mutex;
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};
use tokio::io::AsyncWriteExt;

/// Durable log store backed by one append-only JSON-lines file per run.
///
/// An append is acknowledged only after `sync_all`, so an observed sequence
/// number survives a crash. The per-run lock also carries the next sequence
/// number, which keeps appends within a run strictly ordered while runs
/// never contend with each other.
pub struct FileLogStore {
  root: PathBuf,
  runs: Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<Option<u64>>>>>,
}

impl FileLogStore {
  pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
    let root = root.into();

    tokio::fs::create_dir_all(&root)
      .await
      .map_err(Error::storage_unavailable)?;

    Ok(FileLogStore {
      root,
      runs: Mutex::new(HashMap::new()),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn run_path(&self, run_id: &RunId) -> PathBuf {
    self.root.join(format!("{}.log", run_id.to_string()))
  }

  fn run_lock(&self, run_id: &RunId) -> Arc<tokio::sync::Mutex<Option<u64>>> {
    self
      .runs
      .lock()
      .entry(run_id.clone())
      .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
      .clone()
  }

  async fn load_events(&self, run_id: &RunId) -> Result<Vec<SequencedEvent>> {
    let contents = match tokio::fs::read_to_string(self.run_path(run_id)).await {
      Ok(contents) => contents,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(err) => return Err(Error::storage_unavailable(err)),
    };

    let mut events = Vec::new();
    for line in contents.lines() {
      if line.is_empty() {
        continue;
      }

      let event: SequencedEvent = serde_json::from_str(line).map_err(|err| {
        Error::storage_unavailable(format!("corrupt record in run {}: {}", run_id.to_string(), err))
      })?;
      events.push(event);
    }

    Ok(events)
  }
}

#[async_trait::async_trait]
impl LogStore for FileLogStore {
  async fn append(&self, run_id: &RunId, event: Event) -> Result<u64> {
    let lock = self.run_lock(run_id);
    let mut next = lock.lock().await;

    if next.is_none() {
      // First touch of this run since startup: recover the sequence counter
      // from whatever is already on disk.
      *next = Some(self.load_events(run_id).await?.len() as u64);
    }

    let sequence = next.unwrap() + 1;
    let record = SequencedEvent {
      sequence,
      recorded_at: chrono::Utc::now(),
      event,
    };

    let mut line = serde_json::to_string(&record)
      .map_err(|err| Error::internal_runtime_error(format!("unserializable event: {}", err)))?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.run_path(run_id))
      .await
      .map_err(Error::storage_unavailable)?;

    file
      .write_all(line.as_bytes())
      .await
      .map_err(Error::storage_unavailable)?;
    file.sync_all().await.map_err(Error::storage_unavailable)?;

    *next = Some(sequence);

    Ok(sequence)
  }

  async fn read_all(&self, run_id: &RunId) -> Result<Vec<SequencedEvent>> {
    let lock = self.run_lock(run_id);
    let _guard = lock.lock().await;

    self.load_events(run_id).await
  }

  async fn exists(&self, run_id: &RunId) -> Result<bool> {
    match tokio::fs::metadata(self.run_path(run_id)).await {
      Ok(_) => Ok(true),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(err) => Err(Error::storage_unavailable(err)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[ever_run_test::test]
  async fn test_append_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLogStore::new(dir.path()).await.unwrap();
    let run_id = RunId::new("run");

    let first = store
      .append(
        &run_id,
        Event::RunSubmitted {
          workflow: "order".to_string(),
          input: json!({ "id": 7 }),
        },
      )
      .await
      .unwrap();
    let second = store
      .append(
        &run_id,
        Event::RunCompleted {
          output: json!("done"),
        },
      )
      .await
      .unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 2);

    let events = store.read_all(&run_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
      events[0].event,
      Event::RunSubmitted {
        workflow: "order".to_string(),
        input: json!({ "id": 7 }),
      }
    );
    assert_eq!(events[1].sequence, 2);
  }

  #[ever_run_test::test]
  async fn test_sequence_recovers_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let run_id = RunId::new("run");

    {
      let store = FileLogStore::new(dir.path()).await.unwrap();
      store
        .append(
          &run_id,
          Event::RunFailed {
            reason: "first".to_string(),
          },
        )
        .await
        .unwrap();
    }

    let store = FileLogStore::new(dir.path()).await.unwrap();
    let sequence = store
      .append(
        &run_id,
        Event::RunFailed {
          reason: "second".to_string(),
        },
      )
      .await
      .unwrap();

    assert_eq!(sequence, 2);
    assert_eq!(store.read_all(&run_id).await.unwrap().len(), 2);
  }

  #[ever_run_test::test]
  async fn test_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLogStore::new(dir.path()).await.unwrap();
    let run_id = RunId::new("run");

    assert!(!store.exists(&run_id).await.unwrap());

    store
      .append(
        &run_id,
        Event::RunFailed {
          reason: "oops".to_string(),
        },
      )
      .await
      .unwrap();

    assert!(store.exists(&run_id).await.unwrap());
  }

  #[ever_run_test::test]
  async fn test_corrupt_record_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileLogStore::new(dir.path()).await.unwrap();
    let run_id = RunId::new("run");

    tokio::fs::write(store.run_path(&run_id), "not json\n")
      .await
      .unwrap();

    let err = store.read_all(&run_id).await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
  }
}
