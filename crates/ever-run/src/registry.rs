use crate::{Error, Result, RunId, RunSnapshot, RunStatus, Time};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// A single execution of a workflow definition. Mutated only by the
/// orchestrator; immutable once terminal.
#[derive(Debug, Clone)]
pub struct Run {
  pub id: RunId,
  pub workflow: String,
  pub input: Value,
  pub status: RunStatus,
  pub created_at: Time,
  pub completed_at: Option<Time>,
  pub output: Option<Value>,
  pub failure_reason: Option<String>,
}

impl Run {
  pub fn new(id: RunId, workflow: impl Into<String>, input: Value) -> Self {
    Run {
      id,
      workflow: workflow.into(),
      input,
      status: RunStatus::Pending,
      created_at: chrono::Utc::now(),
      completed_at: None,
      output: None,
      failure_reason: None,
    }
  }

  pub fn snapshot(&self) -> RunSnapshot {
    RunSnapshot {
      id: self.id.clone(),
      workflow: self.workflow.clone(),
      status: self.status.clone(),
      output: self.output.clone(),
      failure_reason: self.failure_reason.clone(),
      created_at: self.created_at,
      completed_at: self.completed_at,
    }
  }
}

struct RegistryState {
  runs: HashMap<RunId, Run>,
  tokens: HashMap<String, RunId>,
}

/// External-facing lookup of run state. Status is read from the current run
/// record, never recomputed from the log; it stays consistent with the log
/// because the orchestrator is the sole writer.
#[derive(Clone)]
pub struct RunRegistry(Arc<Mutex<RegistryState>>);

impl RunRegistry {
  pub fn new() -> Self {
    RunRegistry(Arc::new(Mutex::new(RegistryState {
      runs: HashMap::new(),
      tokens: HashMap::new(),
    })))
  }

  pub fn insert(&self, run: Run) {
    let mut state = self.0.lock();
    state.runs.entry(run.id.clone()).or_insert(run);
  }

  pub fn contains(&self, run_id: &RunId) -> bool {
    self.0.lock().runs.contains_key(run_id)
  }

  pub fn get(&self, run_id: &RunId) -> Result<Run> {
    self
      .0
      .lock()
      .runs
      .get(run_id)
      .cloned()
      .ok_or_else(|| Error::not_found(run_id.to_string()))
  }

  /// Resolves either a run identifier or a mapped correlation token.
  pub fn resolve(&self, key: &str) -> Result<RunId> {
    let state = self.0.lock();
    let run_id = RunId::new(key);

    if state.runs.contains_key(&run_id) {
      return Ok(run_id);
    }

    state
      .tokens
      .get(key)
      .cloned()
      .ok_or_else(|| Error::not_found(key))
  }

  pub fn snapshot(&self, key: &str) -> Result<RunSnapshot> {
    let run_id = self.resolve(key)?;
    Ok(self.get(&run_id)?.snapshot())
  }

  pub fn map_token(&self, token: impl Into<String>, run_id: RunId) {
    self.0.lock().tokens.insert(token.into(), run_id);
  }

  pub fn list(&self) -> Vec<RunId> {
    self.0.lock().runs.keys().cloned().collect()
  }

  pub fn set_status(&self, run_id: &RunId, status: RunStatus) -> Result<RunStatus> {
    let mut state = self.0.lock();
    let run = state
      .runs
      .get_mut(run_id)
      .ok_or_else(|| Error::not_found(run_id.to_string()))?;

    if run.status.is_terminal() {
      log::warn!(
        "Ignoring status update to {:?} for terminal run {}",
        status,
        run_id.to_string()
      );
      return Ok(run.status.clone());
    }

    run.status = status.clone();
    Ok(status)
  }

  pub fn complete(&self, run_id: &RunId, output: Value, completed_at: Time) -> Result<()> {
    let mut state = self.0.lock();
    let run = state
      .runs
      .get_mut(run_id)
      .ok_or_else(|| Error::not_found(run_id.to_string()))?;

    if run.status.is_terminal() {
      return Ok(());
    }

    run.status = RunStatus::Completed;
    run.output = Some(output);
    run.completed_at = Some(completed_at);

    Ok(())
  }

  pub fn fail(&self, run_id: &RunId, reason: impl Into<String>, completed_at: Time) -> Result<()> {
    let mut state = self.0.lock();
    let run = state
      .runs
      .get_mut(run_id)
      .ok_or_else(|| Error::not_found(run_id.to_string()))?;

    if run.status.is_terminal() {
      return Ok(());
    }

    run.status = RunStatus::Failed;
    run.failure_reason = Some(reason.into());
    run.completed_at = Some(completed_at);

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn registry_with_run(id: &str) -> RunRegistry {
    let registry = RunRegistry::new();
    registry.insert(Run::new(RunId::new(id), "order", json!({})));
    registry
  }

  #[test]
  fn test_get_unknown_run() {
    let registry = RunRegistry::new();
    let err = registry.get(&RunId::new("missing")).unwrap_err();
    assert_eq!(err, Error::not_found("missing"));
  }

  #[test]
  fn test_snapshot_by_run_id() {
    let registry = registry_with_run("run");
    let snapshot = registry.snapshot("run").unwrap();

    assert_eq!(snapshot.id, RunId::new("run"));
    assert_eq!(snapshot.status, RunStatus::Pending);
    assert_eq!(snapshot.output, None);
  }

  #[test]
  fn test_snapshot_by_token() {
    let registry = registry_with_run("run");
    registry.map_token("client-token", RunId::new("run"));

    let snapshot = registry.snapshot("client-token").unwrap();
    assert_eq!(snapshot.id, RunId::new("run"));
  }

  #[test]
  fn test_terminal_runs_are_immutable() {
    let registry = registry_with_run("run");
    let run_id = RunId::new("run");
    let now = chrono::Utc::now();

    registry.complete(&run_id, json!("output"), now).unwrap();

    registry.set_status(&run_id, RunStatus::Running).unwrap();
    registry.fail(&run_id, "too late", now).unwrap();

    let run = registry.get(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output, Some(json!("output")));
    assert_eq!(run.failure_reason, None);
  }

  #[test]
  fn test_insert_does_not_replace() {
    let registry = registry_with_run("run");
    let run_id = RunId::new("run");
    registry
      .complete(&run_id, json!("output"), chrono::Utc::now())
      .unwrap();

    registry.insert(Run::new(run_id.clone(), "order", json!({})));

    assert_eq!(registry.get(&run_id).unwrap().status, RunStatus::Completed);
  }

  #[test]
  fn test_list() {
    let registry = registry_with_run("run");
    assert_eq!(registry.list(), vec![RunId::new("run")]);
  }
}
