use crate::{RunId, RunStatus, Time};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The externally observable state of a run, as returned by the registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunSnapshot {
  pub id: RunId,
  pub workflow: String,
  pub status: RunStatus,
  pub output: Option<Value>,
  pub failure_reason: Option<String>,
  pub created_at: Time,
  pub completed_at: Option<Time>,
}

impl RunSnapshot {
  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }
}
