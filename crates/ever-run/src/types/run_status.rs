use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Sleeping,
  Completed,
  Failed,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, RunStatus::Completed | RunStatus::Failed)
  }

  pub fn is_running(&self) -> bool {
    matches!(self, RunStatus::Running)
  }

  pub fn is_sleeping(&self) -> bool {
    matches!(self, RunStatus::Sleeping)
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, RunStatus::Pending)
  }
}
