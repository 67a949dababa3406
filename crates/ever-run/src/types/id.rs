use crate::Error;
use serde::{Deserialize, Serialize};

pub type Id = String;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default)]
pub struct RunId(Id);

/// Call-site identity of a step within a definition: the position of the
/// call during replay plus the step's declared name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, Default)]
pub struct StepId(usize, Id);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
pub struct TimerId(usize);

impl RunId {
  pub fn new(id: impl Into<String>) -> Self {
    RunId(id.into())
  }

  pub fn generate() -> Self {
    RunId(uuid::Uuid::new_v4().to_string())
  }

  pub fn inner(&self) -> Id {
    self.0.clone()
  }
}

impl StepId {
  pub fn new(call: usize, name: impl Into<String>) -> Self {
    StepId(call, name.into())
  }

  pub fn call(&self) -> usize {
    self.0
  }

  pub fn name(&self) -> Id {
    self.1.clone()
  }
}

impl TimerId {
  pub fn new(call: usize) -> Self {
    TimerId(call)
  }

  pub fn call(&self) -> usize {
    self.0
  }
}

impl ToString for RunId {
  fn to_string(&self) -> String {
    self.0.clone()
  }
}

impl ToString for StepId {
  fn to_string(&self) -> String {
    format!("{}/{}", self.0, self.1)
  }
}

impl ToString for TimerId {
  fn to_string(&self) -> String {
    format!("timer/{}", self.0)
  }
}

impl TryFrom<&str> for RunId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    if value.is_empty() {
      Err(Error::internal_runtime_error("RunId cannot be empty"))
    } else {
      Ok(RunId(value.to_string()))
    }
  }
}

impl TryFrom<&str> for StepId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    let parts: Vec<&str> = value.splitn(2, '/').collect();
    if parts.len() != 2 {
      Err(Error::internal_runtime_error(
        "StepId must be in the format of <call>/<name>",
      ))
    } else {
      let call = parts[0]
        .parse::<usize>()
        .map_err(|_| Error::internal_runtime_error("Step call number must be a number"))?;
      Ok(StepId(call, parts[1].to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_run_id() {
    let run_id = RunId::new("test");
    assert_eq!(run_id, RunId("test".to_string()));
    assert_eq!(run_id.inner(), "test".to_string());
  }

  #[test]
  fn test_generated_run_ids_are_unique() {
    assert_ne!(RunId::generate(), RunId::generate());
  }

  #[test]
  fn test_step_id() {
    let step_id = StepId::new(2, "fetch");
    assert_eq!(step_id, StepId(2, "fetch".to_string()));
    assert_eq!(step_id.call(), 2);
    assert_eq!(step_id.name(), "fetch".to_string());
  }

  #[test]
  fn test_step_id_to_string() {
    let step_id = StepId::new(2, "fetch");
    assert_eq!(step_id.to_string(), "2/fetch".to_string());
  }

  #[test]
  fn test_timer_id_to_string() {
    let timer_id = TimerId::new(4);
    assert_eq!(timer_id.to_string(), "timer/4".to_string());
    assert_eq!(timer_id.call(), 4);
  }

  #[test]
  fn test_run_id_try_from() {
    let run_id = RunId::try_from("test").unwrap();
    assert_eq!(run_id, RunId("test".to_string()));
  }

  #[test]
  fn test_run_id_try_from_empty() {
    assert!(RunId::try_from("").is_err());
  }

  #[test]
  fn test_step_id_try_from() {
    let step_id = StepId::try_from("2/fetch").unwrap();
    assert_eq!(step_id, StepId(2, "fetch".to_string()));
  }

  #[test]
  fn test_step_id_try_from_invalid() {
    assert!(StepId::try_from("fetch").is_err());
    assert!(StepId::try_from("x/fetch").is_err());
  }
}
