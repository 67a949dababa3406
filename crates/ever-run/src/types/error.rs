use crate::Time;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("Invalid input: {0}")]
  Validation(String),

  #[error("Step failed: {0}")]
  RecoverableStep(String),

  #[error("Step failed fatally: {0}")]
  FatalStep(String),

  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Not found: {0}")]
  NotFound(String),

  // Control flow only: the definition is waiting on a durable timer and the
  // run must leave the active-execution set. Never surfaced to callers.
  #[error("Run suspended until {0}")]
  Suspended(Time),

  #[error("Error while running workflow: {0}")]
  InternalRuntimeError(String),
}

impl Error {
  pub fn validation<T: ToString>(message: T) -> Self {
    Self::Validation(message.to_string())
  }

  pub fn recoverable_step<T: ToString>(message: T) -> Self {
    Self::RecoverableStep(message.to_string())
  }

  pub fn fatal_step<T: ToString>(message: T) -> Self {
    Self::FatalStep(message.to_string())
  }

  pub fn storage_unavailable<T: ToString>(message: T) -> Self {
    Self::StorageUnavailable(message.to_string())
  }

  pub fn not_found<T: ToString>(key: T) -> Self {
    Self::NotFound(key.to_string())
  }

  pub fn internal_runtime_error<T: ToString>(message: T) -> Self {
    Self::InternalRuntimeError(message.to_string())
  }

  pub fn is_suspension(&self) -> bool {
    matches!(self, Self::Suspended(_))
  }
}

// implement Eq and PartialEq for Error so that we can compare errors in tests
impl PartialEq for Error {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Validation(a), Self::Validation(b)) => a == b,
      (Self::RecoverableStep(a), Self::RecoverableStep(b)) => a == b,
      (Self::FatalStep(a), Self::FatalStep(b)) => a == b,
      (Self::StorageUnavailable(a), Self::StorageUnavailable(b)) => a == b,
      (Self::NotFound(a), Self::NotFound(b)) => a == b,
      (Self::Suspended(a), Self::Suspended(b)) => a == b,
      (Self::InternalRuntimeError(a), Self::InternalRuntimeError(b)) => a == b,
      _ => false,
    }
  }
}
