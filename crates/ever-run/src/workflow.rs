use crate::{Result, WorkflowContext};
use serde_json::Value;

/// Failure of one step invocation. Classification is by constructor, never
/// by message content: a [StepError::Fatal] fails the run immediately, a
/// [StepError::Recoverable] is retried per the engine's [crate::RetryPolicy].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StepError {
  #[error("{0}")]
  Recoverable(String),

  #[error("{0}")]
  Fatal(String),
}

impl StepError {
  pub fn recoverable<T: ToString>(message: T) -> Self {
    Self::Recoverable(message.to_string())
  }

  pub fn fatal<T: ToString>(message: T) -> Self {
    Self::Fatal(message.to_string())
  }

  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Fatal(_))
  }

  pub fn message(&self) -> &str {
    match self {
      Self::Recoverable(message) | Self::Fatal(message) => message,
    }
  }
}

pub type StepResult = std::result::Result<Value, StepError>;

/// # Workflow
///
/// A workflow definition. `run` is replayed from the top on every
/// resumption; every `ctx.step` / `ctx.sleep` call short-circuits against
/// the run's event log, so only new work actually executes.
///
/// The definition body must stay replay-pure: all side effects (network
/// calls, external stores) belong inside the closures handed to
/// `ctx.step`. Anything effectful outside a step would run again on every
/// replay.
///
/// ## Example
///
/// ```rust
/// use serde_json::{json, Value};
///
/// struct Greeter;
///
/// #[ever_run::async_trait]
/// impl ever_run::Workflow for Greeter {
///   fn name(&self) -> &'static str {
///     "greeter"
///   }
///
///   async fn run(&self, ctx: ever_run::WorkflowContext, input: Value) -> ever_run::Result<Value> {
///     let greeting = ctx
///       .step("greet", input, |input| async move {
///         Ok(json!(format!("Hello {}", input["name"])))
///       })
///       .await?;
///
///     Ok(greeting)
///   }
/// }
/// ```
#[async_trait::async_trait]
pub trait Workflow: Send + Sync {
  /// Stable reference name used at submission.
  fn name(&self) -> &'static str;

  /// Submission-time input check. A rejected input surfaces as a
  /// validation error to the submitter and nothing is persisted.
  fn validate(&self, _input: &Value) -> Result<()> {
    Ok(())
  }

  async fn run(&self, ctx: WorkflowContext, input: Value) -> Result<Value>;
}
