use crate::{
  store::Recorder, Error, Event, Result, RetryPolicy, RunHistory, RunId, StepError, StepId,
  StepResult,
};
use serde_json::Value;
use std::{future::Future, time::Duration};

/// Runs a single step with at-least-once semantics: completed steps replay
/// their stored result, recoverable failures retry with backoff up to the
/// policy's attempt bound, fatal failures propagate after one invocation.
#[derive(Clone)]
pub struct StepExecutor {
  recorder: Recorder,
  retry: RetryPolicy,
  step_timeout: Duration,
}

impl StepExecutor {
  pub(crate) fn new(recorder: Recorder, retry: RetryPolicy, step_timeout: Duration) -> Self {
    StepExecutor {
      recorder,
      retry,
      step_timeout,
    }
  }

  pub(crate) async fn execute<F, Fut>(
    &self,
    run_id: &RunId,
    step_id: &StepId,
    history: &RunHistory,
    input: Value,
    f: F,
  ) -> Result<Value>
  where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
  {
    if let Some(result) = history.completed_step(step_id) {
      log::trace!(
        "Step {} of run {} already completed, replaying stored result",
        step_id.to_string(),
        run_id.to_string()
      );
      return Ok(result);
    }

    // Failures recorded before a crash still count toward the bound.
    let mut attempt = history.failed_attempts(step_id) + 1;

    loop {
      let started_at = chrono::Utc::now();
      let event = self
        .recorder
        .record(
          run_id,
          Event::StepStarted {
            step_id: step_id.clone(),
            attempt,
          },
        )
        .await?;
      history.push(event);

      let outcome = match tokio::time::timeout(self.step_timeout, f(input.clone())).await {
        Ok(outcome) => outcome,
        Err(_) => Err(StepError::recoverable(format!(
          "timed out after {}",
          humantime::format_duration(self.step_timeout)
        ))),
      };

      match outcome {
        Ok(result) => {
          let event = self
            .recorder
            .record(
              run_id,
              Event::StepCompleted {
                step_id: step_id.clone(),
                result: result.clone(),
              },
            )
            .await?;
          history.push(event);

          let duration = chrono::Utc::now() - started_at;
          log::info!(
            "Step {} of run {} completed on attempt {} in {}ms",
            step_id.to_string(),
            run_id.to_string(),
            attempt,
            duration.num_milliseconds()
          );

          return Ok(result);
        }
        Err(err) => {
          let exhausted = attempt >= self.retry.max_attempts;
          let event = self
            .recorder
            .record(
              run_id,
              Event::StepFailed {
                step_id: step_id.clone(),
                error: err.message().to_string(),
                attempt,
                fatal: err.is_fatal() || exhausted,
              },
            )
            .await?;
          history.push(event);

          if err.is_fatal() {
            log::error!(
              "Step {} of run {} failed fatally: {}",
              step_id.to_string(),
              run_id.to_string(),
              err.message()
            );
            return Err(Error::fatal_step(err.message()));
          }

          if exhausted {
            log::error!(
              "Step {} of run {} exhausted {} attempts: {}",
              step_id.to_string(),
              run_id.to_string(),
              attempt,
              err.message()
            );
            return Err(Error::fatal_step(format!(
              "{} (exhausted {} attempts)",
              err.message(),
              attempt
            )));
          }

          let delay = self.retry.delay_for(run_id, step_id, attempt);
          log::warn!(
            "Step {} of run {} failed on attempt {} ({}), retrying in {}ms",
            step_id.to_string(),
            run_id.to_string(),
            attempt,
            err.message(),
            delay.as_millis()
          );

          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}
