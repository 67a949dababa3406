use crate::{
  Event, ProgressEntry, ProgressTracker, Result, RunId, SequencedEvent, StepExecutor, StepId,
  StepResult, Time, TimerId, TimerScheduler,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};

/// The run's event log as seen by one advancement: the events read at the
/// start plus everything recorded since. Step and timer calls consult this
/// to short-circuit work that already happened.
#[derive(Clone)]
pub(crate) struct RunHistory(Arc<Mutex<Vec<SequencedEvent>>>);

impl RunHistory {
  pub fn new(events: Vec<SequencedEvent>) -> Self {
    RunHistory(Arc::new(Mutex::new(events)))
  }

  pub fn push(&self, event: SequencedEvent) {
    self.0.lock().push(event);
  }

  pub fn completed_step(&self, step_id: &StepId) -> Option<Value> {
    self.0.lock().iter().rev().find_map(|e| match &e.event {
      Event::StepCompleted { step_id: id, result } if id == step_id => Some(result.clone()),
      _ => None,
    })
  }

  pub fn failed_attempts(&self, step_id: &StepId) -> u32 {
    self
      .0
      .lock()
      .iter()
      .filter(
        |e| matches!(&e.event, Event::StepFailed { step_id: id, .. } if id == step_id),
      )
      .count() as u32
  }

  pub fn timer_scheduled(&self, timer_id: TimerId) -> Option<Time> {
    self.0.lock().iter().find_map(|e| match &e.event {
      Event::TimerScheduled { timer_id: id, wake_at } if *id == timer_id => Some(*wake_at),
      _ => None,
    })
  }

  pub fn timer_fired(&self, timer_id: TimerId) -> bool {
    self
      .0
      .lock()
      .iter()
      .any(|e| matches!(&e.event, Event::TimerFired { timer_id: id } if *id == timer_id))
  }
}

/// Records progress entries for a run. Handed to step closures so they can
/// report without holding the whole context; losing these records never
/// affects the run itself.
#[derive(Clone)]
pub struct ProgressHandle {
  tracker: ProgressTracker,
  key: String,
}

impl ProgressHandle {
  pub(crate) fn new(tracker: ProgressTracker, key: String) -> Self {
    ProgressHandle { tracker, key }
  }

  pub fn record(&self, step_index: usize, total_steps: usize, message: impl Into<String>) {
    self
      .tracker
      .record(&self.key, ProgressEntry::new(step_index, total_steps, message));
  }
}

/// # WorkflowContext
///
/// The capability surface a definition runs against. Every `step` and
/// `sleep` call is assigned a positional call-site identity, so replaying
/// the definition lines calls up with the events they produced earlier.
///
/// Side effects belong inside the closures handed to [WorkflowContext::step];
/// the definition body between calls is replayed on every resumption.
#[derive(Clone)]
pub struct WorkflowContext {
  run_id: RunId,
  calls: Arc<Mutex<usize>>,
  history: RunHistory,
  executor: StepExecutor,
  timers: TimerScheduler,
  progress: ProgressHandle,
}

impl WorkflowContext {
  pub(crate) fn new(
    run_id: RunId,
    history: RunHistory,
    executor: StepExecutor,
    timers: TimerScheduler,
    progress: ProgressHandle,
  ) -> Self {
    WorkflowContext {
      run_id,
      calls: Arc::new(Mutex::new(0)),
      history,
      executor,
      timers,
      progress,
    }
  }

  pub fn run_id(&self) -> RunId {
    self.run_id.clone()
  }

  /// Executes a step with at-least-once semantics. If the log already holds
  /// a completed result for this call site, the stored result is returned
  /// and `f` is never invoked.
  ///
  /// A crash between `f` finishing and its result being durably appended
  /// causes a re-invocation on replay, so `f`'s side effects must be
  /// idempotent or safe to repeat.
  pub async fn step<F, Fut>(&self, name: &str, input: Value, f: F) -> Result<Value>
  where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
  {
    let step_id = StepId::new(self.next_call(), name);

    self
      .executor
      .execute(&self.run_id, &step_id, &self.history, input, f)
      .await
  }

  /// Suspends the run until `wake_at` without holding a worker. Total sleep
  /// is never shorter than requested; wakeups may be late under load.
  pub async fn sleep_until(&self, wake_at: Time) -> Result<()> {
    let timer_id = TimerId::new(self.next_call());

    self
      .timers
      .sleep_until(&self.run_id, timer_id, &self.history, wake_at)
      .await
  }

  pub async fn sleep(&self, duration: Duration) -> Result<()> {
    let wake_at = chrono::Utc::now()
      + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365));

    self.sleep_until(wake_at).await
  }

  pub fn progress(&self) -> ProgressHandle {
    self.progress.clone()
  }

  fn next_call(&self) -> usize {
    let mut calls = self.calls.lock();
    let call = *calls;
    *calls += 1;
    call
  }
}
