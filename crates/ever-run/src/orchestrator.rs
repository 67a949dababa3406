use crate::{
  store::Recorder, Error, Event, ProgressHandle, ProgressTracker, Result, Run, RunHistory, RunId,
  RunRegistry, RunSnapshot, RunStateEvent, RunStatus, SequencedEvent, StepExecutor, TimerScheduler,
  Workflow, WorkflowContext,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Duration};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Advances runs by replaying their definitions against the event log.
///
/// An advancement is triggered by submission, a timer fire or an explicit
/// resume; it replays the definition from the top, lets step and timer
/// calls short-circuit against the log, and ends in one of: suspension
/// (durable timer), completion, or terminal failure. Advancements of the
/// same run serialize on a per-run lock.
#[derive(Clone)]
pub struct Orchestrator {
  recorder: Recorder,
  registry: RunRegistry,
  workflows: Arc<Mutex<HashMap<String, Arc<dyn Workflow>>>>,
  executor: StepExecutor,
  timers: TimerScheduler,
  progress: ProgressTracker,
  locks: Arc<Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Orchestrator {
  pub(crate) fn new(
    recorder: Recorder,
    registry: RunRegistry,
    executor: StepExecutor,
    timers: TimerScheduler,
    progress: ProgressTracker,
  ) -> Self {
    Orchestrator {
      recorder,
      registry,
      workflows: Arc::new(Mutex::new(HashMap::new())),
      executor,
      timers,
      progress,
      locks: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn register_workflow(&self, workflow: Arc<dyn Workflow>) {
    self
      .workflows
      .lock()
      .insert(workflow.name().to_string(), workflow);
  }

  pub fn workflow(&self, name: &str) -> Option<Arc<dyn Workflow>> {
    self.workflows.lock().get(name).cloned()
  }

  /// Validates and creates a new run, then kicks off its first advancement.
  /// A rejected input leaves no trace.
  pub async fn submit(&self, workflow_ref: &str, input: Value) -> Result<RunId> {
    let workflow = self
      .workflow(workflow_ref)
      .ok_or_else(|| Error::validation(format!("Unknown workflow: {}", workflow_ref)))?;

    workflow.validate(&input)?;

    let run_id = RunId::generate();

    self
      .recorder
      .record(
        &run_id,
        Event::RunSubmitted {
          workflow: workflow_ref.to_string(),
          input: input.clone(),
        },
      )
      .await?;

    self
      .registry
      .insert(Run::new(run_id.clone(), workflow_ref, input));
    self
      .recorder
      .plugins()
      .on_state_change(RunStateEvent::new(run_id.clone(), RunStatus::Pending));

    log::info!(
      "Submitted run {} for workflow {}",
      run_id.to_string(),
      workflow_ref
    );

    self.spawn_advance(run_id.clone());

    Ok(run_id)
  }

  pub(crate) fn spawn_advance(&self, run_id: RunId) {
    let this = self.clone();
    tokio::spawn(async move {
      if let Err(err) = this.advance(&run_id).await {
        log::error!("Run {} advancement failed: {}", run_id.to_string(), err);
      }
    });
  }

  /// One advancement of a run. Safe to call concurrently; callers serialize
  /// on the per-run lock so at most one replay is active per run.
  pub async fn advance(&self, run_id: &RunId) -> Result<()> {
    let lock = self.run_lock(run_id);
    let _guard = lock.lock().await;

    self.ensure_registered(run_id).await?;

    let run = self.registry.get(run_id)?;
    if run.status.is_terminal() {
      log::trace!(
        "Run {} is already terminal, nothing to advance",
        run_id.to_string()
      );
      return Ok(());
    }

    let events = self.recorder.store().read_all(run_id).await?;

    // Crash window: a terminal event was durably appended but the registry
    // never heard about it. Re-sync instead of replaying.
    if let Some(event) = events.iter().find(|e| e.event.is_terminal()).cloned() {
      return self.apply_terminal(run_id, &event);
    }

    let workflow = self.workflow(&run.workflow).ok_or_else(|| {
      Error::internal_runtime_error(format!("Workflow {} is not registered", run.workflow))
    })?;

    self.set_status(run_id, RunStatus::Running)?;

    let ctx = WorkflowContext::new(
      run_id.clone(),
      RunHistory::new(events),
      self.executor.clone(),
      self.timers.clone(),
      ProgressHandle::new(self.progress.clone(), run_id.inner()),
    );

    match workflow.run(ctx, run.input).await {
      Ok(output) => {
        let event = self
          .recorder
          .record(
            run_id,
            Event::RunCompleted {
              output: output.clone(),
            },
          )
          .await?;
        self.registry.complete(run_id, output, event.recorded_at)?;
        self
          .recorder
          .plugins()
          .on_state_change(RunStateEvent::new(run_id.clone(), RunStatus::Completed));

        log::info!("Run {} completed", run_id.to_string());
      }
      Err(Error::Suspended(wake_at)) => {
        self.set_status(run_id, RunStatus::Sleeping)?;

        log::debug!("Run {} sleeping until {}", run_id.to_string(), wake_at);
      }
      Err(Error::StorageUnavailable(message)) => {
        // Cannot write a terminal event either; park the run for recover().
        log::error!(
          "Run {} paused, storage unavailable: {}",
          run_id.to_string(),
          message
        );
        self.set_status(run_id, RunStatus::Pending)?;
      }
      Err(err) => {
        let reason = err.to_string();
        let event = self
          .recorder
          .record(
            run_id,
            Event::RunFailed {
              reason: reason.clone(),
            },
          )
          .await?;
        self.registry.fail(run_id, reason.clone(), event.recorded_at)?;
        self
          .recorder
          .plugins()
          .on_state_change(RunStateEvent::new(run_id.clone(), RunStatus::Failed));

        log::error!("Run {} failed: {}", run_id.to_string(), reason);
      }
    }

    Ok(())
  }

  /// Awaits a run's terminal snapshot, polling at a bounded interval.
  pub async fn wait(&self, run_id: &RunId) -> Result<RunSnapshot> {
    loop {
      let snapshot = self.registry.get(run_id)?.snapshot();
      if snapshot.is_terminal() {
        return Ok(snapshot);
      }

      tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
  }

  /// Re-submits every registered run that is neither terminal nor parked on
  /// a timer. Returns how many advancements were kicked off.
  pub async fn recover(&self) -> Result<usize> {
    let mut resubmitted = 0;

    for run_id in self.registry.list() {
      let run = self.registry.get(&run_id)?;
      if !run.status.is_terminal() && !run.status.is_sleeping() {
        log::info!("Recovering run {}", run_id.to_string());
        self.spawn_advance(run_id);
        resubmitted += 1;
      }
    }

    Ok(resubmitted)
  }

  fn run_lock(&self, run_id: &RunId) -> Arc<tokio::sync::Mutex<()>> {
    self
      .locks
      .lock()
      .entry(run_id.clone())
      .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
      .clone()
  }

  /// Rebuilds the registry record from the log for runs this process has
  /// not seen yet (resume after a restart, reaper wake of a foreign run).
  async fn ensure_registered(&self, run_id: &RunId) -> Result<()> {
    if self.registry.contains(run_id) {
      return Ok(());
    }

    let events = self.recorder.store().read_all(run_id).await?;
    if events.is_empty() {
      return Err(Error::not_found(run_id.to_string()));
    }

    self.registry.insert(Self::fold_run(run_id, &events)?);

    Ok(())
  }

  fn fold_run(run_id: &RunId, events: &[SequencedEvent]) -> Result<Run> {
    let first = &events[0];
    let (workflow, input) = match &first.event {
      Event::RunSubmitted { workflow, input } => (workflow.clone(), input.clone()),
      other => {
        return Err(Error::internal_runtime_error(format!(
          "Log of run {} does not begin with a submission: {:?}",
          run_id.to_string(),
          other
        )))
      }
    };

    let mut run = Run::new(run_id.clone(), workflow, input);
    run.created_at = first.recorded_at;

    for event in events {
      match &event.event {
        Event::RunCompleted { output } => {
          run.status = RunStatus::Completed;
          run.output = Some(output.clone());
          run.completed_at = Some(event.recorded_at);
        }
        Event::RunFailed { reason } => {
          run.status = RunStatus::Failed;
          run.failure_reason = Some(reason.clone());
          run.completed_at = Some(event.recorded_at);
        }
        _ => {}
      }
    }

    Ok(run)
  }

  fn apply_terminal(&self, run_id: &RunId, event: &SequencedEvent) -> Result<()> {
    match &event.event {
      Event::RunCompleted { output } => {
        self
          .registry
          .complete(run_id, output.clone(), event.recorded_at)?;
        self
          .recorder
          .plugins()
          .on_state_change(RunStateEvent::new(run_id.clone(), RunStatus::Completed));
      }
      Event::RunFailed { reason } => {
        self
          .registry
          .fail(run_id, reason.clone(), event.recorded_at)?;
        self
          .recorder
          .plugins()
          .on_state_change(RunStateEvent::new(run_id.clone(), RunStatus::Failed));
      }
      _ => {}
    }

    Ok(())
  }

  fn set_status(&self, run_id: &RunId, status: RunStatus) -> Result<()> {
    let applied = self.registry.set_status(run_id, status)?;
    self
      .recorder
      .plugins()
      .on_state_change(RunStateEvent::new(run_id.clone(), applied));

    Ok(())
  }
}
