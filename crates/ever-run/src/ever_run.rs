use crate::{
  store::Recorder, timer::spawn_reaper, EngineConfig, LogStore, MemoryLogStore, Orchestrator,
  Plugin, PluginManager, ProgressEntry, ProgressTracker, Result, RetryPolicy, RunId, RunRegistry,
  RunSnapshot, StepExecutor, TimerScheduler, Workflow,
};
use serde_json::Value;
use std::sync::Arc;

/// # EverRun
///
/// The engine facade: registers workflow definitions, submits runs, and
/// exposes run state and the progress side-channel. Built with
/// [EverRun::builder]; building spawns the reaper and wake loops, so it must
/// happen inside a tokio runtime.
pub struct EverRun {
  orchestrator: Orchestrator,
  registry: RunRegistry,
  progress: ProgressTracker,
  plugins: PluginManager,
  reaper: tokio::task::JoinHandle<()>,
  waker: tokio::task::JoinHandle<()>,
}

impl EverRun {
  pub fn builder() -> EverRunBuilder {
    EverRunBuilder::new()
  }

  /// Starts a new run. Fails with a validation error when the workflow is
  /// unknown or rejects the input; nothing is persisted on rejection.
  pub async fn submit(&self, workflow: &str, input: Value) -> Result<RunId> {
    self.orchestrator.submit(workflow, input).await
  }

  /// Like [EverRun::submit], but also maps a client-issued correlation
  /// token to the new run, so progress recorded under the token before
  /// submission stays reachable.
  pub async fn submit_with_token(
    &self,
    workflow: &str,
    input: Value,
    token: impl Into<String>,
  ) -> Result<RunId> {
    let run_id = self.orchestrator.submit(workflow, input).await?;
    self.map_token(token, &run_id);

    Ok(run_id)
  }

  /// Current snapshot of a run, by run id or mapped correlation token.
  pub fn status(&self, key: &str) -> Result<RunSnapshot> {
    self.registry.snapshot(key)
  }

  /// Awaits a run's terminal snapshot.
  pub async fn wait(&self, run_id: &RunId) -> Result<RunSnapshot> {
    self.orchestrator.wait(run_id).await
  }

  /// Re-drives a run from its log, e.g. after a process restart over a
  /// durable store. A terminal run is only re-synced, never re-executed.
  pub async fn resume(&self, run_id: &RunId) -> Result<()> {
    self.orchestrator.advance(run_id).await
  }

  /// Re-submits every known run that is neither terminal nor waiting on a
  /// timer. Returns how many advancements were kicked off.
  pub async fn recover(&self) -> Result<usize> {
    self.orchestrator.recover().await
  }

  /// Maps a client-issued correlation token to an existing run, merging any
  /// progress already recorded under the token.
  pub fn map_token(&self, token: impl Into<String>, run_id: &RunId) {
    let token = token.into();
    self.registry.map_token(token.clone(), run_id.clone());
    self.progress.rekey(&token, &run_id.inner());
  }

  pub fn record_progress(&self, token: &str, entry: ProgressEntry) {
    match self.registry.resolve(token) {
      Ok(run_id) => self.progress.record(run_id.inner(), entry),
      Err(_) => self.progress.record(token, entry),
    }
  }

  pub fn fetch_progress(&self, key: &str) -> Vec<ProgressEntry> {
    match self.registry.resolve(key) {
      Ok(run_id) => self.progress.fetch(&run_id.inner()),
      Err(_) => self.progress.fetch(key),
    }
  }

  pub fn clear_progress(&self, key: &str) {
    match self.registry.resolve(key) {
      Ok(run_id) => self.progress.clear(&run_id.inner()),
      Err(_) => self.progress.clear(key),
    }
  }

  pub fn register_workflow<W: Workflow + 'static>(&self, workflow: W) -> &Self {
    self.orchestrator.register_workflow(Arc::new(workflow));
    self
  }

  pub fn register_plugin<P: Plugin + 'static>(&self, plugin: P) -> &Self {
    self.plugins.register(plugin);
    self
  }

  pub fn unregister_plugin(&self, plugin_name: &'static str) -> &Self {
    self.plugins.unregister(plugin_name);
    self
  }

  pub fn plugins(&self) -> PluginManager {
    self.plugins.clone()
  }
}

impl Drop for EverRun {
  fn drop(&mut self) {
    self.reaper.abort();
    self.waker.abort();
  }
}

pub struct EverRunBuilder {
  store: Option<Arc<dyn LogStore>>,
  retry: RetryPolicy,
  config: EngineConfig,
  plugins: PluginManager,
  workflows: Vec<Arc<dyn Workflow>>,
}

impl EverRunBuilder {
  pub fn new() -> Self {
    EverRunBuilder {
      store: None,
      retry: RetryPolicy::default(),
      config: EngineConfig::default(),
      plugins: PluginManager::new(),
      workflows: Vec::new(),
    }
  }

  pub fn log_store<S: LogStore + 'static>(mut self, store: S) -> Self {
    self.store = Some(Arc::new(store));
    self
  }

  pub fn retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn plugin<P: Plugin + 'static>(self, plugin: P) -> Self {
    self.plugins.register(plugin);
    self
  }

  pub fn workflow<W: Workflow + 'static>(mut self, workflow: W) -> Self {
    self.workflows.push(Arc::new(workflow));
    self
  }

  pub fn build(self) -> EverRun {
    let store = self
      .store
      .unwrap_or_else(|| Arc::new(MemoryLogStore::new()));

    let recorder = Recorder::new(store, self.plugins.clone());
    let registry = RunRegistry::new();
    let progress = ProgressTracker::new(self.config.progress_ttl);
    let timers = TimerScheduler::new(recorder.clone());
    let executor = StepExecutor::new(recorder.clone(), self.retry, self.config.step_timeout);

    let orchestrator = Orchestrator::new(
      recorder,
      registry.clone(),
      executor,
      timers.clone(),
      progress.clone(),
    );

    for workflow in self.workflows {
      orchestrator.register_workflow(workflow);
    }

    let (wake_tx, mut wake_rx) = tokio::sync::mpsc::unbounded_channel();

    let reaper = spawn_reaper(
      timers,
      progress.clone(),
      wake_tx,
      self.config.reaper_interval,
    );

    let waker = {
      let orchestrator = orchestrator.clone();
      tokio::spawn(async move {
        while let Some(run_id) = wake_rx.recv().await {
          orchestrator.spawn_advance(run_id);
        }
      })
    };

    EverRun {
      orchestrator,
      registry,
      progress,
      plugins: self.plugins,
      reaper,
      waker,
    }
  }
}

impl Default for EverRunBuilder {
  fn default() -> Self {
    Self::new()
  }
}
