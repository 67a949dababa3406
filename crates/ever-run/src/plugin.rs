use crate::{RunId, RunStateEvent, SequencedEvent};
use parking_lot::Mutex;
use std::sync::Arc;

type OnStateChange = dyn Fn(RunStateEvent) -> () + Send + Sync;
type OnEvent = dyn Fn(RunId, SequencedEvent) -> () + Send + Sync;

/// Observer hooks for run lifecycle. Plugins are notified after the fact and
/// cannot influence execution.
pub trait Plugin: Send {
  fn name(&self) -> &'static str;
  fn on_state_change(&self, _event: RunStateEvent) {}
  fn on_event(&self, _run_id: RunId, _event: SequencedEvent) {}
}

pub struct PluginBuilder {
  name: &'static str,
  on_state_change: Option<Box<OnStateChange>>,
  on_event: Option<Box<OnEvent>>,
}

impl PluginBuilder {
  pub fn new(name: &'static str) -> Self {
    PluginBuilder {
      name,
      on_state_change: None,
      on_event: None,
    }
  }

  pub fn on_state_change<T>(mut self, on_state_change: T) -> Self
  where
    T: Fn(RunStateEvent) -> () + 'static + Send + Sync,
  {
    self.on_state_change = Some(Box::new(on_state_change));
    self
  }

  pub fn on_event<T>(mut self, on_event: T) -> Self
  where
    T: Fn(RunId, SequencedEvent) -> () + 'static + Send + Sync,
  {
    self.on_event = Some(Box::new(on_event));
    self
  }

  pub fn build(self) -> EverRunPlugin {
    EverRunPlugin {
      name: self.name,
      on_state_change: self.on_state_change,
      on_event: self.on_event,
    }
  }
}

pub struct EverRunPlugin {
  name: &'static str,
  on_state_change: Option<Box<OnStateChange>>,
  on_event: Option<Box<OnEvent>>,
}

impl EverRunPlugin {
  pub fn builder(name: &'static str) -> PluginBuilder {
    PluginBuilder::new(name)
  }
}

impl Plugin for EverRunPlugin {
  fn name(&self) -> &'static str {
    self.name
  }

  fn on_state_change(&self, event: RunStateEvent) {
    if let Some(on_state_change) = &self.on_state_change {
      on_state_change(event);
    }
  }

  fn on_event(&self, run_id: RunId, event: SequencedEvent) {
    if let Some(on_event) = &self.on_event {
      on_event(run_id, event);
    }
  }
}

#[derive(Clone)]
pub struct PluginManager {
  plugins: Arc<Mutex<Vec<Box<dyn Plugin>>>>,
}

impl PluginManager {
  pub fn new() -> Self {
    PluginManager {
      plugins: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn size(&self) -> usize {
    self.plugins.lock().len()
  }

  pub fn register<P: Plugin + 'static>(&self, plugin: P) {
    let mut plugins = self.plugins.lock();

    plugins.retain(|p| p.name() != plugin.name());

    plugins.push(Box::new(plugin));
  }

  pub fn unregister(&self, name: &'static str) {
    self.plugins.lock().retain(|plugin| plugin.name() != name);
  }

  pub fn on_state_change(&self, event: RunStateEvent) {
    let plugins = self.plugins.lock();
    for plugin in plugins.iter() {
      plugin.on_state_change(event.clone());
    }
  }

  pub fn on_event(&self, run_id: RunId, event: SequencedEvent) {
    let plugins = self.plugins.lock();
    for plugin in plugins.iter() {
      plugin.on_event(run_id.clone(), event.clone());
    }
  }
}
