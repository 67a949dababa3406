use crate::{RunId, RunStatus, StepId, Time, TimerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record in a run's append-only log. The log is the single source of
/// truth for replay: a run's state can always be rebuilt from its events.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  RunSubmitted {
    workflow: String,
    input: Value,
  },
  StepStarted {
    step_id: StepId,
    attempt: u32,
  },
  StepCompleted {
    step_id: StepId,
    result: Value,
  },
  StepFailed {
    step_id: StepId,
    error: String,
    attempt: u32,
    fatal: bool,
  },
  TimerScheduled {
    timer_id: TimerId,
    wake_at: Time,
  },
  TimerFired {
    timer_id: TimerId,
  },
  RunCompleted {
    output: Value,
  },
  RunFailed {
    reason: String,
  },
}

impl Event {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Event::RunCompleted { .. } | Event::RunFailed { .. })
  }

  pub fn step_id(&self) -> Option<&StepId> {
    match self {
      Event::StepStarted { step_id, .. }
      | Event::StepCompleted { step_id, .. }
      | Event::StepFailed { step_id, .. } => Some(step_id),
      _ => None,
    }
  }
}

/// An [Event] as persisted: sequence numbers are assigned by the store,
/// start at 1 and are strictly increasing within a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SequencedEvent {
  pub sequence: u64,
  pub recorded_at: Time,
  #[serde(flatten)]
  pub event: Event,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunStateEvent {
  pub id: RunId,
  pub status: RunStatus,
  pub at: Time,
}

impl RunStateEvent {
  pub fn new(id: RunId, status: RunStatus) -> Self {
    RunStateEvent {
      id,
      status,
      at: chrono::Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_terminal() {
    assert!(Event::RunCompleted {
      output: Value::Null
    }
    .is_terminal());
    assert!(Event::RunFailed {
      reason: "reason".to_string()
    }
    .is_terminal());
    assert!(!Event::TimerFired {
      timer_id: TimerId::new(0)
    }
    .is_terminal());
  }

  #[test]
  fn test_step_id() {
    let step_id = StepId::new(0, "fetch");
    let event = Event::StepCompleted {
      step_id: step_id.clone(),
      result: Value::Null,
    };
    assert_eq!(event.step_id(), Some(&step_id));

    let event = Event::RunFailed {
      reason: "reason".to_string(),
    };
    assert_eq!(event.step_id(), None);
  }

  #[test]
  fn test_serde_round_trip() {
    let event = SequencedEvent {
      sequence: 3,
      recorded_at: chrono::Utc::now(),
      event: Event::StepFailed {
        step_id: StepId::new(1, "charge"),
        error: "connection reset".to_string(),
        attempt: 2,
        fatal: false,
      },
    };

    let json = serde_json::to_string(&event).unwrap();
    let parsed: SequencedEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
  }

  #[test]
  fn test_event_tag_is_snake_case() {
    let json = serde_json::to_value(Event::RunCompleted {
      output: Value::Null,
    })
    .unwrap();
    assert_eq!(json["type"], "run_completed");
  }
}
