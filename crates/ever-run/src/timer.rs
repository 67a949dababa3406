use crate::{store::Recorder, Error, Event, ProgressTracker, Result, RunHistory, RunId, Time, TimerId};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone)]
struct PendingTimer {
  run_id: RunId,
  timer_id: TimerId,
  wake_at: Time,
}

/// Durable timers. `sleep_until` appends the schedule once and suspends the
/// run; the reaper appends the fire event and re-submits the run when the
/// deadline elapses. A sleeping run costs storage, not a worker.
#[derive(Clone)]
pub struct TimerScheduler {
  recorder: Recorder,
  pending: Arc<Mutex<Vec<PendingTimer>>>,
}

impl TimerScheduler {
  pub(crate) fn new(recorder: Recorder) -> Self {
    TimerScheduler {
      recorder,
      pending: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Replay-aware sleep. Returns immediately when the fire event is already
  /// in the log; otherwise schedules (at most once) and signals suspension.
  ///
  /// A schedule that survived a crash keeps its original deadline, so the
  /// total wall-clock sleep never shrinks below what was first requested.
  pub(crate) async fn sleep_until(
    &self,
    run_id: &RunId,
    timer_id: TimerId,
    history: &RunHistory,
    requested: Time,
  ) -> Result<()> {
    if history.timer_fired(timer_id) {
      log::trace!(
        "Timer {} of run {} already fired, replaying",
        timer_id.to_string(),
        run_id.to_string()
      );
      return Ok(());
    }

    let wake_at = match history.timer_scheduled(timer_id) {
      Some(wake_at) => wake_at,
      None => {
        let event = self
          .recorder
          .record(
            run_id,
            Event::TimerScheduled {
              timer_id,
              wake_at: requested,
            },
          )
          .await?;
        history.push(event);
        requested
      }
    };

    self.register(run_id.clone(), timer_id, wake_at);

    Err(Error::Suspended(wake_at))
  }

  fn register(&self, run_id: RunId, timer_id: TimerId, wake_at: Time) {
    let mut pending = self.pending.lock();

    if pending
      .iter()
      .any(|t| t.run_id == run_id && t.timer_id == timer_id)
    {
      return;
    }

    pending.push(PendingTimer {
      run_id,
      timer_id,
      wake_at,
    });
  }

  fn take_due(&self, now: Time) -> Vec<PendingTimer> {
    let mut pending = self.pending.lock();
    let (due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|t| t.wake_at <= now);
    *pending = rest;
    due
  }

  pub fn pending(&self) -> usize {
    self.pending.lock().len()
  }
}

/// Background loop that fires due timers and sweeps expired progress
/// records. Fired runs are handed to the orchestrator through `wake`.
pub(crate) fn spawn_reaper(
  timers: TimerScheduler,
  progress: ProgressTracker,
  wake: UnboundedSender<RunId>,
  interval: Duration,
) -> tokio::task::JoinHandle<()> {
  tokio::spawn(async move {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tick.tick().await;
      let now = chrono::Utc::now();

      for timer in timers.take_due(now) {
        match timers
          .recorder
          .record(
            &timer.run_id,
            Event::TimerFired {
              timer_id: timer.timer_id,
            },
          )
          .await
        {
          Ok(_) => {
            log::debug!(
              "Timer {} of run {} fired",
              timer.timer_id.to_string(),
              timer.run_id.to_string()
            );

            if wake.send(timer.run_id).is_err() {
              return;
            }
          }
          Err(err) => {
            log::error!(
              "Failed to record timer fire for run {}: {}",
              timer.run_id.to_string(),
              err
            );
            // Put it back so the next tick tries again.
            timers.register(timer.run_id, timer.timer_id, timer.wake_at);
          }
        }
      }

      progress.sweep(now);
    }
  })
}
