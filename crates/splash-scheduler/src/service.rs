//! Scheduler service: the control surface (start/stop/pause/resume/reload/
//! status) plus the background polling loop.
//!
//! All scheduler state sits in one `SchedulerEngine` behind one mutex; the
//! loop and every control call go through it. Dropping a `Scheduler` stops
//! it and ends its poll loop.

use std::sync::{Arc, Mutex as StdMutex};

use splash_core::error::Result;
use splash_core::model::RuleModel;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::dispatch::{DispatchGate, Presenter};
use crate::engine::{FireEvent, SchedulerEngine, SchedulerStatus};
use crate::notify::Notification;
use crate::reload::ReloadSummary;

/// Running reminder scheduler. Must be created inside a tokio runtime.
pub struct Scheduler {
    engine: Arc<Mutex<SchedulerEngine>>,
    clock: Arc<dyn Clock>,
    gate: DispatchGate,
    /// Wakes the poll loop early on stop.
    wake: Arc<Notify>,
    /// Poll loop of the current (or last) run.
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Scheduler on the local system clock.
    pub fn new(model: RuleModel, presenter: Arc<dyn Presenter>) -> Result<Self> {
        Self::with_clock(model, presenter, Arc::new(SystemClock))
    }

    pub fn with_clock(
        model: RuleModel,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        model.validate()?;
        let engine = Arc::new(Mutex::new(SchedulerEngine::new(model)));
        let gate = DispatchGate::spawn(Arc::clone(&engine), presenter);
        Ok(Self {
            engine,
            clock,
            gate,
            wake: Arc::new(Notify::new()),
            poll_task: StdMutex::new(None),
        })
    }

    /// Stopped → Running; spawns a fresh poll loop.
    pub async fn start(&self) -> Result<()> {
        let (generation, events) = {
            let mut eng = self.engine.lock().await;
            let events = eng.start(self.clock.now())?;
            (eng.generation(), events)
        };
        forward(&self.engine, &self.gate, events).await;
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
            self.gate.clone(),
            Arc::clone(&self.wake),
            generation,
        ));
        // The previous loop has already seen its generation retire.
        *self.poll_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        Ok(())
    }

    /// Running|Paused → Stopped. The poll loop wakes and exits; a splash
    /// already on screen is left alone. Returns whether it was running.
    pub async fn stop(&self) -> bool {
        let was_running = self.engine.lock().await.stop();
        // A stored permit covers a loop that is between ticks, not waiting.
        self.wake.notify_one();
        was_running
    }

    pub async fn pause(&self) -> Result<()> {
        self.engine.lock().await.pause()
    }

    pub async fn resume(&self) -> Result<()> {
        self.engine.lock().await.resume()
    }

    /// Returns the new paused flag.
    pub async fn toggle_pause(&self) -> Result<bool> {
        self.engine.lock().await.toggle_pause()
    }

    /// Swap the active model between ticks. An invalid model is rejected
    /// and the active one kept.
    pub async fn reload(&self, model: RuleModel) -> Result<ReloadSummary> {
        let now = self.clock.now();
        self.engine.lock().await.reload(model, now)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let now = self.clock.now();
        self.engine.lock().await.status(now)
    }

    pub async fn is_running(&self) -> bool {
        self.engine.lock().await.is_running()
    }

    pub async fn is_paused(&self) -> bool {
        self.engine.lock().await.is_paused()
    }

    /// Last delivered notifications.
    pub async fn history(&self) -> Vec<Notification> {
        self.gate.history().await
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut engine) = self.engine.try_lock() {
            engine.stop();
        }
        if let Some(task) = self
            .poll_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

/// Hand events to the gate; roll back any the gate refuses.
async fn forward(engine: &Mutex<SchedulerEngine>, gate: &DispatchGate, events: Vec<FireEvent>) {
    for event in events {
        if let Err(e) = gate.dispatch(event.clone()) {
            tracing::warn!("⚠️ {e}");
            engine.lock().await.revert(&event);
        }
    }
}

/// Tick, forward, sleep; exits once its generation is no longer current.
async fn poll_loop(
    engine: Arc<Mutex<SchedulerEngine>>,
    clock: Arc<dyn Clock>,
    gate: DispatchGate,
    wake: Arc<Notify>,
    generation: u64,
) {
    tracing::info!("⏰ Poll loop started (generation {generation})");
    loop {
        let (events, tick) = {
            let mut eng = engine.lock().await;
            if !eng.accepts(generation) {
                break;
            }
            (eng.tick(clock.now()), eng.tick_interval())
        };
        if !events.is_empty() {
            tracing::debug!("{} rule(s) fired", events.len());
        }
        forward(&engine, &gate, events).await;

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = wake.notified() => {}
        }
    }
    tracing::info!("⏰ Poll loop stopped (generation {generation})");
}
