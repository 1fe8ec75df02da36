//! Dispatch gate: routes fire events to the presentation layer.
//!
//! ```text
//! poll loop ──mpsc──▶ router ──┬── splash ──▶ splash lane (FIFO, one at a time)
//!                              └── popup ───▶ spawned, independent
//! ```
//! The presenter runs on the blocking pool, never on the poll loop. An event
//! is dropped when the scheduler is stopped or has been restarted since it
//! fired; a failed delivery rolls the rule's runtime state back. A rule has
//! at most one splash queued or on screen; further fires coalesce into it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use splash_core::error::{Result, SplashError};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use splash_core::model::RuleId;

use crate::engine::{FireEvent, SchedulerEngine};
use crate::notify::{Notification, NotifyHistory, RenderMode};

/// Presentation collaborator: owns windows, audio and positioning.
///
/// `present` may block; a splash is expected to block until it closes.
pub trait Presenter: Send + Sync + 'static {
    fn present(&self, notification: &Notification) -> Result<()>;
}

impl<F> Presenter for F
where
    F: Fn(&Notification) -> Result<()> + Send + Sync + 'static,
{
    fn present(&self, notification: &Notification) -> Result<()> {
        self(notification)
    }
}

/// Handle for submitting fire events. Cheap to clone.
#[derive(Clone)]
pub struct DispatchGate {
    tx: mpsc::UnboundedSender<FireEvent>,
    history: Arc<Mutex<NotifyHistory>>,
}

/// What every delivery needs.
#[derive(Clone)]
struct Delivery {
    engine: Arc<Mutex<SchedulerEngine>>,
    presenter: Arc<dyn Presenter>,
    history: Arc<Mutex<NotifyHistory>>,
    /// Rules with a splash queued in or holding the splash lane.
    pending: Arc<Mutex<HashSet<RuleId>>>,
}

impl DispatchGate {
    /// Spawn the router and the splash lane on the current tokio runtime.
    pub fn spawn(engine: Arc<Mutex<SchedulerEngine>>, presenter: Arc<dyn Presenter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (splash_tx, splash_rx) = mpsc::unbounded_channel();
        let history = Arc::new(Mutex::new(NotifyHistory::new()));
        let delivery = Delivery {
            engine,
            presenter,
            history: Arc::clone(&history),
            pending: Arc::new(Mutex::new(HashSet::new())),
        };
        tokio::spawn(route(rx, splash_tx, delivery.clone()));
        tokio::spawn(splash_lane(splash_rx, delivery));
        Self { tx, history }
    }

    /// Queue an event for delivery. Never blocks.
    pub fn dispatch(&self, event: FireEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| SplashError::Dispatch("dispatch gate is closed".into()))
    }

    /// Delivered notifications, oldest first (last 100).
    pub async fn history(&self) -> Vec<Notification> {
        self.history.lock().await.entries()
    }
}

impl Delivery {
    /// Startup notifications always pass; anything else needs a running
    /// scheduler of the same generation.
    async fn admitted(&self, event: &FireEvent) -> bool {
        if event.is_startup() {
            return true;
        }
        let ok = self.engine.lock().await.accepts(event.generation);
        if !ok {
            tracing::debug!(
                "🚫 Dropping '{}' (scheduler stopped or restarted)",
                event.notification.message
            );
        }
        ok
    }

    /// Show the notification; returns whether it was delivered.
    async fn deliver(&self, event: &FireEvent) -> bool {
        let presenter = Arc::clone(&self.presenter);
        let notification = event.notification.clone();
        let result = tokio::task::spawn_blocking(move || presenter.present(&notification))
            .await
            .unwrap_or_else(|e| Err(SplashError::Dispatch(format!("presenter panicked: {e}"))));

        match result {
            Ok(()) => {
                self.history.lock().await.record(event.notification.clone());
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to show '{}': {e}", event.notification.message);
                self.engine.lock().await.revert(event);
                false
            }
        }
    }
}

async fn route(
    mut rx: mpsc::UnboundedReceiver<FireEvent>,
    splash_tx: mpsc::UnboundedSender<FireEvent>,
    delivery: Delivery,
) {
    while let Some(event) = rx.recv().await {
        if !delivery.admitted(&event).await {
            continue;
        }
        match event.notification.mode {
            RenderMode::Splash => {
                if let Some(id) = event.rule_id()
                    && !delivery.pending.lock().await.insert(id.clone())
                {
                    tracing::debug!(
                        "🔁 '{}' already has a splash pending, coalescing",
                        event.notification.message
                    );
                    continue;
                }
                if splash_tx.send(event).is_err() {
                    break;
                }
            }
            RenderMode::Popup => {
                let delivery = delivery.clone();
                tokio::spawn(async move {
                    delivery.deliver(&event).await;
                });
            }
        }
    }
    tracing::debug!("Dispatch router closed");
}

/// One splash on screen at a time: each holds the lane for at least its
/// `display_seconds` window, later ones wait in FIFO order.
async fn splash_lane(mut rx: mpsc::UnboundedReceiver<FireEvent>, delivery: Delivery) {
    while let Some(event) = rx.recv().await {
        // Re-check: the scheduler may have stopped while this was queued.
        if delivery.admitted(&event).await {
            let window = Duration::from_secs(event.notification.display_seconds);
            let started = Instant::now();
            if delivery.deliver(&event).await {
                let shown = started.elapsed();
                if shown < window {
                    tokio::time::sleep(window - shown).await;
                }
            }
        }
        if let Some(id) = event.rule_id() {
            delivery.pending.lock().await.remove(id);
        }
    }
}
