//! # Splash Scheduler
//!
//! Drift-free reminder scheduling for interval, daily and motivation rules,
//! with a dispatch gate that keeps full-screen splashes from overlapping.
//!
//! ## Architecture
//! ```text
//! Scheduler (control surface: start/stop/pause/resume/reload/status)
//!   └── poll loop (tokio, one tick ≤ half the shortest interval)
//!         └── SchedulerEngine::tick(now)           ← single mutex
//!               ├── clock::is_due(rule, state, now) per rule
//!               └── FireEvent ──▶ DispatchGate
//!                                   ├── splash lane (FIFO, one on screen)
//!                                   └── popups (independent)
//!                                         └── Presenter (blocking pool)
//! ```

pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod notify;
pub mod reload;
pub mod runtime;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{DispatchGate, Presenter};
pub use engine::{FireEvent, FireOrigin, RuleStatus, RunState, SchedulerEngine, SchedulerStatus};
pub use notify::{Notification, NotifyHistory, RenderMode};
pub use reload::ReloadSummary;
pub use runtime::RuleRuntimeState;
pub use service::Scheduler;
