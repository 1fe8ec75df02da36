//! Scheduler engine: owns all mutable scheduler state and decides, tick by
//! tick, which rules fire.
//!
//! The engine is synchronous and takes `now` as an argument; the polling
//! loop in [`crate::service`] supplies the clock and the lock around it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use splash_core::error::{Result, SplashError};
use splash_core::model::{RuleId, RuleModel};

use crate::clock;
use crate::notify::Notification;
use crate::reload::{self, ReloadSummary};
use crate::runtime::RuleRuntimeState;

/// Scheduler lifecycle: `Stopped → Running ⇄ Paused → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Stopped,
    Running,
    /// Still polling and firing; notifications render as popups.
    Paused,
}

/// Where a fire event came from.
#[derive(Debug, Clone, PartialEq)]
pub enum FireOrigin {
    Startup,
    /// A rule fired; `previous` is restored if delivery fails.
    Rule {
        id: RuleId,
        previous: RuleRuntimeState,
        committed: RuleRuntimeState,
    },
}

/// One notification to deliver, tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct FireEvent {
    pub generation: u64,
    pub origin: FireOrigin,
    pub notification: Notification,
}

impl FireEvent {
    pub fn is_startup(&self) -> bool {
        matches!(self.origin, FireOrigin::Startup)
    }

    /// The rule behind this event; `None` for the startup notification.
    pub fn rule_id(&self) -> Option<&RuleId> {
        match &self.origin {
            FireOrigin::Rule { id, .. } => Some(id),
            FireOrigin::Startup => None,
        }
    }
}

/// Per-rule line of a status report.
#[derive(Debug, Clone, Serialize)]
pub struct RuleStatus {
    pub id: RuleId,
    pub message: String,
    pub kind: &'static str,
    pub fire_count: u32,
    pub last_fired_at: Option<NaiveDateTime>,
    /// `None` for malformed rules.
    pub next_due: Option<NaiveDateTime>,
}

/// Read-only status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub paused: bool,
    pub generation: u64,
    pub tick: Duration,
    pub rules: Vec<RuleStatus>,
}

/// The scheduler state machine.
pub struct SchedulerEngine {
    state: RunState,
    model: Arc<RuleModel>,
    runtime: HashMap<RuleId, RuleRuntimeState>,
    last_tick: Option<NaiveDateTime>,
    generation: u64,
    /// Malformed rules already warned about in this run.
    warned: HashSet<RuleId>,
}

impl SchedulerEngine {
    /// Create a stopped engine with the given model.
    pub fn new(model: RuleModel) -> Self {
        Self {
            state: RunState::Stopped,
            model: Arc::new(model),
            runtime: HashMap::new(),
            last_tick: None,
            generation: 0,
            warned: HashSet::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != RunState::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.state == RunState::Paused
    }

    /// Current run generation; bumped on every start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model(&self) -> Arc<RuleModel> {
        Arc::clone(&self.model)
    }

    /// Poll interval for the active model.
    pub fn tick_interval(&self) -> Duration {
        self.model.effective_tick()
    }

    pub fn runtime_state(&self, id: &RuleId) -> Option<RuleRuntimeState> {
        self.runtime.get(id).copied()
    }

    /// Whether events of `generation` may still be delivered.
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_running() && generation == self.generation
    }

    /// Stopped → Running. Seeds fresh runtime state for every rule and
    /// returns the startup notification, if enabled.
    pub fn start(&mut self, now: NaiveDateTime) -> Result<Vec<FireEvent>> {
        if self.is_running() {
            return Err(SplashError::Scheduler("scheduler is already running".into()));
        }
        self.generation += 1;
        self.state = RunState::Running;
        self.last_tick = None;
        self.warned.clear();

        let fire_on_start = self.model.settings.fire_intervals_on_start;
        self.runtime = self
            .model
            .rules
            .iter()
            .map(|r| (r.id.clone(), RuleRuntimeState::at_start(r, now, fire_on_start)))
            .collect();

        tracing::info!(
            "▶️ Scheduler started: {} rules (generation {})",
            self.model.len(),
            self.generation
        );
        for rule in &self.model.rules {
            tracing::info!("  [{}] {} ({})", rule.kind.tag(), rule.message, rule.id);
        }

        let mut events = Vec::new();
        if self.model.settings.startup_message.enabled {
            events.push(FireEvent {
                generation: self.generation,
                origin: FireOrigin::Startup,
                notification: Notification::startup(&self.model.settings, now),
            });
        }
        Ok(events)
    }

    /// Running|Paused → Stopped. Discards runtime state. Returns whether the
    /// scheduler was running.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = RunState::Stopped;
        self.runtime.clear();
        self.last_tick = None;
        tracing::info!("⏹️ Scheduler stopped");
        true
    }

    /// Running → Paused. Pausing twice is a no-op.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            RunState::Stopped => Err(SplashError::Scheduler("cannot pause: scheduler is stopped".into())),
            RunState::Paused => Ok(()),
            RunState::Running => {
                self.state = RunState::Paused;
                tracing::info!("⏸️ Reminders paused (mini popups)");
                Ok(())
            }
        }
    }

    /// Paused → Running. Resuming while running is a no-op.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            RunState::Stopped => Err(SplashError::Scheduler("cannot resume: scheduler is stopped".into())),
            RunState::Running => Ok(()),
            RunState::Paused => {
                self.state = RunState::Running;
                tracing::info!("▶️ Reminders active (full splash)");
                Ok(())
            }
        }
    }

    /// Flip between paused and running; returns the new paused flag.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        if self.is_paused() {
            self.resume()?;
        } else {
            self.pause()?;
        }
        Ok(self.is_paused())
    }

    /// Swap in a new model. An invalid model leaves the active one untouched.
    pub fn reload(&mut self, model: RuleModel, now: NaiveDateTime) -> Result<ReloadSummary> {
        model.validate()?;
        let summary = if self.is_running() {
            reload::reconcile(&self.model, &model, &mut self.runtime, now)
        } else {
            ReloadSummary {
                added: model.len(),
                removed: self.model.len(),
                kept: 0,
            }
        };
        self.model = Arc::new(model);
        self.warned.clear();
        tracing::info!(
            "🔄 Configuration reloaded: {} kept, {} re-armed, {} removed",
            summary.kept,
            summary.added,
            summary.removed
        );
        Ok(summary)
    }

    /// Evaluate every rule at `now`, commit the state of rules that fire and
    /// return their events in model order.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<FireEvent> {
        if !self.is_running() {
            return Vec::new();
        }

        if let Some(prev) = self.last_tick
            && now < prev
        {
            let jump = prev - now;
            let err = SplashError::Clock(format!(
                "wall clock moved back {}s ({prev} → {now}), skipping tick",
                jump.num_seconds()
            ));
            tracing::warn!("⚠️ {err}");
            for state in self.runtime.values_mut() {
                state.shift_back(jump);
            }
            self.last_tick = Some(now);
            return Vec::new();
        }
        self.last_tick = Some(now);

        let model = Arc::clone(&self.model);
        let paused = self.is_paused();
        let fire_on_start = model.settings.fire_intervals_on_start;
        let mut events = Vec::new();

        for rule in &model.rules {
            let previous = *self
                .runtime
                .entry(rule.id.clone())
                .or_insert_with(|| RuleRuntimeState::at_start(rule, now, fire_on_start));

            let committed = match clock::is_due(rule, &previous, now) {
                Ok((true, committed)) => committed,
                Ok((false, _)) => continue,
                Err(e) => {
                    if self.warned.insert(rule.id.clone()) {
                        tracing::warn!("⚠️ Skipping rule {}: {e}", rule.id);
                    }
                    continue;
                }
            };

            self.runtime.insert(rule.id.clone(), committed);
            let notification = Notification::for_rule(rule, &model.settings, paused, now);
            tracing::info!("🔔 [{}] {} ({})", rule.kind.tag(), notification.message, notification.mode);
            events.push(FireEvent {
                generation: self.generation,
                origin: FireOrigin::Rule {
                    id: rule.id.clone(),
                    previous,
                    committed,
                },
                notification,
            });
        }

        events
    }

    /// Undo the state change of an event whose delivery failed, unless the
    /// rule has fired again since. Returns whether anything was restored.
    pub fn revert(&mut self, event: &FireEvent) -> bool {
        let FireOrigin::Rule { id, previous, committed } = &event.origin else {
            return false;
        };
        if event.generation != self.generation {
            return false;
        }
        match self.runtime.get_mut(id) {
            Some(current) if current == committed => {
                *current = *previous;
                tracing::debug!("↩️ Rolled back runtime state of {id}");
                true
            }
            _ => false,
        }
    }

    /// Status snapshot at `now`.
    pub fn status(&self, now: NaiveDateTime) -> SchedulerStatus {
        let fire_on_start = self.model.settings.fire_intervals_on_start;
        let rules = self
            .model
            .rules
            .iter()
            .map(|rule| {
                let state = self
                    .runtime
                    .get(&rule.id)
                    .copied()
                    .unwrap_or_else(|| RuleRuntimeState::at_start(rule, now, fire_on_start));
                RuleStatus {
                    id: rule.id.clone(),
                    message: rule.message.clone(),
                    kind: rule.kind.tag(),
                    fire_count: state.fire_count,
                    last_fired_at: state.last_fired_at,
                    next_due: clock::next_due(rule, &state, now).ok(),
                }
            })
            .collect();
        SchedulerStatus {
            running: self.is_running(),
            paused: self.is_paused(),
            generation: self.generation,
            tick: self.tick_interval(),
            rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RenderMode;
    use chrono::{NaiveDate, TimeDelta};
    use splash_core::model::{DisplayType, Rule, Settings, TimeOfDay};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 22)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn engine(rules: Vec<Rule>) -> SchedulerEngine {
        SchedulerEngine::new(RuleModel::new(rules, Settings::default()))
    }

    /// Tick once per second over `[from, from + secs]`, returning fire times.
    fn run_ticks(eng: &mut SchedulerEngine, from: NaiveDateTime, secs: i64) -> Vec<NaiveDateTime> {
        let mut fired = Vec::new();
        for s in 0..=secs {
            let now = from + TimeDelta::seconds(s);
            for event in eng.tick(now) {
                fired.push(event.notification.fired_at);
            }
        }
        fired
    }

    #[test]
    fn test_interval_fires_every_period() {
        let mut eng = engine(vec![Rule::interval("Drink", Duration::from_secs(20))]);
        let t0 = at(9, 0, 0);
        eng.start(t0).unwrap();
        let fired = run_ticks(&mut eng, t0, 100);
        let offsets: Vec<i64> = fired.iter().map(|t| (*t - t0).num_seconds()).collect();
        assert_eq!(offsets, vec![0, 20, 40, 60, 80, 100]);
    }

    #[test]
    fn test_interval_jittered_ticks_stay_within_one_tick() {
        let mut eng = engine(vec![Rule::interval("Drink", Duration::from_secs(20))]);
        let t0 = at(9, 0, 0);
        eng.start(t0).unwrap();
        let mut fired = Vec::new();
        let mut now = t0;
        // Ticks land 1000..1050ms apart, like a loop that oversleeps a bit.
        for s in 0..300i64 {
            fired.extend(eng.tick(now).into_iter().map(|e| e.notification.fired_at));
            now += TimeDelta::milliseconds(1000 + (s * 37) % 50);
        }
        assert!(fired.len() >= 13);
        for pair in fired.windows(2) {
            let gap = (pair[1] - pair[0]).num_milliseconds();
            assert!((20_000..21_050).contains(&gap), "gap {gap}ms");
        }
    }

    #[test]
    fn test_interval_waits_when_not_firing_on_start() {
        let settings = Settings {
            fire_intervals_on_start: false,
            ..Settings::default()
        };
        let mut eng = SchedulerEngine::new(RuleModel::new(
            vec![Rule::interval("Drink", Duration::from_secs(20))],
            settings,
        ));
        let t0 = at(9, 0, 0);
        eng.start(t0).unwrap();
        let offsets: Vec<i64> = run_ticks(&mut eng, t0, 45)
            .iter()
            .map(|t| (*t - t0).num_seconds())
            .collect();
        assert_eq!(offsets, vec![20, 40]);
    }

    #[test]
    fn test_scheduled_started_just_before_time() {
        let mut eng = engine(vec![Rule::scheduled("Lunch", TimeOfDay::new(12, 0, 0).unwrap())]);
        let t0 = at(11, 59, 50);
        eng.start(t0).unwrap();
        let fired = run_ticks(&mut eng, t0, 600);
        assert_eq!(fired, vec![at(12, 0, 0)]);
    }

    #[test]
    fn test_scheduled_started_after_time_waits_for_next_day() {
        let mut eng = engine(vec![Rule::scheduled("Standup", TimeOfDay::new(9, 0, 0).unwrap())]);
        let t0 = at(10, 0, 0);
        eng.start(t0).unwrap();
        assert!(run_ticks(&mut eng, t0, 3600).is_empty());

        let next_day = NaiveDate::from_ymd_opt(2026, 2, 23).unwrap();
        assert!(eng.tick(next_day.and_hms_opt(8, 59, 59).unwrap()).is_empty());
        assert_eq!(eng.tick(next_day.and_hms_opt(9, 0, 0).unwrap()).len(), 1);
        assert!(eng.tick(next_day.and_hms_opt(9, 0, 1).unwrap()).is_empty());
    }

    #[test]
    fn test_pause_renders_popup_with_same_state() {
        let rule = Rule::interval("Stretch", Duration::from_secs(30));
        let mut running = engine(vec![rule.clone()]);
        let mut paused = engine(vec![rule.clone()]);
        let t0 = at(9, 0, 0);
        running.start(t0).unwrap();
        paused.start(t0).unwrap();
        paused.pause().unwrap();

        for s in [0, 15, 30, 31, 60] {
            let now = t0 + TimeDelta::seconds(s);
            let a = running.tick(now);
            let b = paused.tick(now);
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(&b) {
                assert_eq!(x.notification.mode, RenderMode::Splash);
                assert_eq!(y.notification.mode, RenderMode::Popup);
            }
            assert_eq!(running.runtime_state(&rule.id), paused.runtime_state(&rule.id));
        }
    }

    #[test]
    fn test_popup_rule_stays_popup_when_running() {
        let rule = Rule::interval("Blink", Duration::from_secs(10)).with_display(DisplayType::Popup);
        let mut eng = engine(vec![rule]);
        eng.start(at(9, 0, 0)).unwrap();
        let events = eng.tick(at(9, 0, 0));
        assert_eq!(events[0].notification.mode, RenderMode::Popup);
    }

    #[test]
    fn test_stopped_engine_never_fires() {
        let mut eng = engine(vec![Rule::interval("Drink", Duration::from_secs(1))]);
        assert!(eng.tick(at(9, 0, 0)).is_empty());
        eng.start(at(9, 0, 0)).unwrap();
        assert_eq!(eng.tick(at(9, 0, 0)).len(), 1);
        assert!(eng.stop());
        assert!(run_ticks(&mut eng, at(9, 0, 1), 30).is_empty());
        assert!(!eng.stop());
    }

    #[test]
    fn test_state_transitions() {
        let mut eng = engine(vec![]);
        assert!(eng.pause().is_err());
        assert!(eng.resume().is_err());
        eng.start(at(9, 0, 0)).unwrap();
        assert!(eng.start(at(9, 0, 0)).is_err());
        assert!(eng.toggle_pause().unwrap());
        assert_eq!(eng.state(), RunState::Paused);
        assert!(!eng.toggle_pause().unwrap());
        eng.stop();
        assert_eq!(eng.state(), RunState::Stopped);
        eng.start(at(9, 0, 0)).unwrap();
        assert_eq!(eng.generation(), 2);
    }

    #[test]
    fn test_restart_discards_state() {
        let rule = Rule::interval("Drink", Duration::from_secs(60));
        let mut eng = engine(vec![rule.clone()]);
        eng.start(at(9, 0, 0)).unwrap();
        eng.tick(at(9, 0, 0));
        eng.stop();
        assert!(eng.runtime_state(&rule.id).is_none());
        eng.start(at(9, 0, 10)).unwrap();
        assert_eq!(eng.tick(at(9, 0, 10)).len(), 1);
    }

    #[test]
    fn test_malformed_rule_is_skipped() {
        let bad = Rule::interval("zero", Duration::ZERO);
        let good = Rule::interval("Drink", Duration::from_secs(20));
        let mut eng = engine(vec![bad, good.clone()]);
        eng.start(at(9, 0, 0)).unwrap();
        for s in 0..3 {
            let events = eng.tick(at(9, 0, s * 20));
            assert_eq!(events.len(), 1);
            assert!(matches!(&events[0].origin, FireOrigin::Rule { id, .. } if *id == good.id));
        }
    }

    #[test]
    fn test_backward_clock_jump_skips_tick() {
        let rule = Rule::interval("Drink", Duration::from_secs(20));
        let mut eng = engine(vec![rule.clone()]);
        eng.start(at(10, 0, 0)).unwrap();
        assert_eq!(eng.tick(at(10, 0, 0)).len(), 1);
        assert!(eng.tick(at(10, 0, 10)).is_empty());
        // Clock corrected back an hour: nothing fires, elapsed 10s is kept.
        assert!(eng.tick(at(9, 0, 10)).is_empty());
        assert!(eng.tick(at(9, 0, 19)).is_empty());
        assert_eq!(eng.tick(at(9, 0, 20)).len(), 1);
    }

    #[test]
    fn test_reload_preserves_unchanged_and_resets_modified() {
        let water = Rule::interval("Water", Duration::from_secs(60));
        let stretch = Rule::interval("Stretch", Duration::from_secs(60));
        let mut eng = engine(vec![water.clone(), stretch.clone()]);
        eng.start(at(9, 0, 0)).unwrap();
        assert_eq!(eng.tick(at(9, 0, 0)).len(), 2);
        let water_state = eng.runtime_state(&water.id).unwrap();

        let stretch2 = Rule::interval("Stretch", Duration::from_secs(90));
        let summary = eng
            .reload(
                RuleModel::new(vec![water.clone(), stretch2.clone()], Settings::default()),
                at(9, 0, 30),
            )
            .unwrap();
        assert_eq!(summary, ReloadSummary { kept: 1, added: 1, removed: 1 });
        assert_eq!(eng.runtime_state(&water.id), Some(water_state));
        assert_eq!(eng.runtime_state(&stretch2.id).unwrap().fire_count, 0);

        // Unchanged water rule doesn't re-fire right after the reload.
        assert!(eng.tick(at(9, 0, 31)).is_empty());
        let fired: Vec<_> = eng
            .tick(at(9, 1, 0))
            .into_iter()
            .map(|e| e.notification.message)
            .collect();
        assert_eq!(fired, vec!["Water".to_string()]);
        // Edited rule restarts from the reload moment: 9:00:30 + 90s.
        let fired: Vec<_> = eng
            .tick(at(9, 2, 0))
            .into_iter()
            .map(|e| e.notification.message)
            .collect();
        assert_eq!(fired, vec!["Water".to_string(), "Stretch".to_string()]);
        assert!(eng.tick(at(9, 2, 1)).is_empty());
    }

    #[test]
    fn test_reload_rearms_daily_rule_already_past_today() {
        let standup = Rule::scheduled("Standup", TimeOfDay::new(9, 0, 0).unwrap());
        let mut eng = engine(vec![standup.clone()]);
        // Started after 9:00: consumed for today, no burst.
        eng.start(at(10, 0, 0)).unwrap();
        assert!(eng.tick(at(10, 0, 0)).is_empty());

        // Unchanged on reload: still consumed.
        eng.reload(RuleModel::new(vec![standup.clone()], Settings::default()), at(10, 0, 5))
            .unwrap();
        assert!(eng.tick(at(10, 0, 6)).is_empty());

        // Added (or edited) on reload with a time already past: re-armed,
        // so it fires once on the next tick and then is consumed.
        let review = Rule::scheduled("Review", TimeOfDay::new(9, 30, 0).unwrap());
        let summary = eng
            .reload(
                RuleModel::new(vec![standup, review.clone()], Settings::default()),
                at(10, 0, 10),
            )
            .unwrap();
        assert_eq!(summary, ReloadSummary { kept: 1, added: 1, removed: 0 });
        let fired: Vec<_> = eng
            .tick(at(10, 0, 11))
            .into_iter()
            .map(|e| e.notification.message)
            .collect();
        assert_eq!(fired, vec!["Review".to_string()]);
        assert!(eng.tick(at(10, 0, 12)).is_empty());
        assert!(eng.tick(at(23, 59, 59)).is_empty());
    }

    #[test]
    fn test_invalid_reload_keeps_model() {
        let rule = Rule::interval("Water", Duration::from_secs(60));
        let mut eng = engine(vec![rule.clone()]);
        eng.start(at(9, 0, 0)).unwrap();
        let settings = Settings {
            display_seconds: 0,
            ..Settings::default()
        };
        assert!(eng.reload(RuleModel::new(vec![], settings), at(9, 0, 1)).is_err());
        assert_eq!(eng.model().len(), 1);
        assert!(eng.runtime_state(&rule.id).is_some());
    }

    #[test]
    fn test_revert_after_failed_delivery() {
        let rule = Rule::interval("Water", Duration::from_secs(60));
        let mut eng = engine(vec![rule.clone()]);
        eng.start(at(9, 0, 0)).unwrap();
        let events = eng.tick(at(9, 0, 0));
        assert!(eng.revert(&events[0]));
        assert_eq!(eng.runtime_state(&rule.id), Some(RuleRuntimeState::default()));
        // Eligible again on the next tick.
        let again = eng.tick(at(9, 0, 1));
        assert_eq!(again.len(), 1);
        // A stale event no longer matches the committed state.
        assert!(!eng.revert(&events[0]));
    }

    #[test]
    fn test_startup_message() {
        let mut settings = Settings::default();
        settings.startup_message.enabled = true;
        let mut eng = SchedulerEngine::new(RuleModel::new(vec![], settings));
        let events = eng.start(at(9, 0, 0)).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_startup());
        assert_eq!(events[0].notification.mode, RenderMode::Popup);
    }

    #[test]
    fn test_status_reports_next_due() {
        let lunch = Rule::scheduled("Lunch", TimeOfDay::new(12, 0, 0).unwrap());
        let mut eng = engine(vec![lunch]);
        eng.start(at(9, 0, 0)).unwrap();
        eng.pause().unwrap();
        let status = eng.status(at(9, 0, 0));
        assert!(status.running);
        assert!(status.paused);
        assert_eq!(status.rules[0].next_due, Some(at(12, 0, 0)));
        assert_eq!(status.rules[0].kind, "scheduled");
    }
}
