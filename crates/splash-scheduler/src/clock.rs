//! Trigger clock: pure due-ness decisions per trigger kind.
//!
//! `is_due` maps (rule, runtime state, now) to a decision plus the state to
//! commit if the rule fires; `next_due` answers "when will this fire next".
//! Neither touches shared state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use splash_core::error::{Result, SplashError};
use splash_core::model::{Rule, RuleKind};

use crate::runtime::RuleRuntimeState;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(delta) = TimeDelta::from_std(by)
            && let Some(next) = now.checked_add_signed(delta)
        {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Decide whether `rule` is due at `now`. Returns the decision and the state
/// to commit when it fires (the input state unchanged when it doesn't).
pub fn is_due(
    rule: &Rule,
    state: &RuleRuntimeState,
    now: NaiveDateTime,
) -> Result<(bool, RuleRuntimeState)> {
    rule.validate()?;
    match &rule.kind {
        RuleKind::Interval { period } => Ok(interval_due(*period, state, now)),
        RuleKind::Scheduled { at } | RuleKind::Motivation { at, .. } => {
            Ok(daily_due(wall_time(rule, at.to_naive())?, state, now))
        }
    }
}

/// When the rule will next be due, given its state at `now`. Returns `now`
/// for a rule that is already due.
pub fn next_due(
    rule: &Rule,
    state: &RuleRuntimeState,
    now: NaiveDateTime,
) -> Result<NaiveDateTime> {
    rule.validate()?;
    match &rule.kind {
        RuleKind::Interval { period } => {
            let Some(anchor) = state.anchor else {
                return Ok(now);
            };
            let next = TimeDelta::from_std(*period)
                .ok()
                .and_then(|p| anchor.checked_add_signed(p))
                .ok_or_else(|| SplashError::Clock(format!("next fire of '{}' out of range", rule.message)))?;
            Ok(next.max(now))
        }
        RuleKind::Scheduled { at } | RuleKind::Motivation { at, .. } => {
            let at = wall_time(rule, at.to_naive())?;
            let today = now.date();
            if !consumed(state, today) {
                return Ok(today.and_time(at).max(now));
            }
            today
                .succ_opt()
                .map(|d| d.and_time(at))
                .ok_or_else(|| SplashError::Clock("calendar overflow".into()))
        }
    }
}

fn wall_time(rule: &Rule, t: Option<NaiveTime>) -> Result<NaiveTime> {
    t.ok_or_else(|| SplashError::invalid_rule(&rule.message, "time of day out of range"))
}

fn consumed(state: &RuleRuntimeState, today: NaiveDate) -> bool {
    state.last_fired_date.is_some_and(|d| d >= today)
}

/// Due once `period` has elapsed since the anchor; on fire the anchor moves
/// to `now`. A late wake fires once (no catch-up burst) and consecutive fires
/// are at least `period` apart, at most one tick more.
fn interval_due(
    period: Duration,
    state: &RuleRuntimeState,
    now: NaiveDateTime,
) -> (bool, RuleRuntimeState) {
    let due = match state.anchor {
        None => true,
        // Negative elapsed time (clock behind the anchor) is never due.
        Some(anchor) => now
            .signed_duration_since(anchor)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= period),
    };
    if !due {
        return (false, *state);
    }
    (
        true,
        RuleRuntimeState {
            anchor: Some(now),
            ..state.fired(now)
        },
    )
}

/// Due once today's wall time has reached `at` and today isn't consumed yet.
fn daily_due(at: NaiveTime, state: &RuleRuntimeState, now: NaiveDateTime) -> (bool, RuleRuntimeState) {
    let today = now.date();
    if now.time() < at || consumed(state, today) {
        return (false, *state);
    }
    (
        true,
        RuleRuntimeState {
            last_fired_date: Some(today),
            ..state.fired(now)
        },
    )
}
