//! Per-rule runtime bookkeeping, kept apart from the static rule definition.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use splash_core::model::{Rule, RuleKind};

/// Mutable tracking for one rule id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleRuntimeState {
    /// When the rule last fired.
    pub last_fired_at: Option<NaiveDateTime>,
    /// Calendar day already consumed by a once-per-day rule.
    pub last_fired_date: Option<NaiveDate>,
    /// Interval rules only: the instant elapsed time is measured from.
    pub anchor: Option<NaiveDateTime>,
    /// How many times this rule has fired in the current run.
    pub fire_count: u32,
}

impl RuleRuntimeState {
    /// Fresh state for a rule when the scheduler starts at `now`.
    ///
    /// Interval rules either fire on the first tick or start counting from
    /// `now`. Daily rules whose time has already passed today are marked as
    /// consumed for today so a late start doesn't burst them out.
    pub fn at_start(rule: &Rule, now: NaiveDateTime, fire_intervals_on_start: bool) -> Self {
        match &rule.kind {
            RuleKind::Interval { .. } if fire_intervals_on_start => Self::default(),
            RuleKind::Interval { .. } => Self {
                anchor: Some(now),
                ..Self::default()
            },
            RuleKind::Scheduled { at } | RuleKind::Motivation { at, .. } => {
                match at.to_naive() {
                    Some(t) if t < now.time() => Self {
                        last_fired_date: Some(now.date()),
                        ..Self::default()
                    },
                    _ => Self::default(),
                }
            }
        }
    }

    /// State for a rule that is new (or changed) in a reload. Interval timers
    /// restart from the reload moment; daily rules lose their fired-today flag.
    pub fn rearmed(rule: &Rule, now: NaiveDateTime) -> Self {
        match rule.kind {
            RuleKind::Interval { .. } => Self {
                anchor: Some(now),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Record a fire at `now`.
    pub(crate) fn fired(&self, now: NaiveDateTime) -> Self {
        Self {
            last_fired_at: Some(now),
            fire_count: self.fire_count.saturating_add(1),
            ..*self
        }
    }

    /// Move the interval anchor back after the wall clock jumped backwards,
    /// so time already elapsed toward the next fire is kept.
    pub(crate) fn shift_back(&mut self, by: TimeDelta) {
        if let Some(anchor) = self.anchor {
            self.anchor = Some(anchor.checked_sub_signed(by).unwrap_or(anchor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splash_core::model::TimeOfDay;
    use std::time::Duration;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 22)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_interval_start_policy() {
        let rule = Rule::interval("Stretch", Duration::from_secs(60));
        assert_eq!(RuleRuntimeState::at_start(&rule, at(9, 0, 0), true).anchor, None);
        assert_eq!(
            RuleRuntimeState::at_start(&rule, at(9, 0, 0), false).anchor,
            Some(at(9, 0, 0))
        );
    }

    #[test]
    fn test_daily_rule_passed_at_start_is_consumed() {
        let rule = Rule::scheduled("Standup", TimeOfDay::new(9, 0, 0).unwrap());
        let late = RuleRuntimeState::at_start(&rule, at(10, 0, 0), true);
        assert_eq!(late.last_fired_date, Some(at(10, 0, 0).date()));
        assert_eq!(late.last_fired_at, None);

        let early = RuleRuntimeState::at_start(&rule, at(8, 59, 50), true);
        assert_eq!(early.last_fired_date, None);
    }

    #[test]
    fn test_rearmed_clears_daily_flag() {
        let rule = Rule::scheduled("Standup", TimeOfDay::new(9, 0, 0).unwrap());
        assert_eq!(RuleRuntimeState::rearmed(&rule, at(10, 0, 0)), RuleRuntimeState::default());
        let rule = Rule::interval("Stretch", Duration::from_secs(60));
        assert_eq!(
            RuleRuntimeState::rearmed(&rule, at(10, 0, 0)).anchor,
            Some(at(10, 0, 0))
        );
    }

    #[test]
    fn test_shift_back() {
        let mut state = RuleRuntimeState {
            anchor: Some(at(10, 0, 0)),
            ..Default::default()
        };
        state.shift_back(TimeDelta::minutes(5));
        assert_eq!(state.anchor, Some(at(9, 55, 0)));
    }
}
