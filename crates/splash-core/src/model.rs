//! Rule model: immutable description of every reminder rule plus global
//! display settings. A new `RuleModel` is built on every config load.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SplashError};

/// Default accent color for rules that don't set one.
pub const DEFAULT_COLOR: &str = "#3498DB";

/// Smallest poll tick the scheduler will run at.
pub const MIN_TICK: Duration = Duration::from_millis(100);

/// Stable structural identity of a rule: same kind + params + message
/// always yields the same id, across reloads and restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(String);

impl RuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn derive(tag: &str, fingerprint: &str) -> Self {
        let digest = format!("{:x}", Sha256::digest(fingerprint.as_bytes()));
        Self(format!("{tag}-{}", &digest[..12]))
    }

    fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}#{n}", self.0))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a rule wants to be shown when not paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    /// Full-screen, time-boxed overlay.
    #[default]
    Splash,
    /// Small corner notification.
    Popup,
}

impl std::str::FromStr for DisplayType {
    type Err = SplashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "splash" => Ok(Self::Splash),
            "popup" | "mini" => Ok(Self::Popup),
            other => Err(SplashError::Config(format!(
                "unknown display type '{other}' (expected splash or popup)"
            ))),
        }
    }
}

/// Wall-clock time of day. Fields are public so a malformed value can reach
/// the scheduler, which skips it at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<Self> {
        let t = Self { hour, minute, second };
        if !t.is_valid() {
            return Err(SplashError::Config(format!("time {t} out of range")));
        }
        Ok(t)
    }

    /// Parse `HH:MM` or `HH:MM:SS`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(SplashError::Config(format!(
                "invalid time '{s}' (expected HH:MM or HH:MM:SS)"
            )));
        }
        let field = |p: &str| -> Result<u32> {
            p.parse()
                .map_err(|_| SplashError::Config(format!("invalid time '{s}'")))
        };
        let hour = field(parts[0])?;
        let minute = field(parts[1])?;
        let second = match parts.get(2) {
            Some(p) => field(p)?,
            None => 0,
        };
        Self::new(hour, minute, second)
    }

    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.second < 60
    }

    pub fn to_naive(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Trigger kind with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Recurring, every `period` since its anchor.
    Interval { period: Duration },
    /// Once per calendar day at a wall-clock time.
    Scheduled { at: TimeOfDay },
    /// Once per calendar day; the message is drawn from `pool` when non-empty.
    Motivation { at: TimeOfDay, pool: Vec<String> },
}

impl RuleKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RuleKind::Interval { .. } => "interval",
            RuleKind::Scheduled { .. } => "scheduled",
            RuleKind::Motivation { .. } => "motivation",
        }
    }
}

/// One trigger definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub message: String,
    /// Opaque display token, passed through to the presenter.
    pub color: String,
    pub display_type: DisplayType,
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(message: &str, kind: RuleKind) -> Self {
        let mut rule = Self {
            id: RuleId(String::new()),
            message: message.to_string(),
            color: DEFAULT_COLOR.to_string(),
            display_type: DisplayType::Splash,
            kind,
        };
        rule.id = RuleId::derive(rule.kind.tag(), &rule.fingerprint());
        rule
    }

    pub fn interval(message: &str, period: Duration) -> Self {
        Self::new(message, RuleKind::Interval { period })
    }

    pub fn scheduled(message: &str, at: TimeOfDay) -> Self {
        Self::new(message, RuleKind::Scheduled { at })
    }

    pub fn motivation(message: &str, at: TimeOfDay, pool: Vec<String>) -> Self {
        Self::new(message, RuleKind::Motivation { at, pool })
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }

    pub fn with_display(mut self, display_type: DisplayType) -> Self {
        self.display_type = display_type;
        self
    }

    /// Canonical text of kind + params + message. Color and display type
    /// are not part of it.
    pub fn fingerprint(&self) -> String {
        match &self.kind {
            RuleKind::Interval { period } => {
                format!("interval|{}|{}", period.as_nanos(), self.message)
            }
            RuleKind::Scheduled { at } => format!("scheduled|{at}|{}", self.message),
            RuleKind::Motivation { at, pool } => {
                format!("motivation|{at}|{}|{}", self.message, pool.join("\u{1f}"))
            }
        }
    }

    /// Check the kind-specific invariants.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            RuleKind::Interval { period } if period.is_zero() => Err(SplashError::invalid_rule(
                &self.message,
                "interval period must be greater than zero",
            )),
            RuleKind::Scheduled { at } | RuleKind::Motivation { at, .. } if !at.is_valid() => Err(
                SplashError::invalid_rule(&self.message, format!("time of day {at} out of range")),
            ),
            _ => Ok(()),
        }
    }
}

/// Optional notification shown once when the scheduler starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupMessage {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_startup_color")]
    pub color: String,
    #[serde(default = "default_startup_text")]
    pub message: String,
}

fn default_startup_color() -> String { "#4ECDC4".into() }
fn default_startup_text() -> String { "Splash Reminders started".into() }

impl Default for StartupMessage {
    fn default() -> Self {
        Self {
            enabled: false,
            color: default_startup_color(),
            message: default_startup_text(),
        }
    }
}

/// Global display + scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub display_seconds: u64,
    pub popup_seconds: u64,
    pub font_size: u32,
    pub play_sound: bool,
    pub startup_message: StartupMessage,
    pub tick_millis: u64,
    /// Interval rules fire on the first tick after start (true) or wait a
    /// full period (false).
    pub fire_intervals_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_seconds: 8,
            popup_seconds: 5,
            font_size: 72,
            play_sound: true,
            startup_message: StartupMessage::default(),
            tick_millis: 1000,
            fire_intervals_on_start: true,
        }
    }
}

/// All rules of one config load plus global settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleModel {
    pub rules: Vec<Rule>,
    pub settings: Settings,
}

impl RuleModel {
    /// Build a model, re-deriving rule ids and disambiguating duplicates
    /// with a `#n` suffix in model order.
    pub fn new(rules: Vec<Rule>, settings: Settings) -> Self {
        let mut seen: HashMap<RuleId, usize> = HashMap::new();
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                let base = RuleId::derive(rule.kind.tag(), &rule.fingerprint());
                let n = seen.entry(base.clone()).or_insert(0);
                *n += 1;
                rule.id = if *n == 1 { base } else { base.with_suffix(*n) };
                rule
            })
            .collect();
        Self { rules, settings }
    }

    /// Validate global settings. Malformed rules are not an error here;
    /// the scheduler skips them individually.
    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if s.display_seconds == 0 || s.display_seconds > 3600 {
            return Err(SplashError::Config(format!(
                "display_seconds must be within 1..=3600, got {}",
                s.display_seconds
            )));
        }
        if s.font_size == 0 {
            return Err(SplashError::Config("font_size must be positive".into()));
        }
        if s.tick_millis < MIN_TICK.as_millis() as u64 {
            return Err(SplashError::Config(format!(
                "tick_millis must be at least {}, got {}",
                MIN_TICK.as_millis(),
                s.tick_millis
            )));
        }
        Ok(())
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Poll tick: configured tick, capped at half the smallest valid
    /// interval period, never below `MIN_TICK`.
    pub fn effective_tick(&self) -> Duration {
        let configured = Duration::from_millis(self.settings.tick_millis);
        let half_period = self
            .rules
            .iter()
            .filter_map(|r| match r.kind {
                RuleKind::Interval { period } if !period.is_zero() => Some(period / 2),
                _ => None,
            })
            .min();
        let tick = half_period.map_or(configured, |h| configured.min(h));
        tick.max(MIN_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> TimeOfDay {
        TimeOfDay::new(h, m, s).unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(TimeOfDay::parse("12:00:00").unwrap(), t(12, 0, 0));
        assert_eq!(TimeOfDay::parse("09:30").unwrap(), t(9, 30, 0));
        assert!(TimeOfDay::parse("24:00").is_err());
        assert!(TimeOfDay::parse("12:60").is_err());
        assert!(TimeOfDay::parse("noon").is_err());
        assert!(TimeOfDay::parse("1:2:3:4").is_err());
    }

    #[test]
    fn test_id_ignores_color_and_display() {
        let a = Rule::interval("Drink water", Duration::from_secs(1200));
        let b = Rule::interval("Drink water", Duration::from_secs(1200))
            .with_color("#FF0000")
            .with_display(DisplayType::Popup);
        assert_eq!(a.id, b.id);
        assert!(a.id.as_str().starts_with("interval-"));
    }

    #[test]
    fn test_id_changes_with_params() {
        let a = Rule::interval("Drink water", Duration::from_secs(1200));
        let b = Rule::interval("Drink water", Duration::from_secs(1800));
        let c = Rule::interval("Stretch", Duration::from_secs(1200));
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
        let s = Rule::scheduled("Lunch", t(12, 0, 0));
        let m = Rule::motivation("Lunch", t(12, 0, 0), vec![]);
        assert_ne!(s.id, m.id);
    }

    #[test]
    fn test_duplicate_rules_get_distinct_ids() {
        let rule = Rule::interval("Blink", Duration::from_secs(60));
        let model = RuleModel::new(vec![rule.clone(), rule.clone()], Settings::default());
        assert_eq!(model.rules[0].id, rule.id);
        assert_eq!(model.rules[1].id.as_str(), format!("{}#2", rule.id));
    }

    #[test]
    fn test_rule_validation() {
        assert!(Rule::interval("zero", Duration::ZERO).validate().is_err());
        let bad_time = TimeOfDay { hour: 25, minute: 0, second: 0 };
        assert!(Rule::scheduled("late", bad_time).validate().is_err());
        assert!(Rule::scheduled("ok", t(23, 59, 59)).validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut model = RuleModel::default();
        assert!(model.validate().is_ok());
        model.settings.display_seconds = 0;
        assert!(model.validate().is_err());
        model.settings.display_seconds = 8;
        model.settings.tick_millis = 10;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_effective_tick() {
        let settings = Settings::default();
        let model = RuleModel::new(
            vec![Rule::interval("fast", Duration::from_millis(600))],
            settings.clone(),
        );
        assert_eq!(model.effective_tick(), Duration::from_millis(300));

        let model = RuleModel::new(
            vec![Rule::interval("very fast", Duration::from_millis(50))],
            settings.clone(),
        );
        assert_eq!(model.effective_tick(), MIN_TICK);

        let model = RuleModel::new(vec![], settings);
        assert_eq!(model.effective_tick(), Duration::from_secs(1));
    }
}
