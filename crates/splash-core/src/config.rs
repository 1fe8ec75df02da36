//! Splash Reminders configuration file (`config.json`).
//!
//! The on-disk schema is loose (minutes or seconds, time strings, free-form
//! type tokens); [`ReminderConfig::to_model`] turns it into a validated
//! [`RuleModel`] and reports every entry it had to skip.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SplashError};
use crate::model::{
    DEFAULT_COLOR, DisplayType, Rule, RuleModel, Settings, StartupMessage, TimeOfDay,
};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default)]
    pub reminders: Vec<IntervalEntry>,
    #[serde(default)]
    pub scheduled: Vec<ScheduledEntry>,
    #[serde(default)]
    pub motivation: Vec<MotivationEntry>,
    #[serde(default = "default_display_seconds")]
    pub display_seconds: u64,
    #[serde(default = "default_popup_seconds")]
    pub popup_seconds: u64,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "bool_true")]
    pub play_sound: bool,
    #[serde(default)]
    pub startup_message: StartupMessage,
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "bool_true")]
    pub fire_intervals_on_start: bool,
}

fn default_display_seconds() -> u64 { 8 }
fn default_popup_seconds() -> u64 { 5 }
fn default_font_size() -> u32 { 72 }
fn default_tick_millis() -> u64 { 1000 }
fn bool_true() -> bool { true }

/// `reminders[]`: recurring interval reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
}

/// `scheduled[]`: once a day at `time` ("HH:MM[:SS]").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub message: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
}

/// `motivation[]`: once a day at `time` ("HH:MM"), message drawn from `messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotivationEntry {
    pub time: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            reminders: vec![
                IntervalEntry::minutes("Stand Up & Stretch!", 30.0, "#FF6B35"),
                IntervalEntry::minutes("Drink Water - Stay Hydrated!", 20.0, "#4ECDC4"),
            ],
            scheduled: vec![ScheduledEntry {
                message: "Lunch Time!".into(),
                time: "12:00:00".into(),
                color: Some("#E74C3C".into()),
                display_type: None,
            }],
            motivation: Vec::new(),
            display_seconds: default_display_seconds(),
            popup_seconds: default_popup_seconds(),
            font_size: default_font_size(),
            play_sound: true,
            startup_message: StartupMessage::default(),
            tick_millis: default_tick_millis(),
            fire_intervals_on_start: true,
        }
    }
}

impl IntervalEntry {
    fn minutes(message: &str, minutes: f64, color: &str) -> Self {
        Self {
            message: message.into(),
            interval_minutes: Some(minutes),
            interval_seconds: None,
            color: Some(color.into()),
            display_type: None,
        }
    }

    fn period(&self) -> Result<Duration> {
        let secs = match (self.interval_seconds, self.interval_minutes) {
            (Some(s), _) => s,
            (None, Some(m)) => m * 60.0,
            (None, None) => {
                return Err(SplashError::invalid_rule(
                    &self.message,
                    "missing interval_minutes or interval_seconds",
                ));
            }
        };
        if !secs.is_finite() || secs <= 0.0 {
            return Err(SplashError::invalid_rule(
                &self.message,
                format!("interval must be positive, got {secs}s"),
            ));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| SplashError::invalid_rule(&self.message, e.to_string()))
    }
}

fn display_type(raw: &Option<String>) -> Result<DisplayType> {
    raw.as_deref().map_or(Ok(DisplayType::Splash), str::parse)
}

fn color(raw: &Option<String>) -> &str {
    raw.as_deref().unwrap_or(DEFAULT_COLOR)
}

impl ReminderConfig {
    /// Load config from a specific path. `.toml` files are TOML, anything
    /// else is JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SplashError::Config(format!("Failed to read config: {e}")))?;
        let config = if is_toml(path) {
            toml::from_str(&content)
                .map_err(|e| SplashError::Config(format!("Failed to parse config: {e}")))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| SplashError::Config(format!("Failed to parse config: {e}")))?
        };
        Ok(config)
    }

    /// Load config, writing the defaults first when the file doesn't exist.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        tracing::info!("Config file not found, writing defaults to {}", path.display());
        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| SplashError::Config(format!("Failed to serialize config: {e}")))?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default config path (~/.splash-reminders/config.json).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".splash-reminders")
            .join("config.json")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            display_seconds: self.display_seconds,
            popup_seconds: self.popup_seconds,
            font_size: self.font_size,
            play_sound: self.play_sound,
            startup_message: self.startup_message.clone(),
            tick_millis: self.tick_millis,
            fire_intervals_on_start: self.fire_intervals_on_start,
        }
    }

    /// Convert into a rule model. Entries that don't parse are skipped
    /// (and logged); their errors are returned next to the model.
    pub fn to_model(&self) -> (RuleModel, Vec<SplashError>) {
        let mut rules = Vec::new();
        let mut skipped = Vec::new();

        let mut keep = |built: Result<Rule>| match built {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!("Skipping config entry: {e}");
                skipped.push(e);
            }
        };

        for entry in &self.reminders {
            keep(entry.period().and_then(|period| {
                Ok(Rule::interval(&entry.message, period)
                    .with_color(color(&entry.color))
                    .with_display(display_type(&entry.display_type)?))
            }));
        }

        for entry in &self.scheduled {
            keep(TimeOfDay::parse(&entry.time).and_then(|at| {
                Ok(Rule::scheduled(&entry.message, at)
                    .with_color(color(&entry.color))
                    .with_display(display_type(&entry.display_type)?))
            }));
        }

        for entry in &self.motivation {
            keep(parse_motivation_time(&entry.time).and_then(|at| {
                if entry.message.trim().is_empty() && entry.messages.is_empty() {
                    return Err(SplashError::invalid_rule(
                        &entry.time,
                        "motivation entry has no message",
                    ));
                }
                Ok(Rule::motivation(&entry.message, at, entry.messages.clone())
                    .with_color(color(&entry.color))
                    .with_display(display_type(&entry.display_type)?))
            }));
        }

        (RuleModel::new(rules, self.settings()), skipped)
    }
}

/// Motivation slots are minute-granular; seconds are dropped.
fn parse_motivation_time(raw: &str) -> Result<TimeOfDay> {
    let at = TimeOfDay::parse(raw)?;
    TimeOfDay::new(at.hour, at.minute, 0)
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
