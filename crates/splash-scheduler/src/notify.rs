//! Notification values handed to the presentation layer, plus a small
//! delivery history (in-memory ring buffer, no persistence).

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use splash_core::model::{DisplayType, Rule, RuleKind, Settings};

/// Max notifications kept in history.
const HISTORY_LIMIT: usize = 100;

/// Surface a notification is rendered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// Full-screen, blocking for `display_seconds`. At most one at a time.
    Splash,
    /// Small, non-blocking corner window.
    Popup,
}

impl RenderMode {
    /// Popup when the rule asks for one or the scheduler is paused.
    pub fn resolve(display_type: DisplayType, paused: bool) -> Self {
        if paused || display_type == DisplayType::Popup {
            RenderMode::Popup
        } else {
            RenderMode::Splash
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Splash => write!(f, "splash"),
            RenderMode::Popup => write!(f, "popup"),
        }
    }
}

/// Everything the presenter needs to show one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub color: String,
    pub mode: RenderMode,
    pub display_seconds: u64,
    pub font_size: u32,
    pub play_sound: bool,
    /// Rule id, or `"startup"`.
    pub source: String,
    pub fired_at: NaiveDateTime,
}

impl Notification {
    /// Build the notification for a rule firing at `now`. Motivation rules
    /// draw their message from the pool here.
    pub fn for_rule(rule: &Rule, settings: &Settings, paused: bool, now: NaiveDateTime) -> Self {
        let message = match &rule.kind {
            RuleKind::Motivation { pool, .. } => pool
                .choose(&mut rand::thread_rng())
                .unwrap_or(&rule.message)
                .clone(),
            _ => rule.message.clone(),
        };
        let mode = RenderMode::resolve(rule.display_type, paused);
        Self {
            message,
            color: rule.color.clone(),
            mode,
            display_seconds: seconds_for(mode, settings),
            font_size: settings.font_size,
            play_sound: settings.play_sound,
            source: rule.id.to_string(),
            fired_at: now,
        }
    }

    /// The one-off startup notification; always a popup.
    pub fn startup(settings: &Settings, now: NaiveDateTime) -> Self {
        Self {
            message: settings.startup_message.message.clone(),
            color: settings.startup_message.color.clone(),
            mode: RenderMode::Popup,
            display_seconds: settings.popup_seconds,
            font_size: settings.font_size,
            play_sound: settings.play_sound,
            source: "startup".into(),
            fired_at: now,
        }
    }
}

fn seconds_for(mode: RenderMode, settings: &Settings) -> u64 {
    match mode {
        RenderMode::Splash => settings.display_seconds,
        RenderMode::Popup => settings.popup_seconds,
    }
}

/// Delivered notifications, newest last.
#[derive(Debug, Default)]
pub struct NotifyHistory {
    entries: VecDeque<Notification>,
}

impl NotifyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, notification: Notification) {
        self.entries.push_back(notification);
        if self.entries.len() > HISTORY_LIMIT {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
