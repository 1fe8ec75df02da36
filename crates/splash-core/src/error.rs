//! Error types shared by every Splash Reminders crate.

/// All errors surfaced by the rule model, the scheduler and the dispatch gate.
#[derive(Debug, thiserror::Error)]
pub enum SplashError {
    /// Config file could not be read, parsed or validated.
    #[error("Config error: {0}")]
    Config(String),

    /// A single rule is malformed (zero period, out-of-range time).
    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// System time unavailable or moved backwards.
    #[error("Clock error: {0}")]
    Clock(String),

    /// The presentation layer failed to render a notification.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Invalid scheduler state transition (e.g. pause while stopped).
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SplashError {
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SplashError>;
