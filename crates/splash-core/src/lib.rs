//! # Splash Core
//!
//! Shared types for Splash Reminders: the rule model handed to the
//! scheduler, the error taxonomy, and the `config.json` loader that turns a
//! loosely-typed file into a validated model.

pub mod config;
pub mod error;
pub mod model;

pub use config::ReminderConfig;
pub use error::{Result, SplashError};
pub use model::{DisplayType, Rule, RuleId, RuleKind, RuleModel, Settings, StartupMessage, TimeOfDay};
