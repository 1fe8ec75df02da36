//! Console presenter: prints notifications to the terminal.

use std::io::Write;
use std::time::Duration;

use splash_core::error::Result;
use splash_scheduler::{Notification, Presenter, RenderMode};

/// Prints each notification; a splash holds the caller for its display time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn present(&self, notification: &Notification) -> Result<()> {
        let mut out = std::io::stdout().lock();
        if notification.play_sound {
            write!(out, "\x07")?;
        }
        writeln!(out, "{}", render(notification))?;
        out.flush()?;
        drop(out);

        if notification.mode == RenderMode::Splash {
            std::thread::sleep(Duration::from_secs(notification.display_seconds));
        }
        Ok(())
    }
}

/// Boxed text block for one notification.
pub fn render(n: &Notification) -> String {
    let time = n.fired_at.format("%H:%M:%S");
    match n.mode {
        RenderMode::Splash => {
            let width = n.message.chars().count().max(20) + 4;
            let bar = "═".repeat(width);
            format!(
                "╔{bar}╗\n║  {:<w$}  ║\n╚{bar}╝\n   🔔 {time}  {}  ({}s)",
                n.message,
                n.color,
                n.display_seconds,
                w = width - 4
            )
        }
        RenderMode::Popup => format!("💬 [{time}] {}  {}", n.message, n.color),
    }
}
