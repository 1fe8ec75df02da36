//! # Splash Reminders
//!
//! Background reminder scheduler: interval, daily and motivation reminders
//! shown as full-screen splashes or mini popups.
//!
//! Usage:
//!   splash-reminders                      # Run with ~/.splash-reminders/config.json
//!   splash-reminders -c ./config.toml run # Custom config
//!   splash-reminders check                # Validate config, show next fires
//!   splash-reminders init --force         # Rewrite the default config

mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use splash_core::{ReminderConfig, RuleModel};
use splash_scheduler::{Scheduler, SchedulerEngine, SchedulerStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::console::ConsolePresenter;

#[derive(Parser)]
#[command(
    name = "splash-reminders",
    version,
    about = "🔔 Splash Reminders: background reminder scheduler"
)]
struct Cli {
    /// Config file (.json or .toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler (default)
    Run,
    /// Validate the config and print when each rule fires next
    Check,
    /// Write the default config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "splash_reminders=debug,splash_scheduler=debug,splash_core=debug"
    } else {
        "splash_reminders=info,splash_scheduler=info,splash_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(ReminderConfig::default_path);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config_path).await,
        Command::Check => check(&config_path),
        Command::Init { force } => init(&config_path, force),
    }
}

/// Parse the file into a model, logging how many entries were dropped.
fn load_model(path: &Path, create: bool) -> Result<(RuleModel, usize)> {
    let config = if create {
        ReminderConfig::load_or_init(path)?
    } else {
        ReminderConfig::load_from(path)?
    };
    let (model, skipped) = config.to_model();
    if !skipped.is_empty() {
        tracing::warn!("⚠️ {} config entr(ies) skipped", skipped.len());
    }
    model.validate()?;
    Ok((model, skipped.len()))
}

async fn run(config_path: &Path) -> Result<()> {
    let (model, _) = load_model(config_path, true)?;

    println!("🔔 Splash Reminders v{}", env!("CARGO_PKG_VERSION"));
    println!("   📄 Config: {}", config_path.display());
    println!("   ⏰ Rules:  {}", model.len());
    println!("   ⌨️  Commands: start stop pause resume toggle reload status quit");
    println!();

    let scheduler = Scheduler::new(model, Arc::new(ConsolePresenter))?;
    scheduler.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        if !control(&scheduler, config_path, line.trim()).await {
                            break;
                        }
                    }
                    // No terminal attached: keep running until Ctrl-C.
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    scheduler.stop().await;
    tracing::info!("👋 Splash Reminders exited");
    Ok(())
}

/// Apply one control command. Returns `false` on quit.
async fn control(scheduler: &Scheduler, config_path: &Path, command: &str) -> bool {
    let outcome = match command {
        "" => Ok(()),
        "start" => scheduler.start().await.map_err(anyhow::Error::from),
        "stop" => {
            if !scheduler.stop().await {
                println!("Scheduler is not running");
            }
            Ok(())
        }
        "pause" => scheduler.pause().await.map_err(anyhow::Error::from),
        "resume" => scheduler.resume().await.map_err(anyhow::Error::from),
        "toggle" => scheduler
            .toggle_pause()
            .await
            .map(|paused| println!("{}", if paused { "⏸️ Paused" } else { "▶️ Resumed" }))
            .map_err(anyhow::Error::from),
        "reload" => reload(scheduler, config_path).await,
        "status" => {
            print_status(&scheduler.status().await);
            Ok(())
        }
        "quit" | "exit" => return false,
        other => {
            println!("Unknown command '{other}'");
            Ok(())
        }
    };
    if let Err(e) = outcome {
        println!("❌ {e}");
    }
    true
}

async fn reload(scheduler: &Scheduler, config_path: &Path) -> Result<()> {
    let (model, _) = load_model(config_path, false)?;
    let summary = scheduler.reload(model).await?;
    println!(
        "🔄 Reloaded: {} kept, {} added, {} removed",
        summary.kept, summary.added, summary.removed
    );
    Ok(())
}

fn check(config_path: &Path) -> Result<()> {
    let (model, skipped) = load_model(config_path, false)?;
    let now = chrono::Local::now().naive_local();
    let mut engine = SchedulerEngine::new(model);
    engine.start(now)?;
    print_status(&engine.status(now));

    if skipped > 0 {
        anyhow::bail!("{skipped} config entr(ies) could not be parsed");
    }
    println!("✅ Config OK");
    Ok(())
}

fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!(
            "⚠️  {} already exists (use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }
    ReminderConfig::default().save_to(config_path)?;
    println!("✅ Default config written to {}", config_path.display());
    Ok(())
}

fn print_status(status: &SchedulerStatus) {
    let state = match (status.running, status.paused) {
        (false, _) => "stopped",
        (true, true) => "paused",
        (true, false) => "running",
    };
    println!(
        "📊 {state} (run {}, tick {}ms, {} rules)",
        status.generation,
        status.tick.as_millis(),
        status.rules.len()
    );
    for rule in &status.rules {
        let next = rule
            .next_due
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "   {:<24} {:<10} next {next}  fired {}×  {}",
            rule.id.as_str(),
            rule.kind,
            rule.fire_count,
            rule.message
        );
    }
}
