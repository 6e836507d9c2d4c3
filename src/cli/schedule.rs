//! Schedule CLI command
//!
//! Runs the backup scheduler in the foreground until stdin is closed or the
//! user presses Enter.

use std::io::BufRead;

use crate::backup::BackupManager;
use crate::config::Settings;
use crate::error::{InvoicerError, InvoicerResult};

/// Handle `invoicer schedule [--cron EXPR]`
pub fn handle_schedule_command(
    manager: &BackupManager,
    settings: &Settings,
    cron: Option<String>,
) -> InvoicerResult<()> {
    let expression = cron.unwrap_or_else(|| settings.backup_schedule.clone());
    if expression.trim().is_empty() {
        println!("No backup schedule configured.");
        println!("Set \"backup_schedule\" in config.json or pass --cron \"0 2 * * *\".");
        return Ok(());
    }

    let scheduler = manager.scheduler();
    scheduler.start(&expression)?;

    println!("Backup schedule: {}", expression.trim());
    if let Some(next) = scheduler.next_run() {
        println!("Next backup:     {}", next.format("%Y-%m-%d %H:%M:%S %Z"));
    }
    println!("Backups go to:   {}", manager.backup_dir().display());
    println!();
    println!("Press Enter to stop.");

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line);
    scheduler.stop();

    read.map_err(|e| InvoicerError::Io(format!("Failed to read stdin: {}", e)))?;
    println!("Scheduler stopped.");
    Ok(())
}
