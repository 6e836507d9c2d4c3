//! Backup CLI commands
//!
//! Implements CLI commands for backup management.

use clap::Subcommand;

use crate::backup::{BackupArchive, BackupManager, RestoreOutcome};
use crate::error::{InvoicerError, InvoicerResult};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create,

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Restore from a backup
    Restore {
        /// Backup filename (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup filename (use 'latest' for most recent)
        backup: String,
    },

    /// Delete a backup
    Delete {
        /// Backup filename
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(manager: &BackupManager, cmd: BackupCommands) -> InvoicerResult<()> {
    match cmd {
        BackupCommands::Create => {
            println!("Creating backup...");
            let archive = manager.create_backup()?;
            println!("Backup created: {}", archive.filename);
            println!("Location: {}", archive.path.display());
            println!("Size: {}", format_size(archive.size_bytes));
        }

        BackupCommands::List { verbose } => {
            let backups = manager.list_backups()?;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: invoicer backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(backup.created_at);
                let age_str = format_duration(age);

                if verbose {
                    println!(
                        "{}. {}\n   Created: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        backup.filename,
                        backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        format_size(backup.size_bytes),
                        age_str,
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {})",
                        i + 1,
                        backup.filename,
                        age_str,
                        format_size(backup.size_bytes),
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
            println!("Directory: {}", manager.backup_dir().display());
        }

        BackupCommands::Restore { backup, force } => {
            let archive = resolve_backup(manager, &backup)?;
            let contents = manager.inspect_backup(&archive.filename)?;

            println!("Backup Information");
            println!("==================");
            println!("File: {}", archive.path.display());
            println!(
                "Created: {}",
                archive.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "Status: {}",
                if contents.is_restorable() {
                    "Restorable"
                } else {
                    "Missing database"
                }
            );
            println!();

            if !force {
                println!("WARNING: This will overwrite the current database and assets!");
                println!("To proceed, run again with --force flag:");
                println!("  invoicer backup restore {} --force", backup);
                return Ok(());
            }

            println!("Restoring from backup...");
            match manager.restore_backup(&archive.filename)? {
                RestoreOutcome::Success(report) => {
                    println!("Restore complete!");
                    println!("{}", report.summary());
                    if let Some(copy) = report.safety_copy {
                        println!("Previous database saved to: {}", copy.display());
                    }
                }
                RestoreOutcome::Partial {
                    stage,
                    reason,
                    safety_copy,
                } => {
                    println!("Restore stopped during {}.", stage);
                    match safety_copy {
                        Some(copy) => {
                            println!("The previous database is preserved at: {}", copy.display())
                        }
                        None => println!("No copy of the previous database could be taken."),
                    }
                    return Err(InvoicerError::Io(format!(
                        "Restore incomplete at {}: {}",
                        stage, reason
                    )));
                }
            }
        }

        BackupCommands::Info { backup } => {
            let archive = resolve_backup(manager, &backup)?;
            let contents = manager.inspect_backup(&archive.filename)?;

            println!("Backup Details");
            println!("==============");
            println!("File: {}", archive.path.display());
            println!("Size: {}", format_size(archive.size_bytes));
            println!(
                "Created: {}",
                archive.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!();
            println!("Contents:");
            println!(
                "  Database: {}",
                if contents.has_database {
                    format_size(contents.database_size)
                } else {
                    "missing".to_string()
                }
            );
            println!("  Images:   {} file(s)", contents.image_files);
            println!("  PDFs:     {} file(s)", contents.pdf_files);
            println!();
            println!(
                "Status: {}",
                if contents.is_restorable() {
                    "Restorable"
                } else {
                    "Not restorable"
                }
            );
        }

        BackupCommands::Delete { backup, force } => {
            let archive = manager.get_backup(&backup)?;

            if !force {
                println!(
                    "This will permanently delete {} ({}).",
                    archive.filename,
                    format_size(archive.size_bytes)
                );
                println!("To proceed, run again with --force flag:");
                println!("  invoicer backup delete {} --force", backup);
                return Ok(());
            }

            manager.delete_backup(&archive.filename)?;
            println!("Deleted backup: {}", archive.filename);
        }
    }

    Ok(())
}

/// Resolve a backup identifier to a cataloged archive
fn resolve_backup(manager: &BackupManager, backup: &str) -> InvoicerResult<BackupArchive> {
    // Handle "latest" keyword
    if backup.eq_ignore_ascii_case("latest") {
        return manager
            .get_latest_backup()?
            .ok_or_else(|| InvoicerError::backup_not_found("latest"));
    }

    manager.get_backup(backup)
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
