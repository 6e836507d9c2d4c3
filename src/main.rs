use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use invoicer::backup::BackupManager;
use invoicer::cli::{handle_backup_command, handle_schedule_command, BackupCommands};
use invoicer::config::{paths::ASSET_DIRS, InvoicerPaths, Settings};
use invoicer::db::Database;

#[derive(Parser)]
#[command(
    name = "invoicer",
    author = "Kaylee Beyene",
    version,
    about = "Backup and restore for the Invoicer data store",
    long_about = "Creates, lists, restores and schedules point-in-time backups of the \
                  Invoicer database together with its images and PDFs, while the \
                  application keeps running."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory
    Init,

    /// Show current configuration and paths
    Config,

    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Run scheduled backups in the foreground
    Schedule {
        /// Cron expression overriding the configured schedule
        #[arg(long, env = "INVOICER_BACKUP_SCHEDULE")]
        cron: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = InvoicerPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;
    let paths = paths.with_backup_dir(settings.backup_dir.clone());

    invoicer::logging::init(&settings.log_level);

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing Invoicer at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            for name in ASSET_DIRS {
                std::fs::create_dir_all(paths.asset_dir(name))?;
            }
            Database::open(paths.database_file())?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Run 'invoicer backup create' to take a first backup.");
        }
        Some(Commands::Config) => {
            println!("Invoicer Configuration");
            println!("======================");
            println!("Data directory:   {}", paths.base_dir().display());
            println!("Database:         {}", paths.database_file().display());
            println!("Backup directory: {}", paths.backup_dir().display());
            println!();
            println!("Settings:");
            println!("  Product name:    {}", settings.product_name);
            println!(
                "  Backup schedule: {}",
                if settings.is_schedule_enabled() {
                    settings.backup_schedule.as_str()
                } else {
                    "(disabled)"
                }
            );
            println!("  Log level:       {}", settings.log_level);
        }
        Some(Commands::Backup(cmd)) => {
            let manager = open_manager(&paths, &settings)?;
            handle_backup_command(&manager, cmd)?;
        }
        Some(Commands::Schedule { cron }) => {
            let manager = open_manager(&paths, &settings)?;
            handle_schedule_command(&manager, &settings, cron)?;
        }
        None => {
            println!("Invoicer - backup and restore for the invoicing data store");
            println!();
            println!("Run 'invoicer --help' for usage information.");
        }
    }

    Ok(())
}

fn open_manager(paths: &InvoicerPaths, settings: &Settings) -> Result<BackupManager> {
    if !paths.is_initialized() {
        bail!(
            "No database at {}. Run 'invoicer init' first.",
            paths.database_file().display()
        );
    }

    let db = Arc::new(Database::open(paths.database_file())?);
    Ok(BackupManager::new(paths.clone(), settings, db))
}
