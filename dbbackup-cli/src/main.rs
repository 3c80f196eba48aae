/*!
dbbackup CLI - backup, restore and list database backups.

Configuration comes entirely from the environment (DATABASE_URL plus the
DBBACKUP_* variables); the command line only selects the operation. Exits
non-zero on any propagated failure.
*/

use clap::{Parser, Subcommand};
use dbbackup_core::retention::{prune_by_age, prune_by_count};
use dbbackup_core::{
    engine_from_config, resolve_backend, storage_from_config, BackupPipeline, Config,
    StorageSelection,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "dbbackup")]
#[command(about = "Database backup tool for SQLite, PostgreSQL and MySQL")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a database backup
    Backup,
    /// Restore a database from a backup
    Restore {
        /// Specific backup to restore (defaults to the latest)
        name: Option<String>,
    },
    /// List available backups
    List,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::from_env()?;
    debug!(storage = ?config.storage, compress = config.compress, "loaded configuration");

    match cli.command {
        Commands::Backup => cmd_backup(&config),
        Commands::Restore { name } => cmd_restore(&config, name.as_deref()),
        Commands::List => cmd_list(&config),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn cmd_backup(config: &Config) -> Result<(), anyhow::Error> {
    let backend = resolve_backend(config)?;
    let engine = engine_from_config(config)?;
    let storage = storage_from_config(config)?;

    println!("Starting {backend} backup...");
    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
    let artifact = pipeline.run_backup()?;

    if config.retention_days > 0 {
        println!("Purging backups older than {} days...", config.retention_days);
        let deleted = prune_by_age(storage.as_ref(), config.retention_days)?;
        if deleted > 0 {
            println!("Deleted {deleted} expired backup(s)");
        }
    }

    if config.max_backups > 0 {
        println!("Limiting backups to the latest {}...", config.max_backups);
        let deleted = prune_by_count(storage.as_ref(), config.max_backups)?;
        if deleted > 0 {
            println!("Deleted {deleted} surplus backup(s)");
        }
    }

    println!("Backup successful: {artifact}");
    Ok(())
}

fn cmd_restore(config: &Config, name: Option<&str>) -> Result<(), anyhow::Error> {
    let engine = engine_from_config(config)?;
    let storage = storage_from_config(config)?;

    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
    match pipeline.run_restore(name)? {
        Some(artifact) => println!("Restore successful: {artifact}"),
        None => println!("No backups found to restore."),
    }
    Ok(())
}

fn cmd_list(config: &Config) -> Result<(), anyhow::Error> {
    let storage = storage_from_config(config)?;

    let mut names = storage.list()?;
    if names.is_empty() {
        println!("No backups found.");
        return Ok(());
    }

    names.sort_unstable();
    let location = match config.storage {
        StorageSelection::Local => "local",
        StorageSelection::S3 => "s3",
    };
    println!("Backups in {location} storage:");
    for name in names {
        println!(" - {name}");
    }
    Ok(())
}
