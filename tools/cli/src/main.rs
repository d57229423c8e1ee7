//! Curio CLI - Command line interface for encrypted catalog databases.
//!
//! This tool creates databases and runs the maintenance operations
//! (password rotation, repair, backup) against them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use curio_db::{
    CreateOutcome, DatabaseSession, DatabaseSettings, ItemFilters, UnlockOutcome,
};

#[derive(Parser)]
#[command(name = "curio")]
#[command(about = "Curio - Encrypted catalog database management")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new database.
    Create {
        /// Database name (becomes the directory name).
        #[arg(short, long)]
        name: String,

        /// Parent directory for the new database.
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Show database information.
    Info {
        /// Path to the database.
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Re-encrypt the database under a new password.
    RotatePassword {
        /// Path to the database.
        #[arg(short, long)]
        path: PathBuf,

        /// Remove the rollback copy of the previous database on success.
        #[arg(long)]
        purge_rollback: bool,
    },

    /// Drop unreadable lines from the collection files.
    Repair {
        /// Path to the database.
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Snapshot the collection files into the backup directory.
    Backup {
        /// Path to the database.
        #[arg(short, long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Create { name, path } => cmd_create(&name, &path).await,

        Commands::Info { path } => cmd_info(&path).await,

        Commands::RotatePassword {
            path,
            purge_rollback,
        } => cmd_rotate_password(&path, purge_rollback).await,

        Commands::Repair { path } => cmd_repair(&path).await,

        Commands::Backup { path } => cmd_backup(&path).await,
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Unlock the database at `path`.
async fn unlock(path: &Path) -> Result<DatabaseSession> {
    let password = prompt_password("Enter password: ")?;
    match curio_db::unlock(path, &password)
        .await
        .context("Failed to unlock database")?
    {
        UnlockOutcome::Unlocked(session) => Ok(session),
        UnlockOutcome::DbNotExists => {
            anyhow::bail!("No database found at {}", path.display())
        }
    }
}

/// Create a new database.
async fn cmd_create(name: &str, path: &Path) -> Result<()> {
    info!("Creating new database: {}", name);

    let password = prompt_password("Enter password: ")?;
    let confirm = prompt_password("Confirm password: ")?;

    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let outcome = curio_db::create(path, name, &password, DatabaseSettings::default())
        .await
        .context("Failed to create database")?;

    match outcome {
        CreateOutcome::Created(session) => {
            println!("Database created successfully!");
            println!("  Location: {}", session.root().display());
            Ok(())
        }
        CreateOutcome::PathNotExists => anyhow::bail!("Path does not exist"),
        CreateOutcome::PathNotDirectory => anyhow::bail!("Path is not a directory"),
        CreateOutcome::PathNotWritable => anyhow::bail!("Path is not writable"),
        CreateOutcome::NameAlreadyExists => {
            anyhow::bail!("A directory named '{name}' already exists there")
        }
    }
}

/// Show database information.
async fn cmd_info(path: &Path) -> Result<()> {
    let session = unlock(path).await?;

    let items = session.items().await?.count(&ItemFilters::default()).await?;
    let archived = session
        .items()
        .await?
        .count(&ItemFilters {
            archived: true,
            ..ItemFilters::default()
        })
        .await?;
    let tags = session.tags().await?.find_all().await?.len();
    let categories = session.categories().await?.find_all().await?.len();
    let settings = session.settings().await;

    println!("Database: {}", path.display());
    println!("  Items: {} ({} archived)", items, archived);
    println!("  Tags: {}", tags);
    println!("  Categories: {}", categories);
    println!("  Image quality: {}", settings.image_quality);

    Ok(())
}

/// Re-encrypt the database under a new password.
async fn cmd_rotate_password(path: &Path, purge_rollback: bool) -> Result<()> {
    let session = unlock(path).await?;

    let new_password = prompt_password("Enter new password: ")?;
    let confirm = prompt_password("Confirm new password: ")?;

    if new_password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    if new_password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let mut last = 0u8;
    let report = curio_db::rotate_password(&session, &new_password, |percent| {
        if percent != last {
            println!("  {percent}%");
            last = percent;
        }
    })
    .await
    .context("Password rotation failed; the database is unchanged")?;
    drop(session);

    println!("Password changed successfully!");
    println!(
        "  Re-encrypted: {} items, {} tags, {} categories",
        report.items, report.tags, report.categories
    );

    if purge_rollback {
        curio_db::purge_rollback(path).await?;
        println!("  Rollback copy removed");
    } else {
        println!(
            "  Previous database kept at {}",
            curio_db::rotation::rollback_dir(path).display()
        );
    }

    Ok(())
}

/// Repair the collection files.
async fn cmd_repair(path: &Path) -> Result<()> {
    let session = unlock(path).await?;

    let report = curio_db::repair(&session).await.context("Repair failed")?;

    if report.removed == 0 {
        println!("All {} lines are readable.", report.total);
    } else {
        println!(
            "Dropped {} unreadable lines out of {}.",
            report.removed, report.total
        );
    }

    Ok(())
}

/// Snapshot the collection files.
async fn cmd_backup(path: &Path) -> Result<()> {
    let session = unlock(path).await?;

    let snapshot = curio_db::create_backup(&session)
        .await
        .context("Backup failed")?;

    println!("Backup created: {}", snapshot.display());
    Ok(())
}
