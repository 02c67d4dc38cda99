//! Save Keeper - command line entry point
//!
//! Manages snapshots of game save directories from the terminal.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use save_keeper::fs::walker::TreeSummary;
use save_keeper::{utils, Backup, BackupPatch, BackupStore, Config, GameType, NewBackup};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List backups, newest first
    List {
        /// Also show file count and size of each snapshot
        #[arg(long)]
        sizes: bool,
    },

    /// Snapshot the live save directory of a game
    Create {
        /// Game type (defaults to DarkSoulsIII)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        game: Option<GameType>,

        /// Backup name (defaults to a timestamped quick name)
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Replace the live save directory with a backup
    Load {
        id: Uuid,

        /// Confirm that the current live saves will be deleted
        #[arg(long)]
        yes: bool,
    },

    /// Change the name or description of a backup
    Rename {
        id: Uuid,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a backup and its snapshot directory
    Remove { id: Uuid },

    /// Report directories and records that disagree
    Orphans {
        /// Delete untracked directories under the store root
        #[arg(long)]
        sweep: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "Starting save-keeper v{} (store: {})",
        env!("CARGO_PKG_VERSION"),
        config.store.root.display()
    );

    let store = BackupStore::open(config)
        .await
        .context("failed to open backup store")?;

    match args.command {
        Command::List { sizes } => {
            let backups = store.list().await;
            if backups.is_empty() {
                println!("No backups in {}", store.root().display());
            }
            for backup in &backups {
                let usage = if sizes {
                    Some(store.usage(backup.id).await?)
                } else {
                    None
                };
                print_backup(backup, usage.as_ref());
            }
        }

        Command::Create {
            game,
            name,
            description,
        } => {
            let backup = store
                .create(NewBackup {
                    game,
                    name,
                    description,
                })
                .await?;
            println!("Created");
            print_backup(&backup, None);
        }

        Command::Load { id, yes } => {
            let backup = store.get(id).await?;
            if !yes {
                bail!(
                    "loading \"{}\" deletes everything in {}; re-run with --yes to confirm",
                    backup.name,
                    store.live_dir(backup.game).display()
                );
            }
            let backup = store.load(id).await?;
            println!(
                "Restored \"{}\" into {}",
                backup.name,
                store.live_dir(backup.game).display()
            );
        }

        Command::Rename {
            id,
            name,
            description,
        } => {
            let patch = BackupPatch { name, description };
            if patch.is_empty() {
                bail!("nothing to change; pass --name and/or --description");
            }
            let backup = store.rename(id, patch).await?;
            println!("Updated");
            print_backup(&backup, None);
        }

        Command::Remove { id } => {
            let backup = store.remove(id).await?;
            println!("Removed \"{}\"", backup.name);
        }

        Command::Orphans { sweep } => {
            let report = store.orphans().await?;
            for dir in &report.untracked {
                println!("untracked  {}", dir.display());
            }
            for id in &report.dangling {
                println!("dangling   {}", id);
            }
            if report.is_empty() {
                println!("Store is consistent");
            }

            if sweep {
                let removed = store.sweep_orphans().await?;
                println!("Swept {} directories", removed.len());
            }
        }
    }

    Ok(())
}

fn print_backup(backup: &Backup, usage: Option<&TreeSummary>) {
    let stamp = backup.last_update.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    print!("{}  {:<12}  {}  {}", backup.id, backup.game, stamp, backup.name);
    if let Some(usage) = usage {
        print!("  ({} files, {} bytes)", usage.files, usage.bytes);
    }
    println!();
    if !backup.description.is_empty() {
        println!("    {}", backup.description);
    }
}
