//! hoard binary - composition root.
//!
//! 1. Load configuration (file, then env and CLI overrides)
//! 2. Restore the local database from the backup channel if needed
//! 3. Bootstrap the storage tiers
//! 4. Start the backup loop
//! 5. Index messages fed on stdin until EOF or Ctrl-C
//!
//! The other subcommands run one storage or backup operation and exit.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;

use hoard_backup::{BackupChannel, BackupController, DirectoryChannel, RestoreOutcome};
use hoard_core::config::HoardConfig;
use hoard_core::types::MessageRecord;
use hoard_storage::ingest::DEFAULT_QUEUE_CAPACITY;
use hoard_storage::{IngestHook, TierManager};

use cli::{CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Backup controller over the configured channel, if one is configured.
fn backup_controller(config: &HoardConfig) -> Option<BackupController> {
    let dir = config.backup.channel_dir.as_ref()?;
    let channel: Arc<dyn BackupChannel> = Arc::new(DirectoryChannel::new(dir));
    Some(BackupController::new(
        channel,
        PathBuf::from(&config.storage.db_path),
        config.backup.clone(),
    ))
}

async fn restore_if_needed(config: &HoardConfig) -> Option<RestoreOutcome> {
    match backup_controller(config) {
        Some(controller) => Some(controller.restore().await),
        None => {
            tracing::debug!("No backup channel configured, skipping restore");
            None
        }
    }
}

/// Long-running mode: restore, bootstrap, back up periodically, index stdin.
async fn run(config: HoardConfig) -> AppResult<()> {
    restore_if_needed(&config).await;

    let manager = TierManager::bootstrap(&config.storage).await?;

    let backup = match backup_controller(&config) {
        Some(controller) if config.backup.enabled => {
            let controller =
                Arc::new(controller.with_database(Arc::clone(manager.database())));
            let task = tokio::spawn({
                let controller = Arc::clone(&controller);
                async move { controller.run().await }
            });
            Some((controller, task))
        }
        Some(_) => {
            tracing::info!("Backup loop disabled in config");
            None
        }
        None => None,
    };

    let (hook, worker) = IngestHook::spawn(
        Arc::new(manager.message_index()),
        DEFAULT_QUEUE_CAPACITY,
    );

    tracing::info!("Reading message records from stdin");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MessageRecord>(&line) {
            Ok(record) => {
                hook.observe(record);
            }
            Err(e) => tracing::warn!(error = %e, "Skipping malformed message record"),
        }
    }

    drop(hook);
    let indexed = worker.await?;
    tracing::info!(indexed, "Ingestion finished");

    if let Some((controller, task)) = backup {
        controller.shutdown();
        task.await?;
    }
    Ok(())
}

async fn execute(command: Command, config: HoardConfig) -> AppResult<()> {
    match command {
        Command::Run => run(config).await,
        Command::Get { collection, key } => {
            let manager = TierManager::bootstrap(&config.storage).await?;
            match manager.fetch(&collection, &key).await? {
                Some(value) => {
                    println!("{}", value);
                    Ok(())
                }
                None => Err(format!("{}/{} not found", collection, key).into()),
            }
        }
        Command::Set {
            collection,
            key,
            value,
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let manager = TierManager::bootstrap(&config.storage).await?;
            manager.set(&collection, &key, &value).await?;
            Ok(())
        }
        Command::Delete { collection, key } => {
            let manager = TierManager::bootstrap(&config.storage).await?;
            manager.delete(&collection, &key).await?;
            Ok(())
        }
        Command::Search { query, limit, raw } => {
            let manager = TierManager::bootstrap(&config.storage).await?;
            let index = manager.message_index();
            let limit = limit.unwrap_or(config.search.default_limit);
            let hits = if raw {
                index.search_raw(&query, limit)?
            } else {
                index.search(&query, limit)?
            };
            for hit in hits {
                println!("{}", serde_json::to_string(&hit)?);
            }
            Ok(())
        }
        Command::WipeIndex => {
            let manager = TierManager::bootstrap(&config.storage).await?;
            let removed = manager.message_index().wipe()?;
            println!("{} messages removed", removed);
            Ok(())
        }
        Command::Backup => {
            let controller = backup_controller(&config)
                .ok_or("no backup channel configured (set backup.channel_dir)")?;
            let manager = TierManager::bootstrap(&config.storage).await?;
            let controller = controller.with_database(Arc::clone(manager.database()));
            match controller.backup_now().await? {
                Some(document) => println!("{}", document.id),
                None => println!("no local database to back up"),
            }
            Ok(())
        }
        Command::Restore => match restore_if_needed(&config).await {
            Some(RestoreOutcome::Failed(e)) => Err(format!("restore failed: {}", e).into()),
            Some(outcome) => {
                println!("{:?}", outcome);
                Ok(())
            }
            None => Err("no backup channel configured (set backup.channel_dir)".into()),
        },
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config is read before tracing is up, so load errors are reported below.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = if config_file.exists() {
        match HoardConfig::load(&config_file) {
            Ok(config) => (config, None),
            Err(e) => (HoardConfig::default(), Some(e)),
        }
    } else {
        (HoardConfig::default(), None)
    };
    args.apply_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting hoard v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::debug!(path = %config_file.display(), "Configuration resolved"),
    }

    execute(args.command.clone().unwrap_or(Command::Run), config).await
}
