//! StorageKit demo binary
//!
//! Creates entities on a background context, moves them to the main context
//! through the transfer protocol and prints what arrived.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use storagekit::config::{ConfigLoader, StorageKitConfig, StoreType};
use storagekit::entity::{fields, Entity, Record};
use storagekit::logging::init_logging;
use storagekit::{BackendKind, StorageError, StorageExt};
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "storagekit")]
#[command(about = "Move entities between thread-confined storage sessions")]
struct Cli {
    /// Configuration file (defaults to the layered workspace configuration)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend: isolated or hierarchical
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Use a temporary in-memory store
    #[arg(long, default_value = "false")]
    memory: bool,

    /// Number of entities to create
    #[arg(long, default_value = "3")]
    count: usize,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(Some(&config.logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    match run(&config, cli.count).await {
        Ok(records) => {
            info!(count = records.len(), "Transfer completed");
            for record in records {
                println!("{} {:?}", record.key, record.fields);
            }
        }
        Err(e) => {
            error!("Demo failed: {}", e);
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

/// Precedence: CLI flags override config file override defaults.
fn build_config(cli: &Cli) -> anyhow::Result<StorageKitConfig> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(&std::env::current_dir()?)?,
    };

    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if cli.memory {
        config.storage.store_type = StoreType::Memory;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}

async fn run(config: &StorageKitConfig, count: usize) -> anyhow::Result<Vec<Record>> {
    let storage = storagekit::open(config)?;
    let main = storage
        .main_context()
        .ok_or_else(|| anyhow::anyhow!("Storage has no main context"))?;
    let mut save_failures = storage.subscribe_save_failures();

    let (tx, mut rx) = mpsc::unbounded_channel::<Result<Vec<Record>, StorageError>>();
    let task_storage = storage.clone();
    storage.perform_background(move |context| {
        let created: Result<Vec<Entity>, StorageError> = (0..count)
            .map(|index| {
                context.create(
                    "Item",
                    fields([("index", index as i64)]),
                )
            })
            .collect::<Result<_, _>>()
            .and_then(|entities| context.save().map(|_| entities));

        let entities = match created {
            Ok(entities) => entities,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };

        let completion_tx = tx.clone();
        let started = task_storage.get_thread_safe_entities(
            &main,
            &context,
            entities,
            move |moved: Vec<Entity>| {
                let records = moved.iter().map(Entity::snapshot).collect();
                let _ = completion_tx.send(records);
            },
        );
        if let Err(e) = started {
            let _ = tx.send(Err(e));
        }
    })?;

    let records = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Transfer finished without a result"))??;

    if config.storage.backend == BackendKind::Hierarchical {
        // Give the propagated root save a moment to report.
        if let Ok(Ok(failure)) =
            tokio::time::timeout(Duration::from_millis(200), save_failures.recv()).await
        {
            error!(context = %failure.context, "Root save failed: {}", failure.message);
        }
    }

    Ok(records)
}
