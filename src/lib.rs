// src/lib.rs

pub mod actions;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod notify;
pub mod state;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::actions::listener_for;
use crate::cli::CliArgs;
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::engine::{spawn_ticker, InProgressPoller, Runtime, RuntimeEvent, RuntimeOptions};
use crate::fs::{FileSystem, RealFileSystem};
use crate::notify::{
    FileIdempotentStore, IdempotentStore, MemoryIdempotentStore, RegistryBuilder,
    TransitionListenerRegistry,
};
use crate::state::{now_millis, JobFactory};
use crate::types::IdempotentStorageMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (plus CLI overrides)
/// - listener registry and idempotent store
/// - job factory and poller
/// - ticker (or a single poll with `--once`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(args.config.as_deref())?;
    if let Some(folder) = &args.in_progress {
        cfg.in_progress_folder = folder.clone();
    }
    debug!(?cfg, "effective configuration");

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = build_registry(&cfg, &fs)?;
    let factory = JobFactory::new(Arc::clone(&fs), Arc::new(registry), cfg.timeouts);
    let poller = InProgressPoller::new(Arc::clone(&fs), cfg.in_progress_folder.clone(), factory);

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    let _ticker_handle = if args.once {
        rt_tx
            .send(RuntimeEvent::PollRequested { now: now_millis() })
            .await?;
        None
    } else {
        Some(spawn_ticker(rt_tx.clone(), cfg.poll_period))
    };

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }
    drop(rt_tx);

    info!(
        folder = ?cfg.in_progress_folder,
        poll_period = ?cfg.poll_period,
        once = args.once,
        "watching in-progress folder"
    );

    let options = RuntimeOptions {
        exit_after_first_poll: args.once,
    };
    let poller = Runtime::new(poller, rt_rx, options).run().await?;

    info!(tracked = poller.len(), "docs-finalizer stopped");
    Ok(())
}

/// Build the listener registry described by `cfg`.
///
/// In file mode the idempotent store is opened (and its keys loaded) here.
pub fn build_registry(
    cfg: &ConfigFile,
    fs: &Arc<dyn FileSystem>,
) -> errors::Result<TransitionListenerRegistry> {
    let mut builder = RegistryBuilder::new();
    for rule in &cfg.listeners {
        builder.add(rule.to, listener_for(rule.action, fs));
    }

    if cfg.idempotent {
        let store: Arc<dyn IdempotentStore> = match cfg.idempotent_storage {
            IdempotentStorageMode::Memory => Arc::new(MemoryIdempotentStore::new()),
            IdempotentStorageMode::File => Arc::new(FileIdempotentStore::open_with_capacity(
                Arc::clone(fs),
                &cfg.idempotent_store_path,
                cfg.idempotent_store_capacity,
            )?),
        };
        builder = builder.idempotent(store);
    }

    Ok(builder.build())
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("docs-finalizer dry-run");
    println!("  config.in_progress_folder = {}", cfg.in_progress_folder.display());
    println!("  config.poll_period = {:?}", cfg.poll_period);
    println!("  config.idempotent = {}", cfg.idempotent);
    if cfg.idempotent {
        println!("  config.idempotent_storage = {:?}", cfg.idempotent_storage);
        if cfg.idempotent_storage == IdempotentStorageMode::File {
            println!(
                "  config.idempotent_store_path = {}",
                cfg.idempotent_store_path.display()
            );
            println!(
                "  config.idempotent_store_capacity = {}",
                cfg.idempotent_store_capacity
            );
        }
    }
    println!();

    println!("timeouts (0s = disabled):");
    println!("  document_preparation: {:?}", cfg.timeouts.document_preparation);
    println!("  document_send: {:?}", cfg.timeouts.document_send);
    println!("  inf_response: {:?}", cfg.timeouts.inf_response);
    println!("  bus_response: {:?}", cfg.timeouts.bus_response);
    println!();

    println!("listeners ({}):", cfg.listeners.len());
    for rule in &cfg.listeners {
        println!("  - {} -> {}", rule.to, rule.action);
    }

    debug!("dry-run complete (no polling)");
}
