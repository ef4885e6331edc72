//! scanlayer: add invisible OCR text layers to scanned PDFs
//!
//! Commands:
//! - `process`: OCR the given files in place
//! - `watch`: watch folders and OCR new PDFs as they appear
//! - `unwatch`: remove folders from the saved watch list
//! - `check`: verify the renderer, OCR engine and font are usable

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanlayer::watcher::{FolderWatcher, Readiness};
use scanlayer::{Config, DocumentPipeline, WatchList};

#[derive(Parser)]
#[command(name = "scanlayer")]
#[command(about = "Make scanned PDFs searchable with an invisible OCR text layer")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR PDF files and update them in place
    Process {
        /// PDF files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Watch folders for new PDFs
    Watch {
        /// Folder to watch (repeatable); defaults to the saved watch list
        #[arg(long = "folder")]
        folders: Vec<PathBuf>,

        /// Keep a copy of each original here before processing
        #[arg(long)]
        backup: Option<PathBuf>,

        /// Add the given folders to the saved watch list
        #[arg(long)]
        save: bool,
    },

    /// Remove folders from the saved watch list
    Unwatch {
        /// Folders to stop watching
        #[arg(required = true)]
        folders: Vec<PathBuf>,
    },

    /// Check that rendering, OCR and the configured font are available
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanlayer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting scanlayer v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Process { files } => process(&config, files).await,
        Command::Watch {
            folders,
            backup,
            save,
        } => watch(&config, folders, backup, save).await,
        Command::Unwatch { folders } => unwatch(&config, folders),
        Command::Check => check(&config).await,
    }
}

async fn process(config: &Config, files: Vec<PathBuf>) -> Result<()> {
    let pipeline = DocumentPipeline::from_config(config)?;

    let mut failed = 0usize;
    for file in &files {
        match pipeline.process_file(file).await {
            Ok(report) if report.is_modified() => tracing::info!(
                "{}: {} of {} pages overlaid, {} words",
                file.display(),
                report.pages_overlaid,
                report.pages_total,
                report.words_placed
            ),
            Ok(_) => tracing::info!("{}: no text found, file unchanged", file.display()),
            Err(e) => {
                failed += 1;
                tracing::error!("OCR failed: {}: {} ({})", e.file_name(), e.short_cause(), e.stage);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, files.len());
    }
    Ok(())
}

async fn watch(
    config: &Config,
    folders: Vec<PathBuf>,
    backup: Option<PathBuf>,
    save: bool,
) -> Result<()> {
    let list_path = &config.watch.watch_list_path;
    let mut list = WatchList::load(list_path);

    let targets = if folders.is_empty() {
        list.clone()
    } else {
        let mut given = WatchList::default();
        for folder in folders {
            given.upsert(folder, backup.clone());
        }
        given
    };

    if save {
        let mut changed = false;
        for folder in &targets.watched_folders {
            changed |= list.upsert(folder.folder_path.clone(), folder.backup_path.clone());
        }
        if changed {
            list.save(list_path)
                .with_context(|| format!("Failed to save watch list {}", list_path.display()))?;
            tracing::info!("Saved watch list to {}", list_path.display());
        }
    }

    if targets.is_empty() {
        anyhow::bail!(
            "No folders to watch: pass --folder or add folders to {}",
            list_path.display()
        );
    }

    let pipeline = DocumentPipeline::from_config(config)?;
    pipeline
        .ocr()
        .ensure_available()
        .await
        .context("OCR engine is not usable")?;

    let readiness = Readiness {
        retries: config.watch.ready_retries,
        interval: config.ready_interval(),
    };

    FolderWatcher::new(Arc::new(pipeline), targets.watched_folders, readiness)
        .run(shutdown_signal())
        .await?;

    tracing::info!("Watcher shutdown complete");
    Ok(())
}

fn unwatch(config: &Config, folders: Vec<PathBuf>) -> Result<()> {
    let list_path = &config.watch.watch_list_path;
    let mut list = WatchList::load(list_path);

    let mut changed = false;
    for folder in &folders {
        let removed = list.remove(folder);
        if removed {
            tracing::info!("Stopped watching {}", folder.display());
        } else {
            tracing::warn!("{} is not in the watch list", folder.display());
        }
        changed |= removed;
    }

    if changed {
        list.save(list_path)
            .with_context(|| format!("Failed to save watch list {}", list_path.display()))?;
    }
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    let pipeline = DocumentPipeline::from_config(config)?;

    let renderer = pipeline.renderer();
    if renderer.is_available().await {
        tracing::info!("Renderer {}: available", renderer.name());
    } else {
        anyhow::bail!("Renderer {} is not available", renderer.name());
    }

    pipeline
        .ocr()
        .ensure_available()
        .await
        .with_context(|| format!("OCR engine {} is not usable", pipeline.ocr().name()))?;
    tracing::info!("OCR engine {}: available", pipeline.ocr().name());

    let watched = WatchList::load(&config.watch.watch_list_path);
    tracing::info!(
        "Watch list {}: {} folders",
        config.watch.watch_list_path.display(),
        watched.watched_folders.len()
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
