//! Folder watching
//!
//! Watches folders (non-recursively) for newly created PDF files and runs
//! each one through the pipeline in its own task. The outcome of every file
//! is reported once through tracing.

mod intake;

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::WatchedFolder;
use crate::error::Result;
use crate::pipeline::{DocumentPipeline, ProcessError, ProcessReport};

pub use intake::{backup_file, ingest, is_pdf, unique_backup_path, wait_until_ready, Readiness};

/// Paths currently being processed
type InFlight = Arc<Mutex<HashSet<PathBuf>>>;

/// Watches folders and dispatches new PDFs to the pipeline
pub struct FolderWatcher {
    pipeline: Arc<DocumentPipeline>,
    folders: Vec<WatchedFolder>,
    readiness: Readiness,
    in_flight: InFlight,
}

impl FolderWatcher {
    pub fn new(
        pipeline: Arc<DocumentPipeline>,
        folders: Vec<WatchedFolder>,
        readiness: Readiness,
    ) -> Self {
        let folders = folders
            .into_iter()
            .map(|folder| WatchedFolder {
                folder_path: canonical(&folder.folder_path),
                backup_path: folder.backup_path,
            })
            .collect();

        Self {
            pipeline,
            folders,
            readiness,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn folders(&self) -> &[WatchedFolder] {
        &self.folders
    }

    /// Watch until `shutdown` resolves. Files already being processed are
    /// left to finish on their own tasks.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |event: notify::Result<Event>| {
                let _ = tx.send(event);
            })?;

        for folder in &self.folders {
            watcher.watch(&folder.folder_path, RecursiveMode::NonRecursive)?;
            match &folder.backup_path {
                Some(backup) => tracing::info!(
                    "Watching {} (backups in {})",
                    folder.folder_path.display(),
                    backup.display()
                ),
                None => tracing::info!("Watching {}", folder.folder_path.display()),
            }
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = rx.recv() => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => tracing::warn!("File watch error: {}", e),
                    None => break,
                },
            }
        }

        tracing::info!("Stopped watching {} folders", self.folders.len());
        Ok(())
    }

    fn handle_event(&self, event: Event) {
        if !matches!(event.kind, EventKind::Create(_)) {
            return;
        }

        for path in event.paths {
            if !is_pdf(&path) {
                continue;
            }
            let Some(folder) = self.folder_for(&path) else {
                continue;
            };
            let backup = folder.backup_path.clone();
            self.dispatch(path, backup);
        }
    }

    fn folder_for(&self, path: &Path) -> Option<&WatchedFolder> {
        let parent = path.parent()?;
        self.folders.iter().find(|f| f.folder_path == parent)
    }

    /// Spawn processing for `path` unless it is already in flight
    pub fn dispatch(&self, path: PathBuf, backup: Option<PathBuf>) -> Option<JoinHandle<()>> {
        let guard = InFlightGuard::acquire(&self.in_flight, &path)?;

        tracing::info!("Detected {}", path.display());

        let pipeline = self.pipeline.clone();
        let readiness = self.readiness;
        Some(tokio::spawn(async move {
            let _guard = guard;
            let result = ingest(&pipeline, &path, backup.as_deref(), readiness).await;
            notify_outcome(&path, &result);
        }))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Marks a path as in flight until dropped
struct InFlightGuard {
    set: InFlight,
    path: PathBuf,
}

impl InFlightGuard {
    fn acquire(set: &InFlight, path: &Path) -> Option<Self> {
        if !set.lock().insert(path.to_path_buf()) {
            tracing::debug!("{} is already being processed", path.display());
            return None;
        }
        Some(Self {
            set: set.clone(),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

/// The one user-facing message per file
fn notify_outcome(path: &Path, result: &std::result::Result<ProcessReport, ProcessError>) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match result {
        Ok(report) if report.is_modified() => tracing::info!(
            "OCR completed: {} ({} of {} pages, {} words)",
            name,
            report.pages_overlaid,
            report.pages_total,
            report.words_placed
        ),
        Ok(report) => tracing::info!(
            "OCR completed: {} (no text found on {} pages, file unchanged)",
            name,
            report.pages_total
        ),
        Err(e) => tracing::error!("OCR failed: {}: {} ({})", name, e.short_cause(), e.stage),
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
