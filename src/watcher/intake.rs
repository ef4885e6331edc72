//! Per-file intake: wait until a new scan is fully written, back it up,
//! then run the pipeline on it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::pipeline::{DocumentPipeline, ProcessError, ProcessReport, Stage};

/// How long to wait for a scanner or copy job to finish writing a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            retries: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// Case-insensitive `.pdf` check
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Wait until the file opens for reading and writing and its size is
/// non-zero and unchanged between two consecutive polls.
pub async fn wait_until_ready(path: &Path, readiness: Readiness) -> io::Result<()> {
    let attempts = readiness.retries.max(1);
    let mut last_size = None;
    let mut last_error = None;

    for attempt in 1..=attempts {
        match writable_size(path).await {
            Ok(size) if size > 0 && last_size == Some(size) => return Ok(()),
            Ok(size) => {
                last_size = Some(size);
            }
            Err(e) => {
                tracing::debug!("{} not ready (attempt {}): {}", path.display(), attempt, e);
                last_size = None;
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(readiness.interval).await;
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("file still changing after {} attempts", attempts),
        )
    }))
}

async fn writable_size(path: &Path) -> io::Result<u64> {
    let file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await?;
    Ok(file.metadata().await?.len())
}

/// Copy the file into `backup_dir` under a name that does not exist yet
pub async fn backup_file(path: &Path, backup_dir: &Path) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(backup_dir).await?;

    let target = unique_backup_path(path, backup_dir, Local::now())?;
    tokio::fs::copy(path, &target).await?;

    tracing::info!("Backed up {} to {}", path.display(), target.display());
    Ok(target)
}

/// `<dir>/<name>`, or `<dir>/<stem>_<YYYYmmdd_HHMMSS>.<ext>` when taken,
/// with a counter appended if that is taken too.
pub fn unique_backup_path(
    path: &Path,
    backup_dir: &Path,
    now: DateTime<Local>,
) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;

    let plain = backup_dir.join(file_name);
    if !plain.exists() {
        return Ok(plain);
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = now.format("%Y%m%d_%H%M%S");

    let stamped = backup_dir.join(format!("{}_{}{}", stem, stamp, extension));
    if !stamped.exists() {
        return Ok(stamped);
    }

    (2u32..)
        .map(|n| backup_dir.join(format!("{}_{}_{}{}", stem, stamp, n, extension)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "no free backup name"))
}

/// Full handling of one detected file
pub async fn ingest(
    pipeline: &DocumentPipeline,
    path: &Path,
    backup_dir: Option<&Path>,
    readiness: Readiness,
) -> Result<ProcessReport, ProcessError> {
    wait_until_ready(path, readiness)
        .await
        .map_err(|e| ProcessError::new(Stage::Read, e).with_path(path))?;

    if let Some(dir) = backup_dir {
        backup_file(path, dir)
            .await
            .map_err(|e| ProcessError::new(Stage::Backup, e).with_path(path))?;
    }

    pipeline.process_file(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fast() -> Readiness {
        Readiness {
            retries: 5,
            interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_is_pdf_case_insensitive() {
        assert!(is_pdf(Path::new("/scans/a.pdf")));
        assert!(is_pdf(Path::new("/scans/B.PDF")));
        assert!(is_pdf(Path::new("/scans/c.Pdf")));
        assert!(!is_pdf(Path::new("/scans/d.pdf.tmp")));
        assert!(!is_pdf(Path::new("/scans/.e.pdf.3f2a.tmp")));
        assert!(!is_pdf(Path::new("/scans/pdf")));
    }

    #[tokio::test]
    async fn test_stable_file_is_ready() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        wait_until_ready(&path, fast()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_never_ready() {
        let dir = TempDir::new().unwrap();
        let err = wait_until_ready(&dir.path().join("absent.pdf"), fast())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_empty_file_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.pdf");
        std::fs::write(&path, b"").unwrap();

        let err = wait_until_ready(&path, fast()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_unique_backup_names() {
        let dir = TempDir::new().unwrap();
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let source = Path::new("/scans/invoice.pdf");

        let first = unique_backup_path(source, dir.path(), now).unwrap();
        assert_eq!(first, dir.path().join("invoice.pdf"));
        std::fs::write(&first, b"1").unwrap();

        let second = unique_backup_path(source, dir.path(), now).unwrap();
        assert_eq!(second, dir.path().join("invoice_20240309_140507.pdf"));
        std::fs::write(&second, b"2").unwrap();

        let third = unique_backup_path(source, dir.path(), now).unwrap();
        assert_eq!(third, dir.path().join("invoice_20240309_140507_2.pdf"));
    }

    #[tokio::test]
    async fn test_backup_copies_content() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("scan.pdf");
        std::fs::write(&source, b"%PDF-1.4 original").unwrap();

        let backup_dir = dir.path().join("originals");
        let target = backup_file(&source, &backup_dir).await.unwrap();

        assert_eq!(target, backup_dir.join("scan.pdf"));
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4 original");
        assert!(source.exists());
    }
}
