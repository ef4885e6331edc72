//! Document processing errors
//!
//! Per-page problems never surface here; they only leave the page without
//! an overlay. A `ProcessError` always means the whole file failed.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ocr::OcrError;
use crate::overlay::OverlayError;
use crate::render::RenderError;

/// Longest cause string put into a notification
const SHORT_CAUSE_LEN: usize = 160;

/// Where in the per-file flow a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Load,
    Render,
    Ocr,
    Save,
    Write,
    Backup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "reading file",
            Self::Load => "loading PDF",
            Self::Render => "rendering pages",
            Self::Ocr => "running OCR",
            Self::Save => "saving PDF",
            Self::Write => "writing file",
            Self::Backup => "backing up file",
        };
        f.write_str(name)
    }
}

/// Underlying cause of a failed file
#[derive(Debug, Error)]
pub enum ProcessCause {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("Failed to serialize PDF: {0}")]
    Serialize(String),

    #[error("Task join error: {0}")]
    Task(String),
}

/// A file could not be processed
#[derive(Debug, Error)]
#[error("Failed {stage} {}: {cause}", describe(.path))]
pub struct ProcessError {
    pub path: Option<PathBuf>,
    pub stage: Stage,
    #[source]
    pub cause: ProcessCause,
}

fn describe(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<memory>".to_string(),
    }
}

impl ProcessError {
    pub fn new(stage: Stage, cause: impl Into<ProcessCause>) -> Self {
        Self {
            path: None,
            stage,
            cause: cause.into(),
        }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    /// One-line cause for user notifications, no chain
    pub fn short_cause(&self) -> String {
        let cause = self.cause.to_string();
        let first_line = cause.lines().next().unwrap_or_default().trim();

        if first_line.chars().count() > SHORT_CAUSE_LEN {
            let truncated: String = first_line.chars().take(SHORT_CAUSE_LEN).collect();
            format!("{}...", truncated)
        } else {
            first_line.to_string()
        }
    }

    /// File name for notifications, falling back to the full path
    pub fn file_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| describe(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_stage_path_and_cause() {
        let err = ProcessError::new(
            Stage::Ocr,
            OcrError::LanguageUnavailable("deu".to_string()),
        )
        .with_path(Path::new("/scans/letter.pdf"));

        assert_eq!(
            err.to_string(),
            "Failed running OCR /scans/letter.pdf: OCR language not installed: deu"
        );
        assert_eq!(err.file_name(), "letter.pdf");
        assert_eq!(err.short_cause(), "OCR language not installed: deu");
    }

    #[test]
    fn test_short_cause_is_single_bounded_line() {
        let long = format!("first line {}\nsecond line", "x".repeat(400));
        let err = ProcessError::new(Stage::Render, RenderError::Open(long));

        let short = err.short_cause();
        assert!(!short.contains('\n'));
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), SHORT_CAUSE_LEN + 3);
    }

    #[test]
    fn test_memory_source_description() {
        let err = ProcessError::new(Stage::Save, ProcessCause::Task("cancelled".to_string()));
        assert_eq!(err.file_name(), "<memory>");
        assert!(err.to_string().contains("<memory>"));
    }
}
