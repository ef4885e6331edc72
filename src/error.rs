//! Error types for scanlayer startup and services

use thiserror::Error;

use crate::ocr::OcrError;
use crate::overlay::FontError;
use crate::pipeline::ProcessError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Font error: {0}")]
    Font(#[from] FontError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),
}
