//! Scanlayer
//!
//! Makes scanned PDFs searchable: each page is rendered, run through OCR and
//! given an invisible text layer at the positions of the recognized words,
//! without changing how the page looks.

pub mod config;
pub mod error;
pub mod ocr;
pub mod overlay;
pub mod pipeline;
pub mod render;
pub mod watcher;

pub use config::{Config, WatchList, WatchedFolder};
pub use error::{Error, Result};
pub use pipeline::{DocumentPipeline, PipelineOptions, ProcessError, ProcessReport, Stage};
