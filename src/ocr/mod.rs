//! OCR Module
//!
//! Recognizes words on rendered page bitmaps.
//!
//! Backends:
//! - Tesseract (local CLI, requires installation and language packs)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scanlayer::ocr::{OcrEngine, TesseractEngine};
//!
//! let engine = TesseractEngine::new("tesseract", "eng", 3);
//! engine.ensure_available().await?;
//!
//! if let Some(result) = engine.recognize(&raster).await? {
//!     let page = result.into_page_result(raster.width, raster.height);
//! }
//! ```

mod engine;
mod tsv;
mod types;

#[cfg(test)]
pub use engine::MockEngine;
pub use engine::{OcrEngine, TesseractEngine};
pub use tsv::parse_tsv;
pub use types::{OcrError, OcrLine, OcrResult, OcrWord, PixelRect};
