//! OCR Types
//!
//! Recognition results as reported by an engine, in raster pixel space.

use serde::{Deserialize, Serialize};

use crate::overlay::{LineResult, PageOcrResult, WordBox};

/// Pixel-space rectangle, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Single recognized word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// Confidence (0-100)
    pub confidence: f64,
    pub bounds: PixelRect,
}

/// Words of one text line in reading order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub words: Vec<OcrWord>,
}

impl OcrLine {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Recognition result for one bitmap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Full text, lines separated by newlines
    pub text: String,
    pub lines: Vec<OcrLine>,
}

impl OcrResult {
    pub fn from_lines(lines: Vec<OcrLine>) -> Self {
        let text = lines
            .iter()
            .map(OcrLine::text)
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, lines }
    }

    pub fn word_count(&self) -> usize {
        self.lines.iter().map(|l| l.words.len()).sum()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Attach the raster size the boxes were measured against
    pub fn into_page_result(self, raster_width: u32, raster_height: u32) -> PageOcrResult {
        let lines = self
            .lines
            .into_iter()
            .map(|line| LineResult {
                words: line
                    .words
                    .into_iter()
                    .map(|w| {
                        let b = w.bounds;
                        WordBox::new(w.text, b.x, b.y, b.width, b.height)
                    })
                    .collect(),
            })
            .collect();

        PageOcrResult::new(lines, raster_width, raster_height)
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    #[error("OCR language not installed: {0}")]
    LanguageUnavailable(String),

    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),

    #[error("Failed to encode page image: {0}")]
    ImageEncoding(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("OCR timed out after {0} seconds")]
    Timeout(u64),
}

impl OcrError {
    /// Errors that no page of any document can recover from
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable(_) | Self::LanguageUnavailable(_) | Self::InvalidLanguage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x: f64) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence: 90.0,
            bounds: PixelRect {
                x,
                y: 10.0,
                width: 30.0,
                height: 12.0,
            },
        }
    }

    #[test]
    fn test_text_joins_words_and_lines() {
        let result = OcrResult::from_lines(vec![
            OcrLine {
                words: vec![word("Invoice", 0.0), word("#42", 40.0)],
            },
            OcrLine {
                words: vec![word("Total", 0.0)],
            },
        ]);

        assert_eq!(result.text, "Invoice #42\nTotal");
        assert_eq!(result.word_count(), 3);
        assert!(!result.is_blank());
        assert!(OcrResult::default().is_blank());
    }

    #[test]
    fn test_into_page_result_keeps_order_and_raster() {
        let result = OcrResult::from_lines(vec![OcrLine {
            words: vec![word("a", 1.0), word("b", 2.0)],
        }]);

        let page = result.into_page_result(2480, 3208);
        assert_eq!((page.raster_width, page.raster_height), (2480, 3208));

        let words: Vec<_> = page.words().map(|w| (w.text.as_str(), w.x)).collect();
        assert_eq!(words, vec![("a", 1.0), ("b", 2.0)]);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(OcrError::EngineUnavailable("tesseract".into()).is_fatal());
        assert!(OcrError::LanguageUnavailable("deu".into()).is_fatal());
        assert!(!OcrError::ProcessingError("boom".into()).is_fatal());
        assert!(!OcrError::Timeout(60).is_fatal());
    }
}
