//! Overlay Types
//!
//! Data carried from OCR word boxes to content-stream operators.

use serde::{Deserialize, Serialize};

/// A recognized word and its bounding box in raster pixel space (origin top-left)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WordBox {
    pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
        }
    }

    /// True when the word can be placed: non-blank text and a positive, finite area
    pub fn is_placeable(&self) -> bool {
        !self.text.trim().is_empty()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.x.is_finite()
            && self.y.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Words of one OCR line, in reading order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineResult {
    pub words: Vec<WordBox>,
}

/// OCR output for one page together with the raster size it was measured against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOcrResult {
    pub lines: Vec<LineResult>,
    pub raster_width: u32,
    pub raster_height: u32,
}

impl PageOcrResult {
    pub fn new(lines: Vec<LineResult>, raster_width: u32, raster_height: u32) -> Self {
        Self {
            lines,
            raster_width,
            raster_height,
        }
    }

    /// All words in reading order (line by line)
    pub fn words(&self) -> impl Iterator<Item = &WordBox> {
        self.lines.iter().flat_map(|line| line.words.iter())
    }

    /// Aggregate recognized text, words separated by spaces and lines by newlines
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                line.words
                    .iter()
                    .map(|w| w.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_text(&self) -> bool {
        !self.text().trim().is_empty()
    }
}

/// Page rotation as declared by `/Rotate`, clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageRotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl PageRotation {
    /// Normalise any multiple of 90 (negative values included); other values mean no rotation
    pub fn from_degrees(degrees: i64) -> Self {
        match degrees.rem_euclid(360) {
            90 => Self::Clockwise90,
            180 => Self::Clockwise180,
            270 => Self::Clockwise270,
            _ => Self::None,
        }
    }

    /// True when displayed width and height are swapped relative to the page box
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Clockwise90 | Self::Clockwise270)
    }
}

/// One word positioned in PDF user space (origin bottom-left, points)
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGlyphRun {
    pub font_key: String,
    pub font_size: f64,
    pub x: f64,
    pub y: f64,
    pub rotation: PageRotation,
    pub text: String,
}

impl PlacedGlyphRun {
    /// Text matrix `[a b c d e f]` for this run
    pub fn text_matrix(&self) -> [f64; 6] {
        let (a, b, c, d) = match self.rotation {
            PageRotation::None => (1.0, 0.0, 0.0, 1.0),
            PageRotation::Clockwise90 => (0.0, 1.0, -1.0, 0.0),
            PageRotation::Clockwise180 => (-1.0, 0.0, 0.0, -1.0),
            PageRotation::Clockwise270 => (0.0, -1.0, 1.0, 0.0),
        };
        [a, b, c, d, self.x, self.y]
    }
}

/// A word box scaled into displayed page points, origin top-left, no flip applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
}

/// Why a page was left without an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Rendering or OCR produced nothing for this page
    NoResult,
    /// OCR returned only whitespace
    EmptyText,
    /// Every word was blank or had a degenerate box
    NoPlaceableWords,
    /// Raster dimensions were zero
    EmptyRaster,
    /// Applying the overlay failed; the page was left alone
    Failed,
}

/// Result of overlaying one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PageOutcome {
    Applied { words: usize },
    Skipped { reason: SkipReason },
}

impl PageOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
