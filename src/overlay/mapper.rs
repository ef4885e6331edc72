//! Coordinate mapping
//!
//! Converts OCR word boxes (raster pixels, origin top-left) into PDF user
//! space (points, origin bottom-left) and picks a font size from box height.

use serde::{Deserialize, Serialize};

use super::geometry::PageGeometry;
use super::types::{PlacedBox, PlacedGlyphRun, WordBox};

/// Font size as a fraction of the box height in points
pub const FONT_SIZE_RATIO: f64 = 0.85;

/// Smallest font size ever emitted, in points
pub const MIN_FONT_SIZE: f64 = 1.0;

/// Heuristic mapping from box height to font size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontSizing {
    pub ratio: f64,
    pub min_points: f64,
}

impl Default for FontSizing {
    fn default() -> Self {
        Self {
            ratio: FONT_SIZE_RATIO,
            min_points: MIN_FONT_SIZE,
        }
    }
}

impl FontSizing {
    pub fn font_size(&self, box_height_points: f64) -> f64 {
        (box_height_points * self.ratio).max(self.min_points)
    }
}

/// Maps word boxes measured on one raster onto one page
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    geometry: PageGeometry,
    scale_x: f64,
    scale_y: f64,
    sizing: FontSizing,
}

impl CoordinateMapper {
    /// Returns `None` when either raster dimension is zero
    pub fn new(
        raster_width: u32,
        raster_height: u32,
        geometry: PageGeometry,
        sizing: FontSizing,
    ) -> Option<Self> {
        if raster_width == 0 || raster_height == 0 {
            return None;
        }

        let (page_width, page_height) = geometry.displayed_size();

        Some(Self {
            geometry,
            scale_x: page_width / f64::from(raster_width),
            scale_y: page_height / f64::from(raster_height),
            sizing,
        })
    }

    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    /// Baseline convention: position at the bottom-left corner of the box,
    /// vertical axis flipped, for an absolute text matrix per word.
    pub fn place_baseline(&self, word: &WordBox, font_key: &str) -> PlacedGlyphRun {
        let (_, page_height) = self.geometry.displayed_size();

        let dx = word.x * self.scale_x;
        let dy = page_height - (word.y + word.height) * self.scale_y;
        let (x, y) = self.geometry.to_user_space(dx, dy);

        PlacedGlyphRun {
            font_key: font_key.to_string(),
            font_size: self.sizing.font_size(word.height * self.scale_y),
            x,
            y,
            rotation: self.geometry.rotation,
            text: word.text.clone(),
        }
    }

    /// Box convention: scaled rectangle in displayed space, origin top-left,
    /// for drawing primitives that flip internally.
    pub fn place_box(&self, word: &WordBox) -> PlacedBox {
        let height = word.height * self.scale_y;

        PlacedBox {
            x: word.x * self.scale_x,
            y: word.y * self.scale_y,
            width: word.width * self.scale_x,
            height,
            font_size: self.sizing.font_size(height),
        }
    }

    /// Flip a box-convention rectangle into a run anchored at its bottom edge
    pub fn run_from_box(&self, placed: &PlacedBox, text: &str, font_key: &str) -> PlacedGlyphRun {
        let (_, page_height) = self.geometry.displayed_size();
        let (x, y) = self
            .geometry
            .to_user_space(placed.x, page_height - (placed.y + placed.height));

        PlacedGlyphRun {
            font_key: font_key.to_string(),
            font_size: placed.font_size,
            x,
            y,
            rotation: self.geometry.rotation,
            text: text.to_string(),
        }
    }
}
