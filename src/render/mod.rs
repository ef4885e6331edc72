//! Page rasterization
//!
//! Renders PDF pages to RGBA bitmaps for OCR. Pages are rendered one at a
//! time through a [`RasterSource`] so only one bitmap is alive per document.
//!
//! Backends:
//! - [`PdftoppmRenderer`]: poppler's `pdftoppm` CLI (default)
//! - `MupdfRenderer`: MuPDF bindings, behind the `mupdf` feature

#[cfg(feature = "mupdf")]
mod mupdf;
mod poppler;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "mupdf")]
pub use self::mupdf::MupdfRenderer;
pub use poppler::PdftoppmRenderer;

/// Default raster bound, A4 at 300 DPI
pub const DEFAULT_MAX_WIDTH: u32 = 2480;
pub const DEFAULT_MAX_HEIGHT: u32 = 3508;

/// One rendered page, packed RGBA8, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterPage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Opaque white page
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![255; width as usize * height as usize * 4])
    }

    /// Zero-dimension or short buffers cannot be recognized
    pub fn is_empty(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.pixels.len() < self.width as usize * self.height as usize * 4
    }

    pub fn to_image(&self) -> Option<image::RgbaImage> {
        if self.is_empty() {
            return None;
        }
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

/// Upper bound for rendered page size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for RasterLimits {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}

impl RasterLimits {
    /// Largest pixel size with the page's aspect ratio that fits the limits.
    /// Returns (0, 0) for a degenerate page.
    pub fn fit(&self, width_points: f64, height_points: f64) -> (u32, u32) {
        let valid = width_points.is_finite()
            && height_points.is_finite()
            && width_points > 0.0
            && height_points > 0.0;
        if !valid || self.max_width == 0 || self.max_height == 0 {
            return (0, 0);
        }

        let scale = (f64::from(self.max_width) / width_points)
            .min(f64::from(self.max_height) / height_points);

        let width = (width_points * scale).round().clamp(1.0, f64::from(self.max_width));
        let height = (height_points * scale).round().clamp(1.0, f64::from(self.max_height));
        (width as u32, height as u32)
    }
}

/// Render errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer not available: {0}")]
    Unavailable(String),

    #[error("Failed to open document: {0}")]
    Open(String),

    #[error("Page {0} out of range")]
    PageOutOfRange(usize),

    #[error("Failed to render page {index}: {message}")]
    Page { index: usize, message: String },

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Join(String),
}

/// Opens documents for rendering
#[async_trait]
pub trait PageRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check that the backend can run at all
    async fn is_available(&self) -> bool;

    /// Prepare a document for page-by-page rendering
    async fn open(
        &self,
        pdf: Arc<Vec<u8>>,
        limits: RasterLimits,
    ) -> Result<Box<dyn RasterSource>, RenderError>;
}

/// An opened document that renders pages on demand
#[async_trait]
pub trait RasterSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Render one page (0-based) within the limits given at open
    async fn render_page(&self, index: usize) -> Result<RasterPage, RenderError>;
}

/// Displayed size in points of every page, in page order.
/// Pages whose geometry cannot be read get `None`.
pub(crate) fn displayed_page_sizes(pdf: &[u8]) -> Result<Vec<Option<(f64, f64)>>, RenderError> {
    let doc = lopdf::Document::load_mem(pdf).map_err(|e| RenderError::Open(e.to_string()))?;

    Ok(doc
        .get_pages()
        .values()
        .map(|&page_id| {
            crate::overlay::PageGeometry::of_page(&doc, page_id)
                .ok()
                .map(|geometry| geometry.displayed_size())
        })
        .collect())
}
