//! Invisible text layer
//!
//! Writes OCR words into a PDF page as invisible, selectable text.
//!
//! Pieces, leaf first:
//! - [`CoordinateMapper`]: raster pixel boxes to page points and font size
//! - [`ContentStreamBuilder`]: placed runs to a balanced `q ... Q` fragment
//! - [`FontRegistrar`]: one font object per document, one key per page
//! - [`PageOverlayer`]: drives the three for a page and appends the stream
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scanlayer::overlay::{FontProvider, OverlayOptions, PageOverlayer};
//!
//! let provider = FontProvider::Standard;
//! let options = OverlayOptions::default();
//! let mut overlayer = PageOverlayer::new(&provider, &options);
//!
//! for (page_id, result) in pages {
//!     overlayer.apply(&mut doc, page_id, result.as_ref())?;
//! }
//! ```

mod content;
mod error;
mod fonts;
mod geometry;
mod mapper;
mod page;
mod resources;
mod types;

pub use content::{
    escape_literal, format_number, ContentStreamBuilder, ContentStreamFragment, InvisibleText,
    ZERO_ALPHA_GS_KEY,
};
pub use error::{FontError, OverlayError};
pub use fonts::{
    FontEncoding, FontProvider, FontRegistrar, FontStrategy, GlyphlessFont, GLYPHLESS_FONT_NAME,
    OCR_FONT_KEY,
};
pub use geometry::PageGeometry;
pub use mapper::{CoordinateMapper, FontSizing, FONT_SIZE_RATIO, MIN_FONT_SIZE};
pub use page::{OverlayOptions, PageOverlayer};
pub use resources::Registration;
pub use types::{
    LineResult, PageOcrResult, PageOutcome, PageRotation, PlacedBox, PlacedGlyphRun, SkipReason,
    WordBox,
};
