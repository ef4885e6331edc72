//! Overlay error types

use thiserror::Error;

/// Errors raised while writing the text layer into a page
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The underlying PDF object model rejected an operation
    #[error("PDF object error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// A page or resource object has an unexpected shape
    #[error("Malformed page structure: {0}")]
    MalformedPage(String),

    /// Compressing a new content stream failed
    #[error("Failed to compress stream: {0}")]
    Compression(String),
}

/// Errors raised while preparing font resources
#[derive(Debug, Error)]
pub enum FontError {
    #[error("Glyphless font not found at {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Glyphless font at {0} is not a TrueType font")]
    NotTrueType(String),

    #[error("Glyphless font strategy selected but no font path configured")]
    MissingPath,
}
