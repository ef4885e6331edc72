//! MuPDF renderer
//!
//! MuPDF documents are not `Send`, so every call reopens the document from
//! shared bytes inside `spawn_blocking`.

use std::sync::Arc;

use async_trait::async_trait;
use mupdf::{Colorspace, Document, Matrix};

use super::{PageRenderer, RasterLimits, RasterPage, RasterSource, RenderError};

const PDF_MIME: &str = "application/pdf";

/// Renders pages in-process with MuPDF
#[derive(Debug, Clone, Default)]
pub struct MupdfRenderer;

impl MupdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageRenderer for MupdfRenderer {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn open(
        &self,
        pdf: Arc<Vec<u8>>,
        limits: RasterLimits,
    ) -> Result<Box<dyn RasterSource>, RenderError> {
        let data = pdf.clone();
        let page_count = tokio::task::spawn_blocking(move || {
            let doc = Document::from_bytes(&data, PDF_MIME)
                .map_err(|e| RenderError::Open(e.to_string()))?;
            let count = doc
                .page_count()
                .map_err(|e| RenderError::Open(e.to_string()))?;
            Ok::<_, RenderError>(count.max(0) as usize)
        })
        .await
        .map_err(|e| RenderError::Join(e.to_string()))??;

        Ok(Box::new(MupdfSource {
            pdf,
            page_count,
            limits,
        }))
    }
}

struct MupdfSource {
    pdf: Arc<Vec<u8>>,
    page_count: usize,
    limits: RasterLimits,
}

#[async_trait]
impl RasterSource for MupdfSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn render_page(&self, index: usize) -> Result<RasterPage, RenderError> {
        if index >= self.page_count {
            return Err(RenderError::PageOutOfRange(index));
        }

        let pdf = self.pdf.clone();
        let limits = self.limits;

        tokio::task::spawn_blocking(move || {
            let page_error = |e: mupdf::Error| RenderError::Page {
                index,
                message: e.to_string(),
            };

            let doc = Document::from_bytes(&pdf, PDF_MIME)
                .map_err(|e| RenderError::Open(e.to_string()))?;
            let page = doc.load_page(index as i32).map_err(page_error)?;
            let bounds = page.bounds().map_err(page_error)?;

            let page_width = f64::from(bounds.x1 - bounds.x0);
            let page_height = f64::from(bounds.y1 - bounds.y0);
            let (width, _) = limits.fit(page_width, page_height);
            if width == 0 {
                return Ok(RasterPage::new(0, 0, Vec::new()));
            }

            let scale = (f64::from(width) / page_width) as f32;
            let matrix = Matrix::new_scale(scale, scale);
            let colorspace = Colorspace::device_rgb();
            let pixmap = page
                .to_pixmap(&matrix, &colorspace, false, true)
                .map_err(page_error)?;

            Ok(pixmap_to_raster(&pixmap))
        })
        .await
        .map_err(|e| RenderError::Join(e.to_string()))?
    }
}

fn pixmap_to_raster(pixmap: &mupdf::Pixmap) -> RasterPage {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(255);
            let g = samples.get(offset + 1).copied().unwrap_or(r);
            let b = samples.get(offset + 2).copied().unwrap_or(r);
            let a = if n >= 4 {
                samples.get(offset + 3).copied().unwrap_or(255)
            } else {
                255
            };
            rgba.extend_from_slice(&[r, g, b, a]);
        }
    }

    RasterPage::new(width, height, rgba)
}
