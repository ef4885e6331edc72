//! Document pipeline
//!
//! Rasterize, recognize and overlay every page of one document, then save
//! it once. Pages are handled strictly in order; a page that fails at any
//! step is left as it was and the next page proceeds.

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lopdf::{Document, ObjectId};
use serde::Serialize;

use crate::config::{Config, RenderBackend};
use crate::ocr::{OcrEngine, TesseractEngine};
use crate::overlay::{FontProvider, OverlayOptions, PageOutcome, PageOverlayer, SkipReason};
use crate::render::{PageRenderer, PdftoppmRenderer, RasterLimits, RasterSource};

pub use error::{ProcessCause, ProcessError, Stage};

/// Default bound on rendering or recognizing a single page
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub limits: RasterLimits,
    pub overlay: OverlayOptions,
    pub page_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limits: RasterLimits::default(),
            overlay: OverlayOptions::default(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }
}

/// Summary of one processed document
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub pages_total: usize,
    pub pages_overlaid: usize,
    pub pages_skipped: usize,
    pub words_placed: usize,
    /// Outcome per processed page, in page order
    pub pages: Vec<PageOutcome>,
    pub elapsed: Duration,
}

impl ProcessReport {
    pub fn is_modified(&self) -> bool {
        self.pages_overlaid > 0
    }

    fn from_outcomes(pages_total: usize, pages: Vec<PageOutcome>, elapsed: Duration) -> Self {
        let pages_overlaid = pages.iter().filter(|p| p.is_applied()).count();
        let words_placed = pages
            .iter()
            .map(|p| match p {
                PageOutcome::Applied { words } => *words,
                PageOutcome::Skipped { .. } => 0,
            })
            .sum();

        Self {
            pages_total,
            pages_overlaid,
            pages_skipped: pages_total - pages_overlaid,
            words_placed,
            pages,
            elapsed,
        }
    }
}

/// Result of processing in memory
#[derive(Debug)]
pub struct ProcessedDocument {
    /// Serialized PDF, `None` when no page received an overlay
    pub bytes: Option<Vec<u8>>,
    pub report: ProcessReport,
}

/// Runs rasterization, OCR and overlay for whole documents.
///
/// Holds no per-document state; one instance can process several documents
/// concurrently.
pub struct DocumentPipeline {
    renderer: Arc<dyn PageRenderer>,
    ocr: Arc<dyn OcrEngine>,
    fonts: FontProvider,
    options: PipelineOptions,
}

impl DocumentPipeline {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        ocr: Arc<dyn OcrEngine>,
        fonts: FontProvider,
        options: PipelineOptions,
    ) -> Self {
        Self {
            renderer,
            ocr,
            fonts,
            options,
        }
    }

    /// Build the configured renderer, tesseract engine and font.
    ///
    /// Fails if the glyphless font cannot be loaded or the renderer was not
    /// compiled in.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let renderer: Arc<dyn PageRenderer> = match config.render.backend {
            RenderBackend::Pdftoppm => {
                Arc::new(PdftoppmRenderer::new(config.render.pdftoppm_path.clone()))
            }
            #[cfg(feature = "mupdf")]
            RenderBackend::Mupdf => Arc::new(crate::render::MupdfRenderer::new()),
            #[cfg(not(feature = "mupdf"))]
            RenderBackend::Mupdf => {
                return Err(crate::error::Error::Config(
                    "scanlayer was built without the mupdf feature".to_string(),
                ))
            }
        };

        let ocr = Arc::new(TesseractEngine::new(
            config.ocr.tesseract_path.clone(),
            &config.ocr.language,
            config.ocr.page_segmentation,
        ));

        let fonts = FontProvider::from_strategy(
            config.overlay.font,
            config.overlay.glyphless_font_path.as_deref(),
        )?;

        tracing::info!(
            "Pipeline: renderer {}, OCR {} ({}), font {:?}",
            renderer.name(),
            ocr.name(),
            ocr.language(),
            fonts.strategy()
        );

        Ok(Self::new(renderer, ocr, fonts, config.pipeline_options()))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn renderer(&self) -> &dyn PageRenderer {
        self.renderer.as_ref()
    }

    pub fn ocr(&self) -> &dyn OcrEngine {
        self.ocr.as_ref()
    }

    /// Process a PDF held in memory
    pub async fn process_bytes(&self, pdf: Vec<u8>) -> Result<ProcessedDocument, ProcessError> {
        let start = Instant::now();

        self.ocr
            .ensure_available()
            .await
            .map_err(|e| ProcessError::new(Stage::Ocr, e))?;

        let pdf = Arc::new(pdf);
        let mut doc = {
            let pdf = pdf.clone();
            tokio::task::spawn_blocking(move || Document::load_mem(&pdf))
                .await
                .map_err(|e| ProcessError::new(Stage::Load, ProcessCause::Task(e.to_string())))?
                .map_err(|e| ProcessError::new(Stage::Load, e))?
        };

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

        let source = self
            .renderer
            .open(pdf, self.options.limits)
            .await
            .map_err(|e| ProcessError::new(Stage::Render, e))?;

        let page_count = page_ids.len().min(source.page_count());
        if page_count < page_ids.len() {
            tracing::warn!(
                "Renderer reports {} pages, document has {}; remaining pages left unmodified",
                source.page_count(),
                page_ids.len()
            );
        }

        let mut overlayer = PageOverlayer::new(&self.fonts, &self.options.overlay);
        let mut outcomes = Vec::with_capacity(page_count);

        for (index, &page_id) in page_ids.iter().take(page_count).enumerate() {
            let outcome = self
                .process_page(source.as_ref(), &mut overlayer, &mut doc, index, page_id)
                .await?;
            tracing::debug!("Page {}: {:?}", index + 1, outcome);
            outcomes.push(outcome);
        }
        drop(source);

        let report = ProcessReport::from_outcomes(page_ids.len(), outcomes, start.elapsed());
        if !report.is_modified() {
            return Ok(ProcessedDocument {
                bytes: None,
                report,
            });
        }

        let bytes = tokio::task::spawn_blocking(move || {
            let mut buffer = Vec::new();
            doc.save_to(&mut buffer)
                .map_err(|e| ProcessCause::Serialize(e.to_string()))?;
            Ok::<_, ProcessCause>(buffer)
        })
        .await
        .map_err(|e| ProcessError::new(Stage::Save, ProcessCause::Task(e.to_string())))?
        .map_err(|e| ProcessError::new(Stage::Save, e))?;

        Ok(ProcessedDocument {
            bytes: Some(bytes),
            report: ProcessReport {
                elapsed: start.elapsed(),
                ..report
            },
        })
    }

    /// Process a PDF file and replace it in place.
    ///
    /// The file is only rewritten when at least one page received an
    /// overlay. The new content goes to a temporary sibling first and is then
    /// renamed over the original.
    pub async fn process_file(&self, path: &Path) -> Result<ProcessReport, ProcessError> {
        tracing::info!("Processing {}", path.display());

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ProcessError::new(Stage::Read, e).with_path(path))?;

        let processed = self
            .process_bytes(data)
            .await
            .map_err(|e| e.with_path(path))?;

        if let Some(bytes) = processed.bytes {
            replace_file(path, &bytes)
                .await
                .map_err(|e| ProcessError::new(Stage::Write, e).with_path(path))?;
        }

        let report = processed.report;
        tracing::info!(
            "Processed {}: {}/{} pages overlaid, {} words in {:.2}s",
            path.display(),
            report.pages_overlaid,
            report.pages_total,
            report.words_placed,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    async fn process_page(
        &self,
        source: &dyn RasterSource,
        overlayer: &mut PageOverlayer<'_>,
        doc: &mut Document,
        index: usize,
        page_id: ObjectId,
    ) -> Result<PageOutcome, ProcessError> {
        let page_number = index + 1;
        let timeout = self.options.page_timeout;

        let raster = match tokio::time::timeout(timeout, source.render_page(index)).await {
            Ok(Ok(raster)) => raster,
            Ok(Err(e)) => {
                tracing::warn!("Page {}: rendering failed, skipping: {}", page_number, e);
                return Ok(PageOutcome::skipped(SkipReason::Failed));
            }
            Err(_) => {
                tracing::warn!(
                    "Page {}: rendering timed out after {}s, skipping",
                    page_number,
                    timeout.as_secs()
                );
                return Ok(PageOutcome::skipped(SkipReason::Failed));
            }
        };

        if raster.is_empty() {
            tracing::warn!("Page {}: renderer produced an empty raster, skipping", page_number);
            return Ok(PageOutcome::skipped(SkipReason::EmptyRaster));
        }

        let recognized = match tokio::time::timeout(timeout, self.ocr.recognize(&raster)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_fatal() => {
                return Err(ProcessError::new(Stage::Ocr, e));
            }
            Ok(Err(e)) => {
                tracing::warn!("Page {}: OCR failed, skipping: {}", page_number, e);
                return Ok(PageOutcome::skipped(SkipReason::Failed));
            }
            Err(_) => {
                tracing::warn!(
                    "Page {}: OCR timed out after {}s, skipping",
                    page_number,
                    timeout.as_secs()
                );
                return Ok(PageOutcome::skipped(SkipReason::Failed));
            }
        };

        let page_result = recognized.map(|r| r.into_page_result(raster.width, raster.height));
        drop(raster);

        // A failed overlay rolls its own writes back
        match overlayer.apply(doc, page_id, page_result.as_ref()) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!("Page {}: overlay failed, page left unmodified: {}", page_number, e);
                Ok(PageOutcome::skipped(SkipReason::Failed))
            }
        }
    }
}

/// Write `bytes` next to `path` and rename over it
async fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = temp_sibling(path);

    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

/// Hidden sibling without a `.pdf` extension so folder watchers ignore it
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}
