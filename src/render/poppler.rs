//! pdftoppm renderer
//!
//! Shells out to poppler's `pdftoppm` once per page and decodes the PNG it
//! writes to stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    displayed_page_sizes, PageRenderer, RasterLimits, RasterPage, RasterSource, RenderError,
};

/// Renders pages with the `pdftoppm` binary
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    binary: PathBuf,
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdftoppmRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    async fn is_available(&self) -> bool {
        let result = Command::new(&self.binary)
            .arg("-v")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        // pdftoppm -v exits 0 on current poppler, 99 on old releases
        result.is_ok()
    }

    async fn open(
        &self,
        pdf: Arc<Vec<u8>>,
        limits: RasterLimits,
    ) -> Result<Box<dyn RasterSource>, RenderError> {
        let sizes = {
            let pdf = pdf.clone();
            tokio::task::spawn_blocking(move || displayed_page_sizes(&pdf))
                .await
                .map_err(|e| RenderError::Join(e.to_string()))??
        };

        let input = std::env::temp_dir()
            .join(format!("scanlayer_render_{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&input, pdf.as_slice()).await?;

        tracing::debug!("Prepared {} pages for pdftoppm at {}", sizes.len(), input.display());

        Ok(Box::new(PdftoppmSource {
            binary: self.binary.clone(),
            input: TempInput(input),
            sizes,
            limits,
        }))
    }
}

/// Temp copy of the input, removed when the source is dropped
struct TempInput(PathBuf);

impl Drop for TempInput {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

struct PdftoppmSource {
    binary: PathBuf,
    input: TempInput,
    sizes: Vec<Option<(f64, f64)>>,
    limits: RasterLimits,
}

#[async_trait]
impl RasterSource for PdftoppmSource {
    fn page_count(&self) -> usize {
        self.sizes.len()
    }

    async fn render_page(&self, index: usize) -> Result<RasterPage, RenderError> {
        let size = self
            .sizes
            .get(index)
            .copied()
            .ok_or(RenderError::PageOutOfRange(index))?
            .ok_or_else(|| RenderError::Page {
                index,
                message: "page has no readable size".to_string(),
            })?;

        let (width, height) = self.limits.fit(size.0, size.1);
        if width == 0 || height == 0 {
            return Ok(RasterPage::new(0, 0, Vec::new()));
        }

        let page_number = (index + 1).to_string();
        let output = Command::new(&self.binary)
            .args(["-f", &page_number, "-l", &page_number])
            .args(["-singlefile", "-png", "-cropbox"])
            .arg("-scale-to-x")
            .arg(width.to_string())
            .arg("-scale-to-y")
            .arg(height.to_string())
            .arg(&self.input.0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderError::Unavailable(format!("Failed to run pdftoppm: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Page {
                index,
                message: format!("pdftoppm failed: {}", stderr.trim()),
            });
        }

        decode_png(&output.stdout)
    }
}

fn decode_png(data: &[u8]) -> Result<RasterPage, RenderError> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Png)
        .map_err(|e| RenderError::Image(e.to_string()))?
        .to_rgba8();

    let (width, height) = image.dimensions();
    Ok(RasterPage::new(width, height, image.into_raw()))
}
