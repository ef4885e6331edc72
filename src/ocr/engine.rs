//! OCR Engines
//!
//! Defines the engine trait and the tesseract CLI implementation.

use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::tsv::parse_tsv;
use super::types::{OcrError, OcrResult};
use crate::render::RasterPage;

/// OCR engine trait
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &'static str;

    /// Check if the engine can run
    async fn is_available(&self) -> bool;

    /// Like [`is_available`](Self::is_available) but says what is missing
    async fn ensure_available(&self) -> Result<(), OcrError> {
        if self.is_available().await {
            Ok(())
        } else {
            Err(OcrError::EngineUnavailable(self.name().to_string()))
        }
    }

    /// Recognize one page. `Ok(None)` means no text was found.
    async fn recognize(&self, page: &RasterPage) -> Result<Option<OcrResult>, OcrError>;
}

/// Tesseract OCR through its command line
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    page_segmentation: u8,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract", "eng", 3)
    }
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, language: &str, page_segmentation: u8) -> Self {
        Self {
            binary: binary.into(),
            language: language.to_string(),
            page_segmentation,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Validate language code to prevent argument injection
    fn validate_language(lang: &str) -> Result<(), OcrError> {
        // e.g. "eng", "eng+deu", "chi_sim"
        if lang.is_empty() || lang.len() > 32 {
            return Err(OcrError::InvalidLanguage(lang.to_string()));
        }
        if !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '_') {
            return Err(OcrError::InvalidLanguage(lang.to_string()));
        }
        Ok(())
    }

    /// Installed language packs
    pub async fn installed_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OcrError::EngineUnavailable(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(OcrError::EngineUnavailable(
                "tesseract --list-langs failed".to_string(),
            ));
        }

        Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_segmentation.to_string())
            .arg("tsv");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn is_available(&self) -> bool {
        self.ensure_available().await.is_ok()
    }

    async fn ensure_available(&self) -> Result<(), OcrError> {
        Self::validate_language(&self.language)?;

        let installed = self.installed_languages().await?;
        match self
            .language
            .split('+')
            .find(|lang| !installed.iter().any(|have| have == lang))
        {
            Some(missing) => Err(OcrError::LanguageUnavailable(missing.to_string())),
            None => Ok(()),
        }
    }

    async fn recognize(&self, page: &RasterPage) -> Result<Option<OcrResult>, OcrError> {
        Self::validate_language(&self.language)?;

        let Some(image) = page.to_image() else {
            return Ok(None);
        };

        let png = tokio::task::spawn_blocking(move || encode_png(image))
            .await
            .map_err(|e| OcrError::ImageEncoding(format!("Task join error: {}", e)))??;

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| OcrError::EngineUnavailable(format!("Failed to spawn tesseract: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&png).await {
                let _ = child.kill().await;
                return Err(OcrError::ProcessingError(format!(
                    "Failed to write to tesseract stdin: {}",
                    e
                )));
            }
            if let Err(e) = stdin.flush().await {
                let _ = child.kill().await;
                return Err(OcrError::ProcessingError(format!(
                    "Failed to flush tesseract stdin: {}",
                    e
                )));
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| {
                OcrError::ProcessingError(format!("Failed to wait for tesseract: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Failed loading language") {
                return Err(OcrError::LanguageUnavailable(self.language.clone()));
            }
            return Err(OcrError::ProcessingError(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        let lines = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        let result = OcrResult::from_lines(lines);

        tracing::debug!(
            "tesseract recognized {} words on {}x{} raster",
            result.word_count(),
            page.width,
            page.height
        );

        if result.is_blank() {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }
}

fn encode_png(image: image::RgbaImage) -> Result<Vec<u8>, OcrError> {
    let mut output = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncoding(e.to_string()))?;
    Ok(output)
}

/// `--list-langs` prints a header line, then one language per line
fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(' '))
        .map(str::to_string)
        .collect()
}

/// Mock engine for testing
#[cfg(test)]
pub struct MockEngine {
    pub response: Option<OcrResult>,
    pub available: bool,
}

#[cfg(test)]
#[async_trait]
impl OcrEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(&self, _page: &RasterPage) -> Result<Option<OcrResult>, OcrError> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_validation() {
        assert!(TesseractEngine::validate_language("eng").is_ok());
        assert!(TesseractEngine::validate_language("eng+deu").is_ok());
        assert!(TesseractEngine::validate_language("chi_sim").is_ok());
        assert!(TesseractEngine::validate_language("").is_err());
        assert!(TesseractEngine::validate_language("eng --tessdata-dir /tmp").is_err());
        assert!(TesseractEngine::validate_language("eng;rm").is_err());
    }

    #[test]
    fn test_parse_language_list() {
        let stdout = "List of available languages in \"/usr/share/tesseract-ocr/5/tessdata/\" (3):\neng\nosd\ndeu\n";
        assert_eq!(parse_language_list(stdout), vec!["eng", "osd", "deu"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-binary", "eng", 3);
        assert!(!engine.is_available().await);

        let err = engine.ensure_available().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_empty_raster_has_no_result() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-binary", "eng", 3);
        let result = engine.recognize(&RasterPage::new(0, 0, Vec::new())).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_mock_engine_default_check() {
        let engine = MockEngine {
            response: None,
            available: false,
        };
        let err = engine.ensure_available().await.unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable(name) if name == "mock"));
    }
}
