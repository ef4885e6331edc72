//! Configuration management for scanlayer
//!
//! Settings come from `SCANLAYER_*` environment variables (a `.env` file is
//! loaded first by the binary). Watched folders live in a separate JSON
//! watch list that the `watch` command reads and updates.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::overlay::{
    FontSizing, FontStrategy, InvisibleText, OverlayOptions, FONT_SIZE_RATIO, MIN_FONT_SIZE,
    OCR_FONT_KEY,
};
use crate::pipeline::PipelineOptions;
use crate::render::{RasterLimits, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub render: RenderConfig,
    pub ocr: OcrConfig,
    pub overlay: OverlayConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub backend: RenderBackend,
    pub pdftoppm_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    Pdftoppm,
    Mupdf,
}

impl FromStr for RenderBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdftoppm" | "poppler" => Ok(Self::Pdftoppm),
            "mupdf" => Ok(Self::Mupdf),
            other => Err(format!("unknown renderer: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub tesseract_path: PathBuf,
    /// Tesseract language, e.g. "eng" or "eng+deu"
    pub language: String,
    /// Tesseract page segmentation mode
    pub page_segmentation: u8,
    pub page_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub font: FontStrategy,
    pub glyphless_font_path: Option<PathBuf>,
    pub invisible_text: InvisibleText,
    pub font_size_ratio: f64,
    pub min_font_size: f64,
    pub isolate_existing_content: bool,
    pub compress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub watch_list_path: PathBuf,
    /// Polls before giving up on a file that is still being written
    pub ready_retries: u32,
    pub ready_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            render: RenderConfig {
                max_width: DEFAULT_MAX_WIDTH,
                max_height: DEFAULT_MAX_HEIGHT,
                backend: RenderBackend::Pdftoppm,
                pdftoppm_path: PathBuf::from("pdftoppm"),
            },
            ocr: OcrConfig {
                tesseract_path: PathBuf::from("tesseract"),
                language: "eng".to_string(),
                page_segmentation: 3,
                page_timeout_secs: 120,
            },
            overlay: OverlayConfig {
                font: FontStrategy::Standard,
                glyphless_font_path: None,
                invisible_text: InvisibleText::RenderMode,
                font_size_ratio: FONT_SIZE_RATIO,
                min_font_size: MIN_FONT_SIZE,
                isolate_existing_content: true,
                compress: true,
            },
            watch: WatchConfig {
                watch_list_path: default_watch_list_path(|key| env::var(key).ok()),
                ready_retries: 30,
                ready_interval_ms: 1000,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any variable source; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            render: RenderConfig {
                max_width: parse_or(
                    var("SCANLAYER_MAX_WIDTH"),
                    "SCANLAYER_MAX_WIDTH",
                    defaults.render.max_width,
                )?,
                max_height: parse_or(
                    var("SCANLAYER_MAX_HEIGHT"),
                    "SCANLAYER_MAX_HEIGHT",
                    defaults.render.max_height,
                )?,
                backend: parse_or(
                    var("SCANLAYER_RENDERER"),
                    "SCANLAYER_RENDERER",
                    defaults.render.backend,
                )?,
                pdftoppm_path: var("SCANLAYER_PDFTOPPM")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.render.pdftoppm_path),
            },
            ocr: OcrConfig {
                tesseract_path: var("SCANLAYER_TESSERACT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ocr.tesseract_path),
                language: var("SCANLAYER_LANGUAGE").unwrap_or(defaults.ocr.language),
                page_segmentation: parse_or(
                    var("SCANLAYER_PSM"),
                    "SCANLAYER_PSM",
                    defaults.ocr.page_segmentation,
                )?,
                page_timeout_secs: parse_or(
                    var("SCANLAYER_PAGE_TIMEOUT_SECS"),
                    "SCANLAYER_PAGE_TIMEOUT_SECS",
                    defaults.ocr.page_timeout_secs,
                )?,
            },
            overlay: OverlayConfig {
                font: parse_or(var("SCANLAYER_FONT"), "SCANLAYER_FONT", defaults.overlay.font)?,
                glyphless_font_path: var("SCANLAYER_GLYPHLESS_FONT").map(PathBuf::from),
                invisible_text: parse_or(
                    var("SCANLAYER_INVISIBLE_TEXT"),
                    "SCANLAYER_INVISIBLE_TEXT",
                    defaults.overlay.invisible_text,
                )?,
                font_size_ratio: parse_or(
                    var("SCANLAYER_FONT_SIZE_RATIO"),
                    "SCANLAYER_FONT_SIZE_RATIO",
                    defaults.overlay.font_size_ratio,
                )?,
                min_font_size: parse_or(
                    var("SCANLAYER_MIN_FONT_SIZE"),
                    "SCANLAYER_MIN_FONT_SIZE",
                    defaults.overlay.min_font_size,
                )?,
                isolate_existing_content: parse_flag(
                    var("SCANLAYER_ISOLATE_CONTENT"),
                    "SCANLAYER_ISOLATE_CONTENT",
                    defaults.overlay.isolate_existing_content,
                )?,
                compress: parse_flag(
                    var("SCANLAYER_COMPRESS"),
                    "SCANLAYER_COMPRESS",
                    defaults.overlay.compress,
                )?,
            },
            watch: WatchConfig {
                watch_list_path: var("SCANLAYER_WATCH_LIST")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| default_watch_list_path(&lookup)),
                ready_retries: parse_or(
                    var("SCANLAYER_READY_RETRIES"),
                    "SCANLAYER_READY_RETRIES",
                    defaults.watch.ready_retries,
                )?,
                ready_interval_ms: parse_or(
                    var("SCANLAYER_READY_INTERVAL_MS"),
                    "SCANLAYER_READY_INTERVAL_MS",
                    defaults.watch.ready_interval_ms,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.render.max_width == 0 || self.render.max_height == 0 {
            return Err(Error::Config("raster limits must be positive".to_string()));
        }
        if !(self.overlay.font_size_ratio.is_finite() && self.overlay.font_size_ratio > 0.0) {
            return Err(Error::Config("font size ratio must be a positive number".to_string()));
        }
        if !(self.overlay.min_font_size.is_finite() && self.overlay.min_font_size > 0.0) {
            return Err(Error::Config("minimum font size must be a positive number".to_string()));
        }
        if self.overlay.font == FontStrategy::Glyphless
            && self.overlay.glyphless_font_path.is_none()
        {
            return Err(Error::Config(
                "SCANLAYER_GLYPHLESS_FONT is required for the glyphless font".to_string(),
            ));
        }
        if self.ocr.page_timeout_secs == 0 {
            return Err(Error::Config("page timeout must be at least one second".to_string()));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            limits: RasterLimits {
                max_width: self.render.max_width,
                max_height: self.render.max_height,
            },
            overlay: OverlayOptions {
                font_key: OCR_FONT_KEY.to_string(),
                sizing: FontSizing {
                    ratio: self.overlay.font_size_ratio,
                    min_points: self.overlay.min_font_size,
                },
                invisible_text: self.overlay.invisible_text,
                isolate_existing_content: self.overlay.isolate_existing_content,
                compress: self.overlay.compress,
            },
            page_timeout: Duration::from_secs(self.ocr.page_timeout_secs),
        }
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.watch.ready_interval_ms)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>, key: &str, default: bool) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("{}={:?}: expected a boolean", key, v))),
        },
    }
}

fn default_watch_list_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join("scanlayer").join("watch.json");
    }
    match lookup("HOME").filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home).join(".config").join("scanlayer").join("watch.json"),
        None => PathBuf::from("scanlayer-watch.json"),
    }
}

/// A folder to watch and where to keep copies of the originals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub folder_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

/// Persisted set of watched folders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchList {
    #[serde(default)]
    pub watched_folders: Vec<WatchedFolder>,
}

impl WatchList {
    /// Load the list; a missing or unreadable file gives an empty list
    pub fn load(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read watch list {}: {}", path.display(), e);
                }
                return Self::default();
            }
        };

        match serde_json::from_str(&data) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Ignoring corrupt watch list {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Add or update a folder. Returns true if the list changed.
    pub fn upsert(&mut self, folder_path: PathBuf, backup_path: Option<PathBuf>) -> bool {
        match self
            .watched_folders
            .iter_mut()
            .find(|f| f.folder_path == folder_path)
        {
            Some(existing) if existing.backup_path == backup_path => false,
            Some(existing) => {
                existing.backup_path = backup_path;
                true
            }
            None => {
                self.watched_folders.push(WatchedFolder {
                    folder_path,
                    backup_path,
                });
                true
            }
        }
    }

    /// Drop `folder_path`, matched as given or in canonical form
    pub fn remove(&mut self, folder_path: &Path) -> bool {
        let canonical = folder_path.canonicalize().ok();
        let before = self.watched_folders.len();
        self.watched_folders.retain(|f| {
            f.folder_path != folder_path && Some(&f.folder_path) != canonical.as_ref()
        });
        self.watched_folders.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.watched_folders.is_empty()
    }
}
