//! Page overlay
//!
//! Merges one page's OCR words into the page as an invisible text layer:
//! filter, map, register resources, build the stream, append it.

use lopdf::{dictionary, Document, ObjectId, Stream};
use serde::{Deserialize, Serialize};

use super::content::{ContentStreamBuilder, InvisibleText};
use super::error::OverlayError;
use super::fonts::{FontProvider, FontRegistrar, OCR_FONT_KEY};
use super::geometry::PageGeometry;
use super::mapper::{CoordinateMapper, FontSizing};
use super::resources::{
    attach_content_streams, ensure_resource, has_content, PageSnapshot, Registration,
};
use super::types::{PageOcrResult, PageOutcome, PlacedGlyphRun, SkipReason};

/// Tunables for the text layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayOptions {
    /// Resource key of the text-layer font
    pub font_key: String,
    pub sizing: FontSizing,
    pub invisible_text: InvisibleText,
    /// Wrap existing page content in `q`/`Q` before appending the layer
    pub isolate_existing_content: bool,
    /// Flate-compress the appended streams
    pub compress: bool,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            font_key: OCR_FONT_KEY.to_string(),
            sizing: FontSizing::default(),
            invisible_text: InvisibleText::RenderMode,
            isolate_existing_content: true,
            compress: true,
        }
    }
}

/// Applies text layers to the pages of one document.
///
/// Holds the per-document resource cache, so create one per document.
pub struct PageOverlayer<'a> {
    options: &'a OverlayOptions,
    fonts: FontRegistrar<'a>,
    graphics_state_id: Option<ObjectId>,
}

impl<'a> PageOverlayer<'a> {
    pub fn new(provider: &'a FontProvider, options: &'a OverlayOptions) -> Self {
        Self {
            options,
            fonts: provider.registrar(),
            graphics_state_id: None,
        }
    }

    /// Add the invisible text layer for `result` to the page.
    ///
    /// Pages without a result, with blank text or with no placeable words are
    /// left untouched. On error every object the overlay wrote is restored.
    pub fn apply(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        result: Option<&PageOcrResult>,
    ) -> Result<PageOutcome, OverlayError> {
        let Some(result) = result else {
            return Ok(PageOutcome::skipped(SkipReason::NoResult));
        };
        if !result.has_text() {
            return Ok(PageOutcome::skipped(SkipReason::EmptyText));
        }

        let words: Vec<_> = result.words().filter(|w| w.is_placeable()).collect();
        if words.is_empty() {
            return Ok(PageOutcome::skipped(SkipReason::NoPlaceableWords));
        }

        let options = self.options;
        let geometry = PageGeometry::of_page(doc, page_id)?;
        let Some(mapper) = CoordinateMapper::new(
            result.raster_width,
            result.raster_height,
            geometry,
            options.sizing,
        ) else {
            return Ok(PageOutcome::skipped(SkipReason::EmptyRaster));
        };

        let key = options.font_key.as_str();
        let runs: Vec<PlacedGlyphRun> = match options.invisible_text {
            InvisibleText::RenderMode => words
                .iter()
                .map(|word| mapper.place_baseline(word, key))
                .collect(),
            InvisibleText::ZeroAlpha => words
                .iter()
                .map(|word| mapper.run_from_box(&mapper.place_box(word), &word.text, key))
                .collect(),
        };

        let snapshot = PageSnapshot::capture(doc, page_id);
        let cached = (self.fonts.cached_font(), self.graphics_state_id);

        match self.write_layer(doc, page_id, &runs) {
            Ok(()) => Ok(PageOutcome::Applied { words: runs.len() }),
            Err(e) => {
                snapshot.restore(doc);
                self.fonts.reset_cache(cached.0);
                self.graphics_state_id = cached.1;
                Err(e)
            }
        }
    }

    /// Register resources and attach the streams. Leaves partial writes
    /// behind on error; `apply` rolls them back.
    fn write_layer(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        runs: &[PlacedGlyphRun],
    ) -> Result<(), OverlayError> {
        let options = self.options;
        let key = options.font_key.as_str();
        let had_content = has_content(doc, page_id)?;

        let encoding = match self.fonts.ensure(doc, page_id, key)? {
            Registration::Added(_) => self.fonts.encoding(),
            Registration::Existing => self.fonts.encoding_on(doc, page_id, key),
        };
        if let Some(gs_key) = options.invisible_text.graphics_state_key() {
            self.ensure_graphics_state(doc, page_id, gs_key)?;
        }

        let mut builder = ContentStreamBuilder::new(options.invisible_text, encoding);
        builder.extend(runs);
        let fragment = builder.finish();

        let overlay_id = self.add_stream(doc, fragment.into_bytes())?;
        if had_content && options.isolate_existing_content {
            let open_id = self.add_stream(doc, b"q\n".to_vec())?;
            let close_id = self.add_stream(doc, b"Q\n".to_vec())?;
            attach_content_streams(doc, page_id, Some(open_id), &[close_id, overlay_id])?;
        } else {
            attach_content_streams(doc, page_id, None, &[overlay_id])?;
        }

        Ok(())
    }

    fn ensure_graphics_state(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        key: &str,
    ) -> Result<(), OverlayError> {
        let cached = &mut self.graphics_state_id;
        ensure_resource(doc, page_id, "ExtGState", key, |doc| {
            if let Some(id) = *cached {
                return Ok(id);
            }
            let id = doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => 0,
                "CA" => 0,
            });
            *cached = Some(id);
            Ok(id)
        })?;
        Ok(())
    }

    fn add_stream(&self, doc: &mut Document, content: Vec<u8>) -> Result<ObjectId, OverlayError> {
        let mut stream = Stream::new(dictionary! {}, content);
        if self.options.compress {
            stream
                .compress()
                .map_err(|e| OverlayError::Compression(e.to_string()))?;
        }
        Ok(doc.add_object(stream))
    }
}
