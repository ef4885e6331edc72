//! Font resources for the text layer
//!
//! Two interchangeable faces are supported:
//!
//! - **Standard**: non-embedded Type1 Helvetica with WinAnsi encoding. Adds no
//!   font bytes; characters outside Windows-1252 are written as `?`.
//! - **Glyphless**: a TrueType face whose glyphs have no outline, embedded
//!   once per document as a Type0 font with `Identity-H` encoding and an
//!   identity `ToUnicode` map, so any BMP character stays extractable.
//!
//! The glyphless font bytes are read once at startup and shared read-only.

use std::path::Path;
use std::sync::Arc;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};

use super::error::{FontError, OverlayError};
use super::resources::{ensure_resource, resource_entry, Registration};

/// Resource key the text layer's font is registered under
pub const OCR_FONT_KEY: &str = "F_OCR";

/// PostScript name used for the embedded glyphless face
pub const GLYPHLESS_FONT_NAME: &str = "GlyphLessFont";

/// Every CID maps to glyph 1 of the glyphless face
const CID_COUNT: usize = 0x1_0000;

const IDENTITY_TO_UNICODE: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0000> <FFFF> <0000>
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

/// Which face the text layer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStrategy {
    #[default]
    Standard,
    Glyphless,
}

impl std::str::FromStr for FontStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "helvetica" => Ok(Self::Standard),
            "glyphless" => Ok(Self::Glyphless),
            other => Err(format!("unknown font strategy: {}", other)),
        }
    }
}

/// How show-text operands are encoded for the registered font
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontEncoding {
    /// One byte per character, Windows-1252
    WinAnsi,
    /// Two bytes per UTF-16 code unit, big endian
    IdentityH,
}

impl FontEncoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::WinAnsi => text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect(),
            Self::IdentityH => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// Encoding implied by a font dictionary's `/Encoding`
    pub fn of_font(font: &Dictionary) -> Self {
        match font.get(b"Encoding").and_then(Object::as_name) {
            Ok(b"Identity-H") => Self::IdentityH,
            _ => Self::WinAnsi,
        }
    }
}

/// Windows-1252 byte for a character, if it has one
fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => {
            let byte = match c {
                '\u{20AC}' => 0x80,
                '\u{201A}' => 0x82,
                '\u{0192}' => 0x83,
                '\u{201E}' => 0x84,
                '\u{2026}' => 0x85,
                '\u{2020}' => 0x86,
                '\u{2021}' => 0x87,
                '\u{02C6}' => 0x88,
                '\u{2030}' => 0x89,
                '\u{0160}' => 0x8A,
                '\u{2039}' => 0x8B,
                '\u{0152}' => 0x8C,
                '\u{017D}' => 0x8E,
                '\u{2018}' => 0x91,
                '\u{2019}' => 0x92,
                '\u{201C}' => 0x93,
                '\u{201D}' => 0x94,
                '\u{2022}' => 0x95,
                '\u{2013}' => 0x96,
                '\u{2014}' => 0x97,
                '\u{02DC}' => 0x98,
                '\u{2122}' => 0x99,
                '\u{0161}' => 0x9A,
                '\u{203A}' => 0x9B,
                '\u{0153}' => 0x9C,
                '\u{017E}' => 0x9E,
                '\u{0178}' => 0x9F,
                _ => return None,
            };
            Some(byte)
        }
    }
}

/// TrueType bytes of a face with zero-area glyphs
#[derive(Debug)]
pub struct GlyphlessFont {
    data: Arc<[u8]>,
}

impl GlyphlessFont {
    /// Read and validate the font file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FontError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| FontError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_bytes(data, &path.display().to_string())
    }

    pub fn from_bytes(data: Vec<u8>, origin: &str) -> Result<Self, FontError> {
        if !is_truetype(&data) {
            return Err(FontError::NotTrueType(origin.to_string()));
        }
        Ok(Self { data: data.into() })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn is_truetype(data: &[u8]) -> bool {
    data.len() >= 12 && (data[..4] == [0x00, 0x01, 0x00, 0x00] || &data[..4] == b"true")
}

/// Supplies the text-layer font; built once at startup and shared
#[derive(Debug, Clone)]
pub enum FontProvider {
    Standard,
    Glyphless(Arc<GlyphlessFont>),
}

impl FontProvider {
    /// Resolve the configured strategy; a missing glyphless font is fatal here
    pub fn from_strategy(
        strategy: FontStrategy,
        font_path: Option<&Path>,
    ) -> Result<Self, FontError> {
        match strategy {
            FontStrategy::Standard => Ok(Self::Standard),
            FontStrategy::Glyphless => {
                let path = font_path.ok_or(FontError::MissingPath)?;
                let font = GlyphlessFont::load(path)?;
                tracing::info!(
                    "Loaded glyphless font from {} ({} bytes)",
                    path.display(),
                    font.data().len()
                );
                Ok(Self::Glyphless(Arc::new(font)))
            }
        }
    }

    pub fn strategy(&self) -> FontStrategy {
        match self {
            Self::Standard => FontStrategy::Standard,
            Self::Glyphless(_) => FontStrategy::Glyphless,
        }
    }

    pub fn encoding(&self) -> FontEncoding {
        match self {
            Self::Standard => FontEncoding::WinAnsi,
            Self::Glyphless(_) => FontEncoding::IdentityH,
        }
    }

    /// Per-document registrar; the font object is created at most once per document
    pub fn registrar(&self) -> FontRegistrar<'_> {
        FontRegistrar {
            provider: self,
            font_id: None,
        }
    }

    fn create_font_object(&self, doc: &mut Document) -> Result<ObjectId, OverlayError> {
        match self {
            Self::Standard => Ok(doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })),
            Self::Glyphless(font) => embed_glyphless(doc, font),
        }
    }
}

/// Registers the text-layer font on the pages of one document
pub struct FontRegistrar<'a> {
    provider: &'a FontProvider,
    font_id: Option<ObjectId>,
}

impl FontRegistrar<'_> {
    pub fn encoding(&self) -> FontEncoding {
        self.provider.encoding()
    }

    /// Encoding of the font the page actually has under `key`.
    ///
    /// Differs from [`Self::encoding`] when an earlier pass registered the
    /// key with the other strategy.
    pub fn encoding_on(&self, doc: &Document, page_id: ObjectId, key: &str) -> FontEncoding {
        let expected = self.provider.encoding();
        let Some(font) = resource_entry(doc, page_id, "Font", key) else {
            return expected;
        };

        let found = FontEncoding::of_font(font);
        if found != expected {
            tracing::warn!(
                "Font /{} already on the page uses {:?}, encoding text for it instead of {:?}",
                key,
                found,
                expected
            );
        }
        found
    }

    pub(crate) fn cached_font(&self) -> Option<ObjectId> {
        self.font_id
    }

    /// Forget a font object that was rolled back out of the document
    pub(crate) fn reset_cache(&mut self, font_id: Option<ObjectId>) {
        self.font_id = font_id;
    }

    /// Ensure `key` names the text-layer font in the page's `/Font` resources.
    /// A key that is already present is left alone.
    pub fn ensure(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        key: &str,
    ) -> Result<Registration, OverlayError> {
        let provider = self.provider;
        let cached = &mut self.font_id;

        ensure_resource(doc, page_id, "Font", key, |doc| {
            if let Some(id) = *cached {
                return Ok(id);
            }
            let id = provider.create_font_object(doc)?;
            *cached = Some(id);
            Ok(id)
        })
    }
}

fn compressed_stream(dict: Dictionary, content: Vec<u8>) -> Result<Stream, OverlayError> {
    let mut stream = Stream::new(dict, content);
    stream
        .compress()
        .map_err(|e| OverlayError::Compression(e.to_string()))?;
    Ok(stream)
}

fn embed_glyphless(doc: &mut Document, font: &GlyphlessFont) -> Result<ObjectId, OverlayError> {
    let font_file = compressed_stream(
        dictionary! { "Length1" => font.data().len() as i64 },
        font.data().to_vec(),
    )?;
    let font_file_id = doc.add_object(font_file);

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => GLYPHLESS_FONT_NAME,
        "Flags" => 5,
        "FontBBox" => vec![0.into(), 0.into(), 500.into(), 1000.into()],
        "ItalicAngle" => 0,
        "Ascent" => 1000,
        "Descent" => 0,
        "CapHeight" => 1000,
        "StemV" => 80,
        "FontFile2" => font_file_id,
    });

    let gid_map: Vec<u8> = std::iter::repeat([0x00u8, 0x01u8])
        .take(CID_COUNT)
        .flatten()
        .collect();
    let gid_map_id = doc.add_object(compressed_stream(Dictionary::new(), gid_map)?);

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => GLYPHLESS_FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 500,
        "CIDToGIDMap" => gid_map_id,
    });

    let to_unicode_id = doc.add_object(compressed_stream(
        Dictionary::new(),
        IDENTITY_TO_UNICODE.as_bytes().to_vec(),
    )?);

    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => GLYPHLESS_FONT_NAME,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fake_truetype() -> Vec<u8> {
        let mut data = vec![0x00, 0x01, 0x00, 0x00];
        data.extend_from_slice(&[0u8; 60]);
        data
    }

    fn blank_page() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(FontEncoding::WinAnsi.encode("Total"), b"Total".to_vec());
        assert_eq!(FontEncoding::WinAnsi.encode("caf\u{e9}"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(FontEncoding::WinAnsi.encode("\u{20AC}5"), vec![0x80, b'5']);
        assert_eq!(FontEncoding::WinAnsi.encode("\u{4E2D}"), b"?".to_vec());
    }

    #[test]
    fn test_identity_h_encoding() {
        assert_eq!(FontEncoding::IdentityH.encode("A\u{4E2D}"), vec![0x00, 0x41, 0x4E, 0x2D]);
    }

    #[test]
    fn test_standard_font_registered_once_per_page() {
        let provider = FontProvider::Standard;
        let (mut doc, page_id) = blank_page();
        let mut registrar = provider.registrar();

        let first = registrar.ensure(&mut doc, page_id, OCR_FONT_KEY).unwrap();
        let second = registrar.ensure(&mut doc, page_id, OCR_FONT_KEY).unwrap();

        let Registration::Added(font_id) = first else {
            panic!("font should be added");
        };
        assert_eq!(second, Registration::Existing);

        let font = doc.get_dictionary(font_id).unwrap();
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica");
        assert_eq!(font.get(b"Encoding").unwrap().as_name().unwrap(), b"WinAnsiEncoding");
    }

    #[test]
    fn test_glyphless_font_embedded_once_per_document() {
        let provider = FontProvider::Glyphless(Arc::new(
            GlyphlessFont::from_bytes(fake_truetype(), "test").unwrap(),
        ));
        assert_eq!(provider.encoding(), FontEncoding::IdentityH);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let first_page = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        let second_page = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });

        let mut registrar = provider.registrar();
        let Registration::Added(first_font) =
            registrar.ensure(&mut doc, first_page, OCR_FONT_KEY).unwrap()
        else {
            panic!("font should be added");
        };
        let objects_after_first = doc.objects.len();
        let Registration::Added(second_font) =
            registrar.ensure(&mut doc, second_page, OCR_FONT_KEY).unwrap()
        else {
            panic!("font should be referenced");
        };

        assert_eq!(first_font, second_font);
        assert_eq!(doc.objects.len(), objects_after_first);

        let font = doc.get_dictionary(first_font).unwrap();
        assert_eq!(font.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");
        assert_eq!(font.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
        assert!(font.has(b"ToUnicode"));
    }

    #[test]
    fn test_glyphless_font_must_be_truetype() {
        let err = GlyphlessFont::from_bytes(b"%PDF-1.4 not a font".to_vec(), "bogus").unwrap_err();
        assert!(matches!(err, FontError::NotTrueType(_)));
    }

    #[test]
    fn test_glyphless_strategy_requires_readable_file() {
        let missing = FontProvider::from_strategy(
            FontStrategy::Glyphless,
            Some(Path::new("/nonexistent/pdf.ttf")),
        );
        assert!(matches!(missing, Err(FontError::Unreadable { .. })));

        let no_path = FontProvider::from_strategy(FontStrategy::Glyphless, None);
        assert!(matches!(no_path, Err(FontError::MissingPath)));

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pdf.ttf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&fake_truetype())
            .unwrap();

        let provider = FontProvider::from_strategy(FontStrategy::Glyphless, Some(&path)).unwrap();
        assert_eq!(provider.strategy(), FontStrategy::Glyphless);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Glyphless".parse::<FontStrategy>().unwrap(), FontStrategy::Glyphless);
        assert_eq!("standard".parse::<FontStrategy>().unwrap(), FontStrategy::Standard);
        assert!("comic".parse::<FontStrategy>().is_err());
    }
}
