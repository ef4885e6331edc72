//! Content-stream building
//!
//! Turns placed glyph runs into one self-contained `q ... Q` block of
//! content-stream operators drawing invisible text.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::fonts::FontEncoding;
use super::types::PlacedGlyphRun;

/// Resource key of the zero-alpha graphics state
pub const ZERO_ALPHA_GS_KEY: &str = "GS_OCR";

/// How the text is kept invisible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvisibleText {
    /// Text rendering mode 3: glyphs are neither filled nor stroked
    #[default]
    RenderMode,
    /// Normal fill mode under an ExtGState with zero fill and stroke alpha
    ZeroAlpha,
}

impl InvisibleText {
    /// ExtGState key this strategy needs registered on the page, if any
    pub fn graphics_state_key(self) -> Option<&'static str> {
        match self {
            Self::RenderMode => None,
            Self::ZeroAlpha => Some(ZERO_ALPHA_GS_KEY),
        }
    }
}

impl std::str::FromStr for InvisibleText {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "render-mode" | "mode3" => Ok(Self::RenderMode),
            "zero-alpha" => Ok(Self::ZeroAlpha),
            other => Err(format!("unknown invisible text strategy: {}", other)),
        }
    }
}

/// One balanced `q ... Q` block of content-stream bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStreamFragment(Vec<u8>);

impl ContentStreamFragment {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accumulates glyph runs and emits a fragment
pub struct ContentStreamBuilder {
    strategy: InvisibleText,
    encoding: FontEncoding,
    body: Vec<u8>,
    runs: usize,
}

impl ContentStreamBuilder {
    pub fn new(strategy: InvisibleText, encoding: FontEncoding) -> Self {
        Self {
            strategy,
            encoding,
            body: Vec::new(),
            runs: 0,
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs
    }

    /// Append font selection, text matrix and show-text for one run
    pub fn push(&mut self, run: &PlacedGlyphRun) -> &mut Self {
        let [a, b, c, d, e, f] = run.text_matrix();

        let mut ops = String::new();
        let _ = writeln!(ops, "/{} {} Tf", run.font_key, format_number(run.font_size));
        let _ = writeln!(
            ops,
            "{} {} {} {} {} {} Tm",
            format_matrix_entry(a),
            format_matrix_entry(b),
            format_matrix_entry(c),
            format_matrix_entry(d),
            format_number(e),
            format_number(f)
        );

        self.body.extend_from_slice(ops.as_bytes());
        self.body.push(b'(');
        self.body
            .extend_from_slice(&escape_literal(&self.encoding.encode(&run.text)));
        self.body.extend_from_slice(b") Tj\n");

        self.runs += 1;
        self
    }

    pub fn extend<'a>(&mut self, runs: impl IntoIterator<Item = &'a PlacedGlyphRun>) -> &mut Self {
        for run in runs {
            self.push(run);
        }
        self
    }

    /// Wrap the accumulated runs in graphics-state and text-object brackets
    pub fn finish(self) -> ContentStreamFragment {
        let mut out = Vec::with_capacity(self.body.len() + 48);

        out.extend_from_slice(b"q\n");
        if let Some(gs_key) = self.strategy.graphics_state_key() {
            out.extend_from_slice(format!("/{} gs\n", gs_key).as_bytes());
        }
        out.extend_from_slice(b"BT\n");
        match self.strategy {
            InvisibleText::RenderMode => out.extend_from_slice(b"3 Tr\n"),
            InvisibleText::ZeroAlpha => out.extend_from_slice(b"0 Tr\n"),
        }
        out.extend_from_slice(&self.body);
        out.extend_from_slice(b"ET\nQ\n");

        ContentStreamFragment(out)
    }
}

/// Fixed two-decimal formatting; never locale dependent
pub fn format_number(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    // "-0.00" is valid but noisy
    if formatted == "-0.00" {
        "0.00".to_string()
    } else {
        formatted
    }
}

/// Rotation entries are always -1, 0 or 1
fn format_matrix_entry(value: f64) -> String {
    format!("{}", value.round() as i64)
}

/// Escape bytes for a PDF literal string body
///
/// Backslash and both parentheses get a leading backslash. Carriage return is
/// written as `\r` because readers normalise a raw CR to LF.
pub fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 8);
    for &byte in bytes {
        match byte {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::types::PageRotation;
    use lopdf::content::Content;
    use lopdf::Object;

    fn run(text: &str, x: f64, y: f64, size: f64) -> PlacedGlyphRun {
        PlacedGlyphRun {
            font_key: "F_OCR".to_string(),
            font_size: size,
            x,
            y,
            rotation: PageRotation::None,
            text: text.to_string(),
        }
    }

    fn as_text(fragment: &ContentStreamFragment) -> String {
        String::from_utf8(fragment.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_render_mode_fragment_layout() {
        let mut builder =
            ContentStreamBuilder::new(InvisibleText::RenderMode, FontEncoding::WinAnsi);
        builder.push(&run("Invoice", 17.4193, 764.9076, 3.8376));

        let fragment = builder.finish();
        assert_eq!(
            as_text(&fragment),
            "q\nBT\n3 Tr\n/F_OCR 3.84 Tf\n1 0 0 1 17.42 764.91 Tm\n(Invoice) Tj\nET\nQ\n"
        );
    }

    #[test]
    fn test_runs_keep_input_order() {
        let mut builder =
            ContentStreamBuilder::new(InvisibleText::RenderMode, FontEncoding::WinAnsi);
        builder.extend(&[run("first", 1.0, 2.0, 10.0), run("second", 3.0, 4.0, 10.0)]);
        assert_eq!(builder.run_count(), 2);

        let text = as_text(&builder.finish());
        let first = text.find("(first)").unwrap();
        let second = text.find("(second)").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_zero_alpha_fragment_selects_graphics_state() {
        let mut builder =
            ContentStreamBuilder::new(InvisibleText::ZeroAlpha, FontEncoding::WinAnsi);
        builder.push(&run("Total", 10.0, 20.0, 12.0));

        let text = as_text(&builder.finish());
        assert!(text.starts_with("q\n/GS_OCR gs\nBT\n0 Tr\n"));
        assert!(!text.contains("3 Tr"));
        assert!(text.ends_with("ET\nQ\n"));
    }

    #[test]
    fn test_numbers_use_decimal_point() {
        assert_eq!(format_number(12.3456), "12.35");
        assert_eq!(format_number(1000.0), "1000.00");
        assert_eq!(format_number(-0.001), "0.00");
        assert_eq!(format_number(-12.346), "-12.35");
    }

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(escape_literal(b"a(b)c\\d"), b"a\\(b\\)c\\\\d".to_vec());
        assert_eq!(escape_literal(b"line\rbreak"), b"line\\rbreak".to_vec());
        assert_eq!(escape_literal(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn test_escaped_literals_parse_back() {
        let samples = [
            "(", ")", "\\", "()", ")(", "\\(", "\\)", "a\\\\b", "((nested))", "x)y(z\\",
            "end\\",
        ];

        let mut builder =
            ContentStreamBuilder::new(InvisibleText::RenderMode, FontEncoding::WinAnsi);
        for sample in samples {
            builder.push(&run(sample, 0.0, 0.0, 10.0));
        }
        let fragment = builder.finish();

        let content = Content::decode(fragment.as_bytes()).unwrap();
        let shown: Vec<Vec<u8>> = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| match &op.operands[0] {
                Object::String(bytes, _) => bytes.clone(),
                other => panic!("unexpected operand {:?}", other),
            })
            .collect();

        let expected: Vec<Vec<u8>> = samples.iter().map(|s| s.as_bytes().to_vec()).collect();
        assert_eq!(shown, expected);
    }

    #[test]
    fn test_fragment_is_balanced() {
        let mut builder =
            ContentStreamBuilder::new(InvisibleText::RenderMode, FontEncoding::WinAnsi);
        builder.push(&run("a", 0.0, 0.0, 1.0));
        let fragment = builder.finish();

        let content = Content::decode(fragment.as_bytes()).unwrap();
        let operators: Vec<&str> = content
            .operations
            .iter()
            .map(|op| op.operator.as_str())
            .collect();
        assert_eq!(operators, vec!["q", "BT", "Tr", "Tf", "Tm", "Tj", "ET", "Q"]);
    }

    #[test]
    fn test_rotated_run_matrix() {
        let mut rotated = run("Side", 12.0, 10.0, 9.0);
        rotated.rotation = PageRotation::Clockwise90;

        let mut builder =
            ContentStreamBuilder::new(InvisibleText::RenderMode, FontEncoding::WinAnsi);
        builder.push(&rotated);

        assert!(as_text(&builder.finish()).contains("0 1 -1 0 12.00 10.00 Tm"));
    }
}
