//! Tesseract TSV output parsing
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num, left,
//! top, width, height, conf, text. Level 5 rows are words; rows of lower
//! levels only describe layout and are skipped.

use super::types::{OcrLine, OcrWord, PixelRect};

const WORD_LEVEL: u32 = 5;

#[derive(Debug)]
struct TsvRow<'a> {
    level: u32,
    line_key: (u32, u32, u32, u32),
    bounds: PixelRect,
    confidence: f64,
    text: &'a str,
}

impl<'a> TsvRow<'a> {
    /// `None` for the header and any malformed row
    fn parse(row: &'a str) -> Option<Self> {
        let mut fields = row.splitn(12, '\t');
        let mut int = || fields.next()?.trim().parse::<i64>().ok();

        let level = int()?;
        let page = int()?;
        let block = int()?;
        let par = int()?;
        let line = int()?;
        let _word = int()?;
        let left = int()?;
        let top = int()?;
        let width = int()?;
        let height = int()?;

        let confidence = fields.next()?.trim().parse::<f64>().ok()?;
        // Empty text may be dropped together with its separator
        let text = fields.next().unwrap_or("").trim_end_matches(['\r', '\n']);

        Some(Self {
            level: u32::try_from(level).ok()?,
            line_key: (
                u32::try_from(page).ok()?,
                u32::try_from(block).ok()?,
                u32::try_from(par).ok()?,
                u32::try_from(line).ok()?,
            ),
            bounds: PixelRect {
                x: left as f64,
                y: top as f64,
                width: width as f64,
                height: height as f64,
            },
            confidence,
            text,
        })
    }
}

/// Group recognized words into lines, in the order tesseract reports them.
/// Words with negative confidence or blank text are dropped.
pub fn parse_tsv(tsv: &str) -> Vec<OcrLine> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key = None;

    for row in tsv.lines().filter_map(TsvRow::parse) {
        if row.level != WORD_LEVEL || row.confidence < 0.0 || row.text.trim().is_empty() {
            continue;
        }

        if current_key != Some(row.line_key) {
            lines.push(OcrLine::default());
            current_key = Some(row.line_key);
        }

        if let Some(line) = lines.last_mut() {
            line.words.push(OcrWord {
                text: row.text.trim().to_string(),
                confidence: row.confidence,
                bounds: row.bounds,
            });
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2480\t3208\t-1\t
2\t1\t1\t0\t0\t0\t72\t100\t400\t60\t-1\t
3\t1\t1\t1\t0\t0\t72\t100\t400\t60\t-1\t
4\t1\t1\t1\t1\t0\t72\t100\t400\t20\t-1\t
5\t1\t1\t1\t1\t1\t72\t100\t80\t20\t96.5\tInvoice
5\t1\t1\t1\t1\t2\t160\t100\t40\t20\t91.2\t#42
4\t1\t1\t1\t2\t0\t72\t140\t200\t20\t-1\t
5\t1\t1\t1\t2\t1\t72\t140\t60\t20\t88\tTotal:
5\t1\t1\t1\t2\t2\t140\t140\t10\t20\t12.0\t
5\t1\t1\t1\t2\t3\t160\t140\t70\t20\t93.75\t$1,200
";

    #[test]
    fn test_groups_words_by_line() {
        let lines = parse_tsv(SAMPLE);
        assert_eq!(lines.len(), 2);

        let first: Vec<&str> = lines[0].words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(first, vec!["Invoice", "#42"]);

        let second: Vec<&str> = lines[1].words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(second, vec!["Total:", "$1,200"]);
    }

    #[test]
    fn test_word_bounds_and_confidence() {
        let lines = parse_tsv(SAMPLE);
        let invoice = &lines[0].words[0];

        assert_eq!(
            invoice.bounds,
            PixelRect {
                x: 72.0,
                y: 100.0,
                width: 80.0,
                height: 20.0
            }
        );
        assert_eq!(invoice.confidence, 96.5);
    }

    #[test]
    fn test_crlf_and_missing_text_column() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\r\n\
5\t1\t1\t1\t1\t1\t1\t2\t3\t4\t50\r\n\
5\t1\t1\t1\t1\t2\t5\t2\t3\t4\t50\tok\r\n";

        let lines = parse_tsv(tsv);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].words.len(), 1);
        assert_eq!(lines[0].words[0].text, "ok");
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("Error in pixReadMem\nnot\ttsv\n").is_empty());
    }

    #[test]
    fn test_low_confidence_marker_skipped() {
        let tsv = "5\t1\t1\t1\t1\t1\t1\t2\t3\t4\t-1\tghost\n";
        assert!(parse_tsv(tsv).is_empty());
    }
}
