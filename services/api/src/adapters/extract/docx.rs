//! services/api/src/adapters/extract/docx.rs
//!
//! Reads paragraph text from `word/document.xml` inside an OOXML package.

use std::io::{Cursor, Read};
use std::sync::LazyLock;

use coursemate_core::ports::ExtractionError;
use regex::Regex;

use super::{unescape_xml, FormatExtractor, TextAccumulator};

const DOCUMENT_PART: &str = "word/document.xml";

static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p[\s>].*?</w:p>").unwrap());
static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap());

pub struct DocxExtractor;

impl FormatExtractor for DocxExtractor {
    fn extract(&self, data: &[u8], max_chars: usize) -> Result<String, ExtractionError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|e| ExtractionError::Failed(format!("not an OOXML document: {e}")))?;

        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| ExtractionError::Failed(format!("missing {DOCUMENT_PART}: {e}")))?
            .read_to_string(&mut xml)
            .map_err(|e| ExtractionError::Failed(format!("unreadable {DOCUMENT_PART}: {e}")))?;

        let mut text = TextAccumulator::new(max_chars);
        for paragraph in PARAGRAPH.find_iter(&xml) {
            let line: String = TEXT_RUN
                .captures_iter(paragraph.as_str())
                .map(|run| unescape_xml(&run[1]))
                .collect();
            if !text.push(&line) {
                break;
            }
        }
        Ok(text.finish())
    }
}
