//! services/api/src/adapters/extract/pptx.rs
//!
//! Reads text frames from every slide of an OOXML presentation, in slide order.

use std::io::{Cursor, Read};
use std::sync::LazyLock;

use coursemate_core::ports::ExtractionError;
use regex::Regex;

use super::{unescape_xml, FormatExtractor, TextAccumulator};

static SLIDE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());
static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a:p[\s>].*?</a:p>").unwrap());
static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>").unwrap());

pub struct PptxExtractor;

/// Slide part names sorted by slide number (`slide10` after `slide9`).
fn slide_parts<R: Read + std::io::Seek>(archive: &zip::ZipArchive<R>) -> Vec<String> {
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = SLIDE_PART.captures(name)?[1].parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);
    slides.into_iter().map(|(_, name)| name).collect()
}

impl FormatExtractor for PptxExtractor {
    fn extract(&self, data: &[u8], max_chars: usize) -> Result<String, ExtractionError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|e| ExtractionError::Failed(format!("not an OOXML presentation: {e}")))?;

        let mut text = TextAccumulator::new(max_chars);
        'slides: for part in slide_parts(&archive) {
            let mut xml = String::new();
            archive
                .by_name(&part)
                .map_err(|e| ExtractionError::Failed(format!("missing {part}: {e}")))?
                .read_to_string(&mut xml)
                .map_err(|e| ExtractionError::Failed(format!("unreadable {part}: {e}")))?;

            for paragraph in PARAGRAPH.find_iter(&xml) {
                let line: String = TEXT_RUN
                    .captures_iter(paragraph.as_str())
                    .map(|run| unescape_xml(&run[1]))
                    .collect();
                if !text.push(&line) {
                    break 'slides;
                }
            }
        }
        Ok(text.finish())
    }
}
