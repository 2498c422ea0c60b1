//! services/api/src/adapters/extract/pdf.rs

use std::io::Write;
use std::path::Path;

use coursemate_core::ports::ExtractionError;
use pdf_oxide::PdfDocument;
use tracing::debug;

use super::{FormatExtractor, TextAccumulator};

/// Pages read from one PDF before giving up on the rest.
pub const MAX_PDF_PAGES: usize = 50;

pub struct PdfExtractor {
    max_pages: usize,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            max_pages: MAX_PDF_PAGES,
        }
    }
}

impl PdfExtractor {
    pub fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }

    fn extract_pages(&self, path: &Path, max_chars: usize) -> Result<String, ExtractionError> {
        let mut doc = PdfDocument::open(path)
            .map_err(|e| ExtractionError::Failed(format!("failed to parse PDF: {e}")))?;

        let page_count = doc
            .page_count()
            .map_err(|e| ExtractionError::Failed(format!("failed to read page count: {e}")))?;

        let mut text = TextAccumulator::new(max_chars);
        for page_index in 0..page_count.min(self.max_pages) {
            // An unreadable page is skipped, not fatal.
            let page = doc.extract_text(page_index).unwrap_or_default();
            if !text.push(&page) {
                debug!(page_index, "PDF character ceiling reached, stopping early");
                break;
            }
        }
        Ok(text.finish())
    }
}

impl FormatExtractor for PdfExtractor {
    fn extract(&self, data: &[u8], max_chars: usize) -> Result<String, ExtractionError> {
        let mut temp_file = tempfile::NamedTempFile::new()
            .map_err(|e| ExtractionError::Failed(format!("failed to create temp file: {e}")))?;
        temp_file
            .write_all(data)
            .map_err(|e| ExtractionError::Failed(format!("failed to write temp file: {e}")))?;

        self.extract_pages(temp_file.path(), max_chars)
    }
}
