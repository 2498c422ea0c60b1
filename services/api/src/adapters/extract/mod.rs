//! services/api/src/adapters/extract/mod.rs
//!
//! Format-specific text extraction behind the `TextExtractor` port. Each
//! format has a synchronous extractor; the composite picks one by
//! `DocumentFormat` and runs it on the blocking pool.

pub mod docx;
pub mod pdf;
pub mod pptx;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coursemate_core::domain::DocumentFormat;
use coursemate_core::ports::{ExtractionError, TextExtractor};
use tracing::debug;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use pptx::PptxExtractor;

/// A synchronous, CPU-bound extractor for one document format.
pub trait FormatExtractor: Send + Sync {
    fn extract(&self, data: &[u8], max_chars: usize) -> Result<String, ExtractionError>;
}

//=========================================================================================
// Composite
//=========================================================================================

pub struct CompositeExtractor {
    extractors: HashMap<DocumentFormat, Arc<dyn FormatExtractor>>,
}

impl CompositeExtractor {
    pub fn new(extractors: Vec<(DocumentFormat, Arc<dyn FormatExtractor>)>) -> Self {
        Self {
            extractors: extractors.into_iter().collect(),
        }
    }

    /// PDF, DOCX and PPTX extractors with their default limits.
    pub fn with_defaults() -> Self {
        let pdf: Arc<dyn FormatExtractor> = Arc::new(PdfExtractor::default());
        let docx: Arc<dyn FormatExtractor> = Arc::new(DocxExtractor);
        let pptx: Arc<dyn FormatExtractor> = Arc::new(PptxExtractor);
        Self::new(vec![
            (DocumentFormat::Pdf, pdf),
            (DocumentFormat::Docx, docx),
            (DocumentFormat::Pptx, pptx),
        ])
    }
}

#[async_trait]
impl TextExtractor for CompositeExtractor {
    async fn extract_text(
        &self,
        data: Vec<u8>,
        format: DocumentFormat,
        max_chars: usize,
    ) -> Result<String, ExtractionError> {
        let extractor = self
            .extractors
            .get(&format)
            .cloned()
            .ok_or_else(|| ExtractionError::UnsupportedFormat(format!("{:?}", format)))?;

        let text = tokio::task::spawn_blocking(move || extractor.extract(&data, max_chars))
            .await
            .map_err(|e| ExtractionError::Failed(format!("extraction task failed: {e}")))??;

        debug!(?format, chars = text.chars().count(), "Extracted document text");
        Ok(text)
    }
}

//=========================================================================================
// Shared helpers
//=========================================================================================

/// Collects text blocks up to a character ceiling, joined by newlines.
pub(crate) struct TextAccumulator {
    blocks: Vec<String>,
    chars: usize,
    max_chars: usize,
}

impl TextAccumulator {
    pub(crate) fn new(max_chars: usize) -> Self {
        Self {
            blocks: Vec::new(),
            chars: 0,
            max_chars,
        }
    }

    /// Adds a block unless it is blank. Returns `false` once the ceiling is reached.
    pub(crate) fn push(&mut self, block: &str) -> bool {
        let block = block.trim();
        if !block.is_empty() {
            if !self.blocks.is_empty() {
                self.chars += 1;
            }
            self.chars += block.chars().count();
            self.blocks.push(block.to_string());
        }
        !self.is_full()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.chars >= self.max_chars
    }

    pub(crate) fn finish(self) -> String {
        let joined = self.blocks.join("\n");
        match joined.char_indices().nth(self.max_chars) {
            Some((cut, _)) => joined[..cut].to_string(),
            None => joined,
        }
    }
}

/// Decodes the five predefined XML entities.
pub(crate) fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_skips_blank_blocks_and_caps_output() {
        let mut acc = TextAccumulator::new(10);
        assert!(acc.push("abc"));
        assert!(acc.push("   "));
        assert!(!acc.push("defghijk"));
        assert!(acc.is_full());
        assert_eq!(acc.finish(), "abc\ndefghi");
    }

    #[test]
    fn unescapes_entities_once() {
        assert_eq!(unescape_xml("a &lt;b&gt; &amp;lt; c"), "a <b> &lt; c");
        assert_eq!(unescape_xml("plain"), "plain");
    }

    #[tokio::test]
    async fn unknown_format_is_unsupported() {
        let docx: Arc<dyn FormatExtractor> = Arc::new(DocxExtractor);
        let composite = CompositeExtractor::new(vec![(DocumentFormat::Docx, docx)]);
        let result = composite
            .extract_text(Vec::new(), DocumentFormat::Pdf, 1000)
            .await;
        assert!(matches!(result, Err(ExtractionError::UnsupportedFormat(_))));
    }
}
