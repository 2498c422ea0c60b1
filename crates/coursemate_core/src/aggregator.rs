//! crates/coursemate_core/src/aggregator.rs
//!
//! Collects every document bound to a job scope, extracts its text, and
//! combines the results into a single bounded blob for the generation step.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{DocumentFormat, JobScope, MaterialRef};
use crate::error::AggregationError;
use crate::ports::{CatalogService, DocumentStorage, ExtractionError, TextExtractor};

/// Sentence terminators recognized by [`truncate_at_sentence`].
const SENTENCE_TERMINATORS: [&str; 6] = [". ", ".\n", "! ", "!\n", "? ", "?\n"];

/// Size limits applied while aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorLimits {
    /// Minimum trimmed length of all extracted text combined.
    pub min_chars: usize,
    /// Documents whose trimmed text is shorter than this are dropped (scans that
    /// yield only page numbers, title-only slides).
    pub min_document_chars: usize,
    /// Length the combined text is truncated to before generation.
    pub budget_chars: usize,
    /// Hard ceiling each extractor applies to a single document.
    pub per_document_chars: usize,
}

impl Default for AggregatorLimits {
    fn default() -> Self {
        Self {
            min_chars: 100,
            min_document_chars: 100,
            budget_chars: 12_000,
            per_document_chars: 50_000,
        }
    }
}

/// The combined text of a scope and how many documents contributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedContent {
    pub text: String,
    pub document_count: usize,
}

pub struct ContentAggregator {
    catalog: Arc<dyn CatalogService>,
    storage: Arc<dyn DocumentStorage>,
    extractor: Arc<dyn TextExtractor>,
    limits: AggregatorLimits,
}

impl ContentAggregator {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        storage: Arc<dyn DocumentStorage>,
        extractor: Arc<dyn TextExtractor>,
        limits: AggregatorLimits,
    ) -> Self {
        Self {
            catalog,
            storage,
            extractor,
            limits,
        }
    }

    /// Aggregates the text of every material bound to `scope`.
    ///
    /// Documents that cannot be read or extracted, or that yield fewer than
    /// `min_document_chars`, are skipped with a warning and not counted.
    /// Fails when the scope has no documents at all, or when the surviving text is
    /// shorter than `min_chars`.
    pub async fn aggregate(&self, scope: &JobScope) -> Result<AggregatedContent, AggregationError> {
        let materials = self
            .catalog
            .materials_in_scope(scope.course_id, &scope.time_bucket)
            .await?;

        if materials.is_empty() {
            return Err(AggregationError::NoContent {
                course_id: scope.course_id,
                time_bucket: scope.time_bucket.to_string(),
            });
        }

        let mut sections = Vec::with_capacity(materials.len());
        let mut extracted_chars = 0;

        for material in &materials {
            match self.extract_material(material).await {
                Ok(text) => {
                    let text = text.trim();
                    let chars = text.chars().count();
                    if chars < self.limits.min_document_chars {
                        warn!(
                            filename = %material.filename,
                            chars,
                            "Material yielded too little text, skipping"
                        );
                        continue;
                    }
                    extracted_chars += chars;
                    sections.push(format!("=== From {} ===\n\n{}", material.filename, text));
                }
                Err(e) => {
                    warn!(
                        filename = %material.filename,
                        material_id = material.id,
                        error = %e,
                        "Failed to extract text from material, skipping"
                    );
                }
            }
        }

        if extracted_chars < self.limits.min_chars {
            return Err(AggregationError::InsufficientContent {
                chars: extracted_chars,
                min: self.limits.min_chars,
            });
        }

        let combined = sections.join("\n\n");
        let text = truncate_at_sentence(&combined, self.limits.budget_chars).to_string();
        debug!(
            documents = sections.len(),
            chars = text.chars().count(),
            "Aggregated scope content"
        );

        Ok(AggregatedContent {
            text,
            document_count: sections.len(),
        })
    }

    async fn extract_material(&self, material: &MaterialRef) -> Result<String, ExtractionError> {
        let format = DocumentFormat::from_filename(&material.filename)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(material.filename.clone()))?;

        let data = self
            .storage
            .read(&material.locator)
            .await
            .map_err(|e| ExtractionError::Failed(e.to_string()))?;

        self.extractor
            .extract_text(data, format, self.limits.per_document_chars)
            .await
    }
}

/// Truncates `text` to at most `budget` characters, preferring a sentence end.
///
/// Looks backward from the cutoff for the nearest sentence terminator; if it lies at
/// or beyond 80% of the budget the text is cut just after the terminating
/// punctuation. Otherwise the text is hard-cut at the budget.
pub fn truncate_at_sentence(text: &str, budget: usize) -> &str {
    let cut = match text.char_indices().nth(budget) {
        Some((idx, _)) => idx,
        None => return text,
    };
    let window = &text[..cut];

    let nearest = SENTENCE_TERMINATORS
        .iter()
        .filter_map(|terminator| window.rfind(terminator))
        .max();

    if let Some(pos) = nearest {
        let pos_chars = window[..pos].chars().count();
        if pos_chars * 5 >= budget * 4 {
            // Terminator punctuation is a single ASCII byte.
            return &text[..pos + 1];
        }
    }

    window
}

/// Caps `text` at `max_chars` characters.
pub fn cap_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_within_budget_is_unchanged() {
        let text = "Short text. Nothing to cut.";
        assert_eq!(truncate_at_sentence(text, text.len()), text);
        assert_eq!(truncate_at_sentence(text, 1_000), text);
    }

    #[test]
    fn cuts_after_sentence_end_near_budget() {
        let text = format!("{}. tail that goes past the budget", "a".repeat(90));
        let out = truncate_at_sentence(&text, 100);
        assert_eq!(out, format!("{}.", "a".repeat(90)));
    }

    #[test]
    fn hard_cuts_when_terminator_is_too_early() {
        let text = format!("Intro. {}", "b".repeat(200));
        let out = truncate_at_sentence(&text, 100);
        assert_eq!(out.chars().count(), 100);
        assert!(text.starts_with(out));
    }

    #[test]
    fn prefers_the_nearest_terminator() {
        let text = format!("{}? {}! {}", "a".repeat(82), "b".repeat(10), "c".repeat(50));
        let out = truncate_at_sentence(&text, 100);
        assert!(out.ends_with('!'));
    }

    #[test]
    fn newline_terminators_count() {
        let text = format!("{}.\n{}", "a".repeat(85), "z".repeat(40));
        assert_eq!(truncate_at_sentence(&text, 100), format!("{}.", "a".repeat(85)));
    }

    #[test]
    fn never_exceeds_budget_on_multibyte_text() {
        let text = "é. ".repeat(500);
        for budget in [0, 1, 7, 99, 100, 1_000] {
            assert!(truncate_at_sentence(&text, budget).chars().count() <= budget);
        }
    }

    #[test]
    fn cap_chars_respects_char_boundaries() {
        assert_eq!(cap_chars("ééé", 2), "éé");
        assert_eq!(cap_chars("abc", 10), "abc");
    }
}
