//! Word-level PDF text extraction and the OCR fallback/arbitration policy
//! (C1). The scoring logic is a set of pure functions over word lists so it
//! can be tested without binding to the native pdfium library.

use pageproof_model::domain::BBox;
use pageproof_model::Settings;

/// One word extracted from a page, in PDF user-space points.
#[derive(Debug, Clone)]
pub struct ExtractedWord {
    pub text: String,
    pub bbox: BBox,
}

/// Which extraction path produced the words kept for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Native,
    Ocr,
}

/// The outcome of extracting one page, after OCR fallback/arbitration.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub words: Vec<ExtractedWord>,
    pub source: TextSource,
    pub attempted_ocr: bool,
    pub native_word_count: usize,
    pub ocr_word_count: usize,
}

/// Quality metrics of one extraction pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionMetrics {
    pub word_count: usize,
    pub alnum_ratio: f64,
}

impl ExtractionMetrics {
    #[must_use]
    pub fn from_words(words: &[ExtractedWord]) -> Self {
        let mut alnum_chars = 0usize;
        let mut total_non_space = 0usize;
        for word in words {
            for ch in word.text.chars() {
                if ch.is_whitespace() {
                    continue;
                }
                total_non_space += 1;
                if ch.is_alphanumeric() {
                    alnum_chars += 1;
                }
            }
        }
        let alnum_ratio = if total_non_space == 0 {
            0.0
        } else {
            alnum_chars as f64 / total_non_space as f64
        };
        Self { word_count: words.len(), alnum_ratio }
    }
}

/// Whether OCR should be attempted for a page given its native metrics.
#[must_use]
pub fn should_attempt_ocr(native: &ExtractionMetrics, settings: &Settings) -> bool {
    settings.ocr_fallback_enabled
        && (native.word_count < settings.ocr_trigger_min_words
            || native.alnum_ratio < settings.ocr_trigger_min_alnum_ratio)
}

fn score(metrics: &ExtractionMetrics, min_words: usize) -> f64 {
    let word_ratio = if min_words == 0 {
        1.0
    } else {
        (metrics.word_count as f64 / min_words as f64).min(1.0)
    };
    0.55 * word_ratio + 0.45 * metrics.alnum_ratio
}

/// Decides whether OCR output should replace the native extraction.
#[must_use]
pub fn arbitrate(native: &ExtractionMetrics, ocr: &ExtractionMetrics, min_words: usize) -> TextSource {
    if ocr.word_count == 0 {
        return TextSource::Native;
    }
    if native.word_count == 0 {
        return TextSource::Ocr;
    }

    let score_native = score(native, min_words);
    let score_ocr = score(ocr, min_words);

    let rule1 = score_ocr >= score_native + 0.04;
    let rule2 = native.word_count < min_words && ocr.word_count > native.word_count;
    let rule3 = ocr.alnum_ratio >= native.alnum_ratio + 0.12
        && ocr.word_count >= (native.word_count / 2).max(3);

    if rule1 || rule2 || rule3 {
        TextSource::Ocr
    } else {
        TextSource::Native
    }
}

/// Combines native words with an optional OCR pass (empty if OCR wasn't
/// run or was disabled) into the final per-page extraction outcome.
#[must_use]
pub fn resolve_page_extraction(
    native_words: Vec<ExtractedWord>,
    ocr_words: Option<Vec<ExtractedWord>>,
    settings: &Settings,
) -> PageExtraction {
    let native_metrics = ExtractionMetrics::from_words(&native_words);

    let Some(ocr_words) = ocr_words else {
        return PageExtraction {
            words: native_words,
            source: TextSource::Native,
            attempted_ocr: false,
            native_word_count: native_metrics.word_count,
            ocr_word_count: 0,
        };
    };

    let ocr_metrics = ExtractionMetrics::from_words(&ocr_words);
    let source = arbitrate(&native_metrics, &ocr_metrics, settings.ocr_trigger_min_words);

    let words = match source {
        TextSource::Native => native_words,
        TextSource::Ocr => ocr_words,
    };

    PageExtraction {
        words,
        source,
        attempted_ocr: true,
        native_word_count: native_metrics.word_count,
        ocr_word_count: ocr_metrics.word_count,
    }
}

/// Sorts words into reading order: top-to-bottom, then left-to-right.
pub fn sort_reading_order(words: &mut [ExtractedWord]) {
    words.sort_by(|a, b| {
        a.bbox
            .y1
            .total_cmp(&b.bbox.y1)
            .then_with(|| a.bbox.x1.total_cmp(&b.bbox.x1))
    });
}

#[cfg(feature = "pdfium")]
pub(crate) mod pdfium_backend {
    use super::ExtractedWord;
    use crate::error::{PdfError, Result};
    use pageproof_model::domain::BBox;
    use pdfium_render::prelude::*;

    /// Extracts per-word boxes via pdfium's text-page API. Unlike
    /// `lopdf::extract_text` (page text only, no geometry), pdfium exposes
    /// character-level tight bounds we can coalesce into words.
    pub(crate) fn extract_words(page: &PdfPage<'_>) -> Result<Vec<ExtractedWord>> {
        let text_page = page
            .text()
            .map_err(|e| PdfError::Parse(e.to_string()))?;

        let mut words = Vec::new();
        for segment in text_page.segments().iter() {
            let text = segment.text();
            if text.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            for (word_text, word_bounds) in split_into_words(&text, bounds) {
                words.push(ExtractedWord {
                    text: word_text,
                    bbox: word_bounds,
                });
            }
        }
        Ok(words)
    }

    /// pdfium's segments are line runs, not words; split on whitespace and
    /// distribute the segment's bounding box proportionally by character
    /// count (an approximation; exact per-word boxes would need per-char
    /// iteration, which pdfium-render also exposes via `chars()` but at
    /// higher cost per page).
    fn split_into_words(text: &str, bounds: PdfRect) -> Vec<(String, BBox)> {
        let total_len = text.chars().count().max(1) as f64;
        let width = f64::from(bounds.right().value - bounds.left().value);
        let mut out = Vec::new();
        let mut cursor = 0f64;
        for token in text.split_whitespace() {
            let token_len = token.chars().count() as f64;
            let x1 = f64::from(bounds.left().value) + width * (cursor / total_len);
            let x2 = f64::from(bounds.left().value) + width * ((cursor + token_len) / total_len);
            out.push((
                token.to_string(),
                BBox {
                    x1,
                    y1: f64::from(bounds.bottom().value),
                    x2,
                    y2: f64::from(bounds.top().value),
                },
            ));
            cursor += token_len + 1.0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> ExtractedWord {
        ExtractedWord {
            text: text.to_string(),
            bbox: BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
        }
    }

    #[test]
    fn metrics_empty_words_is_zero_ratio() {
        let m = ExtractionMetrics::from_words(&[]);
        assert_eq!(m.word_count, 0);
        assert_eq!(m.alnum_ratio, 0.0);
    }

    #[test]
    fn metrics_alnum_ratio_over_non_space_chars() {
        // "Hi." -> 'H','i' alnum, '.' not; 2/3.
        let m = ExtractionMetrics::from_words(&[word("Hi.")]);
        assert_eq!(m.word_count, 1);
        assert!((m.alnum_ratio - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn s1_low_word_count_native_kept_without_ocr() {
        // 2-page PDF page 1: "Hi." -> word_count=1 (spec example describes
        // the whole-page text as "Hi." split as one extracted word here),
        // OCR disabled entirely.
        let settings = Settings::builder().ocr_fallback_enabled(false).build();
        let native = [word("Hi.")];
        let metrics = ExtractionMetrics::from_words(&native);
        assert!(!should_attempt_ocr(&metrics, &settings));
    }

    #[test]
    fn s1_ocr_enabled_but_returns_nothing_keeps_native_and_flags_attempted() {
        let settings = Settings::default();
        let native = vec![word("Hi."), word("Hi."), word("Hi.")];
        let extraction = resolve_page_extraction(native, Some(vec![]), &settings);
        assert_eq!(extraction.source, TextSource::Native);
        assert!(extraction.attempted_ocr);
        assert_eq!(extraction.ocr_word_count, 0);
    }

    #[test]
    fn s2_ocr_wins_when_score_gap_exceeds_threshold() {
        // native: word_count=10, alnum=0.55; ocr: word_count=25, alnum=0.90
        let native = ExtractionMetrics { word_count: 10, alnum_ratio: 0.55 };
        let ocr = ExtractionMetrics { word_count: 25, alnum_ratio: 0.90 };
        assert_eq!(arbitrate(&native, &ocr, 18), TextSource::Ocr);

        let score_n = score(&native, 18);
        let score_o = score(&ocr, 18);
        assert!((score_n - 0.553).abs() < 1e-3);
        assert!((score_o - 0.955).abs() < 1e-3);
    }

    #[test]
    fn arbitrate_keeps_native_when_ocr_empty() {
        let native = ExtractionMetrics { word_count: 5, alnum_ratio: 0.5 };
        let ocr = ExtractionMetrics { word_count: 0, alnum_ratio: 0.0 };
        assert_eq!(arbitrate(&native, &ocr, 18), TextSource::Native);
    }

    #[test]
    fn arbitrate_uses_ocr_when_native_empty() {
        let native = ExtractionMetrics { word_count: 0, alnum_ratio: 0.0 };
        let ocr = ExtractionMetrics { word_count: 5, alnum_ratio: 0.5 };
        assert_eq!(arbitrate(&native, &ocr, 18), TextSource::Ocr);
    }

    #[test]
    fn arbitrate_rule2_low_native_word_count_but_ocr_has_more() {
        let native = ExtractionMetrics { word_count: 4, alnum_ratio: 0.9 };
        let ocr = ExtractionMetrics { word_count: 6, alnum_ratio: 0.9 };
        assert_eq!(arbitrate(&native, &ocr, 18), TextSource::Ocr);
    }

    #[test]
    fn arbitrate_rule3_ratio_gap_with_enough_ocr_words() {
        let native = ExtractionMetrics { word_count: 20, alnum_ratio: 0.5 };
        let ocr = ExtractionMetrics { word_count: 12, alnum_ratio: 0.7 };
        assert_eq!(arbitrate(&native, &ocr, 18), TextSource::Ocr);
    }

    #[test]
    fn sort_reading_order_top_to_bottom_then_left_to_right() {
        let mut words = vec![
            ExtractedWord { text: "b".into(), bbox: BBox { x1: 5.0, y1: 0.0, x2: 6.0, y2: 1.0 } },
            ExtractedWord { text: "a".into(), bbox: BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 } },
            ExtractedWord { text: "c".into(), bbox: BBox { x1: 0.0, y1: 10.0, x2: 1.0, y2: 11.0 } },
        ];
        sort_reading_order(&mut words);
        let order: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
