//! Span assignment and sliding-window chunk building (C2).

use chrono::Utc;
use pageproof_model::domain::{Chunk, Span};
use uuid::Uuid;

use crate::extract::ExtractedWord;

/// One page's reading-order words, used as input to [`assign_spans`].
pub struct PageWords {
    pub page_id: i64,
    pub page_number: i32,
    pub words: Vec<ExtractedWord>,
}

/// A span with everything but its store-assigned `id` filled in.
pub struct SpanDraft {
    pub document_id: Uuid,
    pub page_id: i64,
    pub page_number: i32,
    pub span_index: i32,
    pub text: String,
    pub bbox: pageproof_model::domain::BBox,
    pub char_start: i64,
    pub char_end: i64,
}

/// Assigns `span_index` per page and a document-global `char_cursor` that is
/// **not** reset at page boundaries — it advances monotonically across the
/// whole document.
#[must_use]
pub fn assign_spans(document_id: Uuid, pages: &[PageWords]) -> Vec<SpanDraft> {
    let mut drafts = Vec::new();
    let mut char_cursor: i64 = 0;

    for page in pages {
        for (span_index, word) in page.words.iter().enumerate() {
            let char_start = char_cursor;
            let char_end = char_start + word.text.len() as i64;
            drafts.push(SpanDraft {
                document_id,
                page_id: page.page_id,
                page_number: page.page_number,
                span_index: i32::try_from(span_index).unwrap_or(i32::MAX),
                text: word.text.clone(),
                bbox: word.bbox,
                char_start,
                char_end,
            });
            char_cursor = char_end + 1;
        }
    }
    drafts
}

/// Default chunk text budget (chars).
pub const CHUNK_MAX_CHARS: usize = 900;
/// Default overlap between adjacent chunk windows (spans).
pub const CHUNK_OVERLAP_SPANS: usize = 20;

/// Builds sliding-window chunks over the document's full reading-order span
/// list. Greedy-packs each window up to `max_chars` (joined text length
/// including single-space separators), always including at least one span,
/// then advances by `max_chars`' worth of spans minus `overlap_spans`,
/// guaranteeing monotone progress.
#[must_use]
pub fn build_chunks(
    document_id: Uuid,
    spans: &[Span],
    max_chars: usize,
    overlap_spans: usize,
) -> Vec<Chunk> {
    if spans.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0i32;

    loop {
        let mut end = start + 1;
        while end < spans.len() {
            let window_len: usize = spans[start..=end].iter().map(|s| s.text.len()).sum::<usize>()
                + (end - start);
            if window_len <= max_chars {
                end += 1;
            } else {
                break;
            }
        }

        let window = &spans[start..end];
        let text = window
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        chunks.push(Chunk {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            text,
            page_start: window.first().map(|s| s.page_number),
            page_end: window.last().map(|s| s.page_number),
            span_start_id: window.first().map(|s| s.id),
            span_end_id: window.last().map(|s| s.id),
            embedding: None,
            created_at: Utc::now(),
        });
        chunk_index += 1;

        if end >= spans.len() {
            break;
        }
        start = (end.saturating_sub(overlap_spans)).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageproof_model::domain::BBox;

    fn dummy_span(id: i64, page_number: i32, span_index: i32, text: &str) -> Span {
        Span {
            id,
            document_id: Uuid::nil(),
            page_id: 1,
            page_number,
            span_index,
            text: text.to_string(),
            bbox: BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
            char_start: None,
            char_end: None,
        }
    }

    #[test]
    fn assign_spans_char_cursor_does_not_reset_across_pages() {
        let words = |texts: &[&str]| {
            texts
                .iter()
                .map(|t| ExtractedWord {
                    text: (*t).to_string(),
                    bbox: BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
                })
                .collect::<Vec<_>>()
        };
        let pages = vec![
            PageWords { page_id: 1, page_number: 1, words: words(&["Hi", "there"]) },
            PageWords { page_id: 2, page_number: 2, words: words(&["more"]) },
        ];
        let drafts = assign_spans(Uuid::new_v4(), &pages);
        assert_eq!(drafts[0].char_start, 0);
        assert_eq!(drafts[0].char_end, 2);
        assert_eq!(drafts[1].char_start, 3);
        assert_eq!(drafts[1].char_end, 8);
        // Page 2's first span continues the global cursor, not resetting to 0.
        assert_eq!(drafts[2].char_start, 9);
        assert_eq!(drafts[2].span_index, 0);
    }

    #[test]
    fn single_span_always_included_even_if_oversized() {
        let huge = "x".repeat(1000);
        let spans = vec![dummy_span(1, 1, 0, &huge)];
        let chunks = build_chunks(Uuid::new_v4(), &spans, 900, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, huge);
    }

    #[test]
    fn chunks_cover_every_span_and_overlap_when_windows_fill() {
        let spans: Vec<Span> = (0..45)
            .map(|i| dummy_span(i64::from(i) + 1, 1, i, &"x".repeat(20)))
            .collect();
        let chunks = build_chunks(Uuid::new_v4(), &spans, 900, 20);

        // Coverage: first chunk's span_start_id is the first span, last
        // chunk's span_end_id is the last span.
        assert_eq!(chunks.first().unwrap().span_start_id, Some(1));
        assert_eq!(chunks.last().unwrap().span_end_id, Some(45));

        // Each window packs exactly floor((900+1)/21) = 42 spans when not
        // truncated by the end of the span list.
        let first_len = chunks[0].text.split(' ').count();
        assert_eq!(first_len, 42);

        // Monotone progress: chunk_index increases, starts strictly advance.
        for pair in chunks.windows(2) {
            assert!(pair[1].span_start_id > pair[0].span_start_id);
        }
    }

    #[test]
    fn joined_span_text_equals_chunk_text() {
        let spans = vec![
            dummy_span(1, 1, 0, "Hello"),
            dummy_span(2, 1, 1, "world"),
        ];
        let chunks = build_chunks(Uuid::new_v4(), &spans, 900, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world");
    }
}
