//! Ingestion orchestration: ties extraction/OCR and chunking together
//! against a [`Store`], with single-writer-per-document transactional
//! rebuild semantics, including a full re-ingest path for a document that
//! already exists.

use std::path::Path;

use pageproof_model::domain::{Document, Page};
use pageproof_model::Settings;
use pageproof_store::{DocumentLocks, Store};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunking::{assign_spans, build_chunks, PageWords, CHUNK_MAX_CHARS, CHUNK_OVERLAP_SPANS};
use crate::error::Result;
use crate::extract::{resolve_page_extraction, sort_reading_order, ExtractedWord, TextSource};
use crate::ocr::{OcrEngine, OcrRequest, OcrWord};
use crate::render;

/// One page as already-extracted by the caller's PDF binding — decouples
/// the ingestion algorithm (OCR arbitration, span/chunk building, store
/// writes) from the native pdfium integration, so it can be exercised in
/// tests with hand-built fixtures.
pub struct RawPage {
    pub page_number: i32,
    pub width_pts: f64,
    pub height_pts: f64,
    pub native_words: Vec<ExtractedWord>,
    pub rendered_image_path: Option<std::path::PathBuf>,
}

/// Outcome of ingesting one document: the updated [`Document`] row and a
/// per-page extraction summary (used for logging/diagnostics).
pub struct IngestOutcome {
    pub document: Document,
    pub page_sources: Vec<(i32, TextSource, bool)>,
}

/// Ingests a document's already-extracted pages: assigns page/span/chunk
/// rows, runs OCR fallback where the native extraction is weak, and commits
/// everything to the store in one atomic rebuild. `document` must already
/// exist in the store with `status = Processing`.
#[allow(clippy::too_many_lines)]
pub fn ingest_pages(
    settings: &Settings,
    store: &dyn Store,
    ocr_engine: &dyn OcrEngine,
    upload_dir: &Path,
    mut document: Document,
    raw_pages: Vec<RawPage>,
) -> Result<IngestOutcome> {
    let document_id = document.id;
    info!(document_id = %document_id, page_count = raw_pages.len(), "starting ingestion");

    let mut page_sources = Vec::with_capacity(raw_pages.len());
    let page_ids = store.allocate_page_ids(raw_pages.len())?;

    let mut pages = Vec::with_capacity(raw_pages.len());
    let mut page_words = Vec::with_capacity(raw_pages.len());

    for (raw, page_id) in raw_pages.into_iter().zip(page_ids) {
        let native_metrics_words = raw.native_words;
        let should_try_ocr = crate::extract::should_attempt_ocr(
            &crate::extract::ExtractionMetrics::from_words(&native_metrics_words),
            settings,
        );

        let ocr_words = if should_try_ocr {
            match (raw.rendered_image_path.as_deref(), settings.ocr_fallback_enabled) {
                (Some(image_path), true) => {
                    let tessdata = settings.ocr_tessdata.as_ref().map(std::path::PathBuf::from);
                    let request = OcrRequest {
                        image_path,
                        language: &settings.ocr_language,
                        dpi: settings.ocr_dpi,
                        full_page: settings.ocr_full_page,
                        tessdata: tessdata.as_deref(),
                    };
                    match ocr_engine.recognize(&request) {
                        Ok(words) => Some(ocr_words_to_extracted(words)),
                        Err(err) => {
                            warn!(document_id = %document_id, page = raw.page_number, error = %err, "OCR engine failed, falling back to native text");
                            Some(Vec::new())
                        }
                    }
                }
                _ => Some(Vec::new()),
            }
        } else {
            None
        };

        let mut extraction = resolve_page_extraction(native_metrics_words, ocr_words, settings);
        sort_reading_order(&mut extraction.words);
        page_sources.push((raw.page_number, extraction.source, extraction.attempted_ocr));

        pages.push(Page {
            id: page_id,
            document_id,
            page_number: raw.page_number,
            width_pts: Some(raw.width_pts),
            height_pts: Some(raw.height_pts),
            image_path: raw.rendered_image_path.as_deref().map(render::relativize),
        });
        page_words.push(PageWords {
            page_id,
            page_number: raw.page_number,
            words: extraction.words,
        });
    }

    let total_spans: usize = page_words.iter().map(|p| p.words.len()).sum();
    let span_ids = store.allocate_span_ids(total_spans)?;
    let drafts = assign_spans(document_id, &page_words);

    let spans: Vec<pageproof_model::domain::Span> = drafts
        .into_iter()
        .zip(span_ids)
        .map(|(draft, id)| pageproof_model::domain::Span {
            id,
            document_id: draft.document_id,
            page_id: draft.page_id,
            page_number: draft.page_number,
            span_index: draft.span_index,
            text: draft.text,
            bbox: draft.bbox,
            char_start: Some(draft.char_start),
            char_end: Some(draft.char_end),
        })
        .collect();

    let chunks = build_chunks(document_id, &spans, CHUNK_MAX_CHARS, CHUNK_OVERLAP_SPANS);

    let total_pages = i32::try_from(pages.len()).unwrap_or(i32::MAX);
    let page_width = pages.first().and_then(|p| p.width_pts).unwrap_or(0.0);
    let page_height = pages.first().and_then(|p| p.height_pts).unwrap_or(0.0);

    store.replace_document_contents(document_id, pages, spans, chunks)?;

    document.mark_ready(total_pages, page_width, page_height);
    store.update_document(&document)?;

    info!(document_id = %document_id, total_pages, "ingestion complete");

    Ok(IngestOutcome { document, page_sources })
}

fn ocr_words_to_extracted(words: Vec<OcrWord>) -> Vec<ExtractedWord> {
    words
        .into_iter()
        .map(|w| ExtractedWord { text: w.text, bbox: w.bbox })
        .collect()
}

/// Creates the `Document` row in `processing` state and, on any ingestion
/// failure, transitions it to `error` with the failure message rather than
/// propagating: ingestion failures are caught at this orchestration
/// boundary, not bubbled up to the caller. Re-ingest of an existing
/// document id first wipes its pages/spans/chunks (handled atomically
/// inside [`ingest_pages`] via [`Store::replace_document_contents`]).
///
/// Holds `locks`' advisory lock for `document_id` for the duration of the
/// call, so at most one ingest (first ingest or re-ingest) runs against a
/// given document at a time.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_document(
    settings: &Settings,
    store: &dyn Store,
    locks: &DocumentLocks,
    ocr_engine: &dyn OcrEngine,
    upload_dir: &Path,
    document_id: Uuid,
    filename: &str,
    content_type: Option<String>,
    raw_pages: Vec<RawPage>,
) -> Document {
    let _guard = locks.acquire(document_id).await;

    let document = Document::new(document_id, filename, content_type);
    if let Err(err) = store.create_document(&document) {
        let mut doc = document;
        doc.mark_error(err.to_string());
        return doc;
    }

    match ingest_pages(settings, store, ocr_engine, upload_dir, document.clone(), raw_pages) {
        Ok(outcome) => outcome.document,
        Err(err) => {
            warn!(document_id = %document_id, error = %err, "ingestion failed");
            let mut doc = document;
            doc.mark_error(err.to_string());
            let _ = store.update_document(&doc);
            doc
        }
    }
}
