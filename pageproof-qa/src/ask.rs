//! Orchestrator (C8): sequences retrieval, answer generation, evidence
//! ranking, and evidence validation behind a single fixed insufficient-
//! evidence fallback.

use std::collections::HashMap;

use pageproof_model::domain::{AskQuestionResponse, DocumentStatus, Span};
use pageproof_model::Settings;
use pageproof_store::Store;
use tracing::warn;
use uuid::Uuid;

use crate::answer::{
    build_context, build_messages, call_with_retry_ladder, filter_citations_to_context,
    has_uncertainty_marker, parse_answer_payload, ChatClient,
};
use crate::embedding::{backfill_document_embeddings, EmbeddingClient};
use crate::error::{QaError, Result};
use crate::evidence::ranker::{self, PageEvidence};
use crate::evidence::validator::validate_all;
use crate::retrieval::{passes_distance_gate, retrieve_top_k};

/// Answers `question` against `document_id`, running every confidence gate
/// in spec order and falling back to the fixed insufficient-evidence
/// response whenever one fails.
pub async fn ask_question(
    store: &dyn Store,
    embedding_client: &dyn EmbeddingClient,
    chat_client: &dyn ChatClient,
    settings: &Settings,
    document_id: Uuid,
    question: &str,
) -> Result<AskQuestionResponse> {
    let question = question.trim();
    if question.is_empty() {
        return Err(QaError::EmptyQuestion);
    }

    let document = store.get_document(document_id)?.ok_or(QaError::DocumentNotFound)?;
    if document.status != DocumentStatus::Ready {
        return Err(QaError::DocumentNotReady);
    }

    backfill_document_embeddings(store, embedding_client, settings, document_id).await?;

    let dimensions = crate::embedding::supports_dimensions_kwarg(&settings.openai_embedding_model)
        .then_some(settings.openai_embedding_dimensions);
    let question_embedding = match embedding_client
        .embed_batch(&[question.to_string()], &settings.openai_embedding_model, dimensions)
        .await
    {
        Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
        Ok(_) => {
            warn!(document_id = %document_id, "embedding provider returned no vector for the question");
            return Ok(AskQuestionResponse::insufficient_evidence());
        }
        Err(err) => {
            warn!(document_id = %document_id, error = %err, "question embedding failed, returning insufficient evidence");
            return Ok(AskQuestionResponse::insufficient_evidence());
        }
    };

    let chunks = store.get_chunks(document_id)?;
    let retrieved = retrieve_top_k(&chunks, &question_embedding, settings.retrieval_top_k);
    if !passes_distance_gate(&retrieved, settings.retrieval_max_vector_distance) {
        return Ok(AskQuestionResponse::insufficient_evidence());
    }

    let context = build_context(&retrieved, settings.retrieval_max_context_chunks);
    let messages = build_messages(question, &context);
    let raw = call_with_retry_ladder(chat_client, &settings.openai_chat_model, &messages).await?;
    let parsed = parse_answer_payload(&raw);

    if parsed.answer.is_empty() {
        return Ok(AskQuestionResponse::insufficient_evidence());
    }
    if has_uncertainty_marker(&parsed.answer) {
        return Ok(AskQuestionResponse::insufficient_evidence());
    }

    let mut cited = filter_citations_to_context(&parsed.citations, &context);
    if cited.is_empty() {
        if settings.require_llm_citations {
            return Ok(AskQuestionResponse::insufficient_evidence());
        }
        let Some(top) = context.first() else {
            return Ok(AskQuestionResponse::insufficient_evidence());
        };
        cited.push(top.chunk_id);
    }

    let expanded = expand_with_neighbors(store, document_id, &chunks, &cited)?;

    let mut spans_by_page: HashMap<i32, Vec<Span>> = HashMap::new();
    for chunk in &expanded {
        let (Some(start), Some(end)) = (chunk.span_start_id, chunk.span_end_id) else { continue };
        let (min_id, max_id) = (start.min(end), start.max(end));
        for span in store.get_spans_in_id_range(document_id, min_id, max_id)? {
            let page_spans = spans_by_page.entry(span.page_number).or_default();
            if !page_spans.iter().any(|s: &Span| s.id == span.id) {
                page_spans.push(span);
            }
        }
    }

    let mut page_evidence: Vec<PageEvidence> = Vec::new();
    for (page_number, spans) in &spans_by_page {
        page_evidence.extend(ranker::rank_page(
            *page_number,
            document.page_width,
            document.page_height,
            spans,
            question,
            &parsed.answer,
            settings,
        ));
    }

    let deduped = ranker::dedup_cross_page(page_evidence);
    let evidence = ranker::filter_and_order_for_display(deduped, settings);

    if evidence.len() < settings.minimum_evidence_items {
        return Ok(AskQuestionResponse::insufficient_evidence());
    }

    let grounded = validate_all(&evidence, &|page| {
        spans_by_page.get(&page).cloned().unwrap_or_default()
    });
    if !grounded {
        return Ok(AskQuestionResponse::insufficient_evidence());
    }

    Ok(AskQuestionResponse { answer: parsed.answer, evidence })
}

/// Adds `chunk_index ± 1` neighbors of each cited chunk, preferring `+1`
/// before `-1`, skipping chunks not present in the document. Returns the
/// de-duplicated set in first-seen order.
fn expand_with_neighbors(
    store: &dyn Store,
    document_id: Uuid,
    all_chunks: &[pageproof_model::domain::Chunk],
    cited: &[Uuid],
) -> Result<Vec<pageproof_model::domain::Chunk>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for chunk_id in cited {
        let Some(chunk) = all_chunks.iter().find(|c| c.id == *chunk_id) else { continue };
        if seen.insert(chunk.id) {
            out.push(chunk.clone());
        }
        for neighbor_index in [chunk.chunk_index + 1, chunk.chunk_index - 1] {
            if neighbor_index < 0 {
                continue;
            }
            if let Some(neighbor) = store.get_chunk_by_index(document_id, neighbor_index)? {
                if seen.insert(neighbor.id) {
                    out.push(neighbor);
                }
            }
        }
    }

    Ok(out)
}
