//! Embedding provider contract and the lazy per-chunk embedding cache (C3).

use std::future::Future;
use std::pin::Pin;

use pageproof_model::Settings;
use pageproof_store::Store;
use tracing::info;
use uuid::Uuid;

use crate::error::{QaError, Result};

/// Provider contract for computing embedding vectors. Object-safe so tests
/// can substitute a deterministic fake via `&dyn EmbeddingClient`.
pub trait EmbeddingClient: Send + Sync {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
        model: &'a str,
        dimensions: Option<usize>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>>;
}

/// `text-embedding-3` family models accept a `dimensions` kwarg; older
/// models (e.g. `text-embedding-ada-002`) reject it.
#[must_use]
pub fn supports_dimensions_kwarg(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

const EMBEDDING_BATCH_SIZE: usize = 64;

/// Embeds every chunk of `document_id` still missing a vector, in batches
/// of 64, and persists the results. Idempotent: a fully-embedded document
/// is a no-op.
pub async fn backfill_document_embeddings(
    store: &dyn Store,
    client: &dyn EmbeddingClient,
    settings: &Settings,
    document_id: Uuid,
) -> Result<usize> {
    let mut pending = store.get_chunks_missing_embeddings(document_id)?;
    pending.sort_by_key(|c| c.chunk_index);
    if pending.is_empty() {
        return Ok(0);
    }

    let dimensions = supports_dimensions_kwarg(&settings.openai_embedding_model)
        .then_some(settings.openai_embedding_dimensions);

    let mut embedded = 0usize;
    for batch in pending.chunks(EMBEDDING_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = client
            .embed_batch(&texts, &settings.openai_embedding_model, dimensions)
            .await
            .map_err(|e| QaError::Provider(e.to_string()))?;

        if vectors.len() != batch.len() {
            return Err(QaError::Provider(format!(
                "embedding provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }

        for (chunk, vector) in batch.iter().zip(vectors) {
            store.save_chunk_embedding(document_id, chunk.id, vector)?;
            embedded += 1;
        }
    }

    info!(document_id = %document_id, embedded, "backfilled chunk embeddings");
    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pageproof_model::domain::Chunk;
    use pageproof_store::RedbStore;

    struct FakeEmbeddingClient;

    impl EmbeddingClient for FakeEmbeddingClient {
        fn embed_batch<'a>(
            &'a self,
            texts: &'a [String],
            _model: &'a str,
            _dimensions: Option<usize>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>> {
            Box::pin(async move { Ok(texts.iter().map(|t| vec![t.len() as f32]).collect()) })
        }
    }

    fn chunk(document_id: Uuid, index: i32, text: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            document_id,
            chunk_index: index,
            text: text.to_string(),
            page_start: Some(1),
            page_end: Some(1),
            span_start_id: None,
            span_end_id: None,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dimensions_kwarg_only_for_v3_family() {
        assert!(supports_dimensions_kwarg("text-embedding-3-small"));
        assert!(supports_dimensions_kwarg("text-embedding-3-large"));
        assert!(!supports_dimensions_kwarg("text-embedding-ada-002"));
    }

    #[tokio::test]
    async fn backfill_embeds_only_missing_chunks_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("t.redb")).unwrap();
        let document_id = Uuid::new_v4();
        store
            .replace_document_contents(
                document_id,
                vec![],
                vec![],
                vec![chunk(document_id, 0, "hello"), chunk(document_id, 1, "world!")],
            )
            .unwrap();

        let settings = Settings::default();
        let client = FakeEmbeddingClient;
        let n = backfill_document_embeddings(&store, &client, &settings, document_id)
            .await
            .unwrap();
        assert_eq!(n, 2);

        let chunks = store.get_chunks(document_id).unwrap();
        assert!(chunks.iter().all(|c| c.embedding.is_some()));

        let again = backfill_document_embeddings(&store, &client, &settings, document_id)
            .await
            .unwrap();
        assert_eq!(again, 0);
    }
}
