//! Cosine-distance chunk retrieval with a confidence gate (C4).

use pageproof_model::domain::Chunk;

/// One retrieved chunk with its cosine distance to the query embedding.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f64,
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let cosine_similarity = f64::from(dot / (norm_a * norm_b));
    1.0 - cosine_similarity
}

/// Ranks `chunks` (only those with an embedding) by cosine distance to
/// `query_embedding`, ascending, tie-broken by `chunk_index`, and returns
/// the top `top_k`. This is an exact, deterministic linear scan rather than
/// an approximate index, since callers depend on stable tie-broken
/// ordering across repeated runs over the same inputs.
#[must_use]
pub fn retrieve_top_k(chunks: &[Chunk], query_embedding: &[f32], top_k: usize) -> Vec<RetrievedChunk> {
    let mut scored: Vec<RetrievedChunk> = chunks
        .iter()
        .filter_map(|c| {
            c.embedding
                .as_ref()
                .map(|e| RetrievedChunk { chunk: c.clone(), distance: cosine_distance(e, query_embedding) })
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    scored.truncate(top_k);
    scored
}

/// The retrieval confidence gate: the best (lowest) distance in `retrieved`
/// must be `<= max_distance`, else the caller must fall back to the
/// insufficient-evidence response.
#[must_use]
pub fn passes_distance_gate(retrieved: &[RetrievedChunk], max_distance: f64) -> bool {
    retrieved
        .first()
        .is_some_and(|best| best.distance <= max_distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn chunk(document_id: Uuid, index: i32, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            document_id,
            chunk_index: index,
            text: format!("chunk {index}"),
            page_start: Some(1),
            page_end: Some(1),
            span_start_id: None,
            span_end_id: None,
            embedding,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn null_embeddings_are_dropped() {
        let doc_id = Uuid::new_v4();
        let chunks = vec![chunk(doc_id, 0, None), chunk(doc_id, 1, Some(vec![1.0, 0.0]))];
        let results = retrieve_top_k(&chunks, &[1.0, 0.0], 8);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_index, 1);
    }

    #[test]
    fn ties_are_broken_by_chunk_index() {
        let doc_id = Uuid::new_v4();
        let chunks = vec![
            chunk(doc_id, 2, Some(vec![1.0, 0.0])),
            chunk(doc_id, 1, Some(vec![1.0, 0.0])),
        ];
        let results = retrieve_top_k(&chunks, &[1.0, 0.0], 8);
        assert_eq!(results[0].chunk.chunk_index, 1);
        assert_eq!(results[1].chunk.chunk_index, 2);
    }

    #[test]
    fn s4_gate_passes_with_best_distance_under_threshold() {
        let doc_id = Uuid::new_v4();
        // Exercise the gate directly against fixed distances rather than
        // reverse-engineering embeddings that cosine to these exact values.
        let retrieved: Vec<RetrievedChunk> = [0.3, 0.5, 1.1, 1.25, 1.6]
            .iter()
            .enumerate()
            .map(|(i, d)| RetrievedChunk {
                chunk: chunk(doc_id, i as i32, Some(vec![1.0])),
                distance: *d,
            })
            .collect();
        assert!(passes_distance_gate(&retrieved, 1.2));
        assert_eq!(retrieved.len(), 5);
    }

    #[test]
    fn gate_fails_when_best_distance_exceeds_threshold() {
        let doc_id = Uuid::new_v4();
        let retrieved = vec![RetrievedChunk { chunk: chunk(doc_id, 0, Some(vec![1.0])), distance: 1.3 }];
        assert!(!passes_distance_gate(&retrieved, 1.2));
    }

    #[test]
    fn deterministic_given_identical_embeddings() {
        let doc_id = Uuid::new_v4();
        let chunks = vec![
            chunk(doc_id, 0, Some(vec![0.1, 0.2, 0.3])),
            chunk(doc_id, 1, Some(vec![0.3, 0.1, 0.2])),
            chunk(doc_id, 2, Some(vec![0.2, 0.3, 0.1])),
        ];
        let query = vec![0.1, 0.2, 0.3];
        let first = retrieve_top_k(&chunks, &query, 8);
        let second = retrieve_top_k(&chunks, &query, 8);
        let first_ids: Vec<_> = first.iter().map(|r| r.chunk.chunk_index).collect();
        let second_ids: Vec<_> = second.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(first_ids, second_ids);
    }
}
