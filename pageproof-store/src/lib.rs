//! Embedded persistence for documents, pages, spans, and chunks.
//!
//! Backed by `redb`. The relational-plus-vector-column data model is realized
//! as typed JSON-blob tables keyed by entity id, plus per-document index
//! tables recording the ordered id lists needed for cascade delete and
//! reading-order iteration.

pub mod error;
pub mod lock;

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use pageproof_model::domain::{Chunk, Document, Page, Span};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

pub use error::{Result, StoreError};
pub use lock::DocumentLocks;

const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const PAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("pages");
const SPANS: TableDefinition<&str, &[u8]> = TableDefinition::new("spans");
const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const DOC_PAGE_IDS: TableDefinition<&str, &[u8]> = TableDefinition::new("doc_page_ids");
const DOC_SPAN_IDS: TableDefinition<&str, &[u8]> = TableDefinition::new("doc_span_ids");
const DOC_CHUNK_IDS: TableDefinition<&str, &[u8]> = TableDefinition::new("doc_chunk_ids");
const COUNTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("counters");

/// Persistence contract for the document/page/span/chunk data model.
///
/// Implementations must guarantee that [`Store::replace_document_contents`]
/// is atomic: either every page/span/chunk row lands in the new state, or
/// none do (matching the "wipe and rebuild inside one transaction" ordering
/// guarantee).
pub trait Store: Send + Sync {
    fn create_document(&self, document: &Document) -> Result<()>;
    fn get_document(&self, id: Uuid) -> Result<Option<Document>>;
    fn update_document(&self, document: &Document) -> Result<()>;

    fn allocate_page_ids(&self, count: usize) -> Result<Vec<i64>>;
    fn allocate_span_ids(&self, count: usize) -> Result<Vec<i64>>;

    /// Deletes all pages, spans, and chunks for `document_id`, then inserts
    /// the given rows, all inside a single write transaction.
    fn replace_document_contents(
        &self,
        document_id: Uuid,
        pages: Vec<Page>,
        spans: Vec<Span>,
        chunks: Vec<Chunk>,
    ) -> Result<()>;

    fn get_pages(&self, document_id: Uuid) -> Result<Vec<Page>>;
    fn get_page(&self, document_id: Uuid, page_number: i32) -> Result<Option<Page>>;
    fn get_spans(&self, document_id: Uuid) -> Result<Vec<Span>>;
    fn get_spans_in_id_range(&self, document_id: Uuid, min_id: i64, max_id: i64) -> Result<Vec<Span>>;
    fn get_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>>;
    fn get_chunk_by_index(&self, document_id: Uuid, chunk_index: i32) -> Result<Option<Chunk>>;
    fn get_chunks_missing_embeddings(&self, document_id: Uuid) -> Result<Vec<Chunk>>;
    fn save_chunk_embedding(&self, document_id: Uuid, chunk_id: Uuid, embedding: Vec<f32>) -> Result<()>;
}

/// `redb`-backed [`Store`] implementation.
pub struct RedbStore {
    path: PathBuf,
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish_non_exhaustive()
    }
}

fn to_blob<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_blob<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

impl RedbStore {
    /// Opens or creates a `redb` database file at `path`, creating parent
    /// directories as needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(&path).map_err(db_err)?;
        Ok(Self { path, db })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_ids(&self, counter_key: &str, count: usize) -> Result<Vec<i64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_write().map_err(db_err)?;
        let start = {
            let mut table = txn.open_table(COUNTERS).map_err(db_err)?;
            let current = table
                .get(counter_key)
                .map_err(db_err)?
                .map(|v| i64::from_le_bytes(v.value().try_into().unwrap_or([0; 8])))
                .unwrap_or(0);
            let next = current + count as i64;
            table
                .insert(counter_key, next.to_le_bytes().as_slice())
                .map_err(db_err)?;
            current
        };
        txn.commit().map_err(db_err)?;
        Ok((0..count as i64).map(|i| start + i + 1).collect())
    }
}

impl Store for RedbStore {
    fn create_document(&self, document: &Document) -> Result<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(db_err)?;
            table
                .insert(document.id.to_string().as_str(), to_blob(document)?.as_slice())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = match txn.open_table(DOCUMENTS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(db_err(e)),
        };
        match table.get(id.to_string().as_str()).map_err(db_err)? {
            Some(v) => Ok(Some(from_blob(v.value())?)),
            None => Ok(None),
        }
    }

    fn update_document(&self, document: &Document) -> Result<()> {
        self.create_document(document)
    }

    fn allocate_page_ids(&self, count: usize) -> Result<Vec<i64>> {
        self.next_ids("page", count)
    }

    fn allocate_span_ids(&self, count: usize) -> Result<Vec<i64>> {
        self.next_ids("span", count)
    }

    fn replace_document_contents(
        &self,
        document_id: Uuid,
        pages: Vec<Page>,
        spans: Vec<Span>,
        chunks: Vec<Chunk>,
    ) -> Result<()> {
        let doc_key = document_id.to_string();
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut pages_table = txn.open_table(PAGES).map_err(db_err)?;
            let mut spans_table = txn.open_table(SPANS).map_err(db_err)?;
            let mut chunks_table = txn.open_table(CHUNKS).map_err(db_err)?;
            let mut doc_pages = txn.open_table(DOC_PAGE_IDS).map_err(db_err)?;
            let mut doc_spans = txn.open_table(DOC_SPAN_IDS).map_err(db_err)?;
            let mut doc_chunks = txn.open_table(DOC_CHUNK_IDS).map_err(db_err)?;

            // Cascade-delete in FK-safe order: chunks, then spans, then pages.
            if let Some(existing) = doc_chunks.get(doc_key.as_str()).map_err(db_err)? {
                let ids: Vec<Uuid> = from_blob(existing.value())?;
                drop(existing);
                for id in ids {
                    chunks_table.remove(id.to_string().as_str()).map_err(db_err)?;
                }
            }
            if let Some(existing) = doc_spans.get(doc_key.as_str()).map_err(db_err)? {
                let ids: Vec<i64> = from_blob(existing.value())?;
                drop(existing);
                for id in ids {
                    spans_table.remove(id.to_string().as_str()).map_err(db_err)?;
                }
            }
            if let Some(existing) = doc_pages.get(doc_key.as_str()).map_err(db_err)? {
                let ids: Vec<i64> = from_blob(existing.value())?;
                drop(existing);
                for id in ids {
                    pages_table.remove(id.to_string().as_str()).map_err(db_err)?;
                }
            }

            let page_ids: Vec<i64> = pages.iter().map(|p| p.id).collect();
            for page in &pages {
                pages_table
                    .insert(page.id.to_string().as_str(), to_blob(page)?.as_slice())
                    .map_err(db_err)?;
            }
            doc_pages
                .insert(doc_key.as_str(), to_blob(&page_ids)?.as_slice())
                .map_err(db_err)?;

            let span_ids: Vec<i64> = spans.iter().map(|s| s.id).collect();
            for span in &spans {
                spans_table
                    .insert(span.id.to_string().as_str(), to_blob(span)?.as_slice())
                    .map_err(db_err)?;
            }
            doc_spans
                .insert(doc_key.as_str(), to_blob(&span_ids)?.as_slice())
                .map_err(db_err)?;

            let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
            for chunk in &chunks {
                chunks_table
                    .insert(chunk.id.to_string().as_str(), to_blob(chunk)?.as_slice())
                    .map_err(db_err)?;
            }
            doc_chunks
                .insert(doc_key.as_str(), to_blob(&chunk_ids)?.as_slice())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn get_pages(&self, document_id: Uuid) -> Result<Vec<Page>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let ids = read_index(&txn, DOC_PAGE_IDS, document_id)?;
        let table = match txn.open_table(PAGES) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(db_err(e)),
        };
        let mut pages = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(v) = table.get(id.to_string().as_str()).map_err(db_err)? {
                pages.push(from_blob::<Page>(v.value())?);
            }
        }
        pages.sort_by_key(|p| p.page_number);
        Ok(pages)
    }

    fn get_page(&self, document_id: Uuid, page_number: i32) -> Result<Option<Page>> {
        Ok(self
            .get_pages(document_id)?
            .into_iter()
            .find(|p| p.page_number == page_number))
    }

    fn get_spans(&self, document_id: Uuid) -> Result<Vec<Span>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let ids = read_index(&txn, DOC_SPAN_IDS, document_id)?;
        let table = match txn.open_table(SPANS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(db_err(e)),
        };
        let mut spans = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(v) = table.get(id.to_string().as_str()).map_err(db_err)? {
                spans.push(from_blob::<Span>(v.value())?);
            }
        }
        spans.sort_by_key(|s| s.id);
        Ok(spans)
    }

    fn get_spans_in_id_range(&self, document_id: Uuid, min_id: i64, max_id: i64) -> Result<Vec<Span>> {
        Ok(self
            .get_spans(document_id)?
            .into_iter()
            .filter(|s| s.id >= min_id && s.id <= max_id)
            .collect())
    }

    fn get_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let ids = read_index(&txn, DOC_CHUNK_IDS, document_id)?;
        let table = match txn.open_table(CHUNKS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(db_err(e)),
        };
        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(v) = table.get(id.to_string().as_str()).map_err(db_err)? {
                chunks.push(from_blob::<Chunk>(v.value())?);
            }
        }
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    fn get_chunk_by_index(&self, document_id: Uuid, chunk_index: i32) -> Result<Option<Chunk>> {
        Ok(self
            .get_chunks(document_id)?
            .into_iter()
            .find(|c| c.chunk_index == chunk_index))
    }

    fn get_chunks_missing_embeddings(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        Ok(self
            .get_chunks(document_id)?
            .into_iter()
            .filter(|c| c.embedding.is_none())
            .collect())
    }

    fn save_chunk_embedding(&self, document_id: Uuid, chunk_id: Uuid, embedding: Vec<f32>) -> Result<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(CHUNKS).map_err(db_err)?;
            let key = chunk_id.to_string();
            let Some(existing) = table.get(key.as_str()).map_err(db_err)?.map(|v| v.value().to_vec())
            else {
                return Err(StoreError::NotFound(document_id));
            };
            let mut chunk: Chunk = from_blob(&existing)?;
            chunk.embedding = Some(embedding);
            table
                .insert(key.as_str(), to_blob(&chunk)?.as_slice())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }
}

fn read_index<T: serde::de::DeserializeOwned>(
    txn: &redb::ReadTransaction,
    table_def: TableDefinition<&str, &[u8]>,
    document_id: Uuid,
) -> Result<Vec<T>> {
    let table = match txn.open_table(table_def) {
        Ok(t) => t,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(db_err(e)),
    };
    match table.get(document_id.to_string().as_str()).map_err(db_err)? {
        Some(v) => from_blob(v.value()),
        None => Ok(Vec::new()),
    }
}

/// Per-document advisory locks, guaranteeing at most one ingestion writer
/// per document at a time.
pub type LockTable = DashMap<Uuid, ()>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pageproof_model::domain::{BBox, DocumentStatus};
    use tempfile::tempdir;

    fn sample_document(id: Uuid) -> Document {
        Document {
            id,
            filename: "test.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            status: DocumentStatus::Processing,
            total_pages: None,
            page_width: None,
            page_height: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_fetch_document() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("test.redb")).unwrap();
        let id = Uuid::new_v4();
        store.create_document(&sample_document(id)).unwrap();
        let fetched = store.get_document(id).unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, DocumentStatus::Processing);
    }

    #[test]
    fn missing_document_returns_none() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("test.redb")).unwrap();
        assert!(store.get_document(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn allocate_ids_are_monotonic_and_non_overlapping() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("test.redb")).unwrap();
        let first = store.allocate_span_ids(3).unwrap();
        let second = store.allocate_span_ids(2).unwrap();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4, 5]);
    }

    #[test]
    fn replace_document_contents_is_atomic_and_cascades() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("test.redb")).unwrap();
        let doc_id = Uuid::new_v4();
        store.create_document(&sample_document(doc_id)).unwrap();

        let page_ids = store.allocate_page_ids(1).unwrap();
        let span_ids = store.allocate_span_ids(2).unwrap();
        let page = Page {
            id: page_ids[0],
            document_id: doc_id,
            page_number: 1,
            width_pts: Some(612.0),
            height_pts: Some(792.0),
            image_path: None,
        };
        let bbox = BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 };
        let spans = vec![
            Span {
                id: span_ids[0],
                document_id: doc_id,
                page_id: page.id,
                page_number: 1,
                span_index: 0,
                text: "Hello".to_string(),
                bbox,
                char_start: Some(0),
                char_end: Some(5),
            },
            Span {
                id: span_ids[1],
                document_id: doc_id,
                page_id: page.id,
                page_number: 1,
                span_index: 1,
                text: "world".to_string(),
                bbox,
                char_start: Some(6),
                char_end: Some(11),
            },
        ];
        let chunk = Chunk {
            id: Uuid::new_v4(),
            document_id: doc_id,
            chunk_index: 0,
            text: "Hello world".to_string(),
            page_start: Some(1),
            page_end: Some(1),
            span_start_id: Some(span_ids[0]),
            span_end_id: Some(span_ids[1]),
            embedding: None,
            created_at: Utc::now(),
        };

        store
            .replace_document_contents(doc_id, vec![page], spans, vec![chunk])
            .unwrap();

        assert_eq!(store.get_pages(doc_id).unwrap().len(), 1);
        assert_eq!(store.get_spans(doc_id).unwrap().len(), 2);
        assert_eq!(store.get_chunks(doc_id).unwrap().len(), 1);

        // Re-ingest with fewer rows: old rows must be fully gone (cascade).
        store.replace_document_contents(doc_id, vec![], vec![], vec![]).unwrap();
        assert!(store.get_pages(doc_id).unwrap().is_empty());
        assert!(store.get_spans(doc_id).unwrap().is_empty());
        assert!(store.get_chunks(doc_id).unwrap().is_empty());
    }

    #[test]
    fn save_chunk_embedding_round_trips() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("test.redb")).unwrap();
        let doc_id = Uuid::new_v4();
        let chunk_id = Uuid::new_v4();
        let chunk = Chunk {
            id: chunk_id,
            document_id: doc_id,
            chunk_index: 0,
            text: "text".to_string(),
            page_start: Some(1),
            page_end: Some(1),
            span_start_id: None,
            span_end_id: None,
            embedding: None,
            created_at: Utc::now(),
        };
        store
            .replace_document_contents(doc_id, vec![], vec![], vec![chunk])
            .unwrap();
        store
            .save_chunk_embedding(doc_id, chunk_id, vec![0.1, 0.2, 0.3])
            .unwrap();
        let chunks = store.get_chunks(doc_id).unwrap();
        assert_eq!(chunks[0].embedding, Some(vec![0.1, 0.2, 0.3]));
    }
}
