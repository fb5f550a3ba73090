//! PDF ingestion: page rendering, word-level extraction with OCR fallback,
//! and span/chunk building (components C1 and C2).

pub mod chunking;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod ocr;
pub mod render;
pub mod source;

pub use error::{PdfError, Result};
pub use ingest::{ingest_document, ingest_pages, IngestOutcome, RawPage};
pub use source::load_raw_pages;
