use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a [`Document`]. Created in `Processing`, transitions exactly
/// once to `Ready` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

/// A single uploaded PDF and the outcome of its ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub status: DocumentStatus,
    pub total_pages: Option<i32>,
    pub page_width: Option<f64>,
    pub page_height: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(id: Uuid, filename: impl Into<String>, content_type: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            content_type,
            status: DocumentStatus::Processing,
            total_pages: None,
            page_width: None,
            page_height: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_ready(&mut self, total_pages: i32, page_width: f64, page_height: f64) {
        self.status = DocumentStatus::Ready;
        self.total_pages = Some(total_pages);
        self.page_width = Some(page_width);
        self.page_height = Some(page_height);
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = DocumentStatus::Error;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }
}

/// One page of a document. Unique on `(document_id, page_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub document_id: Uuid,
    pub page_number: i32,
    pub width_pts: Option<f64>,
    pub height_pts: Option<f64>,
    pub image_path: Option<String>,
}

/// An axis-aligned rectangle in PDF user-space points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.x2 > self.x1 && self.y2 > self.y1)
    }

    /// Standard axis-aligned overlap test (open-interval intersection).
    #[must_use]
    pub fn intersects(&self, other: &BBox) -> bool {
        self.x2 > other.x1 && self.x1 < other.x2 && self.y2 > other.y1 && self.y1 < other.y2
    }

    #[must_use]
    pub fn union(boxes: &[&BBox]) -> Option<BBox> {
        let mut iter = boxes.iter();
        let first = iter.next()?;
        let mut out = **first;
        for b in iter {
            out.x1 = out.x1.min(b.x1);
            out.y1 = out.y1.min(b.y1);
            out.x2 = out.x2.max(b.x2);
            out.y2 = out.y2.max(b.y2);
        }
        Some(out)
    }
}

/// One extracted word with its box, in document reading order.
///
/// IDs are assigned monotonically in reading order: a contiguous ID range
/// corresponds to a contiguous slice of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: i64,
    pub document_id: Uuid,
    pub page_id: i64,
    pub page_number: i32,
    pub span_index: i32,
    pub text: String,
    pub bbox: BBox,
    pub char_start: Option<i64>,
    pub char_end: Option<i64>,
}

/// A contiguous, overlapping window of spans with joined text and an
/// optional embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub span_start_id: Option<i64>,
    pub span_end_id: Option<i64>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    #[must_use]
    pub fn page_label(&self) -> String {
        match (self.page_start, self.page_end) {
            (Some(a), Some(b)) if a == b => format!("pages {a}"),
            (Some(a), Some(b)) => format!("pages {a}-{b}"),
            _ => "pages unknown".to_string(),
        }
    }
}

/// A piece of spatially grounded evidence returned alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub page: i32,
    pub text: String,
    pub bbox: BBox,
    pub page_width: Option<f64>,
    pub page_height: Option<f64>,
}

/// Response to an `ask` request: a prose answer plus grounded evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionResponse {
    pub answer: String,
    pub evidence: Vec<EvidenceItem>,
}

/// The fixed literal answer used whenever a confidence gate fails.
pub const INSUFFICIENT_EVIDENCE_ANSWER: &str =
    "I don't have enough grounded evidence in this document to answer that confidently.";

impl AskQuestionResponse {
    #[must_use]
    pub fn insufficient_evidence() -> Self {
        Self {
            answer: INSUFFICIENT_EVIDENCE_ANSWER.to_string(),
            evidence: Vec::new(),
        }
    }
}
