//! Shared data model, configuration, and error types for Page-Proof QA.

pub mod config;
pub mod domain;
pub mod error;

pub use config::{Settings, SettingsBuilder};
pub use domain::{
    AskQuestionResponse, BBox, Chunk, Document, DocumentStatus, EvidenceItem, Page, Span,
    INSUFFICIENT_EVIDENCE_ANSWER,
};
pub use error::PageProofError;
