use pageproof_model::PageProofError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("failed to read PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdfium support was not compiled in; build with the `pdfium` feature")]
    PdfiumNotEnabled,

    #[error("pdfium library path is required; set IngestOptions.pdfium_library_path")]
    MissingPdfiumLibraryPath,

    #[error("failed to load pdfium library: {0}")]
    PdfiumLoad(String),

    #[error("OCR engine failed: {0}")]
    Ocr(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<pageproof_store::StoreError> for PdfError {
    fn from(err: pageproof_store::StoreError) -> Self {
        PdfError::Store(err.to_string())
    }
}

impl From<PdfError> for PageProofError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::MissingPdfiumLibraryPath | PdfError::PdfiumNotEnabled => {
                PageProofError::ConfigurationError(err.to_string())
            }
            other => PageProofError::InternalError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;
