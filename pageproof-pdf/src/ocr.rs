//! OCR provider contract (C1 fallback path).
//!
//! A real OCR backend (Tesseract, PaddleOCR, ...) is an external
//! collaborator; this module only specifies and tests the trait boundary.

use std::path::Path;

use pageproof_model::domain::BBox;

use crate::error::Result;

/// One OCR-recognized word, in the pixel space of the rasterized page image
/// the request was made against.
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BBox,
}

/// Parameters for one page's OCR pass.
#[derive(Debug, Clone)]
pub struct OcrRequest<'a> {
    pub image_path: &'a Path,
    pub language: &'a str,
    pub dpi: u32,
    pub full_page: bool,
    pub tessdata: Option<&'a Path>,
}

/// Pluggable OCR backend.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, request: &OcrRequest<'_>) -> Result<Vec<OcrWord>>;
}

/// The default engine: always returns no words. Used when OCR is disabled
/// or no provider has been configured, so the pipeline always falls back to
/// the native extraction without special-casing "no OCR" at call sites.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOcrEngine;

impl OcrEngine for NullOcrEngine {
    fn recognize(&self, _request: &OcrRequest<'_>) -> Result<Vec<OcrWord>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdfError;
    use std::path::PathBuf;

    struct ScriptedEngine {
        words: Vec<OcrWord>,
        fail: bool,
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, _request: &OcrRequest<'_>) -> Result<Vec<OcrWord>> {
            if self.fail {
                return Err(PdfError::Ocr("scripted failure".to_string()));
            }
            Ok(self.words.clone())
        }
    }

    #[test]
    fn null_engine_returns_no_words() {
        let engine = NullOcrEngine;
        let path = PathBuf::from("page.png");
        let req = OcrRequest {
            image_path: &path,
            language: "eng",
            dpi: 300,
            full_page: true,
            tessdata: None,
        };
        assert!(engine.recognize(&req).unwrap().is_empty());
    }

    #[test]
    fn scripted_engine_reports_failure() {
        let engine = ScriptedEngine { words: Vec::new(), fail: true };
        let path = PathBuf::from("page.png");
        let req = OcrRequest {
            image_path: &path,
            language: "eng",
            dpi: 300,
            full_page: true,
            tessdata: None,
        };
        assert!(engine.recognize(&req).is_err());
    }
}
