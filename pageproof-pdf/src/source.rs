//! Binds a PDF file on disk to the page-level inputs [`ingest_pages`]
//! expects: native word extraction plus a rendered page image, one per
//! page. Only available with the `pdfium` feature; without it, callers get
//! [`PdfError::PdfiumNotEnabled`] so the rest of the crate stays buildable
//! without the native binding.
//!
//! [`ingest_pages`]: crate::ingest::ingest_pages

use std::path::Path;

use crate::error::Result;
use crate::ingest::RawPage;

#[cfg(feature = "pdfium")]
pub fn load_raw_pages(pdfium_library_path: &Path, pdf_path: &Path, pages_dir: &Path) -> Result<Vec<RawPage>> {
    use crate::error::PdfError;
    use crate::extract::pdfium_backend::extract_words;
    use crate::extract::sort_reading_order;
    use crate::render::pdfium_backend::{bind_pdfium, render_page};

    let pdfium = bind_pdfium(pdfium_library_path)?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut raw_pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_number = i32::try_from(index + 1).unwrap_or(i32::MAX);
        let width_pts = f64::from(page.width().value);
        let height_pts = f64::from(page.height().value);

        let mut words = extract_words(&page)?;
        sort_reading_order(&mut words);

        let image_path = render_page(&page, page_number, pages_dir)?;

        raw_pages.push(RawPage {
            page_number,
            width_pts,
            height_pts,
            native_words: words,
            rendered_image_path: Some(image_path),
        });
    }

    Ok(raw_pages)
}

#[cfg(not(feature = "pdfium"))]
pub fn load_raw_pages(_pdfium_library_path: &Path, _pdf_path: &Path, _pages_dir: &Path) -> Result<Vec<RawPage>> {
    Err(crate::error::PdfError::PdfiumNotEnabled)
}
