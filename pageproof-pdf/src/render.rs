//! Page image rasterization (C1) and the upload-directory layout.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// `<upload>/<doc_id>/pages/page-####.png`, 4-digit zero-padded.
#[must_use]
pub fn page_image_filename(page_number: i32) -> String {
    format!("page-{page_number:04}.png")
}

#[must_use]
pub fn document_dir(upload_dir: &Path, document_id: uuid::Uuid) -> PathBuf {
    upload_dir.join(document_id.to_string())
}

#[must_use]
pub fn pages_dir(upload_dir: &Path, document_id: uuid::Uuid) -> PathBuf {
    document_dir(upload_dir, document_id).join("pages")
}

/// Creates `<upload>/<doc_id>/pages/`. Mirrors the original service's
/// per-upload directory creation.
pub fn ensure_document_dir(upload_dir: &Path, document_id: uuid::Uuid) -> Result<PathBuf> {
    let dir = pages_dir(upload_dir, document_id);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Removes `<upload>/<doc_id>/` entirely. Used on upload failure (too large,
/// unreadable) to avoid leaving a partially-written directory behind.
pub fn remove_document_dir(upload_dir: &Path, document_id: uuid::Uuid) -> Result<()> {
    let dir = document_dir(upload_dir, document_id);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

/// Stores the path relative to the process CWD when possible, falling back
/// to the absolute path.
#[must_use]
pub fn relativize(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok())
        .map_or_else(|| path.display().to_string(), |rel| rel.display().to_string())
}

const RENDER_SCALE: f32 = 2.0;

#[cfg(feature = "pdfium")]
pub(crate) mod pdfium_backend {
    use super::{page_image_filename, RENDER_SCALE};
    use crate::error::{PdfError, Result};
    use pdfium_render::prelude::*;
    use std::path::Path;

    pub(crate) fn bind_pdfium(library_path: &Path) -> Result<Pdfium> {
        let bindings =
            Pdfium::bind_to_library(library_path).map_err(|e| PdfError::PdfiumLoad(e.to_string()))?;
        Ok(Pdfium::new(bindings))
    }

    /// Rasterizes one page at `RENDER_SCALE` (points -> pixels) to PNG under
    /// `pages_dir`, returning the written file's path.
    pub(crate) fn render_page(
        page: &PdfPage<'_>,
        page_number: i32,
        pages_dir: &Path,
    ) -> Result<std::path::PathBuf> {
        let width_pt = page.width().value.max(1.0);
        let target_width = (width_pt * RENDER_SCALE).round().max(1.0) as i32;

        let config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .rotate_if_landscape(PdfPageRenderRotation::None, true);

        let image = page
            .render_with_config(&config)
            .map_err(|e| PdfError::Parse(e.to_string()))?
            .as_image()
            .into_rgb8();

        let path = pages_dir.join(page_image_filename(page_number));
        image.save(&path).map_err(|e| PdfError::Parse(e.to_string()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn page_image_filename_is_zero_padded() {
        assert_eq!(page_image_filename(1), "page-0001.png");
        assert_eq!(page_image_filename(23), "page-0023.png");
    }

    #[test]
    fn ensure_and_remove_document_dir_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let doc_id = Uuid::new_v4();
        let dir = ensure_document_dir(tmp.path(), doc_id).unwrap();
        assert!(dir.exists());
        remove_document_dir(tmp.path(), doc_id).unwrap();
        assert!(!document_dir(tmp.path(), doc_id).exists());
    }

    #[test]
    fn remove_missing_document_dir_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        remove_document_dir(tmp.path(), Uuid::new_v4()).unwrap();
    }
}
