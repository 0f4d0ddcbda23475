//! PDF text extraction using lopdf.

use std::path::Path;

use lopdf::Document as PdfDocument;
use tracing::{info, warn};

use super::DocumentError;

/// Pages between progress log lines.
pub const PROGRESS_EVERY_PAGES: usize = 50;

/// Extract the text of every page, in page order, joined by blank lines.
///
/// Pages whose text cannot be decoded are skipped with a warning. A PDF
/// with no extractable text at all (e.g. scanned images) is an error.
pub fn extract_text(path: &Path) -> Result<String, DocumentError> {
    let doc = PdfDocument::load(path).map_err(|e| DocumentError::Pdf {
        path: path.to_path_buf(),
        reason: format!("failed to load PDF: {e}"),
    })?;

    let mut page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();
    let total = page_numbers.len();
    info!(path = %path.display(), pages = total, "extracting PDF text");

    let mut pages = Vec::with_capacity(total);
    for (idx, page_num) in page_numbers.iter().enumerate() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    pages.push(trimmed.to_string());
                }
            }
            Err(e) => warn!(page = page_num, error = %e, "skipping unreadable PDF page"),
        }

        let done = idx + 1;
        if done % PROGRESS_EVERY_PAGES == 0 || done == total {
            info!(pages_done = done, pages_total = total, "PDF extraction progress");
        }
    }

    if pages.is_empty() {
        return Err(DocumentError::Pdf {
            path: path.to_path_buf(),
            reason: "no text content found; the document may be scanned".into(),
        });
    }
    Ok(pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        assert!(matches!(extract_text(&path), Err(DocumentError::Pdf { .. })));
    }
}
