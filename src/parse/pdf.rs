//! PDF text extraction, one unit per page

use super::{normalize_whitespace, ParsedDocument, ParsedUnit};
use crate::error::{Error, Result};
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Parse a PDF byte stream into per-page units.
///
/// Bytes that are not a PDF container fail with `UnsupportedFormat` before
/// any extraction is attempted. Pages that extract to nothing (scanned
/// images, extraction failures) are counted in `skipped_units` and do not
/// fail the document.
pub fn parse_pdf(raw: &[u8]) -> Result<ParsedDocument> {
    if !raw.starts_with(PDF_MAGIC) {
        return Err(Error::UnsupportedFormat(
            "byte stream does not start with a PDF header".to_string(),
        ));
    }

    let pages = pdf_extract::extract_text_from_mem_by_pages(raw)
        .map_err(|e| Error::Parse(format!("PDF extraction failed: {}", e)))?;

    let mut doc = ParsedDocument::default();
    for (idx, page_text) in pages.iter().enumerate() {
        let text = normalize_whitespace(page_text);
        if text.is_empty() {
            debug!("Skipping empty/unreadable PDF page {}", idx + 1);
            doc.skipped_units += 1;
            continue;
        }
        doc.units.push(ParsedUnit {
            text,
            label: format!("page {}", idx + 1),
        });
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_pdf_bytes_are_unsupported() {
        let result = parse_pdf(b"<html><body>not a pdf</body></html>");
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_truncated_magic_is_unsupported() {
        assert!(matches!(
            parse_pdf(b"%PD"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(parse_pdf(b""), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_valid_magic_with_broken_body_is_parse_error() {
        // Passes the header check, then fails inside extraction
        let result = parse_pdf(b"%PDF-1.4 not actually a pdf body");
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
