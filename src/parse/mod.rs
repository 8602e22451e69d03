//! Document parsing and text extraction
//!
//! This module handles:
//! - HTML parsing and text extraction
//! - PDF text extraction (one unit per page)
//! - Spreadsheet extraction (one unit per row)
//! - Document kind detection

mod html;
mod pdf;
mod sheet;

pub use html::*;
pub use pdf::*;
pub use sheet::*;

use crate::error::{Error, Result};
use std::path::Path;

/// Document kinds the pipeline can ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    WebPage,
    Pdf,
    Spreadsheet,
}

impl DocumentKind {
    /// Detect document kind from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("html") | Some("htm") => Some(DocumentKind::WebPage),
            Some("pdf") => Some(DocumentKind::Pdf),
            Some("xlsx") | Some("xls") | Some("csv") | Some("ods") => {
                Some(DocumentKind::Spreadsheet)
            }
            _ => None,
        }
    }

    /// Detect document kind from MIME type
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime_lower = mime.to_lowercase();
        if mime_lower.contains("text/html") || mime_lower.contains("application/xhtml") {
            Some(DocumentKind::WebPage)
        } else if mime_lower.contains("application/pdf") {
            Some(DocumentKind::Pdf)
        } else if mime_lower.contains("spreadsheet")
            || mime_lower.contains("application/vnd.ms-excel")
            || mime_lower.contains("text/csv")
        {
            Some(DocumentKind::Spreadsheet)
        } else {
            None
        }
    }

    /// Detect from both path and optional MIME type. MIME takes precedence
    /// for web content; extension is the fallback.
    pub fn detect(path: Option<&Path>, mime: Option<&str>) -> Option<Self> {
        if let Some(m) = mime {
            if let Some(detected) = Self::from_mime(m) {
                return Some(detected);
            }
        }
        path.and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::WebPage => "web_page",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Spreadsheet => "spreadsheet",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "web_page" => Ok(DocumentKind::WebPage),
            "pdf" => Ok(DocumentKind::Pdf),
            "spreadsheet" => Ok(DocumentKind::Spreadsheet),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One retrievable unit of text extracted from a document: a PDF page, a
/// spreadsheet row, or a web page's body text.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    /// Extracted text
    pub text: String,

    /// Human-readable locator inside the source ("page 3", "prices!row12")
    pub label: String,
}

/// Parsed document with extracted content
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Extracted title (if found)
    pub title: Option<String>,

    /// Extracted description metadata (if found)
    pub description: Option<String>,

    /// Retrievable units, in document order
    pub units: Vec<ParsedUnit>,

    /// Links found in the document (web pages only)
    pub links: Vec<ExtractedLink>,

    /// Units that could not be extracted (unreadable PDF pages, malformed
    /// rows). Counted, never fatal for the document.
    pub skipped_units: usize,
}

impl ParsedDocument {
    /// Concatenated text of all units
    pub fn full_text(&self) -> String {
        self.units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.units.iter().all(|u| u.text.trim().is_empty())
    }
}

/// An extracted link
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    /// Link URL (resolved against the page's base URL)
    pub url: String,

    /// Link text
    pub text: Option<String>,

    /// Whether this is internal (same domain) or external
    pub is_internal: bool,
}

/// Parse raw bytes as the given kind. Dispatch is driven by the caller's
/// kind field, never by sniffing beyond each parser's own magic check.
pub fn parse_document(
    kind: DocumentKind,
    raw: &[u8],
    origin: Option<&str>,
) -> Result<ParsedDocument> {
    match kind {
        DocumentKind::WebPage => {
            let content = std::str::from_utf8(raw)
                .map_err(|_| Error::Parse("page content is not valid UTF-8 text".to_string()))?;
            parse_html(content, origin)
        }
        DocumentKind::Pdf => parse_pdf(raw),
        DocumentKind::Spreadsheet => parse_spreadsheet(raw),
    }
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            last_was_whitespace = true;
        } else {
            // Before adding a non-whitespace char, handle accumulated whitespace
            if last_was_whitespace && !result.is_empty() {
                if newline_count >= 2 {
                    // Multiple newlines = paragraph break, preserve as double newline
                    result.push_str("\n\n");
                } else if newline_count == 1 {
                    // Single newline = line break
                    result.push('\n');
                } else {
                    // Other whitespace = single space
                    result.push(' ');
                }
            }
            newline_count = 0;
            result.push(c);
            last_was_whitespace = false;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_detection_from_extension() {
        assert_eq!(
            DocumentKind::from_extension(Path::new("report.pdf")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::from_extension(Path::new("prices.XLSX")),
            Some(DocumentKind::Spreadsheet)
        );
        assert_eq!(
            DocumentKind::from_extension(Path::new("index.html")),
            Some(DocumentKind::WebPage)
        );
        assert_eq!(DocumentKind::from_extension(Path::new("image.png")), None);
    }

    #[test]
    fn test_kind_detection_mime_precedence() {
        assert_eq!(
            DocumentKind::detect(Some(Path::new("download.bin")), Some("application/pdf")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::detect(Some(Path::new("data.csv")), Some("application/octet-stream")),
            Some(DocumentKind::Spreadsheet)
        );
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            DocumentKind::WebPage,
            DocumentKind::Pdf,
            DocumentKind::Spreadsheet,
        ] {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "Hello   world\n\n\n\ntest";
        let result = normalize_whitespace(input);
        assert_eq!(result, "Hello world\n\ntest");
    }

    #[test]
    fn test_parse_document_rejects_binary_page() {
        let result = parse_document(DocumentKind::WebPage, &[0xff, 0xfe, 0x00, 0x01], None);
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
