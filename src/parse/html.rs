//! HTML parsing and text extraction

use super::{normalize_whitespace, ExtractedLink, ParsedDocument, ParsedUnit};
use crate::error::Result;
use scraper::{Html, Selector};
use url::Url;

/// Parse HTML content and extract text, metadata, and links
pub fn parse_html(content: &str, base_url: Option<&str>) -> Result<ParsedDocument> {
    let document = Html::parse_document(content);
    let mut doc = ParsedDocument::default();

    // Extract title
    if let Ok(selector) = Selector::parse("title") {
        if let Some(title_elem) = document.select(&selector).next() {
            let title = title_elem.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                doc.title = Some(title);
            }
        }
    }

    // Extract meta description
    if let Ok(selector) = Selector::parse(r#"meta[name="description"]"#) {
        if let Some(elem) = document.select(&selector).next() {
            if let Some(content) = elem.value().attr("content") {
                let description = content.trim().to_string();
                if !description.is_empty() {
                    doc.description = Some(description);
                }
            }
        }
    }

    // Body only; html2text ignores script/style content on its own
    let body_selector = Selector::parse("body").ok();
    let root = body_selector
        .as_ref()
        .and_then(|s| document.select(s).next())
        .map(|e| e.html())
        .unwrap_or_else(|| content.to_string());

    let text = html2text::from_read(root.as_bytes(), 80).unwrap_or_else(|_| root.clone());
    let text = normalize_whitespace(&text);

    let label = doc.title.clone().unwrap_or_else(|| "page".to_string());
    if !text.is_empty() {
        doc.units.push(ParsedUnit { text, label });
    }

    // Extract links
    if let Ok(selector) = Selector::parse("a[href]") {
        let base = base_url.and_then(|u| Url::parse(u).ok());

        for elem in document.select(&selector) {
            if let Some(href) = elem.value().attr("href") {
                let link_text = elem.text().collect::<String>().trim().to_string();
                let link_text = if link_text.is_empty() {
                    None
                } else {
                    Some(link_text)
                };

                // Resolve relative URLs
                let url = if let Some(ref base) = base {
                    base.join(href)
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| href.to_string())
                } else {
                    href.to_string()
                };

                // Determine if internal
                let is_internal = if let Some(ref base) = base {
                    if let Ok(link_url) = Url::parse(&url) {
                        link_url.host() == base.host()
                    } else {
                        href.starts_with('/') || href.starts_with('#') || !href.contains("://")
                    }
                } else {
                    !href.contains("://")
                };

                doc.links.push(ExtractedLink {
                    url,
                    text: link_text,
                    is_internal,
                });
            }
        }
    }

    Ok(doc)
}

/// Extract just the text content from HTML (simpler version)
pub fn extract_text_from_html(content: &str) -> String {
    let text = html2text::from_read(content.as_bytes(), 80).unwrap_or_else(|_| content.to_string());
    normalize_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_html_basic() {
        let html = r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title>Offshore Wind Outlook</title>
            <meta name="description" content="Annual offshore wind deployment report">
        </head>
        <body>
            <h1>Offshore Wind</h1>
            <p>Installed capacity grew by 18% year over year.</p>
            <script>console.log("noise")</script>
            <a href="/reports/2024">2024 report</a>
        </body>
        </html>
        "#;

        let doc = parse_html(html, Some("https://example.com")).unwrap();

        assert_eq!(doc.title, Some("Offshore Wind Outlook".to_string()));
        assert_eq!(
            doc.description,
            Some("Annual offshore wind deployment report".to_string())
        );
        assert_eq!(doc.units.len(), 1);
        assert!(doc.units[0].text.contains("Installed capacity"));
        assert!(!doc.units[0].text.contains("console.log"));
    }

    #[test]
    fn test_link_extraction() {
        let html = r#"
        <html>
        <body>
            <a href="/internal">Internal</a>
            <a href="https://external.com/page">External</a>
            <a href="relative/path">Relative</a>
        </body>
        </html>
        "#;

        let doc = parse_html(html, Some("https://example.com")).unwrap();

        assert_eq!(doc.links.len(), 3);
        assert!(doc.links[0].is_internal);
        assert_eq!(doc.links[0].url, "https://example.com/internal");
        assert!(!doc.links[1].is_internal);
    }

    #[test]
    fn test_empty_body_yields_no_units() {
        let doc = parse_html("<html><body></body></html>", None).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_extract_text_simple() {
        let html = "<html><body><p>Hello <strong>world</strong>!</p></body></html>";
        let text = extract_text_from_html(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
    }
}
