//! Spreadsheet extraction, one unit per data row
//!
//! Each data row becomes one retrievable unit: the header row is folded into
//! the row text as `header: value` pairs so a row stays meaningful when it is
//! retrieved without its neighbors.

use super::{ParsedDocument, ParsedUnit};
use crate::error::{Error, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use tracing::debug;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Parse spreadsheet bytes (xlsx/xls/ods or CSV text) into row units
pub fn parse_spreadsheet(raw: &[u8]) -> Result<ParsedDocument> {
    if raw.starts_with(ZIP_MAGIC) || raw.starts_with(OLE_MAGIC) {
        parse_workbook(raw)
    } else if let Ok(text) = std::str::from_utf8(raw) {
        Ok(parse_csv_text(text))
    } else {
        Err(Error::UnsupportedFormat(
            "byte stream is neither a workbook container nor CSV text".to_string(),
        ))
    }
}

fn parse_workbook(raw: &[u8]) -> Result<ParsedDocument> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(raw.to_vec()))
        .map_err(|e| Error::UnsupportedFormat(format!("unreadable workbook: {}", e)))?;

    let mut doc = ParsedDocument::default();
    for (sheet_name, range) in workbook.worksheets() {
        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

        // Row numbers are 1-based and include the header row, matching what a
        // reader sees in a spreadsheet application.
        for (offset, row) in rows.enumerate() {
            let cells: Vec<String> = row.iter().map(cell_to_string).collect();
            match row_to_text(&headers, &cells) {
                Some(text) => doc.units.push(ParsedUnit {
                    text,
                    label: format!("{}!row{}", sheet_name, offset + 2),
                }),
                None => debug!("Skipping empty row {} in sheet {}", offset + 2, sheet_name),
            }
        }
    }

    Ok(doc)
}

fn parse_csv_text(text: &str) -> ParsedDocument {
    let mut doc = ParsedDocument::default();
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header_line)) = lines.next() else {
        return doc;
    };
    let headers: Vec<String> = header_line.split(',').map(|c| c.trim().to_string()).collect();

    // Labels use 1-based line numbers including the header line, the same
    // convention as the workbook path.
    for (idx, line) in lines {
        let cells: Vec<String> = line.split(',').map(|c| c.trim().to_string()).collect();
        if let Some(text) = row_to_text(&headers, &cells) {
            doc.units.push(ParsedUnit {
                text,
                label: format!("csv!row{}", idx + 1),
            });
        }
    }

    doc
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Render one data row as `header: value` pairs. Returns `None` for rows
/// with no values at all.
pub fn row_to_text(headers: &[String], cells: &[String]) -> Option<String> {
    let pairs: Vec<String> = cells
        .iter()
        .enumerate()
        .filter(|(_, value)| !value.is_empty())
        .map(|(i, value)| {
            match headers.get(i).filter(|h| !h.is_empty()) {
                Some(header) => format!("{}: {}", header, value),
                None => format!("col{}: {}", i + 1, value),
            }
        })
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_text_pairs_headers() {
        let headers = vec!["region".to_string(), "capacity_mw".to_string()];
        let cells = vec!["north".to_string(), "420".to_string()];
        assert_eq!(
            row_to_text(&headers, &cells),
            Some("region: north; capacity_mw: 420".to_string())
        );
    }

    #[test]
    fn test_row_to_text_skips_empty_cells_and_rows() {
        let headers = vec!["region".to_string(), "capacity_mw".to_string()];
        assert_eq!(
            row_to_text(&headers, &["".to_string(), "99".to_string()]),
            Some("capacity_mw: 99".to_string())
        );
        assert_eq!(row_to_text(&headers, &["".to_string(), "".to_string()]), None);
    }

    #[test]
    fn test_row_to_text_falls_back_to_column_index() {
        let headers = vec!["region".to_string()];
        let cells = vec!["north".to_string(), "extra".to_string()];
        assert_eq!(
            row_to_text(&headers, &cells),
            Some("region: north; col2: extra".to_string())
        );
    }

    #[test]
    fn test_csv_one_unit_per_data_row() {
        let csv = "site,output_gwh\nsolar farm a,12.5\nwind farm b,30.1\n";
        let doc = parse_spreadsheet(csv.as_bytes()).unwrap();
        assert_eq!(doc.units.len(), 2);
        assert_eq!(doc.units[0].text, "site: solar farm a; output_gwh: 12.5");
        // Row numbers count from the top of the file, header included, so the
        // first data row is row 2
        assert_eq!(doc.units[0].label, "csv!row2");
        assert_eq!(doc.units[1].label, "csv!row3");
    }

    #[test]
    fn test_csv_blank_lines_are_skipped() {
        let csv = "a,b\n\n1,2\n\n";
        let doc = parse_spreadsheet(csv.as_bytes()).unwrap();
        assert_eq!(doc.units.len(), 1);
    }

    #[test]
    fn test_binary_garbage_is_unsupported() {
        let result = parse_spreadsheet(&[0xff, 0x00, 0x01, 0x02]);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }
}
