use std::borrow::Cow;
use std::collections::HashSet;

use csv::ReaderBuilder;
use polars::prelude::*;
use serde::Serialize;

use crate::errors::ParserError;

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Decodes export bytes as UTF-8, falling back to Latin-1 for legacy exports.
///
/// A leading byte-order mark is dropped so it never leaks into the first
/// header name.
pub fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (
            Cow::Borrowed(text.strip_prefix(UTF8_BOM).unwrap_or(text)),
            TextEncoding::Utf8,
        ),
        Err(_) => (
            Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Latin1,
        ),
    }
}

/// Reads delimited text with one header row into a frame of nullable string
/// columns. Empty cells become nulls; no type inference is attempted.
pub fn read_delimited(content: &str, separator: u8) -> Result<DataFrame, ParserError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Err(ParserError::MissingHeader);
    }

    let mut seen = HashSet::with_capacity(headers.len());
    for (index, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(ParserError::EmptyHeaderColumn { index });
        }
        if !seen.insert(name.as_str()) {
            return Err(ParserError::DuplicateHeader {
                column: name.clone(),
            });
        }
    }

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        // a blank trailing line parses as a single empty field
        if record.len() == 1 && record.get(0) == Some("") && headers.len() > 1 {
            continue;
        }
        if record.len() != headers.len() {
            return Err(ParserError::RowWidth {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: headers.len(),
                found: record.len(),
            });
        }
        for (column, field) in values.iter_mut().zip(record.iter()) {
            column.push(if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            });
        }
    }

    let columns: Vec<Column> = headers
        .iter()
        .zip(values.iter())
        .map(|(name, data)| {
            let cells: Vec<Option<&str>> = data.iter().map(|v| v.as_deref()).collect();
            Series::new(name.as_str().into(), cells).into()
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}
