//! Column sniffing for a single row.
//!
//! Uploads come without a fixed schema, so the business number and the
//! display name are guessed from header names first and cell shapes second.

use crate::model::Metadata;

/// Minimum number of digits for a cell to count as a business number.
pub const MIN_IDENTIFIER_DIGITS: usize = 9;

const IDENTIFIER_HEADER_MARKERS: &[&str] = &["abn"];
const NAME_HEADER_MARKERS: &[&str] = &["name", "company", "entity"];
const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub identifier: String,
    pub display_name: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(ExtractedFields),
    /// No cell looks like a business number; the row cannot be looked up.
    NoIdentifier,
}

impl Extraction {
    pub fn found(self) -> Option<ExtractedFields> {
        match self {
            Self::Found(fields) => Some(fields),
            Self::NoIdentifier => None,
        }
    }
}

/// Trim a cell and remove one layer of surrounding double quotes.
pub fn clean_cell(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

/// Digits of `cell` with all whitespace removed, if that is a plausible identifier.
pub fn identifier_candidate(cell: &str) -> Option<String> {
    let compact: String = clean_cell(cell)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let plausible =
        compact.len() >= MIN_IDENTIFIER_DIGITS && compact.bytes().all(|b| b.is_ascii_digit());
    plausible.then_some(compact)
}

/// Key used for column `index` (zero-based) when the file has no usable header.
pub fn synthetic_column(index: usize) -> String {
    format!("Col_{}", index + 1)
}

fn dedup_key(keys: &[String], base: String) -> String {
    let mut key = base.clone();
    let mut n = 2;
    while keys.contains(&key) {
        key = format!("{base} ({n})");
        n += 1;
    }
    key
}

/// Build metadata keys from a header row: trimmed text, `Col_N` for blank
/// cells and a numeric suffix for repeated names.
pub fn metadata_keys(header: &[String]) -> Vec<String> {
    column_keys(header, header.len())
}

/// Keys for `width` columns: header names first, then `Col_N` for columns
/// past the header. Every key is unique, a synthetic key included.
pub fn column_keys(header: &[String], width: usize) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(width.max(header.len()));
    for index in 0..width.max(header.len()) {
        let base = match header.get(index).map(|cell| clean_cell(cell)) {
            None | Some("") => synthetic_column(index),
            Some(text) => text.to_string(),
        };
        let key = dedup_key(&keys, base);
        keys.push(key);
    }
    keys
}

/// Column layout shared by every row of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    keys: Vec<String>,
    has_header: bool,
}

impl Columns {
    /// Layout for rows at most `width` cells wide, with or without a header row.
    pub fn new(header: Option<&[String]>, width: usize) -> Self {
        Self {
            keys: column_keys(header.unwrap_or_default(), width),
            has_header: header.is_some(),
        }
    }

    /// Header-derived keys used by the column heuristics.
    pub fn header(&self) -> Option<&[String]> {
        self.has_header.then_some(self.keys.as_slice())
    }

    /// Metadata keys, one per column.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

fn header_matches(header: &str, markers: &[&str]) -> bool {
    let lower = header.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn find_identifier(cells: &[String], headers: Option<&[String]>) -> Option<String> {
    let from_header = headers.and_then(|headers| {
        headers
            .iter()
            .enumerate()
            .filter(|(_, h)| header_matches(h, IDENTIFIER_HEADER_MARKERS))
            .find_map(|(i, _)| cells.get(i).and_then(|c| identifier_candidate(c)))
    });
    from_header.or_else(|| cells.iter().find_map(|c| identifier_candidate(c)))
}

fn find_display_name(cells: &[String], headers: Option<&[String]>, identifier: &str) -> String {
    let from_header = headers.and_then(|headers| {
        headers
            .iter()
            .position(|h| header_matches(h, NAME_HEADER_MARKERS))
            .and_then(|i| cells.get(i))
            .map(|c| clean_cell(c))
            .filter(|c| !c.is_empty())
    });
    from_header
        .or_else(|| {
            cells.iter().map(|c| clean_cell(c)).find(|c| {
                !c.is_empty() && identifier_candidate(c).as_deref() != Some(identifier)
            })
        })
        .unwrap_or(UNKNOWN_NAME)
        .to_string()
}

/// Identify the business number, a display name and the full column map of a row.
///
/// `cells` are the unquoted cells as they appeared in the file; they are kept
/// untouched in the metadata and cleaned only for the heuristics. Every row
/// gets exactly the keys of `columns`, padded with empty values.
pub fn extract_fields(cells: &[String], columns: &Columns) -> Extraction {
    let headers = columns.header();
    let Some(identifier) = find_identifier(cells, headers) else {
        return Extraction::NoIdentifier;
    };
    let display_name = find_display_name(cells, headers, &identifier);

    let mut keys = columns.keys().to_vec();
    for index in keys.len()..cells.len() {
        let key = dedup_key(&keys, synthetic_column(index));
        keys.push(key);
    }
    let metadata = keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| (key, cells.get(i).cloned().unwrap_or_default()))
        .collect();

    Extraction::Found(ExtractedFields {
        identifier,
        display_name,
        metadata,
    })
}
