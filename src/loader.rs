use crate::detector::{detect, Detection};
use crate::error::{FinancialHealthError, Result};
use crate::schema::DocumentType;
use crate::utils::{contains_phrase, normalize_label};
use csv::{ReaderBuilder, Trim};
use log::debug;
use serde::{Deserialize, Serialize};

/// One record of a source document, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based line number of the record in the source.
    pub number: usize,
    pub cells: Vec<String>,
    /// First non-empty cell.
    pub label: Option<String>,
}

impl RawRow {
    pub fn new(number: usize, cells: Vec<String>) -> Self {
        let label = cells.iter().find(|c| !c.is_empty()).cloned();
        Self {
            number,
            cells,
            label,
        }
    }

    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn non_empty(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(String::as_str).filter(|c| !c.is_empty())
    }

    pub fn non_empty_count(&self) -> usize {
        self.non_empty().count()
    }

    pub fn text(&self) -> String {
        self.non_empty().collect::<Vec<_>>().join(" ")
    }
}

/// Rows of a document before its format is known.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub rows: Vec<RawRow>,
}

/// A detected document: its format tag, the rows above the header (titles,
/// unit and period notes), the header and the data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub name: String,
    pub document_type: DocumentType,
    pub preamble: Vec<RawRow>,
    pub header: Option<RawRow>,
    pub rows: Vec<RawRow>,
}

impl RawDocument {
    pub fn from_table(table: RawTable, detection: &Detection) -> Self {
        let RawTable { name, mut rows } = table;
        match detection.header_index {
            Some(index) => {
                let rest = rows.split_off(index + 1);
                let header = rows.pop();
                RawDocument {
                    name,
                    document_type: detection.document_type,
                    preamble: rows,
                    header,
                    rows: rest,
                }
            }
            None => {
                let split = rows
                    .iter()
                    .position(|r| r.non_empty_count() > 1)
                    .unwrap_or(rows.len());
                let rest = rows.split_off(split);
                RawDocument {
                    name,
                    document_type: detection.document_type,
                    preamble: rows,
                    header: None,
                    rows: rest,
                }
            }
        }
    }

    /// Preamble and header text, where unit notes such as "in thousands" live.
    pub fn unit_hints(&self) -> Vec<String> {
        self.preamble
            .iter()
            .chain(self.header.iter())
            .flat_map(|r| r.non_empty().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub fn header_cells(&self) -> &[String] {
        self.header.as_ref().map(|h| h.cells.as_slice()).unwrap_or(&[])
    }

    /// Index of the header cell that best matches one of `keywords`: exact
    /// matches beat whole-word containment, earlier columns win ties.
    pub fn find_column(&self, keywords: &[&str], taken: &[usize]) -> Option<usize> {
        find_column(self.header_cells(), keywords, taken)
    }
}

pub fn find_column(cells: &[String], keywords: &[&str], taken: &[usize]) -> Option<usize> {
    let mut contained = None;
    for (index, cell) in cells.iter().enumerate() {
        if taken.contains(&index) || cell.is_empty() {
            continue;
        }
        let normalized = normalize_label(cell);
        if keywords.iter().any(|k| normalize_label(k) == normalized) {
            return Some(index);
        }
        if contained.is_none() && keywords.iter().any(|k| contains_phrase(cell, k)) {
            contained = Some(index);
        }
    }
    contained
}

/// Decodes and splits raw bytes into trimmed rows, dropping empty records.
pub fn read_table(name: &str, bytes: &[u8]) -> Result<RawTable> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(&text);
    let delimiter = sniff_delimiter(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let number = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        let cells: Vec<String> = record
            .iter()
            .map(|c| c.trim_matches(|ch: char| ch.is_whitespace() || ch == '\u{00A0}').to_string())
            .collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(RawRow::new(number, cells));
    }

    debug!(
        "Read {} rows from '{}' (delimiter '{}')",
        rows.len(),
        name,
        delimiter as char
    );

    Ok(RawTable {
        name: name.to_string(),
        rows,
    })
}

/// Reads, detects and splits a document. Fails with `UnrecognizedFormat` when
/// no format signal is present.
pub fn load_document(name: &str, bytes: &[u8]) -> Result<RawDocument> {
    let table = read_table(name, bytes)?;
    if table.rows.is_empty() {
        return Err(FinancialHealthError::UnrecognizedFormat {
            document: name.to_string(),
        });
    }
    let detection = detect(&table)?;
    debug!(
        "Detected '{}' as {} (header at {:?}, {:?} signal)",
        name, detection.document_type, detection.header_index, detection.strength
    );
    Ok(RawDocument::from_table(table, &detection))
}

fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(12)
        .collect();
    if lines.is_empty() {
        return b',';
    }
    let share = |delimiter: char| lines.iter().filter(|l| l.contains(delimiter)).count() * 2;

    if share(';') >= lines.len() {
        b';'
    } else if share('\t') >= lines.len() {
        b'\t'
    } else {
        b','
    }
}
