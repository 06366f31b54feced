use crate::error::Result;
use crate::loader::load_document;
use crate::parsers::{parse_document, ParsedDocument};
use crate::schema::{Diagnostic, Partial};
use log::warn;
use serde::{Deserialize, Serialize};

/// One uploaded export: a file name and its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Detects the document's format and parses its rows into line items.
///
/// Only an unrecognizable document fails; row-level problems travel with
/// the parsed document as diagnostics.
pub fn ingest(document: &InputDocument) -> Result<ParsedDocument> {
    let raw = load_document(&document.name, &document.bytes)?;
    Ok(parse_document(&raw))
}

/// Ingests every document, turning the ones that cannot be read into
/// diagnostics. Row diagnostics of the parsed documents are collected too.
pub fn ingest_all(documents: &[InputDocument]) -> Partial<Vec<ParsedDocument>> {
    let mut parsed = Vec::with_capacity(documents.len());
    let mut diagnostics = Vec::new();

    for document in documents {
        match ingest(document) {
            Ok(doc) => {
                diagnostics.extend(doc.diagnostics.iter().cloned());
                parsed.push(doc);
            }
            Err(e) => {
                warn!("Skipping document '{}': {}", document.name, e);
                diagnostics.push(Diagnostic::from_error(&e).in_document(&document.name, None));
            }
        }
    }

    Partial::with_diagnostics(parsed, diagnostics)
}
