//! One parser per source layout.
//!
//! Every parser turns the rows of a detected [`RawDocument`] into canonical
//! [`LineItem`]s. Row problems never abort a document: they are collected as
//! diagnostics next to whatever rows could be read.

mod balance_sheet;
mod deal_register;
mod income_statement;
mod ledger;
mod trial_balance;

pub use balance_sheet::BalanceSheetParser;
pub use deal_register::DealRegisterParser;
pub use income_statement::IncomeStatementParser;
pub use ledger::LedgerParser;
pub use trial_balance::TrialBalanceParser;

use crate::error::{FinancialHealthError, Result};
use crate::loader::{RawDocument, RawRow};
use crate::period::Period;
use crate::schema::{
    Diagnostic, DiagnosticKind, DocumentType, LineItem, LineKey, LineRole, Partial,
    SourceMetadata,
};
use crate::utils::{parse_amount, Amount};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait LineItemParser {
    fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>>;
}

/// Closed set of parsers, selected by the detected document type.
#[derive(Debug, Clone)]
pub enum DocumentParser {
    IncomeStatement(IncomeStatementParser),
    BalanceSheet(BalanceSheetParser),
    CashflowLedger(LedgerParser),
    TrialBalance(TrialBalanceParser),
    DealRegister(DealRegisterParser),
}

impl DocumentParser {
    pub fn for_type(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::IncomeStatement => {
                DocumentParser::IncomeStatement(IncomeStatementParser::default())
            }
            DocumentType::BalanceSheet => DocumentParser::BalanceSheet(BalanceSheetParser::default()),
            DocumentType::CashflowLedger => DocumentParser::CashflowLedger(LedgerParser),
            DocumentType::TrialBalance => DocumentParser::TrialBalance(TrialBalanceParser),
            DocumentType::DealRegister => DocumentParser::DealRegister(DealRegisterParser),
        }
    }

    pub fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>> {
        match self {
            DocumentParser::IncomeStatement(p) => p.parse(document),
            DocumentParser::BalanceSheet(p) => p.parse(document),
            DocumentParser::CashflowLedger(p) => p.parse(document),
            DocumentParser::TrialBalance(p) => p.parse(document),
            DocumentParser::DealRegister(p) => p.parse(document),
        }
    }
}

/// Line items of one document, with the text needed to resolve its unit scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub name: String,
    pub document_type: DocumentType,
    pub unit_hints: Vec<String>,
    pub items: Vec<LineItem>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse_document(document: &RawDocument) -> ParsedDocument {
    let (items, diagnostics) = DocumentParser::for_type(document.document_type)
        .parse(document)
        .into_parts();

    debug!(
        "Parsed {} line items from '{}' ({}), {} row diagnostics",
        items.len(),
        document.name,
        document.document_type,
        diagnostics.len()
    );

    ParsedDocument {
        name: document.name.clone(),
        document_type: document.document_type,
        unit_hints: document.unit_hints(),
        items,
        diagnostics,
    }
}

/// Accumulates items and row diagnostics for one document and keeps
/// `(key, period)` unique at emission.
pub(crate) struct ItemCollector<'a> {
    document: &'a RawDocument,
    items: Vec<LineItem>,
    seen: HashMap<(LineKey, Period), usize>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ItemCollector<'a> {
    pub fn new(document: &'a RawDocument) -> Self {
        Self {
            document,
            items: Vec::new(),
            seen: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Starts an item read from `row`; callers fill in the classification.
    pub fn item(
        &self,
        row: &RawRow,
        key: LineKey,
        label: &str,
        period: Period,
        value: f64,
    ) -> LineItem {
        LineItem {
            key,
            label: label.to_string(),
            period,
            value,
            source_document_type: self.document.document_type,
            account_type: None,
            term: None,
            role: LineRole::Detail,
            counterparty: None,
            source: SourceMetadata {
                document_name: self.document.name.clone(),
                row: row.number,
            },
        }
    }

    pub fn push(&mut self, item: LineItem) {
        let slot = (item.key.clone(), item.period);
        if let Some(&first_row) = self.seen.get(&slot) {
            let details = format!(
                "'{}' for {} already reported on row {}",
                item.key, item.period, first_row
            );
            self.error(self.malformed(item.source.row, details));
            return;
        }
        self.seen.insert(slot, item.source.row);
        self.items.push(item);
    }

    pub fn error(&mut self, error: FinancialHealthError) {
        self.diagnostics.push(Diagnostic::from_error(&error));
    }

    pub fn warn(&mut self, kind: DiagnosticKind, row: Option<usize>, message: String) {
        self.diagnostics
            .push(Diagnostic::warning(kind, message).in_document(&self.document.name, row));
    }

    pub fn malformed(&self, row: usize, details: impl Into<String>) -> FinancialHealthError {
        FinancialHealthError::MalformedRow {
            document: self.document.name.clone(),
            row,
            details: details.into(),
        }
    }

    pub fn missing(&self, row: usize, field: &str) -> FinancialHealthError {
        FinancialHealthError::MissingRequiredField {
            document: self.document.name.clone(),
            row,
            field: field.to_string(),
        }
    }

    /// Row number used for document-level problems such as a missing column.
    pub fn header_row(&self) -> usize {
        self.document
            .header
            .as_ref()
            .or_else(|| self.document.rows.first())
            .map(|r| r.number)
            .unwrap_or(1)
    }

    /// Reads an amount cell: blank is `None`, unreadable text is a
    /// `MalformedRow`.
    pub fn amount(&self, row: &RawRow, column: usize, what: &str) -> Result<Option<f64>> {
        match parse_amount(row.cell(column)) {
            Amount::Blank => Ok(None),
            Amount::Value(v) => Ok(Some(v)),
            Amount::Invalid => Err(self.malformed(
                row.number,
                format!("cannot read {} '{}' as an amount", what, row.cell(column)),
            )),
        }
    }

    pub fn finish(self) -> Partial<Vec<LineItem>> {
        Partial::with_diagnostics(self.items, self.diagnostics)
    }
}

/// Header cells that name a period, skipping columns already assigned.
pub(crate) fn period_columns(header: &[String], taken: &[usize]) -> Vec<(usize, Period)> {
    header
        .iter()
        .enumerate()
        .filter(|(i, _)| !taken.contains(i))
        .filter_map(|(i, cell)| Period::parse(cell).ok().map(|p| (i, p)))
        .collect()
}

/// Index of the label column of a statement form: the first non-empty header
/// cell.
pub(crate) fn label_column(document: &RawDocument) -> usize {
    document
        .header_cells()
        .iter()
        .position(|c| !c.is_empty())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_document;

    #[test]
    fn test_dispatch_follows_detected_type() {
        let doc = load_document(
            "deals.csv",
            b"Deal ID,Counterparty,Period,Amount\nD-1,Acme,2023-01,500\n",
        )
        .unwrap();
        assert!(matches!(
            DocumentParser::for_type(doc.document_type),
            DocumentParser::DealRegister(_)
        ));
        let parsed = parse_document(&doc);
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].key, LineKey::deal("D-1"));
    }

    #[test]
    fn test_duplicate_key_is_rejected_at_emission() {
        let csv = "Balance Sheet\nLine item,2023\nAssets\nCash,100\nCash at bank,50\n";
        let doc = load_document("bs.csv", csv.as_bytes()).unwrap();
        let parsed = parse_document(&doc);
        let cash: Vec<_> = parsed
            .items
            .iter()
            .filter(|i| i.key == LineKey::account("cash"))
            .collect();
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].value, 100.0);
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::MalformedRow && d.row == Some(5)));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let csv = "Income Statement\nLine item,2023-01,2023-02\nRevenue,1000,1100\nExpenses,-600,650\nMystery,1,2\n";
        let doc = load_document("is.csv", csv.as_bytes()).unwrap();
        assert_eq!(parse_document(&doc), parse_document(&doc));
    }
}
