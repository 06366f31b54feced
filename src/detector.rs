//! Format detection.
//!
//! Each of the five layouts is recognised by *title* signals (a single-cell row
//! naming the form) and *structural* signals (a header signature or label rows).
//! A title beats a structural signal. When several formats show signals of the
//! same strength, the fixed priority of [`PRIORITY`] decides, so the same bytes
//! always produce the same tag.

use crate::chart_of_accounts::{ChartOfAccounts, Section};
use crate::error::{FinancialHealthError, Result};
use crate::loader::{find_column, RawRow, RawTable};
use crate::period::Period;
use crate::schema::{AccountType, DocumentType, LineRole};
use crate::utils::contains_phrase;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Number of leading rows inspected for titles and headers.
pub const SCAN_ROWS: usize = 12;

/// Most specific header signatures first.
pub const PRIORITY: [DocumentType; 5] = [
    DocumentType::DealRegister,
    DocumentType::TrialBalance,
    DocumentType::CashflowLedger,
    DocumentType::BalanceSheet,
    DocumentType::IncomeStatement,
];

/// Header keywords shared by the detector and the parsers.
pub mod columns {
    pub const ACCOUNT: &[&str] = &["account", "account code", "account no", "acct", "счет", "субсчет"];
    pub const NAME: &[&str] = &["name", "account name", "наименование", "наименование счета"];
    pub const DEBIT: &[&str] = &["debit", "dr", "дебет", "дт"];
    pub const CREDIT: &[&str] = &["credit", "cr", "кредит", "кт"];
    pub const COUNTERPARTY: &[&str] = &[
        "counterparty", "customer", "supplier", "vendor", "client", "контрагент", "покупатель",
        "поставщик",
    ];
    pub const DEAL: &[&str] = &["deal", "deal id", "deal no", "contract", "договор", "сделка"];
    pub const PERIOD: &[&str] = &["period", "date", "due date", "month", "период", "дата"];
    pub const AMOUNT: &[&str] = &["amount", "planned amount", "planned", "value", "sum", "сумма"];
    pub const DESCRIPTION: &[&str] = &["description", "memo", "purpose", "назначение", "описание"];
    /// Line code column of statutory forms ("Код" in Russian Form 1).
    pub const LINE_CODE: &[&str] = &["code", "line code", "код", "код строки"];
    pub const LABEL: &[&str] = &[
        "line item", "item", "indicator", "показатель", "наименование показателя", "наименование",
    ];
    /// First cells of preamble rows that must never be taken for a header.
    pub const PREAMBLE: &[&str] = &["period", "as of", "units", "currency", "период", "единица измерения"];
}

const TITLES: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::DealRegister,
        &["deal register", "commercial proposal", "коммерческое предложение", "реестр сделок"],
    ),
    (
        DocumentType::TrialBalance,
        &["trial balance", "оборотно сальдовая ведомость", "осв"],
    ),
    (
        DocumentType::CashflowLedger,
        &["cash flow ledger", "cashflow ledger", "ledger", "account card", "карточка счета"],
    ),
    (
        DocumentType::BalanceSheet,
        &["balance sheet", "statement of financial position", "бухгалтерский баланс"],
    ),
    (
        DocumentType::IncomeStatement,
        &[
            "income statement",
            "profit and loss",
            "statement of profit or loss",
            "отчет о финансовых результатах",
            "отчет о прибылях и убытках",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalStrength {
    Structural,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub document_type: DocumentType,
    /// Index into the table's rows of the header row, when one was found.
    pub header_index: Option<usize>,
    pub strength: SignalStrength,
}

pub fn detect(table: &RawTable) -> Result<Detection> {
    let scan = &table.rows[..table.rows.len().min(SCAN_ROWS)];

    let mut signals: Vec<(DocumentType, SignalStrength)> = Vec::new();
    for document_type in PRIORITY {
        if has_title(scan, document_type) {
            signals.push((document_type, SignalStrength::Title));
        } else if has_structure(table, scan, document_type) {
            signals.push((document_type, SignalStrength::Structural));
        }
    }

    let best = signals.iter().map(|(_, s)| *s).max().ok_or_else(|| {
        warn!("No format signal found in '{}'", table.name);
        FinancialHealthError::UnrecognizedFormat {
            document: table.name.clone(),
        }
    })?;

    // `signals` is already in priority order.
    let candidates: Vec<DocumentType> = signals
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(t, _)| *t)
        .collect();
    let document_type = candidates[0];
    if candidates.len() > 1 {
        debug!(
            "'{}' matches {:?} at {:?} strength; using {} by priority",
            table.name, candidates, best, document_type
        );
    }

    Ok(Detection {
        document_type,
        header_index: header_index(scan, document_type),
        strength: best,
    })
}

fn has_title(scan: &[RawRow], document_type: DocumentType) -> bool {
    let phrases = TITLES
        .iter()
        .find(|(t, _)| *t == document_type)
        .map(|(_, p)| *p)
        .unwrap_or(&[]);

    scan.iter()
        .filter(|row| row.non_empty_count() == 1)
        .filter_map(|row| row.label.as_deref())
        .any(|title| phrases.iter().any(|p| contains_phrase(title, p)))
}

fn has_structure(table: &RawTable, scan: &[RawRow], document_type: DocumentType) -> bool {
    match document_type {
        DocumentType::DealRegister => scan.iter().any(is_deal_header),
        DocumentType::TrialBalance => scan.iter().any(is_trial_balance_header),
        DocumentType::CashflowLedger => scan.iter().any(is_ledger_header),
        DocumentType::BalanceSheet => has_balance_sheet_labels(&table.rows),
        DocumentType::IncomeStatement => has_income_statement_labels(&table.rows),
    }
}

fn header_index(scan: &[RawRow], document_type: DocumentType) -> Option<usize> {
    let matcher: fn(&RawRow) -> bool = match document_type {
        DocumentType::DealRegister => is_deal_header,
        DocumentType::TrialBalance => is_trial_balance_header,
        DocumentType::CashflowLedger => is_ledger_header,
        DocumentType::BalanceSheet | DocumentType::IncomeStatement => is_period_header,
    };
    scan.iter().position(matcher)
}

fn is_deal_header(row: &RawRow) -> bool {
    let deal = find_column(&row.cells, columns::DEAL, &[]);
    let counterparty = deal.and_then(|d| find_column(&row.cells, columns::COUNTERPARTY, &[d]));
    deal.is_some() && counterparty.is_some()
}

fn is_trial_balance_header(row: &RawRow) -> bool {
    let debit = find_column(&row.cells, columns::DEBIT, &[]);
    let credit = debit.and_then(|d| find_column(&row.cells, columns::CREDIT, &[d]));
    debit.is_some() && credit.is_some()
}

fn is_ledger_header(row: &RawRow) -> bool {
    match find_column(&row.cells, columns::ACCOUNT, &[]) {
        Some(account) => row
            .cells
            .iter()
            .enumerate()
            .any(|(i, c)| i != account && Period::parse(c).is_ok()),
        None => false,
    }
}

/// A label cell followed by at least one period cell, e.g. `Line item,2023,2022`.
pub fn is_period_header(row: &RawRow) -> bool {
    let Some(first) = row.cells.iter().position(|c| !c.is_empty()) else {
        return false;
    };
    let first_cell = &row.cells[first];
    if Period::parse(first_cell).is_ok() {
        return false;
    }
    if columns::PREAMBLE.iter().any(|p| contains_phrase(first_cell, p)) {
        return false;
    }
    row.cells[first + 1..]
        .iter()
        .any(|c| Period::parse(c).is_ok())
}

fn has_balance_sheet_labels(rows: &[RawRow]) -> bool {
    let chart = ChartOfAccounts::standard();
    let mut assets = false;
    let mut liabilities = false;

    for label in rows.iter().filter_map(|r| r.label.as_deref()) {
        match ChartOfAccounts::section_marker(label) {
            Some(Section::Assets) => assets = true,
            Some(Section::Liabilities) => liabilities = true,
            _ => {}
        }
        if let Some(entry) = chart.lookup_where(label, |e| {
            e.account_type.is_balance_sheet() && e.role != LineRole::Detail
        }) {
            match entry.account_type {
                AccountType::Asset => assets = true,
                AccountType::Liability => liabilities = true,
                _ => {}
            }
        }
    }
    assets && liabilities
}

fn has_income_statement_labels(rows: &[RawRow]) -> bool {
    let chart = ChartOfAccounts::standard();
    let mut revenue = false;
    let mut result_line = false;

    for label in rows.iter().filter_map(|r| r.label.as_deref()) {
        if let Some(entry) = chart.lookup_where(label, |e| !e.account_type.is_balance_sheet()) {
            match entry.account_type {
                AccountType::Revenue => revenue = true,
                AccountType::Profit | AccountType::CostOfSales | AccountType::OperatingExpense => {
                    result_line = true
                }
                _ => {}
            }
        }
    }
    revenue && result_line
}
