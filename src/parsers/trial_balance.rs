use super::{ItemCollector, LineItemParser};
use crate::detector::columns;
use crate::loader::{RawDocument, RawRow};
use crate::period::Period;
use crate::schema::{LineItem, LineKey, Partial};
use crate::utils::{contains_phrase, normalize_label};

/// Labels of closing rows that carry column totals rather than an account.
const TOTAL_ROWS: &[&str] = &["total", "totals", "итого", "всего"];

/// `Account, Name, Debit, Credit` with an optional period column. Without one,
/// the period comes from a preamble line such as `Period: 2023-03` or
/// `as of 31.03.2023`. The signed value is debit minus credit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrialBalanceParser;

impl LineItemParser for TrialBalanceParser {
    fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>> {
        let mut out = ItemCollector::new(document);

        let Some(debit_col) = document.find_column(columns::DEBIT, &[]) else {
            out.error(out.missing(out.header_row(), "debit"));
            return out.finish();
        };
        let Some(credit_col) = document.find_column(columns::CREDIT, &[debit_col]) else {
            out.error(out.missing(out.header_row(), "credit"));
            return out.finish();
        };
        let mut taken = vec![debit_col, credit_col];
        let Some(account_col) = document.find_column(columns::ACCOUNT, &taken) else {
            out.error(out.missing(out.header_row(), "account"));
            return out.finish();
        };
        taken.push(account_col);
        let name_col = document.find_column(columns::NAME, &taken);
        taken.extend(name_col);
        let counterparty_col = document.find_column(columns::COUNTERPARTY, &taken);
        taken.extend(counterparty_col);
        let period_col = document.find_column(columns::PERIOD, &taken);

        let document_period = preamble_period(&document.preamble);
        if period_col.is_none() && document_period.is_none() {
            out.error(out.missing(out.header_row(), "period"));
            return out.finish();
        }

        for row in &document.rows {
            let account = row.cell(account_col);
            let row_label = row.label.as_deref().unwrap_or("");
            if is_total_row(account) || (account.is_empty() && is_total_row(row_label)) {
                continue;
            }
            if account.is_empty() {
                out.error(out.missing(row.number, "account"));
                continue;
            }

            let period = match (period_col, document_period) {
                (Some(col), fallback) => match Period::parse(row.cell(col)) {
                    Ok(p) => p,
                    Err(_) if row.cell(col).is_empty() => match fallback {
                        Some(p) => p,
                        None => {
                            out.error(out.missing(row.number, "period"));
                            continue;
                        }
                    },
                    Err(_) => {
                        let details = format!("cannot read period '{}'", row.cell(col));
                        out.error(out.malformed(row.number, details));
                        continue;
                    }
                },
                (None, Some(p)) => p,
                (None, None) => continue,
            };

            let debit = out.amount(row, debit_col, "debit");
            let credit = out.amount(row, credit_col, "credit");
            let (debit, credit) = match (debit, credit) {
                (Ok(d), Ok(c)) => (d, c),
                (Err(e), _) | (_, Err(e)) => {
                    out.error(e);
                    continue;
                }
            };

            let value = match (debit, credit) {
                (None, None) => {
                    out.error(out.missing(row.number, "debit/credit"));
                    continue;
                }
                (Some(d), Some(c)) if d != 0.0 && c != 0.0 => {
                    let details = format!("both debit ({}) and credit ({}) are populated", d, c);
                    out.error(out.malformed(row.number, details));
                    continue;
                }
                (d, c) => d.unwrap_or(0.0) - c.unwrap_or(0.0),
            };

            let counterparty = counterparty_col
                .map(|c| row.cell(c))
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            let label = name_col
                .map(|c| row.cell(c))
                .filter(|c| !c.is_empty())
                .unwrap_or(account);

            let key = LineKey::account_with_counterparty(account, counterparty.clone());
            let mut item = out.item(row, key, label, period, value);
            item.counterparty = counterparty;
            out.push(item);
        }

        out.finish()
    }
}

fn is_total_row(label: &str) -> bool {
    let normalized = normalize_label(label);
    TOTAL_ROWS.iter().any(|t| normalized == *t)
}

/// Reads the reporting period from lines such as `Period: Q1 2023`,
/// `as of 31.03.2023` or `Период: 03.2023`.
pub(crate) fn preamble_period(preamble: &[RawRow]) -> Option<Period> {
    for row in preamble {
        for cell in row.non_empty() {
            if let Ok(period) = Period::parse(cell) {
                return Some(period);
            }
            if let Some((_, rest)) = cell.split_once(':') {
                if let Ok(period) = Period::parse(rest) {
                    return Some(period);
                }
            }
            if ["as of", "period", "период"]
                .iter()
                .any(|p| contains_phrase(cell, p))
            {
                let tokens: Vec<&str> = cell
                    .split_whitespace()
                    .map(|t| t.trim_matches(|c: char| matches!(c, ',' | ':' | ';' | '(' | ')')))
                    .collect();
                let last_two = tokens.len().checked_sub(2).map(|i| tokens[i..].join(" "));
                if let Some(period) = last_two.and_then(|t| Period::parse(&t).ok()) {
                    return Some(period);
                }
                if let Some(period) = tokens.iter().rev().find_map(|t| Period::parse(t).ok()) {
                    return Some(period);
                }
            }
        }
    }
    None
}
