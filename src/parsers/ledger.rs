use super::{period_columns, ItemCollector, LineItemParser};
use crate::detector::columns;
use crate::loader::RawDocument;
use crate::schema::{LineItem, LineKey, Partial};

/// Account rows with one column per period: `Account, Counterparty,
/// Description, 2023-01, 2023-02, ...`. Every non-blank period cell becomes a
/// line item keyed by account (and counterparty when the column exists); blank
/// cells produce nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerParser;

impl LineItemParser for LedgerParser {
    fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>> {
        let mut out = ItemCollector::new(document);

        let Some(account_col) = document.find_column(columns::ACCOUNT, &[]) else {
            out.error(out.missing(out.header_row(), "account"));
            return out.finish();
        };
        let counterparty_col = document.find_column(columns::COUNTERPARTY, &[account_col]);
        let mut taken = vec![account_col];
        taken.extend(counterparty_col);
        let description_col = document.find_column(columns::DESCRIPTION, &taken);
        taken.extend(description_col);

        let periods = period_columns(document.header_cells(), &taken);
        if periods.is_empty() {
            out.error(out.missing(out.header_row(), "period columns"));
            return out.finish();
        }

        for row in &document.rows {
            let has_values = periods.iter().any(|(col, _)| !row.cell(*col).is_empty());
            let account = row.cell(account_col);
            if account.is_empty() {
                if has_values {
                    out.error(out.missing(row.number, "account"));
                }
                continue;
            }

            let counterparty = counterparty_col
                .map(|c| row.cell(c))
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            let label = description_col
                .map(|c| row.cell(c))
                .filter(|c| !c.is_empty())
                .unwrap_or(account);

            for (col, period) in &periods {
                let value = match out.amount(row, *col, "ledger amount") {
                    Ok(Some(v)) => v,
                    Ok(None) => continue,
                    Err(e) => {
                        out.error(e);
                        continue;
                    }
                };
                let key = LineKey::account_with_counterparty(account, counterparty.clone());
                let mut item = out.item(row, key, label, *period, value);
                item.counterparty = counterparty.clone();
                out.push(item);
            }
        }

        out.finish()
    }
}
