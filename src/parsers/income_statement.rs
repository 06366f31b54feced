use super::{label_column, period_columns, ItemCollector, LineItemParser};
use crate::chart_of_accounts::ChartOfAccounts;
use crate::loader::RawDocument;
use crate::schema::{DiagnosticKind, LineItem, LineKey, Partial};

/// Label column plus one column per period. Labels resolve through the chart
/// of accounts; revenue and other income come out positive, every expense
/// class negative and profit lines as printed.
#[derive(Debug, Clone, Default)]
pub struct IncomeStatementParser {
    chart: ChartOfAccounts,
}

impl IncomeStatementParser {
    pub fn with_chart(chart: ChartOfAccounts) -> Self {
        Self { chart }
    }
}

impl LineItemParser for IncomeStatementParser {
    fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>> {
        let mut out = ItemCollector::new(document);
        let label_col = label_column(document);
        let periods = period_columns(document.header_cells(), &[label_col]);
        if periods.is_empty() {
            out.error(out.missing(out.header_row(), "period columns"));
            return out.finish();
        }

        for row in &document.rows {
            let label = row.cell(label_col);
            if label.is_empty() || periods.iter().all(|(col, _)| row.cell(*col).is_empty()) {
                continue;
            }

            let Some(entry) = self
                .chart
                .lookup_where(label, |e| !e.account_type.is_balance_sheet())
            else {
                out.warn(
                    DiagnosticKind::UnrecognizedLabel,
                    Some(row.number),
                    format!("skipped unrecognized income statement line '{}'", label),
                );
                continue;
            };

            for (col, period) in &periods {
                let value = match out.amount(row, *col, label) {
                    Ok(Some(v)) => v,
                    Ok(None) => continue,
                    Err(e) => {
                        out.error(e);
                        continue;
                    }
                };
                let value = match entry.account_type.normal_sign() {
                    Some(sign) => sign * value.abs(),
                    None => value,
                };

                let mut item = out.item(row, LineKey::account(&entry.code), label, *period, value);
                item.account_type = Some(entry.account_type);
                item.role = entry.role;
                out.push(item);
            }
        }

        out.finish()
    }
}
