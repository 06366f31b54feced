use super::{ItemCollector, LineItemParser};
use crate::detector::columns;
use crate::loader::RawDocument;
use crate::period::Period;
use crate::schema::{LineItem, LineKey, Partial};

/// Planned deals per counterparty: `Deal ID, Counterparty, Period, Amount`
/// with an optional description. Items are keyed by `(deal_id, period)` and
/// carry the absolute planned amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct DealRegisterParser;

struct Columns {
    deal: usize,
    counterparty: usize,
    period: usize,
    amount: usize,
    description: Option<usize>,
}

impl DealRegisterParser {
    fn columns(document: &RawDocument) -> Result<Columns, &'static str> {
        let deal = document.find_column(columns::DEAL, &[]).ok_or("deal id")?;
        let counterparty = document
            .find_column(columns::COUNTERPARTY, &[deal])
            .ok_or("counterparty")?;
        let period = document
            .find_column(columns::PERIOD, &[deal, counterparty])
            .ok_or("period")?;
        let amount = document
            .find_column(columns::AMOUNT, &[deal, counterparty, period])
            .ok_or("amount")?;
        let description =
            document.find_column(columns::DESCRIPTION, &[deal, counterparty, period, amount]);

        Ok(Columns {
            deal,
            counterparty,
            period,
            amount,
            description,
        })
    }
}

impl LineItemParser for DealRegisterParser {
    fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>> {
        let mut out = ItemCollector::new(document);
        let cols = match Self::columns(document) {
            Ok(cols) => cols,
            Err(field) => {
                out.error(out.missing(out.header_row(), field));
                return out.finish();
            }
        };

        for row in &document.rows {
            let deal_id = row.cell(cols.deal);
            let counterparty = row.cell(cols.counterparty);
            let period_text = row.cell(cols.period);

            let required = [
                (deal_id, "deal id"),
                (counterparty, "counterparty"),
                (period_text, "period"),
            ];
            if let Some((_, field)) = required.iter().find(|(value, _)| value.is_empty()) {
                out.error(out.missing(row.number, field));
                continue;
            }

            let period = match Period::parse(period_text) {
                Ok(p) => p,
                Err(_) => {
                    let details = format!("cannot read period '{}'", period_text);
                    out.error(out.malformed(row.number, details));
                    continue;
                }
            };
            let amount = match out.amount(row, cols.amount, "planned amount") {
                Ok(Some(v)) => v.abs(),
                Ok(None) => {
                    out.error(out.missing(row.number, "amount"));
                    continue;
                }
                Err(e) => {
                    out.error(e);
                    continue;
                }
            };

            let label = cols
                .description
                .map(|c| row.cell(c))
                .filter(|c| !c.is_empty())
                .unwrap_or(deal_id);

            let mut item = out.item(row, LineKey::deal(deal_id), label, period, amount);
            item.counterparty = Some(counterparty.to_string());
            out.push(item);
        }

        out.finish()
    }
}
