use super::{label_column, period_columns, ItemCollector, LineItemParser};
use crate::chart_of_accounts::{AccountEntry, ChartOfAccounts, Section, SectionHeading};
use crate::detector::columns;
use crate::loader::RawDocument;
use crate::schema::{AccountType, DiagnosticKind, LineItem, LineKey, LineRole, Partial, Term};
use crate::utils::{normalize_label, slugify};

/// Russian forms print "БАЛАНС" as the closing line of both sides.
const FORM_TOTAL: &str = "баланс";

type Classified = (String, AccountType, Option<Term>, LineRole);

#[derive(Debug, Clone, Default)]
pub struct BalanceSheetParser {
    chart: ChartOfAccounts,
}

impl BalanceSheetParser {
    pub fn with_chart(chart: ChartOfAccounts) -> Self {
        Self { chart }
    }

    /// Resolves a row label under the current heading to
    /// `(code, account type, term, role)`.
    ///
    /// Lines missing from the chart take the heading's section and term and
    /// are keyed by their form line code when the document has one, so two
    /// "Заемные средства" lines in sections IV and V stay apart.
    fn classify(
        &self,
        label: &str,
        line_code: Option<&str>,
        heading: Option<SectionHeading>,
    ) -> Option<Classified> {
        if normalize_label(label) == FORM_TOTAL {
            return match heading?.section {
                Section::Assets => self.known("total_assets"),
                Section::Liabilities | Section::Equity => self.known("total_liabilities_and_equity"),
            };
        }

        if let Some(entry) = self.lookup(label) {
            return Some((entry.code.clone(), entry.account_type, entry.term, entry.role));
        }

        let heading = heading?;
        let suffix = match line_code.map(slugify) {
            Some(code) if !code.is_empty() => code,
            _ => slugify(label),
        };
        Some((
            format!("{}:{}", heading.section.code_prefix(), suffix),
            heading.section.account_type(),
            heading.term,
            LineRole::Detail,
        ))
    }

    fn lookup(&self, label: &str) -> Option<&AccountEntry> {
        self.chart
            .lookup_where(label, |e| e.account_type.is_balance_sheet())
    }

    fn known(&self, code: &str) -> Option<Classified> {
        self.chart
            .by_code(code)
            .map(|e| (e.code.clone(), e.account_type, e.term, e.role))
    }
}

impl LineItemParser for BalanceSheetParser {
    fn parse(&self, document: &RawDocument) -> Partial<Vec<LineItem>> {
        let mut out = ItemCollector::new(document);
        let label_col = label_column(document);
        let periods = period_columns(document.header_cells(), &[label_col]);
        if periods.is_empty() {
            out.error(out.missing(out.header_row(), "period columns"));
            return out.finish();
        }

        let mut taken: Vec<usize> = periods.iter().map(|(col, _)| *col).collect();
        taken.push(label_col);
        let code_col = document.find_column(columns::LINE_CODE, &taken);

        let mut heading: Option<SectionHeading> = None;
        for row in &document.rows {
            let label = row.cell(label_col);
            if label.is_empty() {
                continue;
            }
            let blank = periods.iter().all(|(col, _)| row.cell(*col).is_empty());
            if let Some(marker) = ChartOfAccounts::section_heading(label) {
                heading = Some(marker);
                // A heading that also carries figures is read as its subtotal.
                if blank || self.lookup(label).is_none() {
                    continue;
                }
            }
            if blank {
                continue;
            }

            let line_code = code_col.map(|col| row.cell(col));
            let Some((code, account_type, term, role)) = self.classify(label, line_code, heading) else {
                out.warn(
                    DiagnosticKind::UnrecognizedLabel,
                    Some(row.number),
                    format!("skipped balance sheet line '{}' outside any section", label),
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
                let mut item = out.item(row, LineKey::account(&code), label, *period, value);
                item.account_type = Some(account_type);
                item.term = term;
                item.role = role;
                out.push(item);
            }
        }

        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_document;

    fn parse(csv: &str) -> Partial<Vec<LineItem>> {
        let doc = load_document("bs.csv", csv.as_bytes()).unwrap();
        BalanceSheetParser::default().parse(&doc)
    }

    #[test]
    fn test_sections_and_unknown_details() {
        let parsed = parse(
            "Balance Sheet\nLine item,2023-12\nASSETS\nCash,100\nLoans to directors,40\nTotal assets,140\nLIABILITIES\nAccounts payable,60\nDeferred grants,30\nEQUITY\nShare capital,50\n",
        );
        assert!(parsed.diagnostics.is_empty());
        let items = parsed.value;
        assert_eq!(items.len(), 6);

        let loans = items
            .iter()
            .find(|i| i.account_code() == "asset:loans_to_directors")
            .unwrap();
        assert_eq!(loans.account_type, Some(AccountType::Asset));
        assert_eq!(loans.role, LineRole::Detail);

        let grants = items
            .iter()
            .find(|i| i.account_code() == "liability:deferred_grants")
            .unwrap();
        assert_eq!(grants.account_type, Some(AccountType::Liability));

        let cash = items.iter().find(|i| i.account_code() == "cash").unwrap();
        assert_eq!(cash.term, Some(Term::Current));
        let total = items.iter().find(|i| i.account_code() == "total_assets").unwrap();
        assert_eq!(total.role, LineRole::Total);
    }

    #[test]
    fn test_unknown_label_before_sections_is_skipped() {
        let parsed = parse("Balance Sheet\nLine item,2023\nMystery line,5\nAssets\nCash,10\n");
        assert_eq!(parsed.value.len(), 1);
        assert_eq!(parsed.diagnostics[0].kind, DiagnosticKind::UnrecognizedLabel);
    }

    #[test]
    fn test_russian_form_total_lines() {
        let parsed = parse(
            "Бухгалтерский баланс\nПоказатель;Код;31.12.2023\nАктив\nДенежные средства;1250;300\nБАЛАНС;1600;300\nПассив\nКредиторская задолженность;1520;100\nКапитал и резервы\nУставный капитал;1310;200\nБАЛАНС;1700;300\n",
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let codes: Vec<&str> = parsed.value.iter().map(|i| i.account_code()).collect();
        assert_eq!(
            codes,
            vec![
                "cash",
                "total_assets",
                "payables",
                "share_capital",
                "total_liabilities_and_equity"
            ]
        );
    }

    #[test]
    fn test_full_russian_form_with_five_sections() {
        let parsed = parse(FORM_1);
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let items = parsed.value;

        let find = |code: &str| items.iter().find(|i| i.account_code() == code).unwrap();
        let long_loans = find("liability:1410");
        assert_eq!(long_loans.account_type, Some(AccountType::Liability));
        assert_eq!(long_loans.term, Some(Term::Noncurrent));
        assert_eq!(long_loans.value, 150.0);

        let short_loans = find("liability:1510");
        assert_eq!(short_loans.term, Some(Term::Current));
        assert_eq!(short_loans.value, 100.0);

        assert_eq!(find("liability:1450").term, Some(Term::Noncurrent));
        assert_eq!(find("noncurrent_liabilities").value, 200.0);
        assert_eq!(find("current_liabilities").value, 400.0);
        assert_eq!(find("total_equity").value, 400.0);
        assert_eq!(find("total_assets").value, 1000.0);
        assert_eq!(find("total_liabilities_and_equity").value, 1000.0);
        assert!(items.iter().all(|i| !i.account_code().starts_with("equity:")));
    }

    #[test]
    fn test_heading_with_figures_is_read_as_subtotal() {
        let parsed = parse(
            "Balance Sheet\nLine item,2023\nCurrent assets,400\nCash,100\nInventory,300\nCurrent liabilities\nAccrued payroll,50\n",
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let items = parsed.value;
        assert_eq!(items[0].account_code(), "current_assets");
        assert_eq!(items[0].role, LineRole::Subtotal);

        let payroll = items
            .iter()
            .find(|i| i.account_code() == "liability:accrued_payroll")
            .unwrap();
        assert_eq!(payroll.term, Some(Term::Current));
    }

    const FORM_1: &str = "Бухгалтерский баланс
Показатель;Код;31.12.2023
I. ВНЕОБОРОТНЫЕ АКТИВЫ
Основные средства;1150;600
Итого по разделу I;1100;600
II. ОБОРОТНЫЕ АКТИВЫ
Запасы;1210;150
Дебиторская задолженность;1230;150
Денежные средства;1250;100
Итого по разделу II;1200;400
БАЛАНС;1600;1000
III. КАПИТАЛ И РЕЗЕРВЫ
Уставный капитал;1310;100
Нераспределенная прибыль;1370;300
Итого по разделу III;1300;400
IV. ДОЛГОСРОЧНЫЕ ОБЯЗАТЕЛЬСТВА
Заемные средства;1410;150
Прочие обязательства;1450;50
Итого по разделу IV;1400;200
V. КРАТКОСРОЧНЫЕ ОБЯЗАТЕЛЬСТВА
Заемные средства;1510;100
Кредиторская задолженность;1520;300
Итого по разделу V;1500;400
БАЛАНС;1700;1000
";
}
