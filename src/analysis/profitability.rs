use crate::balancer::aggregate;
use crate::canonical::Statement;
use crate::period::Period;
use crate::schema::{
    AccountType, AnalysisDimension, AnalysisFlag, AnalysisResult, LineItem, LineRole,
    MetricValue,
};

/// Margins and returns per income statement period.
///
/// Reported profit lines win over computed ones. When a profit line is
/// missing it is rebuilt from the signed revenue and expense lines, which
/// parsing already normalized (expenses negative).
pub fn analyze(income_statement: &Statement, balance_sheet: Option<&Statement>) -> AnalysisResult {
    let mut result = AnalysisResult::new(AnalysisDimension::Profitability);

    for period in income_statement.periods() {
        let items: Vec<&LineItem> = income_statement.items_for_period(&period).collect();
        let line = |code: &str| income_statement.value(code, &period);
        let sum_of = |types: &[AccountType]| -> Option<f64> {
            let values: Vec<f64> = items
                .iter()
                .filter(|i| i.role == LineRole::Detail)
                .filter(|i| i.account_type.is_some_and(|t| types.contains(&t)))
                .map(|i| i.value)
                .collect();
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum())
            }
        };

        let revenue = sum_of(&[AccountType::Revenue]);
        let cost_of_sales = sum_of(&[AccountType::CostOfSales]);
        let gross_profit = line("gross_profit")
            .or_else(|| revenue.zip(cost_of_sales).map(|(r, c)| r + c));
        let operating_profit = line("operating_profit").or_else(|| {
            revenue.map(|r| {
                r + cost_of_sales.unwrap_or(0.0)
                    + sum_of(&[AccountType::OperatingExpense]).unwrap_or(0.0)
            })
        });
        let net_profit = line("net_profit").or_else(|| {
            sum_of(&[
                AccountType::Revenue,
                AccountType::CostOfSales,
                AccountType::OperatingExpense,
                AccountType::OtherIncome,
                AccountType::OtherExpense,
                AccountType::IncomeTax,
            ])
        });

        result.set(period, "revenue", MetricValue::from_option(revenue));
        result.set(period, "gross_profit", MetricValue::from_option(gross_profit));
        result.set(period, "operating_profit", MetricValue::from_option(operating_profit));
        result.set(period, "net_profit", MetricValue::from_option(net_profit));
        result.set(period, "gross_margin", MetricValue::ratio(gross_profit, revenue));
        result.set(period, "operating_margin", MetricValue::ratio(operating_profit, revenue));
        result.set(period, "net_margin", MetricValue::ratio(net_profit, revenue));

        let (equity, assets) = balance_sheet
            .and_then(|bs| matching_period(bs, &period).map(|p| (bs, p)))
            .map(|(bs, p)| {
                let bs_items: Vec<&LineItem> = bs.items_for_period(&p).collect();
                (
                    aggregate(&bs_items, AccountType::Equity),
                    aggregate(&bs_items, AccountType::Asset),
                )
            })
            .unwrap_or((None, None));
        result.set(period, "roe", MetricValue::ratio(net_profit, equity));
        result.set(period, "roa", MetricValue::ratio(net_profit, assets));

        if net_profit.is_some_and(|p| p < 0.0) {
            result.flags.push(AnalysisFlag::new("loss_making").at(period));
        }
    }

    result
}

/// The balance sheet period closing on the same day as `period`, so that a
/// yearly result lines up with a December balance.
fn matching_period(balance_sheet: &Statement, period: &Period) -> Option<Period> {
    balance_sheet
        .periods()
        .into_iter()
        .filter(|p| p.end_date() == period.end_date())
        .max_by_key(|p| p.days())
}
