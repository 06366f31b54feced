use crate::balancer::{aggregate, aggregate_term};
use crate::canonical::Statement;
use crate::config::AnalysisConfig;
use crate::schema::{
    AccountType, AnalysisDimension, AnalysisFlag, AnalysisResult, LineItem, MetricValue, Term,
};

/// Liquidity and solvency per balance sheet period.
///
/// Aggregates prefer reported subtotals and totals and fall back to summing
/// detail lines. Ratios with a zero denominator are `Undefined`.
pub fn analyze(
    balance_sheet: &Statement,
    trial_balance: Option<&Statement>,
    config: &AnalysisConfig,
) -> AnalysisResult {
    let mut result = AnalysisResult::new(AnalysisDimension::Balance);
    let mut previous_current_ratio: Option<f64> = None;

    for period in balance_sheet.periods() {
        let items: Vec<&LineItem> = balance_sheet.items_for_period(&period).collect();
        let line = |code: &str| balance_sheet.value(code, &period);

        let current_assets = aggregate_term(&items, AccountType::Asset, Term::Current);
        let current_liabilities = aggregate_term(&items, AccountType::Liability, Term::Current);
        let noncurrent_assets = aggregate_term(&items, AccountType::Asset, Term::Noncurrent);
        let total_assets = aggregate(&items, AccountType::Asset);
        let total_liabilities = aggregate(&items, AccountType::Liability);
        let equity = aggregate(&items, AccountType::Equity);

        let inventory = line("inventory").unwrap_or(0.0);
        let liquid = match (line("cash"), line("short_term_investments")) {
            (None, None) => None,
            (cash, investments) => Some(cash.unwrap_or(0.0) + investments.unwrap_or(0.0)),
        };

        let current_ratio = MetricValue::ratio(current_assets, current_liabilities);
        result.set(period, "current_ratio", current_ratio);
        result.set(
            period,
            "quick_ratio",
            MetricValue::ratio(current_assets.map(|ca| ca - inventory), current_liabilities),
        );
        result.set(
            period,
            "absolute_liquidity",
            MetricValue::ratio(liquid, current_liabilities),
        );
        result.set(
            period,
            "debt_to_equity",
            MetricValue::ratio(total_liabilities, equity),
        );
        result.set(period, "equity_ratio", MetricValue::ratio(equity, total_assets));
        result.set(
            period,
            "maneuverability",
            MetricValue::ratio(
                equity.zip(noncurrent_assets).map(|(e, n)| e - n),
                equity,
            ),
        );
        result.set(
            period,
            "working_capital",
            MetricValue::from_option(current_assets.zip(current_liabilities).map(|(a, l)| a - l)),
        );
        result.set(period, "total_assets", MetricValue::from_option(total_assets));

        if let Some(ratio) = current_ratio.value() {
            if previous_current_ratio.is_some_and(|previous| ratio < previous) {
                result.flags.push(AnalysisFlag::new("liquidity_declining").at(period));
            }
            previous_current_ratio = Some(ratio);
        }
    }

    for mismatch in balance_sheet.balance_mismatches() {
        result
            .flags
            .push(AnalysisFlag::new("balance_mismatch").at(mismatch.period));
    }

    if let Some(trial_balance) = trial_balance {
        for period in trial_balance.periods() {
            let net: f64 = trial_balance.items_for_period(&period).map(|i| i.value).sum();
            if net.abs() > config.balance_tolerance {
                result.flags.push(
                    AnalysisFlag::new("trial_balance_unbalanced")
                        .at(period)
                        .about(format!("debits exceed credits by {}", net)),
                );
            }
        }
    }

    result
}
