use crate::canonical::Statement;
use crate::period::Period;
use crate::schema::{AccountType, BalanceMismatch, LineItem, LineRole, Term};
use log::warn;

/// Asset, liability and equity totals of one balance sheet period. A side is
/// `None` when the period reports nothing for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideTotals {
    pub assets: Option<f64>,
    pub liabilities: Option<f64>,
    pub equity: Option<f64>,
}

/// Checks `assets ≈ liabilities + equity` per balance sheet period. Violations
/// are returned, never raised: source documents may be genuinely imbalanced.
pub struct BalanceChecker {
    tolerance: f64,
}

impl BalanceChecker {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn totals(&self, statement: &Statement, period: &Period) -> SideTotals {
        let items: Vec<&LineItem> = statement.items_for_period(period).collect();
        SideTotals {
            assets: aggregate(&items, AccountType::Asset),
            liabilities: aggregate(&items, AccountType::Liability),
            equity: aggregate(&items, AccountType::Equity),
        }
    }

    pub fn check(&self, statement: &Statement) -> Vec<BalanceMismatch> {
        let mut mismatches = Vec::new();

        for period in statement.periods() {
            let totals = self.totals(statement, &period);
            if totals.assets.is_none() && totals.liabilities.is_none() && totals.equity.is_none() {
                continue;
            }

            let assets = totals.assets.unwrap_or(0.0);
            let liabilities = totals.liabilities.unwrap_or(0.0);
            let equity = totals.equity.unwrap_or(0.0);
            let difference = assets - (liabilities + equity);

            if difference.abs() > self.tolerance {
                warn!(
                    "Balance sheet does not balance at {}: assets {} vs liabilities {} + equity {} (difference {})",
                    period, assets, liabilities, equity, difference
                );
                mismatches.push(BalanceMismatch {
                    period,
                    assets,
                    liabilities,
                    equity,
                    difference,
                });
            }
        }

        mismatches
    }
}

/// Total of one account type: a reported total line if there is one,
/// otherwise the per-term aggregates plus details that carry no term.
pub fn aggregate(items: &[&LineItem], account_type: AccountType) -> Option<f64> {
    let of_type: Vec<&LineItem> = items
        .iter()
        .copied()
        .filter(|i| i.account_type == Some(account_type) && i.role != LineRole::Control)
        .collect();
    if of_type.is_empty() {
        return None;
    }
    if let Some(total) = of_type.iter().find(|i| i.role == LineRole::Total) {
        return Some(total.value);
    }

    let current = aggregate_term(&of_type, account_type, Term::Current).unwrap_or(0.0);
    let noncurrent = aggregate_term(&of_type, account_type, Term::Noncurrent).unwrap_or(0.0);
    let untermed: f64 = of_type
        .iter()
        .filter(|i| i.term.is_none() && i.role == LineRole::Detail)
        .map(|i| i.value)
        .sum();
    Some(current + noncurrent + untermed)
}

/// Subtotal of one account type and term, e.g. current assets: the reported
/// subtotal if present, otherwise the sum of its detail lines.
pub fn aggregate_term(items: &[&LineItem], account_type: AccountType, term: Term) -> Option<f64> {
    let lines: Vec<&LineItem> = items
        .iter()
        .copied()
        .filter(|i| i.account_type == Some(account_type) && i.term == Some(term))
        .collect();
    if let Some(subtotal) = lines.iter().find(|i| i.role == LineRole::Subtotal) {
        return Some(subtotal.value);
    }
    let details: Vec<f64> = lines
        .iter()
        .filter(|i| i.role == LineRole::Detail)
        .map(|i| i.value)
        .collect();
    if details.is_empty() {
        None
    } else {
        Some(details.iter().sum())
    }
}
