use crate::canonical::Statement;
use crate::config::DealConfig;
use crate::period::Period;
use crate::schema::{AnalysisDimension, AnalysisFlag, AnalysisResult, LineItem, MetricValue};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone, Copy)]
struct PeriodTotals {
    planned: f64,
    realized: f64,
}

/// Movements of the realization accounts in one ledger period.
#[derive(Debug, Default, Clone, Copy)]
struct CashMovement {
    inflow: f64,
    net: f64,
}

fn counterparty_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Compares planned deal amounts with what the ledger's cash accounts show for
/// the same counterparty and period, then replays the planned payments
/// against the running cash position.
///
/// Several deals with one counterparty in one period share that ledger
/// activity: it is counted once against their combined plan. Accruals on
/// receivable or payable accounts never realize a deal.
pub fn analyze(deals: &Statement, ledger: &Statement, config: &DealConfig) -> AnalysisResult {
    let mut result = AnalysisResult::new(AnalysisDimension::DealRetrospective);

    let is_cash = |item: &LineItem| {
        config
            .realization_accounts
            .iter()
            .any(|r| r.contains(item.key.code()))
    };
    let mut activity: BTreeMap<(String, Period), f64> = BTreeMap::new();
    let mut movements: BTreeMap<Period, CashMovement> =
        ledger.periods().into_iter().map(|p| (p, CashMovement::default())).collect();
    for item in ledger.items().filter(|i| is_cash(*i)) {
        let movement = movements.entry(item.period).or_default();
        movement.net += item.value;
        if item.value > 0.0 {
            movement.inflow += item.value;
        }
        if let Some(counterparty) = &item.counterparty {
            *activity
                .entry((counterparty_key(counterparty), item.period))
                .or_default() += item.value;
        }
    }

    let mut totals: BTreeMap<Period, PeriodTotals> = BTreeMap::new();
    let mut matched: BTreeSet<(String, Period)> = BTreeSet::new();
    let mut entries = 0usize;
    let mut payments = 0usize;
    let mut unrealized = 0usize;

    for deal in deals.items() {
        entries += 1;
        if deal.value > 0.0 {
            payments += 1;
        }
        let period_totals = totals.entry(deal.period).or_default();
        period_totals.planned += deal.value;

        let key = deal
            .counterparty
            .as_deref()
            .map(|c| (counterparty_key(c), deal.period));
        match key.and_then(|k| activity.get(&k).map(|sum| (k, *sum))) {
            Some((key, sum)) => {
                if matched.insert(key) {
                    period_totals.realized += sum.abs();
                }
            }
            None => {
                unrealized += 1;
                debug!("Deal {} has no ledger activity in {}", deal.key, deal.period);
                result
                    .flags
                    .push(AnalysisFlag::new("unrealized").at(deal.period).about(deal.key.to_string()));
            }
        }
    }

    let mut planned_total = 0.0;
    let mut realized_total = 0.0;
    let mut short_periods = 0usize;
    for (period, t) in &totals {
        let variance = t.realized - t.planned;
        result.set(*period, "planned", MetricValue::Defined(t.planned));
        result.set(*period, "realized", MetricValue::Defined(t.realized));
        result.set(*period, "variance", MetricValue::Defined(variance));
        result.set(
            *period,
            "variance_ratio",
            MetricValue::ratio(Some(variance), Some(t.planned)),
        );
        planned_total += t.planned;
        realized_total += t.realized;
        if t.realized < t.planned {
            short_periods += 1;
        }
    }

    result.set_summary(
        "realization_rate",
        MetricValue::ratio(Some(realized_total), Some(planned_total)),
    );
    result.set_summary(
        "unrealized_share",
        MetricValue::ratio(Some(unrealized as f64), Some(entries as f64)),
    );
    result.set_summary(
        "shortfall_share",
        MetricValue::ratio(Some(short_periods as f64), Some(totals.len() as f64)),
    );

    simulate_payments(&mut result, &movements, &totals);
    coverage(&mut result, &movements, planned_total, payments, config.min_dscr);

    result
}

/// Replays each period's planned payments against the running cash position
/// of the realization accounts, which starts from zero. A period whose
/// position turns negative after its payments is a default.
fn simulate_payments(
    result: &mut AnalysisResult,
    movements: &BTreeMap<Period, CashMovement>,
    totals: &BTreeMap<Period, PeriodTotals>,
) {
    let mut balance = 0.0;
    let mut total_shortfall = 0.0;
    let mut defaults = 0usize;

    for (period, movement) in movements {
        balance += movement.net;
        let payment = totals.get(period).map_or(0.0, |t| t.planned);
        let after = balance - payment;
        let shortfall = (-after).max(0.0);

        result.set(*period, "cash_balance", MetricValue::Defined(balance));
        result.set(*period, "balance_after_payment", MetricValue::Defined(after));
        result.set(*period, "shortfall", MetricValue::Defined(shortfall));
        if after < 0.0 {
            defaults += 1;
            total_shortfall += shortfall;
            result.flags.push(AnalysisFlag::new("payment_shortfall").at(*period));
        }
    }

    result.set_summary("total_shortfall", MetricValue::Defined(total_shortfall));
    result.set_summary(
        "default_probability",
        MetricValue::ratio(Some(defaults as f64), Some(movements.len() as f64)),
    );
}

/// Debt service coverage: average cash inflow per ledger period over the
/// average planned payment.
fn coverage(
    result: &mut AnalysisResult,
    movements: &BTreeMap<Period, CashMovement>,
    planned_total: f64,
    payments: usize,
    min_dscr: f64,
) {
    let inflow: f64 = movements.values().map(|m| m.inflow).sum();
    let average_inflow = (!movements.is_empty()).then(|| inflow / movements.len() as f64);
    let average_payment = (payments > 0).then(|| planned_total / payments as f64);
    let dscr = MetricValue::ratio(average_inflow, average_payment);

    if let Some(value) = dscr.value() {
        if value < min_dscr {
            debug!("Deal coverage {:.2} below {:.2}", value, min_dscr);
            result.flags.push(AnalysisFlag::new("dscr_below_minimum"));
        }
    }
    result.set_summary("dscr", dscr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{CanonicalModel, CanonicalModelBuilder};
    use crate::config::AnalysisConfig;
    use crate::loader::load_document;
    use crate::parsers::parse_document;
    use crate::schema::{DocumentType, UndefinedReason};

    fn model(docs: &[(&str, &str)]) -> CanonicalModel {
        let config = AnalysisConfig::default();
        let parsed: Vec<_> = docs
            .iter()
            .map(|(name, csv)| parse_document(&load_document(name, csv.as_bytes()).unwrap()))
            .collect();
        CanonicalModelBuilder::new(&config).build(&parsed).value
    }

    fn run(deals: &str, ledger: &str) -> AnalysisResult {
        let model = model(&[("deals.csv", deals), ("ledger.csv", ledger)]);
        analyze(
            model.statement(DocumentType::DealRegister).unwrap(),
            model.statement(DocumentType::CashflowLedger).unwrap(),
            &DealConfig::default(),
        )
    }

    const LEDGER: &str = "Account,Counterparty,2023-01,2023-02\n1010,ACME Ltd,800,1000\n1010,Globex,,-50\n";

    #[test]
    fn test_matching_is_case_insensitive() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,acme ltd,2023-01,1000\nD-2,Acme Ltd,2023-02,1000\n",
            LEDGER,
        );
        let jan = Period::month(2023, 1).unwrap();
        let feb = Period::month(2023, 2).unwrap();

        assert_eq!(result.metric(&jan, "realized"), Some(MetricValue::Defined(800.0)));
        assert_eq!(result.metric(&jan, "variance"), Some(MetricValue::Defined(-200.0)));
        assert_eq!(result.metric(&jan, "variance_ratio"), Some(MetricValue::Defined(-0.2)));
        assert_eq!(result.metric(&feb, "variance"), Some(MetricValue::Defined(0.0)));
        assert_eq!(result.summary["realization_rate"], MetricValue::Defined(0.9));
        assert_eq!(result.summary["shortfall_share"], MetricValue::Defined(0.5));
        assert_eq!(result.summary["unrealized_share"], MetricValue::Defined(0.0));
        assert!(!result.has_flag("unrealized"));
    }

    #[test]
    fn test_unmatched_deal_is_flagged() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,Initech,2023-01,500\nD-2,Globex,2023-02,50\n",
            LEDGER,
        );
        let flags: Vec<_> = result.flags.iter().filter(|f| f.code == "unrealized").collect();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].subject.as_deref(), Some("D-1"));
        assert_eq!(flags[0].period, Period::month(2023, 1).ok());
        assert_eq!(result.summary["unrealized_share"], MetricValue::Defined(0.5));

        // Outgoing payments count by magnitude.
        let feb = Period::month(2023, 2).unwrap();
        assert_eq!(result.metric(&feb, "realized"), Some(MetricValue::Defined(50.0)));
    }

    #[test]
    fn test_shared_activity_counted_once() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,ACME Ltd,2023-02,600\nD-2,ACME Ltd,2023-02,600\n",
            LEDGER,
        );
        let feb = Period::month(2023, 2).unwrap();
        assert_eq!(result.metric(&feb, "planned"), Some(MetricValue::Defined(1200.0)));
        assert_eq!(result.metric(&feb, "realized"), Some(MetricValue::Defined(1000.0)));
    }

    #[test]
    fn test_zero_plan_ratio_is_undefined() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,ACME Ltd,2023-01,0\n",
            LEDGER,
        );
        assert_eq!(
            result.metric(&Period::month(2023, 1).unwrap(), "variance_ratio"),
            Some(MetricValue::Undefined(UndefinedReason::ZeroDenominator))
        );
    }

    #[test]
    fn test_accruals_do_not_realize_deals() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,Acme,2023-01,1000\n",
            "Account,Counterparty,2023-01\n1010,Acme,1000\n6210,Acme,1000\n",
        );
        let jan = Period::month(2023, 1).unwrap();
        assert_eq!(result.metric(&jan, "realized"), Some(MetricValue::Defined(1000.0)));
        assert_eq!(result.summary["realization_rate"], MetricValue::Defined(1.0));
    }

    #[test]
    fn test_receivable_only_activity_leaves_deal_unrealized() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,Acme,2023-01,1000\n",
            "Account,Counterparty,2023-01\n1010,Bank,50\n6210,Acme,1000\n",
        );
        assert!(result.has_flag("unrealized"));
        assert_eq!(result.summary["realization_rate"], MetricValue::Defined(0.0));
    }

    #[test]
    fn test_payment_simulation_and_coverage() {
        let result = run(
            "Deal ID,Counterparty,Period,Amount\nD-1,Acme,2023-02,400\nD-2,Acme,2023-03,300\n",
            "Account,Counterparty,2023-01,2023-02,2023-03\n1010,Acme,500,300,400\n1020,Staff,-200,-400,-100\n6210,Acme,900,,\n",
        );
        let jan = Period::month(2023, 1).unwrap();
        let feb = Period::month(2023, 2).unwrap();
        let mar = Period::month(2023, 3).unwrap();

        // Cash position 300, 200, 500 before payments of 0, 400, 300.
        assert_eq!(result.metric(&jan, "cash_balance"), Some(MetricValue::Defined(300.0)));
        assert_eq!(result.metric(&feb, "balance_after_payment"), Some(MetricValue::Defined(-200.0)));
        assert_eq!(result.metric(&feb, "shortfall"), Some(MetricValue::Defined(200.0)));
        assert_eq!(result.metric(&mar, "shortfall"), Some(MetricValue::Defined(0.0)));
        assert_eq!(result.summary["total_shortfall"], MetricValue::Defined(200.0));
        assert_eq!(result.summary["default_probability"], MetricValue::Defined(1.0 / 3.0));

        let shortfalls: Vec<_> = result
            .flags
            .iter()
            .filter(|f| f.code == "payment_shortfall")
            .map(|f| f.period)
            .collect();
        assert_eq!(shortfalls, vec![Some(feb)]);

        // Inflow averages 400 against payments averaging 350.
        assert_eq!(result.summary["dscr"], MetricValue::Defined(400.0 / 350.0));
        assert!(result.has_flag("dscr_below_minimum"));
    }

    #[test]
    fn test_zero_payments_leave_coverage_undefined() {
        let result = run("Deal ID,Counterparty,Period,Amount\nD-1,ACME Ltd,2023-01,0\n", LEDGER);
        assert_eq!(
            result.summary["dscr"],
            MetricValue::Undefined(UndefinedReason::MissingInput)
        );
        assert_eq!(result.summary["total_shortfall"], MetricValue::Defined(0.0));
    }
}
