use crate::canonical::Statement;
use crate::config::{AccountRange, CashflowConfig};
use crate::period::Period;
use crate::schema::{
    AnalysisDimension, AnalysisFlag, AnalysisResult, MetricValue, UndefinedReason,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    Operating,
    Investing,
    Financing,
    Unclassified,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Operating,
        Bucket::Investing,
        Bucket::Financing,
        Bucket::Unclassified,
    ];

    pub fn metric(&self) -> &'static str {
        match self {
            Bucket::Operating => "operating",
            Bucket::Investing => "investing",
            Bucket::Financing => "financing",
            Bucket::Unclassified => "unclassified",
        }
    }

    /// First configured range containing `code` decides.
    pub fn classify(code: &str, config: &CashflowConfig) -> Bucket {
        let within = |ranges: &[AccountRange]| ranges.iter().any(|r| r.contains(code));
        if within(&config.operating) {
            Bucket::Operating
        } else if within(&config.investing) {
            Bucket::Investing
        } else if within(&config.financing) {
            Bucket::Financing
        } else {
            Bucket::Unclassified
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PeriodFlows {
    buckets: BTreeMap<Bucket, f64>,
    inflow: f64,
    outflow: f64,
}

impl PeriodFlows {
    fn net(&self) -> f64 {
        self.buckets.values().sum()
    }

    /// Net movement of the classified (cash) accounts only.
    fn cash_net(&self) -> f64 {
        self.buckets
            .iter()
            .filter(|(bucket, _)| **bucket != Bucket::Unclassified)
            .map(|(_, value)| value)
            .sum()
    }
}

/// Splits ledger movements into operating, investing and financing flows by
/// account code and tracks the net flow over time.
///
/// The cash balance is the running total of classified movements starting
/// from zero; a period where it drops below zero is a cash gap.
pub fn analyze(ledger: &Statement, config: &CashflowConfig) -> AnalysisResult {
    let mut result = AnalysisResult::new(AnalysisDimension::Cashflow);

    let mut flows: BTreeMap<Period, PeriodFlows> = BTreeMap::new();
    let mut has_operating = false;
    for item in ledger.items() {
        let bucket = Bucket::classify(item.key.code(), config);
        has_operating |= bucket == Bucket::Operating;
        let period = flows.entry(item.period).or_default();
        *period.buckets.entry(bucket).or_default() += item.value;
        if item.value >= 0.0 {
            period.inflow += item.value;
        } else {
            period.outflow -= item.value;
        }
    }

    let window = config.rolling_window.max(1);
    let mut nets: Vec<f64> = Vec::with_capacity(flows.len());
    let mut rolling: Vec<(Period, f64)> = Vec::new();
    let mut operating_positive = 0usize;
    let mut balance = 0.0;
    let mut balances: Vec<f64> = Vec::with_capacity(flows.len());
    let mut outflows: Vec<f64> = Vec::with_capacity(flows.len());

    for (period, period_flows) in &flows {
        let period = *period;
        for bucket in Bucket::ALL {
            let value = period_flows.buckets.get(&bucket).copied().unwrap_or(0.0);
            result.set(period, bucket.metric(), MetricValue::Defined(value));
        }
        result.set(period, "inflow", MetricValue::Defined(period_flows.inflow));
        result.set(period, "outflow", MetricValue::Defined(period_flows.outflow));

        let net = period_flows.net();
        result.set(period, "net_cashflow", MetricValue::Defined(net));
        let change = match nets.last() {
            Some(previous) => MetricValue::Defined(net - previous),
            None => MetricValue::Undefined(UndefinedReason::InsufficientHistory),
        };
        result.set(period, "net_change", change);
        nets.push(net);

        balance += period_flows.cash_net();
        result.set(period, "cash_balance", MetricValue::Defined(balance));
        if balance < 0.0 {
            result.flags.push(AnalysisFlag::new("cash_gap").at(period));
        }
        balances.push(balance);
        outflows.push(period_flows.outflow);

        if nets.len() >= window {
            let average = nets[nets.len() - window..].iter().sum::<f64>() / window as f64;
            result.set(period, "rolling_average", MetricValue::Defined(average));
            rolling.push((period, average));
        } else {
            result.set(
                period,
                "rolling_average",
                MetricValue::Undefined(UndefinedReason::InsufficientHistory),
            );
        }

        let operating = period_flows.buckets.get(&Bucket::Operating).copied();
        match operating {
            Some(value) if value > 0.0 => operating_positive += 1,
            Some(value) if value < 0.0 => result
                .flags
                .push(AnalysisFlag::new("negative_operating_cashflow").at(period)),
            _ => {}
        }
    }

    let share = if has_operating && !flows.is_empty() {
        MetricValue::Defined(operating_positive as f64 / flows.len() as f64)
    } else {
        MetricValue::Undefined(UndefinedReason::MissingInput)
    };
    result.set_summary("operating_positive_share", share);
    result.set_summary(
        "average_net_cashflow",
        MetricValue::ratio(Some(nets.iter().sum()), Some(nets.len() as f64)),
    );

    let gaps = balances.iter().filter(|b| **b < 0.0).count();
    result.set_summary(
        "negative_balance_share",
        MetricValue::ratio(Some(gaps as f64), Some(balances.len() as f64)),
    );
    // Months the average cash position covers at the average outflow.
    let average_balance = mean(&balances).map(|b| b.max(0.0));
    result.set_summary(
        "burn_rate_months",
        MetricValue::ratio(average_balance, mean(&outflows)),
    );

    if let [.., (_, before), (period, last)] = rolling.as_slice() {
        if last < before {
            result.flags.push(AnalysisFlag::new("cashflow_declining").at(*period));
        }
    }

    result
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
