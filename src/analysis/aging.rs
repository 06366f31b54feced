use crate::canonical::Statement;
use crate::config::{AccountRange, AgingConfig};
use crate::period::Period;
use crate::schema::{AnalysisDimension, AnalysisFlag, AnalysisResult, LineKey, MetricValue};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// An accrual not yet settled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenAmount {
    pub origin: Period,
    pub amount: f64,
}

/// Movements of one account, replayed period by period.
#[derive(Debug, Default)]
struct AccountBook {
    open: VecDeque<OpenAmount>,
    accrued: f64,
    settled: f64,
}

impl AccountBook {
    fn post(&mut self, period: Period, value: f64) {
        if value > 0.0 {
            self.accrued += value;
            self.open.push_back(OpenAmount {
                origin: period,
                amount: value,
            });
        } else if value < 0.0 {
            self.settle(-value);
        }
    }

    /// Applies a settlement to the oldest open accruals first.
    fn settle(&mut self, mut amount: f64) {
        self.settled += amount;
        while amount > 0.0 {
            let Some(oldest) = self.open.front_mut() else {
                debug!("Settlement exceeds open accruals by {}", amount);
                return;
            };
            if oldest.amount > amount {
                oldest.amount -= amount;
                return;
            }
            amount -= oldest.amount;
            self.open.pop_front();
        }
    }

    fn outstanding(&self) -> f64 {
        self.open.iter().map(|o| o.amount).sum()
    }
}

/// Metric names of the aging buckets: `[30, 60, 90]` gives `aging_0_30`,
/// `aging_31_60`, `aging_61_90` and `aging_over_90`.
pub fn bucket_names(boundaries: &[i64]) -> Vec<String> {
    let mut names = Vec::with_capacity(boundaries.len() + 1);
    let mut lower = 0;
    for upper in boundaries {
        names.push(format!("aging_{}_{}", lower, upper));
        lower = upper + 1;
    }
    if let Some(last) = boundaries.last() {
        names.push(format!("aging_over_{}", last));
    }
    names
}

/// Index of the bucket an amount aged `days` falls into.
pub fn bucket_index(days: i64, boundaries: &[i64]) -> usize {
    boundaries
        .iter()
        .position(|upper| days <= *upper)
        .unwrap_or(boundaries.len())
}

/// Receivables or payables aging over the ledger accounts in `ranges`.
///
/// Positive cells are accruals and negative cells settlements, applied FIFO.
/// Open amounts are aged from the end of their origin period to the end of the
/// ledger's last period, even when the aged accounts stop reporting earlier.
/// Returns `None` when no ledger account is in range.
pub fn analyze(
    dimension: AnalysisDimension,
    ledger: &Statement,
    ranges: &[AccountRange],
    config: &AgingConfig,
) -> Option<AnalysisResult> {
    let keys: Vec<&LineKey> = ledger
        .keys()
        .filter(|key| ranges.iter().any(|r| r.contains(key.code())))
        .collect();
    if keys.is_empty() {
        return None;
    }

    let timeline = ledger.periods();
    let as_of = *timeline.last()?;
    let first = *timeline.first()?;
    let periods: BTreeSet<Period> = keys
        .iter()
        .flat_map(|key| ledger.series(key).map(|i| i.period))
        .collect();
    debug!(
        "Aging {} accounts as of {} over {} reported periods",
        keys.len(),
        as_of,
        periods.len()
    );

    let mut result = AnalysisResult::new(dimension);
    let names = bucket_names(&config.bucket_boundaries_days);
    let mut buckets = vec![0.0; names.len()];
    let mut per_period: BTreeMap<Period, (f64, f64, f64)> = BTreeMap::new();
    let mut by_counterparty: BTreeMap<String, f64> = BTreeMap::new();
    let mut total_accrued = 0.0;
    let mut overdue = 0.0;

    for key in keys {
        let mut book = AccountBook::default();
        let mut counterparty = None;

        for period in &periods {
            let before = (book.accrued, book.settled);
            if let Some(item) = ledger.get(key, period) {
                counterparty = counterparty.or_else(|| item.counterparty.clone());
                book.post(*period, item.value);
            }
            let entry = per_period.entry(*period).or_default();
            entry.0 += book.accrued - before.0;
            entry.1 += book.settled - before.1;
            entry.2 += book.outstanding();
        }

        let mut oldest_overdue = false;
        for open in &book.open {
            let age = open.origin.days_until_end_of(&as_of);
            buckets[bucket_index(age, &config.bucket_boundaries_days)] += open.amount;
            if age > config.threshold_days {
                overdue += open.amount;
                oldest_overdue = true;
            }
        }
        if oldest_overdue {
            result
                .flags
                .push(AnalysisFlag::new("aging_threshold_exceeded").at(as_of).about(key.to_string()));
        }

        total_accrued += book.accrued;
        *by_counterparty
            .entry(counterparty.unwrap_or_else(|| key.to_string()))
            .or_default() += book.outstanding();
    }

    for (period, (accrued, settled, outstanding)) in per_period {
        result.set(period, "accrued", MetricValue::Defined(accrued));
        result.set(period, "settled", MetricValue::Defined(settled));
        result.set(period, "outstanding", MetricValue::Defined(outstanding));
    }

    let outstanding: f64 = buckets.iter().sum();
    for (name, amount) in names.iter().zip(&buckets) {
        result.set_summary(name, MetricValue::Defined(*amount));
    }
    let days = (as_of.end_date() - first.start_date()).num_days() + 1;
    result.set_summary("outstanding", MetricValue::Defined(outstanding));
    result.set_summary(
        "days_outstanding",
        MetricValue::ratio(Some(outstanding * days as f64), Some(total_accrued)),
    );
    result.set_summary(
        "turnover",
        MetricValue::ratio(Some(total_accrued), Some(outstanding)),
    );
    result.set_summary(
        "overdue_share",
        MetricValue::ratio(Some(overdue), Some(outstanding)),
    );
    let largest = by_counterparty.values().copied().fold(0.0, f64::max);
    result.set_summary(
        "top_concentration",
        MetricValue::ratio(Some(largest), Some(outstanding)),
    );

    Some(result)
}
