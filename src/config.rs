use crate::error::{FinancialHealthError, Result};
use crate::schema::{AnalysisDimension, RiskBand};
use crate::utils::account_number;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Immutable, request-scoped settings threaded through the builder, the
/// analyses and the scorer. Nothing in the crate reads configuration from
/// anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    #[schemars(
        description = "Largest accepted |assets - (liabilities + equity)| per balance sheet period, in base units"
    )]
    pub balance_tolerance: f64,

    #[schemars(
        description = "Two documents reporting the same key and period agree when their values differ by at most this amount"
    )]
    pub conflict_tolerance: f64,

    #[schemars(description = "Case-insensitive markers that declare a document's unit scale")]
    pub unit_scale_markers: Vec<UnitScaleMarker>,

    pub cashflow: CashflowConfig,

    pub aging: AgingConfig,

    pub deals: DealConfig,

    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UnitScaleMarker {
    pub marker: String,
    pub factor: f64,
}

impl UnitScaleMarker {
    fn new(marker: &str, factor: f64) -> Self {
        Self {
            marker: marker.to_string(),
            factor,
        }
    }
}

/// Inclusive range of numeric account codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccountRange {
    pub from: u64,
    pub to: u64,
}

impl AccountRange {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, code: &str) -> bool {
        account_number(code).is_some_and(|n| n >= self.from && n <= self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CashflowConfig {
    #[schemars(description = "Number of trailing periods in the rolling average of net cash flow")]
    pub rolling_window: usize,
    pub operating: Vec<AccountRange>,
    pub investing: Vec<AccountRange>,
    pub financing: Vec<AccountRange>,
}

impl Default for CashflowConfig {
    fn default() -> Self {
        Self {
            rolling_window: 3,
            operating: vec![AccountRange::new(1000, 1999)],
            investing: vec![AccountRange::new(2000, 2999)],
            financing: vec![AccountRange::new(3000, 3999)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AgingConfig {
    #[schemars(
        description = "Upper bounds in days of every bucket but the last, strictly increasing; [30, 60, 90] gives 0-30, 31-60, 61-90 and over 90"
    )]
    pub bucket_boundaries_days: Vec<i64>,

    #[schemars(description = "Accounts with open amounts older than this many days are flagged")]
    pub threshold_days: i64,

    pub receivable_accounts: Vec<AccountRange>,

    pub payable_accounts: Vec<AccountRange>,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            bucket_boundaries_days: vec![30, 60, 90],
            threshold_days: 90,
            receivable_accounts: vec![AccountRange::new(6200, 6299)],
            payable_accounts: vec![AccountRange::new(6000, 6099)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DealConfig {
    #[schemars(
        description = "Ledger accounts whose movements are money actually received or paid; only these realize a deal"
    )]
    pub realization_accounts: Vec<AccountRange>,

    #[schemars(description = "Debt service coverage below this ratio is flagged")]
    pub min_dscr: f64,
}

impl Default for DealConfig {
    fn default() -> Self {
        Self {
            realization_accounts: vec![AccountRange::new(1000, 3999)],
            min_dscr: 1.2,
        }
    }
}

/// Monotonic map of a metric onto [0, 1]: `worst` maps to 0, `best` to 1,
/// linear in between and flat beyond either end. `best < worst` means lower
/// values are better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizationCurve {
    pub worst: f64,
    pub best: f64,
}

impl NormalizationCurve {
    pub const fn new(worst: f64, best: f64) -> Self {
        Self { worst, best }
    }

    pub fn normalize(&self, value: f64) -> f64 {
        let position = (value - self.worst) / (self.best - self.worst);
        position.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoringRule {
    pub dimension: AnalysisDimension,
    pub metric: String,
    #[schemars(description = "Points this metric contributes at its best value")]
    pub weight: f64,
    pub curve: NormalizationCurve,
}

impl ScoringRule {
    fn new(dimension: AnalysisDimension, metric: &str, weight: f64, worst: f64, best: f64) -> Self {
        Self {
            dimension,
            metric: metric.to_string(),
            weight,
            curve: NormalizationCurve::new(worst, best),
        }
    }

    pub fn component_name(&self) -> String {
        format!("{}.{}", self.dimension, self.metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BandThreshold {
    #[schemars(description = "Inclusive lower bound of the band on the 0-100 scale")]
    pub lower: f64,
    pub band: RiskBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoringConfig {
    pub rules: Vec<ScoringRule>,
    #[schemars(description = "Bands sorted by lower bound; the first must start at 0")]
    pub bands: Vec<BandThreshold>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        use AnalysisDimension::*;

        Self {
            rules: vec![
                ScoringRule::new(Balance, "current_ratio", 12.0, 0.8, 2.0),
                ScoringRule::new(Balance, "quick_ratio", 8.0, 0.3, 1.0),
                ScoringRule::new(Balance, "equity_ratio", 12.0, 0.1, 0.5),
                ScoringRule::new(Balance, "debt_to_equity", 8.0, 3.0, 0.5),
                ScoringRule::new(Profitability, "net_margin", 10.0, 0.0, 0.15),
                ScoringRule::new(Profitability, "gross_margin", 5.0, 0.1, 0.4),
                ScoringRule::new(Cashflow, "operating_positive_share", 12.0, 0.0, 1.0),
                ScoringRule::new(Receivables, "days_outstanding", 10.0, 120.0, 30.0),
                ScoringRule::new(Payables, "days_outstanding", 8.0, 150.0, 45.0),
                ScoringRule::new(DealRetrospective, "realization_rate", 15.0, 0.5, 1.0),
            ],
            bands: vec![
                BandThreshold {
                    lower: 0.0,
                    band: RiskBand::HighRisk,
                },
                BandThreshold {
                    lower: 40.0,
                    band: RiskBand::MediumRisk,
                },
                BandThreshold {
                    lower: 70.0,
                    band: RiskBand::LowRisk,
                },
            ],
        }
    }
}

impl ScoringConfig {
    pub fn total_weight(&self) -> f64 {
        self.rules.iter().map(|r| r.weight).sum()
    }

    pub fn band_for(&self, total: f64) -> RiskBand {
        self.bands
            .iter()
            .rev()
            .find(|b| total >= b.lower)
            .or_else(|| self.bands.first())
            .map(|b| b.band)
            .unwrap_or(RiskBand::HighRisk)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(invalid("scoring needs at least one rule"));
        }
        for rule in &self.rules {
            if !rule.weight.is_finite() || rule.weight < 0.0 {
                return Err(invalid(format!(
                    "weight of {} must be a non-negative number, got {}",
                    rule.component_name(),
                    rule.weight
                )));
            }
            if !rule.curve.worst.is_finite()
                || !rule.curve.best.is_finite()
                || rule.curve.worst == rule.curve.best
            {
                return Err(invalid(format!(
                    "curve of {} needs distinct finite worst/best values",
                    rule.component_name()
                )));
            }
        }
        if self.total_weight() <= 0.0 {
            return Err(invalid("scoring weights sum to zero"));
        }

        let first = self
            .bands
            .first()
            .ok_or_else(|| invalid("at least one classification band is required"))?;
        if first.lower != 0.0 {
            return Err(invalid("the first classification band must start at 0"));
        }
        for pair in self.bands.windows(2) {
            if pair[1].lower <= pair[0].lower || pair[1].lower > 100.0 {
                return Err(invalid(
                    "classification band bounds must be strictly increasing within [0, 100]",
                ));
            }
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: 1.0,
            conflict_tolerance: 0.01,
            unit_scale_markers: vec![
                UnitScaleMarker::new("in thousands", 1_000.0),
                UnitScaleMarker::new("(000)", 1_000.0),
                UnitScaleMarker::new("'000", 1_000.0),
                UnitScaleMarker::new("тыс.", 1_000.0),
                UnitScaleMarker::new("in millions", 1_000_000.0),
                UnitScaleMarker::new("млн", 1_000_000.0),
            ],
            cashflow: CashflowConfig::default(),
            aging: AgingConfig::default(),
            deals: DealConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.balance_tolerance.is_finite() || self.balance_tolerance < 0.0 {
            return Err(invalid(format!(
                "balance_tolerance must be non-negative, got {}",
                self.balance_tolerance
            )));
        }
        if !self.conflict_tolerance.is_finite() || self.conflict_tolerance < 0.0 {
            return Err(invalid(format!(
                "conflict_tolerance must be non-negative, got {}",
                self.conflict_tolerance
            )));
        }
        for marker in &self.unit_scale_markers {
            if marker.marker.trim().is_empty() || !marker.factor.is_finite() || marker.factor <= 0.0
            {
                return Err(invalid(format!(
                    "unit scale marker '{}' needs text and a positive factor",
                    marker.marker
                )));
            }
        }
        if self.cashflow.rolling_window == 0 {
            return Err(invalid("cashflow.rolling_window must be at least 1"));
        }
        let ranges = self
            .cashflow
            .operating
            .iter()
            .chain(&self.cashflow.investing)
            .chain(&self.cashflow.financing)
            .chain(&self.aging.receivable_accounts)
            .chain(&self.aging.payable_accounts)
            .chain(&self.deals.realization_accounts);
        for range in ranges {
            if range.from > range.to {
                return Err(invalid(format!(
                    "account range {}..{} is reversed",
                    range.from, range.to
                )));
            }
        }
        if self.aging.bucket_boundaries_days.is_empty() {
            return Err(invalid("aging needs at least one bucket boundary"));
        }
        if self.aging.bucket_boundaries_days[0] < 0
            || self
                .aging
                .bucket_boundaries_days
                .windows(2)
                .any(|w| w[1] <= w[0])
        {
            return Err(invalid(
                "aging bucket boundaries must be non-negative and strictly increasing",
            ));
        }
        if self.aging.threshold_days < 0 {
            return Err(invalid("aging.threshold_days must be non-negative"));
        }
        if self.deals.realization_accounts.is_empty() {
            return Err(invalid("deals.realization_accounts needs at least one range"));
        }
        if !self.deals.min_dscr.is_finite() || self.deals.min_dscr < 0.0 {
            return Err(invalid(format!(
                "deals.min_dscr must be non-negative, got {}",
                self.deals.min_dscr
            )));
        }
        self.scoring.validate()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }
}

fn invalid(message: impl Into<String>) -> FinancialHealthError {
    FinancialHealthError::InvalidConfig(message.into())
}
