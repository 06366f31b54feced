use crate::error::FinancialHealthError;
use crate::period::Period;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The five source layouts, which are also the five statement kinds of the
/// canonical model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[schemars(description = "Profit and loss form: revenue, expenses and profit lines per period")]
    IncomeStatement,

    #[schemars(description = "Balance sheet form: asset, liability and equity sections per period")]
    BalanceSheet,

    #[schemars(description = "Transaction ledger form: account rows with one column per period")]
    CashflowLedger,

    #[schemars(description = "Trial balance form: debit and credit columns per account")]
    TrialBalance,

    #[schemars(description = "Counterparty deal register: planned amounts per deal and period")]
    DealRegister,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::IncomeStatement,
        DocumentType::BalanceSheet,
        DocumentType::CashflowLedger,
        DocumentType::TrialBalance,
        DocumentType::DealRegister,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DocumentType::IncomeStatement => "income statement",
            DocumentType::BalanceSheet => "balance sheet",
            DocumentType::CashflowLedger => "cash-flow ledger",
            DocumentType::TrialBalance => "trial balance",
            DocumentType::DealRegister => "deal register",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AccountType {
    #[schemars(description = "Resources owned: cash, receivables, inventory, fixed assets (Balance Sheet)")]
    Asset,

    #[schemars(description = "Obligations owed to creditors: payables, loans (Balance Sheet)")]
    Liability,

    #[schemars(description = "Owner's residual interest: share capital, retained earnings (Balance Sheet)")]
    Equity,

    #[schemars(description = "Revenue from sales of goods or services (Income Statement, positive)")]
    Revenue,

    #[schemars(description = "Direct costs of goods sold (Income Statement, negative)")]
    CostOfSales,

    #[schemars(description = "Selling, general and administrative expenses (Income Statement, negative)")]
    OperatingExpense,

    #[schemars(description = "Non-operating income such as interest received (Income Statement, positive)")]
    OtherIncome,

    #[schemars(description = "Non-operating expenses such as interest paid (Income Statement, negative)")]
    OtherExpense,

    #[schemars(description = "Income tax expense (Income Statement, negative)")]
    IncomeTax,

    #[schemars(description = "Reported profit subtotal, kept with the sign the document prints")]
    Profit,
}

impl AccountType {
    pub fn is_balance_sheet(&self) -> bool {
        matches!(
            self,
            AccountType::Asset | AccountType::Liability | AccountType::Equity
        )
    }

    /// Sign every value of this type carries after parsing; `None` keeps the
    /// reported sign.
    pub fn normal_sign(&self) -> Option<f64> {
        match self {
            AccountType::Revenue | AccountType::OtherIncome => Some(1.0),
            AccountType::CostOfSales
            | AccountType::OperatingExpense
            | AccountType::OtherExpense
            | AccountType::IncomeTax => Some(-1.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Current,
    Noncurrent,
}

/// How a line takes part in aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    /// A leaf line that is summed when no subtotal is reported.
    Detail,
    /// Reported aggregate of one account type and term, e.g. total current assets.
    Subtotal,
    /// Reported aggregate of a whole account type, e.g. total assets.
    Total,
    /// Cross-check line such as "total liabilities and equity"; never summed.
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineKey {
    Account {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterparty: Option<String>,
    },
    Deal {
        deal_id: String,
    },
}

impl LineKey {
    pub fn account(code: impl Into<String>) -> Self {
        LineKey::Account {
            code: code.into(),
            counterparty: None,
        }
    }

    pub fn account_with_counterparty(code: impl Into<String>, counterparty: Option<String>) -> Self {
        LineKey::Account {
            code: code.into(),
            counterparty,
        }
    }

    pub fn deal(deal_id: impl Into<String>) -> Self {
        LineKey::Deal {
            deal_id: deal_id.into(),
        }
    }

    /// Account code, or the deal identifier for deal lines.
    pub fn code(&self) -> &str {
        match self {
            LineKey::Account { code, .. } => code,
            LineKey::Deal { deal_id } => deal_id,
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKey::Account {
                code,
                counterparty: Some(cp),
            } => write!(f, "{}@{}", code, cp),
            LineKey::Account { code, .. } => f.write_str(code),
            LineKey::Deal { deal_id } => f.write_str(deal_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceMetadata {
    #[schemars(description = "Name of the document the value was read from")]
    pub document_name: String,

    #[schemars(description = "1-based record number of the row inside the document")]
    pub row: usize,
}

/// A single (key, period, value) fact. Values are already sign-normalized for
/// their document type; they are only rescaled (never re-signed) afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    pub key: LineKey,
    pub label: String,
    pub period: Period,
    pub value: f64,
    pub source_document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<AccountType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,
    pub role: LineRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub source: SourceMetadata,
}

impl LineItem {
    pub fn account_code(&self) -> &str {
        self.key.code()
    }

    pub fn rescaled(&self, factor: f64) -> LineItem {
        LineItem {
            value: self.value * factor,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnrecognizedFormat,
    MalformedRow,
    MissingRequiredField,
    PeriodConflict,
    BalanceMismatch,
    UnrecognizedLabel,
    UnclassifiedAccount,
    AnalysisSkipped,
    ScoringSkipped,
    InvalidDocument,
}

/// One entry of the diagnostics list that accompanies every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            document: None,
            row: None,
            message: message.into(),
        }
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::warning(kind, message)
        }
    }

    pub fn in_document(mut self, document: impl Into<String>, row: Option<usize>) -> Self {
        self.document = Some(document.into());
        self.row = row;
        self
    }

    pub fn from_error(error: &FinancialHealthError) -> Self {
        let (kind, document, row) = match error {
            FinancialHealthError::UnrecognizedFormat { document } => {
                (DiagnosticKind::UnrecognizedFormat, Some(document.clone()), None)
            }
            FinancialHealthError::MalformedRow { document, row, .. } => {
                (DiagnosticKind::MalformedRow, Some(document.clone()), Some(*row))
            }
            FinancialHealthError::MissingRequiredField { document, row, .. } => (
                DiagnosticKind::MissingRequiredField,
                Some(document.clone()),
                Some(*row),
            ),
            FinancialHealthError::PeriodConflict { .. } => (DiagnosticKind::PeriodConflict, None, None),
            FinancialHealthError::NoScorableMetrics => (DiagnosticKind::ScoringSkipped, None, None),
            FinancialHealthError::InvalidConfig(_)
            | FinancialHealthError::DateError(_)
            | FinancialHealthError::Csv(_)
            | FinancialHealthError::SerializationError(_) => {
                (DiagnosticKind::InvalidDocument, None, None)
            }
        };

        Self {
            severity: Severity::Error,
            kind,
            document,
            row,
            message: error.to_string(),
        }
    }
}

/// A payload computed despite non-fatal problems, plus those problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partial<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Partial<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn into_parts(self) -> (T, Vec<Diagnostic>) {
        (self.value, self.diagnostics)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    ZeroDenominator,
    MissingInput,
    InsufficientHistory,
}

/// A metric that is either a number or explicitly undefined. A zero
/// denominator never produces `0`, an infinity or a panic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Defined(f64),
    Undefined(UndefinedReason),
}

impl MetricValue {
    pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Self {
        match (numerator, denominator) {
            (Some(_), Some(d)) if d == 0.0 => MetricValue::Undefined(UndefinedReason::ZeroDenominator),
            (Some(n), Some(d)) => MetricValue::from_f64(n / d),
            _ => MetricValue::Undefined(UndefinedReason::MissingInput),
        }
    }

    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) => MetricValue::from_f64(v),
            None => MetricValue::Undefined(UndefinedReason::MissingInput),
        }
    }

    fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            MetricValue::Defined(value)
        } else {
            MetricValue::Undefined(UndefinedReason::ZeroDenominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            MetricValue::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDimension {
    Balance,
    Profitability,
    Cashflow,
    Receivables,
    Payables,
    DealRetrospective,
}

impl AnalysisDimension {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisDimension::Balance => "balance",
            AnalysisDimension::Profitability => "profitability",
            AnalysisDimension::Cashflow => "cashflow",
            AnalysisDimension::Receivables => "receivables",
            AnalysisDimension::Payables => "payables",
            AnalysisDimension::DealRetrospective => "deal_retrospective",
        }
    }
}

impl fmt::Display for AnalysisDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Qualitative finding, e.g. `liquidity_declining` or `unrealized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisFlag {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl AnalysisFlag {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            period: None,
            subject: None,
        }
    }

    pub fn at(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

pub type MetricMap = BTreeMap<String, MetricValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub dimension: AnalysisDimension,
    #[schemars(description = "Per-period metrics keyed by period, then metric name")]
    pub periods: BTreeMap<Period, MetricMap>,
    #[schemars(description = "As-of or whole-timeline metrics")]
    pub summary: MetricMap,
    pub flags: Vec<AnalysisFlag>,
}

impl AnalysisResult {
    pub fn new(dimension: AnalysisDimension) -> Self {
        Self {
            dimension,
            periods: BTreeMap::new(),
            summary: BTreeMap::new(),
            flags: Vec::new(),
        }
    }

    pub fn set(&mut self, period: Period, metric: &str, value: MetricValue) {
        self.periods
            .entry(period)
            .or_default()
            .insert(metric.to_string(), value);
    }

    pub fn set_summary(&mut self, metric: &str, value: MetricValue) {
        self.summary.insert(metric.to_string(), value);
    }

    pub fn metric(&self, period: &Period, metric: &str) -> Option<MetricValue> {
        self.periods.get(period).and_then(|m| m.get(metric)).copied()
    }

    /// The summary value when one exists, otherwise the value at the latest
    /// period that carries the metric.
    pub fn headline(&self, metric: &str) -> Option<MetricValue> {
        if let Some(value) = self.summary.get(metric) {
            return Some(*value);
        }
        self.periods
            .values()
            .rev()
            .find_map(|metrics| metrics.get(metric).copied())
    }

    pub fn has_flag(&self, code: &str) -> bool {
        self.flags.iter().any(|f| f.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceMismatch {
    pub period: Period,
    pub assets: f64,
    pub liabilities: f64,
    pub equity: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    HighRisk,
    MediumRisk,
    LowRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreComponent {
    pub dimension: AnalysisDimension,
    pub metric: String,
    pub raw_value: f64,
    #[schemars(description = "Metric mapped onto [0, 1] by its curve")]
    pub normalized: f64,
    #[schemars(description = "Weight after redistribution of missing components")]
    pub effective_weight: f64,
    pub weighted_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Score {
    pub components: BTreeMap<String, ScoreComponent>,
    #[schemars(description = "Configured components whose metric was unavailable")]
    pub missing: Vec<String>,
    pub total: f64,
    pub band: RiskBand,
}

impl Score {
    pub fn present(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }
}
