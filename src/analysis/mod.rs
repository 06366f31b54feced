//! Financial-health analyses over the canonical model.
//!
//! Every dimension is a pure function of the statements it reads, the
//! timeline and the configuration. Dimensions never depend on each other, so a
//! missing or withheld statement only skips the dimensions that need it.

pub mod aging;
pub mod balance;
pub mod cashflow;
pub mod deal;
pub mod profitability;

use crate::canonical::{CanonicalModel, Statement};
use crate::config::AnalysisConfig;
use crate::schema::{
    AnalysisDimension, AnalysisResult, Diagnostic, DiagnosticKind, DocumentType, Partial,
};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DIMENSIONS: [AnalysisDimension; 6] = [
    AnalysisDimension::Balance,
    AnalysisDimension::Profitability,
    AnalysisDimension::Cashflow,
    AnalysisDimension::Receivables,
    AnalysisDimension::Payables,
    AnalysisDimension::DealRetrospective,
];

/// Statements a dimension cannot run without.
pub fn required_statements(dimension: AnalysisDimension) -> &'static [DocumentType] {
    match dimension {
        AnalysisDimension::Balance => &[DocumentType::BalanceSheet],
        AnalysisDimension::Profitability => &[DocumentType::IncomeStatement],
        AnalysisDimension::Cashflow
        | AnalysisDimension::Receivables
        | AnalysisDimension::Payables => &[DocumentType::CashflowLedger],
        AnalysisDimension::DealRetrospective => {
            &[DocumentType::DealRegister, DocumentType::CashflowLedger]
        }
    }
}

/// Results of every dimension that could run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSet {
    pub results: BTreeMap<AnalysisDimension, AnalysisResult>,
}

impl AnalysisSet {
    pub fn get(&self, dimension: AnalysisDimension) -> Option<&AnalysisResult> {
        self.results.get(&dimension)
    }

    pub fn insert(&mut self, result: AnalysisResult) {
        self.results.insert(result.dimension, result);
    }

    pub fn dimensions(&self) -> impl Iterator<Item = AnalysisDimension> + '_ {
        self.results.keys().copied()
    }
}

pub struct AnalysisEngine<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> AnalysisEngine<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, model: &CanonicalModel) -> Partial<AnalysisSet> {
        let mut set = AnalysisSet::default();
        let mut diagnostics = Vec::new();

        for dimension in DIMENSIONS {
            match self.run_dimension(dimension, model) {
                Ok(result) => {
                    debug!(
                        "{} analysis: {} periods, {} flags",
                        dimension,
                        result.periods.len(),
                        result.flags.len()
                    );
                    set.insert(result);
                }
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }

        info!(
            "Analysis complete: {} of {} dimensions computed",
            set.results.len(),
            DIMENSIONS.len()
        );
        Partial::with_diagnostics(set, diagnostics)
    }

    /// Runs one dimension, or explains why it was skipped.
    pub fn run_dimension(
        &self,
        dimension: AnalysisDimension,
        model: &CanonicalModel,
    ) -> Result<AnalysisResult, Diagnostic> {
        for document_type in required_statements(dimension) {
            if model.statement(*document_type).is_none() {
                return Err(skipped(dimension, *document_type, model));
            }
        }
        let statement = |t: DocumentType| model.statement(t);
        let ledger = statement(DocumentType::CashflowLedger);

        let result = match dimension {
            AnalysisDimension::Balance => statement(DocumentType::BalanceSheet).map(|bs| {
                balance::analyze(bs, statement(DocumentType::TrialBalance), self.config)
            }),
            AnalysisDimension::Profitability => statement(DocumentType::IncomeStatement)
                .map(|is| profitability::analyze(is, statement(DocumentType::BalanceSheet))),
            AnalysisDimension::Cashflow => ledger.map(|l| cashflow::analyze(l, &self.config.cashflow)),
            AnalysisDimension::Receivables | AnalysisDimension::Payables => {
                return self.run_aging(dimension, ledger);
            }
            AnalysisDimension::DealRetrospective => statement(DocumentType::DealRegister)
                .zip(ledger)
                .map(|(deals, ledger)| deal::analyze(deals, ledger, &self.config.deals)),
        };

        result.ok_or_else(|| {
            Diagnostic::info(
                DiagnosticKind::AnalysisSkipped,
                format!("{} analysis skipped: required statements missing", dimension),
            )
        })
    }

    fn run_aging(
        &self,
        dimension: AnalysisDimension,
        ledger: Option<&Statement>,
    ) -> Result<AnalysisResult, Diagnostic> {
        let ranges = match dimension {
            AnalysisDimension::Payables => &self.config.aging.payable_accounts,
            _ => &self.config.aging.receivable_accounts,
        };
        ledger
            .and_then(|l| aging::analyze(dimension, l, ranges, &self.config.aging))
            .ok_or_else(|| {
                Diagnostic::info(
                    DiagnosticKind::AnalysisSkipped,
                    format!(
                        "{} analysis skipped: no ledger accounts in the configured {} ranges",
                        dimension, dimension
                    ),
                )
            })
    }
}

fn skipped(dimension: AnalysisDimension, missing: DocumentType, model: &CanonicalModel) -> Diagnostic {
    if model.is_withheld(missing) {
        Diagnostic::warning(
            DiagnosticKind::AnalysisSkipped,
            format!(
                "{} analysis skipped: the {} was withheld because of period conflicts",
                dimension, missing
            ),
        )
    } else {
        Diagnostic::info(
            DiagnosticKind::AnalysisSkipped,
            format!("{} analysis skipped: no {} was supplied", dimension, missing),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalModelBuilder;
    use crate::loader::load_document;
    use crate::parsers::parse_document;
    use crate::schema::Severity;

    fn model(docs: &[(&str, &str)], config: &AnalysisConfig) -> CanonicalModel {
        let parsed: Vec<_> = docs
            .iter()
            .map(|(name, csv)| parse_document(&load_document(name, csv.as_bytes()).unwrap()))
            .collect();
        CanonicalModelBuilder::new(config).build(&parsed).value
    }

    #[test]
    fn test_missing_statements_skip_only_their_dimensions() {
        let config = AnalysisConfig::default();
        let model = model(
            &[("pnl.csv", "Income Statement\nLine item,2023\nRevenue,1000\nExpenses,600\n")],
            &config,
        );
        let (set, diagnostics) = AnalysisEngine::new(&config).run(&model).into_parts();

        assert_eq!(set.dimensions().collect::<Vec<_>>(), vec![AnalysisDimension::Profitability]);
        assert_eq!(diagnostics.len(), 5);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::AnalysisSkipped && d.severity == Severity::Info));
    }

    #[test]
    fn test_withheld_statement_is_a_warning() {
        let config = AnalysisConfig::default();
        let model = model(
            &[
                ("a.csv", "Balance Sheet\nLine item,2023\nAssets\nCash,100\n"),
                ("b.csv", "Balance Sheet\nLine item,2023\nAssets\nCash,120\n"),
            ],
            &config,
        );
        let diagnostic = AnalysisEngine::new(&config)
            .run_dimension(AnalysisDimension::Balance, &model)
            .unwrap_err();
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert!(diagnostic.message.contains("withheld"));
    }
}
