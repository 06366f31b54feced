//! # Financial Health Engine
//!
//! A library for turning heterogeneous accounting exports (CSV/TSV tables of
//! income statements, balance sheets, cash ledgers, trial balances and deal
//! registers) into a canonical financial model, per-dimension health metrics
//! and a weighted risk score.
//!
//! ## Core Concepts
//!
//! - **Detection**: Each document's type is recognized from title rows and column structure
//! - **Line Items**: Parsers turn rows into `(key, period, value)` facts with their source row
//! - **Canonical Model**: Facts merged across documents, rescaled to base units, one value per key and period
//! - **Analyses**: Independent dimensions (balance, profitability, cashflow, receivables, payables, deals)
//! - **Score**: Configured metrics normalized onto [0, 1], weighted and banded into a risk class
//!
//! Problems with individual documents or rows never abort a run. They are
//! reported as diagnostics next to whatever could still be computed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_health_engine::*;
//!
//! let documents = vec![
//!     InputDocument::new(
//!         "pnl.csv",
//!         "Income Statement\nLine item,2023-03\nRevenue,1000\nExpenses,600\n",
//!     ),
//!     InputDocument::new(
//!         "balance.csv",
//!         "Balance Sheet\nLine item,2023-03\nTotal assets,1000\nTotal liabilities,600\nTotal equity,400\n",
//!     ),
//! ];
//!
//! let report = analyze_documents(&documents, &AnalysisConfig::default()).unwrap();
//! println!("{:?}", report.score.map(|s| s.band));
//! ```

pub mod analysis;
pub mod balancer;
pub mod canonical;
pub mod chart_of_accounts;
pub mod config;
pub mod detector;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod parsers;
pub mod period;
pub mod schema;
pub mod scoring;
pub mod utils;

pub use analysis::{AnalysisEngine, AnalysisSet};
pub use balancer::{aggregate, aggregate_term, BalanceChecker, SideTotals};
pub use canonical::{CanonicalModel, CanonicalModelBuilder, MergeConflict, Statement};
pub use chart_of_accounts::{AccountEntry, ChartOfAccounts, Section};
pub use config::{
    AccountRange, AgingConfig, AnalysisConfig, BandThreshold, CashflowConfig, DealConfig,
    NormalizationCurve,
    ScoringConfig, ScoringRule, UnitScaleMarker,
};
pub use detector::{detect, Detection, SignalStrength};
pub use error::{FinancialHealthError, Result};
pub use ingestion::*;
pub use loader::{load_document, read_table, RawDocument, RawRow, RawTable};
pub use parsers::{parse_document, DocumentParser, LineItemParser, ParsedDocument};
pub use period::Period;
pub use schema::*;
pub use scoring::score;

use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthReport {
    pub model: CanonicalModel,
    pub analyses: AnalysisSet,
    #[schemars(description = "Absent when no configured scoring metric could be computed")]
    pub score: Option<Score>,
    #[schemars(description = "Document, row, merge, analysis and scoring problems, in pipeline order")]
    pub diagnostics: Vec<Diagnostic>,
}

impl HealthReport {
    /// JSON Schema of the report, for consumers that render or store it.
    pub fn schema_as_json() -> Result<String> {
        let schema = schemars::schema_for!(HealthReport);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

pub struct FinancialHealthProcessor;

impl FinancialHealthProcessor {
    /// Runs detection, parsing, merging, analysis and scoring.
    ///
    /// Only an invalid configuration is an error. Every other problem ends up
    /// in `HealthReport::diagnostics`.
    pub fn process(documents: &[InputDocument], config: &AnalysisConfig) -> Result<HealthReport> {
        config.validate()?;

        info!("Processing {} documents", documents.len());
        let (parsed, mut diagnostics) = ingest_all(documents).into_parts();
        debug!(
            "{} of {} documents recognized: {:?}",
            parsed.len(),
            documents.len(),
            parsed
                .iter()
                .map(|d| (d.name.as_str(), d.document_type))
                .collect::<Vec<_>>()
        );

        Self::process_parsed(&parsed, config).map(|mut report| {
            diagnostics.append(&mut report.diagnostics);
            report.diagnostics = diagnostics;
            report
        })
    }

    /// Merges, analyzes and scores documents that were already ingested.
    /// Row diagnostics of `documents` are not repeated in the report.
    pub fn process_parsed(
        documents: &[ParsedDocument],
        config: &AnalysisConfig,
    ) -> Result<HealthReport> {
        config.validate()?;

        let (model, mut diagnostics) = CanonicalModelBuilder::new(config).build(documents).into_parts();
        let (analyses, analysis_diagnostics) = AnalysisEngine::new(config).run(&model).into_parts();
        diagnostics.extend(analysis_diagnostics);

        let score = match scoring::score(&analyses, &config.scoring) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!("No score computed: {}", e);
                let mut diagnostic = Diagnostic::from_error(&e);
                diagnostic.severity = Severity::Warning;
                diagnostics.push(diagnostic);
                None
            }
        };

        Ok(HealthReport {
            model,
            analyses,
            score,
            diagnostics,
        })
    }
}

pub fn analyze_documents(documents: &[InputDocument], config: &AnalysisConfig) -> Result<HealthReport> {
    FinancialHealthProcessor::process(documents, config)
}
