use crate::balancer::BalanceChecker;
use crate::config::AnalysisConfig;
use crate::error::FinancialHealthError;
use crate::parsers::ParsedDocument;
use crate::period::Period;
use crate::schema::{
    BalanceMismatch, Diagnostic, DiagnosticKind, DocumentType, LineItem, LineKey, Partial,
    SourceMetadata,
};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One statement kind, keyed by line key then period. Built once per request
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Statement {
    document_type: DocumentType,
    #[schemars(description = "Line items keyed by line key, then by period")]
    #[serde(with = "keyed_items")]
    #[schemars(with = "Vec<KeyedSeries>")]
    items: BTreeMap<LineKey, BTreeMap<Period, LineItem>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    balance_mismatches: Vec<BalanceMismatch>,
}

impl Statement {
    pub(crate) fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            items: BTreeMap::new(),
            balance_mismatches: Vec::new(),
        }
    }

    /// Inserts `item` unless its `(key, period)` slot is taken, in which case
    /// the item already there is returned and nothing changes.
    pub(crate) fn insert(&mut self, item: LineItem) -> Option<&LineItem> {
        let slots = self.items.entry(item.key.clone()).or_default();
        match slots.entry(item.period) {
            std::collections::btree_map::Entry::Occupied(existing) => Some(existing.into_mut()),
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(item);
                None
            }
        }
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn get(&self, key: &LineKey, period: &Period) -> Option<&LineItem> {
        self.items.get(key).and_then(|p| p.get(period))
    }

    /// Value of a plain account line, one without a counterparty.
    pub fn value(&self, code: &str, period: &Period) -> Option<f64> {
        self.get(&LineKey::account(code), period).map(|i| i.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &LineKey> {
        self.items.keys()
    }

    /// Periods of one key, in timeline order.
    pub fn series(&self, key: &LineKey) -> impl Iterator<Item = &LineItem> {
        self.items.get(key).into_iter().flat_map(|p| p.values())
    }

    pub fn items(&self) -> impl Iterator<Item = &LineItem> {
        self.items.values().flat_map(|p| p.values())
    }

    pub fn items_for_period<'a>(&'a self, period: &'a Period) -> impl Iterator<Item = &'a LineItem> {
        self.items.values().filter_map(move |p| p.get(period))
    }

    pub fn periods(&self) -> BTreeSet<Period> {
        self.items.values().flat_map(|p| p.keys().copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn balance_mismatches(&self) -> &[BalanceMismatch] {
        &self.balance_mismatches
    }
}

/// Serialized form of one statement key. Line keys are structured, so a
/// statement is written as a list of these rather than a JSON object.
#[derive(Serialize, Deserialize, JsonSchema)]
struct KeyedSeries {
    key: LineKey,
    periods: BTreeMap<Period, LineItem>,
}

mod keyed_items {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        items: &BTreeMap<LineKey, BTreeMap<Period, LineItem>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|(key, periods)| KeyedSeries {
            key: key.clone(),
            periods: periods.clone(),
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<BTreeMap<LineKey, BTreeMap<Period, LineItem>>, D::Error> {
        let entries = Vec::<KeyedSeries>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.key, e.periods)).collect())
    }
}

/// Two documents of the same type disagreeing on one `(key, period)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MergeConflict {
    pub document_type: DocumentType,
    pub key: String,
    pub period: Period,
    pub first: f64,
    pub first_source: SourceMetadata,
    pub second: f64,
    pub second_source: SourceMetadata,
}

impl MergeConflict {
    pub fn to_error(&self) -> FinancialHealthError {
        let describe = |s: &SourceMetadata| format!("{} row {}", s.document_name, s.row);
        FinancialHealthError::PeriodConflict {
            document_type: self.document_type.to_string(),
            key: self.key.clone(),
            period: self.period.to_string(),
            first: self.first,
            first_source: describe(&self.first_source),
            second: self.second,
            second_source: describe(&self.second_source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalModel {
    pub statements: BTreeMap<DocumentType, Statement>,
    #[schemars(description = "Union of all reported periods, in chronological order")]
    pub timeline: Vec<Period>,
    pub conflicts: Vec<MergeConflict>,
    #[schemars(description = "Statement kinds left out of the model because of conflicts")]
    pub withheld: Vec<DocumentType>,
}

impl CanonicalModel {
    pub fn statement(&self, document_type: DocumentType) -> Option<&Statement> {
        self.statements.get(&document_type)
    }

    /// Last period of the timeline.
    pub fn as_of(&self) -> Option<Period> {
        self.timeline.last().copied()
    }

    pub fn is_withheld(&self, document_type: DocumentType) -> bool {
        self.withheld.contains(&document_type)
    }
}

pub struct CanonicalModelBuilder<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> CanonicalModelBuilder<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Rescales each document to base units and merges them. The result does
    /// not depend on the order of `documents`.
    pub fn build(&self, documents: &[ParsedDocument]) -> Partial<CanonicalModel> {
        let mut ordered: Vec<&ParsedDocument> = documents.iter().collect();
        ordered.sort_by(|a, b| (a.document_type, &a.name).cmp(&(b.document_type, &b.name)));

        let mut grouped: BTreeMap<DocumentType, Vec<LineItem>> = BTreeMap::new();
        for document in ordered {
            let scale = self.unit_scale(&document.unit_hints);
            if scale != 1.0 {
                debug!("Rescaling '{}' by {}", document.name, scale);
            }
            grouped
                .entry(document.document_type)
                .or_default()
                .extend(document.items.iter().map(|i| i.rescaled(scale)));
        }

        self.build_from_line_items(grouped)
    }

    /// Merges already-scaled line items grouped by document type.
    pub fn build_from_line_items(
        &self,
        items: BTreeMap<DocumentType, Vec<LineItem>>,
    ) -> Partial<CanonicalModel> {
        let mut diagnostics = Vec::new();
        let mut statements = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut withheld = Vec::new();
        let mut timeline: BTreeSet<Period> = BTreeSet::new();

        for (document_type, mut lines) in items {
            lines.sort_by(|a, b| {
                (&a.source.document_name, a.source.row, &a.key, a.period).cmp(&(
                    &b.source.document_name,
                    b.source.row,
                    &b.key,
                    b.period,
                ))
            });
            timeline.extend(lines.iter().map(|l| l.period));

            let mut statement = Statement::new(document_type);
            let mut statement_conflicts = Vec::new();
            let mut deduplicated = 0usize;

            for line in lines {
                let (key, period, value, source) =
                    (line.key.to_string(), line.period, line.value, line.source.clone());
                let Some(existing) = statement.insert(line) else {
                    continue;
                };
                if (existing.value - value).abs() <= self.config.conflict_tolerance {
                    deduplicated += 1;
                    continue;
                }
                statement_conflicts.push(MergeConflict {
                    document_type,
                    key,
                    period,
                    first: existing.value,
                    first_source: existing.source.clone(),
                    second: value,
                    second_source: source,
                });
            }

            if deduplicated > 0 {
                debug!(
                    "Deduplicated {} identical {} values across documents",
                    deduplicated, document_type
                );
            }

            if !statement_conflicts.is_empty() {
                warn!(
                    "Withholding {}: {} conflicting values across documents",
                    document_type,
                    statement_conflicts.len()
                );
                for conflict in &statement_conflicts {
                    diagnostics.push(Diagnostic::from_error(&conflict.to_error()));
                }
                conflicts.extend(statement_conflicts);
                withheld.push(document_type);
                continue;
            }

            if document_type == DocumentType::BalanceSheet {
                let mismatches = BalanceChecker::new(self.config.balance_tolerance).check(&statement);
                for mismatch in &mismatches {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::BalanceMismatch,
                        format!(
                            "balance sheet at {}: assets {} vs liabilities {} + equity {} (difference {})",
                            mismatch.period,
                            mismatch.assets,
                            mismatch.liabilities,
                            mismatch.equity,
                            mismatch.difference
                        ),
                    ));
                }
                statement.balance_mismatches = mismatches;
            }

            debug!("Built {} with {} line items", document_type, statement.len());
            statements.insert(document_type, statement);
        }

        let timeline: Vec<Period> = timeline.into_iter().collect();
        info!(
            "Canonical model: {} statements, {} periods, {} conflicts",
            statements.len(),
            timeline.len(),
            conflicts.len()
        );

        Partial::with_diagnostics(
            CanonicalModel {
                statements,
                timeline,
                conflicts,
                withheld,
            },
            diagnostics,
        )
    }

    /// Factor of the longest configured unit marker found in `hints`, or 1.
    pub fn unit_scale(&self, hints: &[String]) -> f64 {
        let hints: Vec<String> = hints.iter().map(|h| h.to_lowercase()).collect();
        self.config
            .unit_scale_markers
            .iter()
            .filter(|m| {
                let marker = m.marker.to_lowercase();
                hints.iter().any(|h| h.contains(&marker))
            })
            .max_by_key(|m| m.marker.chars().count())
            .map(|m| m.factor)
            .unwrap_or(1.0)
    }
}
