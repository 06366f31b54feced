use crate::analysis::AnalysisSet;
use crate::config::{ScoringConfig, ScoringRule};
use crate::error::{FinancialHealthError, Result};
use crate::schema::{Score, ScoreComponent};
use log::{debug, info};
use std::collections::BTreeMap;

/// The headline value of a rule's metric, if its dimension ran and the metric
/// is defined.
fn rule_value(analyses: &AnalysisSet, rule: &ScoringRule) -> Option<f64> {
    analyses
        .get(rule.dimension)
        .and_then(|result| result.headline(&rule.metric))
        .and_then(|value| value.value())
}

/// Weighted score on a 0-100 scale with its risk band.
///
/// Weights of rules whose metric is unavailable are redistributed over the
/// present rules in proportion to their own weights, so the attainable
/// maximum stays the configured total weight.
pub fn score(analyses: &AnalysisSet, config: &ScoringConfig) -> Result<Score> {
    let mut present: Vec<(&ScoringRule, f64)> = Vec::new();
    let mut missing = Vec::new();
    for rule in &config.rules {
        match rule_value(analyses, rule) {
            Some(value) => present.push((rule, value)),
            None => {
                debug!("Scoring component {} has no value", rule.component_name());
                missing.push(rule.component_name());
            }
        }
    }

    let present_weight: f64 = present.iter().map(|(rule, _)| rule.weight).sum();
    if present.is_empty() || present_weight <= 0.0 {
        return Err(FinancialHealthError::NoScorableMetrics);
    }
    let scale = config.total_weight() / present_weight;

    let mut components = BTreeMap::new();
    for (rule, raw_value) in present {
        let normalized = rule.curve.normalize(raw_value);
        let effective_weight = rule.weight * scale;
        components.insert(
            rule.component_name(),
            ScoreComponent {
                dimension: rule.dimension,
                metric: rule.metric.clone(),
                raw_value,
                normalized,
                effective_weight,
                weighted_contribution: effective_weight * normalized,
            },
        );
    }

    let total = components
        .values()
        .map(|c| c.weighted_contribution)
        .sum::<f64>()
        .clamp(0.0, 100.0);
    let band = config.band_for(total);
    info!(
        "Score {:.1} ({:?}) from {} components, {} missing",
        total,
        band,
        components.len(),
        missing.len()
    );

    Ok(Score {
        components,
        missing,
        total,
        band,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BandThreshold, NormalizationCurve};
    use crate::period::Period;
    use crate::schema::{AnalysisDimension, AnalysisResult, MetricValue, RiskBand, UndefinedReason};

    fn rule(dimension: AnalysisDimension, metric: &str, weight: f64) -> ScoringRule {
        ScoringRule {
            dimension,
            metric: metric.to_string(),
            weight,
            curve: NormalizationCurve::new(0.0, 1.0),
        }
    }

    fn config(rules: Vec<ScoringRule>) -> ScoringConfig {
        ScoringConfig {
            rules,
            ..ScoringConfig::default()
        }
    }

    fn analyses(values: &[(AnalysisDimension, &str, MetricValue)]) -> AnalysisSet {
        let mut set = AnalysisSet::default();
        for (dimension, metric, value) in values {
            let mut result = set
                .get(*dimension)
                .cloned()
                .unwrap_or_else(|| AnalysisResult::new(*dimension));
            result.set(Period::year(2023), metric, *value);
            set.insert(result);
        }
        set
    }

    #[test]
    fn test_missing_weight_is_redistributed() {
        let config = config(vec![
            rule(AnalysisDimension::Balance, "current_ratio", 50.0),
            rule(AnalysisDimension::Profitability, "net_margin", 50.0),
        ]);
        let set = analyses(&[(AnalysisDimension::Balance, "current_ratio", MetricValue::Defined(0.5))]);

        let score = score(&set, &config).unwrap();
        assert_eq!(score.missing, vec!["profitability.net_margin"]);
        let component = &score.components["balance.current_ratio"];
        assert_eq!(component.effective_weight, 100.0);
        assert_eq!(score.total, 50.0);
        assert_eq!(score.band, RiskBand::MediumRisk);
    }

    #[test]
    fn test_undefined_metric_counts_as_missing() {
        let config = config(vec![
            rule(AnalysisDimension::Balance, "current_ratio", 50.0),
            rule(AnalysisDimension::Balance, "quick_ratio", 50.0),
        ]);
        let set = analyses(&[
            (AnalysisDimension::Balance, "current_ratio", MetricValue::Defined(1.0)),
            (
                AnalysisDimension::Balance,
                "quick_ratio",
                MetricValue::Undefined(UndefinedReason::ZeroDenominator),
            ),
        ]);
        let score = score(&set, &config).unwrap();
        assert_eq!(score.present(), vec!["balance.current_ratio"]);
        assert_eq!(score.total, 100.0);
        assert_eq!(score.band, RiskBand::LowRisk);
    }

    #[test]
    fn test_lower_is_better_curve() {
        let mut dso = rule(AnalysisDimension::Receivables, "days_outstanding", 100.0);
        dso.curve = NormalizationCurve::new(120.0, 30.0);
        let config = config(vec![dso]);

        let at = |days: f64| {
            let set = analyses(&[(
                AnalysisDimension::Receivables,
                "days_outstanding",
                MetricValue::Defined(days),
            )]);
            score(&set, &config).unwrap()
        };
        assert_eq!(at(10.0).total, 100.0);
        assert_eq!(at(75.0).total, 50.0);
        assert_eq!(at(200.0).total, 0.0);
        assert_eq!(at(200.0).band, RiskBand::HighRisk);
    }

    #[test]
    fn test_nothing_to_score() {
        let config = ScoringConfig::default();
        let err = score(&AnalysisSet::default(), &config).unwrap_err();
        assert!(matches!(err, FinancialHealthError::NoScorableMetrics));
    }

    #[test]
    fn test_bands_cover_the_whole_scale() {
        let config = ScoringConfig {
            bands: vec![
                BandThreshold { lower: 0.0, band: RiskBand::HighRisk },
                BandThreshold { lower: 50.0, band: RiskBand::LowRisk },
            ],
            ..ScoringConfig::default()
        };
        assert_eq!(config.band_for(0.0), RiskBand::HighRisk);
        assert_eq!(config.band_for(49.99), RiskBand::HighRisk);
        assert_eq!(config.band_for(50.0), RiskBand::LowRisk);
        assert_eq!(config.band_for(100.0), RiskBand::LowRisk);
    }
}
