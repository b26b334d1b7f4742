//! Statistical anomaly detector.
//!
//! ORDER:
//!   1. Slice the configured feature columns into a matrix.
//!   2. Standardise with this batch's statistics only.
//!   3. Fit and score with the outlier model.
//!   4. Flag rows the model calls outliers AND whose score is below the
//!      cutoff. Both conditions are required.
//!   5. Emit flagged rows whose |revenue_variance| reaches the loss floor.
//!
//! Fewer than `min_rows` rows is a non-fatal InsufficientData condition.
//! Severity reads the missing-charges table.

use crate::{
    config::{AnomalyConfig, DetectionConfig},
    detection::{evidence, Detection, EvidenceValue, Finding, LeakageType, RunContext},
    detector::{Detector, DetectorCondition, DetectorOutput},
    error::{LeakageError, LeakageResult},
    joined::{JoinedRecord, JoinedTable},
    outlier::{standardize, IsolationForest, OutlierModel},
    rules::SeverityTable,
};

/// Findings from this detector are not filtered by `confidence_threshold`.
/// Confidence is `min(max_confidence, |score| × confidence_scale)` instead,
/// so with the defaults it never exceeds 0.8 and may sit below the 0.7
/// threshold the rule detectors apply.
pub struct AnomalyDetector {
    config:   AnomalyConfig,
    severity: SeverityTable,
    model:    Box<dyn OutlierModel>,
}

impl AnomalyDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        let a = &config.anomaly;
        let forest = IsolationForest {
            n_trees:       a.n_trees,
            max_samples:   a.max_samples,
            contamination: a.contamination,
            seed:          a.seed,
        };
        Self::with_model(config, Box::new(forest))
    }

    /// Swap in a different outlier model.
    pub fn with_model(config: &DetectionConfig, model: Box<dyn OutlierModel>) -> Self {
        Self {
            config:   config.anomaly.clone(),
            severity: config.severity_tables.missing_charges.clone(),
            model,
        }
    }

    fn feature_matrix(&self, table: &JoinedTable) -> LeakageResult<Vec<Vec<f64>>> {
        table
            .iter()
            .map(|record| {
                self.config
                    .features
                    .iter()
                    .map(|column| {
                        record
                            .numeric(column)
                            .map(|v| if v.is_finite() { v } else { 0.0 })
                            .ok_or_else(|| LeakageError::MissingColumn {
                                detector: "statistical_anomaly",
                                column:   column.clone(),
                            })
                    })
                    .collect::<LeakageResult<Vec<f64>>>()
            })
            .collect()
    }

    fn evaluate(&self, record: &JoinedRecord, score: f64) -> Finding {
        let variance = record.features.revenue_variance;
        let loss = variance.abs();
        let confidence =
            (score.abs() * self.config.confidence_scale).min(self.config.max_confidence);

        Finding {
            leakage_type:       LeakageType::StatisticalAnomaly,
            severity:           self.severity.classify(loss),
            confidence,
            estimated_loss:     loss,
            description:        format!(
                "Statistical anomaly detected in billing pattern with score {score:.3}. Potential revenue impact: ${loss:.2}"
            ),
            evidence:           evidence([
                ("anomaly_score", score.into()),
                ("features_analyzed", EvidenceValue::List(self.config.features.clone())),
                ("revenue_variance", variance.into()),
            ]),
            context_factors:    vec![
                format!("Anomaly score: {score:.3}"),
                format!("Risk score: {}", record.features.leakage_risk_score),
            ],
            recommended_action: "Investigate anomalous billing pattern and verify calculations".to_string(),
        }
    }
}

impl Detector for AnomalyDetector {
    fn name(&self) -> &'static str {
        "statistical_anomaly"
    }

    fn leakage_type(&self) -> LeakageType {
        LeakageType::StatisticalAnomaly
    }

    fn detect(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<DetectorOutput> {
        if table.len() < self.config.min_rows {
            log::warn!(
                "statistical_anomaly: insufficient data ({} rows, need {})",
                table.len(),
                self.config.min_rows
            );
            return Ok(DetectorOutput::empty_with(DetectorCondition::InsufficientData {
                detector: self.name().to_string(),
                rows:     table.len(),
                required: self.config.min_rows,
            }));
        }

        let matrix = standardize(&self.feature_matrix(table)?);
        let scored = self.model.fit_and_score(&matrix)?;
        if scored.scores.len() != table.len() || scored.is_outlier.len() != table.len() {
            return Err(LeakageError::Model(format!(
                "{} returned {} scores and {} outlier flags for {} rows",
                self.model.name(),
                scored.scores.len(),
                scored.is_outlier.len(),
                table.len()
            )));
        }

        let flagged: Vec<(&JoinedRecord, f64)> = table
            .iter()
            .zip(scored.is_outlier.iter().zip(&scored.scores))
            .filter(|(_, (outlier, score))| **outlier && **score < self.config.score_cutoff)
            .map(|(record, (_, score))| (record, *score))
            .collect();
        log::info!("statistical_anomaly: {} flagged rows", flagged.len());

        let detections: Vec<Detection> = flagged
            .into_iter()
            .filter(|(record, _)| record.features.revenue_variance.abs() >= self.config.min_loss)
            .map(|(record, score)| Detection::stamp(record, self.evaluate(record, score), ctx))
            .collect();

        log::info!("statistical_anomaly: {} detections", detections.len());
        Ok(DetectorOutput::found(detections))
    }
}
