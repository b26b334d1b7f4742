use crate::{
    error::{LeakageError, LeakageResult},
    rules::SeverityTable,
};
use serde::{Deserialize, Serialize};

/// Feature columns scored by the anomaly model, in matrix order.
pub const DEFAULT_ANOMALY_FEATURES: [&str; 6] = [
    "contracted_rate",
    "total_billed",
    "avg_bill_amount",
    "bill_count",
    "revenue_variance_pct",
    "leakage_risk_score",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingChargesRule {
    pub base_confidence: f64,
    /// Bonus when the customer is Active.
    pub active_bonus:    f64,
    /// Bonus when the contract recorded any usage.
    pub usage_bonus:     f64,
    /// Bonus when the contract was never billed.
    pub no_bills_bonus:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncorrectRatesRule {
    /// Both the percentage and the absolute variance must exceed these.
    pub min_variance_pct:    f64,
    pub min_variance_amount: f64,
    pub base_confidence:     f64,
    pub rate_error_bonus:    f64,
    pub high_variance_pct:   f64,
    pub high_variance_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMismatchRule {
    pub min_variance_pct:    f64,
    pub min_variance_amount: f64,
    pub base_confidence:     f64,
    pub high_variance_pct:   f64,
    pub high_variance_bonus: f64,
    /// Bonus when usage exceeded the included allotment.
    pub overage_bonus:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateEntryRule {
    /// Billing error tag marking a duplicated bill.
    pub error_tag:  String,
    /// Fixed confidence. Duplicate findings are never threshold-gated.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub features:         Vec<String>,
    pub min_rows:         usize,
    /// Expected outlier fraction, in (0, 0.5].
    pub contamination:    f64,
    /// A row must also score below this to be flagged.
    pub score_cutoff:     f64,
    pub min_loss:         f64,
    pub max_confidence:   f64,
    pub confidence_scale: f64,
    pub n_trees:          usize,
    pub max_samples:      usize,
    pub seed:             u64,
}

/// One severity table per leakage type. Statistical anomalies read the
/// missing-charges table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityTables {
    pub missing_charges:   SeverityTable,
    pub incorrect_rates:   SeverityTable,
    pub usage_mismatches:  SeverityTable,
    pub duplicate_entries: SeverityTable,
}

impl Default for SeverityTables {
    fn default() -> Self {
        Self {
            missing_charges:   SeverityTable::missing_charges(),
            incorrect_rates:   SeverityTable::incorrect_rates(),
            usage_mismatches:  SeverityTable::usage_mismatches(),
            duplicate_entries: SeverityTable::duplicate_entries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence_threshold: f64,
    pub missing_charges:      MissingChargesRule,
    pub incorrect_rates:      IncorrectRatesRule,
    pub usage_mismatches:     UsageMismatchRule,
    pub duplicate_entries:    DuplicateEntryRule,
    pub severity_tables:      SeverityTables,
    pub anomaly:              AnomalyConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            missing_charges: MissingChargesRule {
                base_confidence: 0.5,
                active_bonus:    0.2,
                usage_bonus:     0.2,
                no_bills_bonus:  0.3,
            },
            incorrect_rates: IncorrectRatesRule {
                min_variance_pct:    5.0,
                min_variance_amount: 10.0,
                base_confidence:     0.6,
                rate_error_bonus:    0.3,
                high_variance_pct:   20.0,
                high_variance_bonus: 0.1,
            },
            usage_mismatches: UsageMismatchRule {
                min_variance_pct:    15.0,
                min_variance_amount: 5.0,
                base_confidence:     0.6,
                high_variance_pct:   50.0,
                high_variance_bonus: 0.2,
                overage_bonus:       0.1,
            },
            duplicate_entries: DuplicateEntryRule {
                error_tag:  "DUPLICATE_ENTRY".into(),
                confidence: 0.9,
            },
            severity_tables: SeverityTables::default(),
            anomaly: AnomalyConfig {
                features:         DEFAULT_ANOMALY_FEATURES.iter().map(|s| s.to_string()).collect(),
                min_rows:         10,
                contamination:    0.1,
                score_cutoff:     -0.1,
                min_loss:         10.0,
                max_confidence:   0.8,
                confidence_scale: 2.0,
                n_trees:          100,
                max_samples:      256,
                seed:             42,
            },
        }
    }
}

impl DetectionConfig {
    /// Load from the data/ directory.
    /// In tests, use DetectionConfig::default().
    pub fn load(data_dir: &str) -> LeakageResult<Self> {
        let path = format!("{data_dir}/detection/detection_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: DetectionConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::debug!("Loaded detection config from {path}");
        Ok(config)
    }

    /// Range checks that serde cannot express. Severity tables validate
    /// themselves on deserialisation.
    pub fn validate(&self) -> LeakageResult<()> {
        let unit = |field: &'static str, v: f64| -> LeakageResult<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(LeakageError::InvalidValue { field, value: v.to_string() })
            }
        };
        unit("confidence_threshold", self.confidence_threshold)?;
        unit("duplicate_entries.confidence", self.duplicate_entries.confidence)?;
        unit("anomaly.max_confidence", self.anomaly.max_confidence)?;

        let a = &self.anomaly;
        if !(a.contamination > 0.0 && a.contamination <= 0.5) {
            return Err(LeakageError::InvalidValue {
                field: "anomaly.contamination",
                value: a.contamination.to_string(),
            });
        }
        if a.n_trees == 0 || a.max_samples < 2 {
            return Err(LeakageError::InvalidValue {
                field: "anomaly.n_trees/max_samples",
                value: format!("{}/{}", a.n_trees, a.max_samples),
            });
        }
        if a.features.is_empty() {
            return Err(LeakageError::InvalidValue {
                field: "anomaly.features",
                value: "[]".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_config_matches_defaults() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");
        let loaded = DetectionConfig::load(dir).unwrap();
        assert_eq!(loaded, DetectionConfig::default());
    }

    #[test]
    fn defaults_validate() {
        DetectionConfig::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut cfg = DetectionConfig::default();
        cfg.anomaly.contamination = 0.0;
        assert!(matches!(cfg.validate(), Err(LeakageError::InvalidValue { .. })));

        let mut cfg = DetectionConfig::default();
        cfg.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(DetectionConfig::load("/definitely/not/here").is_err());
    }
}
