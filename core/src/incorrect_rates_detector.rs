//! Incorrect-rates detector.
//!
//! expected_rate = base_rate × tier_multiplier
//! variance      = |expected_rate − avg_bill_amount|
//! variance_pct  = variance / expected_rate × 100   (0 if expected_rate ≤ 0)
//!
//! RULE: a candidate must clear BOTH the percentage and the absolute
//! variance floor.

use crate::{
    config::{DetectionConfig, IncorrectRatesRule},
    detection::{evidence, Detection, Finding, LeakageType, RunContext},
    detector::{Detector, DetectorOutput},
    error::LeakageResult,
    joined::{JoinedRecord, JoinedTable, SourceKind},
    rules::{Confidence, SeverityTable},
};

/// Rate comparison for one contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateVariance {
    pub expected_rate: f64,
    pub variance:      f64,
    pub variance_pct:  f64,
}

impl RateVariance {
    pub fn of(record: &JoinedRecord) -> Self {
        let expected_rate = record.base_rate * record.tier_multiplier;
        let variance = (expected_rate - record.avg_bill_amount).abs();
        let variance_pct = if expected_rate > 0.0 {
            variance / expected_rate * 100.0
        } else {
            0.0
        };
        Self { expected_rate, variance, variance_pct }
    }
}

pub struct IncorrectRatesDetector {
    rule:      IncorrectRatesRule,
    severity:  SeverityTable,
    threshold: f64,
}

impl IncorrectRatesDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            rule:      config.incorrect_rates.clone(),
            severity:  config.severity_tables.incorrect_rates.clone(),
            threshold: config.confidence_threshold,
        }
    }

    fn is_candidate(&self, v: &RateVariance) -> bool {
        v.variance_pct > self.rule.min_variance_pct && v.variance > self.rule.min_variance_amount
    }

    fn evaluate(&self, record: &JoinedRecord, v: RateVariance) -> Finding {
        let loss = v.variance * f64::from(record.bill_count);
        let confidence = Confidence::base(self.rule.base_confidence)
            .bonus_if(record.has_rate_error, self.rule.rate_error_bonus)
            .bonus_if(v.variance_pct > self.rule.high_variance_pct, self.rule.high_variance_bonus);

        let mut context = Vec::new();
        if record.is_promotional {
            context.push("Contract has promotional rates".to_string());
            if let Some(expiry) = record.promo_expiry_date {
                context.push(format!("Promotion expired: {expiry}"));
            }
        }
        if let Some(tier) = record.tier {
            context.push(format!("Customer tier: {tier}"));
        }
        if record.has_rate_error {
            context.push("System flagged rate errors detected".to_string());
        }

        let action = if record.has_rate_error {
            "System-detected rate error: Review and correct rate configuration immediately."
        } else {
            "Manual review required: Verify rate calculation and apply corrections if confirmed."
        };

        Finding {
            leakage_type:       LeakageType::IncorrectRates,
            severity:           self.severity.classify(loss),
            confidence:         confidence.value(),
            estimated_loss:     loss,
            description:        format!(
                "Incorrect billing rate detected. Expected: ${:.2}, Applied: ${:.2}. Variance: {:.1}%. Estimated impact: ${:.2}",
                v.expected_rate, record.avg_bill_amount, v.variance_pct, loss,
            ),
            evidence:           evidence([
                ("expected_rate", v.expected_rate.into()),
                ("actual_avg_rate", record.avg_bill_amount.into()),
                ("variance_percentage", v.variance_pct.into()),
                ("variance_amount", v.variance.into()),
            ]),
            context_factors:    context,
            recommended_action: action.to_string(),
        }
    }
}

impl Detector for IncorrectRatesDetector {
    fn name(&self) -> &'static str {
        "incorrect_rates"
    }

    fn leakage_type(&self) -> LeakageType {
        LeakageType::IncorrectRates
    }

    fn required_sources(&self) -> &'static [SourceKind] {
        &[SourceKind::Billing]
    }

    fn detect(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<DetectorOutput> {
        let candidates: Vec<(&JoinedRecord, RateVariance)> = table
            .iter()
            .map(|r| (r, RateVariance::of(r)))
            .filter(|(_, v)| self.is_candidate(v))
            .collect();
        log::info!("incorrect_rates: {} candidates", candidates.len());

        let detections: Vec<Detection> = candidates
            .into_iter()
            .map(|(record, v)| (record, self.evaluate(record, v)))
            .filter(|(record, finding)| {
                let keep = finding.confidence >= self.threshold;
                if !keep {
                    log::debug!("incorrect_rates: {} below threshold", record.contract_id);
                }
                keep
            })
            .map(|(record, finding)| Detection::stamp(record, finding, ctx))
            .collect();

        log::info!("incorrect_rates: {} detections", detections.len());
        Ok(DetectorOutput::found(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Severity;
    use crate::test_support::{context, record, table};

    fn scenario_b() -> JoinedRecord {
        let mut r = record("CNT-B");
        r.base_rate = 50.0;
        r.tier_multiplier = 1.2;
        r.avg_bill_amount = 40.0;
        r.bill_count = 3;
        r.total_billed = 120.0;
        r
    }

    #[test]
    fn variance_follows_formula() {
        let v = RateVariance::of(&scenario_b());
        assert!((v.expected_rate - 60.0).abs() < 1e-9);
        assert!((v.variance - 20.0).abs() < 1e-9);
        assert!((v.variance_pct - 33.333_333).abs() < 1e-3);
    }

    #[test]
    fn scenario_b_is_flagged_at_point_seven() {
        let det = IncorrectRatesDetector::new(&DetectionConfig::default());
        let out = det.detect(&table(vec![scenario_b()]), &context()).unwrap();
        assert_eq!(out.detections.len(), 1);
        let d = &out.detections[0];
        assert!((d.estimated_loss - 60.0).abs() < 1e-9);
        assert!((d.confidence - 0.7).abs() < 1e-9);
        assert_eq!(d.severity, Severity::Medium);
    }

    #[test]
    fn both_floors_are_required() {
        let det = IncorrectRatesDetector::new(&DetectionConfig::default());

        // 50% off but only 5 currency units.
        let small = RateVariance { expected_rate: 10.0, variance: 5.0, variance_pct: 50.0 };
        assert!(!det.is_candidate(&small));

        // 15 units but only 3%.
        let shallow = RateVariance { expected_rate: 500.0, variance: 15.0, variance_pct: 3.0 };
        assert!(!det.is_candidate(&shallow));
    }

    #[test]
    fn zero_expected_rate_is_never_a_candidate() {
        let mut r = record("CNT-0");
        r.avg_bill_amount = 500.0;
        let v = RateVariance::of(&r);
        assert_eq!(v.variance_pct, 0.0);
    }
}
