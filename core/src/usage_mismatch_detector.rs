//! Usage-mismatch detector. Usage-based contracts only.
//!
//! overage_usage    = max(0, total_usage − included_usage)
//! expected_overage = overage_usage × overage_rate
//! overage_variance = expected_overage − overage_charge
//! variance_pct     = |overage_variance| / expected_overage × 100  (0 if expected ≤ 0)
//!
//! Candidate iff variance_pct and |overage_variance| both exceed their floors.

use crate::{
    config::{DetectionConfig, UsageMismatchRule},
    detection::{evidence, Detection, Finding, LeakageType, RunContext},
    detector::{Detector, DetectorOutput},
    error::LeakageResult,
    joined::{JoinedRecord, JoinedTable, SourceKind},
    rules::{Confidence, SeverityTable},
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct OverageVariance {
    overage_usage:    f64,
    expected_revenue: f64,
    variance:         f64,
    variance_pct:     f64,
}

impl OverageVariance {
    fn of(record: &JoinedRecord) -> Self {
        let overage_usage = (record.total_usage - record.included_usage).max(0.0);
        let expected_revenue = overage_usage * record.overage_rate;
        let variance = expected_revenue - record.overage_charge;
        let variance_pct = if expected_revenue > 0.0 {
            variance.abs() / expected_revenue * 100.0
        } else {
            0.0
        };
        Self { overage_usage, expected_revenue, variance, variance_pct }
    }
}

pub struct UsageMismatchDetector {
    rule:      UsageMismatchRule,
    severity:  SeverityTable,
    threshold: f64,
}

impl UsageMismatchDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            rule:      config.usage_mismatches.clone(),
            severity:  config.severity_tables.usage_mismatches.clone(),
            threshold: config.confidence_threshold,
        }
    }

    fn is_candidate(&self, v: &OverageVariance) -> bool {
        v.variance_pct > self.rule.min_variance_pct && v.variance.abs() > self.rule.min_variance_amount
    }

    fn evaluate(&self, record: &JoinedRecord, v: OverageVariance) -> Finding {
        let loss = v.variance.abs();
        let confidence = Confidence::base(self.rule.base_confidence)
            .bonus_if(v.variance_pct > self.rule.high_variance_pct, self.rule.high_variance_bonus)
            .bonus_if(record.total_usage > record.included_usage, self.rule.overage_bonus);

        let avg_daily = record.total_usage / f64::from(record.usage_days.max(1));
        let mut context = vec![
            format!("Average daily usage: {avg_daily:.2} {}", record.usage_unit),
            format!("Service type: {}", record.service_type),
        ];
        if v.overage_usage > 0.0 {
            context.push(format!("Overage usage: {:.2} units", v.overage_usage));
        }

        Finding {
            leakage_type:       LeakageType::UsageMismatches,
            severity:           self.severity.classify(loss),
            confidence:         confidence.value(),
            estimated_loss:     loss,
            description:        format!(
                "Usage billing mismatch detected. Total usage: {:.2}, Expected overage revenue: ${:.2}, Actual overage charge: ${:.2}. Variance: ${:.2}",
                record.total_usage, v.expected_revenue, record.overage_charge, loss,
            ),
            evidence:           evidence([
                ("total_usage", record.total_usage.into()),
                ("included_usage", record.included_usage.into()),
                ("expected_overage_revenue", v.expected_revenue.into()),
                ("actual_overage_charge", record.overage_charge.into()),
                ("variance_percentage", v.variance_pct.into()),
            ]),
            context_factors:    context,
            recommended_action: "Review usage metering system and billing calculation. Verify overage charges are correctly applied."
                .to_string(),
        }
    }
}

impl Detector for UsageMismatchDetector {
    fn name(&self) -> &'static str {
        "usage_mismatches"
    }

    fn leakage_type(&self) -> LeakageType {
        LeakageType::UsageMismatches
    }

    /// Overage charges come from billing, usage from usage events.
    fn required_sources(&self) -> &'static [SourceKind] {
        &[SourceKind::Usage, SourceKind::Billing]
    }

    fn detect(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<DetectorOutput> {
        let usage_based: Vec<&JoinedRecord> = table.iter().filter(|r| r.usage_based).collect();
        if usage_based.is_empty() {
            log::info!("usage_mismatches: no usage-based services found");
            return Ok(DetectorOutput::default());
        }

        let candidates: Vec<(&JoinedRecord, OverageVariance)> = usage_based
            .into_iter()
            .map(|r| (r, OverageVariance::of(r)))
            .filter(|(_, v)| self.is_candidate(v))
            .collect();
        log::info!("usage_mismatches: {} candidates", candidates.len());

        let mut detections = Vec::new();
        for (record, v) in candidates {
            let finding = self.evaluate(record, v);
            if finding.confidence >= self.threshold {
                detections.push(Detection::stamp(record, finding, ctx));
            } else {
                log::debug!("usage_mismatches: {} below threshold", record.contract_id);
            }
        }

        log::info!("usage_mismatches: {} detections", detections.len());
        Ok(DetectorOutput::found(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Severity;
    use crate::test_support::{context, record, table};

    fn metered(id: &str) -> JoinedRecord {
        let mut r = record(id);
        r.usage_based = true;
        r.usage_unit = "GB".into();
        r.included_usage = 100.0;
        r.overage_rate = 0.5;
        r
    }

    #[test]
    fn unbilled_overage_is_flagged() {
        let mut r = metered("CNT-U");
        r.total_usage = 400.0; // 300 over, 150 expected
        r.usage_days = 30;
        r.overage_charge = 0.0;

        let det = UsageMismatchDetector::new(&DetectionConfig::default());
        let out = det.detect(&table(vec![r]), &context()).unwrap();
        assert_eq!(out.detections.len(), 1);
        let d = &out.detections[0];
        assert_eq!(d.estimated_loss, 150.0);
        assert!((d.confidence - 0.9).abs() < 1e-9);
        assert_eq!(d.severity, Severity::Medium);
        assert!(d.contextual_analysis.contains("GB"));
    }

    #[test]
    fn correctly_billed_overage_is_ignored() {
        let mut r = metered("CNT-OK");
        r.total_usage = 400.0;
        r.overage_charge = 150.0;
        let det = UsageMismatchDetector::new(&DetectionConfig::default());
        assert!(det.detect(&table(vec![r]), &context()).unwrap().detections.is_empty());
    }

    #[test]
    fn flat_rate_contracts_are_skipped() {
        let mut r = metered("CNT-F");
        r.usage_based = false;
        r.total_usage = 10_000.0;
        let det = UsageMismatchDetector::new(&DetectionConfig::default());
        assert!(det.detect(&table(vec![r]), &context()).unwrap().detections.is_empty());
    }

    #[test]
    fn overbilled_overage_counts_as_magnitude() {
        // Within allotment but charged 40 in overage: expected 0, pct 0.
        let mut r = metered("CNT-X");
        r.total_usage = 50.0;
        r.overage_charge = 40.0;
        let v = OverageVariance::of(&r);
        assert_eq!(v.variance, -40.0);
        assert_eq!(v.variance_pct, 0.0);
        let det = UsageMismatchDetector::new(&DetectionConfig::default());
        assert!(!det.is_candidate(&v));
    }
}
