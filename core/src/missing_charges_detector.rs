//! Missing-charges detector.
//!
//! Candidates are contracts that were never billed or billed nothing:
//!   `total_billed == 0 OR bill_count == 0`
//!
//! Loss is `contracted_rate × max(1, bill_count) − total_billed`. It can be
//! zero or negative when rate data is absent; severity is classified on the
//! raw value and the reported loss is its magnitude.

use crate::{
    config::{DetectionConfig, MissingChargesRule},
    detection::{evidence, Detection, Finding, LeakageType, RunContext, Severity},
    detector::{Detector, DetectorOutput},
    error::LeakageResult,
    joined::{JoinedRecord, JoinedTable, SourceKind},
    rules::{Confidence, SeverityTable},
};

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct MissingChargesDetector {
    rule:      MissingChargesRule,
    severity:  SeverityTable,
    threshold: f64,
}

impl MissingChargesDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            rule:      config.missing_charges.clone(),
            severity:  config.severity_tables.missing_charges.clone(),
            threshold: config.confidence_threshold,
        }
    }

    fn is_candidate(record: &JoinedRecord) -> bool {
        record.total_billed == 0.0 || record.bill_count == 0
    }

    fn confidence(&self, record: &JoinedRecord) -> Confidence {
        Confidence::base(self.rule.base_confidence)
            .bonus_if(record.is_active(), self.rule.active_bonus)
            .bonus_if(record.total_usage > 0.0, self.rule.usage_bonus)
            .bonus_if(record.bill_count == 0, self.rule.no_bills_bonus)
    }

    fn evaluate(&self, record: &JoinedRecord) -> Finding {
        let expected = record.contracted_rate * f64::from(record.bill_count.max(1));
        let actual = record.total_billed;
        let loss = expected - actual;
        let severity = self.severity.classify(loss);

        let mut context = Vec::new();
        if record.is_active() {
            context.push("Service is active but not generating revenue".to_string());
        }
        if record.total_usage > 0.0 {
            context.push(format!("Customer has {:.2} units of usage", record.total_usage));
        }
        if record.start_date <= record.end_date {
            context.push("Valid contract period exists".to_string());
        }

        Finding {
            leakage_type:       LeakageType::MissingCharges,
            severity,
            confidence:         self.confidence(record).value(),
            estimated_loss:     loss,
            description:        format!(
                "Missing charges detected for {}'s {} service. Expected revenue: ${:.2}, Actual billed: ${:.2}. Potential loss: ${:.2}",
                record.display_name(),
                record.service_type,
                expected,
                actual,
                loss.abs(),
            ),
            evidence:           evidence([
                ("expected_revenue", expected.into()),
                ("actual_revenue", actual.into()),
                ("bill_count", record.bill_count.into()),
                ("contracted_rate", record.contracted_rate.into()),
                ("raw_estimated_loss", loss.into()),
            ]),
            context_factors:    context,
            recommended_action: recommended_action(severity).to_string(),
        }
    }
}

fn recommended_action(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => {
            "URGENT: Immediately investigate and generate missing bills. Contact customer if necessary."
        }
        Severity::High => {
            "Generate missing charges and apply to next billing cycle. Review billing system configuration."
        }
        _ => "Review and apply missing charges. Monitor for recurring issues.",
    }
}

impl Detector for MissingChargesDetector {
    fn name(&self) -> &'static str {
        "missing_charges"
    }

    fn leakage_type(&self) -> LeakageType {
        LeakageType::MissingCharges
    }

    fn required_sources(&self) -> &'static [SourceKind] {
        &[SourceKind::Billing]
    }

    fn detect(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<DetectorOutput> {
        let candidates: Vec<&JoinedRecord> =
            table.iter().filter(|r| Self::is_candidate(r)).collect();
        log::info!("missing_charges: {} candidates", candidates.len());

        let mut detections = Vec::new();
        for record in candidates {
            let finding = self.evaluate(record);
            if finding.confidence < self.threshold {
                log::debug!(
                    "missing_charges: {} below threshold ({:.2})",
                    record.contract_id,
                    finding.confidence
                );
                continue;
            }
            detections.push(Detection::stamp(record, finding, ctx));
        }

        log::info!("missing_charges: {} detections", detections.len());
        Ok(DetectorOutput::found(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, record, table};
    use crate::types::CustomerStatus;

    #[test]
    fn never_billed_active_contract_is_flagged() {
        let mut r = record("CNT-A");
        r.contracted_rate = 100.0;
        r.status = Some(CustomerStatus::Active);
        r.total_usage = 50.0;

        let det = MissingChargesDetector::new(&DetectionConfig::default());
        let out = det.detect(&table(vec![r]), &context()).unwrap();
        assert_eq!(out.detections.len(), 1);
        let d = &out.detections[0];
        assert_eq!(d.estimated_loss, 100.0);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.severity, Severity::Medium);
        assert!(d.detection_id.starts_with("MISS_CNT-A_"));
    }

    #[test]
    fn billed_contracts_are_not_candidates() {
        let mut r = record("CNT-B");
        r.contracted_rate = 100.0;
        r.bill_count = 3;
        r.total_billed = 300.0;
        assert!(!MissingChargesDetector::is_candidate(&r));
    }

    #[test]
    fn low_confidence_candidates_are_dropped() {
        // Billed zero across two bills, suspended customer, no usage: 0.5.
        let mut r = record("CNT-C");
        r.contracted_rate = 80.0;
        r.bill_count = 2;
        r.status = Some(CustomerStatus::Suspended);

        let det = MissingChargesDetector::new(&DetectionConfig::default());
        let out = det.detect(&table(vec![r]), &context()).unwrap();
        assert!(out.detections.is_empty());
    }

    #[test]
    fn negative_loss_reports_magnitude_and_low_severity() {
        // A negative contracted rate is the only way to get a negative raw loss.
        let mut r = record("CNT-N");
        r.contracted_rate = -30.0;
        r.bill_count = 2;
        r.status = Some(CustomerStatus::Active);
        r.total_usage = 10.0;

        let det = MissingChargesDetector::new(&DetectionConfig::default());
        let finding = det.evaluate(&r);
        assert_eq!(finding.estimated_loss, -60.0);
        assert_eq!(finding.severity, Severity::Low);

        let d = Detection::stamp(&r, finding, &context());
        assert_eq!(d.estimated_loss, 60.0);
    }
}
