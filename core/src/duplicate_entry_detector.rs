//! Duplicate-entry detector.
//!
//! RULE: candidate selection is authoritative. Every contract whose billing
//! error tags include the duplicate tag is emitted, at fixed confidence,
//! with no threshold gate. The full billed amount is assumed duplicated.

use crate::{
    config::{DetectionConfig, DuplicateEntryRule},
    detection::{evidence, Detection, Finding, LeakageType, RunContext},
    detector::{Detector, DetectorOutput},
    error::LeakageResult,
    joined::{JoinedRecord, JoinedTable, SourceKind},
    rules::SeverityTable,
};

pub struct DuplicateEntryDetector {
    rule:     DuplicateEntryRule,
    severity: SeverityTable,
}

impl DuplicateEntryDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            rule:     config.duplicate_entries.clone(),
            severity: config.severity_tables.duplicate_entries.clone(),
        }
    }

    fn is_candidate(&self, record: &JoinedRecord) -> bool {
        record.error_types.iter().any(|tag| *tag == self.rule.error_tag)
    }

    fn evaluate(&self, record: &JoinedRecord) -> Finding {
        let loss = record.total_billed;

        let mut context = vec![
            format!("Billing amount: ${loss:.2}"),
            format!("Service: {}", record.service_type),
        ];
        if record.bill_count > 1 {
            context.push(format!("Multiple bills detected: {}", record.bill_count));
        }

        Finding {
            leakage_type:       LeakageType::DuplicateEntries,
            severity:           self.severity.classify(loss),
            confidence:         self.rule.confidence,
            estimated_loss:     loss,
            description:        format!(
                "Duplicate billing entry detected for {} service with potential overcharge of ${loss:.2}",
                record.service_type
            ),
            evidence:           evidence([
                ("duplicated_amount", loss.into()),
                ("bill_count", record.bill_count.into()),
                ("error_flags", record.error_types.clone().into()),
            ]),
            context_factors:    context,
            recommended_action: "Remove duplicate entry and issue credit to customer if payment was processed."
                .to_string(),
        }
    }
}

impl Detector for DuplicateEntryDetector {
    fn name(&self) -> &'static str {
        "duplicate_entries"
    }

    fn leakage_type(&self) -> LeakageType {
        LeakageType::DuplicateEntries
    }

    fn required_sources(&self) -> &'static [SourceKind] {
        &[SourceKind::Billing]
    }

    fn detect(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<DetectorOutput> {
        let detections: Vec<Detection> = table
            .iter()
            .filter(|r| self.is_candidate(r))
            .map(|r| Detection::stamp(r, self.evaluate(r), ctx))
            .collect();
        log::info!("duplicate_entries: {} detections", detections.len());
        Ok(DetectorOutput::found(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{EvidenceValue, Severity};
    use crate::test_support::{context, record, table};

    #[test]
    fn tagged_contract_is_always_emitted() {
        let mut r = record("CNT-D");
        r.total_billed = 250.0;
        r.bill_count = 2;
        r.error_types = vec!["DUPLICATE_ENTRY".into()];

        let det = DuplicateEntryDetector::new(&DetectionConfig::default());
        let out = det.detect(&table(vec![r]), &context()).unwrap();
        assert_eq!(out.detections.len(), 1);
        let d = &out.detections[0];
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.estimated_loss, 250.0);
        assert_eq!(d.severity, Severity::High);
        assert_eq!(
            d.mathematical_evidence["error_flags"],
            EvidenceValue::List(vec!["DUPLICATE_ENTRY".into()])
        );
        assert!(d.contextual_analysis.contains("Multiple bills detected: 2"));
    }

    #[test]
    fn other_tags_do_not_match() {
        let mut r = record("CNT-R");
        r.error_types = vec!["INCORRECT_RATE".into(), "DUPLICATE_ENTRY_REVIEWED".into()];
        let det = DuplicateEntryDetector::new(&DetectionConfig::default());
        assert!(!det.is_candidate(&r));
    }
}
