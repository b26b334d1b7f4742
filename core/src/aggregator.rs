//! Aggregator: the only component with a whole-list view of detections.
//!
//! RULE: the summary is recomputed from the full detection set every run.
//! It is never updated incrementally.

use crate::detection::{Detection, LeakageType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTotals {
    pub count: usize,
    pub loss:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total_records_analyzed: usize,
    pub total_detections:       usize,
    /// Rounded to cents.
    pub total_estimated_loss:   f64,
    /// Only types that produced at least one detection.
    pub by_type:                BTreeMap<LeakageType, TypeTotals>,
    /// Every severity, zero-filled.
    pub by_severity:            BTreeMap<Severity, usize>,
    pub high_priority_count:    usize,
    /// Rounded to three places; 0 when there are no detections.
    pub average_confidence:     f64,
    pub has_material_findings:  bool,
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Reduce the full detection list to one summary record.
pub fn summarize(detections: &[Detection], records_analyzed: usize) -> DetectionSummary {
    let mut by_type: BTreeMap<LeakageType, TypeTotals> = BTreeMap::new();
    let mut by_severity: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|s| (*s, 0)).collect();

    for d in detections {
        let totals = by_type.entry(d.leakage_type).or_default();
        totals.count += 1;
        totals.loss += d.estimated_loss;
        *by_severity.entry(d.severity).or_insert(0) += 1;
    }
    for totals in by_type.values_mut() {
        totals.loss = round_to(totals.loss, 2);
    }

    let total_loss: f64 = detections.iter().map(|d| d.estimated_loss).sum();
    let average_confidence = if detections.is_empty() {
        0.0
    } else {
        detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
    };
    let high_priority_count = detections.iter().filter(|d| d.severity.is_high_priority()).count();

    DetectionSummary {
        total_records_analyzed: records_analyzed,
        total_detections:       detections.len(),
        total_estimated_loss:   round_to(total_loss, 2),
        by_type,
        by_severity,
        high_priority_count,
        average_confidence:     round_to(average_confidence, 3),
        has_material_findings:  !detections.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, RunContext};
    use crate::test_support::context;
    use std::collections::BTreeMap;

    fn det(leakage_type: LeakageType, severity: Severity, loss: f64, confidence: f64) -> Detection {
        let ctx: RunContext = context();
        Detection {
            detection_id:          ctx.detection_id(leakage_type, "CNT"),
            customer_id:           "CUST".into(),
            contract_id:           "CNT".into(),
            leakage_type,
            severity,
            confidence,
            estimated_loss:        loss,
            description:           String::new(),
            mathematical_evidence: BTreeMap::new(),
            contextual_analysis:   String::new(),
            recommended_action:    String::new(),
            detection_timestamp:   ctx.detected_at,
        }
    }

    #[test]
    fn empty_list_gives_zeroed_summary() {
        let s = summarize(&[], 12);
        assert_eq!(s.total_records_analyzed, 12);
        assert_eq!(s.total_detections, 0);
        assert_eq!(s.average_confidence, 0.0);
        assert!(!s.has_material_findings);
        assert_eq!(s.by_severity.len(), 4);
        assert!(s.by_severity.values().all(|n| *n == 0));
        assert!(s.by_type.is_empty());
    }

    #[test]
    fn totals_group_and_round() {
        let list = vec![
            det(LeakageType::MissingCharges, Severity::Medium, 100.004, 1.0),
            det(LeakageType::MissingCharges, Severity::Critical, 6_000.0, 0.9),
            det(LeakageType::DuplicateEntries, Severity::High, 250.0, 0.9),
        ];
        let s = summarize(&list, 3);
        assert_eq!(s.total_detections, 3);
        assert_eq!(s.total_estimated_loss, 6_350.0);
        assert_eq!(s.by_type[&LeakageType::MissingCharges].count, 2);
        assert_eq!(s.by_type[&LeakageType::MissingCharges].loss, 6_100.0);
        assert_eq!(s.by_severity[&Severity::High], 1);
        assert_eq!(s.by_severity[&Severity::Low], 0);
        assert_eq!(s.high_priority_count, 2);
        assert_eq!(s.average_confidence, 0.933);
        assert!(s.has_material_findings);
    }
}
