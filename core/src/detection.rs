//! Detection records: the immutable output of the detection stage.

use crate::joined::JoinedRecord;
use crate::types::{ContractId, CustomerId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::LeakageError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeakageType {
    MissingCharges,
    IncorrectRates,
    UsageMismatches,
    DuplicateEntries,
    StatisticalAnomaly,
}

impl LeakageType {
    pub const ALL: [LeakageType; 5] = [
        LeakageType::MissingCharges,
        LeakageType::IncorrectRates,
        LeakageType::UsageMismatches,
        LeakageType::DuplicateEntries,
        LeakageType::StatisticalAnomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCharges     => "MISSING_CHARGES",
            Self::IncorrectRates     => "INCORRECT_RATES",
            Self::UsageMismatches    => "USAGE_MISMATCHES",
            Self::DuplicateEntries   => "DUPLICATE_ENTRIES",
            Self::StatisticalAnomaly => "STATISTICAL_ANOMALY",
        }
    }

    /// Prefix used in detection ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::MissingCharges     => "MISS",
            Self::IncorrectRates     => "RATE",
            Self::UsageMismatches    => "USAGE",
            Self::DuplicateEntries   => "DUP",
            Self::StatisticalAnomaly => "ANOM",
        }
    }
}

impl fmt::Display for LeakageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeakageType {
    type Err = LeakageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LeakageError::InvalidValue {
                field: "leakage_type",
                value: s.to_string(),
            })
    }
}

/// Business-impact tier, derived only from estimated loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "LOW",
            Self::Medium   => "MEDIUM",
            Self::High     => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LeakageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| LeakageError::InvalidValue {
                field: "severity",
                value: s.to_string(),
            })
    }
}

/// One number (or tag list) that produced a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl From<f64> for EvidenceValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<u32> for EvidenceValue {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for EvidenceValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<&str> for EvidenceValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<String>> for EvidenceValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

pub type Evidence = BTreeMap<String, EvidenceValue>;

/// Build an evidence map from `(key, value)` pairs.
pub fn evidence<const N: usize>(pairs: [(&str, EvidenceValue); N]) -> Evidence {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Explicit run-level inputs to detection. Nothing reads the wall clock
/// inside a detector; the timestamp comes from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id:      RunId,
    pub detected_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_id: RunId, detected_at: DateTime<Utc>) -> Self {
        Self { run_id, detected_at }
    }

    /// Fresh run id, current time.
    pub fn now() -> Self {
        Self::new(format!("run-{}", uuid::Uuid::new_v4()), Utc::now())
    }

    pub fn detection_id(&self, leakage_type: LeakageType, contract_id: &str) -> String {
        format!(
            "{}_{}_{}",
            leakage_type.id_prefix(),
            contract_id,
            self.detected_at.format("%Y%m%d%H%M%S")
        )
    }
}

/// What a detector concluded about one row, before it is stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub leakage_type:       LeakageType,
    pub severity:           Severity,
    pub confidence:         f64,
    /// Signed loss as computed. Reported as a magnitude.
    pub estimated_loss:     f64,
    pub description:        String,
    pub evidence:           Evidence,
    pub context_factors:    Vec<String>,
    pub recommended_action: String,
}

/// Immutable output record. Created once by a detector, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub detection_id:          String,
    pub customer_id:           CustomerId,
    pub contract_id:           ContractId,
    pub leakage_type:          LeakageType,
    pub severity:              Severity,
    pub confidence:            f64,
    pub estimated_loss:        f64,
    pub description:           String,
    pub mathematical_evidence: Evidence,
    pub contextual_analysis:   String,
    pub recommended_action:    String,
    pub detection_timestamp:   DateTime<Utc>,
}

impl Detection {
    pub fn stamp(record: &JoinedRecord, finding: Finding, ctx: &RunContext) -> Self {
        Self {
            detection_id:          ctx.detection_id(finding.leakage_type, &record.contract_id),
            customer_id:           record.customer_id.clone(),
            contract_id:           record.contract_id.clone(),
            leakage_type:          finding.leakage_type,
            severity:              finding.severity,
            confidence:            finding.confidence.clamp(0.0, 1.0),
            estimated_loss:        finding.estimated_loss.abs(),
            description:           finding.description,
            mathematical_evidence: finding.evidence,
            contextual_analysis:   finding.context_factors.join(" | "),
            recommended_action:    finding.recommended_action,
            detection_timestamp:   ctx.detected_at,
        }
    }
}
