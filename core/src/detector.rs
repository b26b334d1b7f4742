//! Detector trait.
//!
//! RULE: Every detector implements Detector.
//! A detector reads ONLY the joined table and the run context.
//! No detector sees another detector's output.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    detection::{Detection, LeakageType, RunContext},
    error::LeakageResult,
    joined::{JoinedTable, SourceKind},
};
use serde::{Deserialize, Serialize};

/// The contract every detector must fulfill.
pub trait Detector: Send + Sync {
    /// Unique stable name for this detector.
    fn name(&self) -> &'static str;

    fn leakage_type(&self) -> LeakageType;

    /// Optional sources this detector cannot work without. The engine
    /// skips the detector (non-fatally) when one of them is absent.
    fn required_sources(&self) -> &'static [SourceKind] {
        &[]
    }

    /// Scan the whole table once.
    fn detect(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<DetectorOutput>;
}

/// Non-fatal conditions a detector (or the engine on its behalf) reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorCondition {
    MissingSource {
        detector: String,
        source:   SourceKind,
    },
    InsufficientData {
        detector: String,
        rows:     usize,
        required: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorOutput {
    pub detections: Vec<Detection>,
    pub condition:  Option<DetectorCondition>,
}

impl DetectorOutput {
    pub fn found(detections: Vec<Detection>) -> Self {
        Self { detections, condition: None }
    }

    pub fn empty_with(condition: DetectorCondition) -> Self {
        Self { detections: Vec::new(), condition: Some(condition) }
    }
}

/// First required source missing from the table, if any.
pub fn missing_source(detector: &dyn Detector, table: &JoinedTable) -> Option<DetectorCondition> {
    detector
        .required_sources()
        .iter()
        .find(|kind| !table.sources.has(**kind))
        .map(|kind| DetectorCondition::MissingSource {
            detector: detector.name().to_string(),
            source:   *kind,
        })
}
