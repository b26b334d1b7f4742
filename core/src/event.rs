//! Pipeline event log.
//!
//! RULE: every stage transition of a run is recorded as a PipelineEvent
//! and persisted in order. Variants are only ever appended.

use crate::{
    cleaning::CleaningReport,
    detector::DetectorCondition,
    types::RunId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Run events ─────────────────────────────────
    RunStarted {
        run_id: RunId,
    },
    RunCompleted {
        run_id:         RunId,
        detections:     usize,
        estimated_loss: f64,
    },

    // ── Load and prepare ───────────────────────────
    SourceLoaded {
        table: String,
        rows:  usize,
    },
    SourceMissing {
        table: String,
    },
    CleaningApplied {
        report: CleaningReport,
    },
    TableJoined {
        rows: usize,
    },

    // ── Detection ──────────────────────────────────
    DetectorCompleted {
        detector:   String,
        detections: usize,
    },
    DetectorSkipped {
        condition: DetectorCondition,
    },
    DetectorFailed {
        detector: String,
        error:    String,
    },
}

impl PipelineEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. }        => "run_started",
            Self::RunCompleted { .. }      => "run_completed",
            Self::SourceLoaded { .. }      => "source_loaded",
            Self::SourceMissing { .. }     => "source_missing",
            Self::CleaningApplied { .. }   => "cleaning_applied",
            Self::TableJoined { .. }       => "table_joined",
            Self::DetectorCompleted { .. } => "detector_completed",
            Self::DetectorSkipped { .. }   => "detector_skipped",
            Self::DetectorFailed { .. }    => "detector_failed",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub seq:        u32,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized PipelineEvent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joined::SourceKind;

    #[test]
    fn events_are_tagged_by_type() {
        let event = PipelineEvent::DetectorSkipped {
            condition: DetectorCondition::MissingSource {
                detector: "usage_mismatches".into(),
                source:   SourceKind::Usage,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.type_name());
        assert_eq!(json["condition"]["kind"], "missing_source");
        assert_eq!(json["condition"]["source"], "usage");

        let back: PipelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
