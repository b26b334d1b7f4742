use super::{parsed_col, LeakageStore};
use crate::{
    aggregator::DetectionSummary,
    detection::Detection,
    error::LeakageResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension};

impl LeakageStore {
    // ── Detections ────────────────────────────────────────────────

    pub fn save_detections(&self, run_id: &str, detections: &[Detection]) -> LeakageResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = self.conn.prepare_cached(
                "INSERT INTO detections (
                    detection_id, run_id, customer_id, contract_id, leakage_type, severity,
                    confidence, estimated_loss, description, mathematical_evidence,
                    contextual_analysis, recommended_action, detection_timestamp
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for d in detections {
                stmt.execute(params![
                    &d.detection_id,
                    run_id,
                    &d.customer_id,
                    &d.contract_id,
                    d.leakage_type.as_str(),
                    d.severity.as_str(),
                    d.confidence,
                    d.estimated_loss,
                    &d.description,
                    serde_json::to_string(&d.mathematical_evidence)?,
                    &d.contextual_analysis,
                    &d.recommended_action,
                    d.detection_timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Detections for a run, in the order they were saved.
    pub fn detections_for_run(&self, run_id: &str) -> LeakageResult<Vec<Detection>> {
        let mut stmt = self.conn.prepare(
            "SELECT detection_id, customer_id, contract_id, leakage_type, severity,
                    confidence, estimated_loss, description, mathematical_evidence,
                    contextual_analysis, recommended_action, detection_timestamp
             FROM detections WHERE run_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                let evidence: String = row.get(8)?;
                let timestamp: String = row.get(11)?;
                Ok(Detection {
                    detection_id:          row.get(0)?,
                    customer_id:           row.get(1)?,
                    contract_id:           row.get(2)?,
                    leakage_type:          parsed_col(row, 3)?,
                    severity:              parsed_col(row, 4)?,
                    confidence:            row.get(5)?,
                    estimated_loss:        row.get(6)?,
                    description:           row.get(7)?,
                    mathematical_evidence: serde_json::from_str(&evidence).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
                    })?,
                    contextual_analysis:   row.get(9)?,
                    recommended_action:    row.get(10)?,
                    detection_timestamp:   DateTime::parse_from_rfc3339(&timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e))
                        })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Summary ───────────────────────────────────────────────────

    pub fn save_summary(&self, run_id: &str, summary: &DetectionSummary) -> LeakageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO run_summaries (run_id, payload) VALUES (?1, ?2)",
            params![run_id, serde_json::to_string(summary)?],
        )?;
        Ok(())
    }

    pub fn summary_for_run(&self, run_id: &str) -> LeakageResult<Option<DetectionSummary>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM run_summaries WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match payload {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }
}
