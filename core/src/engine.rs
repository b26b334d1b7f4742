//! The detection engine and the end-to-end pipeline.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Missing charges
//!   2. Incorrect rates
//!   3. Usage mismatches
//!   4. Duplicate entries
//!   5. Statistical anomaly
//!
//! RULES:
//!   - Detectors read ONLY the immutable joined table and the run context.
//!   - No detector sees another detector's output; only the aggregator
//!     sees the whole list.
//!   - A detector whose required source is missing is skipped, not failed.
//!   - A detector that errors (or panics, when run in parallel) is recorded
//!     as a failure; every other detector still runs.
//!   - Output order is registration order, sequential or parallel.

use crate::{
    aggregator::{summarize, DetectionSummary},
    anomaly_detector::AnomalyDetector,
    cleaning::{clean_sources, CleaningReport},
    config::DetectionConfig,
    detection::{Detection, RunContext},
    detector::{missing_source, Detector, DetectorCondition, DetectorOutput},
    duplicate_entry_detector::DuplicateEntryDetector,
    error::{LeakageError, LeakageResult},
    event::{EventLogEntry, PipelineEvent},
    feature_engineer::FeatureEngineer,
    incorrect_rates_detector::IncorrectRatesDetector,
    join_engine::join,
    joined::JoinedTable,
    missing_charges_detector::MissingChargesDetector,
    records::SourceTables,
    store::LeakageStore,
    types::RunId,
    usage_mismatch_detector::UsageMismatchDetector,
};
use serde::{Deserialize, Serialize};

/// A detector that returned an error. Other detectors are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorFailure {
    pub detector: String,
    pub error:    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorRun {
    pub detector:   String,
    pub detections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id:     RunId,
    pub detections: Vec<Detection>,
    pub summary:    DetectionSummary,
    pub completed:  Vec<DetectorRun>,
    pub conditions: Vec<DetectorCondition>,
    pub failures:   Vec<DetectorFailure>,
}

enum Outcome {
    Ran(&'static str, DetectorOutput),
    Skipped(DetectorCondition),
    Failed(DetectorFailure),
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct DetectionEngine {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectionEngine {
    pub fn new() -> Self {
        Self { detectors: Vec::new() }
    }

    /// Build a fully wired engine with every detector registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(config: &DetectionConfig) -> Self {
        let mut engine = DetectionEngine::new();

        // EXECUTION ORDER: fixed, never reordered.
        engine.register(Box::new(MissingChargesDetector::new(config)));
        engine.register(Box::new(IncorrectRatesDetector::new(config)));
        engine.register(Box::new(UsageMismatchDetector::new(config)));
        engine.register(Box::new(DuplicateEntryDetector::new(config)));
        engine.register(Box::new(AnomalyDetector::new(config)));
        engine
    }

    /// Register a detector. Call in the documented execution order.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run every detector in registration order on this thread.
    pub fn run(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<RunReport> {
        require_rows(table)?;
        let outcomes = self
            .detectors
            .iter()
            .map(|d| run_one(d.as_ref(), table, ctx))
            .collect();
        Ok(assemble(outcomes, table, ctx))
    }

    /// Run every detector on its own scoped thread. The table is shared
    /// read-only; each thread owns its output. Results are identical to
    /// `run`.
    pub fn run_parallel(&self, table: &JoinedTable, ctx: &RunContext) -> LeakageResult<RunReport> {
        require_rows(table)?;
        let outcomes = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .detectors
                .iter()
                .map(|d| (d.name(), scope.spawn(move || run_one(d.as_ref(), table, ctx))))
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        log::error!("{name}: detector thread panicked");
                        Outcome::Failed(DetectorFailure {
                            detector: name.to_string(),
                            error:    "detector panicked".into(),
                        })
                    })
                })
                .collect()
        });
        Ok(assemble(outcomes, table, ctx))
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn require_rows(table: &JoinedTable) -> LeakageResult<()> {
    if table.is_empty() {
        return Err(LeakageError::NoInputData("joined table has no rows".into()));
    }
    Ok(())
}

fn run_one(detector: &dyn Detector, table: &JoinedTable, ctx: &RunContext) -> Outcome {
    if let Some(condition) = missing_source(detector, table) {
        log::info!("{}: skipped, required source missing", detector.name());
        return Outcome::Skipped(condition);
    }
    match detector.detect(table, ctx) {
        Ok(output) => Outcome::Ran(detector.name(), output),
        Err(e) => {
            log::error!("{}: detector failed: {e}", detector.name());
            Outcome::Failed(DetectorFailure {
                detector: detector.name().to_string(),
                error:    e.to_string(),
            })
        }
    }
}

fn assemble(outcomes: Vec<Outcome>, table: &JoinedTable, ctx: &RunContext) -> RunReport {
    let mut detections = Vec::new();
    let mut completed = Vec::new();
    let mut conditions = Vec::new();
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome {
            Outcome::Ran(name, output) => {
                completed.push(DetectorRun {
                    detector:   name.to_string(),
                    detections: output.detections.len(),
                });
                conditions.extend(output.condition);
                detections.extend(output.detections);
            }
            Outcome::Skipped(condition) => conditions.push(condition),
            Outcome::Failed(failure) => failures.push(failure),
        }
    }

    let summary = summarize(&detections, table.len());
    log::info!(
        "engine: {} detections, {:.2} estimated loss, {} conditions, {} failures",
        summary.total_detections,
        summary.total_estimated_loss,
        conditions.len(),
        failures.len()
    );

    RunReport {
        run_id: ctx.run_id.clone(),
        detections,
        summary,
        completed,
        conditions,
        failures,
    }
}

// ── Preparation ──────────────────────────────────────────────────────────────

/// Clean, join and engineer the raw sources into the detection input.
/// Pure: the same sources always give the same table.
pub fn prepare_table(
    sources: SourceTables,
    engineer: &FeatureEngineer,
) -> (JoinedTable, CleaningReport) {
    let (cleaned, report) = clean_sources(sources);
    let table = engineer.engineer(join(&cleaned));
    (table, report)
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Sequenced event writer for one run.
struct EventRecorder<'a> {
    store:  &'a LeakageStore,
    run_id: &'a str,
    seq:    u32,
}

impl EventRecorder<'_> {
    fn record(&mut self, stage: &str, event: PipelineEvent) -> LeakageResult<()> {
        let entry = EventLogEntry {
            id:         None,
            run_id:     self.run_id.to_string(),
            seq:        self.seq,
            stage:      stage.to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(&event)?,
        };
        self.store.append_event(&entry)?;
        self.seq += 1;
        Ok(())
    }
}

/// load → clean → join → engineer → detect → aggregate → persist.
pub struct LeakagePipeline {
    store:    LeakageStore,
    engineer: FeatureEngineer,
    engine:   DetectionEngine,
    parallel: bool,
}

impl LeakagePipeline {
    pub fn new(store: LeakageStore, config: &DetectionConfig) -> Self {
        Self {
            store,
            engineer: FeatureEngineer::new(),
            engine:   DetectionEngine::build(config),
            parallel: false,
        }
    }

    pub fn with_engine(mut self, engine: DetectionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn store(&self) -> &LeakageStore {
        &self.store
    }

    pub fn run(&self, ctx: &RunContext) -> LeakageResult<RunReport> {
        self.store.insert_run(&ctx.run_id, ctx.detected_at)?;
        let mut events = EventRecorder { store: &self.store, run_id: &ctx.run_id, seq: 0 };
        events.record("engine", PipelineEvent::RunStarted { run_id: ctx.run_id.clone() })?;

        let result = self.execute(ctx, &mut events);
        let status = if result.is_ok() { "completed" } else { "failed" };
        self.store.complete_run(&ctx.run_id, chrono::Utc::now(), status)?;
        result
    }

    fn execute(&self, ctx: &RunContext, events: &mut EventRecorder<'_>) -> LeakageResult<RunReport> {
        let sources = self.store.load_sources()?;
        record_sources(&sources, events)?;

        let (table, cleaning) = prepare_table(sources, &self.engineer);
        events.record("clean", PipelineEvent::CleaningApplied { report: cleaning })?;
        events.record("join", PipelineEvent::TableJoined { rows: table.len() })?;

        let report = if self.parallel {
            self.engine.run_parallel(&table, ctx)?
        } else {
            self.engine.run(&table, ctx)?
        };

        for run in &report.completed {
            events.record(
                "detect",
                PipelineEvent::DetectorCompleted {
                    detector:   run.detector.clone(),
                    detections: run.detections,
                },
            )?;
        }
        for condition in &report.conditions {
            events.record("detect", PipelineEvent::DetectorSkipped { condition: condition.clone() })?;
        }
        for failure in &report.failures {
            events.record(
                "detect",
                PipelineEvent::DetectorFailed {
                    detector: failure.detector.clone(),
                    error:    failure.error.clone(),
                },
            )?;
        }

        self.store.save_detections(&ctx.run_id, &report.detections)?;
        self.store.save_summary(&ctx.run_id, &report.summary)?;
        events.record(
            "engine",
            PipelineEvent::RunCompleted {
                run_id:         ctx.run_id.clone(),
                detections:     report.summary.total_detections,
                estimated_loss: report.summary.total_estimated_loss,
            },
        )?;
        Ok(report)
    }
}

fn record_sources(sources: &SourceTables, events: &mut EventRecorder<'_>) -> LeakageResult<()> {
    let optional = [
        ("customers", sources.customers.as_ref().map(Vec::len)),
        ("provisioning_events", sources.provisioning.as_ref().map(Vec::len)),
        ("usage_events", sources.usage.as_ref().map(Vec::len)),
        ("billing_events", sources.billing.as_ref().map(Vec::len)),
    ];
    events.record(
        "load",
        PipelineEvent::SourceLoaded { table: "contracts".into(), rows: sources.contracts.len() },
    )?;
    for (table, rows) in optional {
        let event = match rows {
            Some(rows) => PipelineEvent::SourceLoaded { table: table.into(), rows },
            None => {
                log::info!("load: optional source {table} is missing");
                PipelineEvent::SourceMissing { table: table.into() }
            }
        };
        events.record("load", event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::LeakageType;
    use crate::joined::SourceKind;
    use crate::test_support::{context, record, table};

    struct Exploding;

    impl Detector for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn leakage_type(&self) -> LeakageType {
            LeakageType::IncorrectRates
        }

        fn detect(&self, _: &JoinedTable, _: &RunContext) -> LeakageResult<DetectorOutput> {
            Err(LeakageError::Model("boom".into()))
        }
    }

    struct Panicking;

    impl Detector for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn leakage_type(&self) -> LeakageType {
            LeakageType::StatisticalAnomaly
        }

        fn detect(&self, _: &JoinedTable, _: &RunContext) -> LeakageResult<DetectorOutput> {
            panic!("detector bug");
        }
    }

    fn duplicate_row() -> JoinedTable {
        let mut r = record("CNT-D");
        r.total_billed = 250.0;
        r.bill_count = 2;
        r.error_types = vec!["DUPLICATE_ENTRY".into()];
        table(vec![r])
    }

    #[test]
    fn build_registers_in_documented_order() {
        let engine = DetectionEngine::build(&DetectionConfig::default());
        assert_eq!(
            engine.detector_names(),
            vec![
                "missing_charges",
                "incorrect_rates",
                "usage_mismatches",
                "duplicate_entries",
                "statistical_anomaly"
            ]
        );
    }

    #[test]
    fn a_failing_detector_does_not_stop_the_others() {
        let config = DetectionConfig::default();
        let mut engine = DetectionEngine::new();
        engine.register(Box::new(Exploding));
        engine.register(Box::new(DuplicateEntryDetector::new(&config)));

        let report = engine.run(&duplicate_row(), &context()).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].detector, "exploding");
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.summary.total_detections, 1);
    }

    #[test]
    fn a_panicking_detector_is_contained_in_parallel_runs() {
        let config = DetectionConfig::default();
        let mut engine = DetectionEngine::new();
        engine.register(Box::new(DuplicateEntryDetector::new(&config)));
        engine.register(Box::new(Panicking));

        let report = engine.run_parallel(&duplicate_row(), &context()).unwrap();
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.failures[0].detector, "panicking");
    }

    #[test]
    fn missing_sources_skip_dependent_detectors() {
        let mut t = duplicate_row();
        t.sources.billing = false;
        t.sources.usage = false;
        let engine = DetectionEngine::build(&DetectionConfig::default());
        let report = engine.run(&t, &context()).unwrap();

        assert!(report.detections.is_empty());
        assert!(report.failures.is_empty());
        assert!(report.conditions.contains(&DetectorCondition::MissingSource {
            detector: "duplicate_entries".into(),
            source:   SourceKind::Billing,
        }));
        assert!(report.conditions.contains(&DetectorCondition::MissingSource {
            detector: "usage_mismatches".into(),
            source:   SourceKind::Usage,
        }));
        // One row is below the anomaly minimum.
        assert!(report
            .conditions
            .iter()
            .any(|c| matches!(c, DetectorCondition::InsufficientData { rows: 1, .. })));
    }

    #[test]
    fn empty_table_is_no_input_data() {
        let engine = DetectionEngine::build(&DetectionConfig::default());
        let err = engine.run(&JoinedTable::default(), &context()).unwrap_err();
        assert!(matches!(err, LeakageError::NoInputData(_)));
    }
}
