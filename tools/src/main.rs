//! leakage-runner: headless revenue-leakage detection run.
//!
//! Usage:
//!   leakage-runner --db leakage.db --data-dir ./data
//!   leakage-runner --generate 1000 --seed 42 --json
//!   leakage-runner --db leakage.db --generate 500 --parallel --top 20

use anyhow::Result;
use leakage_core::{
    config::DetectionConfig,
    detection::{RunContext, Severity},
    engine::{LeakagePipeline, RunReport},
    sample_data::SampleDataGenerator,
    store::LeakageStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let generate = parse_arg(&args, "--generate", 0usize);
    let top = parse_arg(&args, "--top", 10usize);
    let json = args.iter().any(|a| a == "--json");
    let parallel = args.iter().any(|a| a == "--parallel");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !json {
        println!("Revenue Leakage Detection: leakage-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        if generate > 0 {
            println!("  generate:  {generate} customers (seed {seed})");
        }
        println!("  parallel:  {parallel}");
        println!();
    }

    let config = DetectionConfig::load(data_dir)?;

    let store = if db == ":memory:" {
        LeakageStore::in_memory()?
    } else {
        LeakageStore::open(db)?
    };
    store.migrate()?;

    if generate > 0 {
        let sources = SampleDataGenerator::new(generate, seed).generate()?;
        store.insert_sources(&sources)?;
        log::info!("runner: loaded {} generated source rows", sources.total_records());
    }

    let ctx = RunContext::new(format!("run-{}", uuid::Uuid::new_v4()), chrono::Utc::now());
    let pipeline = LeakagePipeline::new(store, &config).with_parallel(parallel);
    let report = pipeline.run(&ctx)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, top);
    }
    Ok(())
}

fn print_report(report: &RunReport, top: usize) {
    let s = &report.summary;
    println!("=== RUN SUMMARY ===");
    println!("  run_id:            {}", report.run_id);
    println!("  records analyzed:  {}", s.total_records_analyzed);
    println!("  detections:        {}", s.total_detections);
    println!("  estimated loss:    ${:.2}", s.total_estimated_loss);
    println!("  high priority:     {}", s.high_priority_count);
    println!("  avg confidence:    {:.3}", s.average_confidence);

    println!();
    println!("=== BY TYPE ===");
    if s.by_type.is_empty() {
        println!("  (No leakage detected)");
    }
    for (leakage_type, totals) in &s.by_type {
        println!("  {:<20} {:>6} | ${:.2}", leakage_type.as_str(), totals.count, totals.loss);
    }

    println!();
    println!("=== BY SEVERITY ===");
    for severity in Severity::ALL.iter().rev() {
        let count = s.by_severity.get(severity).copied().unwrap_or(0);
        println!("  {:<10} {count:>6}", severity.as_str());
    }

    if !report.conditions.is_empty() || !report.failures.is_empty() {
        println!();
        println!("=== DETECTOR ISSUES ===");
        for condition in &report.conditions {
            println!("  skipped: {condition:?}");
        }
        for failure in &report.failures {
            println!("  failed:  {} | {}", failure.detector, failure.error);
        }
    }

    if top > 0 && !report.detections.is_empty() {
        println!();
        println!("=== TOP {top} BY ESTIMATED LOSS ===");
        let mut ranked: Vec<_> = report.detections.iter().collect();
        ranked.sort_by(|a, b| b.estimated_loss.total_cmp(&a.estimated_loss));
        for d in ranked.into_iter().take(top) {
            println!(
                "  {} | {} | {} | ${:.2} | conf {:.2}",
                d.contract_id, d.leakage_type, d.severity, d.estimated_loss, d.confidence
            );
        }
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
