//! Severity boundaries are part of the external contract.
//!
//! Every table is checked at each edge: `min` inclusive, `max` exclusive.
//! The shipped config file must carry the same tables as the defaults.

use leakage_core::{
    config::DetectionConfig,
    detection::Severity::{self, *},
    rules::SeverityTable,
};

const DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");

fn assert_edges(name: &str, table: &SeverityTable, edges: [f64; 3]) {
    let [medium, high, critical] = edges;
    let cases: [(f64, Severity); 8] = [
        (0.0, Low),
        (medium - 0.01, Low),
        (medium, Medium),
        (high - 0.01, Medium),
        (high, High),
        (critical - 0.01, High),
        (critical, Critical),
        (critical * 100.0, Critical),
    ];
    for (loss, expected) in cases {
        assert_eq!(table.classify(loss), expected, "{name}: loss {loss}");
    }
}

#[test]
fn missing_charges_edges() {
    assert_edges("missing_charges", &SeverityTable::missing_charges(), [100.0, 1_000.0, 5_000.0]);
}

#[test]
fn incorrect_rates_edges() {
    assert_edges("incorrect_rates", &SeverityTable::incorrect_rates(), [50.0, 500.0, 2_000.0]);
}

#[test]
fn usage_mismatches_edges() {
    assert_edges("usage_mismatches", &SeverityTable::usage_mismatches(), [25.0, 200.0, 1_000.0]);
}

#[test]
fn duplicate_entries_edges() {
    assert_edges("duplicate_entries", &SeverityTable::duplicate_entries(), [50.0, 200.0, 1_000.0]);
}

#[test]
fn shipped_config_uses_the_contract_tables() {
    let config = DetectionConfig::load(DATA_DIR).expect("load shipped config");
    let tables = &config.severity_tables;
    assert_edges("file missing_charges", &tables.missing_charges, [100.0, 1_000.0, 5_000.0]);
    assert_edges("file incorrect_rates", &tables.incorrect_rates, [50.0, 500.0, 2_000.0]);
    assert_edges("file usage_mismatches", &tables.usage_mismatches, [25.0, 200.0, 1_000.0]);
    assert_edges("file duplicate_entries", &tables.duplicate_entries, [50.0, 200.0, 1_000.0]);
}

#[test]
fn missing_config_file_is_an_error() {
    assert!(DetectionConfig::load("/nonexistent/leakage-data").is_err());
}
