//! Join engine contract: one row per contract, aggregated before joining,
//! and a pure function of its inputs.

mod common;

use common::{bill, contract, customer, day, metered_contract, sources, usage};
use leakage_core::{
    engine::prepare_table,
    feature_engineer::FeatureEngineer,
    join_engine::join,
    records::SourceTables,
    sample_data::SampleDataGenerator,
    types::CustomerStatus,
};

fn many_events() -> SourceTables {
    let mut bills = Vec::new();
    let mut readings = Vec::new();
    for month in 1..=6 {
        bills.push(bill(&format!("B-A{month}"), "CNT-A", month, 100.0));
        bills.push(bill(&format!("B-M{month}"), "CNT-M", month, 60.0));
        readings.push(usage(&format!("U-M{month}"), "CNT-M", day(2024, month, 5), 40.0));
    }
    sources(
        vec![
            contract("CNT-A", "CUST-A"),
            metered_contract("CNT-M", "CUST-A", 100.0, 0.5),
            contract("CNT-X", "CUST-UNKNOWN"),
        ],
        vec![customer("CUST-A", CustomerStatus::Active)],
        readings,
        bills,
    )
}

#[test]
fn output_has_exactly_one_row_per_contract() {
    let tables = many_events();
    let joined = join(&tables);
    assert_eq!(joined.len(), tables.contracts.len());

    let ids: Vec<&str> = joined.iter().map(|r| r.contract_id.as_str()).collect();
    assert_eq!(ids, ["CNT-A", "CNT-M", "CNT-X"], "base table order is kept");
}

#[test]
fn event_rows_are_reduced_per_contract() {
    let joined = join(&many_events());
    let a = &joined.records[0];
    assert_eq!(a.bill_count, 6);
    assert_eq!(a.total_billed, 600.0);
    assert_eq!(a.avg_bill_amount, 100.0);
    assert_eq!(a.first_bill_date, Some(day(2024, 1, 1)));
    assert_eq!(a.last_bill_date, Some(day(2024, 6, 1)));
    assert_eq!(a.billing_status.as_deref(), Some("PAID"));

    let m = &joined.records[1];
    assert_eq!(m.total_usage, 240.0);
    assert_eq!(m.usage_days, 6);
    assert_eq!(m.max_daily_usage, 40.0);
}

#[test]
fn unmatched_rows_default_to_zero_and_unknown_customers_stay_empty() {
    let joined = join(&many_events());
    let x = &joined.records[2];
    assert_eq!(x.bill_count, 0);
    assert_eq!(x.total_billed, 0.0);
    assert_eq!(x.total_usage, 0.0);
    assert!(x.error_types.is_empty());
    assert_eq!(x.customer_name, None);
    assert_eq!(x.status, None);
    assert_eq!(x.display_name(), "CUST-UNKNOWN");
}

#[test]
fn preparing_the_same_sources_twice_is_identical() {
    let tables = SampleDataGenerator::new(15, 9).generate().unwrap();
    let (first, report_a) = prepare_table(tables.clone(), &FeatureEngineer::new());
    let (second, report_b) = prepare_table(tables.clone(), &FeatureEngineer::new());
    assert_eq!(first, second);
    assert_eq!(report_a, report_b);
    assert_eq!(first.len(), tables.contracts.len());
}

#[test]
fn exact_duplicate_events_are_cleaned_before_aggregation() {
    let mut tables = many_events();
    let repeat = tables.billing.as_ref().unwrap()[0].clone();
    tables.billing.as_mut().unwrap().push(repeat);

    let (joined, report) = prepare_table(tables, &FeatureEngineer::new());
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(joined.records[0].bill_count, 6);
}

#[test]
fn conflicting_contract_rows_keep_one_row_per_id() {
    let mut tables = many_events();
    let mut repriced = contract("CNT-A", "CUST-A");
    repriced.contracted_rate = 250.0;
    tables.contracts.push(repriced);

    let (joined, report) = prepare_table(tables, &FeatureEngineer::new());
    assert_eq!(report.conflicting_contracts_dropped, 1);
    assert_eq!(joined.len(), 3);
    assert_eq!(joined.records[0].contracted_rate, 100.0);
    assert_eq!(joined.records[0].bill_count, 6);
}
