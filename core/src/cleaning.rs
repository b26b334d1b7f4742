//! Source-table cleaning, applied before any join.
//!
//! RULES:
//!   - Exact duplicate rows are removed from every table.
//!   - `contract_id` identifies a contract. When two contract rows share an
//!     id but differ in other fields, the first row wins and the rest are
//!     dropped.
//!   - Non-finite numbers become 0. A malformed number is never a leakage
//!     signal on its own.
//!   - Negative billed amounts are clamped to 0.
//!   - Usage rows with negative amounts are dropped (data-quality defect).
//!   - Missing billing status becomes "UNKNOWN".

use crate::records::{BillingEvent, Contract, SourceTables, UsageEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// What cleaning changed, per table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub duplicates_removed:            usize,
    pub conflicting_contracts_dropped: usize,
    pub non_finite_zeroed:             usize,
    pub negative_amounts_clamped:      usize,
    pub negative_usage_dropped:        usize,
    pub statuses_filled:               usize,
}

impl CleaningReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Clean every table in place and report what changed.
pub fn clean_sources(mut sources: SourceTables) -> (SourceTables, CleaningReport) {
    let mut report = CleaningReport::default();

    report.duplicates_removed += dedupe(&mut sources.contracts);
    report.conflicting_contracts_dropped += keep_first_contract_per_id(&mut sources.contracts);
    for contract in &mut sources.contracts {
        let zeroed = zero_contract_non_finite(contract);
        report.non_finite_zeroed += zeroed;
    }

    if let Some(customers) = sources.customers.as_mut() {
        report.duplicates_removed += dedupe(customers);
    }
    if let Some(provisioning) = sources.provisioning.as_mut() {
        report.duplicates_removed += dedupe(provisioning);
    }

    if let Some(billing) = sources.billing.as_mut() {
        report.duplicates_removed += dedupe(billing);
        for bill in billing.iter_mut() {
            clean_bill(bill, &mut report);
        }
    }

    if let Some(usage) = sources.usage.as_mut() {
        report.duplicates_removed += dedupe(usage);
        let dropped = drop_negative_usage(usage, &mut report);
        report.negative_usage_dropped += dropped;
    }

    if report.is_clean() {
        log::debug!("cleaning: all source tables already clean");
    } else {
        log::info!(
            "cleaning: {} duplicates, {} conflicting contracts, {} non-finite, {} negative amounts, {} negative usage rows, {} statuses filled",
            report.duplicates_removed,
            report.conflicting_contracts_dropped,
            report.non_finite_zeroed,
            report.negative_amounts_clamped,
            report.negative_usage_dropped,
            report.statuses_filled,
        );
    }

    (sources, report)
}

/// Keep the first row for each `contract_id`. Returns the number dropped.
fn keep_first_contract_per_id(contracts: &mut Vec<Contract>) -> usize {
    let before = contracts.len();
    let mut seen = HashSet::new();
    contracts.retain(|c| {
        let first = seen.insert(c.contract_id.clone());
        if !first {
            log::warn!("cleaning: dropping conflicting row for contract {}", c.contract_id);
        }
        first
    });
    before - contracts.len()
}

/// Remove exact duplicate rows, keeping first occurrences in order.
/// Returns the number of rows removed.
fn dedupe<T: Serialize>(rows: &mut Vec<T>) -> usize {
    let before = rows.len();
    let mut seen = HashSet::with_capacity(before);
    // Serialized form is the row identity: every field participates.
    rows.retain(|row| match serde_json::to_string(row) {
        Ok(key) => seen.insert(key),
        Err(_) => true,
    });
    before - rows.len()
}

fn finite_or_zero(value: &mut f64) -> usize {
    if value.is_finite() {
        0
    } else {
        *value = 0.0;
        1
    }
}

fn zero_contract_non_finite(c: &mut Contract) -> usize {
    finite_or_zero(&mut c.base_rate)
        + finite_or_zero(&mut c.tier_multiplier)
        + finite_or_zero(&mut c.contracted_rate)
        + finite_or_zero(&mut c.included_usage)
        + finite_or_zero(&mut c.overage_rate)
}

fn clean_bill(bill: &mut BillingEvent, report: &mut CleaningReport) {
    report.non_finite_zeroed += finite_or_zero(&mut bill.base_charge)
        + finite_or_zero(&mut bill.overage_charge)
        + finite_or_zero(&mut bill.total_amount);

    if bill.total_amount < 0.0 {
        bill.total_amount = 0.0;
        report.negative_amounts_clamped += 1;
    }

    if bill.status.is_none() {
        bill.status = Some(UNKNOWN_STATUS.to_string());
        report.statuses_filled += 1;
    }
}

fn drop_negative_usage(usage: &mut Vec<UsageEvent>, report: &mut CleaningReport) -> usize {
    for event in usage.iter_mut() {
        report.non_finite_zeroed += finite_or_zero(&mut event.usage_amount);
    }
    let before = usage.len();
    usage.retain(|event| event.usage_amount >= 0.0);
    before - usage.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn bill(id: &str, amount: f64) -> BillingEvent {
        BillingEvent {
            billing_id:         id.into(),
            contract_id:        "CNT1".into(),
            billing_month:      "2024-03".into(),
            billing_date:       day(1),
            base_charge:        amount,
            overage_charge:     0.0,
            total_amount:       amount,
            status:             Some("PAID".into()),
            billing_error_type: None,
            rate_error:         false,
        }
    }

    fn contract(id: &str, rate: f64) -> Contract {
        Contract {
            contract_id:       id.into(),
            customer_id:       "CUST1".into(),
            service_type:      "TV".into(),
            start_date:        day(1),
            end_date:          day(31),
            base_rate:         rate,
            tier_multiplier:   1.0,
            contracted_rate:   rate,
            is_promotional:    false,
            promo_expiry_date: None,
            usage_based:       false,
            usage_unit:        "subscription".into(),
            included_usage:    0.0,
            overage_rate:      0.0,
        }
    }

    fn usage(id: &str, amount: f64) -> UsageEvent {
        UsageEvent {
            usage_id:     id.into(),
            contract_id:  "CNT1".into(),
            usage_date:   day(2),
            usage_amount: amount,
        }
    }

    #[test]
    fn exact_duplicates_are_removed_but_distinct_ids_survive() {
        let sources = SourceTables {
            billing: Some(vec![bill("B1", 10.0), bill("B1", 10.0), bill("B2", 10.0)]),
            ..Default::default()
        };
        let (cleaned, report) = clean_sources(sources);
        assert_eq!(cleaned.billing.unwrap().len(), 2);
        assert_eq!(report.duplicates_removed, 1);
    }

    #[test]
    fn negative_usage_is_dropped_and_negative_bills_clamped() {
        let mut unpaid = bill("B3", -40.0);
        unpaid.status = None;
        let sources = SourceTables {
            billing: Some(vec![unpaid]),
            usage:   Some(vec![usage("U1", 5.0), usage("U2", -1.0)]),
            ..Default::default()
        };
        let (cleaned, report) = clean_sources(sources);

        let billing = cleaned.billing.unwrap();
        assert_eq!(billing[0].total_amount, 0.0);
        assert_eq!(billing[0].status.as_deref(), Some(UNKNOWN_STATUS));
        assert_eq!(cleaned.usage.unwrap().len(), 1);
        assert_eq!(report.negative_amounts_clamped, 1);
        assert_eq!(report.negative_usage_dropped, 1);
        assert_eq!(report.statuses_filled, 1);
    }

    #[test]
    fn non_finite_amounts_become_zero() {
        let sources = SourceTables {
            billing: Some(vec![bill("B4", f64::NAN)]),
            ..Default::default()
        };
        let (cleaned, report) = clean_sources(sources);
        let billing = cleaned.billing.unwrap();
        assert_eq!(billing[0].total_amount, 0.0);
        assert_eq!(billing[0].base_charge, 0.0);
        assert_eq!(report.non_finite_zeroed, 2);
    }

    #[test]
    fn first_contract_row_wins_when_ids_conflict() {
        let sources = SourceTables {
            contracts: vec![
                contract("CNT1", 100.0),
                contract("CNT2", 50.0),
                contract("CNT1", 200.0),
                contract("CNT1", 100.0),
            ],
            ..Default::default()
        };
        let (cleaned, report) = clean_sources(sources);

        let ids: Vec<&str> = cleaned.contracts.iter().map(|c| c.contract_id.as_str()).collect();
        assert_eq!(ids, ["CNT1", "CNT2"]);
        assert_eq!(cleaned.contracts[0].contracted_rate, 100.0);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.conflicting_contracts_dropped, 1);
        assert!(!report.is_clean());
    }
}
