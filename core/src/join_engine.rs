//! Join engine: fuses the raw sources into one row per contract.
//!
//! ORDER (fixed):
//!   1. Base table = contracts, in input order.
//!   2. Left-join the customer subset {name, tier, status, email}.
//!   3. Group billing events by contract and reduce, then left-join.
//!   4. Group usage events by contract and reduce, then left-join.
//!
//! RULE: aggregation always precedes joining. Joining event-grain rows
//! against contract-grain rows would fan out and duplicate contract
//! attributes. Output row count == contract row count, always.

use crate::{
    joined::{JoinedRecord, JoinedTable, LeakageFeatures, SourceAvailability},
    records::{BillingEvent, Contract, Customer, SourceTables, UsageEvent},
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Per-contract reduction of billing events.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingAggregate {
    pub total_billed:    f64,            // sum(total_amount)
    pub avg_bill_amount: f64,            // mean(total_amount)
    pub bill_count:      u32,            // count
    pub first_bill_date: NaiveDate,      // min(billing_date)
    pub last_bill_date:  NaiveDate,      // max(billing_date)
    pub billing_status:  String,         // mode(status)
    pub error_types:     Vec<String>,    // collect(non-null billing_error_type)
    pub has_rate_error:  bool,           // any(rate_error)
    pub overage_charge:  f64,            // sum(overage_charge)
}

impl BillingAggregate {
    /// Reduce one non-empty contract group.
    fn reduce(group: &[&BillingEvent]) -> Option<Self> {
        let amounts: Vec<f64> = group.iter().map(|b| b.total_amount).collect();
        let dates: Vec<NaiveDate> = group.iter().map(|b| b.billing_date).collect();
        let statuses = group.iter().filter_map(|b| b.status.as_deref());
        Some(Self {
            total_billed:    sum(&amounts),
            avg_bill_amount: mean(&amounts)?,
            bill_count:      count(group),
            first_bill_date: *dates.iter().min()?,
            last_bill_date:  *dates.iter().max()?,
            billing_status:  mode(statuses).unwrap_or_else(|| crate::cleaning::UNKNOWN_STATUS.into()),
            error_types:     group.iter().filter_map(|b| b.billing_error_type.clone()).collect(),
            has_rate_error:  group.iter().any(|b| b.rate_error),
            overage_charge:  sum(&group.iter().map(|b| b.overage_charge).collect::<Vec<_>>()),
        })
    }
}

/// Per-contract reduction of usage events.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageAggregate {
    pub total_usage:      f64,       // sum(usage_amount)
    pub avg_usage:        f64,       // mean(usage_amount)
    pub max_daily_usage:  f64,       // max(usage_amount)
    pub usage_days:       u32,       // count
    pub first_usage_date: NaiveDate, // min(usage_date)
    pub last_usage_date:  NaiveDate, // max(usage_date)
}

impl UsageAggregate {
    fn reduce(group: &[&UsageEvent]) -> Option<Self> {
        let amounts: Vec<f64> = group.iter().map(|u| u.usage_amount).collect();
        let dates: Vec<NaiveDate> = group.iter().map(|u| u.usage_date).collect();
        Some(Self {
            total_usage:      sum(&amounts),
            avg_usage:        mean(&amounts)?,
            max_daily_usage:  max(&amounts)?,
            usage_days:       count(group),
            first_usage_date: *dates.iter().min()?,
            last_usage_date:  *dates.iter().max()?,
        })
    }
}

// ── Named reducers ───────────────────────────────────────────────────────────

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(sum(values) / values.len() as f64)
    }
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn count<T>(group: &[T]) -> u32 {
    u32::try_from(group.len()).unwrap_or(u32::MAX)
}

/// Most frequent value. Ties resolve to the lexicographically smallest.
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, n) in counts {
        if best.map_or(true, |(_, best_n)| n > best_n) {
            best = Some((value, n));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// Group rows by contract id. BTreeMap keeps the reduction order stable.
fn group_by_contract<'a, T>(
    rows: &'a [T],
    key: impl Fn(&T) -> &str,
) -> BTreeMap<&'a str, Vec<&'a T>> {
    let mut groups: BTreeMap<&'a str, Vec<&'a T>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row);
    }
    groups
}

pub fn aggregate_billing(billing: &[BillingEvent]) -> BTreeMap<String, BillingAggregate> {
    group_by_contract(billing, |b| b.contract_id.as_str())
        .into_iter()
        .filter_map(|(id, group)| BillingAggregate::reduce(&group).map(|agg| (id.to_string(), agg)))
        .collect()
}

pub fn aggregate_usage(usage: &[UsageEvent]) -> BTreeMap<String, UsageAggregate> {
    group_by_contract(usage, |u| u.contract_id.as_str())
        .into_iter()
        .filter_map(|(id, group)| UsageAggregate::reduce(&group).map(|agg| (id.to_string(), agg)))
        .collect()
}

// ── Join ─────────────────────────────────────────────────────────────────────

/// Join the raw sources into one row per contract.
///
/// Derived features are left at their defaults; run the feature engineer
/// on the result.
pub fn join(sources: &SourceTables) -> JoinedTable {
    let customers: HashMap<&str, &Customer> = sources
        .customers
        .iter()
        .flatten()
        .map(|c| (c.customer_id.as_str(), c))
        .collect();

    let billing = sources.billing.as_deref().map(aggregate_billing).unwrap_or_default();
    let usage = sources.usage.as_deref().map(aggregate_usage).unwrap_or_default();

    let records: Vec<JoinedRecord> = sources
        .contracts
        .iter()
        .map(|contract| {
            join_one(
                contract,
                customers.get(contract.customer_id.as_str()).copied(),
                billing.get(&contract.contract_id),
                usage.get(&contract.contract_id),
            )
        })
        .collect();

    debug_assert_eq!(records.len(), sources.contracts.len());

    log::info!(
        "join: {} contracts, {} billed, {} with usage",
        records.len(),
        billing.len(),
        usage.len()
    );

    JoinedTable {
        records,
        sources: SourceAvailability {
            customers:    sources.customers.is_some(),
            provisioning: sources.provisioning.is_some(),
            usage:        sources.usage.is_some(),
            billing:      sources.billing.is_some(),
        },
    }
}

fn join_one(
    contract: &Contract,
    customer: Option<&Customer>,
    billing: Option<&BillingAggregate>,
    usage: Option<&UsageAggregate>,
) -> JoinedRecord {
    JoinedRecord {
        contract_id:       contract.contract_id.clone(),
        customer_id:       contract.customer_id.clone(),
        service_type:      contract.service_type.clone(),
        start_date:        contract.start_date,
        end_date:          contract.end_date,
        base_rate:         contract.base_rate,
        tier_multiplier:   contract.tier_multiplier,
        contracted_rate:   contract.contracted_rate,
        is_promotional:    contract.is_promotional,
        promo_expiry_date: contract.promo_expiry_date,
        usage_based:       contract.usage_based,
        usage_unit:        contract.usage_unit.clone(),
        included_usage:    contract.included_usage,
        overage_rate:      contract.overage_rate,

        customer_name: customer.map(|c| c.customer_name.clone()),
        tier:          customer.map(|c| c.tier),
        status:        customer.map(|c| c.status),
        email:         customer.map(|c| c.email.clone()),

        total_billed:    billing.map_or(0.0, |b| b.total_billed),
        avg_bill_amount: billing.map_or(0.0, |b| b.avg_bill_amount),
        bill_count:      billing.map_or(0, |b| b.bill_count),
        first_bill_date: billing.map(|b| b.first_bill_date),
        last_bill_date:  billing.map(|b| b.last_bill_date),
        billing_status:  billing.map(|b| b.billing_status.clone()),
        error_types:     billing.map(|b| b.error_types.clone()).unwrap_or_default(),
        has_rate_error:  billing.is_some_and(|b| b.has_rate_error),
        overage_charge:  billing.map_or(0.0, |b| b.overage_charge),

        total_usage:      usage.map_or(0.0, |u| u.total_usage),
        avg_usage:        usage.map_or(0.0, |u| u.avg_usage),
        max_daily_usage:  usage.map_or(0.0, |u| u.max_daily_usage),
        usage_days:       usage.map_or(0, |u| u.usage_days),
        first_usage_date: usage.map(|u| u.first_usage_date),
        last_usage_date:  usage.map(|u| u.last_usage_date),

        features: LeakageFeatures::default(),
    }
}
