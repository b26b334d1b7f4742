//! Deterministic sample-data generator.
//!
//! Produces a year of customers, contracts, provisioning, daily usage and
//! monthly bills, with known leakage injected into the bills:
//!
//!   missing charge              10%   total = 0, tagged MISSING_CHARGE
//!   incorrect rate               5%   total × U(0.5, 0.9), rate_error
//!   usage mismatch               8%   overage billed on U(0.3, 0.8) of usage
//!   expired promo not repriced  30%   of post-expiry bills, rate_error
//!   duplicates                  min(bills / 20, 50) copies, DUPLICATE_ENTRY
//!
//! RULE: same seed, same tables. Every draw comes from the seed's streams.

use crate::{
    error::{LeakageError, LeakageResult},
    records::{BillingEvent, Contract, Customer, ProvisioningEvent, SourceTables, UsageEvent},
    rng::{RngBank, StreamRng, StreamSlot},
    types::{CustomerStatus, CustomerTier},
};
use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::BTreeMap;

// ── Constants ────────────────────────────────────────────────────────────────

pub const MISSING_CHARGE_TAG: &str = "MISSING_CHARGE";
pub const INCORRECT_RATE_TAG: &str = "INCORRECT_RATE";
pub const USAGE_MISMATCH_TAG: &str = "USAGE_MISMATCH";
pub const DUPLICATE_ENTRY_TAG: &str = "DUPLICATE_ENTRY";

const MISSING_CHARGE_RATE: f64 = 0.10;
const INCORRECT_RATE_RATE: f64 = 0.05;
const USAGE_MISMATCH_RATE: f64 = 0.08;
const STALE_PROMO_RATE: f64 = 0.30;
const PROMOTION_RATE: f64 = 0.30;
const USAGE_DAY_RATE: f64 = 0.80;
const MAX_DUPLICATES: usize = 50;
const CONTRACT_DAYS: u64 = 365 * 2;

struct ServiceSpec {
    name:        &'static str,
    base_rate:   f64,
    usage_based: bool,
    unit:        &'static str,
    /// Daily usage range; integer draws when `whole` is set.
    daily:       (f64, f64),
    whole:       bool,
}

const SERVICES: [ServiceSpec; 6] = [
    ServiceSpec { name: "Internet",      base_rate: 50.0, usage_based: true,  unit: "GB",           daily: (5.0, 100.0), whole: false },
    ServiceSpec { name: "Phone",         base_rate: 25.0, usage_based: true,  unit: "minutes",      daily: (10.0, 300.0), whole: false },
    ServiceSpec { name: "TV",            base_rate: 80.0, usage_based: false, unit: "subscription", daily: (1.0, 1.0),   whole: true },
    ServiceSpec { name: "Cloud_Storage", base_rate: 10.0, usage_based: true,  unit: "GB",           daily: (1.0, 50.0),  whole: false },
    ServiceSpec { name: "VPN",           base_rate: 15.0, usage_based: false, unit: "subscription", daily: (1.0, 1.0),   whole: true },
    ServiceSpec { name: "Email",         base_rate: 5.0,  usage_based: true,  unit: "mailboxes",    daily: (1.0, 20.0),  whole: true },
];

const BILL_STATUSES: [&str; 5] = ["PAID", "PAID", "PAID", "PENDING", "OVERDUE"];
const MODIFICATIONS: [&str; 3] = ["UPGRADE", "DOWNGRADE", "MODIFY"];

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

// ── Generator ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SampleDataGenerator {
    pub customers: usize,
    pub year:      i32,
    pub seed:      u64,
}

impl Default for SampleDataGenerator {
    fn default() -> Self {
        Self { customers: 1_000, year: 2024, seed: 42 }
    }
}

impl SampleDataGenerator {
    pub fn new(customers: usize, seed: u64) -> Self {
        Self { customers, seed, ..Self::default() }
    }

    pub fn generate(&self) -> LeakageResult<SourceTables> {
        let year_start = NaiveDate::from_ymd_opt(self.year, 1, 1);
        let year_end = NaiveDate::from_ymd_opt(self.year, 12, 31);
        let (Some(year_start), Some(year_end)) = (year_start, year_end) else {
            return Err(LeakageError::InvalidValue { field: "year", value: self.year.to_string() });
        };

        let bank = RngBank::new(self.seed);
        let customers = self.customer_rows(&mut bank.for_stream(StreamSlot::Customers), year_start);
        let contracts = contracts(&mut bank.for_stream(StreamSlot::Contracts), &customers);
        let provisioning = provisioning(&mut bank.for_stream(StreamSlot::Provisioning), &contracts);
        let (usage, monthly) = usage(&mut bank.for_stream(StreamSlot::Usage), &contracts, year_end);
        let mut billing = billing(&mut bank.for_stream(StreamSlot::Billing), &contracts, &monthly, year_end);
        let duplicates = duplicates(&mut bank.for_stream(StreamSlot::Duplicates), &billing);
        billing.extend(duplicates);

        log::info!(
            "sample data: {} customers, {} contracts, {} provisioning, {} usage, {} bills",
            customers.len(),
            contracts.len(),
            provisioning.len(),
            usage.len(),
            billing.len()
        );

        Ok(SourceTables {
            contracts,
            customers:    Some(customers),
            provisioning: Some(provisioning),
            usage:        Some(usage),
            billing:      Some(billing),
        })
    }

    fn customer_rows(&self, rng: &mut StreamRng, year_start: NaiveDate) -> Vec<Customer> {
        (1..=self.customers)
            .map(|n| Customer {
                customer_id:   format!("CUST{n:06}"),
                customer_name: format!("Customer {n}"),
                tier:          *rng.pick(&CustomerTier::ALL),
                status:        [CustomerStatus::Active, CustomerStatus::Suspended, CustomerStatus::Cancelled]
                    [rng.weighted(&[4.0, 1.0, 1.0])],
                email:         format!("customer{n}@example.com"),
                phone:         format!("+1-555-{}", rng.between(1_000_000, 9_999_999)),
                address:       format!("{} Main St, City {n}", rng.between(100, 9_999)),
                signup_date:   year_start + Days::new(u64::from(rng.between(0, 30))),
            })
            .collect()
    }
}

fn contracts(rng: &mut StreamRng, customers: &[Customer]) -> Vec<Contract> {
    let mut out = Vec::new();
    for customer in customers {
        let count = rng.between(1, 3) as usize;
        for idx in rng.sample_indices(SERVICES.len(), count) {
            let spec = &SERVICES[idx];
            let is_promotional = rng.chance(PROMOTION_RATE);
            let (discount, promo_expiry_date) = if is_promotional {
                let discount = rng.uniform(0.2, 0.5);
                let expiry = customer.signup_date + Days::new(u64::from(rng.between(90, 365)));
                (discount, Some(expiry))
            } else {
                (0.0, None)
            };
            let tier_multiplier = customer.tier.rate_multiplier();
            out.push(Contract {
                contract_id: format!("CNT{:06}", out.len() + 1),
                customer_id: customer.customer_id.clone(),
                service_type: spec.name.to_string(),
                start_date: customer.signup_date,
                end_date: customer.signup_date + Days::new(CONTRACT_DAYS),
                base_rate: spec.base_rate,
                tier_multiplier,
                contracted_rate: spec.base_rate * tier_multiplier * (1.0 - discount),
                is_promotional,
                promo_expiry_date,
                usage_based: spec.usage_based,
                usage_unit: spec.unit.to_string(),
                included_usage: if spec.usage_based { f64::from(rng.between(100, 1_000)) } else { 0.0 },
                overage_rate: if spec.usage_based { round2(spec.base_rate * 0.1) } else { 0.0 },
            });
        }
    }
    out
}

fn provisioning(rng: &mut StreamRng, contracts: &[Contract]) -> Vec<ProvisioningEvent> {
    let mut out = Vec::new();
    let push = |out: &mut Vec<ProvisioningEvent>, c: &Contract, action: &str, date: NaiveDate| {
        out.push(ProvisioningEvent {
            provisioning_id: format!("PROV{:06}", out.len() + 1),
            contract_id:     c.contract_id.clone(),
            customer_id:     c.customer_id.clone(),
            action:          action.to_string(),
            action_date:     date,
            status:          "COMPLETED".to_string(),
        });
    };
    for c in contracts {
        push(&mut out, c, "ACTIVATE", c.start_date);
        if rng.chance(0.2) {
            let action = *rng.pick(&MODIFICATIONS);
            let date = c.start_date + Days::new(u64::from(rng.between(30, 300)));
            push(&mut out, c, action, date);
        }
        if rng.chance(0.1) {
            let date = c.start_date + Days::new(u64::from(rng.between(60, 350)));
            push(&mut out, c, "DEACTIVATE", date);
        }
    }
    out
}

/// Per-(contract, month) usage totals, for billing.
type MonthlyUsage = BTreeMap<(String, NaiveDate), f64>;

fn usage(
    rng: &mut StreamRng,
    contracts: &[Contract],
    year_end: NaiveDate,
) -> (Vec<UsageEvent>, MonthlyUsage) {
    let mut events = Vec::new();
    let mut monthly = MonthlyUsage::new();
    for c in contracts.iter().filter(|c| c.usage_based) {
        let Some(spec) = SERVICES.iter().find(|s| s.name == c.service_type) else {
            continue;
        };
        let last = c.end_date.min(year_end);
        let mut day = c.start_date;
        while day <= last {
            if rng.chance(USAGE_DAY_RATE) {
                let (lo, hi) = spec.daily;
                let amount = if spec.whole {
                    f64::from(rng.between(lo as u32, hi as u32))
                } else {
                    round2(rng.uniform(lo, hi))
                };
                events.push(UsageEvent {
                    usage_id:     format!("USAGE{:07}", events.len() + 1),
                    contract_id:  c.contract_id.clone(),
                    usage_date:   day,
                    usage_amount: amount,
                });
                *monthly.entry((c.contract_id.clone(), first_of_month(day))).or_insert(0.0) += amount;
            }
            day = day + Days::new(1);
        }
    }
    (events, monthly)
}

fn billing(
    rng: &mut StreamRng,
    contracts: &[Contract],
    monthly: &MonthlyUsage,
    year_end: NaiveDate,
) -> Vec<BillingEvent> {
    let mut out = Vec::new();
    for c in contracts {
        let last_month = first_of_month(c.end_date.min(year_end));
        let mut month = first_of_month(c.start_date);
        while month <= last_month {
            let total_usage = monthly
                .get(&(c.contract_id.clone(), month))
                .copied()
                .unwrap_or(0.0);
            let base_charge = c.contracted_rate;

            // Past promo expiry the rate should revert; sometimes it doesn't.
            let mut rate_error =
                c.promo_expiry_date.is_some_and(|expiry| month > expiry) && rng.chance(STALE_PROMO_RATE);

            let mut overage_charge = if c.usage_based && total_usage > c.included_usage {
                (total_usage - c.included_usage) * c.overage_rate
            } else {
                0.0
            };
            let mut total_amount = base_charge + overage_charge;
            let mut error_type = None;

            if rng.chance(MISSING_CHARGE_RATE) {
                total_amount = 0.0;
                error_type = Some(MISSING_CHARGE_TAG);
            } else if rng.chance(INCORRECT_RATE_RATE) {
                total_amount *= rng.uniform(0.5, 0.9);
                error_type = Some(INCORRECT_RATE_TAG);
                rate_error = true;
            } else if rng.chance(USAGE_MISMATCH_RATE) && c.usage_based {
                let wrong_usage = total_usage * rng.uniform(0.3, 0.8);
                overage_charge = if wrong_usage > c.included_usage {
                    (wrong_usage - c.included_usage) * c.overage_rate
                } else {
                    0.0
                };
                total_amount = base_charge + overage_charge;
                error_type = Some(USAGE_MISMATCH_TAG);
            }

            out.push(BillingEvent {
                billing_id:         format!("BILL{:07}", out.len() + 1),
                contract_id:        c.contract_id.clone(),
                billing_month:      month.format("%Y-%m").to_string(),
                billing_date:       month,
                base_charge,
                overage_charge,
                total_amount:       round2(total_amount),
                status:             Some(rng.pick(&BILL_STATUSES).to_string()),
                billing_error_type: error_type.map(str::to_string),
                rate_error,
            });

            let Some(next) = month.checked_add_months(Months::new(1)) else {
                break;
            };
            month = next;
        }
    }
    out
}

fn duplicates(rng: &mut StreamRng, billing: &[BillingEvent]) -> Vec<BillingEvent> {
    let count = (billing.len() / 20).min(MAX_DUPLICATES);
    rng.sample_indices(billing.len(), count)
        .into_iter()
        .enumerate()
        .map(|(n, idx)| BillingEvent {
            billing_id:         format!("BILLD{:05}", n + 1),
            billing_error_type: Some(DUPLICATE_ENTRY_TAG.to_string()),
            ..billing[idx].clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_tables() {
        let a = SampleDataGenerator::new(25, 7).generate().unwrap();
        let b = SampleDataGenerator::new(25, 7).generate().unwrap();
        assert_eq!(a, b);

        let c = SampleDataGenerator::new(25, 8).generate().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn every_customer_gets_one_to_three_contracts() {
        let t = SampleDataGenerator::new(40, 1).generate().unwrap();
        let mut per_customer: BTreeMap<&str, usize> = BTreeMap::new();
        for c in &t.contracts {
            *per_customer.entry(c.customer_id.as_str()).or_default() += 1;
        }
        assert_eq!(per_customer.len(), 40);
        assert!(per_customer.values().all(|n| (1..=3).contains(n)));
    }

    #[test]
    fn usage_only_for_metered_services_and_never_negative() {
        let t = SampleDataGenerator::new(20, 3).generate().unwrap();
        let metered: Vec<&str> = t
            .contracts
            .iter()
            .filter(|c| c.usage_based)
            .map(|c| c.contract_id.as_str())
            .collect();
        for u in t.usage.as_ref().unwrap() {
            assert!(metered.contains(&u.contract_id.as_str()));
            assert!(u.usage_amount >= 0.0);
        }
    }

    #[test]
    fn duplicates_are_tagged_and_bounded() {
        let t = SampleDataGenerator::new(60, 5).generate().unwrap();
        let billing = t.billing.unwrap();
        let dups = billing
            .iter()
            .filter(|b| b.billing_error_type.as_deref() == Some(DUPLICATE_ENTRY_TAG))
            .count();
        let originals = billing.len() - dups;
        assert_eq!(dups, (originals / 20).min(MAX_DUPLICATES));
    }
}
