//! Source-record builders shared by the integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use leakage_core::{
    detection::RunContext,
    records::{BillingEvent, Contract, Customer, SourceTables, UsageEvent},
    types::{CustomerStatus, CustomerTier},
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn context(run_id: &str) -> RunContext {
    RunContext::new(run_id.into(), Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap())
}

pub fn customer(id: &str, status: CustomerStatus) -> Customer {
    Customer {
        customer_id:   id.into(),
        customer_name: format!("Customer {id}"),
        tier:          CustomerTier::Basic,
        status,
        email:         format!("{id}@example.com"),
        phone:         "+1-555-1234567".into(),
        address:       "100 Main St, City 1".into(),
        signup_date:   day(2024, 1, 1),
    }
}

/// A flat-rate contract: base 100, tier 1.0, contracted 100.
pub fn contract(id: &str, customer_id: &str) -> Contract {
    Contract {
        contract_id:       id.into(),
        customer_id:       customer_id.into(),
        service_type:      "TV".into(),
        start_date:        day(2024, 1, 1),
        end_date:          day(2025, 12, 31),
        base_rate:         100.0,
        tier_multiplier:   1.0,
        contracted_rate:   100.0,
        is_promotional:    false,
        promo_expiry_date: None,
        usage_based:       false,
        usage_unit:        "subscription".into(),
        included_usage:    0.0,
        overage_rate:      0.0,
    }
}

pub fn metered_contract(id: &str, customer_id: &str, included: f64, overage_rate: f64) -> Contract {
    Contract {
        service_type: "Internet".into(),
        usage_based: true,
        usage_unit: "GB".into(),
        included_usage: included,
        overage_rate,
        ..contract(id, customer_id)
    }
}

pub fn bill(id: &str, contract_id: &str, month: u32, total: f64) -> BillingEvent {
    BillingEvent {
        billing_id:         id.into(),
        contract_id:        contract_id.into(),
        billing_month:      format!("2024-{month:02}"),
        billing_date:       day(2024, month, 1),
        base_charge:        total,
        overage_charge:     0.0,
        total_amount:       total,
        status:             Some("PAID".into()),
        billing_error_type: None,
        rate_error:         false,
    }
}

pub fn usage(id: &str, contract_id: &str, date: NaiveDate, amount: f64) -> UsageEvent {
    UsageEvent {
        usage_id:     id.into(),
        contract_id:  contract_id.into(),
        usage_date:   date,
        usage_amount: amount,
    }
}

/// Every optional source present, provisioning empty.
pub fn sources(
    contracts: Vec<Contract>,
    customers: Vec<Customer>,
    usage: Vec<UsageEvent>,
    billing: Vec<BillingEvent>,
) -> SourceTables {
    SourceTables {
        contracts,
        customers:    Some(customers),
        provisioning: Some(Vec::new()),
        usage:        Some(usage),
        billing:      Some(billing),
    }
}
