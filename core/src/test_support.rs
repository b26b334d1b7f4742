//! Hand-built fixtures for unit tests.

use crate::{
    detection::RunContext,
    joined::{JoinedRecord, JoinedTable, LeakageFeatures, SourceAvailability},
};
use chrono::{NaiveDate, TimeZone, Utc};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A joined row with every number at 0 and no customer attached.
pub fn record(contract_id: &str) -> JoinedRecord {
    JoinedRecord {
        contract_id:       contract_id.to_string(),
        customer_id:       format!("CUST-{contract_id}"),
        service_type:      "Internet".into(),
        start_date:        day(2024, 1, 1),
        end_date:          day(2025, 12, 31),
        base_rate:         0.0,
        tier_multiplier:   0.0,
        contracted_rate:   0.0,
        is_promotional:    false,
        promo_expiry_date: None,
        usage_based:       false,
        usage_unit:        "units".into(),
        included_usage:    0.0,
        overage_rate:      0.0,

        customer_name: None,
        tier:          None,
        status:        None,
        email:         None,

        total_billed:    0.0,
        avg_bill_amount: 0.0,
        bill_count:      0,
        first_bill_date: None,
        last_bill_date:  None,
        billing_status:  None,
        error_types:     Vec::new(),
        has_rate_error:  false,
        overage_charge:  0.0,

        total_usage:      0.0,
        avg_usage:        0.0,
        max_daily_usage:  0.0,
        usage_days:       0,
        first_usage_date: None,
        last_usage_date:  None,

        features: LeakageFeatures::default(),
    }
}

/// A table with every optional source present.
pub fn table(records: Vec<JoinedRecord>) -> JoinedTable {
    JoinedTable {
        records,
        sources: SourceAvailability {
            customers:    true,
            provisioning: true,
            usage:        true,
            billing:      true,
        },
    }
}

pub fn context() -> RunContext {
    RunContext::new("run-test".into(), Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap())
}
