//! Raw source records, exactly as the loader hands them to the pipeline.
//!
//! RULE: Records are immutable once loaded for a run.
//! Cleaning produces new vectors; nothing downstream mutates a source table.

use crate::types::{ContractId, CustomerId, CustomerStatus, CustomerTier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id:   CustomerId,
    pub customer_name: String,
    pub tier:          CustomerTier,
    pub status:        CustomerStatus,
    pub email:         String,
    pub phone:         String,
    pub address:       String,
    pub signup_date:   NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id:       ContractId,
    pub customer_id:       CustomerId,
    pub service_type:      String,
    pub start_date:        NaiveDate,
    pub end_date:          NaiveDate,
    pub base_rate:         f64,
    pub tier_multiplier:   f64,
    /// base_rate × tier_multiplier × (1 − promo discount), fixed when the
    /// contract was authored. Never recomputed here.
    pub contracted_rate:   f64,
    pub is_promotional:    bool,
    pub promo_expiry_date: Option<NaiveDate>,
    pub usage_based:       bool,
    pub usage_unit:        String,
    pub included_usage:    f64,
    pub overage_rate:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub provisioning_id: String,
    pub contract_id:     ContractId,
    pub customer_id:     CustomerId,
    pub action:          String, // ACTIVATE | UPGRADE | DOWNGRADE | MODIFY | DEACTIVATE
    pub action_date:     NaiveDate,
    pub status:          String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub usage_id:     String,
    pub contract_id:  ContractId,
    pub usage_date:   NaiveDate,
    /// Must be >= 0. Negative readings are dropped during cleaning.
    pub usage_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub billing_id:         String,
    pub contract_id:        ContractId,
    pub billing_month:      String, // "YYYY-MM"
    pub billing_date:       NaiveDate,
    pub base_charge:        f64,
    pub overage_charge:     f64,
    pub total_amount:       f64,
    pub status:             Option<String>,
    pub billing_error_type: Option<String>,
    /// Set by the upstream error-injection / validation process.
    pub rate_error:         bool,
}

/// The five raw sources for one run.
///
/// Contracts are the base table and always present. Every other source is
/// optional: `None` means the source was not supplied at all, which is a
/// valid state (no usage feed, no billing feed yet).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTables {
    pub contracts:    Vec<Contract>,
    pub customers:    Option<Vec<Customer>>,
    pub provisioning: Option<Vec<ProvisioningEvent>>,
    pub usage:        Option<Vec<UsageEvent>>,
    pub billing:      Option<Vec<BillingEvent>>,
}

impl SourceTables {
    pub fn total_records(&self) -> usize {
        self.contracts.len()
            + self.customers.as_ref().map_or(0, Vec::len)
            + self.provisioning.as_ref().map_or(0, Vec::len)
            + self.usage.as_ref().map_or(0, Vec::len)
            + self.billing.as_ref().map_or(0, Vec::len)
    }
}
