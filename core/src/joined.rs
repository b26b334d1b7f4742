//! The joined, one-row-per-contract table consumed by every detector.

use crate::types::{ContractId, CustomerId, CustomerStatus, CustomerTier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Derived leakage signals, filled in by the feature engineer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeakageFeatures {
    pub expected_monthly_revenue: f64,
    pub revenue_variance:         f64,
    pub revenue_variance_pct:     f64,
    pub expected_overage_usage:   f64,
    pub expected_overage_revenue: f64,
    pub leakage_risk_score:       u32,
}

/// One row per contract.
///
/// Numeric aggregates default to 0 when a source had no rows for the
/// contract; no-usage and no-billing are real states, not missing data.
/// Customer fields stay `None` for contracts whose customer is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    // ── Contract ──────────────────────────────────
    pub contract_id:       ContractId,
    pub customer_id:       CustomerId,
    pub service_type:      String,
    pub start_date:        NaiveDate,
    pub end_date:          NaiveDate,
    pub base_rate:         f64,
    pub tier_multiplier:   f64,
    pub contracted_rate:   f64,
    pub is_promotional:    bool,
    pub promo_expiry_date: Option<NaiveDate>,
    pub usage_based:       bool,
    pub usage_unit:        String,
    pub included_usage:    f64,
    pub overage_rate:      f64,

    // ── Customer ──────────────────────────────────
    pub customer_name: Option<String>,
    pub tier:          Option<CustomerTier>,
    pub status:        Option<CustomerStatus>,
    pub email:         Option<String>,

    // ── Billing aggregate ─────────────────────────
    pub total_billed:    f64,
    pub avg_bill_amount: f64,
    pub bill_count:      u32,
    pub first_bill_date: Option<NaiveDate>,
    pub last_bill_date:  Option<NaiveDate>,
    pub billing_status:  Option<String>,
    pub error_types:     Vec<String>,
    pub has_rate_error:  bool,
    pub overage_charge:  f64,

    // ── Usage aggregate ───────────────────────────
    pub total_usage:      f64,
    pub avg_usage:        f64,
    pub max_daily_usage:  f64,
    pub usage_days:       u32,
    pub first_usage_date: Option<NaiveDate>,
    pub last_usage_date:  Option<NaiveDate>,

    // ── Derived ───────────────────────────────────
    pub features: LeakageFeatures,
}

impl JoinedRecord {
    /// Numeric value of a named column, or `None` if no such numeric
    /// column exists. Booleans read as 0/1.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        let f = &self.features;
        let value = match column {
            "base_rate"                => self.base_rate,
            "tier_multiplier"          => self.tier_multiplier,
            "contracted_rate"          => self.contracted_rate,
            "included_usage"           => self.included_usage,
            "overage_rate"             => self.overage_rate,
            "is_promotional"           => bool_num(self.is_promotional),
            "usage_based"              => bool_num(self.usage_based),
            "total_billed"             => self.total_billed,
            "avg_bill_amount"          => self.avg_bill_amount,
            "bill_count"               => f64::from(self.bill_count),
            "has_rate_error"           => bool_num(self.has_rate_error),
            "overage_charge"           => self.overage_charge,
            "total_usage"              => self.total_usage,
            "avg_usage"                => self.avg_usage,
            "max_daily_usage"          => self.max_daily_usage,
            "usage_days"               => f64::from(self.usage_days),
            "expected_monthly_revenue" => f.expected_monthly_revenue,
            "revenue_variance"         => f.revenue_variance,
            "revenue_variance_pct"     => f.revenue_variance_pct,
            "expected_overage_usage"   => f.expected_overage_usage,
            "expected_overage_revenue" => f.expected_overage_revenue,
            "leakage_risk_score"       => f64::from(f.leakage_risk_score),
            _ => return None,
        };
        Some(value)
    }

    pub fn is_active(&self) -> bool {
        self.status == Some(CustomerStatus::Active)
    }

    /// Display name for descriptions: the customer name, else the id.
    pub fn display_name(&self) -> &str {
        self.customer_name.as_deref().unwrap_or(&self.customer_id)
    }
}

fn bool_num(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Which optional sources fed the join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAvailability {
    pub customers:    bool,
    pub provisioning: bool,
    pub usage:        bool,
    pub billing:      bool,
}

/// Optional sources a detector can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Customers,
    Usage,
    Billing,
}

impl SourceKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Usage     => "usage_events",
            Self::Billing   => "billing_events",
        }
    }
}

impl SourceAvailability {
    pub fn has(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Customers => self.customers,
            SourceKind::Usage     => self.usage,
            SourceKind::Billing   => self.billing,
        }
    }
}

/// The full joined snapshot for one run. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinedTable {
    pub records: Vec<JoinedRecord>,
    pub sources: SourceAvailability,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JoinedRecord> {
        self.records.iter()
    }
}
