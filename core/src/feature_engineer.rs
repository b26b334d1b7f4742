//! Feature engineer: derives leakage signals on top of the joined table.
//!
//! Pure: no I/O, no clock, no randomness.

use crate::joined::{JoinedRecord, JoinedTable, LeakageFeatures};

/// Variance percentage above which a contract counts as a revenue red flag.
pub const REVENUE_VARIANCE_FLAG_PCT: f64 = 10.0;

/// One binary red flag contributing 1 to `leakage_risk_score`.
#[derive(Clone, Copy)]
pub struct RiskIndicator {
    pub name: &'static str,
    pub test: fn(&JoinedRecord, &LeakageFeatures) -> bool,
}

impl std::fmt::Debug for RiskIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskIndicator").field("name", &self.name).finish()
    }
}

pub const REVENUE_VARIANCE_INDICATOR: RiskIndicator = RiskIndicator {
    name: "revenue_variance_over_10pct",
    test: |_, features| features.revenue_variance_pct.abs() > REVENUE_VARIANCE_FLAG_PCT,
};

pub const RATE_ERROR_INDICATOR: RiskIndicator = RiskIndicator {
    name: "upstream_rate_error",
    test: |record, _| record.has_rate_error,
};

#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    indicators: Vec<RiskIndicator>,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self {
            indicators: vec![REVENUE_VARIANCE_INDICATOR, RATE_ERROR_INDICATOR],
        }
    }
}

impl FeatureEngineer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a red-flag indicator. The risk score is an open sum, so callers
    /// only ever see a larger maximum.
    pub fn with_indicator(mut self, indicator: RiskIndicator) -> Self {
        self.indicators.push(indicator);
        self
    }

    pub fn indicator_names(&self) -> Vec<&'static str> {
        self.indicators.iter().map(|i| i.name).collect()
    }

    pub fn engineer(&self, mut table: JoinedTable) -> JoinedTable {
        for record in &mut table.records {
            record.features = self.features_for(record);
        }
        log::info!(
            "features: {} rows engineered, {} risk indicators",
            table.len(),
            self.indicators.len()
        );
        table
    }

    pub fn features_for(&self, record: &JoinedRecord) -> LeakageFeatures {
        let expected_monthly_revenue = record.contracted_rate * f64::from(record.bill_count);
        let revenue_variance = expected_monthly_revenue - record.total_billed;
        // Zero expected revenue means zero variance percentage, by policy.
        let revenue_variance_pct = if expected_monthly_revenue > 0.0 {
            revenue_variance / expected_monthly_revenue * 100.0
        } else {
            0.0
        };
        let expected_overage_usage = (record.total_usage - record.included_usage).max(0.0);
        let expected_overage_revenue = expected_overage_usage * record.overage_rate;

        let mut features = LeakageFeatures {
            expected_monthly_revenue,
            revenue_variance,
            revenue_variance_pct,
            expected_overage_usage,
            expected_overage_revenue,
            leakage_risk_score: 0,
        };
        features.leakage_risk_score = self
            .indicators
            .iter()
            .map(|indicator| u32::from((indicator.test)(record, &features)))
            .sum();
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[test]
    fn zero_expected_revenue_gives_zero_pct() {
        let mut r = record("CNT-Z");
        r.contracted_rate = 100.0;
        r.bill_count = 0;
        r.total_billed = 0.0;
        let f = FeatureEngineer::new().features_for(&r);
        assert_eq!(f.expected_monthly_revenue, 0.0);
        assert_eq!(f.revenue_variance_pct, 0.0);
        assert_eq!(f.leakage_risk_score, 0);
    }

    #[test]
    fn variance_and_overage_follow_formulas() {
        let mut r = record("CNT-V");
        r.contracted_rate = 50.0;
        r.bill_count = 4;
        r.total_billed = 150.0;
        r.total_usage = 1_200.0;
        r.included_usage = 1_000.0;
        r.overage_rate = 0.5;
        r.has_rate_error = true;

        let f = FeatureEngineer::new().features_for(&r);
        assert_eq!(f.expected_monthly_revenue, 200.0);
        assert_eq!(f.revenue_variance, 50.0);
        assert!((f.revenue_variance_pct - 25.0).abs() < 1e-9);
        assert_eq!(f.expected_overage_usage, 200.0);
        assert_eq!(f.expected_overage_revenue, 100.0);
        assert_eq!(f.leakage_risk_score, 2);
    }

    #[test]
    fn extra_indicators_extend_the_score() {
        let promo = RiskIndicator {
            name: "promotional",
            test: |record, _| record.is_promotional,
        };
        let engineer = FeatureEngineer::new().with_indicator(promo);
        let mut r = record("CNT-P");
        r.is_promotional = true;
        r.has_rate_error = true;
        assert_eq!(engineer.features_for(&r).leakage_risk_score, 2);
        assert_eq!(engineer.indicator_names().len(), 3);
    }
}
