//! Shared primitive types used across the entire pipeline.

use crate::error::LeakageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable identifier for a contract. Every joined row is keyed by one.
pub type ContractId = String;

/// A stable identifier for a customer.
pub type CustomerId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Customer tier. Ordered: Basic < Premium < Enterprise < VIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CustomerTier {
    Basic,
    Premium,
    Enterprise,
    #[serde(rename = "VIP")]
    Vip,
}

impl CustomerTier {
    pub const ALL: [CustomerTier; 4] = [
        CustomerTier::Basic,
        CustomerTier::Premium,
        CustomerTier::Enterprise,
        CustomerTier::Vip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic      => "Basic",
            Self::Premium    => "Premium",
            Self::Enterprise => "Enterprise",
            Self::Vip        => "VIP",
        }
    }

    /// Price multiplier applied to a service's base rate for this tier.
    pub fn rate_multiplier(&self) -> f64 {
        match self {
            Self::Basic      => 1.0,
            Self::Premium    => 1.2,
            Self::Enterprise => 1.5,
            Self::Vip        => 1.8,
        }
    }
}

impl fmt::Display for CustomerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomerTier {
    type Err = LeakageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Basic"      => Ok(Self::Basic),
            "Premium"    => Ok(Self::Premium),
            "Enterprise" => Ok(Self::Enterprise),
            "VIP"        => Ok(Self::Vip),
            other => Err(LeakageError::InvalidValue {
                field: "tier",
                value: other.to_string(),
            }),
        }
    }
}

/// Customer lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomerStatus {
    Active,
    Suspended,
    Cancelled,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active    => "Active",
            Self::Suspended => "Suspended",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomerStatus {
    type Err = LeakageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active"    => Ok(Self::Active),
            "Suspended" => Ok(Self::Suspended),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(LeakageError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered() {
        assert!(CustomerTier::Basic < CustomerTier::Premium);
        assert!(CustomerTier::Premium < CustomerTier::Enterprise);
        assert!(CustomerTier::Enterprise < CustomerTier::Vip);
    }

    #[test]
    fn tier_round_trips_through_str() {
        for tier in CustomerTier::ALL {
            assert_eq!(tier.as_str().parse::<CustomerTier>().unwrap(), tier);
        }
        assert!("Gold".parse::<CustomerTier>().is_err());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "Closed".parse::<CustomerStatus>(),
            Err(LeakageError::InvalidValue { field: "status", .. })
        ));
    }
}
