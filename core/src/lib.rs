//! Revenue-leakage detection core.
//!
//! Raw billing, usage, contract and customer tables go in; typed, scored
//! and explained detections plus a run summary come out.

pub mod aggregator;
pub mod anomaly_detector;
pub mod cleaning;
pub mod config;
pub mod detection;
pub mod detector;
pub mod duplicate_entry_detector;
pub mod engine;
pub mod error;
pub mod event;
pub mod feature_engineer;
pub mod incorrect_rates_detector;
pub mod join_engine;
pub mod joined;
pub mod missing_charges_detector;
pub mod outlier;
pub mod records;
pub mod rng;
pub mod rules;
pub mod sample_data;
pub mod store;
pub mod types;
pub mod usage_mismatch_detector;

#[cfg(test)]
pub(crate) mod test_support;
