//! Business-rule tables: loss-to-severity bands and confidence scoring.
//!
//! RULES:
//!   - Bands are half-open `[min, max)`. `max = None` is unbounded.
//!   - A table starts at 0, ascends, and has no gaps or overlaps.
//!     Only the last band may be unbounded.
//!   - The first band containing the loss wins; no match means LOW.
//!   - Tables are validated when built or deserialised and never change
//!     afterwards.

use crate::{
    detection::Severity,
    error::{LeakageError, LeakageResult},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBand {
    pub min:      f64,
    pub max:      Option<f64>,
    pub severity: Severity,
}

impl SeverityBand {
    pub const fn new(min: f64, max: Option<f64>, severity: Severity) -> Self {
        Self { min, max, severity }
    }

    pub fn contains(&self, loss: f64) -> bool {
        loss >= self.min && self.max.map_or(true, |max| loss < max)
    }
}

/// An ordered, validated list of severity bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SeverityBand>", into = "Vec<SeverityBand>")]
pub struct SeverityTable {
    bands: Vec<SeverityBand>,
}

impl SeverityTable {
    pub fn new(bands: Vec<SeverityBand>) -> LeakageResult<Self> {
        validate_bands(&bands).map_err(|reason| LeakageError::InvalidSeverityTable {
            table: describe(&bands),
            reason,
        })?;
        Ok(Self { bands })
    }

    /// Four-band table `[0,a) LOW, [a,b) MEDIUM, [b,c) HIGH, [c,∞) CRITICAL`.
    fn four_band(medium: f64, high: f64, critical: f64) -> Self {
        Self {
            bands: vec![
                SeverityBand::new(0.0, Some(medium), Severity::Low),
                SeverityBand::new(medium, Some(high), Severity::Medium),
                SeverityBand::new(high, Some(critical), Severity::High),
                SeverityBand::new(critical, None, Severity::Critical),
            ],
        }
    }

    pub fn missing_charges() -> Self {
        Self::four_band(100.0, 1_000.0, 5_000.0)
    }

    pub fn incorrect_rates() -> Self {
        Self::four_band(50.0, 500.0, 2_000.0)
    }

    pub fn usage_mismatches() -> Self {
        Self::four_band(25.0, 200.0, 1_000.0)
    }

    pub fn duplicate_entries() -> Self {
        Self::four_band(50.0, 200.0, 1_000.0)
    }

    pub fn bands(&self) -> &[SeverityBand] {
        &self.bands
    }

    /// Map an estimated loss onto a severity.
    pub fn classify(&self, loss: f64) -> Severity {
        self.bands
            .iter()
            .find(|band| band.contains(loss))
            .map_or(Severity::Low, |band| band.severity)
    }
}

impl TryFrom<Vec<SeverityBand>> for SeverityTable {
    type Error = LeakageError;

    fn try_from(bands: Vec<SeverityBand>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<SeverityTable> for Vec<SeverityBand> {
    fn from(table: SeverityTable) -> Self {
        table.bands
    }
}

fn describe(bands: &[SeverityBand]) -> String {
    let parts: Vec<String> = bands
        .iter()
        .map(|b| match b.max {
            Some(max) => format!("[{}, {}) {}", b.min, max, b.severity),
            None      => format!("[{}, inf) {}", b.min, b.severity),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

fn validate_bands(bands: &[SeverityBand]) -> Result<(), String> {
    let first = bands.first().ok_or("table has no bands")?;
    if first.min != 0.0 {
        return Err(format!("first band starts at {}, expected 0", first.min));
    }
    for (i, band) in bands.iter().enumerate() {
        if !band.min.is_finite() || band.max.is_some_and(|m| !m.is_finite()) {
            return Err(format!("band {i} has a non-finite bound"));
        }
        match (band.max, bands.get(i + 1)) {
            (Some(max), _) if max <= band.min => {
                return Err(format!("band {i} is empty or descending"));
            }
            (Some(max), Some(next)) if next.min != max => {
                return Err(format!(
                    "band {} starts at {} but band {i} ends at {max}",
                    i + 1,
                    next.min
                ));
            }
            (None, Some(_)) => {
                return Err(format!("band {i} is unbounded but is not the last band"));
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Confidence ───────────────────────────────────────────────────────────────

/// Base-plus-bonuses confidence, capped to [0, 1] on read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confidence(f64);

impl Confidence {
    pub fn base(value: f64) -> Self {
        Self(value)
    }

    pub fn bonus_if(self, condition: bool, bonus: f64) -> Self {
        if condition { Self(self.0 + bonus) } else { self }
    }

    pub fn value(self) -> f64 {
        self.0.clamp(0.0, 1.0)
    }

    /// Gate against a threshold. Compared after capping.
    pub fn clears(self, threshold: f64) -> bool {
        self.value() >= threshold
    }
}
