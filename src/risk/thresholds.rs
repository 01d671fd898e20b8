use serde::{Deserialize, Serialize};
use crate::error::{BrokerGuardError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores from `from` (inclusive) up to the next band's `from` (exclusive)
/// map to `level`. The last band extends to 100 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub from: f64,
    pub level: RiskLevel,
}

impl Band {
    pub fn new(from: f64, level: RiskLevel) -> Self {
        Self { from, level }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Band>", into = "Vec<Band>")]
pub struct ThresholdTable {
    bands: Vec<Band>,
}

impl ThresholdTable {
    /// Builds a table covering `[0, 100]`. Bands must start at 0, have strictly
    /// increasing lower bounds below 100, and strictly increasing levels.
    pub fn new(bands: Vec<Band>) -> Result<Self> {
        let Some(first) = bands.first() else {
            return Err(BrokerGuardError::config("threshold table is empty"));
        };
        if first.from != 0.0 {
            return Err(BrokerGuardError::config(format!(
                "threshold table must start at 0, first band starts at {}",
                first.from
            )));
        }

        for band in &bands {
            if !band.from.is_finite() || !(0.0..100.0).contains(&band.from) {
                return Err(BrokerGuardError::config(format!(
                    "band '{}' starts at {}, outside [0, 100)",
                    band.level, band.from
                )));
            }
        }

        for pair in bands.windows(2) {
            if pair[1].from <= pair[0].from {
                return Err(BrokerGuardError::config(format!(
                    "band '{}' at {} does not start above band '{}' at {}",
                    pair[1].level, pair[1].from, pair[0].level, pair[0].from
                )));
            }
            if pair[1].level <= pair[0].level {
                return Err(BrokerGuardError::config(format!(
                    "band levels must increase: '{}' follows '{}'",
                    pair[1].level, pair[0].level
                )));
            }
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Level for a score; a score on a boundary belongs to the higher band.
    /// Scores outside `[0, 100]` are clamped, a NaN score resolves to the top band.
    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score.is_nan() {
            return self.bands.last().map(|b| b.level).unwrap_or(RiskLevel::Critical);
        }
        let score = score.clamp(0.0, 100.0);
        self.bands
            .iter()
            .rev()
            .find(|band| score >= band.from)
            .map(|band| band.level)
            .unwrap_or(RiskLevel::Low)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            bands: vec![
                Band::new(0.0, RiskLevel::Low),
                Band::new(25.0, RiskLevel::Medium),
                Band::new(50.0, RiskLevel::High),
                Band::new(75.0, RiskLevel::Critical),
            ],
        }
    }
}

impl TryFrom<Vec<Band>> for ThresholdTable {
    type Error = BrokerGuardError;

    fn try_from(bands: Vec<Band>) -> Result<Self> {
        Self::new(bands)
    }
}

impl From<ThresholdTable> for Vec<Band> {
    fn from(table: ThresholdTable) -> Self {
        table.bands
    }
}
