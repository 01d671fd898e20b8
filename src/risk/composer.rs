use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::{BrokerGuardError, Result};
use super::pillar::{Pillar, PillarScore};
use super::thresholds::{RiskLevel, ThresholdTable};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct RawWeights {
    associates: f64,
    cargo: f64,
    route: f64,
    merchandise: f64,
}

/// Positive pillar weights summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights", into = "RawWeights")]
pub struct PillarWeights {
    associates: f64,
    cargo: f64,
    route: f64,
    merchandise: f64,
}

impl PillarWeights {
    pub fn new(associates: f64, cargo: f64, route: f64, merchandise: f64) -> Result<Self> {
        let weights = Self { associates, cargo, route, merchandise };

        for pillar in Pillar::ALL {
            let w = weights.weight(pillar);
            if !(w.is_finite() && w > 0.0) {
                return Err(BrokerGuardError::config(format!(
                    "weight for pillar '{pillar}' must be positive, got {w}"
                )));
            }
        }

        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(BrokerGuardError::config(format!(
                "pillar weights must sum to 1.0, got {sum}"
            )));
        }

        Ok(weights)
    }

    pub fn weight(&self, pillar: Pillar) -> f64 {
        match pillar {
            Pillar::Associates => self.associates,
            Pillar::Cargo => self.cargo,
            Pillar::Route => self.route,
            Pillar::Merchandise => self.merchandise,
        }
    }

    fn sum(&self) -> f64 {
        Pillar::ALL.iter().map(|p| self.weight(*p)).sum()
    }
}

impl Default for PillarWeights {
    fn default() -> Self {
        Self {
            associates: 0.30,
            cargo: 0.25,
            route: 0.20,
            merchandise: 0.25,
        }
    }
}

impl TryFrom<RawWeights> for PillarWeights {
    type Error = BrokerGuardError;

    fn try_from(raw: RawWeights) -> Result<Self> {
        Self::new(raw.associates, raw.cargo, raw.route, raw.merchandise)
    }
}

impl From<PillarWeights> for RawWeights {
    fn from(w: PillarWeights) -> Self {
        RawWeights {
            associates: w.associates,
            cargo: w.cargo,
            route: w.route,
            merchandise: w.merchandise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskVerdict {
    pub composite_score: f64,
    pub level: RiskLevel,
    pub pillar_scores: [PillarScore; 4],
    pub computed_at: DateTime<Utc>,
}

impl RiskVerdict {
    pub fn pillar(&self, pillar: Pillar) -> Option<&PillarScore> {
        self.pillar_scores.iter().find(|s| s.pillar == pillar)
    }
}

/// Weighted sum of pillar scores mapped through a threshold table.
#[derive(Debug, Clone, Default)]
pub struct RiskComposer {
    weights: PillarWeights,
    thresholds: ThresholdTable,
}

impl RiskComposer {
    pub fn new(weights: PillarWeights, thresholds: ThresholdTable) -> Self {
        Self { weights, thresholds }
    }

    pub fn weights(&self) -> &PillarWeights {
        &self.weights
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// `Σ weight × score`, each score clamped to `[0, 100]` first and the sum
    /// rounded to six decimals so that float noise never moves a score across
    /// a band boundary. Each pillar must appear exactly once.
    pub fn compose(&self, pillar_scores: [PillarScore; 4]) -> Result<RiskVerdict> {
        for pillar in Pillar::ALL {
            let count = pillar_scores.iter().filter(|s| s.pillar == pillar).count();
            if count != 1 {
                return Err(BrokerGuardError::evaluation(format!(
                    "pillar '{pillar}' scored {count} times, expected once"
                )));
            }
        }

        let weighted: f64 = pillar_scores
            .iter()
            .map(|s| {
                let raw = if s.raw_score.is_nan() { 100.0 } else { s.raw_score.clamp(0.0, 100.0) };
                self.weights.weight(s.pillar) * raw
            })
            .sum();
        let composite_score = ((weighted * 1e6).round() / 1e6).clamp(0.0, 100.0);

        let mut pillar_scores = pillar_scores;
        pillar_scores.sort_by_key(|s| s.pillar);

        Ok(RiskVerdict {
            composite_score,
            level: self.thresholds.level_for(composite_score),
            pillar_scores,
            computed_at: Utc::now(),
        })
    }
}
