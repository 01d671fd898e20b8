use std::collections::{BTreeSet, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::error::{BrokerGuardError, Result};
use crate::record::{fields, hs_chapter, ShipmentRecords};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Associates,
    Cargo,
    Route,
    Merchandise,
}

impl Pillar {
    pub const ALL: [Pillar; 4] = [Pillar::Associates, Pillar::Cargo, Pillar::Route, Pillar::Merchandise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Associates => "associates",
            Pillar::Cargo => "cargo",
            Pillar::Route => "route",
            Pillar::Merchandise => "merchandise",
        }
    }
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reason behind a pillar score; `weight` is its points on the 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub factor: String,
    pub weight: f64,
    pub detail: String,
}

impl Factor {
    pub fn new(factor: impl Into<String>, weight: f64, detail: impl Into<String>) -> Self {
        Self {
            factor: factor.into(),
            weight,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarScore {
    pub pillar: Pillar,
    pub raw_score: f64,
    pub contributing_factors: Vec<Factor>,
}

impl PillarScore {
    /// Score is the largest factor weight, clamped to `[0, 100]`.
    pub fn from_factors(pillar: Pillar, contributing_factors: Vec<Factor>) -> Self {
        let raw_score = contributing_factors
            .iter()
            .map(|f| f.weight)
            .fold(0.0, f64::max)
            .clamp(0.0, 100.0);
        Self { pillar, raw_score, contributing_factors }
    }

    /// Maximum score for a pillar whose inputs could not be evaluated.
    pub fn unverifiable(pillar: Pillar, reason: impl Into<String>) -> Self {
        Self {
            pillar,
            raw_score: 100.0,
            contributing_factors: vec![Factor::new("evaluation_failed", 100.0, reason)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterpartStatus {
    Sanctioned,
    Unverified,
    Verified,
    Certified,
}

impl CounterpartStatus {
    /// Unrecognized statuses read as unverified.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "sanctioned" | "blocked" | "denied" | "listed" => CounterpartStatus::Sanctioned,
            "verified" => CounterpartStatus::Verified,
            "oea" | "aeo" | "certified" => CounterpartStatus::Certified,
            _ => CounterpartStatus::Unverified,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            CounterpartStatus::Sanctioned => 100.0,
            CounterpartStatus::Unverified => 70.0,
            CounterpartStatus::Verified => 20.0,
            CounterpartStatus::Certified => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartStatus::Sanctioned => "sanctioned",
            CounterpartStatus::Unverified => "unverified",
            CounterpartStatus::Verified => "verified",
            CounterpartStatus::Certified => "certified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CargoConfig {
    /// Relative weight error at which the cargo pillar saturates at 100.
    pub saturation: f64,
}

impl Default for CargoConfig {
    fn default() -> Self {
        Self { saturation: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchandiseConfig {
    pub controlled_chapters: BTreeSet<u8>,
    pub sensitive_chapters: BTreeSet<u8>,
    pub min_confidence: f64,
}

impl Default for MerchandiseConfig {
    fn default() -> Self {
        Self {
            controlled_chapters: BTreeSet::from([93]),
            sensitive_chapters: BTreeSet::from([28, 29, 30, 36]),
            min_confidence: 0.7,
        }
    }
}

const CONTROLLED_SCORE: f64 = 100.0;
const SENSITIVE_SCORE: f64 = 60.0;
const LOW_CONFIDENCE_SCORE: f64 = 40.0;
const UNRESOLVED_CLASSIFICATION_SCORE: f64 = 50.0;
const HIGH_RISK_ORIGIN_SCORE: f64 = 100.0;
const HIGH_RISK_TRANSIT_SCORE: f64 = 60.0;

pub fn score_associates(records: ShipmentRecords<'_>) -> Result<PillarScore> {
    let mut factors = Vec::new();

    for field in fields::COUNTERPART_FIELDS {
        let Some(record) = records.find(field) else {
            continue;
        };
        let status = match record.text(field)? {
            Some(text) => CounterpartStatus::parse(&text),
            None => CounterpartStatus::Unverified,
        };
        factors.push(Factor::new(field, status.score(), status.as_str()));
    }

    if factors.is_empty() {
        factors.push(Factor::new(
            "counterparts",
            CounterpartStatus::Unverified.score(),
            "no counterpart due-diligence status on file",
        ));
    }

    Ok(PillarScore::from_factors(Pillar::Associates, factors))
}

/// Monotonic in the relative error between declared and observed weight.
pub fn score_cargo(records: ShipmentRecords<'_>, config: &CargoConfig) -> Result<PillarScore> {
    let declared = records.declaration.number(fields::DECLARED_WEIGHT_KG)?;
    let observed = records.shipment.number(fields::OBSERVED_WEIGHT_KG)?;

    let (declared, observed) = match (declared, observed) {
        (Some(d), Some(o)) => (d, o),
        (None, _) => return Err(BrokerGuardError::evaluation(format!(
            "{}: declared weight '{}' missing",
            records.declaration.key(), fields::DECLARED_WEIGHT_KG
        ))),
        (_, None) => return Err(BrokerGuardError::evaluation(format!(
            "{}: observed weight '{}' missing",
            records.shipment.key(), fields::OBSERVED_WEIGHT_KG
        ))),
    };
    if observed <= 0.0 || declared < 0.0 {
        return Err(BrokerGuardError::evaluation(format!(
            "weights must be positive (declared {declared} kg, observed {observed} kg)"
        )));
    }

    let relative_error = (declared - observed).abs() / observed;
    let score = (relative_error / config.saturation * 100.0).min(100.0);

    Ok(PillarScore::from_factors(Pillar::Cargo, vec![Factor::new(
        "weight_discrepancy",
        score,
        format!(
            "declared {declared} kg vs observed {observed} kg ({:.1}% deviation)",
            relative_error * 100.0
        ),
    )]))
}

pub fn score_route(records: ShipmentRecords<'_>, high_risk_zones: &HashSet<String>) -> Result<PillarScore> {
    let origin = records
        .find(fields::ORIGIN_COUNTRY)
        .map(|r| r.text(fields::ORIGIN_COUNTRY))
        .transpose()?
        .flatten()
        .ok_or_else(|| BrokerGuardError::evaluation(format!(
            "origin country '{}' missing",
            fields::ORIGIN_COUNTRY
        )))?
        .to_ascii_uppercase();

    let mut factors = Vec::new();
    if high_risk_zones.contains(&origin) {
        factors.push(Factor::new("origin_in_high_risk_zone", HIGH_RISK_ORIGIN_SCORE, origin.clone()));
    }

    if let Some(record) = records.find(fields::TRANSIT_COUNTRIES) {
        let transit = record.text(fields::TRANSIT_COUNTRIES)?.unwrap_or_default();
        for zone in transit
            .split([',', ';'])
            .map(|z| z.trim().to_ascii_uppercase())
            .filter(|z| !z.is_empty())
        {
            if high_risk_zones.contains(&zone) {
                factors.push(Factor::new("transit_through_high_risk_zone", HIGH_RISK_TRANSIT_SCORE, zone));
            }
        }
    }

    if factors.is_empty() {
        factors.push(Factor::new("route", 0.0, format!("origin {origin} outside high-risk zones")));
    }

    Ok(PillarScore::from_factors(Pillar::Route, factors))
}

pub fn score_merchandise(records: ShipmentRecords<'_>, config: &MerchandiseConfig) -> Result<PillarScore> {
    let Some(record) = records.find(fields::HS_CODE) else {
        return Err(BrokerGuardError::evaluation(format!(
            "no tariff classification '{}' on shipment",
            fields::HS_CODE
        )));
    };

    let Some(code) = record.text(fields::HS_CODE)? else {
        return Ok(PillarScore::from_factors(Pillar::Merchandise, vec![Factor::new(
            "classification_unresolved",
            UNRESOLVED_CLASSIFICATION_SCORE,
            "classifier returned no HS code",
        )]));
    };

    let chapter = hs_chapter(&code).ok_or_else(|| {
        BrokerGuardError::evaluation(format!("{}: malformed HS code '{}'", record.key(), code))
    })?;

    let mut factors = Vec::new();
    if config.controlled_chapters.contains(&chapter) {
        factors.push(Factor::new("controlled_chapter", CONTROLLED_SCORE, format!("HS {code} (chapter {chapter:02})")));
    } else if config.sensitive_chapters.contains(&chapter) {
        factors.push(Factor::new("sensitive_chapter", SENSITIVE_SCORE, format!("HS {code} (chapter {chapter:02})")));
    } else {
        factors.push(Factor::new("chapter", 0.0, format!("HS {code} (chapter {chapter:02})")));
    }

    let confidence = records
        .find(fields::HS_CONFIDENCE)
        .map(|r| r.number(fields::HS_CONFIDENCE))
        .transpose()?
        .flatten();
    if let Some(confidence) = confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(BrokerGuardError::evaluation(format!(
                "classification confidence {confidence} outside [0, 1]"
            )));
        }
        if confidence < config.min_confidence {
            factors.push(Factor::new(
                "low_classification_confidence",
                LOW_CONFIDENCE_SCORE,
                format!("confidence {confidence:.2} below {:.2}", config.min_confidence),
            ));
        }
    }

    Ok(PillarScore::from_factors(Pillar::Merchandise, factors))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PillarFailure {
    pub pillar: Pillar,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PillarEvaluation {
    pub scores: [PillarScore; 4],
    pub failures: Vec<PillarFailure>,
}

/// Runs the four pillar functions over one shipment.
#[derive(Debug, Clone, Default)]
pub struct PillarEvaluator {
    high_risk_zones: HashSet<String>,
    cargo: CargoConfig,
    merchandise: MerchandiseConfig,
}

impl PillarEvaluator {
    pub fn new(
        high_risk_zones: impl IntoIterator<Item = impl AsRef<str>>,
        cargo: CargoConfig,
        merchandise: MerchandiseConfig,
    ) -> Result<Self> {
        if !(cargo.saturation.is_finite() && cargo.saturation > 0.0) {
            return Err(BrokerGuardError::config(format!(
                "cargo saturation must be positive, got {}",
                cargo.saturation
            )));
        }
        if !(0.0..=1.0).contains(&merchandise.min_confidence) {
            return Err(BrokerGuardError::config(format!(
                "min_confidence must be within [0, 1], got {}",
                merchandise.min_confidence
            )));
        }
        if let Some(chapter) = merchandise.controlled_chapters.intersection(&merchandise.sensitive_chapters).next() {
            return Err(BrokerGuardError::config(format!(
                "chapter {chapter} is both controlled and sensitive"
            )));
        }

        let high_risk_zones = high_risk_zones
            .into_iter()
            .map(|z| z.as_ref().trim().to_ascii_uppercase())
            .filter(|z| !z.is_empty())
            .collect();

        Ok(Self { high_risk_zones, cargo, merchandise })
    }

    pub fn high_risk_zones(&self) -> &HashSet<String> {
        &self.high_risk_zones
    }

    pub fn score(&self, pillar: Pillar, records: ShipmentRecords<'_>) -> Result<PillarScore> {
        match pillar {
            Pillar::Associates => score_associates(records),
            Pillar::Cargo => score_cargo(records, &self.cargo),
            Pillar::Route => score_route(records, &self.high_risk_zones),
            Pillar::Merchandise => score_merchandise(records, &self.merchandise),
        }
    }

    /// Scores every pillar. A pillar that fails on malformed input is scored
    /// as unverifiable and reported in `failures`.
    pub fn evaluate(&self, records: ShipmentRecords<'_>) -> PillarEvaluation {
        let mut failures = Vec::new();
        let scores = Pillar::ALL.map(|pillar| match self.score(pillar, records) {
            Ok(score) => {
                debug!(pillar = pillar.as_str(), score = score.raw_score, "Pillar scored");
                score
            }
            Err(e) => {
                warn!(pillar = pillar.as_str(), shipment = %records.shipment.key(), error = %e, "Pillar evaluation failed");
                failures.push(PillarFailure { pillar, message: e.to_string() });
                PillarScore::unverifiable(pillar, e.to_string())
            }
        });

        PillarEvaluation { scores, failures }
    }
}
