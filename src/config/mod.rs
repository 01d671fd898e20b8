mod loader;

pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::risk::{CargoConfig, MerchandiseConfig, PillarEvaluator, PillarWeights, RiskComposer, ThresholdTable};
use crate::solidary::{RuleDescriptor, SolidaryAuditor};

/// Everything needed to evaluate shipments: composer weights and cut points,
/// pillar parameters and the solidary rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub weights: PillarWeights,
    pub thresholds: ThresholdTable,
    pub high_risk_zones: Vec<String>,
    pub cargo: CargoConfig,
    pub merchandise: MerchandiseConfig,
    pub rules: Vec<RuleDescriptor>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            weights: PillarWeights::default(),
            thresholds: ThresholdTable::default(),
            high_risk_zones: Vec::new(),
            cargo: CargoConfig::default(),
            merchandise: MerchandiseConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl AuditConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AuditConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Weights and thresholds are checked on deserialization; this covers
    /// the pillar parameters and the rule table.
    pub fn validate(&self) -> Result<()> {
        self.pillar_evaluator()?;
        SolidaryAuditor::new(&self.rules)?;
        Ok(())
    }

    pub fn pillar_evaluator(&self) -> Result<PillarEvaluator> {
        PillarEvaluator::new(&self.high_risk_zones, self.cargo.clone(), self.merchandise.clone())
    }

    pub fn composer(&self) -> RiskComposer {
        RiskComposer::new(self.weights, self.thresholds.clone())
    }
}
