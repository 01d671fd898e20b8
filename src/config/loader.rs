use std::fs;
use std::path::{Path, PathBuf};
use glob::glob;
use tracing::debug;
use crate::error::{BrokerGuardError, Result};
use crate::solidary::RuleDescriptor;
use super::AuditConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: impl AsRef<Path>) -> Result<AuditConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| BrokerGuardError::ConfigFileNotFound(path.display().to_string()))?;
        debug!(path = %path.display(), "Loaded configuration");
        AuditConfig::from_yaml_str(&content)
    }

    /// Loads a config file and appends every rule list found under `rules_dir`.
    pub fn load_with_rules(path: impl AsRef<Path>, rules_dir: impl AsRef<Path>) -> Result<AuditConfig> {
        let mut config = Self::load(path)?;
        config.rules.extend(Self::load_rules_dir(rules_dir)?);
        config.validate()?;
        Ok(config)
    }

    /// Reads `dir/**/*.yaml`, each file holding a list of rule descriptors,
    /// in sorted path order.
    pub fn load_rules_dir(dir: impl AsRef<Path>) -> Result<Vec<RuleDescriptor>> {
        let pattern = dir.as_ref().join("**/*.yaml");
        let pattern_str = pattern.to_string_lossy();

        let mut files: Vec<PathBuf> = glob(&pattern_str)
            .map_err(|e| BrokerGuardError::config(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();
        files.sort();

        let mut rules = Vec::new();
        for file in files {
            let content = fs::read_to_string(&file)
                .map_err(|_| BrokerGuardError::ConfigFileNotFound(file.display().to_string()))?;
            let parsed: Vec<RuleDescriptor> = serde_yaml::from_str(&content).map_err(|e| {
                BrokerGuardError::config(format!("{}: {}", file.display(), e))
            })?;
            debug!(path = %file.display(), count = parsed.len(), "Loaded rules");
            rules.extend(parsed);
        }
        Ok(rules)
    }
}
