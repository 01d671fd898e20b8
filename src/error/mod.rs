use thiserror::Error;

/// Failure to produce canonical bytes for one record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HashingError {
    #[error("field '{field}' holds a non-finite number")]
    NonFiniteNumber { field: String },

    #[error("record contains an empty field name")]
    EmptyFieldName,

    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[derive(Error, Debug)]
pub enum BrokerGuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Hashing error: {0}")]
    Hashing(#[from] HashingError),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Config file not found: {0}")]
    ConfigFileNotFound(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl BrokerGuardError {
    pub fn config(message: impl Into<String>) -> Self {
        BrokerGuardError::Config(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        BrokerGuardError::Evaluation(message.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, BrokerGuardError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, BrokerGuardError>;
