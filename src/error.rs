//! Error types for the fault-injection engine

use thiserror::Error;

/// Result type alias for the fault-injection engine
pub type Result<T> = std::result::Result<T, Error>;

/// Fault-injection engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed rule rejected at registration time
    #[error("Invalid fault-injection rule '{rule_id}': {reason}")]
    InvalidRule {
        /// Id of the offending rule
        rule_id: String,
        /// Why the rule was rejected
        reason: String,
    },

    /// The target container could not be resolved
    #[error("Container not resolved: {0}")]
    ContainerNotResolved(String),

    /// A region named by a rule is not part of the account topology
    #[error("Region not found: {0}")]
    RegionNotFound(String),

    /// Physical address resolution failed
    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    /// A transport endpoint rejected a connection-fault instruction
    #[error("Endpoint fault propagation failed: {0}")]
    Endpoint(String),

    /// Configuration error (rule-set document)
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML error while reading a rule-set document
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an [`Error::InvalidRule`] for `rule_id`
    pub fn invalid_rule(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors the caller can fix by
    /// correcting the rule definition
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidRule { .. } | Self::Config(_))
    }
}
