//! Declarative rule-set documents.
//!
//! Chaos scenarios are often checked into test fixtures rather than built in
//! code. A rule-set document is a YAML file with a single `rules` list, each
//! entry deserializing into a [`FaultInjectionRule`]; values can be
//! overridden through `FAULTLINE_`-prefixed environment variables.
//!
//! ```yaml
//! rules:
//!   - id: gateway-throttle
//!     hit_limit: 2
//!     duration: 60s
//!     condition:
//!       operation_type: read_item
//!       connection_kind: gateway
//!     result:
//!       type: server_error
//!       error_type: too_many_requests
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::rule::FaultInjectionRule;
use crate::{Error, Result};

/// A parsed rule-set document
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetConfig {
    /// The declared rules, in document order
    pub rules: Vec<FaultInjectionRule>,
}

impl RuleSetConfig {
    /// Load a document from a YAML file, with `FAULTLINE_` environment
    /// overrides applied on top.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or does not
    /// deserialize, and validation errors per [`validate`](Self::validate).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("FAULTLINE_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a document from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`] on malformed YAML and validation errors per
    /// [`validate`](Self::validate).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Shape-check every rule and reject duplicate ids.
    ///
    /// # Errors
    ///
    /// The first rule-level [`Error::InvalidRule`], or [`Error::Config`] for
    /// a duplicated rule id.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate rule id '{}' in rule-set document",
                    rule.id
                )));
            }
        }
        Ok(())
    }

    /// Consume the document into engine-ready rules
    #[must_use]
    pub fn into_rules(self) -> Vec<Arc<FaultInjectionRule>> {
        self.rules.into_iter().map(Arc::new).collect()
    }
}
