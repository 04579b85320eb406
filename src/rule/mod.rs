//! User-facing fault-injection rules.
//!
//! A [`FaultInjectionRule`] pairs an abstract [`Condition`] (which traffic)
//! with a [`FaultInjectionResult`] (what happens to it) plus scheduling
//! constraints (start delay, active duration, hit limit). Rules are declared
//! in code via [`FaultInjectionRuleBuilder`] or in YAML (see
//! [`config`](crate::config)), handed to the engine once, and immutable
//! afterwards except for the effective-rule backing field the engine attaches
//! at registration time.

mod condition;
mod result;

pub use condition::{Condition, ConnectionKind, EndpointSelector, OperationType};
pub use result::{
    ConnectionErrorResult, ConnectionErrorType, FaultInjectionResult, InjectedServerError,
    ServerErrorResult, ServerErrorType,
};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::resolver::EffectiveRule;
use crate::{Error, Result};

/// A declarative fault-injection rule.
///
/// Construct with [`FaultInjectionRuleBuilder`] and register through
/// [`FaultInjectionEngine::process_rules`](crate::engine::FaultInjectionEngine::process_rules).
/// After registration the rule exposes live state ([`hit_count`](Self::hit_count),
/// [`is_effective`](Self::is_effective)) and can be switched off with
/// [`disable`](Self::disable).
#[derive(Debug, Serialize, Deserialize)]
pub struct FaultInjectionRule {
    /// Unique rule id; re-registering an id replaces the previous rule
    pub id: String,
    /// Whether the rule participates in matching
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay between registration and the start of the active window
    #[serde(default, with = "humantime_serde::option")]
    pub start_delay: Option<Duration>,
    /// Length of the active window (unbounded when `None`)
    #[serde(default, with = "humantime_serde::option")]
    pub duration: Option<Duration>,
    /// Maximum number of activations (unbounded when `None`)
    #[serde(default)]
    pub hit_limit: Option<u64>,
    /// Which traffic the rule applies to
    pub condition: Condition,
    /// What the rule does to matching traffic
    pub result: FaultInjectionResult,
    /// Resolved form, attached by the engine at registration
    #[serde(skip)]
    effective: RwLock<Option<Arc<EffectiveRule>>>,
}

fn default_enabled() -> bool {
    true
}

impl FaultInjectionRule {
    /// Start building a rule with the given id
    #[must_use]
    pub fn builder(id: impl Into<String>) -> FaultInjectionRuleBuilder {
        FaultInjectionRuleBuilder::new(id)
    }

    /// Total number of times this rule has fired since registration.
    ///
    /// Returns 0 before registration.
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.effective
            .read()
            .as_ref()
            .map_or(0, |e| e.state().hit_count())
    }

    /// Whether the rule is registered and currently valid (enabled, inside
    /// its time window, below its hit limit)
    #[must_use]
    pub fn is_effective(&self) -> bool {
        self.effective
            .read()
            .as_ref()
            .is_some_and(|e| e.state().is_valid())
    }

    /// Switch the rule off. Takes effect on the next injector query and is
    /// observed by the connection-error background task at its next wake-up.
    pub fn disable(&self) {
        if let Some(effective) = self.effective.read().as_ref() {
            effective.state().disable();
        }
    }

    /// Shape-check the rule without resolving it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for an empty id, a delay result with no
    /// delay, a connection-error threshold outside (0, 1], a zero
    /// re-application interval, a connection-error rule on the gateway
    /// transport, or a direct-mode connection-error rule with no endpoint
    /// selector.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid_rule("<empty>", "rule id must not be empty"));
        }
        match &self.result {
            FaultInjectionResult::ServerError(server) => {
                if server.error_type.is_delay() && server.delay.is_none() {
                    return Err(Error::invalid_rule(
                        &self.id,
                        format!("{:?} requires a delay", server.error_type),
                    ));
                }
            }
            FaultInjectionResult::ConnectionError(conn) => {
                if !(conn.threshold > 0.0 && conn.threshold <= 1.0) {
                    return Err(Error::invalid_rule(
                        &self.id,
                        format!("threshold {} outside (0, 1]", conn.threshold),
                    ));
                }
                if conn.interval.is_zero() {
                    return Err(Error::invalid_rule(&self.id, "interval must be non-zero"));
                }
                if self.condition.connection_kind == ConnectionKind::Gateway {
                    return Err(Error::invalid_rule(
                        &self.id,
                        "connection-error rules require the direct connection type",
                    ));
                }
                if self.condition.endpoint_selector.is_none() {
                    return Err(Error::invalid_rule(
                        &self.id,
                        "direct-mode connection-error rule requires an endpoint selector",
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn attach_effective(&self, effective: Arc<EffectiveRule>) {
        *self.effective.write() = Some(effective);
    }

    pub(crate) fn effective_rule(&self) -> Option<Arc<EffectiveRule>> {
        self.effective.read().clone()
    }
}

/// Builder for [`FaultInjectionRule`]
#[derive(Debug)]
pub struct FaultInjectionRuleBuilder {
    id: String,
    enabled: bool,
    start_delay: Option<Duration>,
    duration: Option<Duration>,
    hit_limit: Option<u64>,
    condition: Option<Condition>,
    result: Option<FaultInjectionResult>,
}

impl FaultInjectionRuleBuilder {
    /// Start a builder for a rule with the given id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            start_delay: None,
            duration: None,
            hit_limit: None,
            condition: None,
            result: None,
        }
    }

    /// Set the rule condition
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set the rule result
    #[must_use]
    pub fn result(mut self, result: FaultInjectionResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Delay activation by `start_delay` after registration
    #[must_use]
    pub fn start_delay(mut self, start_delay: Duration) -> Self {
        self.start_delay = Some(start_delay);
        self
    }

    /// Keep the rule active for `duration` after its start
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Stop applying the rule after `hit_limit` activations
    #[must_use]
    pub fn hit_limit(mut self, hit_limit: u64) -> Self {
        self.hit_limit = Some(hit_limit);
        self
    }

    /// Register the rule disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Finish the rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] when condition or result is missing, or
    /// when [`FaultInjectionRule::validate`] rejects the shape.
    pub fn build(self) -> Result<Arc<FaultInjectionRule>> {
        let condition = self
            .condition
            .ok_or_else(|| Error::invalid_rule(&self.id, "missing condition"))?;
        let result = self
            .result
            .ok_or_else(|| Error::invalid_rule(&self.id, "missing result"))?;
        let rule = FaultInjectionRule {
            id: self.id,
            enabled: self.enabled,
            start_delay: self.start_delay,
            duration: self.duration,
            hit_limit: self.hit_limit,
            condition,
            result,
            effective: RwLock::new(None),
        };
        rule.validate()?;
        Ok(Arc::new(rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_condition() -> Condition {
        Condition::for_connection(ConnectionKind::Gateway)
    }

    #[test]
    fn builder_produces_valid_rule() {
        let rule = FaultInjectionRule::builder("throttle-reads")
            .condition(gateway_condition())
            .result(FaultInjectionResult::ServerError(ServerErrorResult::error(
                ServerErrorType::TooManyRequests,
            )))
            .hit_limit(3)
            .duration(Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(rule.id, "throttle-reads");
        assert!(rule.enabled);
        assert_eq!(rule.hit_limit, Some(3));
        assert_eq!(rule.hit_count(), 0, "unregistered rule has no hits");
        assert!(!rule.is_effective(), "unregistered rule is not effective");
    }

    #[test]
    fn builder_rejects_missing_condition() {
        let err = FaultInjectionRule::builder("r")
            .result(FaultInjectionResult::ServerError(ServerErrorResult::error(
                ServerErrorType::Gone,
            )))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn delay_result_requires_delay() {
        let err = FaultInjectionRule::builder("r")
            .condition(gateway_condition())
            .result(FaultInjectionResult::ServerError(ServerErrorResult {
                error_type: ServerErrorType::ResponseDelay,
                delay: None,
                suppress_service_request: false,
            }))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRule { .. }));
    }

    #[test]
    fn direct_connection_error_requires_selector() {
        let err = FaultInjectionRule::builder("conn-err")
            .condition(Condition::for_connection(ConnectionKind::Direct))
            .result(FaultInjectionResult::ConnectionError(ConnectionErrorResult {
                error_type: ConnectionErrorType::ConnectionClose,
                interval: Duration::from_millis(100),
                threshold: 1.0,
            }))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRule { .. }));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let err = FaultInjectionRule::builder("conn-err")
            .condition(Condition {
                endpoint_selector: Some(EndpointSelector::default()),
                ..Condition::for_connection(ConnectionKind::Direct)
            })
            .result(FaultInjectionResult::ConnectionError(ConnectionErrorResult {
                error_type: ConnectionErrorType::ConnectionReset,
                interval: Duration::from_millis(100),
                threshold: 1.5,
            }))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRule { .. }));
    }

    #[test]
    fn rule_deserializes_from_yaml() {
        let yaml = r"
id: gateway-throttle
hit_limit: 2
duration: 60s
condition:
  operation_type: read_item
  connection_kind: gateway
result:
  type: server_error
  error_type: too_many_requests
";
        let rule: FaultInjectionRule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.enabled, "enabled defaults to true");
        assert_eq!(rule.hit_limit, Some(2));
        assert_eq!(rule.duration, Some(Duration::from_secs(60)));
        rule.validate().unwrap();
    }
}
