//! Gateway-mode transport injector.
//!
//! Same query surface as the direct injector, but requests are identified by
//! the service endpoint URI they are about to hit rather than by a physical
//! replica address.

use std::sync::Arc;
use std::time::Duration;

use super::{DelegateChain, FaultInjector, RuleSetInjector, TransportRequest};
use crate::resolver::EffectiveRule;
use crate::rule::InjectedServerError;

/// Injector for the gateway HTTP transport
pub struct GatewayInjector {
    rules: Arc<RuleSetInjector>,
    chain: DelegateChain,
}

impl GatewayInjector {
    /// Create an injector with an empty rule set
    #[must_use]
    pub fn new() -> Self {
        let rules = Arc::new(RuleSetInjector::new());
        let chain = DelegateChain::new(Arc::clone(&rules) as Arc<dyn FaultInjector>);
        Self { rules, chain }
    }

    /// Append a delegate behind the engine-managed rule set
    pub fn add_delegate(&self, delegate: Arc<dyn FaultInjector>) {
        self.chain.push(delegate);
    }

    /// Register a resolved rule (replaces any previous rule with the same id)
    pub(crate) fn register(&self, rule: Arc<EffectiveRule>) {
        self.rules.register(rule);
    }

    /// Remove a rule by id
    pub(crate) fn unregister(&self, rule_id: &str) -> bool {
        self.rules.unregister(rule_id)
    }

    /// Whether a rule with this id is registered
    #[must_use]
    pub fn contains_rule(&self, rule_id: &str) -> bool {
        self.rules.contains(rule_id)
    }
}

impl Default for GatewayInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector for GatewayInjector {
    fn response_delay_before_send(&self, request: &TransportRequest) -> Option<Duration> {
        self.chain.first_some(|d| d.response_delay_before_send(request))
    }

    fn response_delay_after_send(&self, request: &TransportRequest) -> Option<Duration> {
        self.chain.first_some(|d| d.response_delay_after_send(request))
    }

    fn response_error(&self, request: &TransportRequest) -> Option<InjectedServerError> {
        self.chain.first_some(|d| d.response_error(request))
    }

    fn connection_delay(&self, request: &TransportRequest) -> Option<Duration> {
        self.chain.first_some(|d| d.connection_delay(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use url::Url;

    use crate::context::RequestInjectionContext;
    use crate::resolver::{ResolvedCondition, ResolvedTargets, RuleState, ServerErrorRule};
    use crate::rule::{OperationType, ServerErrorResult, ServerErrorType};

    #[test]
    fn matches_by_endpoint_uri() {
        let west = Url::parse("https://acct-westus.example.com/").unwrap();
        let east = Url::parse("https://acct-eastus.example.com/").unwrap();
        let injector = GatewayInjector::new();
        injector.register(Arc::new(EffectiveRule::ServerError(ServerErrorRule {
            state: RuleState::new("west-503".to_string(), true, None, None, None),
            condition: ResolvedCondition {
                collection_rid: "rid-items".to_string(),
                operation_type: None,
                targets: ResolvedTargets::Endpoints(vec![west.clone()]),
            },
            result: ServerErrorResult::error(ServerErrorType::ServiceUnavailable),
        })));

        let ctx = Arc::new(RequestInjectionContext::new());
        let hit = TransportRequest::gateway(1, OperationType::ReadItem, "rid-items", west, Arc::clone(&ctx));
        let miss = TransportRequest::gateway(2, OperationType::ReadItem, "rid-items", east, ctx);

        let err = injector.response_error(&hit).expect("west endpoint must match");
        assert_eq!(err.status_code, 503);
        assert!(injector.response_error(&miss).is_none());
    }
}
